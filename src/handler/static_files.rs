//! Static file serving module
//!
//! Loads a file below a root directory and wraps it in a [`Response`].
//!
//! Path cleanup is purely textual: a trailing `/` is dropped and the
//! sequences `//`, `/./` and `/../` are each replaced by `/` once, left to
//! right. The result is not canonicalized, so a leading `../` or an absolute
//! name still escapes `root`. Callers exposing this to untrusted input must
//! restrict `name` with their route pattern.

use hyper::body::Bytes;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::error::RequestError;
use crate::http::{mime, Body, Response};

/// Serve `name` from `root`
///
/// The content type is guessed from the extension of `name` unless given,
/// falling back to `text/plain`.
pub fn static_file(
    name: Option<&str>,
    root: impl AsRef<Path>,
    content_type: Option<&str>,
) -> Result<Response, RequestError> {
    let name = name.ok_or_else(|| RequestError::not_found("No filename"))?;
    let filename = clean_name(name);
    let path = root.as_ref().join(&filename);

    if !path.exists() {
        return Err(RequestError::not_found("No such file"));
    }

    let mut file = File::open(&path).map_err(|e| match e.kind() {
        io::ErrorKind::PermissionDenied => {
            RequestError::forbidden("You do not have a permission to access this file.")
        }
        _ => RequestError::app_error(format!("Could not open {}: {e}", path.display())),
    })?;

    let mut content = Vec::new();
    file.read_to_end(&mut content)
        .map_err(|e| RequestError::app_error(format!("Could not read {}: {e}", path.display())))?;

    let content_type = content_type
        .or_else(|| mime::guess_type(name))
        .unwrap_or("text/plain");

    let body = if mime::is_textual(content_type) {
        match String::from_utf8(content) {
            Ok(text) => Body::Text(text),
            Err(e) => Body::Bytes(Bytes::from(e.into_bytes())),
        }
    } else {
        Body::Bytes(Bytes::from(content))
    };

    tracing::debug!(path = %path.display(), content_type, bytes = body.len(), "serving static file");
    Ok(Response::new(body).with_content_type(content_type))
}

/// Textual cleanup of a requested file name
pub fn clean_name(name: &str) -> String {
    name.trim_end_matches('/')
        .replace("//", "/")
        .replace("/./", "/")
        .replace("/../", "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_clean_name_is_literal() {
        assert_eq!(clean_name("css/site.css/"), "css/site.css");
        assert_eq!(clean_name("a//b"), "a/b");
        assert_eq!(clean_name("a/./b"), "a/b");
        assert_eq!(clean_name("a/../b"), "a/b");
        // Leading parent segments are not touched
        assert_eq!(clean_name("../secret"), "../secret");
    }

    #[test]
    fn test_serves_text_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hello.txt"), "hi there").unwrap();

        let response = static_file(Some("hello.txt"), dir.path(), None).unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.content_type(), "text/plain");
        assert_eq!(response.body(), &Body::Text("hi there".to_string()));
    }

    #[test]
    fn test_binary_file_and_explicit_type() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("img")).unwrap();
        fs::write(dir.path().join("img/dot.png"), [0x89, b'P', b'N', b'G']).unwrap();

        let response = static_file(Some("img//dot.png"), dir.path(), None).unwrap();
        assert_eq!(response.content_type(), "image/png");
        assert!(matches!(response.body(), Body::Bytes(b) if b.len() == 4));

        let response = static_file(Some("img/dot.png"), dir.path(), Some("application/x-raw")).unwrap();
        assert_eq!(response.content_type(), "application/x-raw");
    }

    #[test]
    fn test_unknown_extension_defaults_to_text_plain() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("LICENSE"), "MIT").unwrap();
        let response = static_file(Some("LICENSE"), dir.path(), None).unwrap();
        assert_eq!(response.content_type(), "text/plain");
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = static_file(Some("absent.css"), dir.path(), None).unwrap_err();
        assert_eq!(err.status(), 404);
        assert_eq!(err.message(), "No such file");

        let err = static_file(None, dir.path(), None).unwrap_err();
        assert_eq!(err.message(), "No filename");
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_is_forbidden() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("private.txt");
        fs::write(&path, "secret").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users can read the file anyway
        if File::open(&path).is_ok() {
            return;
        }

        let err = static_file(Some("private.txt"), dir.path(), None).unwrap_err();
        assert_eq!(err.status(), 403);
    }
}
