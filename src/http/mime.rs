//! MIME type guessing
//!
//! Returns the content type for a file name based on its extension. The
//! charset is not part of the result; responses append it when sent.

use std::path::Path;

/// Guess the content type of `name` from its extension
///
/// # Examples
/// ```
/// use microweb::http::mime::guess_type;
/// assert_eq!(guess_type("index.html"), Some("text/html"));
/// assert_eq!(guess_type("clip.MP4"), Some("video/mp4"));
/// assert_eq!(guess_type("README"), None);
/// ```
pub fn guess_type(name: &str) -> Option<&'static str> {
    let extension = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())?
        .to_ascii_lowercase();
    content_type_for(&extension)
}

fn content_type_for(extension: &str) -> Option<&'static str> {
    let content_type = match extension {
        // Text
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "txt" | "md" => "text/plain",
        "csv" => "text/csv",
        "xml" => "application/xml",

        // JavaScript/WASM
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "wasm" => "application/wasm",

        // Images
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "webp" => "image/webp",

        // Video
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "ogg" | "ogv" => "video/ogg",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",

        // Audio
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "m4a" => "audio/mp4",

        // Fonts
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "eot" => "application/vnd.ms-fontobject",

        // Documents
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" | "gzip" => "application/gzip",
        "tar" => "application/x-tar",

        _ => return None,
    };
    Some(content_type)
}

/// Whether content of this type is served as text rather than raw bytes
pub fn is_textual(content_type: &str) -> bool {
    content_type.starts_with("text") || content_type.ends_with("xml") || content_type.ends_with("json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_types() {
        assert_eq!(guess_type("a.html"), Some("text/html"));
        assert_eq!(guess_type("style.css"), Some("text/css"));
        assert_eq!(guess_type("app.js"), Some("application/javascript"));
        assert_eq!(guess_type("data.json"), Some("application/json"));
        assert_eq!(guess_type("logo.png"), Some("image/png"));
        assert_eq!(guess_type("dir/movie.mp4"), Some("video/mp4"));
    }

    #[test]
    fn test_unknown_extension() {
        assert_eq!(guess_type("file.xyz"), None);
        assert_eq!(guess_type("Makefile"), None);
    }

    #[test]
    fn test_is_textual() {
        assert!(is_textual("text/plain"));
        assert!(is_textual("application/xml"));
        assert!(is_textual("application/json"));
        assert!(!is_textual("image/png"));
    }
}
