//! Request adapter module
//!
//! Normalizes a transaction [`Environ`] into a [`Request`]:
//! - Method upper-cased (default `GET`), path slash-terminated
//! - Query parameters parsed eagerly
//! - Body and form parameters read lazily, at most once

mod environ;
pub mod multipart;
mod params;

pub use environ::Environ;
pub use params::{parse_urlencoded, FileUpload, ParamValue, Params};

use hyper::body::Bytes;
use std::fmt;
use std::io::{self, Read, Write};

use crate::error::EnvironmentError;
use crate::routing::add_slash;

/// Upper bound on the buffer reserved up front for a body
const MAX_PREALLOC: usize = 64 * 1024;

/// One incoming request, owned by its transaction
pub struct Request {
    path: String,
    script_name: String,
    method: String,
    query: String,
    content_length: usize,
    content_type: Option<String>,
    user: Option<String>,
    headers: Vec<(String, String)>,
    get: Params,
    form: Option<Params>,
    body: Option<Bytes>,
    input: Box<dyn Read + Send>,
    errors: Box<dyn Write + Send>,
}

impl Request {
    /// Build a request from a transaction environment
    ///
    /// Fails when the method is not an HTTP token or the path is not
    /// absolute. An unparsable content length is treated as 0.
    pub fn new(environ: Environ) -> Result<Self, EnvironmentError> {
        let method = environ
            .method
            .unwrap_or_else(|| "GET".to_string())
            .to_ascii_uppercase();
        if method.is_empty() || !method.bytes().all(is_token_char) {
            return Err(EnvironmentError::InvalidMethod(method));
        }

        let path_info = environ.path_info.unwrap_or_default();
        if !path_info.is_empty() && !path_info.starts_with('/') {
            return Err(EnvironmentError::InvalidPath(path_info));
        }
        let path = add_slash(&path_info).into_owned();

        let query = environ.query_string.unwrap_or_default();
        let content_length = environ
            .content_length
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        let get = parse_urlencoded(query.as_bytes());

        Ok(Self {
            path,
            script_name: environ.script_name.unwrap_or_default(),
            method,
            query,
            content_length,
            content_type: environ.content_type,
            user: environ.remote_user,
            headers: environ.headers,
            get,
            form: None,
            body: None,
            input: environ.input,
            errors: environ.errors,
        })
    }

    /// Path below the script prefix, always ending with `/`
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Raw query string, without the leading `?`
    pub fn query(&self) -> &str {
        &self.query
    }

    pub const fn content_length(&self) -> usize {
        self.content_length
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Authenticated user name as reported by the gateway
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First header value with this name, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Query string parameters
    pub const fn get_params(&self) -> &Params {
        &self.get
    }

    /// Raw body, read from the input stream on first access
    pub fn body(&mut self) -> io::Result<&Bytes> {
        if self.body.is_none() {
            let limit = u64::try_from(self.content_length).unwrap_or(u64::MAX);
            let mut buf = Vec::with_capacity(self.content_length.min(MAX_PREALLOC));
            (&mut self.input).take(limit).read_to_end(&mut buf)?;
            self.body = Some(Bytes::from(buf));
        }
        Ok(self.body.get_or_insert_with(Bytes::new))
    }

    /// Form parameters of a POST body, parsed on first access
    pub fn post(&mut self) -> io::Result<&Params> {
        self.form()
    }

    /// Form parameters of a PUT body, parsed on first access
    pub fn put(&mut self) -> io::Result<&Params> {
        self.form()
    }

    fn form(&mut self) -> io::Result<&Params> {
        if self.form.is_none() {
            let body = self.body()?.clone();
            let params = parse_form(self.content_type.as_deref(), &body);
            self.form = Some(params);
        }
        Ok(self.form.get_or_insert_with(Params::new))
    }

    /// Write to the transaction's diagnostic stream
    pub fn write_error(&mut self, message: &str) {
        let result = self
            .errors
            .write_all(message.as_bytes())
            .and_then(|()| self.errors.flush());
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to write diagnostic record");
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("script_name", &self.script_name)
            .field("query", &self.query)
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Decode a form body according to its content type
fn parse_form(content_type: Option<&str>, body: &Bytes) -> Params {
    let Some(content_type) = content_type else {
        return Params::new();
    };
    let mime = content_type.split(';').next().unwrap_or("").trim();
    if mime.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
        parse_urlencoded(body)
    } else if let Some(boundary) = multipart::boundary(content_type) {
        multipart::into_params(multipart::parse(body, &boundary))
    } else {
        Params::new()
    }
}

/// RFC 9110 `tchar`
const fn is_token_char(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~'
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Input stream that counts how many times it is read
    struct CountingReader {
        inner: io::Cursor<Vec<u8>>,
        reads: Arc<AtomicUsize>,
    }

    impl Read for CountingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read(buf)
        }
    }

    #[test]
    fn test_defaults() {
        let request = Request::new(Environ::new()).unwrap();
        assert_eq!(request.method(), "GET");
        assert_eq!(request.path(), "/");
        assert_eq!(request.query(), "");
        assert_eq!(request.content_length(), 0);
        assert!(request.get_params().is_empty());
        assert!(request.user().is_none());
    }

    #[test]
    fn test_method_is_upper_cased_and_path_slashed() {
        let request = Request::new(Environ::new().with_method("post").with_path("/users/1")).unwrap();
        assert_eq!(request.method(), "POST");
        assert_eq!(request.path(), "/users/1/");
    }

    #[test]
    fn test_bad_content_length_is_zero() {
        let mut environ = Environ::new();
        environ.content_length = Some("twelve".to_string());
        let request = Request::new(environ).unwrap();
        assert_eq!(request.content_length(), 0);
    }

    #[test]
    fn test_malformed_environment() {
        let err = Request::new(Environ::new().with_method("GE T")).unwrap_err();
        assert!(matches!(err, EnvironmentError::InvalidMethod(_)));

        let err = Request::new(Environ::new().with_path("no-slash")).unwrap_err();
        assert!(matches!(err, EnvironmentError::InvalidPath(_)));
    }

    #[test]
    fn test_get_params_parsed_eagerly() {
        let request = Request::new(Environ::new().with_query("a=1&a=2&b=3")).unwrap();
        let params = request.get_params();
        assert_eq!(params.get("a").unwrap().values(), vec!["1", "2"]);
        assert_eq!(params.get_str("b"), Some("3"));
    }

    #[test]
    fn test_body_respects_content_length() {
        let mut environ = Environ::new().with_body("hello world");
        environ.content_length = Some("5".to_string());
        let mut request = Request::new(environ).unwrap();
        assert_eq!(&request.body().unwrap()[..], b"hello");
    }

    #[test]
    fn test_post_is_memoized() {
        let reads = Arc::new(AtomicUsize::new(0));
        let data = b"name=ann&tag=a&tag=b".to_vec();
        let mut environ = Environ::new()
            .with_method("POST")
            .with_content_type("application/x-www-form-urlencoded");
        environ.content_length = Some(data.len().to_string());
        environ.input = Box::new(CountingReader {
            inner: io::Cursor::new(data),
            reads: Arc::clone(&reads),
        });
        let mut request = Request::new(environ).unwrap();

        let first = request.post().unwrap().clone();
        let reads_after_first = reads.load(Ordering::SeqCst);
        let second = request.post().unwrap().clone();

        assert_eq!(first, second);
        assert_eq!(first.get_str("name"), Some("ann"));
        assert_eq!(first.get("tag").unwrap().values(), vec!["a", "b"]);
        assert!(reads_after_first > 0);
        assert_eq!(reads.load(Ordering::SeqCst), reads_after_first);

        // PUT shares the parsed body
        assert_eq!(request.put().unwrap(), &first);
        assert_eq!(reads.load(Ordering::SeqCst), reads_after_first);
    }

    #[test]
    fn test_multipart_post() {
        let body = "--XyZ\r\n\
                    Content-Disposition: form-data; name=\"caption\"\r\n\r\n\
                    sunset\r\n\
                    --XyZ\r\n\
                    Content-Disposition: form-data; name=\"photo\"; filename=\"sun.png\"\r\n\
                    Content-Type: image/png\r\n\r\n\
                    PNGDATA\r\n\
                    --XyZ--\r\n";
        let environ = Environ::new()
            .with_method("POST")
            .with_content_type("multipart/form-data; boundary=XyZ")
            .with_body(body);
        let mut request = Request::new(environ).unwrap();
        let params = request.post().unwrap();

        assert_eq!(params.get_str("caption"), Some("sunset"));
        let photo = params.get("photo").and_then(ParamValue::as_file).unwrap();
        assert_eq!(photo.filename, "sun.png");
        assert_eq!(photo.content_type.as_deref(), Some("image/png"));
        assert_eq!(&photo.data[..], b"PNGDATA");
    }

    #[test]
    fn test_unknown_content_type_yields_no_params() {
        let environ = Environ::new()
            .with_method("PUT")
            .with_content_type("application/json")
            .with_body("{\"a\":1}");
        let mut request = Request::new(environ).unwrap();
        assert!(request.put().unwrap().is_empty());
        assert_eq!(&request.body().unwrap()[..], b"{\"a\":1}");
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = Request::new(Environ::new().with_header("X-Token", "abc")).unwrap();
        assert_eq!(request.header("x-token"), Some("abc"));
        assert_eq!(request.header("missing"), None);
    }
}
