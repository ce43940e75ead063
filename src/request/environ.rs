//! Transaction environment
//!
//! The raw, gateway-agnostic description of one HTTP transaction. Every
//! field is optional the way a gateway may leave it unset; defaults are
//! applied when the [`Request`](super::Request) is built.

use std::fmt;
use std::io::{self, Cursor, Read, Write};

pub struct Environ {
    pub method: Option<String>,
    /// Percent-decoded path below the script prefix
    pub path_info: Option<String>,
    pub script_name: Option<String>,
    pub query_string: Option<String>,
    /// Raw `Content-Length` value as received
    pub content_length: Option<String>,
    pub content_type: Option<String>,
    pub remote_user: Option<String>,
    pub headers: Vec<(String, String)>,
    /// Request body stream
    pub input: Box<dyn Read + Send>,
    /// Diagnostic stream of the transaction
    pub errors: Box<dyn Write + Send>,
}

impl Environ {
    /// Environment with no fields set, an empty body and a discarding error stream
    pub fn new() -> Self {
        Self {
            method: None,
            path_info: None,
            script_name: None,
            query_string: None,
            content_length: None,
            content_type: None,
            remote_user: None,
            headers: Vec::new(),
            input: Box::new(io::empty()),
            errors: Box::new(io::sink()),
        }
    }

    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path_info = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query_string = Some(query.into());
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Use `body` as input and set the content length to match
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        self.content_length = Some(body.len().to_string());
        self.input = Box::new(Cursor::new(body));
        self
    }

    #[must_use]
    pub fn with_errors(mut self, errors: impl Write + Send + 'static) -> Self {
        self.errors = Box::new(errors);
        self
    }
}

impl Default for Environ {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Environ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environ")
            .field("method", &self.method)
            .field("path_info", &self.path_info)
            .field("script_name", &self.script_name)
            .field("query_string", &self.query_string)
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .field("remote_user", &self.remote_user)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
