//! Response building module
//!
//! A [`Response`] is what handlers return (directly, or through `Into` from
//! plain content). It is mutable until [`Response::send`] serializes it into
//! the gateway's shape: a status line, ordered header pairs and body bytes.

use hyper::body::Bytes;

use super::status;
use crate::error::EnvironmentError;

/// Gateway callback receiving the status line and header pairs
pub type StartResponse<'a> = dyn FnMut(&str, &[(String, String)]) + 'a;

pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// Response content, kept as text when it is text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Text(String),
    Bytes(Bytes),
}

impl Body {
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Bytes(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Text(text) => Bytes::from(text),
            Self::Bytes(bytes) => bytes,
        }
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

/// Structured HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    body: Body,
    status: u16,
    content_type: String,
    headers: Vec<(String, String)>,
}

impl Response {
    /// 200 `text/html` response with the given content
    pub fn new(body: impl Into<Body>) -> Self {
        Self {
            body: body.into(),
            status: 200,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_header(name, value);
        self
    }

    /// Append a header; existing headers with the same name are kept
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    pub const fn status(&self) -> u16 {
        self.status
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
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

    pub const fn body(&self) -> &Body {
        &self.body
    }

    /// Hand status and headers to the gateway and return the encoded body
    ///
    /// `Content-Type` (with `charset=utf-8`) always comes first, followed by
    /// the headers in the order they were added.
    pub fn send(self, start_response: &mut StartResponse<'_>) -> Result<Bytes, EnvironmentError> {
        let mut headers = Vec::with_capacity(self.headers.len() + 1);
        headers.push((
            "Content-Type".to_string(),
            format!("{}; charset=utf-8", self.content_type),
        ));
        headers.extend(self.headers);

        for (name, value) in &headers {
            if !name.is_ascii() || !value.is_ascii() {
                return Err(EnvironmentError::NonAsciiHeader(name.clone()));
            }
        }

        start_response(&status::status_line(self.status), &headers);
        Ok(self.body.into_bytes())
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new("")
    }
}

impl From<&str> for Response {
    fn from(content: &str) -> Self {
        Self::new(content)
    }
}

impl From<String> for Response {
    fn from(content: String) -> Self {
        Self::new(content)
    }
}

impl From<Vec<u8>> for Response {
    fn from(content: Vec<u8>) -> Self {
        Self::new(content)
    }
}

impl From<Bytes> for Response {
    fn from(content: Bytes) -> Self {
        Self::new(content)
    }
}

impl From<Body> for Response {
    fn from(body: Body) -> Self {
        Self::new(body)
    }
}

impl From<()> for Response {
    fn from((): ()) -> Self {
        Self::default()
    }
}
