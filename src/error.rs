//! Error types
//!
//! Three families of failures exist:
//! - [`EnvironmentError`]: the transaction handed over by the gateway cannot
//!   be turned into a request (or a response cannot be encoded). Fatal for
//!   that transaction, never seen by the error pipeline.
//! - [`RequestError`]: recoverable HTTP conditions raised by routing or by
//!   handlers. Resolved to a response by the error pipeline.
//! - [`ConfigError`] / [`ServeError`]: startup failures.
//!
//! Handlers return `anyhow::Result`, so anything that is not a
//! `RequestError` is treated as an unclassified 500.

use std::backtrace::Backtrace;
use thiserror::Error;

/// Malformed transaction environment
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("invalid request method {0:?}")]
    InvalidMethod(String),

    #[error("invalid request path {0:?}")]
    InvalidPath(String),

    #[error("request path is not valid UTF-8 after percent-decoding")]
    PathEncoding,

    #[error("header {0:?} contains non-ASCII characters")]
    NonAsciiHeader(String),
}

/// Kind of a [`RequestError`], which fixes its status code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Forbidden,
    NotFound,
    AppError,
    Redirect { url: String },
    /// Any other status chosen by the application
    Status(u16),
}

/// Recoverable HTTP condition raised during routing or handling
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RequestError {
    kind: ErrorKind,
    message: String,
    hide_traceback: bool,
}

impl RequestError {
    fn new(kind: ErrorKind, message: impl Into<String>, hide_traceback: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            hide_traceback,
        }
    }

    /// 403, traceback shown
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message, false)
    }

    /// 404, traceback hidden
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message, true)
    }

    /// 500, traceback shown
    pub fn app_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AppError, message, false)
    }

    /// 302 to `url`, traceback hidden
    pub fn redirect(url: impl Into<String>) -> Self {
        let url = url.into();
        let message = format!("Redirecting to '{url}'...");
        Self::new(ErrorKind::Redirect { url }, message, true)
    }

    /// Arbitrary status, traceback shown
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Status(status), message, false)
    }

    /// Override whether the pipeline writes a diagnostic record
    #[must_use]
    pub const fn hide_traceback(mut self, hide: bool) -> Self {
        self.hide_traceback = hide;
        self
    }

    pub const fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn is_traceback_hidden(&self) -> bool {
        self.hide_traceback
    }

    pub const fn status(&self) -> u16 {
        match &self.kind {
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::AppError => 500,
            ErrorKind::Redirect { .. } => 302,
            ErrorKind::Status(status) => *status,
        }
    }

    /// Target of a redirect, if this is one
    pub fn redirect_url(&self) -> Option<&str> {
        match &self.kind {
            ErrorKind::Redirect { url } => Some(url),
            _ => None,
        }
    }

    /// Name used in diagnostic records
    pub const fn kind_name(&self) -> &'static str {
        match self.kind {
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AppError => "AppError",
            ErrorKind::Redirect { .. } => "Redirect",
            ErrorKind::Status(_) => "RequestError",
        }
    }
}

/// A handler panicked; the payload message is kept when it is a string
#[derive(Debug, Error)]
#[error("handler panicked: {message}")]
pub struct HandlerPanic {
    pub message: String,
    /// Stack of the dispatching thread, rendered where the panic was caught
    pub trace: String,
}

impl HandlerPanic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: Backtrace::force_capture().to_string(),
        }
    }
}

/// Startup configuration failure
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid route pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error(transparent)]
    Settings(#[from] ::config::ConfigError),
}

/// Failure to start or run the gateway
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("adapter '{0}' is not supported, please choose a different adapter")]
    UnknownAdapter(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
