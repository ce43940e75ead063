//! HTTP protocol layer module
//!
//! Response values, reason phrases and MIME guessing, independent of any
//! gateway.

pub mod mime;
pub mod response;
pub mod status;

// Re-export commonly used types
pub use response::{Body, Response, StartResponse, DEFAULT_CONTENT_TYPE};
pub use status::{reason_phrase, status_line};
