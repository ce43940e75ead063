//! Request handler module
//!
//! Responsible for request dispatch, error resolution and static file
//! serving. Gateways only see the [`Application`] trait.

pub mod dispatcher;
pub mod pipeline;
pub mod static_files;

use hyper::body::Bytes;

use crate::error::EnvironmentError;
use crate::http::StartResponse;
use crate::request::Environ;

pub use dispatcher::Dispatcher;
pub use static_files::static_file;

/// Callable contract between a gateway and the framework
///
/// The gateway passes one transaction and a callback that receives the
/// status line and headers; the returned bytes are the response body.
pub trait Application: Send + Sync {
    fn call(
        &self,
        environ: Environ,
        start_response: &mut StartResponse<'_>,
    ) -> Result<Bytes, EnvironmentError>;
}
