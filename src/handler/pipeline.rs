//! Error pipeline
//!
//! Turns any failure raised while routing or handling into a response:
//! 1. Write a diagnostic record unless the failure hides its traceback
//! 2. Derive the status (request errors carry one, anything else is 500)
//! 3. Use the application's handler for that status, if registered
//! 4. Otherwise answer with the plain-text reason phrase

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt::Write as _;
use std::panic::{self, AssertUnwindSafe};

use crate::error::{HandlerPanic, RequestError};
use crate::http::{status, Response};
use crate::request::Request;
use crate::routing::App;

/// Resolve `error` to a response; never fails
pub fn handle_error(app: &App, request: &mut Request, error: &anyhow::Error) -> Response {
    let request_error = error.downcast_ref::<RequestError>();

    if !request_error.is_some_and(RequestError::is_traceback_hidden) {
        write_diagnostic(request, error, request_error);
    }

    let status = request_error.map_or(500, RequestError::status);

    if let Some(handler) = app.error_handler(status) {
        match panic::catch_unwind(AssertUnwindSafe(|| handler(request, error))) {
            Ok(response) => return response,
            Err(payload) => {
                tracing::error!(
                    status,
                    path = request.path(),
                    "error handler panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        }
    }

    default_response(status)
}

/// Plain-text response carrying the capitalized reason phrase
pub fn default_response(status: u16) -> Response {
    Response::new(status::default_error_body(status))
        .with_status(status)
        .with_content_type("text/plain")
}

/// Default handler for 302: empty body and a `Location` header
pub fn redirect(_request: &mut Request, error: &anyhow::Error) -> Response {
    let url = error
        .downcast_ref::<RequestError>()
        .and_then(RequestError::redirect_url)
        .unwrap_or_default();
    Response::new("")
        .with_status(302)
        .with_content_type("text/plain")
        .with_header("Location", url)
}

fn write_diagnostic(request: &mut Request, error: &anyhow::Error, request_error: Option<&RequestError>) {
    let kind = match request_error {
        Some(e) => e.kind_name(),
        None if error.is::<HandlerPanic>() => "Panic",
        None => "Error",
    };
    let record = format!(
        "{kind} occurred on \"{}\": {error}\nTraceback:\n{}\n",
        request.path(),
        traceback(error)
    );
    request.write_error(&record);
}

/// Cause chain followed by a stack trace
///
/// Panics carry the trace taken when they were caught. Other errors use the
/// backtrace `anyhow` recorded, or one taken here when none was.
fn traceback(error: &anyhow::Error) -> String {
    let mut out = String::new();
    for (depth, cause) in error.chain().enumerate() {
        let _ = writeln!(out, "  {depth}: {cause}");
    }

    let trace = match error.downcast_ref::<HandlerPanic>() {
        Some(panic) => panic.trace.clone(),
        None if error.backtrace().status() == BacktraceStatus::Captured => {
            error.backtrace().to_string()
        }
        None => Backtrace::force_capture().to_string(),
    };
    out.push_str(&trace);
    out
}

/// Message of a panic payload, when it is a string
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
