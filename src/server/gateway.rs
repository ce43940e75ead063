// Gateway module
// Translates hyper requests into transaction environments and back

use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Body as _, Bytes, Incoming};
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, REFERER, SERVER, USER_AGENT,
};
use hyper::{Request, Response, StatusCode, Version};
use percent_encoding::percent_decode_str;
use std::convert::Infallible;
use std::io::{self, Cursor, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use super::ServerContext;
use crate::error::EnvironmentError;
use crate::handler::Application;
use crate::http::status::default_error_body;
use crate::logger::{self, AccessLogEntry};
use crate::request::Environ;

type HttpResponse = Response<Full<Bytes>>;

/// Serve one hyper request through the application
pub async fn handle_request<A: Application + 'static>(
    req: Request<Incoming>,
    ctx: Arc<ServerContext<A>>,
    remote_addr: SocketAddr,
) -> Result<HttpResponse, Infallible> {
    let started = Instant::now();
    let mut entry = access_entry(&req, remote_addr);

    let response = process(req, &ctx).await;

    if ctx.config.logging.access_log {
        let body_bytes = response.body().size_hint().exact().unwrap_or(0);
        let body_bytes = usize::try_from(body_bytes).unwrap_or(usize::MAX);
        entry.finish(response.status().as_u16(), body_bytes, started.elapsed());
        logger::log_access(&entry, &ctx.config.logging.access_log_format);
    }

    Ok(response)
}

async fn process<A: Application + 'static>(
    req: Request<Incoming>,
    ctx: &ServerContext<A>,
) -> HttpResponse {
    let server_name = ctx.config.http.server_name.as_str();
    let max_body_size = ctx.config.http.max_body_size;

    if let Some(status) = check_body_size(req.headers(), max_body_size) {
        return bare_response(status, server_name);
    }

    let mut environ = match build_environ(&req) {
        Ok(environ) => environ,
        Err(e) => return environment_failure(&e, server_name),
    };

    let limit = usize::try_from(max_body_size).unwrap_or(usize::MAX);
    let body = match Limited::new(req.into_body(), limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::warn!("failed to read request body: {e}");
            let status = if e.is::<http_body_util::LengthLimitError>() { 413 } else { 400 };
            return bare_response(status, server_name);
        }
    };
    environ.content_length.get_or_insert_with(|| body.len().to_string());
    environ.input = Box::new(Cursor::new(body));

    let app = Arc::clone(&ctx.app);
    let outcome = tokio::task::spawn_blocking(move || {
        let mut head: Option<(String, Vec<(String, String)>)> = None;
        let body = app.call(environ, &mut |status: &str, headers: &[(String, String)]| {
            head = Some((status.to_string(), headers.to_vec()));
        });
        (body, head)
    })
    .await;

    match outcome {
        Ok((Ok(body), Some((status, headers)))) => {
            build_response(&status, &headers, body, server_name)
        }
        Ok((Ok(_), None)) => {
            tracing::error!("application returned a body without starting the response");
            bare_response(500, server_name)
        }
        Ok((Err(e), _)) => environment_failure(&e, server_name),
        Err(e) => {
            tracing::error!("application task failed: {e}");
            bare_response(500, server_name)
        }
    }
}

/// Declared `Content-Length` above the limit is rejected before reading
fn check_body_size(headers: &HeaderMap, max_body_size: u64) -> Option<u16> {
    let declared = headers.get(CONTENT_LENGTH)?.to_str().ok()?;
    match declared.parse::<u64>() {
        Ok(size) if size > max_body_size => {
            tracing::warn!("request body too large: {size} bytes (max: {max_body_size})");
            Some(413)
        }
        _ => None,
    }
}

/// Environment of one transaction; the body is attached once collected
fn build_environ(req: &Request<Incoming>) -> Result<Environ, EnvironmentError> {
    let path = percent_decode_str(req.uri().path())
        .decode_utf8()
        .map_err(|_| EnvironmentError::PathEncoding)?;

    let mut environ = Environ::new();
    environ.method = Some(req.method().as_str().to_string());
    environ.path_info = Some(path.into_owned());
    environ.script_name = Some(String::new());
    environ.query_string = req.uri().query().map(ToString::to_string);
    environ.content_length = header_str(req, CONTENT_LENGTH);
    environ.content_type = header_str(req, CONTENT_TYPE);
    environ.headers = req
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    environ.errors = Box::new(DiagnosticSink::default());
    Ok(environ)
}

fn header_str(req: &Request<Incoming>, name: HeaderName) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

fn build_response(
    status_line: &str,
    headers: &[(String, String)],
    body: Bytes,
    server_name: &str,
) -> HttpResponse {
    let Some(status) = parse_status(status_line) else {
        tracing::error!("application sent an invalid status line {status_line:?}");
        return bare_response(500, server_name);
    };

    let mut builder = Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Ok(value) = HeaderValue::from_str(server_name) {
        builder = builder.header(SERVER, value);
    }

    builder.body(Full::new(body)).unwrap_or_else(|e| {
        tracing::error!("application sent an invalid response head: {e}");
        bare_response(500, server_name)
    })
}

/// Status code from a line like `"404 NOT FOUND"`
fn parse_status(status_line: &str) -> Option<StatusCode> {
    let code = status_line.split_whitespace().next()?.parse::<u16>().ok()?;
    StatusCode::from_u16(code).ok()
}

fn environment_failure(error: &EnvironmentError, server_name: &str) -> HttpResponse {
    tracing::error!("malformed transaction: {error}");
    let status = match error {
        EnvironmentError::NonAsciiHeader(_) => 500,
        EnvironmentError::InvalidMethod(_)
        | EnvironmentError::InvalidPath(_)
        | EnvironmentError::PathEncoding => 400,
    };
    bare_response(status, server_name)
}

/// Plain-text response produced by the gateway itself
fn bare_response(status: u16, server_name: &str) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::from(default_error_body(status))));
    *response.status_mut() =
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    if let Ok(value) = HeaderValue::from_str(server_name) {
        response.headers_mut().insert(SERVER, value);
    }
    response
}

fn access_entry(req: &Request<Incoming>, remote_addr: SocketAddr) -> AccessLogEntry {
    let mut entry = AccessLogEntry::new(
        remote_addr.ip().to_string(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.query = req.uri().query().map(ToString::to_string);
    entry.http_version = match req.version() {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2.0",
        Version::HTTP_3 => "3.0",
        _ => "1.1",
    }
    .to_string();
    entry.referer = header_str(req, REFERER);
    entry.user_agent = header_str(req, USER_AGENT);
    entry
}

/// Diagnostic stream handed to the application
///
/// Bytes are buffered and emitted as one error record per flush.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    buffer: Vec<u8>,
}

impl Write for DiagnosticSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            logger::log_diagnostic(&String::from_utf8_lossy(&self.buffer));
            self.buffer.clear();
        }
        Ok(())
    }
}

impl Drop for DiagnosticSink {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
