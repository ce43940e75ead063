// Connection handling module
// Accepts a single TCP connection and serves it over HTTP/1.1

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use super::gateway;
use super::ServerContext;
use crate::handler::Application;
use crate::logger;

/// Accept a connection, enforcing `performance.max_connections`.
///
/// Returns `false` when the connection was rejected.
pub fn accept_connection<A: Application + 'static>(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    ctx: &Arc<ServerContext<A>>,
) -> bool {
    // Increment counter first, then check limit
    let prev_count = ctx.active_connections.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = ctx.config.performance.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            ctx.active_connections.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!(
                "max connections reached: {prev_count}/{max_conn}, rejecting {peer_addr}"
            );
            drop(stream);
            return false;
        }
    }

    logger::log_connection_accepted(&peer_addr);
    handle_connection(stream, peer_addr, Arc::clone(ctx));
    true
}

/// Serve the connection in a spawned task until it closes or times out.
///
/// The active connection counter is decremented when the task ends.
fn handle_connection<A: Application + 'static>(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    ctx: Arc<ServerContext<A>>,
) {
    tokio::spawn(async move {
        let io = TokioIo::new(stream);

        let performance = &ctx.config.performance;
        let timeout_duration = Duration::from_secs(std::cmp::max(
            performance.read_timeout,
            performance.write_timeout,
        ));

        let mut builder = http1::Builder::new();
        builder.keep_alive(performance.keep_alive_timeout > 0);

        let service_ctx = Arc::clone(&ctx);
        let conn = builder.serve_connection(
            io,
            service_fn(move |req| gateway::handle_request(req, Arc::clone(&service_ctx), peer_addr)),
        );

        match tokio::time::timeout(timeout_duration, conn).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => logger::log_connection_error(&err),
            Err(_) => {
                tracing::warn!(
                    "connection from {peer_addr} timed out after {} seconds",
                    timeout_duration.as_secs()
                );
            }
        }

        ctx.active_connections.fetch_sub(1, Ordering::SeqCst);
    });
}
