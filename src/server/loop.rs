// Server loop module
// Accepts connections until shutdown, then waits for in-flight ones

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use super::connection::accept_connection;
use super::signal::Shutdown;
use super::ServerContext;
use crate::handler::Application;

/// Poll interval while waiting for connections to finish
const DRAIN_POLL: Duration = Duration::from_millis(50);

/// Accept connections on `listener` until `shutdown` is triggered
pub async fn start_server_loop<A: Application + 'static>(
    listener: TcpListener,
    ctx: Arc<ServerContext<A>>,
    shutdown: Arc<Shutdown>,
) {
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(stream, peer_addr, &ctx);
                    }
                    Err(e) => {
                        tracing::error!("failed to accept connection: {e}");
                        // Back off on errors like EMFILE
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }

            () = shutdown.wait() => {
                tracing::info!("shutdown requested, closing listener");
                break;
            }
        }
    }

    drop(listener);

    let grace = Duration::from_secs(ctx.config.performance.write_timeout);
    drain_connections(&ctx, grace).await;
}

/// Wait until no connection is active or `grace` has elapsed
async fn drain_connections<A>(ctx: &ServerContext<A>, grace: Duration) {
    let deadline = tokio::time::Instant::now() + grace;

    loop {
        let active = ctx.active_connections.load(Ordering::SeqCst);
        if active == 0 {
            tracing::info!("all connections closed");
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!("{active} connection(s) still open after {} seconds, exiting", grace.as_secs());
            return;
        }
        tokio::time::sleep(DRAIN_POLL).await;
    }
}
