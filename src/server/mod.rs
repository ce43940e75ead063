// Server module entry point
// Runs an application behind the hyper gateway

pub mod connection;
pub mod gateway;
pub mod listener;
pub mod signal;

// Rust does not allow `loop` as a module name
#[path = "loop.rs"]
pub mod server_loop;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

pub use listener::create_reusable_listener;
pub use server_loop::start_server_loop;
pub use signal::Shutdown;

use crate::config::Config;
use crate::error::ServeError;
use crate::handler::{Application, Dispatcher};
use crate::logger;
use crate::routing::App;

/// Key of the built-in gateway adapter
pub const HYPER_ADAPTER: &str = "hyper";

/// State shared by every connection of one server
#[derive(Debug)]
pub struct ServerContext<A> {
    pub app: Arc<A>,
    pub config: Config,
    pub active_connections: AtomicUsize,
}

impl<A> ServerContext<A> {
    pub fn new(app: Arc<A>, config: Config) -> Self {
        Self {
            app,
            config,
            active_connections: AtomicUsize::new(0),
        }
    }
}

/// Serve `app` with the adapter named by `server.adapter`
///
/// Blocks until the process receives SIGINT or SIGTERM.
pub fn serve(app: App, config: &Config) -> Result<(), ServeError> {
    match config.server.adapter.as_str() {
        HYPER_ADAPTER => serve_hyper(Dispatcher::new(Arc::new(app)), config.clone()),
        other => Err(ServeError::UnknownAdapter(other.to_string())),
    }
}

fn serve_hyper<A: Application + 'static>(app: A, config: Config) -> Result<(), ServeError> {
    let addr = config.get_socket_addr()?;

    // Worker threads default to the number of CPU cores
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = config.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async move {
        let listener = create_reusable_listener(addr, listener::DEFAULT_BACKLOG)?;
        logger::log_server_start(&addr, &config);

        let shutdown = Arc::new(Shutdown::new());
        signal::start_signal_handler(Arc::clone(&shutdown));

        let ctx = Arc::new(ServerContext::new(Arc::new(app), config));
        start_server_loop(listener, ctx, shutdown).await;
        Ok::<(), ServeError>(())
    })
}
