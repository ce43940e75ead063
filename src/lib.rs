//! microweb: a small regex-routed web framework
//!
//! Register handlers on an [`AppBuilder`], then hand the built [`App`] to
//! [`serve`] or wrap it in a [`Dispatcher`] and drive it through the
//! [`Application`] contract from any gateway.
//!
//! ```
//! use microweb::{App, RequestError};
//!
//! let app = App::builder()
//!     .get(r"/hello/(?P<name>\w+)", |_req, caps| Ok(format!("Hello, {}!", caps["name"])))
//!     .get("/old", |_req, _caps| -> anyhow::Result<String> {
//!         Err(RequestError::redirect("/hello/world").into())
//!     })
//!     .build()
//!     .unwrap();
//! assert_eq!(app.routes(microweb::Method::Get).len(), 2);
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod logger;
pub mod request;
pub mod routing;
pub mod server;

pub use config::Config;
pub use error::{ConfigError, EnvironmentError, ErrorKind, RequestError, ServeError};
pub use handler::{static_file, Application, Dispatcher};
pub use http::{Body, Response};
pub use request::{Environ, Request};
pub use routing::{App, AppBuilder, Captures, Method};
pub use server::serve;
