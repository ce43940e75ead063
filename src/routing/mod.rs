//! Routing module
//!
//! Provides the route registry built at application setup:
//! - Regex route patterns with named captures
//! - Per-method, registration-ordered bindings (first match wins)
//! - Status code → error handler bindings

mod matcher;
mod registry;

pub use matcher::{add_slash, Captures, Matcher};
pub use registry::{App, AppBuilder, ErrorHandler, Handler, Method, RouteBinding};
