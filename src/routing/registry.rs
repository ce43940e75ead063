//! Route registry module
//!
//! An [`App`] holds the route table and the error handler table. It is built
//! once through [`AppBuilder`] before serving starts and is read-only
//! afterwards, so it can be shared between workers behind an `Arc`.

use std::collections::HashMap;
use std::fmt;

use super::matcher::{add_slash, Captures, Matcher};
use crate::error::{ConfigError, RequestError};
use crate::handler::pipeline;
use crate::http::Response;
use crate::request::Request;

/// Route handler: receives the request and the named captures of its pattern
pub type Handler = Box<dyn Fn(&mut Request, &Captures) -> anyhow::Result<Response> + Send + Sync>;

/// Error handler: receives the request and the failure being resolved
pub type ErrorHandler = Box<dyn Fn(&mut Request, &anyhow::Error) -> Response + Send + Sync>;

/// Methods a route can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Parse an upper-case method name
    pub fn parse(method: &str) -> Option<Self> {
        match method {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (method, pattern) → handler binding
pub struct RouteBinding {
    method: Method,
    matcher: Matcher,
    handler: Handler,
}

impl RouteBinding {
    pub const fn method(&self) -> Method {
        self.method
    }

    pub fn pattern(&self) -> &str {
        self.matcher.pattern()
    }

    pub fn call(&self, request: &mut Request, captures: &Captures) -> anyhow::Result<Response> {
        (self.handler)(request, captures)
    }
}

impl fmt::Debug for RouteBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteBinding")
            .field("method", &self.method)
            .field("pattern", &self.matcher.pattern())
            .finish_non_exhaustive()
    }
}

/// Immutable routing and error-handling tables of an application
pub struct App {
    routes: HashMap<Method, Vec<RouteBinding>>,
    error_handlers: HashMap<u16, ErrorHandler>,
}

impl App {
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    /// Find the first binding for `method` whose pattern matches `path`
    ///
    /// Bindings are tried in registration order; the first match wins even
    /// when a later pattern would be more specific.
    pub fn find_route(
        &self,
        method: &str,
        path: &str,
    ) -> Result<(&RouteBinding, Captures), RequestError> {
        let bindings = Method::parse(method)
            .and_then(|m| self.routes.get(&m))
            .ok_or_else(|| {
                RequestError::not_found(format!("Http method {method} is not supported"))
            })?;

        let path = add_slash(path);
        bindings
            .iter()
            .find_map(|binding| {
                binding
                    .matcher
                    .captures(&path)
                    .map(|captures| (binding, captures))
            })
            .ok_or_else(|| RequestError::not_found("Nothing here"))
    }

    /// Registered handler for `status`, if any
    pub fn error_handler(&self, status: u16) -> Option<&ErrorHandler> {
        self.error_handlers.get(&status)
    }

    /// Bindings of one method in match order
    pub fn routes(&self, method: Method) -> &[RouteBinding] {
        self.routes.get(&method).map_or(&[], Vec::as_slice)
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut statuses: Vec<_> = self.error_handlers.keys().collect();
        statuses.sort_unstable();
        f.debug_struct("App")
            .field("routes", &self.routes)
            .field("error_handlers", &statuses)
            .finish()
    }
}

/// Collects bindings and produces an [`App`]
pub struct AppBuilder {
    routes: HashMap<Method, Vec<RouteBinding>>,
    error_handlers: HashMap<u16, ErrorHandler>,
    invalid: Option<ConfigError>,
}

impl AppBuilder {
    /// Empty builder with the default 302 handler pre-registered
    pub fn new() -> Self {
        let builder = Self {
            routes: HashMap::new(),
            error_handlers: HashMap::new(),
            invalid: None,
        };
        builder.on_error(302, pipeline::redirect)
    }

    /// Bind `handler` to `method` and `pattern`
    ///
    /// A pattern that fails to compile is reported by [`AppBuilder::build`].
    #[must_use]
    pub fn on<F, R>(mut self, method: Method, pattern: &str, handler: F) -> Self
    where
        F: Fn(&mut Request, &Captures) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Into<Response>,
    {
        match Matcher::compile(pattern) {
            Ok(matcher) => {
                let handler: Handler =
                    Box::new(move |request, captures| handler(request, captures).map(Into::into));
                self.routes.entry(method).or_default().push(RouteBinding {
                    method,
                    matcher,
                    handler,
                });
            }
            Err(e) => {
                if self.invalid.is_none() {
                    self.invalid = Some(e);
                }
            }
        }
        self
    }

    #[must_use]
    pub fn get<F, R>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(&mut Request, &Captures) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Into<Response>,
    {
        self.on(Method::Get, pattern, handler)
    }

    #[must_use]
    pub fn post<F, R>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(&mut Request, &Captures) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Into<Response>,
    {
        self.on(Method::Post, pattern, handler)
    }

    #[must_use]
    pub fn put<F, R>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(&mut Request, &Captures) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Into<Response>,
    {
        self.on(Method::Put, pattern, handler)
    }

    #[must_use]
    pub fn delete<F, R>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(&mut Request, &Captures) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Into<Response>,
    {
        self.on(Method::Delete, pattern, handler)
    }

    /// Bind an error handler to `status`, replacing any previous one
    #[must_use]
    pub fn on_error<F, R>(mut self, status: u16, handler: F) -> Self
    where
        F: Fn(&mut Request, &anyhow::Error) -> R + Send + Sync + 'static,
        R: Into<Response>,
    {
        let handler: ErrorHandler = Box::new(move |request, error| handler(request, error).into());
        self.error_handlers.insert(status, handler);
        self
    }

    /// Finish registration; fails on the first invalid pattern
    pub fn build(self) -> Result<App, ConfigError> {
        if let Some(e) = self.invalid {
            return Err(e);
        }
        Ok(App {
            routes: self.routes,
            error_handlers: self.error_handlers,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn named(tag: &'static str) -> impl Fn(&mut Request, &Captures) -> anyhow::Result<&'static str> {
        move |_, _| Ok(tag)
    }

    #[test]
    fn test_find_route_with_and_without_trailing_slash() {
        let app = App::builder()
            .get("/posts/(?P<slug>[a-z-]+)", named("post"))
            .build()
            .unwrap();

        let (a, caps_a) = app.find_route("GET", "/posts/hello-world").unwrap();
        let (b, caps_b) = app.find_route("GET", "/posts/hello-world/").unwrap();
        assert!(std::ptr::eq(a, b));
        assert_eq!(caps_a, caps_b);
        assert_eq!(caps_a.get("slug").map(String::as_str), Some("hello-world"));
    }

    #[test]
    fn test_registration_order_wins() {
        let app = App::builder()
            .get("/items/(?P<name>.+)", named("generic"))
            .get("/items/(?P<id>\\d+)", named("numeric"))
            .build()
            .unwrap();

        let (binding, caps) = app.find_route("GET", "/items/7").unwrap();
        assert_eq!(binding.pattern(), "/items/(?P<name>.+)");
        assert!(caps.contains_key("name"));
        assert!(!caps.contains_key("id"));
    }

    #[test]
    fn test_unsupported_method() {
        let app = App::builder().get("/", named("index")).build().unwrap();

        let err = app.find_route("POST", "/").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NotFound);
        assert_eq!(err.message(), "Http method POST is not supported");

        let err = app.find_route("PATCH", "/").unwrap_err();
        assert_eq!(err.message(), "Http method PATCH is not supported");
    }

    #[test]
    fn test_nothing_matches() {
        let app = App::builder().get("/", named("index")).build().unwrap();
        let err = app.find_route("GET", "/missing").unwrap_err();
        assert_eq!(err.status(), 404);
        assert_eq!(err.message(), "Nothing here");
    }

    #[test]
    fn test_methods_are_partitioned() {
        let app = App::builder()
            .get("/thing", named("get"))
            .post("/thing", named("post"))
            .put("/thing", named("put"))
            .delete("/thing", named("delete"))
            .build()
            .unwrap();

        for method in [Method::Get, Method::Post, Method::Put, Method::Delete] {
            assert_eq!(app.routes(method).len(), 1);
            let (binding, _) = app.find_route(method.as_str(), "/thing").unwrap();
            assert_eq!(binding.method(), method);
        }
    }

    #[test]
    fn test_invalid_pattern_fails_build() {
        let result = App::builder()
            .get("/ok", named("ok"))
            .get("/bad/(unclosed", named("bad"))
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidPattern { .. })));
    }

    #[test]
    fn test_redirect_handler_preregistered_and_overridable() {
        let app = App::builder().build().unwrap();
        assert!(app.error_handler(302).is_some());
        assert!(app.error_handler(404).is_none());

        let app = App::builder()
            .on_error(404, |_, _| "first")
            .on_error(404, |_, _| "second")
            .build()
            .unwrap();
        let handler = app.error_handler(404).unwrap();
        let mut request = Request::new(crate::request::Environ::new()).unwrap();
        let err = anyhow::Error::from(RequestError::not_found("x"));
        assert_eq!(handler(&mut request, &err), Response::new("second"));
    }
}
