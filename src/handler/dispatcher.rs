//! Request dispatch module
//!
//! Entry point of the core: builds the request, resolves the route, runs the
//! handler and sends every failure through the error pipeline.

use hyper::body::Bytes;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::pipeline;
use super::Application;
use crate::error::{EnvironmentError, HandlerPanic};
use crate::http::{Response, StartResponse};
use crate::request::{Environ, Request};
use crate::routing::App;

/// Dispatches transactions to the handlers of one [`App`]
#[derive(Debug, Clone)]
pub struct Dispatcher {
    app: Arc<App>,
}

impl Dispatcher {
    pub const fn new(app: Arc<App>) -> Self {
        Self { app }
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    /// Produce the response for `request`
    ///
    /// Routing failures, handler errors and handler panics all end up in the
    /// error pipeline, so a response is always returned.
    pub fn dispatch(&self, request: &mut Request) -> Response {
        match self.route_and_handle(request) {
            Ok(response) => response,
            Err(error) => pipeline::handle_error(&self.app, request, &error),
        }
    }

    fn route_and_handle(&self, request: &mut Request) -> anyhow::Result<Response> {
        let (binding, captures) = self.app.find_route(request.method(), request.path())?;
        tracing::debug!(
            method = request.method(),
            path = request.path(),
            pattern = binding.pattern(),
            "route matched"
        );

        panic::catch_unwind(AssertUnwindSafe(|| binding.call(request, &captures))).unwrap_or_else(
            |payload| Err(HandlerPanic::new(pipeline::panic_message(payload.as_ref())).into()),
        )
    }
}

impl Application for Dispatcher {
    fn call(
        &self,
        environ: Environ,
        start_response: &mut StartResponse<'_>,
    ) -> Result<Bytes, EnvironmentError> {
        let mut request = Request::new(environ)?;
        let response = self.dispatch(&mut request);
        response.send(start_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RequestError;
    use crate::routing::Captures;
    use std::io::{self, Write};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl SharedSink {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Sent {
        status: String,
        headers: Vec<(String, String)>,
        body: Bytes,
        diagnostics: String,
    }

    impl Sent {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str())
        }
    }

    fn demo_app() -> Dispatcher {
        let app = App::builder()
            .get("/", |_: &mut Request, _: &Captures| Ok("index"))
            .get("/hello/(?P<name>\\w+)", |_: &mut Request, caps: &Captures| {
                Ok(format!("Hello, {}!", caps["name"]))
            })
            .get("/json", |_: &mut Request, _: &Captures| {
                Ok(Response::new("{}").with_content_type("application/json"))
            })
            .get("/moved", |_: &mut Request, _: &Captures| -> anyhow::Result<Response> {
                Err(RequestError::redirect("/hello/world/").into())
            })
            .get("/fail", |_: &mut Request, _: &Captures| -> anyhow::Result<Response> {
                Err(RequestError::app_error("Something broke").into())
            })
            .get("/panic", |_: &mut Request, _: &Captures| -> anyhow::Result<Response> {
                panic!("handler exploded")
            })
            .post("/echo", |request: &mut Request, _: &Captures| {
                let name = request.post()?.get_str("name").unwrap_or("nobody").to_string();
                Ok(name)
            })
            .build()
            .unwrap();
        Dispatcher::new(Arc::new(app))
    }

    fn call(dispatcher: &Dispatcher, environ: Environ) -> Sent {
        let sink = SharedSink::default();
        let environ = environ.with_errors(sink.clone());
        let mut status = String::new();
        let mut headers = Vec::new();
        let body = dispatcher
            .call(environ, &mut |s: &str, h: &[(String, String)]| {
                status = s.to_string();
                headers = h.to_vec();
            })
            .unwrap();
        Sent {
            status,
            headers,
            body,
            diagnostics: sink.contents(),
        }
    }

    fn get(path: &str) -> Environ {
        Environ::new().with_method("GET").with_path(path)
    }

    #[test]
    fn test_plain_content_gets_default_response() {
        let sent = call(&demo_app(), get("/"));
        assert_eq!(sent.status, "200 OK");
        assert_eq!(sent.header("Content-Type"), Some("text/html; charset=utf-8"));
        assert_eq!(sent.body, Bytes::from("index"));
    }

    #[test]
    fn test_captures_become_handler_arguments() {
        let dispatcher = demo_app();
        let a = call(&dispatcher, get("/hello/ada"));
        let b = call(&dispatcher, get("/hello/ada/"));
        assert_eq!(a.body, Bytes::from("Hello, ada!"));
        assert_eq!(a.body, b.body);
    }

    #[test]
    fn test_explicit_response_is_kept() {
        let sent = call(&demo_app(), get("/json"));
        assert_eq!(
            sent.header("Content-Type"),
            Some("application/json; charset=utf-8")
        );
    }

    #[test]
    fn test_unregistered_method_is_404() {
        let sent = call(&demo_app(), Environ::new().with_method("DELETE").with_path("/"));
        assert_eq!(sent.status, "404 NOT FOUND");
        assert_eq!(sent.body, Bytes::from("Not found"));
        assert!(sent.diagnostics.is_empty());
    }

    #[test]
    fn test_unmatched_path_is_404() {
        let sent = call(&demo_app(), get("/nope"));
        assert_eq!(sent.status, "404 NOT FOUND");
        assert_eq!(sent.header("Content-Type"), Some("text/plain; charset=utf-8"));
    }

    #[test]
    fn test_redirect_from_handler() {
        let sent = call(&demo_app(), get("/moved"));
        assert_eq!(sent.status, "302 FOUND");
        assert_eq!(sent.header("Location"), Some("/hello/world/"));
        assert!(sent.body.is_empty());
        assert!(sent.diagnostics.is_empty());
    }

    #[test]
    fn test_app_error_is_500_with_diagnostic() {
        let sent = call(&demo_app(), get("/fail"));
        assert_eq!(sent.status, "500 INTERNAL SERVER ERROR");
        assert_eq!(sent.body, Bytes::from("Internal server error"));
        assert!(sent
            .diagnostics
            .starts_with("AppError occurred on \"/fail/\": Something broke"));
    }

    #[test]
    fn test_handler_panic_is_contained() {
        let sent = call(&demo_app(), get("/panic"));
        assert_eq!(sent.status, "500 INTERNAL SERVER ERROR");
        assert!(sent.diagnostics.starts_with("Panic occurred on \"/panic/\""));
        assert!(sent.diagnostics.contains("handler exploded"));
    }

    #[test]
    fn test_post_form_reaches_handler() {
        let environ = Environ::new()
            .with_method("POST")
            .with_path("/echo")
            .with_content_type("application/x-www-form-urlencoded")
            .with_body("name=grace");
        let sent = call(&demo_app(), environ);
        assert_eq!(sent.body, Bytes::from("grace"));
    }

    #[test]
    fn test_custom_not_found_handler() {
        let app = App::builder()
            .on_error(404, |request: &mut Request, _: &anyhow::Error| {
                Response::new(format!("no page at {}", request.path()))
                    .with_status(404)
                    .with_content_type("text/plain")
            })
            .build()
            .unwrap();
        let sent = call(&Dispatcher::new(Arc::new(app)), get("/x"));
        assert_eq!(sent.status, "404 NOT FOUND");
        assert_eq!(sent.body, Bytes::from("no page at /x/"));
    }

    fn static_app(root: &std::path::Path) -> Dispatcher {
        let root = root.to_path_buf();
        let app = App::builder()
            .get(
                r"/static/(?P<name>[\w\-]+(?:\.[\w\-]+)*)",
                move |_: &mut Request, caps: &Captures| {
                    Ok(crate::handler::static_file(
                        caps.get("name").map(String::as_str),
                        &root,
                        None,
                    )?)
                },
            )
            .build()
            .unwrap();
        Dispatcher::new(Arc::new(app))
    }

    #[test]
    fn test_static_file_is_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.js"), "run()").unwrap();
        let sent = call(&static_app(dir.path()), get("/static/app.js"));
        assert_eq!(sent.status, "200 OK");
        assert_eq!(sent.body, Bytes::from("run()"));
    }

    #[test]
    fn test_missing_static_file_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let sent = call(&static_app(dir.path()), get("/static/missing.css"));
        assert_eq!(sent.status, "404 NOT FOUND");
        assert_eq!(sent.body, Bytes::from("Not found"));
        assert!(sent.diagnostics.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_static_file_is_403() {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locked.txt");
        fs::write(&path, "locked").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();
        // Privileged users can read the file anyway
        if fs::File::open(&path).is_ok() {
            return;
        }

        let sent = call(&static_app(dir.path()), get("/static/locked.txt"));
        assert_eq!(sent.status, "403 FORBIDDEN");
        assert_eq!(sent.body, Bytes::from("Forbidden"));
        assert!(sent
            .diagnostics
            .starts_with("Forbidden occurred on \"/static/locked.txt/\""));
    }

    #[test]
    fn test_malformed_environment_is_not_handled() {
        let result = demo_app().call(
            Environ::new().with_method("BAD METHOD"),
            &mut |_: &str, _: &[(String, String)]| {},
        );
        assert!(matches!(result, Err(EnvironmentError::InvalidMethod(_))));
    }
}
