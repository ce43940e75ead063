use microweb::{config, logger, static_file, App, Config, RequestError, Response};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Optional config path (without extension) as the first argument
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config".to_string());
    let cfg = Config::load_from(&config_path)?;
    logger::init(&cfg.logging)?;

    if cfg.server.workers.is_none() {
        tracing::info!("Using default worker threads (CPU cores)");
    }

    let app = build_app(&cfg.http)?;
    microweb::serve(app, &cfg)?;
    Ok(())
}

/// Slash-separated names made of word characters, `-` and inner dots
///
/// No segment may be empty or start with a dot, so `..` and hidden files
/// never reach the static root.
const STATIC_ROUTE: &str =
    r"/static/(?P<name>[\w\-]+(?:\.[\w\-]+)*(?:/[\w\-]+(?:\.[\w\-]+)*)*)";

fn build_app(http: &config::HttpConfig) -> Result<App, microweb::ConfigError> {
    let static_root = http.static_root.clone();

    App::builder()
        .get("/", |_req, _caps| Ok("<h1>microweb</h1><p>It works.</p>"))
        .get(r"/hello/(?P<name>[^/]+)", |req, caps| {
            let greeting = req.get_params().get_str("greeting").unwrap_or("Hello");
            Ok(format!("{greeting}, {}!", caps["name"]))
        })
        .post("/echo", |req, _caps| {
            let form = req.post()?;
            let mut lines: Vec<String> = form
                .iter()
                .map(|(name, value)| format!("{name} = {}", value.values().join(", ")))
                .collect();
            lines.sort();
            Ok(Response::new(lines.join("\n")).with_content_type("text/plain"))
        })
        .get("/old", |_req, _caps| -> anyhow::Result<Response> {
            Err(RequestError::redirect("/").into())
        })
        .get("/private", |_req, _caps| -> anyhow::Result<Response> {
            Err(RequestError::forbidden("Private area").into())
        })
        .get(STATIC_ROUTE, move |_req, caps| {
            Ok(static_file(
                caps.get("name").map(String::as_str),
                static_root.as_str(),
                None,
            )?)
        })
        .on_error(404, |req, _err| {
            Response::new(format!("Nothing lives at {}", req.path()))
                .with_status(404)
                .with_content_type("text/plain")
        })
        .build()
}
