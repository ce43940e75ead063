// Configuration module entry point
// Loads settings from file, environment and defaults

mod types;

use std::net::SocketAddr;

pub use types::{Config, HttpConfig, LoggingConfig, PerformanceConfig, ServerConfig};

use crate::error::ConfigError;

/// Environment variable prefix, e.g. `MICROWEB_SERVER__PORT=9000`
pub const ENV_PREFIX: &str = "MICROWEB";

impl Config {
    /// Load configuration from specified file path (without extension)
    /// The file is optional; environment variables override it
    pub fn load_from(config_path: &str) -> Result<Self, ConfigError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(config_path).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.adapter", "hyper")?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("logging.access_log_format", "combined")?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.write_timeout", 30)?
            .set_default("http.server_name", "microweb")?
            .set_default("http.max_body_size", 10_485_760)? // 10MB
            .set_default("http.static_root", "static")?
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.server.host, self.server.port);
        addr.parse()
            .map_err(|e| ConfigError::InvalidAddress(format!("{addr}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults_without_file() {
        let cfg = Config::load_from("/nonexistent/microweb-config").unwrap();
        assert_eq!(cfg.server.adapter, "hyper");
        assert_eq!(cfg.http.max_body_size, 10_485_760);
        assert_eq!(cfg.performance.read_timeout, 30);
        assert_eq!(cfg.logging.access_log_format, "combined");
        assert!(cfg.logging.access_log_file.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.toml");
        fs::write(
            &path,
            "[server]\nport = 9090\nworkers = 2\n\n[http]\nserver_name = \"edge\"\n",
        )
        .unwrap();

        let base = path.with_extension("");
        let cfg = Config::load_from(base.to_str().unwrap()).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.server.workers, Some(2));
        assert_eq!(cfg.http.server_name, "edge");
        assert_eq!(cfg.server.host, "127.0.0.1");
    }

    #[test]
    fn test_invalid_address() {
        let mut cfg = Config::load_from("/nonexistent/microweb-config").unwrap();
        cfg.server.host = "not an ip".to_string();
        assert!(matches!(
            cfg.get_socket_addr(),
            Err(ConfigError::InvalidAddress(_))
        ));
    }
}
