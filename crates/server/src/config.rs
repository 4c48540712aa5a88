use common::{Environment, LogLevel};
use detector::DetectorConfig;
use std::env;

/// Server-level configuration snapshot, read once at startup. Detection
/// pipeline settings nest under [`DetectorConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: LogLevel,
    pub environment: Environment,
    pub otel_endpoint: Option<String>,
    pub detector: DetectorConfig,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8000);

        Ok(Self {
            host,
            port,
            log_level: LogLevel::from_env(),
            environment: Environment::from_env(),
            otel_endpoint: env::var("OTEL_ENDPOINT").ok(),
            detector: DetectorConfig::from_env()?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
