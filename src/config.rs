use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Rows fetched per table preview.
    pub preview_limit: u64,
    /// Upper bound on waiting for a driver to acknowledge close.
    pub close_timeout_secs: u64,
    /// Capacity of the event broadcast behind `/api/events`.
    pub event_buffer: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Try to load from .env file
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("logging.level", "info")?
            .set_default("gateway.preview_limit", 5)?
            .set_default("gateway.close_timeout_secs", 5)?
            .set_default("gateway.event_buffer", 256)?;

        // Load from environment variables
        if let Ok(host) = env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            builder = builder.set_override("server.port", port.parse::<u16>().unwrap_or(3000))?;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        if let Ok(limit) = env::var("PREVIEW_LIMIT") {
            builder = builder.set_override("gateway.preview_limit", limit.parse::<u64>().unwrap_or(5))?;
        }

        if let Ok(secs) = env::var("CLOSE_TIMEOUT_SECS") {
            builder = builder.set_override(
                "gateway.close_timeout_secs",
                secs.parse::<u64>().unwrap_or(5),
            )?;
        }

        if let Ok(buffer) = env::var("EVENT_BUFFER") {
            builder = builder.set_override("gateway.event_buffer", buffer.parse::<u64>().unwrap_or(256))?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::from_env();
        assert!(config.is_ok());

        let config = config.unwrap();
        assert!(config.gateway.event_buffer > 0);
        assert!(config.server_address().contains(':'));
    }

    #[test]
    fn test_gateway_settings_from_config() {
        let gateway = GatewayConfig {
            preview_limit: 10,
            close_timeout_secs: 2,
            event_buffer: 16,
        };
        let settings = crate::services::GatewaySettings::from(&gateway);
        assert_eq!(settings.preview_limit, 10);
        assert_eq!(settings.close_timeout, std::time::Duration::from_secs(2));
    }
}
