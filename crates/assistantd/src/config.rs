//! Server configuration.

use std::time::Duration;

/// Default wire port, shared with the reference client.
pub const DEFAULT_PORT: u16 = 6771;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Delay between bind attempts. Bind failures are retried forever.
    pub bind_retry: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            bind_retry: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 6771);
        assert_eq!(config.bind_retry, Duration::from_secs(5));
    }
}
