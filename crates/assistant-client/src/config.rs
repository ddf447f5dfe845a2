//! Client configuration: a TOML file with a `[client]` section.
//!
//! Missing config is not an error path the client guesses through: a
//! default file is written and the process exits asking the user to verify
//! host and port before the first real connection.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6771;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub client: ClientSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSection {
    pub host: String,
    pub port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client: ClientSection {
                host: DEFAULT_HOST.to_string(),
                port: DEFAULT_PORT,
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file {0} created, verify host/port before reconnecting")]
    Created(PathBuf),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render default config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("no config directory available on this platform")]
    NoConfigDir,
}

/// Per-user config location, e.g. `~/.config/assistant/client.toml`.
pub fn default_path() -> Result<PathBuf, ConfigError> {
    let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(dir.join("assistant").join("client.toml"))
}

/// Load the config, writing a default file on first run.
///
/// First run is reported as `ConfigError::Created` so the caller exits and
/// the user can verify the defaults.
pub fn load_or_create(path: &Path) -> Result<ClientConfig, ConfigError> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let rendered = toml::to_string_pretty(&ClientConfig::default())?;
        fs::write(path, rendered)?;
        return Err(ConfigError::Created(path.to_path_buf()));
    }

    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_run_creates_defaults_and_reports_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assistant").join("client.toml");

        let err = load_or_create(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Created(_)));
        assert!(path.exists());

        // Second run parses the file just written.
        let config = load_or_create(&path).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.client.host, "127.0.0.1");
        assert_eq!(config.client.port, 6771);
    }

    #[test]
    fn custom_values_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        fs::write(&path, "[client]\nhost = \"10.0.0.7\"\nport = 7000\n").unwrap();

        let config = load_or_create(&path).unwrap();
        assert_eq!(config.client.host, "10.0.0.7");
        assert_eq!(config.client.port, 7000);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        fs::write(&path, "[client\nhost =").unwrap();

        let err = load_or_create(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
