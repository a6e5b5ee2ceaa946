//! Client configuration: where the server lives and how often to poll it.
//!
//! Resolution order:
//! 1. An explicit config file path
//! 2. `$PROPERTYESTIMATOR_CONFIG`
//! 3. `<config dir>/propertyestimator/client.toml` (XDG on Linux, Library on macOS)
//! 4. Built-in defaults (`localhost:8000`, 5 second polling)
//!
//! `PROPERTYESTIMATOR_SERVER_ADDRESS` and `PROPERTYESTIMATOR_SERVER_PORT`
//! override whatever the file says.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::client::ClientError;

pub const CONFIG_ENV: &str = "PROPERTYESTIMATOR_CONFIG";
pub const SERVER_ADDRESS_ENV: &str = "PROPERTYESTIMATOR_SERVER_ADDRESS";
pub const SERVER_PORT_ENV: &str = "PROPERTYESTIMATOR_SERVER_PORT";

const DEFAULT_SERVER_ADDRESS: &str = "localhost";
const DEFAULT_SERVER_PORT: u16 = 8000;
const DEFAULT_POLLING_INTERVAL_SECS: f64 = 5.0;

/// Address of a running estimator server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    pub server_address: String,
    pub server_port: u16,
}

impl ConnectionOptions {
    /// # Errors
    ///
    /// Returns [`ClientError::MissingServerAddress`] if `server_address` is
    /// empty.
    pub fn new(server_address: &str, server_port: u16) -> Result<Self, ClientError> {
        let options = Self {
            server_address: server_address.to_string(),
            server_port,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.server_address.trim().is_empty() {
            return Err(ClientError::MissingServerAddress);
        }
        Ok(())
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
            server_port: DEFAULT_SERVER_PORT,
        }
    }
}

/// Settings read from `client.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub connection: ConnectionOptions,
    /// Seconds between queries when waiting for results.
    pub polling_interval: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionOptions::default(),
            polling_interval: DEFAULT_POLLING_INTERVAL_SECS,
        }
    }
}

impl ClientConfig {
    /// Load the configuration following the resolution order above.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        {
            Some(path) => Self::from_file(&path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    tracing::debug!("No client config found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides()?;
        config.connection.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        tracing::debug!("Loaded client config from {}", path.display());
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(address) = std::env::var(SERVER_ADDRESS_ENV) {
            self.connection.server_address = address;
        }
        if let Ok(port) = std::env::var(SERVER_PORT_ENV) {
            self.connection.server_port = port
                .parse()
                .with_context(|| format!("Invalid {} value: {}", SERVER_PORT_ENV, port))?;
        }
        Ok(())
    }
}

/// Resolve the default config file location.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("propertyestimator").join("client.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn clear_env() {
        std::env::remove_var(CONFIG_ENV);
        std::env::remove_var(SERVER_ADDRESS_ENV);
        std::env::remove_var(SERVER_PORT_ENV);
    }

    fn config_file(address: &str, port: u16) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "polling_interval = 1.5\n\n[connection]\nserver_address = \"{}\"\nserver_port = {}",
            address, port
        )
        .unwrap();
        file
    }

    #[test]
    fn test_connection_defaults() {
        let options = ConnectionOptions::default();
        assert_eq!(options.server_address, "localhost");
        assert_eq!(options.server_port, 8000);
    }

    #[test]
    fn test_empty_address_rejected() {
        assert!(matches!(
            ConnectionOptions::new("", 8000),
            Err(ClientError::MissingServerAddress)
        ));
        assert!(matches!(
            ConnectionOptions::new("   ", 8000),
            Err(ClientError::MissingServerAddress)
        ));
        assert!(ConnectionOptions::new("cluster.example.org", 9000).is_ok());
    }

    #[test]
    fn test_from_file_with_partial_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "polling_interval = 0.5\n\n[connection]\nserver_address = \"compute-01\""
        )
        .unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.polling_interval, 0.5);
        assert_eq!(config.connection.server_address, "compute-01");
        assert_eq!(config.connection.server_port, 8000);
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "polling_interval = \"often\"").unwrap();

        let err = ClientConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path_format() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("propertyestimator/client.toml"));
        }
    }

    #[test]
    #[serial]
    fn test_load_explicit_path_beats_env_var() {
        clear_env();
        let from_env = config_file("from-env", 9001);
        let explicit = config_file("from-explicit", 9002);
        std::env::set_var(CONFIG_ENV, from_env.path());

        let config = ClientConfig::load(Some(explicit.path())).unwrap();
        clear_env();

        assert_eq!(config.connection.server_address, "from-explicit");
        assert_eq!(config.connection.server_port, 9002);
        assert_eq!(config.polling_interval, 1.5);
    }

    #[test]
    #[serial]
    fn test_load_uses_env_var_path() {
        clear_env();
        let from_env = config_file("from-env", 9001);
        std::env::set_var(CONFIG_ENV, from_env.path());

        let config = ClientConfig::load(None).unwrap();
        clear_env();

        assert_eq!(config.connection.server_address, "from-env");
        assert_eq!(config.connection.server_port, 9001);
    }

    #[test]
    #[serial]
    fn test_load_env_overrides_address_and_port() {
        clear_env();
        let file = config_file("compute-01", 9001);
        std::env::set_var(SERVER_ADDRESS_ENV, "compute-02");
        std::env::set_var(SERVER_PORT_ENV, "9100");

        let config = ClientConfig::load(Some(file.path())).unwrap();
        clear_env();

        assert_eq!(config.connection.server_address, "compute-02");
        assert_eq!(config.connection.server_port, 9100);
        assert_eq!(config.polling_interval, 1.5);
    }

    #[test]
    #[serial]
    fn test_load_rejects_invalid_port_override() {
        clear_env();
        let file = config_file("compute-01", 9001);
        std::env::set_var(SERVER_PORT_ENV, "eighty");

        let err = ClientConfig::load(Some(file.path())).unwrap_err();
        clear_env();

        assert!(err.to_string().contains(SERVER_PORT_ENV));
    }

    #[test]
    #[serial]
    fn test_load_rejects_empty_address_override() {
        clear_env();
        let file = config_file("compute-01", 9001);
        std::env::set_var(SERVER_ADDRESS_ENV, "");

        let err = ClientConfig::load(Some(file.path())).unwrap_err();
        clear_env();

        assert!(matches!(
            err.downcast_ref::<ClientError>(),
            Some(ClientError::MissingServerAddress)
        ));
    }
}
