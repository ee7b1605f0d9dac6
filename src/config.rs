//! Service configuration.
//!
//! Settings are read from `venue-review.toml` and layered:
//! file → environment → CLI flags. Every key is optional.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3142
//! dev_mode = false
//!
//! [database]
//! path = ".venue-review/review.db"
//!
//! [notifications]
//! channel_capacity = 256
//!
//! [logging]
//! filter = "venue_review=info"
//! json = false
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "venue-review.toml";

pub const ENV_PORT: &str = "VENUE_REVIEW_PORT";
pub const ENV_DB: &str = "VENUE_REVIEW_DB";
pub const ENV_LOG: &str = "VENUE_REVIEW_LOG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS and bind on all interfaces.
    #[serde(default)]
    pub dev_mode: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev_mode: false,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3142
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".venue-review/review.db")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSection {
    /// Buffered events per subscriber before slow clients start lagging.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for NotificationSection {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> usize {
    256
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

fn default_filter() -> String {
    "venue_review=info".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub notifications: NotificationSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Values given on the command line. `None` leaves the lower layer alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
    pub dev_mode: bool,
    pub log_filter: Option<String>,
    pub json_logs: bool,
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse venue-review.toml")
    }

    /// Load `path` if it exists, otherwise the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize venue-review.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = lookup(ENV_PORT) {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("{} must be a port number, got '{}'", ENV_PORT, port))?;
        }
        if let Some(db) = lookup(ENV_DB).filter(|v| !v.trim().is_empty()) {
            self.database.path = PathBuf::from(db);
        }
        if let Some(filter) = lookup(ENV_LOG).filter(|v| !v.trim().is_empty()) {
            self.logging.filter = filter;
        }
        Ok(())
    }

    pub fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(path) = &cli.db_path {
            self.database.path = path.clone();
        }
        if cli.dev_mode {
            self.server.dev_mode = true;
        }
        if let Some(filter) = &cli.log_filter {
            self.logging.filter = filter.clone();
        }
        if cli.json_logs {
            self.logging.json = true;
        }
    }

    /// Resolve the effective configuration: file, then env, then CLI.
    pub fn resolve(path: &Path, cli: &CliOverrides) -> Result<Self> {
        let mut config = Self::load_or_default(path)?;
        config.apply_env()?;
        config.apply_cli(cli);
        Ok(config)
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; the OS will pick a random port".to_string());
        }
        if self.server.host.trim().is_empty() {
            warnings.push("server.host is empty".to_string());
        }
        if self.database.path.as_os_str().is_empty() {
            warnings.push("database.path is empty".to_string());
        }
        if self.notifications.channel_capacity == 0 {
            warnings.push(
                "notifications.channel_capacity is 0; it will be raised to 1".to_string(),
            );
        }
        if self.logging.filter.trim().is_empty() {
            warnings.push("logging.filter is empty; nothing will be logged".to_string());
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3142);
        assert!(!config.server.dev_mode);
        assert_eq!(config.database.path, PathBuf::from(".venue-review/review.db"));
        assert_eq!(config.notifications.channel_capacity, 256);
        assert_eq!(config.logging.filter, "venue_review=info");
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let config = ServiceConfig::parse(
            r#"
            [server]
            port = 8080

            [logging]
            json = true
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(config.logging.json);
        assert_eq!(config.logging.filter, "venue_review=info");
        assert_eq!(config.notifications.channel_capacity, 256);
    }

    #[test]
    fn test_parse_empty_file() {
        assert_eq!(ServiceConfig::parse("").unwrap(), ServiceConfig::default());
    }

    #[test]
    fn test_parse_invalid_toml() {
        assert!(ServiceConfig::parse("[server\nport = ").is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let mut config = ServiceConfig::default();
        config.server.port = 4000;
        config.database.path = PathBuf::from("/var/lib/venue/review.db");
        config.save(&path).unwrap();

        let loaded = ServiceConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempdir().unwrap();
        let config = ServiceConfig::load_or_default(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_env_overrides_file() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_PORT, "9100"),
            (ENV_DB, "/tmp/other.db"),
            (ENV_LOG, "debug"),
        ]);
        let mut config = ServiceConfig::parse("[server]\nport = 8080").unwrap();
        config
            .apply_env_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.database.path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.logging.filter, "debug");
    }

    #[test]
    fn test_env_port_must_be_numeric() {
        let mut config = ServiceConfig::default();
        let err = config
            .apply_env_from(|key| (key == ENV_PORT).then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_PORT));
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut config = ServiceConfig::default();
        config
            .apply_env_from(|key| (key == ENV_PORT).then(|| "9100".to_string()))
            .unwrap();
        config.apply_cli(&CliOverrides {
            port: Some(9200),
            dev_mode: true,
            json_logs: true,
            ..Default::default()
        });
        assert_eq!(config.server.port, 9200);
        assert!(config.server.dev_mode);
        assert!(config.logging.json);
        assert_eq!(config.database.path, default_db_path());
    }

    #[test]
    fn test_validate_warnings() {
        let mut config = ServiceConfig::default();
        config.server.port = 0;
        config.notifications.channel_capacity = 0;
        config.logging.filter = "  ".into();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().any(|w| w.contains("server.port")));
        assert!(warnings.iter().any(|w| w.contains("channel_capacity")));
        assert!(warnings.iter().any(|w| w.contains("logging.filter")));
    }
}
