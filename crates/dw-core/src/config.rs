//! Configuration management for doorway

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::descriptor::DoorDescriptor;
use crate::error::ConfigError;

/// Configuration for the doorway daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the TCP listener to
    pub bind_address: String,

    /// Maximum concurrent sessions (nodes)
    pub max_sessions: usize,

    /// How long a session may sit idle before the sweep closes it
    #[serde(with = "serde_utils::duration_secs")]
    pub idle_timeout: Duration,

    /// Interval between idle sweeps
    #[serde(with = "serde_utils::duration_secs")]
    pub sweep_interval: Duration,

    /// How long to wait for the option handshake before falling back to
    /// defaults
    #[serde(with = "serde_utils::duration_secs")]
    pub negotiation_timeout: Duration,

    /// Grace period for in-flight output during shutdown
    #[serde(with = "serde_utils::duration_secs")]
    pub shutdown_grace: Duration,

    /// Root directory for per-launch door work directories
    pub door_work_dir: PathBuf,

    /// Board name written into drop files
    pub bbs_name: String,

    /// Sysop name written into drop files
    pub sysop_name: String,

    /// Door descriptors keyed by menu slug
    #[serde(default)]
    pub doors: HashMap<String, DoorDescriptor>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:2323".to_string(),
            max_sessions: 8,
            idle_timeout: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(30),
            negotiation_timeout: Duration::from_secs(4),
            shutdown_grace: Duration::from_secs(5),
            door_work_dir: PathBuf::from("/tmp/doorway"),
            bbs_name: "Doorway BBS".to_string(),
            sysop_name: "Sysop".to_string(),
            doors: HashMap::new(),
        }
    }
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

/// Shared serialization helpers for configuration types
pub mod serde_utils {
    /// Serialize `std::time::Duration` as integer seconds, which reads
    /// naturally in TOML.
    pub mod duration_secs {
        use serde::{self, Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        /// Serialize a Duration as seconds (u64)
        pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.serialize_u64(duration.as_secs())
        }

        /// Deserialize a Duration from seconds (u64)
        pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
        where
            D: Deserializer<'de>,
        {
            let secs = u64::deserialize(deserializer)?;
            Ok(Duration::from_secs(secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.max_sessions, 8);
        assert_eq!(config.idle_timeout, Duration::from_secs(600));
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert!(config.doors.is_empty());
    }

    #[test]
    fn test_parse_with_door_table() {
        let toml_src = r#"
            bind_address = "127.0.0.1:2323"
            max_sessions = 2
            idle_timeout = 120

            [doors.lord]
            name = "Legend of the Red Dragon"
            command = "/opt/doors/lord/start.sh"
            dropfile = "door_sys"
            min_security = 10
        "#;
        let config: ServerConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:2323");
        assert_eq!(config.max_sessions, 2);
        assert_eq!(config.idle_timeout, Duration::from_secs(120));
        // Unspecified fields keep their defaults
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert!(config.doors.contains_key("lord"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doorway.toml");

        let mut config = ServerConfig::default();
        config.max_sessions = 4;
        config.bbs_name = "Test Board".to_string();

        save_config(&path, &config).unwrap();
        let loaded: ServerConfig = load_config(&path).unwrap();
        assert_eq!(loaded.max_sessions, 4);
        assert_eq!(loaded.bbs_name, "Test Board");
    }

    #[test]
    fn test_load_missing_file() {
        let result: Result<ServerConfig, _> = load_config(Path::new("/nonexistent/doorway.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }
}
