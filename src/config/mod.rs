//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

use serde::Deserialize;

use crate::bus::MqttConfig;
use crate::device::LifxConfig;
use crate::discovery::DiscoveryConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "LIFX_BRIDGE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "LIFX_BRIDGE";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "LIFX_BRIDGE_LOG";

/// Legacy flat environment variables, applied last.
pub const TOPIC_PREFIX_ENV_VAR: &str = "TOPIC_PREFIX";
pub const MQTT_RETAIN_ENV_VAR: &str = "MQTT_RETAIN";
pub const MQTT_HOST_ENV_VAR: &str = "MQTT_HOST";
pub const MQTT_USER_ENV_VAR: &str = "MQTT_USER";
pub const MQTT_PASS_ENV_VAR: &str = "MQTT_PASS";

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid config value for '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Main application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// First segment of every device topic.
    pub topic_prefix: String,
    /// Broker connection.
    pub mqtt: MqttConfig,
    /// Sweep timing and eviction.
    pub discovery: DiscoveryConfig,
    /// LIFX LAN transport.
    pub lifx: LifxConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            topic_prefix: "lifx".to_string(),
            mqtt: MqttConfig::default(),
            discovery: DiscoveryConfig::default(),
            lifx: LifxConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    /// 5. Legacy flat variables (`TOPIC_PREFIX`, `MQTT_HOST`, ...)
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(CONFIG_ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        // Legacy env vars for backwards compatibility
        let legacy = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        builder = builder
            .set_override_option("topic_prefix", legacy(TOPIC_PREFIX_ENV_VAR))?
            .set_override_option("mqtt.retain", legacy(MQTT_RETAIN_ENV_VAR))?
            .set_override_option("mqtt.username", legacy(MQTT_USER_ENV_VAR))?
            .set_override_option("mqtt.password", legacy(MQTT_PASS_ENV_VAR))?;

        if let Some(value) = legacy(MQTT_HOST_ENV_VAR) {
            let (host, port) = parse_broker_address(&value)?;
            builder = builder
                .set_override("mqtt.host", host)?
                .set_override_option("mqtt.port", port.map(i64::from))?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Reject values the bridge cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topic_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "topic_prefix",
                reason: "must not be empty".to_string(),
            });
        }
        if self.topic_prefix.contains(['+', '#']) {
            return Err(ConfigError::Invalid {
                key: "topic_prefix",
                reason: "must not contain MQTT wildcards".to_string(),
            });
        }
        if self.mqtt.qos > 2 {
            return Err(ConfigError::Invalid {
                key: "mqtt.qos",
                reason: format!("{} is not 0, 1 or 2", self.mqtt.qos),
            });
        }
        if self.discovery.interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "discovery.interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Split a broker address into host and optional port.
///
/// Accepts `mqtt://host:port`, `tcp://host`, `host:port` and a bare host.
pub fn parse_broker_address(value: &str) -> Result<(String, Option<u16>), ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        key: "mqtt.host",
        reason,
    };

    let rest = match value.split_once("://") {
        Some((_scheme, rest)) => rest,
        None => value,
    };
    let authority = rest.split('/').next().unwrap_or_default();
    let authority = match authority.rsplit_once('@') {
        Some((_credentials, host)) => host,
        None => authority,
    };

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|e| invalid(format!("bad port in '{value}': {e}")))?;
            (host, Some(port))
        }
        None => (authority, None),
    };

    if host.is_empty() {
        return Err(invalid(format!("no host in '{value}'")));
    }
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;

    use super::*;

    const ENV_VARS: &[&str] = &[
        CONFIG_ENV_VAR,
        TOPIC_PREFIX_ENV_VAR,
        MQTT_RETAIN_ENV_VAR,
        MQTT_HOST_ENV_VAR,
        MQTT_USER_ENV_VAR,
        MQTT_PASS_ENV_VAR,
        "LIFX_BRIDGE__MQTT__PORT",
        "LIFX_BRIDGE__DISCOVERY__INTERVAL_SECS",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.topic_prefix, "lifx");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.discovery.interval_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_without_sources_uses_defaults() {
        clear_env();
        let config = Config::load(None).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        clear_env();
        let file = yaml_file(
            "topic_prefix: home\nmqtt:\n  host: broker.lan\n  retain: false\ndiscovery:\n  interval_secs: 60\n",
        );

        let config = Config::load(file.path().to_str()).unwrap();

        assert_eq!(config.topic_prefix, "home");
        assert_eq!(config.mqtt.host, "broker.lan");
        assert!(!config.mqtt.retain);
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.discovery.interval_secs, 60);
        assert_eq!(config.discovery.sweep_wait_ms, 10_000);
    }

    #[test]
    #[serial]
    fn test_load_missing_explicit_file_fails() {
        clear_env();
        let result = Config::load(Some("/nonexistent/lifx-bridge.yaml"));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    #[serial]
    fn test_prefixed_env_overrides_file() {
        clear_env();
        let file = yaml_file("mqtt:\n  port: 1884\n");
        std::env::set_var("LIFX_BRIDGE__MQTT__PORT", "8883");

        let config = Config::load(file.path().to_str());
        clear_env();

        assert_eq!(config.unwrap().mqtt.port, 8883);
    }

    #[test]
    #[serial]
    fn test_legacy_env_overrides() {
        clear_env();
        std::env::set_var(TOPIC_PREFIX_ENV_VAR, "bulbs");
        std::env::set_var(MQTT_RETAIN_ENV_VAR, "false");
        std::env::set_var(MQTT_HOST_ENV_VAR, "mqtt://10.0.0.5:1999");
        std::env::set_var(MQTT_USER_ENV_VAR, "bridge");
        std::env::set_var(MQTT_PASS_ENV_VAR, "secret");

        let config = Config::load(None);
        clear_env();
        let config = config.unwrap();

        assert_eq!(config.topic_prefix, "bulbs");
        assert!(!config.mqtt.retain);
        assert_eq!(config.mqtt.host, "10.0.0.5");
        assert_eq!(config.mqtt.port, 1999);
        assert_eq!(config.mqtt.username.as_deref(), Some("bridge"));
        assert_eq!(config.mqtt.password.as_deref(), Some("secret"));
    }

    #[test]
    #[serial]
    fn test_legacy_bare_host_keeps_port() {
        clear_env();
        std::env::set_var(MQTT_HOST_ENV_VAR, "broker");

        let config = Config::load(None);
        clear_env();
        let config = config.unwrap();

        assert_eq!(config.mqtt.host, "broker");
        assert_eq!(config.mqtt.port, 1883);
    }

    #[test]
    fn test_parse_broker_address() {
        assert_eq!(
            parse_broker_address("mqtt://broker:1883").unwrap(),
            ("broker".to_string(), Some(1883))
        );
        assert_eq!(
            parse_broker_address("tcp://user:pw@broker/").unwrap(),
            ("broker".to_string(), None)
        );
        assert_eq!(
            parse_broker_address("broker.lan").unwrap(),
            ("broker.lan".to_string(), None)
        );
        assert!(parse_broker_address("mqtt://broker:notaport").is_err());
        assert!(parse_broker_address("mqtt://").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let empty_prefix = Config {
            topic_prefix: " ".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            empty_prefix.validate(),
            Err(ConfigError::Invalid { key: "topic_prefix", .. })
        ));

        let mut bad_qos = Config::default();
        bad_qos.mqtt.qos = 3;
        assert!(matches!(
            bad_qos.validate(),
            Err(ConfigError::Invalid { key: "mqtt.qos", .. })
        ));

        let mut zero_interval = Config::default();
        zero_interval.discovery.interval_secs = 0;
        assert!(matches!(
            zero_interval.validate(),
            Err(ConfigError::Invalid {
                key: "discovery.interval_secs",
                ..
            })
        ));
    }
}
