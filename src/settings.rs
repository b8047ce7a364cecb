//! Resolved logger configuration.
//!
//! A [`Settings`] value is assembled once (defaults, YAML file, explicit
//! overrides, environment), validated, and then shared read-only behind an
//! `Arc`. Reloading builds a new value instead of editing the live one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::env;
use crate::error::ConfigError;
use crate::file::RotationPolicy;
use crate::level::Level;
use crate::pool::PoolConfig;

/// Top-level key wrapping the settings in a YAML document.
pub const ROOT_KEY: &str = "fanlog";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub console_logging: bool,
    /// Primary log file. `null` disables file output.
    pub log_file: Option<PathBuf>,
    pub additional_log_file: Option<PathBuf>,
    pub log_level: Level,
    pub sensitive_data_masking: SensitiveDataMasking,
    pub log_rotation: LogRotation,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
    pub notifications: Notifications,
    pub dispatch: DispatchSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SensitiveDataMasking {
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogRotation {
    pub enabled: bool,
    /// Bytes.
    pub max_size: u64,
    pub backup_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Notifications {
    pub webhook_url: Option<String>,
}

/// Worker pool sizing and timeouts. Fixed for the lifetime of a logger;
/// a reload keeps the pool it already has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchSettings {
    pub workers: usize,
    pub queue_capacity: usize,
    pub enqueue_timeout_ms: u64,
    pub drain_timeout_ms: u64,
    pub notification_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            console_logging: true,
            log_file: Some(PathBuf::from("logs.yml")),
            additional_log_file: None,
            log_level: Level::Info,
            sensitive_data_masking: SensitiveDataMasking::default(),
            log_rotation: LogRotation::default(),
            metrics_enabled: false,
            metrics_port: 8000,
            notifications: Notifications::default(),
            dispatch: DispatchSettings::default(),
        }
    }
}

impl Default for LogRotation {
    fn default() -> Self {
        Self {
            enabled: false,
            max_size: 10 * 1024 * 1024,
            backup_count: 5,
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 1024,
            enqueue_timeout_ms: 50,
            drain_timeout_ms: 5000,
            notification_timeout_ms: 5000,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Document {
    #[serde(default)]
    fanlog: Settings,
}

impl Settings {
    /// Parse a YAML document whose settings live under the `fanlog` key.
    /// Missing keys take their defaults; unknown keys are rejected.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let doc: Document = serde_yaml::from_str(yaml)?;
        doc.fanlog.validated()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Apply one override by dotted key, e.g. `log_rotation.max_size`.
    ///
    /// Only the keys of the settings schema are accepted. List values
    /// (`sensitive_data_masking.fields`) are comma-separated; an empty value
    /// clears an optional path or URL.
    pub fn apply_override(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match key {
            "console_logging" => self.console_logging = parse_bool(key, value)?,
            "log_file" => self.log_file = optional(value).map(PathBuf::from),
            "additional_log_file" => self.additional_log_file = optional(value).map(PathBuf::from),
            "log_level" => self.log_level = value.parse()?,
            "sensitive_data_masking.fields" => {
                self.sensitive_data_masking.fields = value
                    .split(',')
                    .map(str::trim)
                    .filter(|field| !field.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "log_rotation.enabled" => self.log_rotation.enabled = parse_bool(key, value)?,
            "log_rotation.max_size" => self.log_rotation.max_size = parse_num(key, value)?,
            "log_rotation.backup_count" => self.log_rotation.backup_count = parse_num(key, value)?,
            "metrics_enabled" => self.metrics_enabled = parse_bool(key, value)?,
            "metrics_port" => self.metrics_port = parse_num(key, value)?,
            "notifications.webhook_url" => {
                self.notifications.webhook_url = optional(value).map(str::to_string)
            }
            "dispatch.workers" => self.dispatch.workers = parse_num(key, value)?,
            "dispatch.queue_capacity" => self.dispatch.queue_capacity = parse_num(key, value)?,
            "dispatch.enqueue_timeout_ms" => {
                self.dispatch.enqueue_timeout_ms = parse_num(key, value)?
            }
            "dispatch.drain_timeout_ms" => self.dispatch.drain_timeout_ms = parse_num(key, value)?,
            "dispatch.notification_timeout_ms" => {
                self.dispatch.notification_timeout_ms = parse_num(key, value)?
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// Apply several overrides and validate the result.
    pub fn with_overrides<I, K, V>(mut self, overrides: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in overrides {
            self.apply_override(key.as_ref(), value.as_ref())?;
        }
        self.validated()
    }

    /// Apply the `FANLOG_*` environment overrides listed in [`env`].
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(env::overrides_from_env())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_rotation.enabled && self.log_rotation.max_size == 0 {
            return Err(ConfigError::InvalidRotation(
                "max_size must be greater than zero".to_string(),
            ));
        }
        if self.dispatch.workers == 0 {
            return Err(ConfigError::InvalidDispatch(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(ConfigError::InvalidDispatch(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if let Some(url) = &self.notifications.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidWebhookUrl(url.clone()));
            }
            if !cfg!(feature = "webhook") {
                return Err(ConfigError::WebhookFeatureDisabled);
            }
        }
        Ok(())
    }

    fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    pub fn rotation_policy(&self) -> Option<RotationPolicy> {
        self.log_rotation.enabled.then_some(RotationPolicy {
            max_size: self.log_rotation.max_size,
            backup_count: self.log_rotation.backup_count,
        })
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.dispatch.workers,
            queue_capacity: self.dispatch.queue_capacity,
            enqueue_timeout: Duration::from_millis(self.dispatch.enqueue_timeout_ms),
        }
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch.drain_timeout_ms)
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch.notification_timeout_ms)
    }
}

fn optional(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value, "expected a boolean")),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| invalid(key, value, "expected a non-negative integer"))
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert!(settings.console_logging);
        assert_eq!(settings.log_file, Some(PathBuf::from("logs.yml")));
        assert_eq!(settings.log_level, Level::Info);
        assert_eq!(settings.log_rotation.max_size, 10_485_760);
        assert_eq!(settings.log_rotation.backup_count, 5);
        assert_eq!(settings.metrics_port, 8000);
        assert!(settings.rotation_policy().is_none());
    }

    #[test]
    fn parses_nested_yaml() {
        let yaml = r#"
fanlog:
  console_logging: false
  log_file: /var/log/app/logs.yml
  additional_log_file: /var/log/app/audit.yml
  log_level: warning
  sensitive_data_masking:
    fields: [password, credit_card_number]
  log_rotation:
    enabled: true
    max_size: 2048
    backup_count: 3
  notifications:
    webhook_url: https://hooks.example.com/alerts
"#;
        let settings = Settings::from_yaml_str(yaml).unwrap();

        assert!(!settings.console_logging);
        assert_eq!(settings.log_level, Level::Warning);
        assert_eq!(
            settings.sensitive_data_masking.fields,
            vec!["password".to_string(), "credit_card_number".to_string()]
        );
        assert_eq!(
            settings.rotation_policy(),
            Some(RotationPolicy {
                max_size: 2048,
                backup_count: 3
            })
        );
        assert_eq!(settings.dispatch, DispatchSettings::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Settings::from_yaml_str("fanlog:\n  log_levle: DEBUG\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = Settings::default()
            .with_overrides([("log_levle", "DEBUG")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(key) if key == "log_levle"));
    }

    #[test]
    fn invalid_level_is_a_config_error() {
        let err = Settings::from_yaml_str("fanlog:\n  log_level: LOUD\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = Settings::default()
            .with_overrides([("log_level", "LOUD")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLevel(_)));
    }

    #[test]
    fn overrides_are_typed() {
        let settings = Settings::default()
            .with_overrides([
                ("log_level", "ERROR"),
                ("log_file", ""),
                ("sensitive_data_masking.fields", "password, token"),
                ("log_rotation.enabled", "true"),
                ("log_rotation.max_size", "4096"),
                ("dispatch.workers", "4"),
            ])
            .unwrap();

        assert_eq!(settings.log_level, Level::Error);
        assert_eq!(settings.log_file, None);
        assert_eq!(settings.sensitive_data_masking.fields, vec!["password", "token"]);
        assert_eq!(settings.log_rotation.max_size, 4096);
        assert_eq!(settings.dispatch.workers, 4);

        let err = Settings::default()
            .with_overrides([("metrics_port", "eighty")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn validation_catches_bad_values() {
        let err = Settings::default()
            .with_overrides([("log_rotation.enabled", "yes"), ("log_rotation.max_size", "0")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRotation(_)));

        let err = Settings::default()
            .with_overrides([("dispatch.queue_capacity", "0")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDispatch(_)));

        let err = Settings::default()
            .with_overrides([("notifications.webhook_url", "ftp://example.com")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWebhookUrl(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "fanlog:\n  log_level: DEBUG").unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.log_level, Level::Debug);

        let err = Settings::from_file("/definitely/not/here.yml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn empty_document_means_defaults() {
        assert_eq!(Settings::from_yaml_str("").unwrap(), Settings::default());
    }
}
