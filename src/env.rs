//! Environment variable names used by this crate for convenient
//! configuration of the logger from container deployments.
//!
//! These are purely helpers; [`Settings`](crate::settings::Settings) stays
//! decoupled from environment access until
//! [`with_env_overrides`](crate::settings::Settings::with_env_overrides) is
//! called.

/// Path of the YAML settings file.
pub const FANLOG_CONFIG_ENV: &str = "FANLOG_CONFIG";

/// Minimum level, e.g. `WARNING`.
pub const FANLOG_LOG_LEVEL_ENV: &str = "FANLOG_LOG_LEVEL";

/// Primary log file path.
pub const FANLOG_LOG_FILE_ENV: &str = "FANLOG_LOG_FILE";

/// Secondary log file path.
pub const FANLOG_ADDITIONAL_LOG_FILE_ENV: &str = "FANLOG_ADDITIONAL_LOG_FILE";

/// `true`/`false` toggle for console output.
pub const FANLOG_CONSOLE_LOGGING_ENV: &str = "FANLOG_CONSOLE_LOGGING";

/// Comma-separated list of data keys to mask.
pub const FANLOG_SENSITIVE_FIELDS_ENV: &str = "FANLOG_SENSITIVE_FIELDS";

/// Webhook endpoint for exception notifications.
pub const FANLOG_WEBHOOK_URL_ENV: &str = "FANLOG_WEBHOOK_URL";

/// `true`/`false` toggle for metrics exposure.
pub const FANLOG_METRICS_ENABLED_ENV: &str = "FANLOG_METRICS_ENABLED";

/// Port the external metrics collector listens on.
pub const FANLOG_METRICS_PORT_ENV: &str = "FANLOG_METRICS_PORT";

/// Each environment variable paired with the settings key it overrides.
pub const ENV_OVERRIDES: [(&str, &str); 8] = [
    (FANLOG_LOG_LEVEL_ENV, "log_level"),
    (FANLOG_LOG_FILE_ENV, "log_file"),
    (FANLOG_ADDITIONAL_LOG_FILE_ENV, "additional_log_file"),
    (FANLOG_CONSOLE_LOGGING_ENV, "console_logging"),
    (FANLOG_SENSITIVE_FIELDS_ENV, "sensitive_data_masking.fields"),
    (FANLOG_WEBHOOK_URL_ENV, "notifications.webhook_url"),
    (FANLOG_METRICS_ENABLED_ENV, "metrics_enabled"),
    (FANLOG_METRICS_PORT_ENV, "metrics_port"),
];

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// `(settings key, value)` for every override variable that is set.
pub fn overrides_from_env() -> Vec<(&'static str, String)> {
    ENV_OVERRIDES
        .iter()
        .filter_map(|(var, key)| std::env::var(var).ok().map(|value| (*key, value)))
        .collect()
}
