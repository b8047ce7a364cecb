use std::io;
use std::path::PathBuf;

use crate::level::ParseLevelError;

/// Error type returned when settings cannot be loaded, overridden or
/// validated. Always surfaced before any record is logged.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("invalid log level: {0}")]
    InvalidLevel(#[from] ParseLevelError),

    #[error("invalid log rotation settings: {0}")]
    InvalidRotation(String),

    #[error("invalid dispatch settings: {0}")]
    InvalidDispatch(String),

    #[error("invalid webhook url: {0}")]
    InvalidWebhookUrl(String),

    #[error("webhook feature is not enabled")]
    WebhookFeatureDisabled,

    #[error("failed to build webhook client: {0}")]
    Notifier(String),

    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[source] io::Error),
}

/// Error type returned by a single [`LogSink`](crate::sink::LogSink).
///
/// Sink errors never reach the logging caller; the dispatcher counts them
/// and reports them on stderr.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("console write failed: {0}")]
    Console(#[source] io::Error),

    #[error("{0}")]
    Other(String),
}

/// Error type returned by a [`Notifier`](crate::notify::Notifier).
#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[cfg(feature = "webhook")]
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook rejected notification with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("{0}")]
    Other(String),
}

/// Errors a logging call can report back to its caller.
#[derive(thiserror::Error, Debug)]
pub enum LogError {
    #[error(transparent)]
    InvalidLevel(#[from] ParseLevelError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
