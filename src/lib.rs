//! Structured, leveled logging with concurrent fan-out.
//!
//! A [`Logger`] turns each call into an immutable [`LogRecord`] carrying the
//! ambient [`LogContext`], masks configured data keys, counts it per level
//! and hands it to its sinks: the console is written on the calling thread,
//! the YAML files and any custom [`LogSink`]s on a bounded worker pool.
//! [`Logger::log_exception`] additionally schedules a webhook notification.

pub mod builder;
pub mod console;
pub mod context;
pub mod dispatcher;
pub mod env;
pub mod error;
pub mod file;
pub mod init;
pub mod layer;
pub mod level;
pub mod logger;
pub mod metrics;
pub mod notify;
pub mod null_sink;
mod pool;
pub mod record;
pub mod redact;
pub mod settings;
pub mod sink;

pub use context::{ContextGuard, LogContext};
pub use dispatcher::{Outcome, StatsSnapshot};
pub use error::{ConfigError, LogError, NotifyError, SinkError};
pub use level::Level;
pub use logger::{Entry, Logger, LoggerBuilder};
pub use pool::{DrainReport, PoolConfig};
pub use record::{ExceptionInfo, Fields, LogRecord};
pub use settings::Settings;
pub use sink::LogSink;
