use chrono::Utc;

use crate::context::LogContext;
use crate::error::LogError;
use crate::level::Level;
use crate::record::{ExceptionInfo, Fields, LogRecord};
use crate::redact::Redactor;

/// Assembles [`LogRecord`]s from caller input and ambient state.
#[derive(Debug, Clone, Default)]
pub struct RecordBuilder {
    redactor: Redactor,
}

impl RecordBuilder {
    pub fn new(redactor: Redactor) -> Self {
        RecordBuilder { redactor }
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// Build a record stamped with the current time and the active context.
    ///
    /// An empty `message` or empty `data` mapping is treated as absent.
    /// `data` is masked into a fresh copy; the caller's mapping is not touched.
    pub fn build(
        &self,
        level: Level,
        message: Option<&str>,
        data: Option<&Fields>,
        exception: Option<ExceptionInfo>,
    ) -> LogRecord {
        let message = message.filter(|m| !m.is_empty()).map(str::to_string);
        let data = data
            .filter(|d| !d.is_empty())
            .map(|d| self.redactor.mask(d));

        LogRecord::new(
            Utc::now(),
            level,
            message,
            data,
            exception,
            LogContext::current(),
        )
    }

    /// Like [`build`](Self::build) but takes the level by name. Unknown names
    /// produce no record.
    pub fn build_named(
        &self,
        level: &str,
        message: Option<&str>,
        data: Option<&Fields>,
        exception: Option<ExceptionInfo>,
    ) -> Result<LogRecord, LogError> {
        let level: Level = level.parse()?;
        Ok(self.build(level, message, data, exception))
    }
}
