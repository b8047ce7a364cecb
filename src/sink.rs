use crate::error::SinkError;
use crate::record::LogRecord;
use async_trait::async_trait;

/// Asynchronous destination for [`LogRecord`]s produced by the logger.
///
/// Implementations transport records to a concrete destination (a file,
/// the terminal, memory). The dispatcher calls `send` from a worker task
/// and never awaits it on the application thread.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Write a single record.
    ///
    /// **Returns**
    /// - `Ok(())` if the record was written.
    /// - `Err(..)` if the destination failed (I/O error, serialization
    ///   error, permission, disk full). The dispatcher counts the failure,
    ///   reports it on stderr and carries on with the other sinks.
    ///
    /// Implementations that share a handle between concurrent calls must
    /// serialize their physical writes so records never interleave.
    async fn send(&self, record: &LogRecord) -> Result<(), SinkError>;

    /// Flush any buffered records, if the sink buffers.
    ///
    /// Default implementation is a no-op.
    async fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Short name used in failure reports.
    fn name(&self) -> &str;

    /// Disabled sinks are skipped by the dispatcher instead of being
    /// scheduled.
    fn is_enabled(&self) -> bool {
        true
    }
}
