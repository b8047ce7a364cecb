use crate::error::SinkError;
use crate::record::LogRecord;
use crate::sink::LogSink;
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};

/// A sink that simply drops all records.
///
/// Stands in for an output channel that is switched off in the settings.
/// It reports itself as disabled, so the dispatcher never schedules it.
#[derive(Clone, Default)]
pub struct NullSink;

#[async_trait]
impl LogSink for NullSink {
    async fn send(&self, _record: &LogRecord) -> Result<(), SinkError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// A sink that keeps every record in memory.
///
/// Useful for embedding the logger in tools that inspect their own output,
/// and for tests that assert on emitted records.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn send(&self, record: &LogRecord) -> Result<(), SinkError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
