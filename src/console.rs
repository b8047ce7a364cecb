use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use console::Style;

use crate::error::SinkError;
use crate::level::Level;
use crate::record::LogRecord;
use crate::sink::LogSink;

/// Color used for the level tag on the console.
pub fn level_style(level: Level) -> Style {
    match level {
        Level::Debug => Style::new().blue(),
        Level::Info => Style::new().green(),
        Level::Warning => Style::new().yellow(),
        Level::Error => Style::new().red(),
        Level::Critical => Style::new().red().bold(),
    }
}

/// Human-readable terminal output.
///
/// Unlike the file sinks this one is written synchronously on the calling
/// thread, so a caller's console lines appear in program order. Writes from
/// concurrent callers are serialized by an internal lock.
pub struct ConsoleSink {
    out: Mutex<Box<dyn Write + Send>>,
    styled: bool,
}

impl ConsoleSink {
    /// Write to stdout, colored when the terminal supports it.
    pub fn stdout() -> Self {
        ConsoleSink {
            out: Mutex::new(Box::new(io::stdout())),
            styled: console::colors_enabled(),
        }
    }

    /// Write to an arbitrary writer, uncolored.
    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        ConsoleSink {
            out: Mutex::new(Box::new(writer)),
            styled: false,
        }
    }

    /// Force ANSI styling of the level tag on or off.
    pub fn styled(mut self, styled: bool) -> Self {
        self.styled = styled;
        self
    }

    /// Render `record` the way it appears on the console: a header line with
    /// the level tag followed by the YAML body.
    pub fn render(&self, record: &LogRecord) -> Result<String, SinkError> {
        let level = record.level();
        let tag = if self.styled {
            level_style(level)
                .force_styling(true)
                .apply_to(level.as_str())
                .to_string()
        } else {
            level.as_str().to_string()
        };
        let headline = if record.exception().is_some() {
            "Exception Occurred at"
        } else {
            "Report Generated"
        };
        let body = record.to_yaml()?;
        Ok(format!("{tag} {headline} {}\n{body}", record.ctime()))
    }

    /// Render and write `record` on the calling thread.
    pub fn write(&self, record: &LogRecord) -> Result<(), SinkError> {
        let text = self.render(record)?;
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(text.as_bytes()).map_err(SinkError::Console)?;
        out.flush().map_err(SinkError::Console)
    }
}

#[async_trait]
impl LogSink for ConsoleSink {
    async fn send(&self, record: &LogRecord) -> Result<(), SinkError> {
        self.write(record)
    }

    fn name(&self) -> &str {
        "console"
    }
}
