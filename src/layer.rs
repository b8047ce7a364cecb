use crate::level::Level;
use crate::logger::{Entry, Logger};
use crate::record::Fields;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that forwards `tracing` events into a
/// [`Logger`].
///
/// Event fields become the record's data (plus a `target` entry) and the
/// `message` field becomes its message. `TRACE` is folded into `DEBUG` and
/// `WARN` maps to `WARNING`. Events emitted by this crate itself are
/// ignored so that diagnostics about a failing sink never loop back into
/// the sinks.
pub struct LoggerLayer {
    logger: Arc<Logger>,
}

impl LoggerLayer {
    pub fn new(logger: Arc<Logger>) -> Self {
        Self { logger }
    }
}

pub(crate) fn map_level(level: &tracing::Level) -> Level {
    match *level {
        tracing::Level::TRACE | tracing::Level::DEBUG => Level::Debug,
        tracing::Level::INFO => Level::Info,
        tracing::Level::WARN => Level::Warning,
        tracing::Level::ERROR => Level::Error,
    }
}

fn is_own_target(target: &str) -> bool {
    let own = env!("CARGO_PKG_NAME");
    target == own || target.strip_prefix(own).is_some_and(|rest| rest.starts_with("::"))
}

impl<S> Layer<S> for LoggerLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if is_own_target(meta.target()) {
            return;
        }

        let mut fields = Fields::new();
        let mut message: Option<String> = None;

        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        };
        event.record(&mut visitor);

        fields.insert(
            "target".to_string(),
            serde_json::Value::String(meta.target().to_string()),
        );

        let mut entry = Entry::new().data(&fields);
        if let Some(message) = message.as_deref() {
            entry = entry.message(message);
        }
        self.logger.log(map_level(meta.level()), entry);
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut Fields,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(format!("{:?}", value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::null_sink::MemorySink;
    use crate::settings::Settings;
    use std::time::Duration;
    use tracing_subscriber::layer::SubscriberExt;

    fn logger(sink: Arc<MemorySink>) -> Arc<Logger> {
        let settings = Settings::default()
            .with_overrides([("console_logging", "false"), ("log_file", ""), ("log_level", "DEBUG")])
            .unwrap();
        Arc::new(Logger::builder(settings).sink(sink).build().unwrap())
    }

    #[test]
    fn maps_tracing_levels() {
        assert_eq!(map_level(&tracing::Level::TRACE), Level::Debug);
        assert_eq!(map_level(&tracing::Level::WARN), Level::Warning);
        assert_eq!(map_level(&tracing::Level::ERROR), Level::Error);
    }

    #[test]
    fn forwards_events_with_fields() {
        let memory = Arc::new(MemorySink::new());
        let logger = logger(Arc::clone(&memory));
        let subscriber = tracing_subscriber::registry().with(LoggerLayer::new(Arc::clone(&logger)));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "billing", user_id = 42, reason = "card declined", "payment failed");
        });

        assert!(logger.flush(Duration::from_secs(5)));
        let records = memory.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.level(), Level::Warning);
        assert_eq!(record.message(), Some("payment failed"));
        let data = record.data().unwrap();
        assert_eq!(data["user_id"], serde_json::json!(42));
        assert_eq!(data["reason"], serde_json::json!("card declined"));
        assert_eq!(data["target"], serde_json::json!("billing"));
        assert_eq!(logger.counters().get(Level::Warning), 1);
    }

    #[test]
    fn ignores_own_events() {
        let memory = Arc::new(MemorySink::new());
        let logger = logger(Arc::clone(&memory));
        let subscriber = tracing_subscriber::registry().with(LoggerLayer::new(Arc::clone(&logger)));

        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(target: "fanlog::dispatcher", "sink failed");
        });

        assert!(logger.flush(Duration::from_secs(5)));
        assert!(memory.is_empty());
        assert_eq!(logger.counters().total(), 0);
    }
}
