use std::any;
use std::error::Error;
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::level::Level;

/// String-keyed structured payload used for record data and context.
pub type Fields = serde_json::Map<String, Value>;

/// One immutable logging event.
///
/// Built by [`RecordBuilder`](crate::builder::RecordBuilder) and handed to
/// sinks behind an `Arc`, so every sink sees the same already-masked data.
/// Serializes to the YAML block written by the file and console sinks.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    #[serde(rename = "Timestamp")]
    timestamp: DateTime<Utc>,
    #[serde(rename = "Level")]
    level: Level,
    #[serde(rename = "Exception", serialize_with = "serialize_exception")]
    exception: Option<ExceptionInfo>,
    #[serde(rename = "Context", skip_serializing_if = "is_empty_context")]
    context: Arc<Fields>,
    #[serde(rename = "Message", skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(rename = "Data", skip_serializing_if = "Option::is_none")]
    data: Option<Fields>,
}

impl LogRecord {
    pub(crate) fn new(
        timestamp: DateTime<Utc>,
        level: Level,
        message: Option<String>,
        data: Option<Fields>,
        exception: Option<ExceptionInfo>,
        context: Arc<Fields>,
    ) -> Self {
        LogRecord {
            timestamp,
            level,
            exception,
            context,
            message,
            data,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn data(&self) -> Option<&Fields> {
        self.data.as_ref()
    }

    pub fn exception(&self) -> Option<&ExceptionInfo> {
        self.exception.as_ref()
    }

    pub fn context(&self) -> &Fields {
        &self.context
    }

    /// Creation time in local time, `ctime` style (`Fri Oct 16 09:30:00 2026`).
    pub fn ctime(&self) -> String {
        self.timestamp
            .with_timezone(&Local)
            .format("%a %b %e %H:%M:%S %Y")
            .to_string()
    }

    /// Serialize the record body as a YAML mapping.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

fn is_empty_context(context: &Arc<Fields>) -> bool {
    context.is_empty()
}

fn serialize_exception<S: Serializer>(
    exception: &Option<ExceptionInfo>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match exception {
        Some(info) => info.serialize(serializer),
        None => serializer.serialize_str("None"),
    }
}

/// Structured description of a caught failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExceptionInfo {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "Args")]
    pub args: Vec<Value>,
}

impl ExceptionInfo {
    pub fn new(kind: impl Into<String>, message: impl Into<String>, args: Vec<Value>) -> Self {
        ExceptionInfo {
            kind: kind.into(),
            message: message.into(),
            args,
        }
    }

    /// Describe `err`: `message` is its `Display` and `args` the messages of
    /// the error and each of its sources, outermost first.
    ///
    /// `kind` is the static type name without module path or generics, seen
    /// through `Box`, `Arc` and `Rc`. A trait object (`&*boxed` for a
    /// `Box<dyn Error>`) has no useful static name, so its kind is the
    /// leading name of its `Debug` output, which is the type name for derived
    /// `Debug` impls. Use [`with_kind`](Self::with_kind) when neither fits.
    pub fn from_error<E>(err: &E) -> Self
    where
        E: Error + ?Sized,
    {
        let message = err.to_string();
        let mut args = vec![Value::String(message.clone())];
        let mut source = err.source();
        while let Some(cause) = source {
            args.push(Value::String(cause.to_string()));
            source = cause.source();
        }

        ExceptionInfo {
            kind: kind_of(err),
            message,
            args,
        }
    }

    /// Replace the derived kind.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }
}

fn kind_of<E>(err: &E) -> String
where
    E: Error + ?Sized,
{
    let name = strip_pointers(any::type_name::<E>());
    if name.starts_with("dyn ") {
        if let Some(kind) = debug_name(err) {
            return kind;
        }
    }
    short_type_name(name)
}

fn strip_pointers(mut name: &str) -> &str {
    const POINTERS: [&str; 3] = ["alloc::boxed::Box<", "alloc::sync::Arc<", "alloc::rc::Rc<"];
    loop {
        name = name.trim_start_matches('&');
        let inner = POINTERS
            .iter()
            .find_map(|prefix| name.strip_prefix(prefix))
            .and_then(|rest| rest.strip_suffix('>'))
            .map(|inner| inner.trim_end_matches(", alloc::alloc::Global"));
        match inner {
            Some(inner) => name = inner,
            None => return name,
        }
    }
}

fn debug_name<E>(err: &E) -> Option<String>
where
    E: Error + ?Sized,
{
    let debug = format!("{err:?}");
    let name: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    name.starts_with(|c: char| c.is_uppercase()).then_some(name)
}

fn short_type_name(full: &str) -> String {
    let full = full.trim_start_matches("dyn ");
    let base = full.split('<').next().unwrap_or(full);
    let base = base.split(" + ").next().unwrap_or(base);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
