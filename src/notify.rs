use async_trait::async_trait;
use std::fmt::Write as _;

use crate::error::NotifyError;
use crate::record::LogRecord;

/// Best-effort out-of-band alert channel.
///
/// The dispatcher only ever calls `notify` from a worker task; failures are
/// counted and reported on stderr, never returned to the logging caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, summary: &str) -> Result<(), NotifyError>;
}

/// Plain-text summary of an exceptional record.
///
/// ```text
/// [ERROR] 2026-10-16T09:30:00Z ValueError: Invalid credentials
/// message: Login failed
/// context: request_id=12345
/// ```
pub fn summarize(record: &LogRecord) -> String {
    let mut out = format!("[{}] {}", record.level(), record.timestamp().to_rfc3339());
    match record.exception() {
        Some(exception) => {
            let _ = write!(out, " {}: {}", exception.kind, exception.message);
        }
        None => out.push_str(" event"),
    }
    if let Some(message) = record.message() {
        let _ = write!(out, "\nmessage: {message}");
    }
    if !record.context().is_empty() {
        let pairs: Vec<String> = record
            .context()
            .iter()
            .map(|(key, value)| match value.as_str() {
                Some(text) => format!("{key}={text}"),
                None => format!("{key}={value}"),
            })
            .collect();
        let _ = write!(out, "\ncontext: {}", pairs.join(", "));
    }
    out
}

#[cfg(feature = "webhook")]
pub use webhook::WebhookNotifier;

#[cfg(feature = "webhook")]
mod webhook {
    use super::Notifier;
    use crate::error::NotifyError;
    use async_trait::async_trait;
    use reqwest::header::CONTENT_TYPE;
    use reqwest::Client;
    use std::time::Duration;

    /// [`Notifier`] that POSTs the summary as `text/plain` to a webhook.
    #[derive(Clone, Debug)]
    pub struct WebhookNotifier {
        client: Client,
        url: String,
    }

    impl WebhookNotifier {
        /// Build a notifier for `url` whose requests give up after `timeout`.
        ///
        /// Connections are not pooled: the worker threads each drive their
        /// own runtime and a pooled connection is bound to the runtime that
        /// opened it.
        pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
            let client = Client::builder()
                .timeout(timeout)
                .pool_max_idle_per_host(0)
                .build()?;
            Ok(Self {
                client,
                url: url.into(),
            })
        }

        pub fn url(&self) -> &str {
            &self.url
        }
    }

    #[async_trait]
    impl Notifier for WebhookNotifier {
        async fn notify(&self, summary: &str) -> Result<(), NotifyError> {
            let resp = self
                .client
                .post(&self.url)
                .header(CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(summary.to_string())
                .send()
                .await?;
            if resp.status().is_success() {
                Ok(())
            } else {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
                Err(NotifyError::Rejected { status, body })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::RecordBuilder;
    use crate::context::LogContext;
    use crate::level::Level;
    use crate::record::ExceptionInfo;

    #[test]
    fn summary_names_exception_message_and_context() {
        let record = LogContext::with([("request_id", "12345")], || {
            RecordBuilder::default().build(
                Level::Error,
                Some("Login failed"),
                None,
                Some(ExceptionInfo::new("ValueError", "Invalid credentials", vec![])),
            )
        });

        let summary = summarize(&record);
        let lines: Vec<&str> = summary.lines().collect();

        assert!(lines[0].starts_with("[ERROR] "));
        assert!(lines[0].ends_with(" ValueError: Invalid credentials"));
        assert_eq!(lines[1], "message: Login failed");
        assert_eq!(lines[2], "context: request_id=12345");
    }

    #[test]
    fn summary_without_exception_or_context_is_one_line() {
        let record = RecordBuilder::default().build(Level::Critical, None, None, None);
        let summary = summarize(&record);
        assert_eq!(summary.lines().count(), 1);
        assert!(summary.ends_with(" event"));
    }
}
