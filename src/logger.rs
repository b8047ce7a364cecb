use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tracing::{debug, info};

use crate::builder::RecordBuilder;
use crate::console::ConsoleSink;
use crate::dispatcher::{Dispatcher, Outcome, Route, StatsSnapshot};
use crate::error::{ConfigError, LogError};
use crate::file::{FileSink, RotationPolicy};
use crate::level::Level;
use crate::metrics::LevelCounters;
use crate::notify::Notifier;
use crate::null_sink::NullSink;
use crate::pool::DrainReport;
use crate::record::{ExceptionInfo, Fields};
use crate::redact::Redactor;
use crate::settings::Settings;
use crate::sink::LogSink;

/// Message and data of one logging call. Both are optional.
///
/// Converts from `&str`, `&Fields` and `(&str, &Fields)`:
///
/// ```no_run
/// # use fanlog::{Entry, Fields, Logger};
/// # fn demo(logger: &Logger, data: &Fields) {
/// logger.info("service started");
/// logger.info(("Data processing completed", data));
/// logger.warning(Entry::new().data(data));
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Entry<'a> {
    message: Option<&'a str>,
    data: Option<&'a Fields>,
}

impl<'a> Entry<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: &'a str) -> Self {
        self.message = Some(message);
        self
    }

    pub fn data(mut self, data: &'a Fields) -> Self {
        self.data = Some(data);
        self
    }
}

impl<'a> From<&'a str> for Entry<'a> {
    fn from(message: &'a str) -> Self {
        Entry::new().message(message)
    }
}

impl<'a> From<&'a String> for Entry<'a> {
    fn from(message: &'a String) -> Self {
        Entry::new().message(message)
    }
}

impl<'a> From<&'a Fields> for Entry<'a> {
    fn from(data: &'a Fields) -> Self {
        Entry::new().data(data)
    }
}

impl<'a> From<(&'a str, &'a Fields)> for Entry<'a> {
    fn from((message, data): (&'a str, &'a Fields)) -> Self {
        Entry::new().message(message).data(data)
    }
}

/// Everything derived from one settings snapshot. Swapped as a whole on
/// reload, so a call sees either the old or the new configuration.
struct Snapshot {
    settings: Arc<Settings>,
    builder: RecordBuilder,
    route: Route,
}

/// Sinks and notifier supplied in code rather than by settings. They
/// survive reloads.
#[derive(Default)]
struct Extras {
    sinks: Vec<Arc<dyn LogSink>>,
    notifier: Option<Arc<dyn Notifier>>,
    console: Option<Arc<ConsoleSink>>,
}

/// File sinks by path, shared by every snapshot so that one file only ever
/// has one writer. Writes still queued for a replaced snapshot land in the
/// same sink as the new ones.
#[derive(Default)]
struct FileSinks {
    by_path: Mutex<HashMap<PathBuf, Arc<FileSink>>>,
}

impl FileSinks {
    /// Sinks for `paths`, reusing existing ones with `rotation` applied.
    /// Paths no longer configured are forgotten; queued writes keep their
    /// sink alive until they finish.
    fn resolve(&self, paths: &[&Path], rotation: Option<RotationPolicy>) -> Vec<Arc<FileSink>> {
        let mut by_path = self.by_path.lock().unwrap_or_else(PoisonError::into_inner);
        by_path.retain(|path, _| paths.contains(&path.as_path()));

        let mut sinks: Vec<Arc<FileSink>> = Vec::with_capacity(paths.len());
        for path in paths {
            let sink = by_path
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(FileSink::new(*path, rotation)));
            sink.set_rotation(rotation);
            if !sinks.iter().any(|s| Arc::ptr_eq(s, sink)) {
                sinks.push(Arc::clone(sink));
            }
        }
        sinks
    }
}

/// The logging facade.
///
/// Owns its level counters and worker pool, so several loggers in one
/// process stay independent. Dropping the logger shuts the pool down,
/// waiting at most `dispatch.drain_timeout_ms` for queued writes.
pub struct Logger {
    snapshot: RwLock<Arc<Snapshot>>,
    extras: Extras,
    files: FileSinks,
    dispatcher: Dispatcher,
    drain_timeout: Duration,
    drained: Mutex<Option<DrainReport>>,
}

impl Logger {
    pub fn new(settings: Settings) -> Result<Self, ConfigError> {
        LoggerBuilder::new(settings).build()
    }

    pub fn builder(settings: Settings) -> LoggerBuilder {
        LoggerBuilder::new(settings)
    }

    /// Load settings from a YAML file and apply `FANLOG_*` environment
    /// overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = Settings::from_file(path)?.with_env_overrides()?;
        Self::new(settings)
    }

    pub fn debug<'a>(&self, entry: impl Into<Entry<'a>>) -> Outcome {
        self.log(Level::Debug, entry)
    }

    pub fn info<'a>(&self, entry: impl Into<Entry<'a>>) -> Outcome {
        self.log(Level::Info, entry)
    }

    pub fn warning<'a>(&self, entry: impl Into<Entry<'a>>) -> Outcome {
        self.log(Level::Warning, entry)
    }

    pub fn error<'a>(&self, entry: impl Into<Entry<'a>>) -> Outcome {
        self.log(Level::Error, entry)
    }

    pub fn critical<'a>(&self, entry: impl Into<Entry<'a>>) -> Outcome {
        self.log(Level::Critical, entry)
    }

    pub fn log<'a>(&self, level: Level, entry: impl Into<Entry<'a>>) -> Outcome {
        self.emit(level, entry.into(), None)
    }

    /// Log at a level given by name. An unrecognized name is reported back
    /// and nothing is emitted.
    pub fn log_named<'a>(&self, level: &str, entry: impl Into<Entry<'a>>) -> Result<Outcome, LogError> {
        let level: Level = level.parse()?;
        Ok(self.log(level, entry))
    }

    /// Log a caught error at ERROR and schedule a notification when a
    /// notifier is configured.
    pub fn log_exception<'a, E>(&self, err: &E, entry: impl Into<Entry<'a>>) -> Outcome
    where
        E: Error + ?Sized,
    {
        self.log_exception_info(ExceptionInfo::from_error(err), entry)
    }

    /// Like [`log_exception`](Self::log_exception) with a pre-built
    /// description.
    pub fn log_exception_info<'a>(&self, info: ExceptionInfo, entry: impl Into<Entry<'a>>) -> Outcome {
        self.emit(Level::Error, entry.into(), Some(info))
    }

    fn emit(&self, level: Level, entry: Entry<'_>, exception: Option<ExceptionInfo>) -> Outcome {
        let snapshot = self.current();
        if !snapshot.route.enabled(level) {
            return Outcome::Filtered;
        }

        let notify = exception.is_some();
        let record = snapshot
            .builder
            .build(level, entry.message, entry.data, exception);
        self.dispatcher.submit(&snapshot.route, record, notify)
    }

    fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Settings snapshot currently in effect.
    pub fn settings(&self) -> Arc<Settings> {
        Arc::clone(&self.current().settings)
    }

    /// Validate `settings`, build the outputs it describes and publish it.
    /// Calls already in flight finish with the previous snapshot. A file
    /// path configured before and after keeps its sink, with the new rotation
    /// policy applied. The worker pool keeps the sizing it was started with.
    pub fn reload(&self, settings: Settings) -> Result<(), ConfigError> {
        settings.validate()?;
        let next = Arc::new(build_snapshot(settings, &self.extras, &self.files)?);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = next;
        info!("logger settings reloaded");
        Ok(())
    }

    pub fn counters(&self) -> &LevelCounters {
        self.dispatcher.counters()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.dispatcher.stats()
    }

    /// Prometheus text exposition of the level counters, for the external
    /// collector on `metrics_port`. `None` unless `metrics_enabled` is set.
    pub fn metrics(&self) -> Option<String> {
        if !self.current().settings.metrics_enabled {
            return None;
        }
        self.counters().encode().ok()
    }

    /// Deferred writes and notifications queued or running.
    pub fn pending(&self) -> usize {
        self.dispatcher.pending()
    }

    /// Wait until every scheduled write and notification has finished.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.dispatcher.flush(timeout)
    }

    /// Queue a flush of every deferred sink, stop accepting work and drain
    /// the queue, waiting at most the configured drain timeout. Repeated
    /// calls return the first report.
    pub fn shutdown(&self) -> DrainReport {
        let mut drained = self.drained.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(report) = *drained {
            return report;
        }
        self.dispatcher.flush_sinks(&self.current().route);
        let report = self.dispatcher.shutdown(self.drain_timeout);
        debug!(drained = report.drained, abandoned = report.abandoned, "logger shut down");
        *drained = Some(report);
        report
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.current();
        f.debug_struct("Logger")
            .field("settings", &snapshot.settings)
            .field("route", &snapshot.route)
            .field(
                "masked",
                &snapshot.builder.redactor().fields().collect::<Vec<_>>(),
            )
            .field("counters", self.counters())
            .finish()
    }
}

/// Builds a [`Logger`] with outputs beyond what the settings describe.
pub struct LoggerBuilder {
    settings: Settings,
    extras: Extras,
}

impl LoggerBuilder {
    pub fn new(settings: Settings) -> Self {
        LoggerBuilder {
            settings,
            extras: Extras::default(),
        }
    }

    /// Add a deferred sink next to the configured file sinks.
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.extras.sinks.push(sink);
        self
    }

    /// Use `notifier` instead of the configured webhook.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.extras.notifier = Some(notifier);
        self
    }

    /// Send console output to `writer` instead of stdout when console
    /// logging is enabled.
    pub fn console_writer(mut self, writer: impl Write + Send + 'static) -> Self {
        self.extras.console = Some(Arc::new(ConsoleSink::with_writer(writer)));
        self
    }

    pub fn build(self) -> Result<Logger, ConfigError> {
        self.settings.validate()?;
        let counters = Arc::new(LevelCounters::new());
        let dispatcher = Dispatcher::new(self.settings.pool_config(), counters)?;
        let drain_timeout = self.settings.drain_timeout();
        let files = FileSinks::default();
        let snapshot = build_snapshot(self.settings, &self.extras, &files)?;
        debug!(route = ?snapshot.route, "logger initialized");

        Ok(Logger {
            snapshot: RwLock::new(Arc::new(snapshot)),
            extras: self.extras,
            files,
            dispatcher,
            drain_timeout,
            drained: Mutex::new(None),
        })
    }
}

fn build_snapshot(settings: Settings, extras: &Extras, files: &FileSinks) -> Result<Snapshot, ConfigError> {
    let mut route = Route::new(settings.log_level);
    // Fallible part first, so a rejected reload leaves the file sinks alone.
    route.notifier = match &extras.notifier {
        Some(notifier) => Some(Arc::clone(notifier)),
        None => webhook(&settings)?,
    };

    if settings.console_logging {
        route.console = Some(
            extras
                .console
                .clone()
                .unwrap_or_else(|| Arc::new(ConsoleSink::stdout())),
        );
    }

    let paths: Vec<&Path> = [&settings.log_file, &settings.additional_log_file]
        .into_iter()
        .filter_map(|path| path.as_deref())
        .collect();
    let file_sinks = files.resolve(&paths, settings.rotation_policy());
    if file_sinks.is_empty() {
        route.sinks.push(Arc::new(NullSink));
    }
    route
        .sinks
        .extend(file_sinks.into_iter().map(|sink| sink as Arc<dyn LogSink>));
    route.sinks.extend(extras.sinks.iter().cloned());

    let builder = RecordBuilder::new(Redactor::new(
        settings.sensitive_data_masking.fields.iter().cloned(),
    ));

    Ok(Snapshot {
        settings: Arc::new(settings),
        builder,
        route,
    })
}

#[cfg(feature = "webhook")]
fn webhook(settings: &Settings) -> Result<Option<Arc<dyn Notifier>>, ConfigError> {
    use crate::notify::WebhookNotifier;

    match &settings.notifications.webhook_url {
        Some(url) => {
            let notifier = WebhookNotifier::new(url.clone(), settings.notification_timeout())
                .map_err(|e| ConfigError::Notifier(e.to_string()))?;
            debug!(url = notifier.url(), "webhook notifications enabled");
            Ok(Some(Arc::new(notifier)))
        }
        None => Ok(None),
    }
}

#[cfg(not(feature = "webhook"))]
fn webhook(settings: &Settings) -> Result<Option<Arc<dyn Notifier>>, ConfigError> {
    match settings.notifications.webhook_url {
        Some(_) => Err(ConfigError::WebhookFeatureDisabled),
        None => Ok(None),
    }
}
