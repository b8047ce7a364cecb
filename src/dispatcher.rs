use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::console::ConsoleSink;
use crate::error::ConfigError;
use crate::level::Level;
use crate::metrics::LevelCounters;
use crate::notify::{summarize, Notifier};
use crate::pool::{DrainReport, PoolConfig, WorkerPool};
use crate::record::LogRecord;
use crate::sink::LogSink;

/// Where records go: the threshold plus every configured output.
#[derive(Clone)]
pub struct Route {
    pub min_level: Level,
    /// Written synchronously on the caller's thread.
    pub console: Option<Arc<ConsoleSink>>,
    /// Written on the worker pool, one task per sink.
    pub sinks: Vec<Arc<dyn LogSink>>,
    pub notifier: Option<Arc<dyn Notifier>>,
}

impl Route {
    pub fn new(min_level: Level) -> Self {
        Route {
            min_level,
            console: None,
            sinks: Vec::new(),
            notifier: None,
        }
    }

    pub fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("min_level", &self.min_level)
            .field("console", &self.console.is_some())
            .field(
                "sinks",
                &self.sinks.iter().map(|s| s.name().to_string()).collect::<Vec<_>>(),
            )
            .field("notifier", &self.notifier.is_some())
            .finish()
    }
}

/// What happened to a submitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Below the threshold: not counted, not written, no notification.
    Filtered,
    /// Counted. `scheduled` tasks were queued for deferred sinks and the
    /// notifier; `dropped` could not be queued.
    Dispatched { scheduled: usize, dropped: usize },
}

/// Dispatch-side counters, separate from the per-level record counters.
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Tasks accepted by the worker queue.
    pub enqueued: AtomicU64,
    /// Tasks dropped because the queue stayed full or was closed.
    pub dropped: AtomicU64,
    /// Sink writes that failed, console included.
    pub sink_failures: AtomicU64,
    /// Notifications that could not be delivered.
    pub notification_failures: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub enqueued: u64,
    pub dropped: u64,
    pub sink_failures: u64,
    pub notification_failures: u64,
    /// Queued tasks the workers skipped after a drain timeout.
    pub skipped: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            notification_failures: self.notification_failures.load(Ordering::Relaxed),
            skipped: 0,
        }
    }
}

/// Decides whether a record is emitted, counts it and fans it out.
///
/// The console write happens on the caller's thread. Every other sink and
/// the notifier run as separate tasks on a bounded worker pool, so one slow
/// or failing destination neither blocks the caller nor affects the others.
pub struct Dispatcher {
    counters: Arc<LevelCounters>,
    stats: Arc<DispatchStats>,
    pool: WorkerPool,
}

impl Dispatcher {
    pub fn new(config: PoolConfig, counters: Arc<LevelCounters>) -> Result<Self, ConfigError> {
        let pool = WorkerPool::start(config).map_err(ConfigError::WorkerPool)?;
        Ok(Dispatcher {
            counters,
            stats: Arc::new(DispatchStats::default()),
            pool,
        })
    }

    pub fn counters(&self) -> &Arc<LevelCounters> {
        &self.counters
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            skipped: self.pool.skipped(),
            ..self.stats.snapshot()
        }
    }

    /// Emit `record` through `route`. With `notify` set, a summary is also
    /// sent to the route's notifier.
    pub fn submit(&self, route: &Route, record: LogRecord, notify: bool) -> Outcome {
        if !route.enabled(record.level()) {
            return Outcome::Filtered;
        }

        self.counters.increment(record.level());
        let record = Arc::new(record);

        if let Some(console) = &route.console {
            if let Err(e) = console.write(&record) {
                self.stats.sink_failures.fetch_add(1, Ordering::Relaxed);
                eprintln!("fanlog: sink {} failed: {}", console.name(), e);
            }
        }

        let mut scheduled = 0;
        let mut dropped = 0;

        for sink in route.sinks.iter().filter(|sink| sink.is_enabled()) {
            let sink = Arc::clone(sink);
            let record = Arc::clone(&record);
            let stats = Arc::clone(&self.stats);
            let task = Box::pin(async move {
                let writer = Arc::clone(&sink);
                let sent = contained(async move { writer.send(&record).await }).await;
                if let Err(e) = sent {
                    stats.sink_failures.fetch_add(1, Ordering::Relaxed);
                    eprintln!("fanlog: sink {} failed: {}", sink.name(), e);
                }
            });
            if self.enqueue(task, "sink write") {
                scheduled += 1;
            } else {
                dropped += 1;
            }
        }

        if notify {
            if let Some(notifier) = &route.notifier {
                let notifier = Arc::clone(notifier);
                let summary = summarize(&record);
                let stats = Arc::clone(&self.stats);
                let task = Box::pin(async move {
                    let sent = contained(async move { notifier.notify(&summary).await }).await;
                    if let Err(e) = sent {
                        stats.notification_failures.fetch_add(1, Ordering::Relaxed);
                        eprintln!("fanlog: notification failed: {}", e);
                    }
                });
                if self.enqueue(task, "notification") {
                    scheduled += 1;
                } else {
                    dropped += 1;
                }
            }
        }

        Outcome::Dispatched { scheduled, dropped }
    }

    /// Queue a `flush` of every enabled deferred sink behind the writes
    /// already scheduled. Returns how many flushes were queued.
    pub fn flush_sinks(&self, route: &Route) -> usize {
        let mut scheduled = 0;
        for sink in route.sinks.iter().filter(|sink| sink.is_enabled()) {
            let sink = Arc::clone(sink);
            let stats = Arc::clone(&self.stats);
            let task = Box::pin(async move {
                let flusher = Arc::clone(&sink);
                let flushed = contained(async move { flusher.flush().await }).await;
                if let Err(e) = flushed {
                    stats.sink_failures.fetch_add(1, Ordering::Relaxed);
                    eprintln!("fanlog: sink {} failed to flush: {}", sink.name(), e);
                }
            });
            if self.enqueue(task, "sink flush") {
                scheduled += 1;
            }
        }
        scheduled
    }

    fn enqueue(&self, task: crate::pool::Task, what: &str) -> bool {
        if self.pool.schedule(task) {
            self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            eprintln!("fanlog: worker queue full or closed, dropping {}", what);
            false
        }
    }

    /// Wait until every scheduled task has finished, or `timeout` passes.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.pool.wait_idle(timeout)
    }

    /// Tasks queued or running.
    pub fn pending(&self) -> usize {
        self.pool.pending()
    }

    /// Close the queue and drain it for at most `timeout`.
    pub fn shutdown(&self, timeout: Duration) -> DrainReport {
        self.pool.shutdown(timeout)
    }
}

/// Run a sink or notifier call as its own task, so that a panic inside it
/// comes back as an error instead of unwinding through the worker.
async fn contained<F, E>(call: F) -> Result<(), String>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    match tokio::spawn(call).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) if e.is_panic() => Err(format!("panicked: {}", panic_message(e.into_panic()))),
        Err(e) => Err(e.to_string()),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "unknown panic".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::RecordBuilder;
    use crate::error::{NotifyError, SinkError};
    use crate::null_sink::{MemorySink, NullSink};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FailingSink;

    #[async_trait]
    impl LogSink for FailingSink {
        async fn send(&self, _record: &LogRecord) -> Result<(), SinkError> {
            Err(SinkError::Other("disk full".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, summary: &str) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(summary.to_string());
            Ok(())
        }
    }

    fn dispatcher() -> Dispatcher {
        let config = PoolConfig {
            workers: 2,
            queue_capacity: 64,
            enqueue_timeout: Duration::from_millis(50),
        };
        Dispatcher::new(config, Arc::new(LevelCounters::new())).unwrap()
    }

    #[test]
    fn below_threshold_does_nothing() {
        let dispatcher = dispatcher();
        let memory = Arc::new(MemorySink::new());
        let mut route = Route::new(Level::Warning);
        route.sinks.push(memory.clone());

        for level in [Level::Debug, Level::Info] {
            let record = RecordBuilder::default().build(level, Some("x"), None, None);
            assert_eq!(dispatcher.submit(&route, record, true), Outcome::Filtered);
        }

        assert!(dispatcher.flush(Duration::from_secs(5)));
        assert_eq!(dispatcher.counters().total(), 0);
        assert!(memory.is_empty());
        assert_eq!(dispatcher.stats(), StatsSnapshot::default());
    }

    #[test]
    fn failing_sink_does_not_suppress_siblings() {
        let dispatcher = dispatcher();
        let memory = Arc::new(MemorySink::new());
        let mut route = Route::new(Level::Debug);
        route.sinks.push(Arc::new(FailingSink));
        route.sinks.push(memory.clone());

        let record = RecordBuilder::default().build(Level::Error, Some("boom"), None, None);
        let outcome = dispatcher.submit(&route, record, false);

        assert_eq!(outcome, Outcome::Dispatched { scheduled: 2, dropped: 0 });
        assert!(dispatcher.flush(Duration::from_secs(5)));
        assert_eq!(memory.len(), 1);
        assert_eq!(dispatcher.counters().get(Level::Error), 1);
        assert_eq!(dispatcher.stats().sink_failures, 1);
    }

    #[test]
    fn disabled_sinks_are_not_scheduled() {
        let dispatcher = dispatcher();
        let mut route = Route::new(Level::Debug);
        route.sinks.push(Arc::new(NullSink));

        let record = RecordBuilder::default().build(Level::Info, None, None, None);
        let outcome = dispatcher.submit(&route, record, false);

        assert_eq!(outcome, Outcome::Dispatched { scheduled: 0, dropped: 0 });
        assert_eq!(dispatcher.counters().get(Level::Info), 1);
    }

    #[test]
    fn notification_only_when_requested() {
        let dispatcher = dispatcher();
        let notifier = Arc::new(RecordingNotifier::default());
        let mut route = Route::new(Level::Debug);
        route.notifier = Some(notifier.clone());

        let builder = RecordBuilder::default();
        dispatcher.submit(&route, builder.build(Level::Critical, Some("plain"), None, None), false);
        dispatcher.submit(&route, builder.build(Level::Error, Some("failed"), None, None), true);

        assert!(dispatcher.flush(Duration::from_secs(5)));
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("message: failed"));
    }

    #[derive(Default)]
    struct FlushCounter {
        flushes: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl LogSink for FlushCounter {
        async fn send(&self, _record: &LogRecord) -> Result<(), SinkError> {
            Ok(())
        }

        async fn flush(&self) -> Result<(), SinkError> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &str {
            "flush-counter"
        }
    }

    #[test]
    fn flush_sinks_skips_disabled_sinks() {
        let dispatcher = dispatcher();
        let counter = Arc::new(FlushCounter::default());
        let mut route = Route::new(Level::Debug);
        route.sinks.push(counter.clone());
        route.sinks.push(Arc::new(NullSink));

        assert_eq!(dispatcher.flush_sinks(&route), 1);
        assert!(dispatcher.flush(Duration::from_secs(5)));
        assert_eq!(counter.flushes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn submit_after_shutdown_counts_but_drops_deferred_work() {
        let dispatcher = dispatcher();
        let memory = Arc::new(MemorySink::new());
        let mut route = Route::new(Level::Debug);
        route.sinks.push(memory.clone());

        assert!(dispatcher.shutdown(Duration::from_secs(5)).drained);
        let record = RecordBuilder::default().build(Level::Info, None, None, None);
        let outcome = dispatcher.submit(&route, record, false);

        assert_eq!(outcome, Outcome::Dispatched { scheduled: 0, dropped: 1 });
        assert_eq!(dispatcher.counters().get(Level::Info), 1);
        assert_eq!(dispatcher.stats().dropped, 1);
        assert!(memory.is_empty());
    }
}
