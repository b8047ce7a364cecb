//! Fixed-size pool of worker threads for deferred sink writes and
//! notifications.
//!
//! Tasks are boxed futures pushed into one bounded tokio channel. Every
//! worker is an OS thread driving its own current-thread runtime, so the
//! pool works the same whether or not the caller lives inside a runtime.
//!
//! Overflow: [`WorkerPool::schedule`] waits for a free slot until
//! `enqueue_timeout` has passed, then drops the task and counts it.
//!
//! Each task runs as its own tokio task on the worker's runtime, so a task
//! that panics is reported and the worker moves on to the next one.
//!
//! Shutdown: the queue is closed, the workers drain what is left and exit.
//! Whatever is still pending when the drain timeout expires is abandoned:
//! workers skip those tasks instead of running them.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

pub(crate) type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Pool sizing and timing.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub enqueue_timeout: Duration,
}

/// Result of [`WorkerPool::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Every worker finished before the deadline.
    pub drained: bool,
    /// Tasks that were still pending at the deadline and will not run.
    pub abandoned: usize,
}

struct Shared {
    pending: AtomicUsize,
    abandon: AtomicBool,
    skipped: AtomicU64,
    /// Held while checking a condition and while signalling it, so a waiter
    /// cannot miss the wakeup between the two.
    signal: Mutex<()>,
    /// `pending` dropped to zero.
    idle: Condvar,
    /// A worker took a task off the queue.
    space: Condvar,
}

impl Shared {
    fn lock_signal(&self) -> MutexGuard<'_, ()> {
        self.signal.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One task left the pool, run, skipped or never queued.
    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _signal = self.lock_signal();
            self.idle.notify_all();
        }
    }

    fn slot_freed(&self) {
        let _signal = self.lock_signal();
        self.space.notify_all();
    }
}

pub(crate) struct WorkerPool {
    sender: RwLock<Option<mpsc::Sender<Task>>>,
    finished: Mutex<Option<std_mpsc::Receiver<()>>>,
    shared: Arc<Shared>,
    workers: usize,
    enqueue_timeout: Duration,
}

impl WorkerPool {
    pub(crate) fn start(config: PoolConfig) -> io::Result<Self> {
        let workers = config.workers.max(1);
        let capacity = config.queue_capacity.max(1);

        let (tx, rx) = mpsc::channel::<Task>(capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let (done_tx, done_rx) = std_mpsc::channel();
        let shared = Arc::new(Shared {
            pending: AtomicUsize::new(0),
            abandon: AtomicBool::new(false),
            skipped: AtomicU64::new(0),
            signal: Mutex::new(()),
            idle: Condvar::new(),
            space: Condvar::new(),
        });

        for index in 0..workers {
            let rx = Arc::clone(&rx);
            let shared = Arc::clone(&shared);
            let done_tx = done_tx.clone();
            thread::Builder::new()
                .name(format!("fanlog-worker-{index}"))
                .spawn(move || worker_main(rx, shared, done_tx))?;
        }
        debug!(workers, capacity, "worker pool started");

        Ok(WorkerPool {
            sender: RwLock::new(Some(tx)),
            finished: Mutex::new(Some(done_rx)),
            shared,
            workers,
            enqueue_timeout: config.enqueue_timeout,
        })
    }

    /// Queue `task`, waiting at most the enqueue timeout for space.
    /// Returns `false` if the task was dropped.
    pub(crate) fn schedule(&self, task: Task) -> bool {
        let guard = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return false;
        };

        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        let task = match tx.try_send(task) {
            Ok(()) => return true,
            Err(TrySendError::Full(back)) => back,
            Err(TrySendError::Closed(_)) => {
                self.shared.finish_one();
                return false;
            }
        };

        // Full: retry each time a worker frees a slot, under the signal lock
        // so a slot freed between the retry and the wait is not missed.
        let deadline = Instant::now() + self.enqueue_timeout;
        let mut task = task;
        let mut signal = self.shared.lock_signal();
        loop {
            match tx.try_send(task) {
                Ok(()) => return true,
                Err(TrySendError::Full(back)) => task = back,
                Err(TrySendError::Closed(_)) => break,
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            signal = self
                .shared
                .space
                .wait_timeout(signal, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        drop(signal);
        self.shared.finish_one();
        false
    }

    /// Tasks queued or running.
    pub(crate) fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Block until no task is queued or running, or `timeout` passes.
    pub(crate) fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signal = self.shared.lock_signal();
        while self.pending() != 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            signal = self
                .shared
                .idle
                .wait_timeout(signal, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Close the queue and wait up to `timeout` for the workers to drain it.
    /// Calling it again returns immediately.
    pub(crate) fn shutdown(&self, timeout: Duration) -> DrainReport {
        drop(
            self.sender
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let finished = self
            .finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(finished) = finished else {
            return DrainReport {
                drained: self.pending() == 0,
                abandoned: self.pending(),
            };
        };

        let deadline = Instant::now() + timeout;
        let mut exited = 0;
        while exited < self.workers {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match finished.recv_timeout(remaining) {
                Ok(()) => exited += 1,
                Err(_) => break,
            }
        }

        if exited == self.workers {
            debug!("worker pool drained");
            return DrainReport {
                drained: true,
                abandoned: 0,
            };
        }

        self.shared.abandon.store(true, Ordering::SeqCst);
        let abandoned = self.pending();
        debug!(abandoned, "worker pool drain timed out");
        DrainReport {
            drained: false,
            abandoned,
        }
    }

    /// Tasks skipped by workers after a drain timeout.
    pub(crate) fn skipped(&self) -> u64 {
        self.shared.skipped.load(Ordering::Relaxed)
    }
}

fn worker_main(
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Task>>>,
    shared: Arc<Shared>,
    done: std_mpsc::Sender<()>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("fanlog: failed to start worker runtime: {}", e);
            let _ = done.send(());
            return;
        }
    };

    runtime.block_on(async move {
        loop {
            let next = {
                let mut rx = rx.lock().await;
                rx.recv().await
            };
            let Some(task) = next else {
                break;
            };
            shared.slot_freed();
            if shared.abandon.load(Ordering::SeqCst) {
                shared.skipped.fetch_add(1, Ordering::Relaxed);
            } else if let Err(e) = tokio::spawn(task).await {
                eprintln!("fanlog: worker task failed: {}", e);
            }
            shared.finish_one();
        }
    });

    let _ = done.send(());
}
