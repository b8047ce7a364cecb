//! Request-scoped key/value context attached to every record.
//!
//! Each thread owns a stack of merged frames. [`LogContext::enter`] pushes
//! the current top merged with new pairs and returns a guard; dropping the
//! guard pops back to exactly the frame that was current before, even when
//! the scope is left by `?` or by a panic. Async code that moves between
//! threads uses [`LogContext::scope`], which keeps the frame in a tokio
//! task-local instead.

use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;

use crate::record::Fields;

thread_local! {
    static STACK: RefCell<Vec<Arc<Fields>>> = const { RefCell::new(Vec::new()) };
}

tokio::task_local! {
    static TASK_FRAME: Arc<Fields>;
}

/// Entry point for the context store.
pub struct LogContext;

impl LogContext {
    /// Merge `pairs` over the current context and make the result current
    /// until the returned guard is dropped.
    pub fn enter<I, K, V>(pairs: I) -> ContextGuard
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let frame = Arc::new(merged(pairs));
        let depth = STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let depth = stack.len();
            stack.push(frame);
            depth
        });
        ContextGuard {
            depth,
            _not_send: PhantomData,
        }
    }

    /// Leave a scope explicitly. Equivalent to dropping the guard.
    pub fn exit(guard: ContextGuard) {
        drop(guard);
    }

    /// Run `f` inside a context scope.
    pub fn with<I, K, V, F, R>(pairs: I, f: F) -> R
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
        F: FnOnce() -> R,
    {
        let _guard = Self::enter(pairs);
        f()
    }

    /// Run `future` with a task-local context frame. The frame travels with
    /// the task across worker threads and is gone once the future completes.
    pub async fn scope<I, K, V, F>(pairs: I, future: F) -> F::Output
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
        F: Future,
    {
        let frame = Arc::new(merged(pairs));
        TASK_FRAME.scope(frame, future).await
    }

    /// Snapshot of the active context. Empty when no scope is active.
    ///
    /// A thread-local scope entered while a task-local one is active is
    /// built on top of it, so the thread stack wins when both exist.
    pub fn current() -> Arc<Fields> {
        let top = STACK
            .try_with(|stack| stack.borrow().last().cloned())
            .ok()
            .flatten();
        top.or_else(|| TASK_FRAME.try_with(Arc::clone).ok())
            .unwrap_or_default()
    }

    /// Number of scopes entered on this thread and not yet left.
    pub fn depth() -> usize {
        STACK.try_with(|stack| stack.borrow().len()).unwrap_or(0)
    }
}

fn merged<I, K, V>(pairs: I) -> Fields
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    let mut frame = (*LogContext::current()).clone();
    for (key, value) in pairs {
        frame.insert(key.into(), value.into());
    }
    frame
}

/// Keeps a context frame current. Not `Send`: a frame belongs to the thread
/// that entered it.
#[must_use = "the context is left as soon as the guard is dropped"]
pub struct ContextGuard {
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let _ = STACK.try_with(|stack| stack.borrow_mut().truncate(self.depth));
    }
}
