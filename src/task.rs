use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tracing::trace;

use crate::error::{Result, SurfaceError};

/// Shared flag used to interrupt a running surface build.
///
/// Cloning is a pointer bump; every clone observes the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A progress report emitted at a checkpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress<'a> {
    pub message: &'a str,
    pub current: usize,
    pub max: usize,
    /// Nesting level: 0 for the root computation, +1 per [`TaskContext::child`].
    pub depth: usize,
}

/// Receives progress reports. Called from whichever thread hits the checkpoint.
pub type ProgressCallback = dyn Fn(&Progress) + Send + Sync;

/// Cooperative cancellation and progress context for one surface build.
///
/// Work loops call [`checkpoint`](TaskContext::checkpoint) at fixed intervals, which keeps
/// cancellation points deterministic:
///
/// ```rust,ignore
/// for (i, item) in items.iter().enumerate() {
///     process(item);
///     if i % 10_000 == 0 {
///         ctx.checkpoint("Working", i, items.len())?;
///     }
/// }
/// ```
#[derive(Clone, Default)]
pub struct TaskContext {
    token: CancellationToken,
    observer: Option<Arc<ProgressCallback>>,
    depth: usize,
}

impl TaskContext {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            ..Default::default()
        }
    }

    /// Routes progress reports to `observer`.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&Progress) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn should_cancel(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Context for a nested sub-computation.
    ///
    /// Shares the cancellation token, so cancelling the parent cancels the child.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.clone(),
            observer: self.observer.clone(),
            depth: self.depth + 1,
        }
    }

    /// Fails with [`SurfaceError::Cancelled`] if cancellation was requested,
    /// otherwise reports `(message, current, max)`.
    pub fn checkpoint(&self, message: &str, current: usize, max: usize) -> Result<()> {
        if self.should_cancel() {
            return Err(SurfaceError::Cancelled);
        }
        trace!(stage = message, current, max, depth = self.depth, "progress");
        if let Some(observer) = &self.observer {
            observer(&Progress {
                message,
                current,
                max,
                depth: self.depth,
            });
        }
        Ok(())
    }
}
