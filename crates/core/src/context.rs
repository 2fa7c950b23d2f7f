//! Cooperative cancellation and progress reporting.
//!
//! Encoding is synchronous; the caller hands in an [`EncodeContext`] that the
//! pipeline polls between steps. Cancellation makes the pipeline report
//! "no more frames" instead of failing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Returned by long-running scans when the context was cancelled midway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// What a progress phase measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    /// Generating and writing animation frames.
    EncodingFrames,
    /// Quantizing and writing a single image.
    SavingImage,
}

/// Receiver of progress updates. Methods take `&self`; implementations use
/// interior mutability.
pub trait ProgressReporter {
    /// Start a new phase with `max` expected steps (0 = unknown).
    fn new_phase(&self, kind: ProgressKind, max: usize);
    /// Revise the expected step count of the current phase.
    fn set_max(&self, max: usize);
    fn increment(&self);
    fn complete(&self);
}

/// Cancellation check plus optional progress reporting.
pub trait EncodeContext {
    fn is_cancelled(&self) -> bool {
        false
    }

    fn progress(&self) -> Option<&dyn ProgressReporter> {
        None
    }
}

/// Context that is never cancelled and reports nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uncancellable;

impl EncodeContext for Uncancellable {}

/// Shareable cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl EncodeContext for CancellationToken {
    fn is_cancelled(&self) -> bool {
        CancellationToken::is_cancelled(self)
    }
}

/// A cancellation token combined with a progress reporter.
pub struct TaskContext<'a> {
    token: CancellationToken,
    progress: Option<&'a dyn ProgressReporter>,
}

impl<'a> TaskContext<'a> {
    pub fn new(token: CancellationToken) -> Self {
        TaskContext { token, progress: None }
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressReporter) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl EncodeContext for TaskContext<'_> {
    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn progress(&self) -> Option<&dyn ProgressReporter> {
        self.progress
    }
}

/// Progress reporter that keeps counters and logs phase changes through
/// the `log` facade.
#[derive(Debug, Default)]
pub struct LogProgress {
    current: AtomicUsize,
    max: AtomicUsize,
    completed: AtomicBool,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::Relaxed)
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Relaxed)
    }
}

impl ProgressReporter for LogProgress {
    fn new_phase(&self, kind: ProgressKind, max: usize) {
        self.current.store(0, Ordering::Relaxed);
        self.max.store(max, Ordering::Relaxed);
        self.completed.store(false, Ordering::Relaxed);
        log::info!("{:?}: started ({} steps expected)", kind, max);
    }

    fn set_max(&self, max: usize) {
        self.max.store(max, Ordering::Relaxed);
    }

    fn increment(&self) {
        let current = self.current.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!("progress {}/{}", current, self.max());
    }

    fn complete(&self) {
        self.current.store(self.max(), Ordering::Relaxed);
        self.completed.store(true, Ordering::Relaxed);
        log::info!("done ({} steps)", self.max());
    }
}
