//! Progress tracking and callbacks for batch imports.
//!
//! A [`ProgressTracker`] counts completed files from any worker thread and
//! forwards snapshots to a [`ProgressCallback`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

/// Snapshot of a running batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressInfo {
    /// Files finished so far, successful or not.
    pub completed: usize,
    /// Files in the batch.
    pub total: usize,
    /// Time elapsed since start.
    pub elapsed: Duration,
    /// Estimated remaining time.
    pub estimated_remaining: Option<Duration>,
}

impl ProgressInfo {
    pub fn new(completed: usize, total: usize, elapsed: Duration) -> Self {
        Self {
            completed,
            total,
            elapsed,
            estimated_remaining: None,
        }
    }

    /// Progress percentage; 100 for an empty batch.
    pub fn progress_percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.completed as f64 / self.total as f64) * 100.0
        }
    }

    /// Estimate the remaining time from the average time per file.
    pub fn calculate_remaining(&mut self) {
        if self.completed > 0 {
            let per_file = self.elapsed.as_secs_f64() / self.completed as f64;
            let remaining = self.total.saturating_sub(self.completed);
            self.estimated_remaining = Some(Duration::from_secs_f64(per_file * remaining as f64));
        }
    }
}

/// Progress callback for batch imports.
///
/// Called from worker threads, hence `Send + Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Called after each file.
    fn on_progress(&self, info: &ProgressInfo);

    /// Called once before the first file.
    fn on_start(&self, _total: usize) {}

    /// Called once after the last file.
    fn on_complete(&self, _info: &ProgressInfo) {}

    /// Called when the batch aborts.
    fn on_error(&self, _error: &str) {}
}

/// Callback that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl ProgressCallback for SilentProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Terminal progress bar plus `tracing` summaries.
#[derive(Clone)]
pub struct ConsoleProgressCallback {
    bar: ProgressBar,
}

impl Default for ConsoleProgressCallback {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleProgressCallback {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta})")
        {
            bar.set_style(style.progress_chars("##-"));
        }
        bar.set_message("Importing");
        Self { bar }
    }
}

impl ProgressCallback for ConsoleProgressCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        self.bar.set_position(info.completed as u64);
    }

    fn on_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        tracing::info!("Importing {} files", total);
    }

    fn on_complete(&self, info: &ProgressInfo) {
        self.bar.finish_and_clear();
        tracing::info!(
            "Imported {} files in {:.2}s",
            info.completed,
            info.elapsed.as_secs_f64()
        );
    }

    fn on_error(&self, error: &str) {
        self.bar.abandon();
        tracing::error!("Import failed: {}", error);
    }
}

/// Callback that records every snapshot.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback {
    history: Arc<Mutex<Vec<ProgressInfo>>>,
}

impl HistoryCallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded snapshots, in arrival order.
    pub fn history(&self) -> Vec<ProgressInfo> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }
}

impl ProgressCallback for HistoryCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Ok(mut history) = self.history.lock() {
            history.push(info.clone());
        }
    }
}

/// Shared completion counter for one batch.
pub struct ProgressTracker<'a> {
    callback: &'a dyn ProgressCallback,
    completed: AtomicUsize,
    total: usize,
    start: Instant,
}

impl<'a> ProgressTracker<'a> {
    /// Start tracking a batch of `total` files.
    pub fn start(callback: &'a dyn ProgressCallback, total: usize) -> Self {
        callback.on_start(total);
        Self {
            callback,
            completed: AtomicUsize::new(0),
            total,
            start: Instant::now(),
        }
    }

    /// Record one finished file.
    pub fn advance(&self) {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        let mut info = ProgressInfo::new(completed, self.total, self.start.elapsed());
        info.calculate_remaining();
        self.callback.on_progress(&info);
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn complete(&self) {
        let info = ProgressInfo::new(self.completed(), self.total, self.start.elapsed());
        self.callback.on_complete(&info);
    }

    pub fn error(&self, error: &str) {
        self.callback.on_error(error);
    }
}
