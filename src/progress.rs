//! Progress reporting and cooperative cancellation for long-running assembly.
//!
//! Assembly reports once per processed slice and polls its [`CancelToken`]
//! right after each report.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

use tracing::info;

/// Receives `(completed_count, message)` after every processed slice.
pub trait ProgressSink {
    fn report(&mut self, completed: usize, message: &str);
}

impl<F> ProgressSink for F
where
    F: FnMut(usize, &str),
{
    fn report(&mut self, completed: usize, message: &str) {
        self(completed, message)
    }
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _completed: usize, _message: &str) {}
}

/// Forwards progress over a channel, e.g. to a UI thread.
///
/// A dropped receiver is not an error; further reports are discarded.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    sender: Sender<(usize, String)>,
}

impl ChannelProgress {
    pub fn new(sender: Sender<(usize, String)>) -> Self {
        Self { sender }
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&mut self, completed: usize, message: &str) {
        let _ = self.sender.send((completed, message.to_owned()));
    }
}

/// Logs progress through `tracing` every `log_interval` reports.
#[derive(Debug, Clone)]
pub struct TracingProgress {
    pub total: usize,
    pub log_interval: usize,
}

impl TracingProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            log_interval: 10,
        }
    }
}

impl ProgressSink for TracingProgress {
    fn report(&mut self, completed: usize, message: &str) {
        if completed == self.total || completed % self.log_interval.max(1) == 0 {
            info!(completed, total = self.total, "{message}");
        }
    }
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Default, Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
