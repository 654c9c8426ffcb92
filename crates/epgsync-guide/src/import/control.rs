//! Run exclusivity and cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

/// Process-wide lock shared by default importers.
static GLOBAL_LOCK: LazyLock<RunLock> = LazyLock::new(RunLock::new);

/// Allows at most one import at a time among importers sharing it.
#[derive(Debug, Clone, Default)]
pub struct RunLock {
    running: Arc<AtomicBool>,
}

impl RunLock {
    /// Creates an independent lock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide lock.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL_LOCK.clone()
    }

    /// Takes the lock if it is free. It is released when the guard drops.
    #[must_use]
    pub fn try_acquire(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard { lock: self })
    }

    /// Returns `true` while a guard is held.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Held for the duration of one import.
#[derive(Debug)]
#[must_use]
pub struct RunGuard<'a> {
    lock: &'a RunLock,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.lock.running.store(false, Ordering::Release);
    }
}

/// Cooperative cancellation signal checked between import steps.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once [`cancel`](Self::cancel) was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
