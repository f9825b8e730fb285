// src/crawl/tracker.rs
// =============================================================================
// Tracks outstanding work so the crawl knows when it is finished.
//
// A crawl has two phases that overlap in time:
// - discovery: DHT pings, which fan out into more DHT pings
// - metadata: nodeinfo requests, started by successful DHT pings
//
// Each phase has its own counter. Work is counted when it is *scheduled*
// (before tokio::spawn), not when it starts running, otherwise the waiter
// could see zero while a freshly spawned task hasn't been polled yet.
//
// Rust concepts:
// - RAII guards: the counter is released in Drop, so early returns and
//   panics inside a task can't leak outstanding work
// - Notify: wakes the waiting task when a counter drops to zero
// =============================================================================

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Outstanding-work counter for one phase of the crawl
#[derive(Debug, Default)]
pub struct Phase {
    outstanding: AtomicUsize,
    idle: Notify,
}

impl Phase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Counts one unit of work. Call this *before* spawning the task, and
    /// move the returned guard into it.
    pub fn begin(self: &Arc<Self>) -> WorkGuard {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        WorkGuard {
            phase: Arc::clone(self),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Waits until no work is outstanding in this phase
    pub async fn wait_idle(&self) {
        loop {
            // Register interest before checking, so a notify that lands
            // between the check and the await isn't lost
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn finish(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Releases one unit of outstanding work when dropped
#[derive(Debug)]
pub struct WorkGuard {
    phase: Arc<Phase>,
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        self.phase.finish();
    }
}

/// The two phases of a crawl
#[derive(Debug)]
pub struct Completion {
    pub discovery: Arc<Phase>,
    pub metadata: Arc<Phase>,
}

impl Completion {
    pub fn new() -> Self {
        Self {
            discovery: Phase::new(),
            metadata: Phase::new(),
        }
    }

    /// Waits for the whole crawl to finish.
    ///
    /// Order matters: metadata work is only ever scheduled by a running
    /// discovery task, so once discovery is idle the metadata counter can
    /// only go down. Waiting on metadata first could see a zero that a
    /// later DHT ping then invalidates.
    pub async fn drain(&self) {
        self.discovery.wait_idle().await;
        self.metadata.wait_idle().await;
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}
