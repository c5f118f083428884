use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Debounced validation triggers. Paths queued before the deadline coalesce
/// and every new push moves the deadline.
#[derive(Clone, Debug)]
pub struct ValidationQueue {
    debounce: Duration,
    pending: BTreeSet<String>,
    due: Option<Instant>,
}

impl ValidationQueue {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            pending: BTreeSet::new(),
            due: None,
        }
    }

    pub fn push(&mut self, path: impl Into<String>, now: Instant) {
        self.pending.insert(path.into());
        self.due = Some(now + self.debounce);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_ready(&self, now: Instant) -> bool {
        self.due.is_some_and(|due| now >= due)
    }

    /// Drain the queue regardless of the deadline.
    pub fn take(&mut self) -> BTreeSet<String> {
        self.due = None;
        std::mem::take(&mut self.pending)
    }

    /// Drain only if the debounce window has passed.
    pub fn take_ready(&mut self, now: Instant) -> Option<BTreeSet<String>> {
        if self.is_ready(now) {
            Some(self.take())
        } else {
            None
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.due
    }
}

/// Progressive mounting of long control lists. Background ticks advance the
/// frontier by one chunk; `demand` mounts a path right away.
#[derive(Clone, Debug)]
pub struct RevealScheduler {
    chunk: usize,
    frontier: usize,
    total: usize,
    demanded: BTreeSet<String>,
}

impl RevealScheduler {
    pub fn new(chunk: usize) -> Self {
        let chunk = chunk.max(1);
        Self {
            chunk,
            frontier: chunk,
            total: 0,
            demanded: BTreeSet::new(),
        }
    }

    /// Start over (new document or declaration set).
    pub fn restart(&mut self) {
        self.frontier = self.chunk;
        self.demanded.clear();
    }

    /// Record how many controls the last render pass wanted to show.
    pub fn set_total(&mut self, total: usize) {
        self.total = total;
    }

    pub fn is_complete(&self) -> bool {
        self.frontier >= self.total
    }

    /// Low-priority work for one idle tick. Returns `true` if anything new
    /// became visible.
    pub fn tick(&mut self) -> bool {
        if self.is_complete() {
            return false;
        }
        self.frontier += self.chunk;
        true
    }

    /// High-priority request: mount `path` on the next pass.
    pub fn demand(&mut self, path: impl Into<String>) {
        self.demanded.insert(path.into());
    }

    pub fn is_revealed(&self, ordinal: usize, path: &str) -> bool {
        ordinal < self.frontier || self.demanded.contains(path)
    }

    pub fn frontier(&self) -> usize {
        self.frontier
    }
}
