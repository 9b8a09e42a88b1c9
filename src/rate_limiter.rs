use std::collections::VecDeque;

/// Sliding-window request counter.
/// Holds the timestamps of recent requests, oldest first, and treats the
/// owner as limited once `max_requests` of them fall inside the window.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    window_ms: i64,
    max_requests: usize,
    timestamps: VecDeque<i64>,
}

impl SlidingWindow {
    pub fn new(window_ms: i64, max_requests: usize) -> Self {
        Self {
            window_ms,
            max_requests,
            timestamps: VecDeque::with_capacity(max_requests),
        }
    }

    /// Drop timestamps that are no longer within the trailing window.
    pub fn prune(&mut self, now_ms: i64) {
        while let Some(&oldest) = self.timestamps.front() {
            if now_ms - oldest < self.window_ms {
                break;
            }
            self.timestamps.pop_front();
        }
    }

    pub fn is_limited(&mut self, now_ms: i64) -> bool {
        self.prune(now_ms);
        self.timestamps.len() >= self.max_requests
    }

    pub fn record(&mut self, now_ms: i64) {
        // Keep the sequence time-ordered even if the clock steps backwards.
        let stamp = self.timestamps.back().map_or(now_ms, |&last| last.max(now_ms));
        self.timestamps.push_back(stamp);
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}
