/// Failure accounting for a single endpoint.
///
/// An endpoint is tripped (`alive == false`) once `max_failures` failures
/// have accumulated inside the reset window. A failure that arrives after
/// the window has elapsed since the previous one starts a fresh count, and
/// any success closes the breaker again.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    max_failures: u32,
    reset_window_ms: i64,
    consecutive_failures: u32,
    last_failure_ms: Option<i64>,
    alive: bool,
}

/// What a failure did to the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trip {
    /// Still below the threshold.
    Counted,
    /// This failure crossed the threshold.
    Tripped,
    /// Was already open.
    AlreadyOpen,
}

impl CircuitBreaker {
    pub fn new(max_failures: u32, reset_window_ms: i64) -> Self {
        Self {
            max_failures,
            reset_window_ms,
            consecutive_failures: 0,
            last_failure_ms: None,
            alive: true,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_failure_ms(&self) -> Option<i64> {
        self.last_failure_ms
    }

    pub fn record_failure(&mut self, now_ms: i64) -> Trip {
        if let Some(last) = self.last_failure_ms {
            if now_ms - last > self.reset_window_ms {
                self.consecutive_failures = 0;
            }
        }

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure_ms = Some(now_ms);

        if self.consecutive_failures < self.max_failures {
            Trip::Counted
        } else if self.alive {
            self.alive = false;
            Trip::Tripped
        } else {
            Trip::AlreadyOpen
        }
    }

    /// Returns true if the breaker was open before this success.
    pub fn record_success(&mut self) -> bool {
        let was_dead = !self.alive;
        self.consecutive_failures = 0;
        self.alive = true;
        was_dead
    }
}
