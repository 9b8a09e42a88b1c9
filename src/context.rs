use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// Trait for providing the current time.
/// Decouples pool and engine logic from `Utc::now()` so windows and
/// deadlines can be driven deterministically.
pub trait TimeProvider: Send + Sync {
    fn now_millis(&self) -> i64;

    fn now(&self) -> DateTime<Utc>;

    fn now_secs(&self) -> i64 {
        self.now_millis().div_euclid(1000)
    }
}

/// Trait for generating unique IDs.
pub trait IdProvider: Send + Sync {
    fn new_id(&self) -> String;
}

/// Source of the inter-attempt delay used by retry loops.
#[async_trait]
pub trait DelaySource: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Context holding the providers.
/// Passed down to the pool and the execution engine.
#[derive(Clone)]
pub struct ExecutionContext {
    pub time: Arc<dyn TimeProvider>,
    pub id: Arc<dyn IdProvider>,
    pub delay: Arc<dyn DelaySource>,
}

impl ExecutionContext {
    pub fn new_system() -> Self {
        Self {
            time: Arc::new(SystemTimeProvider),
            id: Arc::new(RandomIdProvider),
            delay: Arc::new(TokioDelay),
        }
    }

    /// Simulated clock whose delays advance the clock instead of sleeping.
    pub fn new_simulated(start_time_ms: i64) -> (Self, Arc<SimulatedTimeProvider>, Arc<RecordingDelay>) {
        let clock = Arc::new(SimulatedTimeProvider::new(start_time_ms));
        let delay = Arc::new(RecordingDelay::new(clock.clone()));
        let ctx = Self {
            time: clock.clone(),
            id: Arc::new(DeterministicIdProvider::new()),
            delay: delay.clone(),
        };
        (ctx, clock, delay)
    }
}

// --- Live Implementations ---

pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct RandomIdProvider;

impl IdProvider for RandomIdProvider {
    fn new_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

pub struct TokioDelay;

#[async_trait]
impl DelaySource for TokioDelay {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// --- Simulated Implementations ---

pub struct SimulatedTimeProvider {
    current_time_ms: AtomicI64,
}

impl SimulatedTimeProvider {
    pub fn new(start_time_ms: i64) -> Self {
        Self {
            current_time_ms: AtomicI64::new(start_time_ms),
        }
    }

    pub fn set_time(&self, time_ms: i64) {
        self.current_time_ms.store(time_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, duration_ms: i64) {
        self.current_time_ms.fetch_add(duration_ms, Ordering::SeqCst);
    }
}

impl TimeProvider for SimulatedTimeProvider {
    fn now_millis(&self) -> i64 {
        self.current_time_ms.load(Ordering::SeqCst)
    }

    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.now_millis())
            .single()
            .unwrap_or_default()
    }
}

/// Records every requested delay and advances the simulated clock by it.
pub struct RecordingDelay {
    clock: Arc<SimulatedTimeProvider>,
    delays: Mutex<Vec<Duration>>,
}

impl RecordingDelay {
    pub fn new(clock: Arc<SimulatedTimeProvider>) -> Self {
        Self {
            clock,
            delays: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

#[async_trait]
impl DelaySource for RecordingDelay {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().push(duration);
        self.clock.advance(duration.as_millis() as i64);
    }
}

pub struct DeterministicIdProvider {
    counter: Mutex<u64>,
}

impl DeterministicIdProvider {
    pub fn new() -> Self {
        Self {
            counter: Mutex::new(0),
        }
    }
}

impl Default for DeterministicIdProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl IdProvider for DeterministicIdProvider {
    fn new_id(&self) -> String {
        let mut num = self.counter.lock();
        *num += 1;
        format!("00000000-0000-0000-0000-{:012x}", *num)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_delay_advances_clock() {
        let (ctx, clock, delay) = ExecutionContext::new_simulated(1_000);
        ctx.delay.sleep(Duration::from_secs(1)).await;
        ctx.delay.sleep(Duration::from_millis(250)).await;

        assert_eq!(clock.now_millis(), 2_250);
        assert_eq!(
            delay.recorded(),
            vec![Duration::from_secs(1), Duration::from_millis(250)]
        );
    }

    #[test]
    fn test_deterministic_ids() {
        let ids = DeterministicIdProvider::new();
        assert_eq!(ids.new_id(), "00000000-0000-0000-0000-000000000001");
        assert_eq!(ids.new_id(), "00000000-0000-0000-0000-000000000002");
    }

    #[test]
    fn test_now_secs_floors() {
        let clock = SimulatedTimeProvider::new(1_999);
        assert_eq!(clock.now_secs(), 1);
        clock.set_time(-1);
        assert_eq!(clock.now_secs(), -1);
    }
}
