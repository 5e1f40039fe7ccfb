use std::sync::Arc;
use std::time::Instant;

// ---------------------------------------------------------------------------
// TimeSource / Timer
// ---------------------------------------------------------------------------

/// Monotonic clock in seconds. Injected into the search so tests and
/// embedders with their own clocks (e.g. a game clock) can control time.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall-clock time source backed by `Instant`.
pub struct WallTimeSource {
    origin: Instant,
}

impl WallTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for WallTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for WallTimeSource {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Elapsed time since construction or the last `reset`.
#[derive(Clone)]
pub struct Timer {
    source: Arc<dyn TimeSource>,
    start: f64,
}

impl Timer {
    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        let start = source.now();
        Self { source, start }
    }

    pub fn reset(&mut self, source: Arc<dyn TimeSource>) {
        self.start = source.now();
        self.source = source;
    }

    pub fn elapsed(&self) -> f64 {
        self.source.now() - self.start
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::TimeSource;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Manually advanced clock for deterministic tests.
    #[derive(Default)]
    pub struct FakeTimeSource {
        micros: AtomicU64,
    }

    impl FakeTimeSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn advance(&self, seconds: f64) {
            self.micros
                .fetch_add((seconds * 1e6) as u64, Ordering::Relaxed);
        }
    }

    impl TimeSource for FakeTimeSource {
        fn now(&self) -> f64 {
            self.micros.load(Ordering::Relaxed) as f64 / 1e6
        }
    }
}
