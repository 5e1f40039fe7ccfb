use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

// ---------------------------------------------------------------------------
// AtomicF32 — f32 bit-cast over AtomicU32
// ---------------------------------------------------------------------------

/// Shared f32 storage with plain load/store.
///
/// No read-modify-write: the statistics built on top follow the dirty
/// lock-free contract where racing writers may lose updates.
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl fmt::Debug for AtomicF32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.load().fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Statistics — strict running mean
// ---------------------------------------------------------------------------

/// Single-threaded running mean: `mean += (x - mean) / count`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Statistics {
    count: f32,
    mean: f32,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.count = 0.0;
        self.mean = 0.0;
    }

    pub fn add(&mut self, value: f32) {
        self.count += 1.0;
        self.mean += (value - self.mean) / self.count;
    }

    pub fn count(&self) -> f32 {
        self.count
    }

    pub fn mean(&self) -> f32 {
        self.mean
    }
}

// ---------------------------------------------------------------------------
// ExtStatistics — mean, deviation, min, max
// ---------------------------------------------------------------------------

/// Running mean with deviation and extrema, for diagnostics (simulation
/// lengths, in-tree depths). Uses f64; the counts here are small and the
/// values are never on the search hot path.
#[derive(Clone, Copy, Debug)]
pub struct ExtStatistics {
    count: f64,
    mean: f64,
    // Sum of squared deviations (Welford).
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for ExtStatistics {
    fn default() -> Self {
        Self {
            count: 0.0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl ExtStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn add(&mut self, value: f64) {
        self.count += 1.0;
        let delta = value - self.mean;
        self.mean += delta / self.count;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn count(&self) -> f64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn deviation(&self) -> f64 {
        if self.count > 0.0 {
            (self.m2 / self.count).sqrt()
        } else {
            0.0
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

impl fmt::Display for ExtStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0.0 {
            return write!(f, "-");
        }
        write!(
            f,
            "{:.1} dev={:.1} min={:.0} max={:.0}",
            self.mean,
            self.deviation(),
            self.min,
            self.max
        )
    }
}

// ---------------------------------------------------------------------------
// DirtyStatistics — lock-free running mean with torn reads
// ---------------------------------------------------------------------------

/// Running mean shared between threads without locking.
///
/// Writers load (count, mean), compute `mean += (x - mean) / new_count` and
/// store both back non-atomically. Concurrent writers can lose individual
/// updates and readers can observe a count/mean pair from two different
/// updates. The search tolerates both: only approximate convergence of the
/// final values is required. Never put a mutex here.
#[derive(Debug, Default)]
pub struct DirtyStatistics {
    count: AtomicF32,
    mean: AtomicF32,
}

impl DirtyStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.count.store(0.0);
        self.mean.store(0.0);
    }

    pub fn add(&self, value: f32) {
        let count = self.count.load() + 1.0;
        let mean = self.mean.load();
        self.mean.store(mean + (value - mean) / count);
        self.count.store(count);
    }

    pub fn count(&self) -> f32 {
        self.count.load()
    }

    pub fn mean(&self) -> f32 {
        self.mean.load()
    }

    /// Overwrite with another accumulator's current value.
    pub fn copy_from(&self, other: &DirtyStatistics) {
        self.count.store(other.count());
        self.mean.store(other.mean());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Statistics ----

    #[test]
    fn statistics_mean_sequence() {
        let mut s = Statistics::new();
        for v in [2.0, 4.0, 6.0, 8.0] {
            s.add(v);
        }
        assert_eq!(s.count(), 4.0);
        assert!((s.mean() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn statistics_clear() {
        let mut s = Statistics::new();
        s.add(1.0);
        s.clear();
        assert_eq!(s.count(), 0.0);
        assert_eq!(s.mean(), 0.0);
    }

    // ---- ExtStatistics ----

    #[test]
    fn ext_statistics_moments() {
        let mut s = ExtStatistics::new();
        for v in [1.0, 3.0, 5.0] {
            s.add(v);
        }
        assert_eq!(s.count(), 3.0);
        assert!((s.mean() - 3.0).abs() < 1e-9);
        // Population deviation of [1, 3, 5]: sqrt(8/3)
        assert!((s.deviation() - (8.0f64 / 3.0).sqrt()).abs() < 1e-9);
        assert_eq!(s.min(), 1.0);
        assert_eq!(s.max(), 5.0);
    }

    #[test]
    fn ext_statistics_empty_display() {
        let s = ExtStatistics::new();
        assert_eq!(format!("{s}"), "-");
    }

    // ---- DirtyStatistics ----

    #[test]
    fn dirty_statistics_single_thread_matches_strict() {
        let dirty = DirtyStatistics::new();
        let mut strict = Statistics::new();
        for i in 0..100 {
            let v = (i % 7) as f32 / 7.0;
            dirty.add(v);
            strict.add(v);
        }
        assert_eq!(dirty.count(), strict.count());
        assert!((dirty.mean() - strict.mean()).abs() < 1e-5);
    }

    #[test]
    fn dirty_statistics_copy_from() {
        let a = DirtyStatistics::new();
        a.add(0.25);
        a.add(0.75);
        let b = DirtyStatistics::new();
        b.copy_from(&a);
        assert_eq!(b.count(), 2.0);
        assert!((b.mean() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn dirty_statistics_concurrent_converges_approximately() {
        use std::sync::Arc;

        let stats = Arc::new(DirtyStatistics::new());
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let stats = Arc::clone(&stats);
                scope.spawn(move || {
                    for _ in 0..1000 {
                        stats.add(0.5);
                    }
                });
            }
        });
        // Lost updates are allowed; the mean of a constant stream is exact.
        assert!((stats.mean() - 0.5).abs() < 1e-6);
        assert!(stats.count() > 0.0);
        assert!(stats.count() <= 4000.0);
    }
}
