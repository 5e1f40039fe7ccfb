use std::sync::Arc;

use tracing::trace;

use crate::abort::AbortFlag;
use crate::timer::TimeSource;

// ---------------------------------------------------------------------------
// IntervalChecker — adaptive sampling of an expensive predicate
// ---------------------------------------------------------------------------

/// Wraps an expensive predicate (time exceeded, best move cannot change)
/// behind a cheap countdown.
///
/// Every `count_interval` calls the predicate runs and the interval is
/// rescaled so that the expensive path fires roughly once per
/// `time_interval` seconds. The adjustment factor is clamped to
/// `[0.1, 10]` per step. Once the predicate returns true the checker stays
/// latched. In deterministic mode the interval is fixed so the number of
/// predicate calls does not depend on wall time.
pub struct IntervalChecker {
    time_source: Arc<dyn TimeSource>,
    time_interval: f64,
    is_first_check: bool,
    is_deterministic: bool,
    result: bool,
    count: u32,
    count_interval: u32,
    last_time: f64,
}

impl IntervalChecker {
    pub fn new(time_source: Arc<dyn TimeSource>, time_interval: f64) -> Self {
        Self {
            time_source,
            time_interval,
            is_first_check: true,
            is_deterministic: false,
            result: false,
            count: 1,
            count_interval: 1,
            last_time: 0.0,
        }
    }

    /// Fix the countdown interval; disables time-based adaptation.
    pub fn set_deterministic(&mut self, interval: u32) {
        assert!(interval >= 1);
        self.is_deterministic = true;
        self.count = interval;
        self.count_interval = interval;
    }

    /// Cheap check: decrements the countdown, consulting `f` only when it
    /// reaches zero.
    #[inline]
    pub fn check(&mut self, f: impl FnOnce() -> bool) -> bool {
        self.count -= 1;
        if self.count == 0 {
            self.check_expensive(f)
        } else {
            self.result
        }
    }

    fn check_expensive(&mut self, f: impl FnOnce() -> bool) -> bool {
        if self.result {
            // Stay latched; rearm the countdown for callers that keep going.
            self.count = self.count_interval;
            return true;
        }
        if self.is_deterministic {
            self.result = f();
            self.count = self.count_interval;
            return self.result;
        }
        let time = self.time_source.now();
        if !self.is_first_check {
            let diff = time - self.last_time;
            let adjust_factor = if diff == 0.0 {
                10.0
            } else {
                (self.time_interval / diff).clamp(0.1, 10.0)
            };
            let new_count_interval = adjust_factor * self.count_interval as f64;
            self.count_interval = if new_count_interval > u32::MAX as f64 {
                u32::MAX
            } else if new_count_interval < 1.0 {
                1
            } else {
                new_count_interval as u32
            };
            self.result = f();
            trace!(
                diff,
                adjust_factor,
                count_interval = self.count_interval,
                "interval checker adjusted"
            );
        } else {
            self.is_first_check = false;
        }
        self.last_time = time;
        self.count = self.count_interval;
        self.result
    }
}

// ---------------------------------------------------------------------------
// TimeIntervalChecker — abort on max time or cancellation
// ---------------------------------------------------------------------------

/// Interval checker whose predicate is "the time budget is exhausted or the
/// abort flag is set". Used by the long-running single-threaded phases
/// (subtree extraction, pruning).
pub struct TimeIntervalChecker {
    checker: IntervalChecker,
    time_source: Arc<dyn TimeSource>,
    start_time: f64,
    max_time: f64,
    abort: AbortFlag,
}

impl TimeIntervalChecker {
    pub fn new(time_source: Arc<dyn TimeSource>, max_time: f64, abort: AbortFlag) -> Self {
        let start_time = time_source.now();
        Self {
            checker: IntervalChecker::new(Arc::clone(&time_source), 0.1),
            time_source,
            start_time,
            max_time,
            abort,
        }
    }

    pub fn set_deterministic(&mut self, interval: u32) {
        self.checker.set_deterministic(interval);
    }

    #[inline]
    pub fn check(&mut self) -> bool {
        let time_source = &self.time_source;
        let start_time = self.start_time;
        let max_time = self.max_time;
        let abort = &self.abort;
        self.checker
            .check(|| abort.get() || time_source.now() - start_time > max_time)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::test_support::FakeTimeSource;
    use std::cell::Cell;

    #[test]
    fn deterministic_interval_is_fixed() {
        let source = Arc::new(FakeTimeSource::new());
        let mut checker = IntervalChecker::new(source, 0.1);
        checker.set_deterministic(5);

        let calls = Cell::new(0u32);
        for _ in 0..20 {
            checker.check(|| {
                calls.set(calls.get() + 1);
                false
            });
        }
        // Every 5th call runs the predicate.
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn latches_once_true() {
        let source = Arc::new(FakeTimeSource::new());
        let mut checker = IntervalChecker::new(source, 0.1);
        checker.set_deterministic(1);

        assert!(checker.check(|| true));
        // Predicate is no longer consulted.
        for _ in 0..5 {
            assert!(checker.check(|| panic!("must not run")));
        }
    }

    #[test]
    fn adapts_interval_towards_time_budget() {
        let source = Arc::new(FakeTimeSource::new());
        let mut checker = IntervalChecker::new(Arc::clone(&source) as Arc<dyn TimeSource>, 0.1);

        // First expensive check only records the baseline time.
        checker.check(|| false);
        // Next expensive check sees a 0.01 s gap for 1 call: the interval
        // should grow by the clamped factor (10x1 -> 10).
        source.advance(0.01);
        checker.check(|| false);
        // 9 cheap calls, then the 10th consults the predicate again.
        let calls = Cell::new(0u32);
        for _ in 0..10 {
            checker.check(|| {
                calls.set(calls.get() + 1);
                false
            });
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn time_interval_checker_fires_on_deadline() {
        let source = Arc::new(FakeTimeSource::new());
        let abort = AbortFlag::new();
        let mut checker = TimeIntervalChecker::new(
            Arc::clone(&source) as Arc<dyn TimeSource>,
            1.0,
            abort.clone(),
        );
        checker.set_deterministic(1);

        assert!(!checker.check());
        source.advance(2.0);
        assert!(checker.check());
    }

    #[test]
    fn time_interval_checker_fires_on_abort() {
        let source = Arc::new(FakeTimeSource::new());
        let abort = AbortFlag::new();
        let mut checker = TimeIntervalChecker::new(
            Arc::clone(&source) as Arc<dyn TimeSource>,
            1000.0,
            abort.clone(),
        );
        checker.set_deterministic(1);

        assert!(!checker.check());
        abort.set();
        assert!(checker.check());
    }
}
