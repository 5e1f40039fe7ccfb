use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// AbortFlag — cooperative cancellation
// ---------------------------------------------------------------------------

/// Shared cancellation flag.
///
/// Any thread (typically a UI) may set it; workers poll it on the
/// expensive-abort path and the controller checks it before swapping trees.
/// Cancellation is cooperative: in-flight simulations finish their backup
/// before the search returns. The flag is not cleared by the search — the
/// embedder resets it before starting a new one.
#[derive(Clone, Debug, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_is_visible_through_clones() {
        let flag = AbortFlag::new();
        let other = flag.clone();
        assert!(!other.get());
        flag.set();
        assert!(other.get());
        other.clear();
        assert!(!flag.get());
    }
}
