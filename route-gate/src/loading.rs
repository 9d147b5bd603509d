use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared "something is loading" flag.
///
/// Counted, so overlapping checks do not lower each other's flag.
#[derive(Debug, Clone, Default)]
pub struct LoadingIndicator {
    active: Arc<AtomicUsize>,
}

impl LoadingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag until the returned guard is dropped.
    pub fn begin(&self) -> LoadingGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        LoadingGuard {
            active: self.active.clone(),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.active.load(Ordering::SeqCst) > 0
    }
}

/// Lowers the loading flag on drop.
#[must_use = "the loading flag is lowered as soon as the guard is dropped"]
pub struct LoadingGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}
