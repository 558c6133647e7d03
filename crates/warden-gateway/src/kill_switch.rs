use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Process-wide switch that forces every plan into simulation.
#[derive(Debug, Clone, Default)]
pub struct KillSwitch {
    active: Arc<AtomicBool>,
}

impl KillSwitch {
    pub fn new(active: bool) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(active)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns the previous state.
    pub fn set(&self, active: bool) -> bool {
        let previous = self.active.swap(active, Ordering::SeqCst);
        if previous != active {
            warn!(active, "kill switch changed");
        }
        previous
    }
}
