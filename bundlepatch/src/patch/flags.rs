//! Run flags observable from any thread.

use std::sync::atomic::{AtomicBool, Ordering};

/// Point-in-time copy of [`PatchFlags`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagsSnapshot {
    pub is_checking: bool,
    pub is_repairing: bool,
    pub is_done: bool,
}

/// Checking, repairing and done flags of one orchestrator.
///
/// `is_done` is only ever true while the other two are false, and is cleared
/// as soon as a new run starts.
#[derive(Debug, Default)]
pub struct PatchFlags {
    checking: AtomicBool,
    repairing: AtomicBool,
    done: AtomicBool,
}

impl PatchFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_checking(&self) -> bool {
        self.checking.load(Ordering::SeqCst)
    }

    pub fn is_repairing(&self) -> bool {
        self.repairing.load(Ordering::SeqCst)
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// True while a check or repair is in progress.
    pub fn is_busy(&self) -> bool {
        self.is_checking() || self.is_repairing()
    }

    pub fn mark_checking(&self) {
        self.done.store(false, Ordering::SeqCst);
        self.checking.store(true, Ordering::SeqCst);
    }

    pub fn mark_repairing(&self) {
        self.done.store(false, Ordering::SeqCst);
        self.repairing.store(true, Ordering::SeqCst);
    }

    pub fn clear_check(&self) {
        self.checking.store(false, Ordering::SeqCst);
    }

    pub fn clear_repair(&self) {
        self.repairing.store(false, Ordering::SeqCst);
    }

    /// Clear checking and repairing, then set done.
    pub fn mark_done(&self) {
        self.checking.store(false, Ordering::SeqCst);
        self.repairing.store(false, Ordering::SeqCst);
        self.done.store(true, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> FlagsSnapshot {
        FlagsSnapshot {
            is_checking: self.is_checking(),
            is_repairing: self.is_repairing(),
            is_done: self.is_done(),
        }
    }
}
