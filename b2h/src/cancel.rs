use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative stop flag shared between the converter and its caller.
/// Cloning hands out another handle to the same flag, so the frontend can keep
/// one copy for its signal handler while the converter polls the other.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// Ask the conversion to stop at the next safe point.
    /// The converter never abandons a half-packed word.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst); // strict ordering
    }

    /// Returns true once any handle has requested cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
