//! Cooperative stop signal for in-flight generations

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable stop request shared between a host and a running stream.
///
/// The host calls [`StopFlag::request`] (for example from a Ctrl-C handler)
/// and the streamer polls [`StopFlag::take`] once per received frame. Taking
/// the request clears it, so the next generation starts unstopped.
#[derive(Debug, Clone, Default)]
pub struct StopFlag {
    requested: Arc<AtomicBool>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the current generation to stop at the next frame boundary
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested and not yet observed
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Observe and clear a pending stop request
    ///
    /// Returns `true` exactly once per `request()`.
    pub fn take(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }
}
