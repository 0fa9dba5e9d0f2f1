//! One-way shutdown signal shared between the control channel and the
//! supervisor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop request.
///
/// Starts out clear and can only ever be set. Clones observe the same flag,
/// so one handle is given to the control channel (the single writer) and
/// another to the supervisor.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Create a cleared flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown.
    ///
    /// Returns `true` only for the call that performed the false-to-true
    /// transition; later calls are no-ops and return `false`.
    pub fn request(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
