//! Verification logging switch
//!
//! [`VerificationFlag`] is owned by whoever is allowed to flip it (the control
//! surface); everything else gets a [`VerificationFlagReader`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide switch gating mismatch diagnostics. Starts disabled.
#[derive(Debug, Default)]
pub struct VerificationFlag {
    enabled: Arc<AtomicBool>,
}

impl VerificationFlag {
    /// Create a disabled flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the flag and return the new state
    pub fn toggle(&self) -> bool {
        !self.enabled.fetch_xor(true, Ordering::Relaxed)
    }

    /// Current state
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Read-only view sharing this flag's state
    pub fn reader(&self) -> VerificationFlagReader {
        VerificationFlagReader {
            enabled: Arc::clone(&self.enabled),
        }
    }
}

/// Read-only view of a [`VerificationFlag`].
///
/// Reads are relaxed: a toggle becomes visible to readers eventually, which
/// is all a log gate needs.
#[derive(Debug, Clone, Default)]
pub struct VerificationFlagReader {
    enabled: Arc<AtomicBool>,
}

impl VerificationFlagReader {
    /// Current state
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}
