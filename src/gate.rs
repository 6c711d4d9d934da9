//! Shared mute gate checked by the acquisition loop before every frame read.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Pauses frame acquisition without tearing down the audio device.
///
/// Cheap to clone; every clone observes the same flag. The atomic store
/// guarantees a reader never sees a torn write, which a plain shared bool
/// would not.
#[derive(Clone, Debug, Default)]
pub struct MuteGate {
    muted: Arc<AtomicBool>,
}

impl MuteGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callable from any thread, e.g. an external mute button.
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_starts_open() {
        assert!(!MuteGate::new().is_muted());
    }

    #[test]
    fn clones_share_the_same_flag() {
        let gate = MuteGate::new();
        let other = gate.clone();
        gate.set_muted(true);
        assert!(other.is_muted());
        other.set_muted(false);
        assert!(!gate.is_muted());
    }
}
