//! Continuous sound detection with ambient-noise calibration and triggered
//! clip capture.
//!
//! The detector listens on a microphone, auto-calibrates its RMS threshold
//! to the room, and, when sound trips the threshold, records a bounded
//! PCM clip and hands it to registered listeners as a
//! [`RecordingCompleted`] event.

pub mod audio;
pub mod config;
mod detector;
mod error;
mod gate;
mod notify;
mod telemetry;

pub use detector::{Command, DetectorStatus, SoundDetector};
pub use error::DetectorError;
pub use gate::MuteGate;
pub use notify::{CallbackFailure, EventNotifier, PublishReport, RecordingCompleted, SubscriberId};
pub use telemetry::init_tracing;
