//! Audio capture and sound-detection pipeline.
//!
//! Frames are acquired from the microphone at a fixed 16 kHz mono 16-bit
//! format, measured for RMS/peak amplitude, and, once the adaptive
//! threshold trips, drained into a bounded recording session.

mod analyzer;
mod calibrate;
mod dispatch;
mod frame;
mod meter;
mod session;
mod source;

pub(crate) use analyzer::AcquisitionLoop;
pub use analyzer::{AmplitudeEstimate, AmplitudeProbe};
pub use calibrate::{calibrate, CalibrationConfig};
pub use frame::{AudioFormat, Clip, Frame};
pub use session::{CaptureStats, FinishReason, RecordingSession, SessionProgress};
pub use source::{AudioSource, CpalAudioSource};
