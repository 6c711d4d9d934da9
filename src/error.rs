use thiserror::Error;

/// Failure taxonomy for the detection subsystem.
///
/// Device-level failures are fatal to startup; stream failures abort the
/// active recording session only. The coordinator never terminates the
/// process on any of these; callers decide whether to retry `power_on`.
#[derive(Debug, Error)]
pub enum DetectorError {
    /// The microphone could not be opened. No microphone, no detection.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The stream died mid-read. Any in-flight session is discarded.
    #[error("audio stream i/o failure: {0}")]
    IoFailure(String),

    /// Ambient noise never dropped below the sweep bound.
    #[error("calibration timed out after {timeout_ms} ms at threshold {reached:.2}")]
    CalibrationTimeout { timeout_ms: u64, reached: f32 },

    #[error("detector is not powered on")]
    NotRunning,

    #[error("detector is already powered on")]
    AlreadyRunning,
}
