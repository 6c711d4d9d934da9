//! Named defaults shared by the library config and the CLI flags.

/// Frame length in milliseconds (512 samples at 16 kHz).
pub const DEFAULT_FRAME_MS: u64 = 32;

/// Coordinator poll cadence.
pub const DEFAULT_POLL_MS: u64 = 10;

/// Minimum clip duration once recording has triggered.
pub const DEFAULT_MIN_CLIP_MS: u64 = 5_000;

/// Hard cap on a single clip under continuous sound.
pub const DEFAULT_MAX_CLIP_MS: u64 = 120_000;

/// Bounded frame-channel capacity between acquisition and coordinator.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

pub const DEFAULT_CALIBRATION_INITIAL: f32 = -0.75;
pub const DEFAULT_CALIBRATION_STEP: f32 = 0.05;
pub const DEFAULT_CALIBRATION_MARGIN: f32 = 0.13;
pub const DEFAULT_CALIBRATION_TIMEOUT_MS: u64 = 5_000;

/// Threshold adopted when calibration times out: high enough that a noisy
/// room does not trigger continuously, low enough that loud events still do.
pub const DEFAULT_FALLBACK_THRESHOLD: f32 = 0.5;

/// Upper validation bound on the clip cap.
pub const MAX_CLIP_HARD_LIMIT_MS: u64 = 600_000;
