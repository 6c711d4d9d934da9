//! Detector configuration and validation helpers.

mod defaults;
mod validation;

pub use defaults::{
    DEFAULT_CALIBRATION_INITIAL, DEFAULT_CALIBRATION_MARGIN, DEFAULT_CALIBRATION_STEP,
    DEFAULT_CALIBRATION_TIMEOUT_MS, DEFAULT_CHANNEL_CAPACITY, DEFAULT_FALLBACK_THRESHOLD,
    DEFAULT_FRAME_MS, DEFAULT_MAX_CLIP_MS, DEFAULT_MIN_CLIP_MS, DEFAULT_POLL_MS,
    MAX_CLIP_HARD_LIMIT_MS,
};

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::AudioFormat;

/// Tuning for the detection subsystem. Validate before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Preferred input device name; the default device when unset.
    pub input_device: Option<String>,
    /// Frame length in milliseconds.
    pub frame_ms: u64,
    /// Coordinator poll interval in milliseconds.
    pub poll_ms: u64,
    /// Minimum clip duration in milliseconds.
    pub min_clip_ms: u64,
    /// Hard maximum clip duration in milliseconds.
    pub max_clip_ms: u64,
    /// Frame-channel capacity between acquisition and coordinator.
    pub channel_capacity: usize,
    /// Calibration sweep starting threshold.
    pub calibration_initial: f32,
    /// Calibration sweep step per re-check.
    pub calibration_step: f32,
    /// Margin added above the settled noise floor.
    pub calibration_margin: f32,
    /// Hard bound on the calibration sweep.
    pub calibration_timeout_ms: u64,
    /// Threshold adopted when calibration times out.
    pub fallback_threshold: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            frame_ms: DEFAULT_FRAME_MS,
            poll_ms: DEFAULT_POLL_MS,
            min_clip_ms: DEFAULT_MIN_CLIP_MS,
            max_clip_ms: DEFAULT_MAX_CLIP_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            calibration_initial: DEFAULT_CALIBRATION_INITIAL,
            calibration_step: DEFAULT_CALIBRATION_STEP,
            calibration_margin: DEFAULT_CALIBRATION_MARGIN,
            calibration_timeout_ms: DEFAULT_CALIBRATION_TIMEOUT_MS,
            fallback_threshold: DEFAULT_FALLBACK_THRESHOLD,
        }
    }
}

impl DetectorConfig {
    /// Samples per frame at the fixed stream rate.
    pub fn frame_samples(&self) -> usize {
        ((AudioFormat::FIXED.sample_rate_hz as u64 * self.frame_ms) / 1000).max(1) as usize
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }
}
