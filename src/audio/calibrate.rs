//! One-shot ambient noise calibration.
//!
//! Runs after the acquisition loop is producing estimates and strictly
//! before the coordinator starts polling. Never concurrent with active
//! detection.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::analyzer::AmplitudeProbe;
use crate::config::DetectorConfig;
use crate::error::DetectorError;

/// Tuning for the startup threshold sweep.
#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    /// Sweep starting point.
    pub initial: f32,
    /// Raise per re-check while sound is still detected.
    pub step: f32,
    /// Safety margin added above the settled noise floor; absorbs
    /// estimation jitter.
    pub margin: f32,
    /// Re-check cadence; the analyzer's natural update rate.
    pub poll: Duration,
    /// Hard bound on the whole sweep.
    pub timeout: Duration,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self::from(&DetectorConfig::default())
    }
}

impl From<&DetectorConfig> for CalibrationConfig {
    fn from(cfg: &DetectorConfig) -> Self {
        Self {
            initial: cfg.calibration_initial,
            step: cfg.calibration_step,
            margin: cfg.calibration_margin,
            poll: Duration::from_millis(cfg.frame_ms),
            timeout: Duration::from_millis(cfg.calibration_timeout_ms),
        }
    }
}

/// Walk the threshold up past the ambient noise floor, then add the margin.
///
/// Monotonically non-decreasing. Returns the settled threshold, or
/// `CalibrationTimeout` if ambient noise keeps the predicate true past the
/// configured bound; the caller then falls back to a safe default.
pub fn calibrate(
    probe: &AmplitudeProbe,
    cfg: &CalibrationConfig,
) -> Result<f32, DetectorError> {
    probe.set_threshold(cfg.initial);
    let started = Instant::now();

    while probe.sound_detected() {
        if started.elapsed() >= cfg.timeout {
            return Err(DetectorError::CalibrationTimeout {
                timeout_ms: cfg.timeout.as_millis() as u64,
                reached: probe.threshold(),
            });
        }
        let next = probe.threshold() + cfg.step;
        debug!(threshold = next, "raising detection threshold");
        probe.set_threshold(next);
        thread::sleep(cfg.poll);
    }

    let settled = probe.threshold() + cfg.margin;
    probe.set_threshold(settled);
    info!(
        threshold = settled,
        took_ms = started.elapsed().as_millis() as u64,
        "calibration settled"
    );
    Ok(settled)
}
