use anyhow::{bail, Result};

use super::{DetectorConfig, MAX_CLIP_HARD_LIMIT_MS};

impl DetectorConfig {
    /// Check ranges and cross-field consistency.
    pub fn validate(&self) -> Result<()> {
        if !(5..=120).contains(&self.frame_ms) {
            bail!("frame-ms must be between 5 and 120, got {}", self.frame_ms);
        }
        if !(1..=1_000).contains(&self.poll_ms) {
            bail!("poll-ms must be between 1 and 1000, got {}", self.poll_ms);
        }
        if self.min_clip_ms < self.frame_ms {
            bail!(
                "min-clip-ms must cover at least one frame ({} ms), got {}",
                self.frame_ms,
                self.min_clip_ms
            );
        }
        if self.max_clip_ms < self.min_clip_ms || self.max_clip_ms > MAX_CLIP_HARD_LIMIT_MS {
            bail!(
                "max-clip-ms must be between min-clip-ms ({}) and {MAX_CLIP_HARD_LIMIT_MS}, got {}",
                self.min_clip_ms,
                self.max_clip_ms
            );
        }
        if self.channel_capacity == 0 {
            bail!("channel-capacity must be at least 1");
        }
        if !(-1.0..1.0).contains(&self.calibration_initial) {
            bail!(
                "calibration-initial must be in [-1.0, 1.0), got {}",
                self.calibration_initial
            );
        }
        if self.calibration_step <= 0.0 || !self.calibration_step.is_finite() {
            bail!(
                "calibration-step must be a positive number, got {}",
                self.calibration_step
            );
        }
        if self.calibration_margin < 0.0 || !self.calibration_margin.is_finite() {
            bail!(
                "calibration-margin must be zero or positive, got {}",
                self.calibration_margin
            );
        }
        if self.calibration_timeout_ms == 0 {
            bail!("calibration-timeout-ms must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.fallback_threshold) {
            bail!(
                "fallback-threshold must be in [0.0, 1.0], got {}",
                self.fallback_threshold
            );
        }
        Ok(())
    }
}
