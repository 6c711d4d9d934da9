//! CLI front end: run the detector against a microphone and report every
//! completed recording on stdout.

use std::io::Read;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use soundwatch::audio::CpalAudioSource;
use soundwatch::config::{
    DetectorConfig, DEFAULT_CALIBRATION_INITIAL, DEFAULT_CALIBRATION_MARGIN,
    DEFAULT_CALIBRATION_STEP, DEFAULT_CALIBRATION_TIMEOUT_MS, DEFAULT_FRAME_MS,
    DEFAULT_MAX_CLIP_MS, DEFAULT_MIN_CLIP_MS, DEFAULT_POLL_MS,
};
use soundwatch::{init_tracing, SoundDetector};

/// Ambient-calibrated sound detector.
#[derive(Debug, Parser)]
#[command(about = "Listen on the microphone and report detected sound clips", version)]
struct Cli {
    /// Preferred audio input device name
    #[arg(long)]
    input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long, default_value_t = false)]
    list_input_devices: bool,

    /// Frame length in milliseconds
    #[arg(long, default_value_t = DEFAULT_FRAME_MS)]
    frame_ms: u64,

    /// Detection poll interval in milliseconds
    #[arg(long, default_value_t = DEFAULT_POLL_MS)]
    poll_ms: u64,

    /// Minimum clip duration in milliseconds
    #[arg(long, default_value_t = DEFAULT_MIN_CLIP_MS)]
    min_clip_ms: u64,

    /// Hard maximum clip duration in milliseconds
    #[arg(long, default_value_t = DEFAULT_MAX_CLIP_MS)]
    max_clip_ms: u64,

    /// Calibration sweep starting threshold
    #[arg(long, default_value_t = DEFAULT_CALIBRATION_INITIAL)]
    calibration_initial: f32,

    /// Calibration sweep step
    #[arg(long, default_value_t = DEFAULT_CALIBRATION_STEP)]
    calibration_step: f32,

    /// Margin added above the settled noise floor
    #[arg(long, default_value_t = DEFAULT_CALIBRATION_MARGIN)]
    calibration_margin: f32,

    /// Calibration timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_CALIBRATION_TIMEOUT_MS)]
    calibration_timeout_ms: u64,

    /// Start with the mute gate engaged
    #[arg(long, default_value_t = false)]
    muted: bool,

    /// Emit completed recordings as JSON lines
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Enable file logging
    #[arg(long, env = "SOUNDWATCH_LOGS", default_value_t = false)]
    logs: bool,
}

impl Cli {
    fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            input_device: self.input_device.clone(),
            frame_ms: self.frame_ms,
            poll_ms: self.poll_ms,
            min_clip_ms: self.min_clip_ms,
            max_clip_ms: self.max_clip_ms,
            calibration_initial: self.calibration_initial,
            calibration_step: self.calibration_step,
            calibration_margin: self.calibration_margin,
            calibration_timeout_ms: self.calibration_timeout_ms,
            ..DetectorConfig::default()
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.logs);

    if cli.list_input_devices {
        for name in CpalAudioSource::list_devices().context("listing input devices")? {
            println!("{name}");
        }
        return Ok(());
    }

    let config = cli.detector_config();
    config.validate()?;

    let mut detector = SoundDetector::new(config);
    let json = cli.json;
    detector.subscribe("cli", move |event| {
        if json {
            let line = json!({
                "duration_ms": event.stats.clip_ms,
                "bytes": event.clip.bytes().len(),
                "frames_fed": event.stats.frames_fed,
                "frames_dropped": event.stats.frames_dropped,
                "finish_reason": event.stats.finish_reason.label(),
            });
            println!("{line}");
        } else {
            println!(
                "recording completed: {:.1}s, {} bytes ({})",
                event.clip.duration().as_secs_f64(),
                event.clip.bytes().len(),
                event.stats.finish_reason.label(),
            );
        }
        Ok(())
    });

    detector.power_on().context("starting detector")?;
    if cli.muted {
        detector.set_muted(true);
    }

    eprintln!(
        "listening (threshold {:.2}); press Enter or close stdin to stop",
        detector.calibrated_threshold().unwrap_or_default()
    );
    let mut buf = [0u8; 1];
    let _ = std::io::stdin().read(&mut buf);

    detector.power_off().context("stopping detector")?;
    Ok(())
}
