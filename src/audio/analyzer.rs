//! Continuous amplitude estimation over the live frame stream.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, TrySendError};
use tracing::{debug, warn};

use super::frame::Frame;
use super::meter::{rms_and_peak, ThresholdCell};
use super::source::{mic_permission_hint, AudioSource};
use crate::error::DetectorError;
use crate::gate::MuteGate;

/// Warn once if the device stays silent this long after opening.
const STARVATION_WARN_AFTER: Duration = Duration::from_secs(2);

/// Loudness snapshot for one frame. Only the latest one is retained.
#[derive(Debug, Clone, Copy)]
pub struct AmplitudeEstimate {
    pub rms: f32,
    pub peak: f32,
    pub at: Instant,
}

impl AmplitudeEstimate {
    fn silent() -> Self {
        Self {
            rms: 0.0,
            peak: 0.0,
            at: Instant::now(),
        }
    }
}

/// Shared view of the analyzer: the latest completed estimate plus the
/// detection threshold. Cloned between the acquisition loop (writer) and
/// the coordinator/calibrator (readers).
///
/// The estimate is published whole-struct-atomically: a reader never sees
/// the rms of one frame paired with the peak of another.
#[derive(Clone)]
pub struct AmplitudeProbe {
    latest: Arc<Mutex<AmplitudeEstimate>>,
    threshold: ThresholdCell,
}

impl AmplitudeProbe {
    pub fn new(initial_threshold: f32) -> Self {
        Self {
            latest: Arc::new(Mutex::new(AmplitudeEstimate::silent())),
            threshold: ThresholdCell::new(initial_threshold),
        }
    }

    pub fn snapshot(&self) -> AmplitudeEstimate {
        *self.latest.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn publish(&self, estimate: AmplitudeEstimate) {
        *self.latest.lock().unwrap_or_else(|e| e.into_inner()) = estimate;
    }

    pub fn threshold(&self) -> f32 {
        self.threshold.get()
    }

    /// Calibration is the only writer; the threshold is read-only for every
    /// other consumer once the detector is polling.
    pub(crate) fn set_threshold(&self, value: f32) {
        self.threshold.set(value);
    }

    /// True when the most recent completed estimate exceeds the threshold.
    /// Safe to call concurrently with the producing loop.
    pub fn sound_detected(&self) -> bool {
        self.snapshot().rms > self.threshold()
    }
}

/// The acquisition side of the pipeline: reads frames, publishes estimates,
/// and forwards frames to the coordinator channel.
pub(crate) struct AcquisitionLoop {
    probe: AmplitudeProbe,
    gate: MuteGate,
    running: Arc<AtomicBool>,
    frames: Sender<Frame>,
    forward_drops: Arc<AtomicUsize>,
    frame_interval: Duration,
}

impl AcquisitionLoop {
    pub(crate) fn new(
        probe: AmplitudeProbe,
        gate: MuteGate,
        running: Arc<AtomicBool>,
        frames: Sender<Frame>,
        forward_drops: Arc<AtomicUsize>,
        frame_interval: Duration,
    ) -> Self {
        Self {
            probe,
            gate,
            running,
            frames,
            forward_drops,
            frame_interval,
        }
    }

    /// Drive the source until shutdown. Consumes the source so the device
    /// handle lives and dies on this thread.
    pub(crate) fn run(self, mut source: Box<dyn AudioSource>) -> Result<(), DetectorError> {
        let mut paused = false;
        let mut starved_since: Option<Instant> = None;
        let mut starvation_warned = false;

        while self.running.load(Ordering::Relaxed) {
            let muted = self.gate.is_muted();
            if muted != paused {
                source.set_paused(muted)?;
                paused = muted;
                debug!(muted, "mute gate toggled");
            }
            if muted {
                // Frame reads are skipped entirely while the gate is
                // engaged; the device stays open.
                thread::sleep(self.frame_interval);
                continue;
            }

            match source.read_frame(self.frame_interval)? {
                Some(frame) => {
                    starved_since = None;
                    starvation_warned = false;
                    let (rms, peak) = rms_and_peak(frame.samples());
                    self.probe.publish(AmplitudeEstimate {
                        rms,
                        peak,
                        at: Instant::now(),
                    });
                    match self.frames.try_send(frame) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            // The coordinator drains every tick; count the
                            // overflow and keep the estimate fresh.
                            self.forward_drops.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(TrySendError::Disconnected(_)) => break,
                    }
                }
                None => {
                    let since = *starved_since.get_or_insert_with(Instant::now);
                    if !starvation_warned && since.elapsed() > STARVATION_WARN_AFTER {
                        warn!(
                            elapsed_ms = since.elapsed().as_millis() as u64,
                            "no audio frames from device; {}",
                            mic_permission_hint()
                        );
                        starvation_warned = true;
                    }
                }
            }
        }
        Ok(())
    }
}
