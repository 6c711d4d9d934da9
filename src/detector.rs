//! Long-lived detection coordinator.
//!
//! Owns the acquisition and polling threads, the shared threshold and mute
//! gate, and the listener registry. One detector instance survives mute
//! cycles in place; muting never discards calibration state.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, TryRecvError};
use tracing::{debug, error, info, warn};

use crate::audio::{
    calibrate, AcquisitionLoop, AmplitudeProbe, AudioFormat, AudioSource, CalibrationConfig,
    CaptureStats, Clip, CpalAudioSource, Frame, RecordingSession, SessionProgress,
};
use crate::config::DetectorConfig;
use crate::error::DetectorError;
use crate::gate::MuteGate;
use crate::notify::{EventNotifier, RecordingCompleted};

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorStatus {
    Off,
    Listening,
    /// Powered on with the mute gate engaged; the device stays open and
    /// calibration is kept.
    Muted,
    Recording,
    /// The audio stream died; polling continues but nothing can trigger
    /// until the detector is power-cycled.
    Faulted,
}

/// Control commands from the outer surface, dispatched onto the lifecycle
/// operations below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    PowerOn,
    PowerOff,
    Mute,
    Unmute,
    ForceListen,
}

struct DetectorThreads {
    acquisition: JoinHandle<()>,
    coordinator: JoinHandle<()>,
}

/// The detection subsystem: continuous amplitude estimation, adaptive
/// threshold calibration, and triggered clip capture with listener
/// notification.
pub struct SoundDetector {
    config: DetectorConfig,
    probe: AmplitudeProbe,
    gate: MuteGate,
    notifier: EventNotifier,
    running: Arc<AtomicBool>,
    force_listen: Arc<AtomicBool>,
    status: Arc<Mutex<DetectorStatus>>,
    forward_drops: Arc<AtomicUsize>,
    threads: Option<DetectorThreads>,
    calibrated_threshold: Option<f32>,
}

impl SoundDetector {
    pub fn new(config: DetectorConfig) -> Self {
        let probe = AmplitudeProbe::new(config.fallback_threshold);
        Self {
            config,
            probe,
            gate: MuteGate::new(),
            notifier: EventNotifier::new(),
            running: Arc::new(AtomicBool::new(false)),
            force_listen: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(DetectorStatus::Off)),
            forward_drops: Arc::new(AtomicUsize::new(0)),
            threads: None,
            calibrated_threshold: None,
        }
    }

    /// A live view of amplitude estimates and the detection threshold,
    /// e.g. for a level meter.
    pub fn probe(&self) -> AmplitudeProbe {
        self.probe.clone()
    }

    pub fn subscribe<F>(&self, id: impl Into<String>, callback: F)
    where
        F: Fn(&RecordingCompleted) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.notifier.subscribe(id, callback);
    }

    pub fn unsubscribe(&self, id: &str) -> bool {
        self.notifier.unsubscribe(id)
    }

    pub fn status(&self) -> DetectorStatus {
        let status = *self.status.lock().unwrap_or_else(|e| e.into_inner());
        if status == DetectorStatus::Listening && self.gate.is_muted() {
            return DetectorStatus::Muted;
        }
        status
    }

    pub fn is_muted(&self) -> bool {
        self.gate.is_muted()
    }

    /// The threshold produced by the last completed calibration pass.
    pub fn calibrated_threshold(&self) -> Option<f32> {
        self.calibrated_threshold
    }

    pub fn dispatch(&mut self, command: Command) -> Result<(), DetectorError> {
        match command {
            Command::PowerOn => self.power_on(),
            Command::PowerOff => self.power_off(),
            Command::Mute => {
                self.set_muted(true);
                Ok(())
            }
            Command::Unmute => {
                self.set_muted(false);
                Ok(())
            }
            Command::ForceListen => self.force_listen(),
        }
    }

    /// Open the configured microphone and start detection.
    pub fn power_on(&mut self) -> Result<(), DetectorError> {
        let device = self.config.input_device.clone();
        let frame_samples = self.config.frame_samples();
        let capacity = self.config.channel_capacity;
        self.power_on_with(move || {
            CpalAudioSource::open(device.as_deref(), frame_samples, capacity)
                .map(|source| Box::new(source) as Box<dyn AudioSource>)
        })
    }

    /// Start detection against any audio source. The factory runs on the
    /// acquisition thread so the device handle never crosses threads.
    pub fn power_on_with<F>(&mut self, factory: F) -> Result<(), DetectorError>
    where
        F: FnOnce() -> Result<Box<dyn AudioSource>, DetectorError> + Send + 'static,
    {
        if self.threads.is_some() {
            return Err(DetectorError::AlreadyRunning);
        }
        self.running.store(true, Ordering::Relaxed);
        self.force_listen.store(false, Ordering::Relaxed);
        self.forward_drops.store(0, Ordering::Relaxed);

        let (frame_tx, frame_rx) = bounded::<Frame>(self.config.channel_capacity.max(1));
        let (ready_tx, ready_rx) = bounded::<Result<(), DetectorError>>(1);

        let acquisition_loop = AcquisitionLoop::new(
            self.probe.clone(),
            self.gate.clone(),
            self.running.clone(),
            frame_tx,
            self.forward_drops.clone(),
            self.config.frame_interval(),
        );
        let acquisition_status = self.status.clone();
        let acquisition = thread::Builder::new()
            .name("soundwatch-acquire".to_string())
            .spawn(move || {
                let source = match factory() {
                    Ok(source) => {
                        let _ = ready_tx.send(Ok(()));
                        source
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                if let Err(err) = acquisition_loop.run(source) {
                    error!(error = %err, "acquisition loop stopped");
                    *acquisition_status.lock().unwrap_or_else(|e| e.into_inner()) =
                        DetectorStatus::Faulted;
                }
            })
            .map_err(|err| DetectorError::IoFailure(err.to_string()))?;

        // Open handshake: a device that cannot be opened is fatal to
        // power-on and is surfaced here, never retried silently.
        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                self.running.store(false, Ordering::Relaxed);
                let _ = acquisition.join();
                return Err(err);
            }
            Err(_) => {
                self.running.store(false, Ordering::Relaxed);
                let _ = acquisition.join();
                return Err(DetectorError::DeviceUnavailable(
                    "acquisition thread died during open".to_string(),
                ));
            }
        }

        // Strict ordering barrier: calibration completes (or falls back)
        // before the coordinator takes its first poll.
        let threshold = match calibrate(&self.probe, &CalibrationConfig::from(&self.config)) {
            Ok(threshold) => threshold,
            Err(err @ DetectorError::CalibrationTimeout { .. }) => {
                warn!(
                    error = %err,
                    fallback = self.config.fallback_threshold,
                    "calibration timed out; using fallback threshold"
                );
                self.probe.set_threshold(self.config.fallback_threshold);
                self.config.fallback_threshold
            }
            Err(err) => {
                self.running.store(false, Ordering::Relaxed);
                let _ = acquisition.join();
                return Err(err);
            }
        };
        self.calibrated_threshold = Some(threshold);

        let worker = CoordinatorLoop {
            probe: self.probe.clone(),
            gate: self.gate.clone(),
            notifier: self.notifier.clone(),
            running: self.running.clone(),
            force_listen: self.force_listen.clone(),
            status: self.status.clone(),
            forward_drops: self.forward_drops.clone(),
            frames: frame_rx,
            poll_interval: self.config.poll_interval(),
            frame_ms: self.config.frame_ms,
            min_clip_ms: self.config.min_clip_ms,
            max_clip_ms: self.config.max_clip_ms,
        };
        let coordinator = thread::Builder::new()
            .name("soundwatch-detect".to_string())
            .spawn(move || worker.run())
            .map_err(|err| DetectorError::IoFailure(err.to_string()))?;

        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = DetectorStatus::Listening;
        self.threads = Some(DetectorThreads {
            acquisition,
            coordinator,
        });
        info!(threshold, "detector powered on");
        Ok(())
    }

    /// Stop both loops, close the device, and discard any in-flight
    /// session. Both threads observe the flag within one poll/frame
    /// interval.
    pub fn power_off(&mut self) -> Result<(), DetectorError> {
        let Some(threads) = self.threads.take() else {
            return Err(DetectorError::NotRunning);
        };
        self.running.store(false, Ordering::Relaxed);
        if threads.coordinator.join().is_err() {
            error!("coordinator thread panicked");
        }
        if threads.acquisition.join().is_err() {
            error!("acquisition thread panicked");
        }
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = DetectorStatus::Off;
        info!("detector powered off");
        Ok(())
    }

    /// Toggle the mute gate in place. Calibration state is preserved; the
    /// device stays open.
    pub fn set_muted(&self, muted: bool) {
        self.gate.set_muted(muted);
    }

    /// Queue an immediate recording trigger for the next poll tick,
    /// regardless of the threshold.
    pub fn force_listen(&self) -> Result<(), DetectorError> {
        if self.threads.is_none() {
            return Err(DetectorError::NotRunning);
        }
        self.force_listen.store(true, Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for SoundDetector {
    fn drop(&mut self) {
        if self.threads.is_some() {
            let _ = self.power_off();
        }
    }
}

/// The polling half: drives the Idle → Recording → Idle state machine at a
/// fixed cadence. Performs no blocking I/O beyond the poll sleep.
struct CoordinatorLoop {
    probe: AmplitudeProbe,
    gate: MuteGate,
    notifier: EventNotifier,
    running: Arc<AtomicBool>,
    force_listen: Arc<AtomicBool>,
    status: Arc<Mutex<DetectorStatus>>,
    forward_drops: Arc<AtomicUsize>,
    frames: Receiver<Frame>,
    poll_interval: Duration,
    frame_ms: u64,
    min_clip_ms: u64,
    max_clip_ms: u64,
}

impl CoordinatorLoop {
    fn run(self) {
        let mut session: Option<RecordingSession> = None;
        let mut drops_at_session_start = 0usize;
        let mut faulted = false;

        while self.running.load(Ordering::Relaxed) {
            match self.tick(&mut session, &mut drops_at_session_start) {
                Ok(()) => {}
                Err(err) => {
                    if session.take().is_some() {
                        warn!("audio stream failed mid-session; discarding partial recording");
                    }
                    if !faulted {
                        error!(error = %err, "frame stream lost; detector needs a power cycle");
                        self.set_status(DetectorStatus::Faulted);
                        faulted = true;
                    }
                }
            }
            thread::sleep(self.poll_interval);
        }

        // Shutdown discards in-flight data; a partial clip is never
        // delivered as completed.
        if session.take().is_some() {
            debug!("shutdown with active session; discarding partial recording");
        }
    }

    fn tick(
        &self,
        session: &mut Option<RecordingSession>,
        drops_at_session_start: &mut usize,
    ) -> Result<(), DetectorError> {
        // Drain everything that arrived since the last tick. Idle frames
        // are discarded; detection works off the probe, not the backlog.
        loop {
            match self.frames.try_recv() {
                Ok(frame) => {
                    if let Some(active) = session.as_mut() {
                        let progress = active.feed(&frame, self.probe.sound_detected());
                        if let SessionProgress::Complete(clip, mut stats) = progress {
                            stats.frames_dropped = self
                                .forward_drops
                                .load(Ordering::Relaxed)
                                .saturating_sub(*drops_at_session_start);
                            *session = None;
                            self.finish(clip, stats);
                        }
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // A disconnect during shutdown is just the acquisition
                    // side exiting first.
                    if self.running.load(Ordering::Relaxed) {
                        return Err(DetectorError::IoFailure(
                            "frame channel disconnected".to_string(),
                        ));
                    }
                    break;
                }
            }
        }

        if session.is_none() {
            let forced = self.force_listen.swap(false, Ordering::Relaxed);
            let triggered = forced || (!self.gate.is_muted() && self.probe.sound_detected());
            if triggered {
                let snapshot = self.probe.snapshot();
                info!(
                    rms = snapshot.rms,
                    threshold = self.probe.threshold(),
                    forced,
                    "sound detected; recording"
                );
                *drops_at_session_start = self.forward_drops.load(Ordering::Relaxed);
                *session = Some(RecordingSession::new(
                    AudioFormat::FIXED,
                    self.frame_ms,
                    self.min_clip_ms,
                    self.max_clip_ms,
                ));
                self.set_status(DetectorStatus::Recording);
            }
        }
        Ok(())
    }

    fn finish(&self, clip: Clip, stats: CaptureStats) {
        self.set_status(DetectorStatus::Listening);
        info!(
            clip_ms = stats.clip_ms,
            frames_fed = stats.frames_fed,
            frames_dropped = stats.frames_dropped,
            reason = stats.finish_reason.label(),
            "recording completed"
        );
        let event = RecordingCompleted { clip, stats };
        let report = self.notifier.publish(&event);
        debug!(
            delivered = report.delivered,
            failures = report.failures.len(),
            "recording event published"
        );
    }

    fn set_status(&self, status: DetectorStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }
}
