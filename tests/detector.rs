//! End-to-end detector runs against scripted audio sources. No microphone
//! or audio device is required.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use soundwatch::audio::{AudioFormat, AudioSource, CaptureStats, FinishReason, Frame};
use soundwatch::config::{DetectorConfig, DEFAULT_FALLBACK_THRESHOLD};
use soundwatch::{Command, DetectorError, DetectorStatus, SoundDetector};

const FRAME_MS: u64 = 10;
const MIN_CLIP_MS: u64 = 150;
const PACING: Duration = Duration::from_millis(2);
const LOUD_AMPLITUDE: i16 = 12_000;

/// Microphone stand-in: emits loud or quiet frames depending on a shared
/// switch, paced faster than real time to keep the tests quick.
struct TestSource {
    loud: Arc<AtomicBool>,
    fail_after: Option<usize>,
    reads: usize,
    frame_samples: usize,
    closed: Arc<AtomicBool>,
    pauses: Arc<AtomicUsize>,
}

impl TestSource {
    fn factory(
        loud: Arc<AtomicBool>,
        fail_after: Option<usize>,
        closed: Arc<AtomicBool>,
        pauses: Arc<AtomicUsize>,
    ) -> impl FnOnce() -> Result<Box<dyn AudioSource>, DetectorError> + Send + 'static {
        move || {
            Ok(Box::new(TestSource {
                loud,
                fail_after,
                reads: 0,
                frame_samples: (AudioFormat::FIXED.sample_rate_hz as u64 * FRAME_MS / 1000)
                    as usize,
                closed,
                pauses,
            }) as Box<dyn AudioSource>)
        }
    }
}

impl AudioSource for TestSource {
    fn format(&self) -> AudioFormat {
        AudioFormat::FIXED
    }

    fn read_frame(&mut self, _timeout: Duration) -> Result<Option<Frame>, DetectorError> {
        thread::sleep(PACING);
        self.reads += 1;
        if let Some(limit) = self.fail_after {
            if self.reads > limit {
                return Err(DetectorError::IoFailure("scripted stream death".to_string()));
            }
        }
        let amplitude = if self.loud.load(Ordering::Relaxed) {
            LOUD_AMPLITUDE
        } else {
            0
        };
        Ok(Some(Frame::new(vec![amplitude; self.frame_samples])))
    }

    fn set_paused(&mut self, _paused: bool) -> Result<(), DetectorError> {
        self.pauses.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for TestSource {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

fn test_config() -> DetectorConfig {
    DetectorConfig {
        frame_ms: FRAME_MS,
        poll_ms: 2,
        min_clip_ms: MIN_CLIP_MS,
        max_clip_ms: 2_000,
        calibration_initial: 0.0,
        calibration_timeout_ms: 1_000,
        ..DetectorConfig::default()
    }
}

struct Rig {
    detector: SoundDetector,
    loud: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    pauses: Arc<AtomicUsize>,
    events: Arc<Mutex<Vec<CaptureStats>>>,
}

fn start_rig(fail_after: Option<usize>) -> Rig {
    let config = test_config();
    config.validate().expect("test config should be valid");
    let mut detector = SoundDetector::new(config);
    let loud = Arc::new(AtomicBool::new(false));
    let closed = Arc::new(AtomicBool::new(false));
    let pauses = Arc::new(AtomicUsize::new(0));
    let events: Arc<Mutex<Vec<CaptureStats>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = events.clone();
    detector.subscribe("test", move |event| {
        sink.lock().unwrap().push(event.stats);
        Ok(())
    });
    detector
        .power_on_with(TestSource::factory(
            loud.clone(),
            fail_after,
            closed.clone(),
            pauses.clone(),
        ))
        .expect("power on should succeed");

    Rig {
        detector,
        loud,
        closed,
        pauses,
        events,
    }
}

fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn records_one_clip_end_to_end() {
    let mut rig = start_rig(None);
    // Quiet room at power-on: calibration settles at initial + margin.
    let threshold = rig
        .detector
        .calibrated_threshold()
        .expect("calibration should have run");
    assert!((threshold - 0.13).abs() < 1e-6);
    assert_eq!(rig.detector.status(), DetectorStatus::Listening);

    rig.loud.store(true, Ordering::Relaxed);
    thread::sleep(Duration::from_millis(120));
    rig.loud.store(false, Ordering::Relaxed);

    assert!(
        wait_until(Duration::from_secs(2), || !rig
            .events
            .lock()
            .unwrap()
            .is_empty()),
        "expected a completed recording"
    );
    // Silence persists: no second clip.
    thread::sleep(Duration::from_millis(200));

    let events = rig.events.lock().unwrap().clone();
    assert_eq!(events.len(), 1, "expected exactly one recording");
    let stats = events[0];
    assert!(stats.clip_ms >= MIN_CLIP_MS, "clip shorter than the minimum");
    assert!(stats.clip_ms < 1_000, "clip unexpectedly long: {}", stats.clip_ms);
    assert_eq!(stats.finish_reason, FinishReason::SilenceElapsed);

    rig.detector.power_off().expect("power off should succeed");
    assert_eq!(rig.detector.status(), DetectorStatus::Off);
    assert!(rig.closed.load(Ordering::Relaxed), "device should be closed");
}

#[test]
fn force_listen_records_minimum_clip_on_silence() {
    let mut rig = start_rig(None);
    rig.detector.force_listen().expect("detector is running");

    assert!(
        wait_until(Duration::from_secs(2), || !rig
            .events
            .lock()
            .unwrap()
            .is_empty()),
        "expected a forced recording"
    );
    let events = rig.events.lock().unwrap().clone();
    assert_eq!(events.len(), 1);
    // Quiet throughout: the session ends exactly at the minimum duration.
    assert_eq!(events[0].clip_ms, MIN_CLIP_MS);
    assert_eq!(events[0].finish_reason, FinishReason::SilenceElapsed);

    rig.detector.power_off().expect("power off should succeed");
}

#[test]
fn mute_pauses_capture_without_recalibration() {
    let mut rig = start_rig(None);
    let threshold_before = rig.detector.calibrated_threshold().unwrap();
    let probe = rig.detector.probe();

    rig.detector.set_muted(true);
    assert!(rig.detector.is_muted());
    assert_eq!(rig.detector.status(), DetectorStatus::Muted);
    assert!(
        wait_until(Duration::from_secs(1), || rig
            .pauses
            .load(Ordering::Relaxed)
            > 0),
        "acquisition should pause the source"
    );

    // Loud audio while muted is never consumed: no trigger, no estimate.
    rig.loud.store(true, Ordering::Relaxed);
    thread::sleep(Duration::from_millis(150));
    assert!(rig.events.lock().unwrap().is_empty(), "muted detector recorded");
    assert!(!probe.sound_detected(), "muted detector consumed frames");
    assert!(
        !rig.closed.load(Ordering::Relaxed),
        "mute must not close the device"
    );

    // Unmute: capture resumes against the same threshold.
    rig.detector.set_muted(false);
    assert!(
        wait_until(Duration::from_secs(2), || !rig
            .events
            .lock()
            .unwrap()
            .is_empty()),
        "expected a recording after unmute"
    );
    rig.loud.store(false, Ordering::Relaxed);
    assert_eq!(rig.detector.calibrated_threshold().unwrap(), threshold_before);
    assert_eq!(probe.threshold(), threshold_before);

    rig.detector.power_off().expect("power off should succeed");
}

#[test]
fn stream_failure_discards_session_and_faults() {
    // Enough reads to calibrate and trigger, then the stream dies mid-clip.
    let mut rig = start_rig(Some(8));
    rig.loud.store(true, Ordering::Relaxed);

    assert!(
        wait_until(Duration::from_secs(2), || rig.detector.status()
            == DetectorStatus::Faulted),
        "detector should fault when the stream dies"
    );
    thread::sleep(Duration::from_millis(100));
    assert!(
        rig.events.lock().unwrap().is_empty(),
        "no partial clip may be delivered"
    );

    // Faulted is not fatal to the process; power cycling still works.
    rig.detector.power_off().expect("power off should succeed");
    assert_eq!(rig.detector.status(), DetectorStatus::Off);
}

#[test]
fn power_off_discards_in_flight_session() {
    let mut rig = start_rig(None);
    rig.loud.store(true, Ordering::Relaxed);
    assert!(
        wait_until(Duration::from_secs(2), || rig.detector.status()
            == DetectorStatus::Recording),
        "expected an active recording"
    );
    rig.detector.power_off().expect("power off should succeed");
    assert!(
        rig.events.lock().unwrap().is_empty(),
        "shutdown must not flush a partial clip"
    );
}

#[test]
fn calibration_timeout_falls_back_to_default_threshold() {
    // Loud from the first frame, with a sweep step too small to clear the
    // noise floor before the bound.
    let config = DetectorConfig {
        calibration_initial: -0.75,
        calibration_step: 0.001,
        calibration_timeout_ms: 100,
        ..test_config()
    };
    config.validate().expect("test config should be valid");
    let mut detector = SoundDetector::new(config);
    let events: Arc<Mutex<Vec<CaptureStats>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    detector.subscribe("test", move |event| {
        sink.lock().unwrap().push(event.stats);
        Ok(())
    });
    detector
        .power_on_with(TestSource::factory(
            Arc::new(AtomicBool::new(true)),
            None,
            Arc::new(AtomicBool::new(false)),
            Arc::new(AtomicUsize::new(0)),
        ))
        .expect("fallback must keep power on alive");

    assert_eq!(
        detector.calibrated_threshold(),
        Some(DEFAULT_FALLBACK_THRESHOLD)
    );
    assert_eq!(detector.status(), DetectorStatus::Listening);

    // The ambient noise that caused the timeout sits below the fallback,
    // so nothing triggers.
    thread::sleep(Duration::from_millis(150));
    assert!(
        events.lock().unwrap().is_empty(),
        "ambient noise tripped the fallback threshold"
    );

    detector.power_off().expect("power off should succeed");
}

#[test]
fn commands_map_to_lifecycle_operations() {
    let mut rig = start_rig(None);

    rig.detector.dispatch(Command::Mute).expect("mute");
    assert!(rig.detector.is_muted());
    assert_eq!(rig.detector.status(), DetectorStatus::Muted);
    rig.detector.dispatch(Command::Unmute).expect("unmute");
    assert!(!rig.detector.is_muted());

    rig.detector
        .dispatch(Command::ForceListen)
        .expect("force listen");
    assert!(
        wait_until(Duration::from_secs(2), || !rig
            .events
            .lock()
            .unwrap()
            .is_empty()),
        "expected a forced recording"
    );

    rig.detector.dispatch(Command::PowerOff).expect("power off");
    assert_eq!(rig.detector.status(), DetectorStatus::Off);
    assert!(matches!(
        rig.detector.dispatch(Command::PowerOff),
        Err(DetectorError::NotRunning)
    ));
}

#[test]
fn device_open_failure_is_surfaced() {
    let mut detector = SoundDetector::new(test_config());
    let result = detector
        .power_on_with(|| Err(DetectorError::DeviceUnavailable("scripted".to_string())));
    assert!(matches!(result, Err(DetectorError::DeviceUnavailable(_))));
    assert_eq!(detector.status(), DetectorStatus::Off);

    // The failure leaves the detector reusable.
    let closed = Arc::new(AtomicBool::new(false));
    detector
        .power_on_with(TestSource::factory(
            Arc::new(AtomicBool::new(false)),
            None,
            closed,
            Arc::new(AtomicUsize::new(0)),
        ))
        .expect("retrying power on should succeed");
    detector.power_off().expect("power off should succeed");
}

#[test]
fn lifecycle_guards_reject_wrong_state() {
    let mut rig = start_rig(None);
    assert!(matches!(
        rig.detector.power_on(),
        Err(DetectorError::AlreadyRunning)
    ));
    rig.detector.power_off().expect("power off should succeed");
    assert!(matches!(
        rig.detector.power_off(),
        Err(DetectorError::NotRunning)
    ));
    assert!(matches!(
        rig.detector.force_listen(),
        Err(DetectorError::NotRunning)
    ));
}
