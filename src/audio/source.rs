//! Microphone input behind a narrow trait so the detection pipeline can run
//! against scripted audio in tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use tracing::{debug, warn};

use super::dispatch::FrameDispatcher;
use super::frame::{AudioFormat, Frame};
use crate::error::DetectorError;

/// Read side of an open microphone stream.
///
/// Implementations hold the device exclusively while open; the handle is
/// owned by the acquisition loop and never crosses threads. Dropping the
/// source closes the device.
pub trait AudioSource {
    /// Stream format. Always [`AudioFormat::FIXED`] for real devices.
    fn format(&self) -> AudioFormat;

    /// Block until the next frame arrives, the timeout elapses (`Ok(None)`),
    /// or the stream dies (`Err(IoFailure)`).
    fn read_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, DetectorError>;

    /// Pause or resume acquisition without releasing the device.
    fn set_paused(&mut self, paused: bool) -> Result<(), DetectorError>;

    /// Frames discarded because a consumer fell behind.
    fn dropped_frames(&self) -> usize {
        0
    }
}

/// CPAL-backed microphone source at the fixed 16 kHz rate.
///
/// The device's native channel count is accepted and downmixed to mono on
/// the callback thread; native f32/i16/u16 samples are converted to i16.
pub struct CpalAudioSource {
    stream: cpal::Stream,
    frames: Receiver<Frame>,
    dropped: Arc<AtomicUsize>,
    device_name: String,
}

impl CpalAudioSource {
    /// List microphone names so callers can expose a device selector.
    pub fn list_devices() -> Result<Vec<String>, DetectorError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|err| DetectorError::DeviceUnavailable(err.to_string()))?;
        let mut names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Open the default (or named) input device with the fixed format.
    /// Failure here is fatal to the subsystem and must not be retried
    /// silently.
    pub fn open(
        preferred_device: Option<&str>,
        frame_samples: usize,
        channel_capacity: usize,
    ) -> Result<Self, DetectorError> {
        let host = cpal::default_host();
        let device = match preferred_device {
            Some(name) => {
                let mut devices = host
                    .input_devices()
                    .map_err(|err| DetectorError::DeviceUnavailable(err.to_string()))?;
                devices
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| {
                        DetectorError::DeviceUnavailable(format!(
                            "input device '{name}' not found"
                        ))
                    })?
            }
            None => host.default_input_device().ok_or_else(|| {
                DetectorError::DeviceUnavailable("no default input device".to_string())
            })?,
        };
        let device_name = device
            .name()
            .unwrap_or_else(|_| "unknown input device".to_string());

        let default_config = device
            .default_input_config()
            .map_err(|err| DetectorError::DeviceUnavailable(err.to_string()))?;
        let native_format = default_config.sample_format();
        let channels = usize::from(default_config.channels().max(1));
        let stream_config = StreamConfig {
            channels: default_config.channels().max(1),
            sample_rate: SampleRate(AudioFormat::FIXED.sample_rate_hz),
            buffer_size: BufferSize::Default,
        };

        let (sender, frames) = bounded::<Frame>(channel_capacity.max(1));
        let dropped = Arc::new(AtomicUsize::new(0));
        let dispatcher = Arc::new(Mutex::new(FrameDispatcher::new(
            frame_samples,
            sender,
            dropped.clone(),
        )));

        let err_fn = |err| warn!(error = %err, "audio stream error");
        let stream = match native_format {
            SampleFormat::F32 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, |sample| sample);
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::I16 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, |sample| f32::from(sample) / 32_768.0);
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::U16 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                device.build_input_stream(
                    &stream_config,
                    move |data: &[u16], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, |sample| {
                                (f32::from(sample) - 32_768.0) / 32_768.0
                            });
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            other => {
                return Err(DetectorError::DeviceUnavailable(format!(
                    "unsupported sample format: {other:?}"
                )))
            }
        }
        .map_err(|err| DetectorError::DeviceUnavailable(err.to_string()))?;

        stream
            .play()
            .map_err(|err| DetectorError::DeviceUnavailable(err.to_string()))?;

        debug!(device = %device_name, channels, format = ?native_format, "input stream opened");

        Ok(Self {
            stream,
            frames,
            dropped,
            device_name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl AudioSource for CpalAudioSource {
    fn format(&self) -> AudioFormat {
        AudioFormat::FIXED
    }

    fn read_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, DetectorError> {
        match self.frames.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(DetectorError::IoFailure(
                "audio stream disconnected".to_string(),
            )),
        }
    }

    fn set_paused(&mut self, paused: bool) -> Result<(), DetectorError> {
        if paused {
            self.stream
                .pause()
                .map_err(|err| DetectorError::IoFailure(err.to_string()))
        } else {
            // Frames queued before the pause are stale; drop them so the
            // first estimate after unmute reflects live audio.
            while self.frames.try_recv().is_ok() {}
            self.stream
                .play()
                .map_err(|err| DetectorError::IoFailure(err.to_string()))
        }
    }

    fn dropped_frames(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub(crate) fn mic_permission_hint() -> &'static str {
    #[cfg(target_os = "macos")]
    {
        "macOS: System Settings > Privacy & Security > Microphone (enable your terminal)."
    }
    #[cfg(target_os = "linux")]
    {
        "Linux: check PipeWire/PulseAudio permissions and ensure the device is not muted."
    }
    #[cfg(target_os = "windows")]
    {
        "Windows: Settings > Privacy & Security > Microphone (allow access for your terminal)."
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        "Check OS microphone permissions."
    }
}
