//! Fixed stream format and the frame/clip value types that move through the
//! capture pipeline.

use std::time::Duration;

use serde::Serialize;

/// PCM stream format, fixed for the process lifetime: 16 kHz mono signed
/// 16-bit, big-endian byte order in finalized clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioFormat {
    pub sample_rate_hz: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
    pub big_endian: bool,
}

impl AudioFormat {
    pub const FIXED: AudioFormat = AudioFormat {
        sample_rate_hz: 16_000,
        bits_per_sample: 16,
        channels: 1,
        big_endian: true,
    };

    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample / 8)
    }

    pub fn bytes_per_second(&self) -> usize {
        self.bytes_per_sample() * self.sample_rate_hz as usize * usize::from(self.channels)
    }
}

/// One fixed-size batch of samples read in a single acquisition call.
///
/// Frames are ephemeral: owned by the loop iteration that read them, then
/// either analyzed and discarded or appended to a recording session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    samples: Vec<i16>,
}

impl Frame {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Append this frame's PCM bytes in clip byte order (big-endian).
    pub fn append_bytes(&self, out: &mut Vec<u8>) {
        out.reserve(self.samples.len() * 2);
        for sample in &self.samples {
            out.extend_from_slice(&sample.to_be_bytes());
        }
    }
}

/// Finalized, immutable audio payload of a completed recording session.
///
/// Owned by the notifier call until consumed by listeners; clone to keep it
/// past delivery.
#[derive(Debug, Clone)]
pub struct Clip {
    format: AudioFormat,
    bytes: Vec<u8>,
}

impl Clip {
    pub(crate) fn new(format: AudioFormat, bytes: Vec<u8>) -> Self {
        Self { format, bytes }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn duration(&self) -> Duration {
        let per_second = self.format.bytes_per_second();
        if per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.bytes.len() as f64 / per_second as f64)
    }
}
