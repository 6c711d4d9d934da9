//! Bounded recording capture.
//!
//! A session drains frames while sound persists and finalizes into an
//! immutable clip once the minimum duration has elapsed and silence has
//! resumed, or the hard maximum is hit.

use std::time::Instant;

use serde::Serialize;

use super::frame::{AudioFormat, Clip, Frame};

/// Why a session finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Minimum duration elapsed and the room went quiet.
    SilenceElapsed,
    /// Continuous sound ran into the hard clip-length cap.
    MaxDuration,
}

impl FinishReason {
    pub fn label(&self) -> &'static str {
        match self {
            FinishReason::SilenceElapsed => "silence_elapsed",
            FinishReason::MaxDuration => "max_duration",
        }
    }
}

/// Per-clip capture counters, carried on the completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    pub clip_ms: u64,
    pub frames_fed: usize,
    pub frames_dropped: usize,
    pub finish_reason: FinishReason,
}

/// Outcome of feeding one frame.
#[derive(Debug)]
pub enum SessionProgress {
    Recording,
    Complete(Clip, CaptureStats),
}

/// An in-flight capture. Created on the Idle → Recording transition,
/// consumed by finalization; aborting is just dropping it.
pub struct RecordingSession {
    buf: Vec<u8>,
    remaining_min_frames: u64,
    remaining_max_frames: u64,
    frames_fed: usize,
    frame_ms: u64,
    started_at: Instant,
    format: AudioFormat,
}

impl RecordingSession {
    pub fn new(format: AudioFormat, frame_ms: u64, min_clip_ms: u64, max_clip_ms: u64) -> Self {
        let frame_ms = frame_ms.max(1);
        let min_frames = min_clip_ms.div_ceil(frame_ms).max(1);
        let max_frames = max_clip_ms.div_ceil(frame_ms).max(min_frames);
        let bytes_per_frame =
            format.bytes_per_sample() * (format.sample_rate_hz as u64 * frame_ms / 1000) as usize;
        Self {
            buf: Vec::with_capacity(bytes_per_frame * min_frames as usize),
            remaining_min_frames: min_frames,
            remaining_max_frames: max_frames,
            frames_fed: 0,
            frame_ms,
            started_at: Instant::now(),
            format,
        }
    }

    /// Append one frame and advance the countdown.
    ///
    /// `sound_active` is the detection predicate sampled by the coordinator
    /// for this frame; it extends the session past the minimum but never
    /// resets the countdown. The countdown saturates at zero rather than
    /// going negative under continuous sound.
    pub fn feed(&mut self, frame: &Frame, sound_active: bool) -> SessionProgress {
        frame.append_bytes(&mut self.buf);
        self.frames_fed += 1;
        self.remaining_min_frames = self.remaining_min_frames.saturating_sub(1);
        self.remaining_max_frames = self.remaining_max_frames.saturating_sub(1);

        if self.remaining_max_frames == 0 {
            return self.finalize(FinishReason::MaxDuration);
        }
        if self.remaining_min_frames == 0 && !sound_active {
            return self.finalize(FinishReason::SilenceElapsed);
        }
        SessionProgress::Recording
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Audio time captured so far, in frame granularity.
    pub fn captured_ms(&self) -> u64 {
        self.frames_fed as u64 * self.frame_ms
    }

    fn finalize(&mut self, reason: FinishReason) -> SessionProgress {
        let clip = Clip::new(self.format, std::mem::take(&mut self.buf));
        let stats = CaptureStats {
            clip_ms: self.captured_ms(),
            frames_fed: self.frames_fed,
            frames_dropped: 0,
            finish_reason: reason,
        };
        SessionProgress::Complete(clip, stats)
    }
}
