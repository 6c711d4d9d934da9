use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Shared RMS cutoff for the detection predicate.
///
/// Stored as raw f32 bits so the one-shot calibration pass and the
/// continuously-polling readers exchange it without a lock. Written during
/// calibration only; read-only afterwards.
#[derive(Clone, Debug)]
pub struct ThresholdCell {
    bits: Arc<AtomicU32>,
}

impl ThresholdCell {
    pub fn new(initial: f32) -> Self {
        Self {
            bits: Arc::new(AtomicU32::new(initial.to_bits())),
        }
    }

    pub fn set(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// RMS and peak amplitude of one frame, over samples normalized to [-1, 1].
/// Both results land in [0, 1] for any 16-bit input.
pub(crate) fn rms_and_peak(samples: &[i16]) -> (f32, f32) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let mut energy = 0.0f32;
    let mut peak = 0.0f32;
    for &sample in samples {
        let x = f32::from(sample) / 32_768.0;
        let abs = x.abs();
        if abs > peak {
            peak = abs;
        }
        energy += x * x;
    }
    ((energy / samples.len() as f32).sqrt(), peak)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_cell_round_trips() {
        let cell = ThresholdCell::new(-0.75);
        assert_eq!(cell.get(), -0.75);
        cell.set(0.13);
        assert_eq!(cell.get(), 0.13);
    }

    #[test]
    fn silence_measures_zero() {
        assert_eq!(rms_and_peak(&[0; 256]), (0.0, 0.0));
    }

    #[test]
    fn empty_frame_measures_zero() {
        assert_eq!(rms_and_peak(&[]), (0.0, 0.0));
    }

    #[test]
    fn full_scale_input_measures_one() {
        let samples = vec![i16::MIN; 256];
        let (rms, peak) = rms_and_peak(&samples);
        assert!((rms - 1.0).abs() < 1e-6);
        assert!((peak - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rms_and_peak_stay_in_unit_range() {
        let samples: Vec<i16> = (0..1024)
            .map(|i| ((i as f32 * 0.37).sin() * 29_000.0) as i16)
            .collect();
        let (rms, peak) = rms_and_peak(&samples);
        assert!((0.0..=1.0).contains(&rms));
        assert!((0.0..=1.0).contains(&peak));
        assert!(rms <= peak);
    }
}
