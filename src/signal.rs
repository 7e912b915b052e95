use std::f64::consts::TAU;

/// Peak amplitude of generated tones, about -6 dBFS.
pub const TONE_AMPLITUDE: f64 = 16_384.0;

/// Sine oscillator producing interleaved 16-bit samples.
#[derive(Debug, Clone)]
pub struct SineGenerator {
    step: f64,
    phase: f64,
    channels: usize,
}

impl SineGenerator {
    pub fn new(frequency: f64, sample_rate: u32, channels: u16) -> Self {
        Self {
            step: TAU * frequency / sample_rate.max(1) as f64,
            phase: 0.0,
            channels: channels.max(1) as usize,
        }
    }

    /// Appends `frames` frames to `out`, the same sample on every channel.
    pub fn fill(&mut self, out: &mut Vec<i16>, frames: usize) {
        out.reserve(frames * self.channels);
        for _ in 0..frames {
            let sample = (self.phase.sin() * TONE_AMPLITUDE).round() as i16;
            out.extend(std::iter::repeat_n(sample, self.channels));
            self.phase = (self.phase + self.step) % TAU;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_rate_tone_cycles_through_peaks() {
        let mut tone = SineGenerator::new(12_000.0, 48_000, 1);
        let mut out = Vec::new();
        tone.fill(&mut out, 8);
        assert_eq!(out, [0, 16_384, 0, -16_384, 0, 16_384, 0, -16_384]);
    }

    #[test]
    fn channels_carry_the_same_sample() {
        let mut tone = SineGenerator::new(1000.0, 48_000, 2);
        let mut out = Vec::new();
        tone.fill(&mut out, 100);
        tone.fill(&mut out, 100);
        assert_eq!(out.len(), 400);
        assert!(out.chunks(2).all(|pair| pair[0] == pair[1]));
        assert!(out.iter().all(|s| s.unsigned_abs() <= 16_384));
    }
}
