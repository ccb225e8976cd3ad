use std::f32::consts::PI;

/// A short synthesized sine chime, no audio asset needed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub frequency_hz: f32,
    pub duration_secs: f32,
    pub start_gain: f32,
    pub end_gain: f32,
}

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

impl Tone {
    /// The new-order chime: 800 Hz for half a second, fading from 0.3 to 0.01
    pub fn order_chime() -> Self {
        Self {
            frequency_hz: 800.0,
            duration_secs: 0.5,
            start_gain: 0.3,
            end_gain: 0.01,
        }
    }

    pub fn sample_count(&self, sample_rate: u32) -> usize {
        (self.duration_secs * sample_rate as f32).round() as usize
    }

    /// Gain at time `t`, ramping exponentially between start and end gain
    fn gain_at(&self, t: f32) -> f32 {
        let progress = (t / self.duration_secs).clamp(0.0, 1.0);
        self.start_gain * (self.end_gain / self.start_gain).powf(progress)
    }

    /// Mono PCM samples in [-1.0, 1.0]
    pub fn samples(&self, sample_rate: u32) -> Vec<f32> {
        (0..self.sample_count(sample_rate))
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (2.0 * PI * self.frequency_hz * t).sin() * self.gain_at(t)
            })
            .collect()
    }

    /// 16-bit mono PCM WAV
    pub fn to_wav(&self, sample_rate: u32) -> Vec<u8> {
        let samples = self.samples(sample_rate);
        let data_len = (samples.len() * 2) as u32;
        let mut wav = Vec::with_capacity(44 + data_len as usize);

        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(36 + data_len).to_le_bytes());
        wav.extend_from_slice(b"WAVE");

        wav.extend_from_slice(b"fmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
        wav.extend_from_slice(&1u16.to_le_bytes()); // mono
        wav.extend_from_slice(&sample_rate.to_le_bytes());
        wav.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
        wav.extend_from_slice(&2u16.to_le_bytes()); // block align
        wav.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&data_len.to_le_bytes());
        for sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            wav.extend_from_slice(&value.to_le_bytes());
        }

        wav
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_count_matches_duration() {
        let tone = Tone::order_chime();
        assert_eq!(tone.sample_count(8_000), 4_000);
        assert_eq!(tone.samples(8_000).len(), 4_000);
    }

    #[test]
    fn test_envelope_fades_out() {
        let tone = Tone::order_chime();
        assert!((tone.gain_at(0.0) - 0.3).abs() < 1e-6);
        assert!((tone.gain_at(0.5) - 0.01).abs() < 1e-6);
        assert!(tone.gain_at(0.25) < 0.3 && tone.gain_at(0.25) > 0.01);

        let samples = tone.samples(DEFAULT_SAMPLE_RATE);
        let peak = |s: &[f32]| s.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        let head = peak(&samples[..1_000]);
        let tail = peak(&samples[samples.len() - 1_000..]);
        assert!(head <= 0.3 + 1e-6);
        assert!(tail < head);
    }

    #[test]
    fn test_wav_header() {
        let wav = Tone::order_chime().to_wav(8_000);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[36..40], b"data");
        let data_len = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
        assert_eq!(data_len, 8_000);
        assert_eq!(wav.len(), 44 + 8_000);
    }
}
