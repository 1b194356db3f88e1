use crate::audio::{
    level, resample, AudioDecoder, AudioError, AudioSource, ButterworthHighPass, Waveform,
    DEFAULT_CUTOFF_HZ, DEFAULT_ORDER, DEFAULT_TOP_DB,
};
use crate::config::SampleRate;

const LOG_TARGET: &str = "audio::normalizer";

/// Decode, resample, peak-normalize, trim silence, high-pass. In that order.
#[derive(Clone, Debug)]
pub struct AudioNormalizer {
    target_rate: u32,
    top_db: f32,
    cutoff_hz: f64,
    order: usize,
    decoder: AudioDecoder,
}

impl Default for AudioNormalizer {
    fn default() -> Self {
        Self::new(SampleRate::default())
    }
}

impl AudioNormalizer {
    pub fn new(target_rate: SampleRate) -> Self {
        Self {
            target_rate: target_rate.hz(),
            top_db: DEFAULT_TOP_DB,
            cutoff_hz: DEFAULT_CUTOFF_HZ,
            order: DEFAULT_ORDER,
            decoder: AudioDecoder::new(),
        }
    }

    pub fn with_decoder(mut self, decoder: AudioDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Never fails: any error is logged and yields an empty waveform at the
    /// target rate, which callers must treat as "no usable audio".
    pub fn normalize_and_trim(&self, source: &AudioSource) -> Waveform {
        match self.try_normalize(source) {
            Ok(waveform) => waveform,
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, error = %e, source = ?describe(source), "audio preprocessing failed");
                Waveform::empty(self.target_rate)
            }
        }
    }

    pub fn try_normalize(&self, source: &AudioSource) -> Result<Waveform, AudioError> {
        let decoded = match source {
            AudioSource::Path(path) => crate::audio::decode_file(path)?,
            AudioSource::Bytes(bytes) => self.decoder.decode(bytes)?,
        };
        self.process(decoded.into_mono())
    }

    /// Runs the post-decode steps on an already mono waveform.
    pub fn process(&self, waveform: Waveform) -> Result<Waveform, AudioError> {
        let Waveform {
            samples,
            sample_rate,
        } = waveform;

        let mut samples = if sample_rate != self.target_rate {
            tracing::debug!(target: LOG_TARGET, from = sample_rate, to = self.target_rate, "resampling");
            resample(&samples, sample_rate, self.target_rate)?
        } else {
            samples
        };

        level::normalize_peak_in_place(&mut samples);
        let trimmed = level::trim_silence(&samples, self.top_db);

        let filtered = match ButterworthHighPass::new(self.order, self.cutoff_hz, self.target_rate)
        {
            Ok(filter) => filter.apply(&trimmed),
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "skipping high-pass filter");
                trimmed
            }
        };

        Ok(Waveform::new(filtered, self.target_rate))
    }
}

fn describe(source: &AudioSource) -> String {
    match source {
        AudioSource::Path(p) => p.display().to_string(),
        AudioSource::Bytes(b) => format!("{} bytes", b.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{encode_wav_f32, encode_wav_i16};
    use std::f32::consts::PI;
    use std::path::PathBuf;

    fn clip(rate: u32, channels: u16) -> Vec<u8> {
        // 0.25 s silence, 0.5 s tone, 0.25 s silence
        let n = rate as usize;
        let mut frames = Vec::with_capacity(n * usize::from(channels));
        for i in 0..n {
            let t = i as f32 / rate as f32;
            let s = if (0.25..0.75).contains(&t) {
                ((2.0 * PI * 440.0 * t).sin() * 12_000.0) as i16
            } else {
                0
            };
            for _ in 0..channels {
                frames.push(s);
            }
        }
        encode_wav_i16(&frames, channels, rate).unwrap()
    }

    #[test]
    fn wav_output_rate_matches_target() {
        let normalizer = AudioNormalizer::default();
        for (rate, channels) in [(44_100, 2), (22_050, 1), (16_000, 1), (8_000, 2)] {
            let out = normalizer.normalize_and_trim(&AudioSource::from(clip(rate, channels)));
            assert_eq!(out.sample_rate, 22_050, "input {rate} Hz");
            assert!(!out.is_empty(), "input {rate} Hz");
        }
    }

    #[test]
    fn float_wav_output_rate_matches_target() {
        let rate = 48_000;
        let samples: Vec<f32> = (0..rate)
            .map(|i| (2.0 * PI * 330.0 * i as f32 / rate as f32).sin() * 0.4)
            .collect();
        let wav = encode_wav_f32(&samples, rate).unwrap();
        let out = AudioNormalizer::new(SampleRate::new(16_000).unwrap())
            .normalize_and_trim(&AudioSource::from(wav));
        assert_eq!(out.sample_rate, 16_000);
        assert!(!out.is_empty());
    }

    #[test]
    fn trims_silence_and_normalizes() {
        let normalizer = AudioNormalizer::default();
        let out = normalizer.normalize_and_trim(&AudioSource::from(clip(22_050, 1)));
        // tone is 0.5 s; trimming keeps it plus frame context, never the full second
        assert!(out.duration().as_secs_f32() < 0.8);
        assert!(out.duration().as_secs_f32() > 0.45);
        let peak = out.samples.iter().fold(0.0f32, |m, &s| m.max(s.abs()));
        assert!(peak > 0.8 && peak < 1.2, "peak {peak}");
    }

    #[test]
    fn corrupt_bytes_yield_empty_waveform() {
        let normalizer = AudioNormalizer::new(SampleRate::new(16_000).unwrap());
        let out = normalizer.normalize_and_trim(&AudioSource::from(b"not audio at all".to_vec()));
        assert!(out.is_empty());
        assert_eq!(out.sample_rate, 16_000);
    }

    #[test]
    fn missing_file_yields_empty_waveform() {
        let normalizer = AudioNormalizer::default();
        let out =
            normalizer.normalize_and_trim(&AudioSource::from(PathBuf::from("/no/such/clip.wav")));
        assert!(out.is_empty());
        assert_eq!(out.sample_rate, 22_050);
    }

    #[test]
    fn try_normalize_surfaces_typed_error() {
        let normalizer = AudioNormalizer::default();
        let err = normalizer
            .try_normalize(&AudioSource::from(b"junk".to_vec()))
            .unwrap_err();
        assert!(matches!(err, AudioError::Decode(_)));
    }

    #[test]
    fn reads_from_file_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        std::fs::write(&path, clip(16_000, 1)).unwrap();
        let out = AudioNormalizer::default().normalize_and_trim(&AudioSource::from(path));
        assert_eq!(out.sample_rate, 22_050);
        assert!(!out.is_empty());
    }
}
