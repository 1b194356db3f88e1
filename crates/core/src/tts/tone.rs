use crate::audio::encode_wav_f32;
use crate::tts::{SpeechAudio, SpeechSynthesizer, SynthesisError, MIME_WAV};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::f32::consts::PI;

const MS_PER_CHAR: usize = 100;
const MIN_DURATION_MS: usize = 500;
const MAX_DURATION_MS: usize = 10_000;
const AMPLITUDE: f32 = 0.3;

/// Offline stand-in for a voice: a sine tone whose length follows the
/// sentence. Useful to exercise the full request path without a TTS engine.
#[derive(Clone, Debug)]
pub struct ToneSynthesizer {
    frequency_hz: f32,
    sample_rate_hz: u32,
}

impl Default for ToneSynthesizer {
    fn default() -> Self {
        Self::new(440.0, 22_050)
    }
}

impl ToneSynthesizer {
    pub fn new(frequency_hz: f32, sample_rate_hz: u32) -> Self {
        Self {
            frequency_hz,
            sample_rate_hz,
        }
    }

    fn render(&self, sentence: &str) -> Vec<f32> {
        let duration_ms = (sentence.chars().count() * MS_PER_CHAR)
            .clamp(MIN_DURATION_MS, MAX_DURATION_MS);
        let samples = duration_ms * self.sample_rate_hz as usize / 1000;
        (0..samples)
            .map(|i| {
                let t = i as f32 / self.sample_rate_hz as f32;
                (2.0 * PI * self.frequency_hz * t).sin() * AMPLITUDE
            })
            .collect()
    }
}

impl SpeechSynthesizer for ToneSynthesizer {
    fn synthesize(&self, sentence: String) -> BoxFuture<'_, Result<SpeechAudio, SynthesisError>> {
        async move {
            let samples = self.render(&sentence);
            let wav = encode_wav_f32(&samples, self.sample_rate_hz)?;
            Ok(SpeechAudio::new(wav, MIME_WAV))
        }
        .boxed()
    }
}
