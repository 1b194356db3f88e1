use crate::tts::{SpeechAudio, SpeechSynthesizer, SynthesisError};
use futures::future::BoxFuture;
use futures::FutureExt;

/// Placeholder used until a real backend is configured. Every call fails
/// with [`SynthesisError::Unavailable`].
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableSynthesizer;

impl SpeechSynthesizer for UnavailableSynthesizer {
    fn synthesize(&self, sentence: String) -> BoxFuture<'_, Result<SpeechAudio, SynthesisError>> {
        async move {
            tracing::debug!(chars = sentence.len(), "no speech backend configured");
            Err(SynthesisError::Unavailable)
        }
        .boxed()
    }
}
