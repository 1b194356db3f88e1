mod elevenlabs;
mod fallback;
mod piper;
mod tone;
mod unavailable;

use crate::config::{ConfigError, TtsBackend, TtsConfig};
use bytes::Bytes;
use futures::future::BoxFuture;
use std::sync::Arc;

pub use elevenlabs::{ElevenLabsSynthesizer, DEFAULT_MODEL_ID, DEFAULT_VOICE_ID};
pub use fallback::FallbackSynthesizer;
pub use piper::PiperSynthesizer;
pub use tone::ToneSynthesizer;
pub use unavailable::UnavailableSynthesizer;

pub const MIME_WAV: &str = "audio/wav";
pub const MIME_MPEG: &str = "audio/mpeg";

/// Encoded audio ready to send to a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpeechAudio {
    pub bytes: Bytes,
    pub mime_type: String,
}

impl SpeechAudio {
    pub fn new(bytes: impl Into<Bytes>, mime_type: &str) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.to_owned(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SynthesisError {
    #[error("speech synthesis is not available")]
    Unavailable,

    #[error("tts quota exhausted")]
    QuotaExhausted,

    #[error("tts service returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("tts request failed: {0}")]
    Request(String),

    #[error("encoding speech audio failed: {0}")]
    Encode(#[from] hound::Error),

    #[error("tts configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("tts error: {0}")]
    Other(String),
}

/// Turns a sentence into playable audio. Backends are swapped through
/// configuration without touching the composer or the HTTP layer.
pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(&self, sentence: String) -> BoxFuture<'_, Result<SpeechAudio, SynthesisError>>;
}

impl<T: SpeechSynthesizer + ?Sized> SpeechSynthesizer for Arc<T> {
    fn synthesize(&self, sentence: String) -> BoxFuture<'_, Result<SpeechAudio, SynthesisError>> {
        (**self).synthesize(sentence)
    }
}

pub fn build_synthesizer(config: &TtsConfig) -> Result<Arc<dyn SpeechSynthesizer>, SynthesisError> {
    config.validate()?;
    let synthesizer: Arc<dyn SpeechSynthesizer> = match config.backend {
        TtsBackend::Unavailable => Arc::new(UnavailableSynthesizer),
        TtsBackend::Tone => Arc::new(ToneSynthesizer::default()),
        TtsBackend::Piper => Arc::new(piper_from(config)?),
        TtsBackend::ElevenLabs => Arc::new(elevenlabs_from(config)?),
        TtsBackend::Fallback => Arc::new(FallbackSynthesizer::new(
            elevenlabs_from(config)?,
            piper_from(config)?,
        )),
    };
    tracing::info!(backend = ?config.backend, "speech synthesizer ready");
    Ok(synthesizer)
}

fn piper_from(config: &TtsConfig) -> Result<PiperSynthesizer, SynthesisError> {
    let model = config
        .piper
        .model
        .clone()
        .ok_or(ConfigError::MissingPiperModel)?;
    Ok(PiperSynthesizer::new(config.piper.binary.clone(), model))
}

fn elevenlabs_from(config: &TtsConfig) -> Result<ElevenLabsSynthesizer, SynthesisError> {
    let key = config
        .elevenlabs_api_key
        .clone()
        .ok_or(ConfigError::MissingElevenLabsKey)?;
    let synthesizer = ElevenLabsSynthesizer::new(key)?;
    Ok(match &config.elevenlabs_voice_id {
        Some(voice_id) => synthesizer.with_voice(voice_id.as_str()),
        None => synthesizer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKey;
    use std::path::PathBuf;

    #[tokio::test]
    async fn default_backend_is_unavailable() {
        let synth = build_synthesizer(&TtsConfig::default()).unwrap();
        let err = synth.synthesize("hello".into()).await.unwrap_err();
        assert!(matches!(err, SynthesisError::Unavailable));
    }

    #[tokio::test]
    async fn tone_backend_returns_wav() {
        let config = TtsConfig {
            backend: TtsBackend::Tone,
            ..TtsConfig::default()
        };
        let audio = build_synthesizer(&config)
            .unwrap()
            .synthesize("I feel happy.".into())
            .await
            .unwrap();
        assert_eq!(audio.mime_type, MIME_WAV);
        assert_eq!(&audio.bytes[..4], b"RIFF");
    }

    #[test]
    fn missing_credentials_fail_at_build_time() {
        let config = TtsConfig {
            backend: TtsBackend::ElevenLabs,
            ..TtsConfig::default()
        };
        assert!(matches!(
            build_synthesizer(&config),
            Err(SynthesisError::Config(ConfigError::MissingElevenLabsKey))
        ));

        let config = TtsConfig {
            backend: TtsBackend::Fallback,
            elevenlabs_api_key: Some(ApiKey::new("k").unwrap()),
            ..TtsConfig::default()
        };
        assert!(matches!(
            build_synthesizer(&config),
            Err(SynthesisError::Config(ConfigError::MissingPiperModel))
        ));
    }

    #[test]
    fn configured_voice_replaces_the_stock_one() {
        let config = TtsConfig {
            backend: TtsBackend::ElevenLabs,
            elevenlabs_api_key: Some(ApiKey::new("k").unwrap()),
            elevenlabs_voice_id: Some("pNInz6obpgDQGcFmaJgB".into()),
            ..TtsConfig::default()
        };
        let debug = format!("{:?}", elevenlabs_from(&config).unwrap());
        assert!(debug.contains("pNInz6obpgDQGcFmaJgB"), "{debug}");
        assert!(!debug.contains(DEFAULT_VOICE_ID), "{debug}");
    }

    #[test]
    fn fallback_builds_with_both_backends_configured() {
        let mut config = TtsConfig {
            backend: TtsBackend::Fallback,
            elevenlabs_api_key: Some(ApiKey::new("k").unwrap()),
            ..TtsConfig::default()
        };
        config.piper.model = Some(PathBuf::from("voices/en_US-amy-medium.onnx"));
        assert!(build_synthesizer(&config).is_ok());
    }
}
