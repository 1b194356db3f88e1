use crate::config::ApiKey;
use crate::tts::{SpeechAudio, SpeechSynthesizer, SynthesisError, MIME_MPEG};
use crate::util::{is_http_retryable, retry_with_backoff, RetryConfig};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use url::Url;

pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";
pub const DEFAULT_MODEL_ID: &str = "eleven_monolingual_v1";
const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const LOG_TARGET: &str = "tts::elevenlabs";

#[derive(Clone)]
pub struct ElevenLabsSynthesizer {
    client: Client,
    api_key: ApiKey,
    base_url: Url,
    voice_id: String,
    model_id: String,
    retry: RetryConfig,
}

impl std::fmt::Debug for ElevenLabsSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElevenLabsSynthesizer")
            .field("api_key", &self.api_key)
            .field("base_url", &self.base_url.as_str())
            .field("voice_id", &self.voice_id)
            .field("model_id", &self.model_id)
            .finish()
    }
}

#[derive(Serialize)]
struct TextToSpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }
}

impl ElevenLabsSynthesizer {
    pub fn new(api_key: ApiKey) -> Result<Self, SynthesisError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SynthesisError::Request(format!("building http client: {e}")))?;
        let base_url = Url::parse(DEFAULT_BASE_URL)
            .map_err(|e| SynthesisError::Other(format!("invalid base url: {e}")))?;
        Ok(Self {
            client,
            api_key,
            base_url,
            voice_id: DEFAULT_VOICE_ID.to_owned(),
            model_id: DEFAULT_MODEL_ID.to_owned(),
            retry: RetryConfig::default(),
        })
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = voice_id.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> Result<Url, SynthesisError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/text-to-speech/{}", self.voice_id))
            .map_err(|e| SynthesisError::Other(format!("invalid endpoint url: {e}")))
    }

    async fn request_once(&self, url: &Url, sentence: &str) -> Result<Bytes, SynthesisError> {
        let body = TextToSpeechRequest {
            text: sentence,
            model_id: &self.model_id,
            voice_settings: VoiceSettings::default(),
        };
        let response = self
            .client
            .post(url.clone())
            .header("xi-api-key", self.api_key.expose())
            .header("Accept", MIME_MPEG)
            .json(&body)
            .send()
            .await
            .map_err(|e| SynthesisError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .bytes()
                .await
                .map_err(|e| SynthesisError::Request(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, body))
    }
}

/// 402 always means the plan is out of characters; 401 is only a quota
/// problem when the body says so, otherwise the key is bad.
fn classify_failure(status: StatusCode, body: String) -> SynthesisError {
    let quota = status == StatusCode::PAYMENT_REQUIRED
        || (status == StatusCode::UNAUTHORIZED && body.to_ascii_lowercase().contains("quota"));
    if quota {
        SynthesisError::QuotaExhausted
    } else {
        SynthesisError::Http {
            status: status.as_u16(),
            body,
        }
    }
}

fn is_retryable(error: &SynthesisError) -> bool {
    match error {
        SynthesisError::Http { status, .. } => is_http_retryable(*status),
        SynthesisError::Request(_) => true,
        _ => false,
    }
}

impl SpeechSynthesizer for ElevenLabsSynthesizer {
    fn synthesize(&self, sentence: String) -> BoxFuture<'_, Result<SpeechAudio, SynthesisError>> {
        async move {
            let url = &self.endpoint()?;
            let sentence = sentence.as_str();
            let audio = retry_with_backoff(
                &self.retry,
                move || self.request_once(url, sentence),
                is_retryable,
            )
            .await?;
            tracing::debug!(target: LOG_TARGET, bytes = audio.len(), voice = %self.voice_id, "synthesized sentence");
            Ok(SpeechAudio::new(audio, MIME_MPEG))
        }
        .boxed()
    }
}
