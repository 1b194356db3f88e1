//! HTTP surface: clip analysis, sentence-to-speech and a liveness probe.

mod error;
mod handlers;

use crate::compose::{PhraseTable, PhraseTableError, SentenceComposer};
use crate::config::AppConfig;
use crate::emotion::{EmotionClassifier, ModelLoadError};
use crate::tts::{build_synthesizer, SpeechSynthesizer, SynthesisError};
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use handlers::{AnalyzeResponse, ComposeRequest};

/// Recorded clips are short; this leaves room for a minute of stereo WAV.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub struct AppState {
    pub classifier: Arc<EmotionClassifier>,
    pub composer: SentenceComposer,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

#[derive(thiserror::Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Model(#[from] ModelLoadError),

    #[error(transparent)]
    Phrases(#[from] PhraseTableError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}

impl AppState {
    pub fn new(
        classifier: EmotionClassifier,
        composer: SentenceComposer,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            classifier: Arc::new(classifier),
            composer,
            synthesizer,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, StartupError> {
        let classifier = EmotionClassifier::from_config(config)?;
        let table = match &config.phrases_path {
            Some(path) => PhraseTable::default().load_overrides(path)?,
            None => PhraseTable::default(),
        };
        let synthesizer = build_synthesizer(&config.tts)?;
        Ok(Self::new(
            classifier,
            SentenceComposer::new(table),
            synthesizer,
        ))
    }
}

/// `*` allows any origin; otherwise a comma-separated list.
fn cors_layer(origins: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);
    if origins.trim() == "*" {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    layer.allow_origin(origins)
}

pub fn router(state: Arc<AppState>, cors_origins: &str) -> Router {
    Router::new()
        .route("/analyze-emotion", post(handlers::analyze_emotion))
        .route("/compose-and-speak", post(handlers::compose_and_speak))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
