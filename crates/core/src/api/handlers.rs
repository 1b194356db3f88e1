use crate::api::{ApiError, AppState};
use crate::emotion::SimpleEmotion;
use crate::tts::SpeechSynthesizer;
use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

const UPLOAD_FIELD: &str = "file";
const OUTPUT_DISPOSITION: &str = "inline; filename=\"output.wav\"";

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AnalyzeResponse {
    pub raw_emotion: String,
    pub emotion: SimpleEmotion,
    pub confidence: f32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ComposeRequest {
    pub emotion: String,
    pub choices: Vec<String>,
    /// Free text from the caregiver; accepted for forward compatibility.
    #[serde(default)]
    pub context: Option<String>,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Takes the part named `file`, or else the first part that carries a
/// filename.
async fn read_upload(mut multipart: Multipart) -> Result<Bytes, ApiError> {
    let mut fallback = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let named = field.name() == Some(UPLOAD_FIELD);
        let has_filename = field.file_name().is_some();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;
        if named {
            return Ok(data);
        }
        if has_filename && fallback.is_none() {
            fallback = Some(data);
        }
    }
    fallback.ok_or_else(|| ApiError::BadRequest("no audio file in request".into()))
}

pub async fn analyze_emotion(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let audio = read_upload(multipart).await?;
    if audio.is_empty() {
        return Err(ApiError::BadRequest("uploaded file is empty".into()));
    }
    tracing::debug!(bytes = audio.len(), "received clip");

    let classifier = state.classifier.clone();
    let prediction = tokio::task::spawn_blocking(move || classifier.classify(&audio))
        .await
        .map_err(|e| ApiError::Internal(format!("classification task failed: {e}")))??;

    let emotion = prediction.simplified();
    Ok(Json(AnalyzeResponse {
        raw_emotion: prediction.raw_label,
        emotion,
        confidence: prediction.confidence,
    }))
}

pub async fn compose_and_speak(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ComposeRequest>,
) -> Result<Response, ApiError> {
    let sentence = state.composer.compose(&request.emotion, request.choices.as_slice());
    tracing::info!(
        emotion = %request.emotion,
        choices = request.choices.len(),
        has_context = request.context.is_some(),
        %sentence,
        "composed sentence"
    );

    let audio = state.synthesizer.synthesize(sentence).await?;

    let mut headers = HeaderMap::new();
    let content_type = HeaderValue::from_str(&audio.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static(OUTPUT_DISPOSITION),
    );

    Ok((StatusCode::OK, headers, audio.bytes).into_response())
}
