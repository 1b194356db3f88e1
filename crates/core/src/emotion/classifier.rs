use crate::audio::{AudioDecoder, AudioError, AudioNormalizer, DecodeError};
use crate::config::AppConfig;
use crate::emotion::{ModelArtifacts, ModelLoadError, PredictError, Prediction, ScaleError};
use crate::features::{build_extractor, ExtractionError, FeatureExtractor};
use std::sync::Arc;

const LOG_TARGET: &str = "emotion::classifier";

#[derive(thiserror::Error, Debug)]
pub enum ClassifyError {
    #[error("could not decode audio: {0}")]
    Decode(#[from] DecodeError),

    #[error("audio preprocessing failed: {0}")]
    Audio(AudioError),

    #[error("feature extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("feature scaling failed: {0}")]
    Scale(#[from] ScaleError),

    #[error("prediction failed: {0}")]
    Predict(#[from] PredictError),
}

impl From<AudioError> for ClassifyError {
    fn from(e: AudioError) -> Self {
        match e {
            AudioError::Decode(d) => ClassifyError::Decode(d),
            other => ClassifyError::Audio(other),
        }
    }
}

/// Audio clip in, emotion label out. Holds the fitted artifacts for the life
/// of the process; share it behind an `Arc`.
pub struct EmotionClassifier {
    decoder: AudioDecoder,
    normalizer: Option<AudioNormalizer>,
    extractor: Arc<dyn FeatureExtractor>,
    artifacts: ModelArtifacts,
}

impl std::fmt::Debug for EmotionClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmotionClassifier")
            .field("decoder", &self.decoder)
            .field("preprocess", &self.normalizer.is_some())
            .field("classes", &self.artifacts.model.classes())
            .finish()
    }
}

impl EmotionClassifier {
    pub fn new(artifacts: ModelArtifacts, extractor: Arc<dyn FeatureExtractor>) -> Self {
        Self {
            decoder: AudioDecoder::new(),
            normalizer: None,
            extractor,
            artifacts,
        }
    }

    /// Loads the model artifacts and wires the extractor and decoder chosen
    /// in `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, ModelLoadError> {
        let artifacts = ModelArtifacts::load(&config.models.scaler, &config.models.classifier)?;
        tracing::info!(
            target: LOG_TARGET,
            classes = ?artifacts.model.classes(),
            features = artifacts.n_features(),
            "loaded emotion model"
        );

        let rate = config.audio.sample_rate;
        let decoder = if config.audio.ffmpeg_fallback {
            AudioDecoder::new().with_ffmpeg_fallback(rate.hz())
        } else {
            AudioDecoder::new()
        };

        let mut classifier = Self::new(artifacts, build_extractor(&config.extractor))
            .with_decoder(decoder.clone());
        if config.audio.preprocess {
            classifier =
                classifier.with_preprocessing(AudioNormalizer::new(rate).with_decoder(decoder));
        }
        Ok(classifier)
    }

    pub fn with_decoder(mut self, decoder: AudioDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Runs the normalizer's resample/trim/filter steps before extraction.
    pub fn with_preprocessing(mut self, normalizer: AudioNormalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn artifacts(&self) -> &ModelArtifacts {
        &self.artifacts
    }

    /// Blocking; call from `spawn_blocking` inside async code.
    pub fn classify(&self, audio: &[u8]) -> Result<Prediction, ClassifyError> {
        let decoded = self.decoder.decode(audio)?;
        tracing::debug!(
            target: LOG_TARGET,
            channels = decoded.channels,
            sample_rate = decoded.sample_rate,
            samples = decoded.samples.len(),
            "decoded clip"
        );
        let mut waveform = decoded.into_mono();

        if let Some(normalizer) = &self.normalizer {
            waveform = normalizer.process(waveform)?;
            if waveform.is_empty() {
                return Err(DecodeError::Empty.into());
            }
        }

        let features = self.extractor.extract(&waveform)?;
        let scaled = self.artifacts.scaler.transform(&features)?;

        let model = &self.artifacts.model;
        let index = model.predict_index(&scaled)?;
        let confidence = model
            .predict_proba(&scaled)?
            .and_then(|proba| proba.get(index).copied())
            .unwrap_or(0.0);
        let raw_label = model.classes()[index].clone();

        tracing::info!(target: LOG_TARGET, label = %raw_label, confidence, "classified clip");
        Ok(Prediction {
            raw_label,
            confidence,
        })
    }
}
