mod command;
mod file_backed;
mod spectral;

use crate::audio::Waveform;
use crate::config::ExtractorConfig;
use std::path::Path;
use std::sync::Arc;

pub use command::CommandFeatureExtractor;
pub use file_backed::TempFileExtractor;
pub use spectral::{SpectralFeatureExtractor, SPECTRAL_FEATURE_NAMES};

#[derive(thiserror::Error, Debug)]
pub enum ExtractionError {
    #[error("cannot extract features from an empty waveform")]
    EmptyInput,

    #[error("temporary audio file: {0}")]
    TempFile(#[source] std::io::Error),

    #[error("writing temporary wav failed: {0}")]
    WavWrite(#[from] hound::Error),

    #[error("extractor process failed: {0}")]
    Process(String),

    #[error("extractor produced invalid output: {0}")]
    InvalidOutput(String),
}

/// Turns a mono waveform into a fixed-length feature vector.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, waveform: &Waveform) -> Result<Vec<f32>, ExtractionError>;
}

/// An extractor that can only read audio from disk.
///
/// Wrap it in [`TempFileExtractor`] to use it where a [`FeatureExtractor`]
/// is expected.
pub trait FileFeatureExtractor: Send + Sync {
    fn extract_file(&self, wav_path: &Path) -> Result<Vec<f32>, ExtractionError>;
}

impl<T: FeatureExtractor + ?Sized> FeatureExtractor for Arc<T> {
    fn extract(&self, waveform: &Waveform) -> Result<Vec<f32>, ExtractionError> {
        (**self).extract(waveform)
    }
}

/// Builds the extractor selected in configuration. Command extractors read
/// from disk, so they are wrapped to receive a scoped temporary WAV.
pub fn build_extractor(config: &ExtractorConfig) -> Arc<dyn FeatureExtractor> {
    match config {
        ExtractorConfig::Builtin => Arc::new(SpectralFeatureExtractor::default()),
        ExtractorConfig::Command { program, args } => Arc::new(TempFileExtractor::new(
            CommandFeatureExtractor::new(program.clone(), args.clone()),
        )),
    }
}

/// Rejects NaN/inf in an extractor's output.
pub(crate) fn ensure_finite(features: Vec<f32>) -> Result<Vec<f32>, ExtractionError> {
    if let Some(i) = features.iter().position(|v| !v.is_finite()) {
        return Err(ExtractionError::InvalidOutput(format!(
            "feature {i} is not finite"
        )));
    }
    Ok(features)
}
