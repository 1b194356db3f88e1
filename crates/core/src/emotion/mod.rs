mod classifier;
mod model;
mod simplify;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use classifier::{ClassifyError, EmotionClassifier};
pub use model::{
    ClassifierModel, ModelArtifacts, ModelLoadError, PredictError, ScaleError, StandardScaler,
};
pub use simplify::simplify_emotion;

/// The four categories the AAC front end understands.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SimpleEmotion {
    Distressed,
    Sad,
    Happy,
    Neutral,
}

impl SimpleEmotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimpleEmotion::Distressed => "distressed",
            SimpleEmotion::Sad => "sad",
            SimpleEmotion::Happy => "happy",
            SimpleEmotion::Neutral => "neutral",
        }
    }
}

impl fmt::Display for SimpleEmotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier output for one clip.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    pub raw_label: String,
    /// Probability of `raw_label`, or 0.0 when the model has no estimates.
    pub confidence: f32,
}

impl Prediction {
    pub fn simplified(&self) -> SimpleEmotion {
        simplify_emotion(&self.raw_label)
    }
}
