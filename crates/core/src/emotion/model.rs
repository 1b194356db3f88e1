use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ModelLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid model artifact: {0}")]
    Invalid(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ScaleError {
    #[error("feature vector has {actual} values, scaler expects {expected}")]
    Shape { expected: usize, actual: usize },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PredictError {
    #[error("input has {actual} values, model expects {expected}")]
    Shape { expected: usize, actual: usize },
}

/// Per-feature standardization fitted at training time: `(x - mean) / scale`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StandardScaler {
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
}

impl StandardScaler {
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn validate(&self) -> Result<(), ModelLoadError> {
        if self.mean.is_empty() {
            return Err(ModelLoadError::Invalid("scaler has no features".into()));
        }
        if self.mean.len() != self.scale.len() {
            return Err(ModelLoadError::Invalid(format!(
                "scaler mean has {} values but scale has {}",
                self.mean.len(),
                self.scale.len()
            )));
        }
        Ok(())
    }

    pub fn transform(&self, features: &[f32]) -> Result<Vec<f32>, ScaleError> {
        if features.len() != self.mean.len() {
            return Err(ScaleError::Shape {
                expected: self.mean.len(),
                actual: features.len(),
            });
        }
        Ok(features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| {
                // constant features were fitted with scale 0
                let s = if *s == 0.0 { 1.0 } else { *s };
                (x - m) / s
            })
            .collect())
    }
}

/// Serialized classifier. `kind` selects the decision rule.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierModel {
    /// Multinomial logistic regression. A single coefficient row is the
    /// binary form: it scores `classes[1]` against `classes[0]`.
    Logistic {
        classes: Vec<String>,
        coef: Vec<Vec<f32>>,
        intercept: Vec<f32>,
    },
    /// Closest centroid by Euclidean distance; exposes no probabilities.
    NearestCentroid {
        classes: Vec<String>,
        centroids: Vec<Vec<f32>>,
    },
}

impl ClassifierModel {
    pub fn classes(&self) -> &[String] {
        match self {
            ClassifierModel::Logistic { classes, .. } => classes,
            ClassifierModel::NearestCentroid { classes, .. } => classes,
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            ClassifierModel::Logistic { coef, .. } => coef.first().map_or(0, Vec::len),
            ClassifierModel::NearestCentroid { centroids, .. } => {
                centroids.first().map_or(0, Vec::len)
            }
        }
    }

    pub fn supports_probabilities(&self) -> bool {
        matches!(self, ClassifierModel::Logistic { .. })
    }

    pub fn validate(&self) -> Result<(), ModelLoadError> {
        let classes = self.classes();
        if classes.is_empty() {
            return Err(ModelLoadError::Invalid("model has no classes".into()));
        }
        let rows: &[Vec<f32>] = match self {
            ClassifierModel::Logistic {
                coef, intercept, ..
            } => {
                let binary = classes.len() == 2 && coef.len() == 1;
                if !binary && coef.len() != classes.len() {
                    return Err(ModelLoadError::Invalid(format!(
                        "{} coefficient rows for {} classes",
                        coef.len(),
                        classes.len()
                    )));
                }
                if intercept.len() != coef.len() {
                    return Err(ModelLoadError::Invalid(format!(
                        "{} intercepts for {} coefficient rows",
                        intercept.len(),
                        coef.len()
                    )));
                }
                coef
            }
            ClassifierModel::NearestCentroid { centroids, .. } => {
                if centroids.len() != classes.len() {
                    return Err(ModelLoadError::Invalid(format!(
                        "{} centroids for {} classes",
                        centroids.len(),
                        classes.len()
                    )));
                }
                centroids
            }
        };
        let width = self.n_features();
        if width == 0 || rows.iter().any(|r| r.len() != width) {
            return Err(ModelLoadError::Invalid(
                "model rows must be non-empty and equally wide".into(),
            ));
        }
        Ok(())
    }

    fn check_width(&self, x: &[f32]) -> Result<(), PredictError> {
        let expected = self.n_features();
        if x.len() != expected {
            return Err(PredictError::Shape {
                expected,
                actual: x.len(),
            });
        }
        Ok(())
    }

    /// Index into [`classes`](Self::classes) of the predicted label.
    pub fn predict_index(&self, x: &[f32]) -> Result<usize, PredictError> {
        self.check_width(x)?;
        let index = match self {
            ClassifierModel::Logistic { .. } => {
                let proba = self.probabilities(x);
                argmax(&proba)
            }
            ClassifierModel::NearestCentroid { centroids, .. } => {
                let distances: Vec<f32> = centroids
                    .iter()
                    .map(|c| -c.iter().zip(x).map(|(a, b)| (a - b) * (a - b)).sum::<f32>())
                    .collect();
                argmax(&distances)
            }
        };
        Ok(index)
    }

    pub fn predict(&self, x: &[f32]) -> Result<&str, PredictError> {
        let index = self.predict_index(x)?;
        Ok(self.classes()[index].as_str())
    }

    /// Class probabilities in `classes` order, when the model has them.
    pub fn predict_proba(&self, x: &[f32]) -> Result<Option<Vec<f32>>, PredictError> {
        self.check_width(x)?;
        Ok(self
            .supports_probabilities()
            .then(|| self.probabilities(x)))
    }

    fn probabilities(&self, x: &[f32]) -> Vec<f32> {
        let ClassifierModel::Logistic {
            classes,
            coef,
            intercept,
        } = self
        else {
            return Vec::new();
        };
        let scores: Vec<f32> = coef
            .iter()
            .zip(intercept)
            .map(|(row, b)| row.iter().zip(x).map(|(w, v)| w * v).sum::<f32>() + b)
            .collect();

        if classes.len() == 2 && scores.len() == 1 {
            let p = 1.0 / (1.0 + (-scores[0]).exp());
            return vec![1.0 - p, p];
        }

        let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
        let total: f32 = exps.iter().sum();
        exps.into_iter().map(|e| e / total).collect()
    }
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
            if v > bv {
                (i, v)
            } else {
                (bi, bv)
            }
        })
        .0
}

/// The fitted scaler and classifier, loaded together so their widths can be
/// checked against each other once at startup.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelArtifacts {
    pub scaler: StandardScaler,
    pub model: ClassifierModel,
}

impl ModelArtifacts {
    pub fn new(scaler: StandardScaler, model: ClassifierModel) -> Result<Self, ModelLoadError> {
        scaler.validate()?;
        model.validate()?;
        if scaler.n_features() != model.n_features() {
            return Err(ModelLoadError::Invalid(format!(
                "scaler has {} features but model expects {}",
                scaler.n_features(),
                model.n_features()
            )));
        }
        Ok(Self { scaler, model })
    }

    pub fn load(scaler_path: &Path, model_path: &Path) -> Result<Self, ModelLoadError> {
        let scaler: StandardScaler = read_json(scaler_path)?;
        let model: ClassifierModel = read_json(model_path)?;
        Self::new(scaler, model)
    }

    pub fn n_features(&self) -> usize {
        self.scaler.n_features()
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ModelLoadError> {
    let raw = std::fs::read(path).map_err(|source| ModelLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| ModelLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    fn logistic() -> ClassifierModel {
        ClassifierModel::Logistic {
            classes: labels(&["calm", "laugh", "whine"]),
            coef: vec![vec![0.0, 0.0], vec![2.0, 0.0], vec![0.0, 2.0]],
            intercept: vec![0.0, 0.0, 0.0],
        }
    }

    #[test]
    fn scaler_standardizes_and_tolerates_zero_scale() {
        let scaler = StandardScaler {
            mean: vec![1.0, 5.0],
            scale: vec![2.0, 0.0],
        };
        assert_eq!(scaler.transform(&[3.0, 6.0]).unwrap(), vec![1.0, 1.0]);
    }

    #[test]
    fn scaler_rejects_wrong_width() {
        let scaler = StandardScaler {
            mean: vec![0.0; 3],
            scale: vec![1.0; 3],
        };
        assert_eq!(
            scaler.transform(&[1.0]).unwrap_err(),
            ScaleError::Shape {
                expected: 3,
                actual: 1
            }
        );
    }

    #[test]
    fn logistic_probabilities_sum_to_one() {
        let model = logistic();
        let proba = model.predict_proba(&[3.0, 0.0]).unwrap().unwrap();
        assert_eq!(proba.len(), 3);
        assert!((proba.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(model.predict(&[3.0, 0.0]).unwrap(), "laugh");
    }

    #[test]
    fn binary_logistic_uses_single_row() {
        let model = ClassifierModel::Logistic {
            classes: labels(&["neutral", "distress"]),
            coef: vec![vec![1.0]],
            intercept: vec![0.0],
        };
        model.validate().unwrap();
        assert_eq!(model.predict(&[4.0]).unwrap(), "distress");
        assert_eq!(model.predict(&[-4.0]).unwrap(), "neutral");
        let p = model.predict_proba(&[0.0]).unwrap().unwrap();
        assert!((p[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn nearest_centroid_has_no_probabilities() {
        let model = ClassifierModel::NearestCentroid {
            classes: labels(&["sad", "happy"]),
            centroids: vec![vec![-1.0, -1.0], vec![1.0, 1.0]],
        };
        assert_eq!(model.predict(&[0.9, 0.7]).unwrap(), "happy");
        assert!(model.predict_proba(&[0.9, 0.7]).unwrap().is_none());
    }

    #[test]
    fn model_json_is_tagged_by_kind() {
        let json = r#"{"kind":"nearest_centroid","classes":["a"],"centroids":[[0.0]]}"#;
        let model: ClassifierModel = serde_json::from_str(json).unwrap();
        assert_eq!(model.classes(), ["a".to_owned()]);
    }

    #[test]
    fn artifacts_reject_mismatched_widths() {
        let scaler = StandardScaler {
            mean: vec![0.0; 3],
            scale: vec![1.0; 3],
        };
        let err = ModelArtifacts::new(scaler, logistic()).unwrap_err();
        assert!(matches!(err, ModelLoadError::Invalid(_)));
    }

    #[test]
    fn validate_rejects_ragged_rows() {
        let model = ClassifierModel::NearestCentroid {
            classes: labels(&["a", "b"]),
            centroids: vec![vec![0.0, 1.0], vec![0.0]],
        };
        assert!(model.validate().is_err());
    }

    #[test]
    fn load_reads_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let scaler_path = dir.path().join("scaler.json");
        let model_path = dir.path().join("model.json");
        std::fs::write(&scaler_path, r#"{"mean":[0.0,0.0],"scale":[1.0,1.0]}"#).unwrap();
        std::fs::write(&model_path, serde_json::to_vec(&logistic()).unwrap()).unwrap();

        let artifacts = ModelArtifacts::load(&scaler_path, &model_path).unwrap();
        assert_eq!(artifacts.n_features(), 2);
    }

    #[test]
    fn load_reports_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, b"{not json").unwrap();

        assert!(matches!(
            ModelArtifacts::load(&missing, &bad),
            Err(ModelLoadError::Io { .. })
        ));
        assert!(matches!(
            ModelArtifacts::load(&bad, &missing),
            Err(ModelLoadError::Parse { .. })
        ));
    }
}
