//! Classifiers, their training pipeline and the registry that serves them.

pub mod knn;
pub mod metrics;
pub mod mlp;
pub mod registry;
pub mod scaler;
pub mod store;
pub mod svm;

pub use metrics::{ConfusionMatrix, EvaluationMetrics};
pub use registry::{ModelRegistry, Prediction, TrainingSettings};
pub use scaler::StandardScaler;
pub use store::ModelStore;

use crate::error::{ModelError, RegistryError};
use crate::features::TransactionFeatures;
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a classifier kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Feed-forward neural network
    Ann,
    /// Support vector machine with calibrated probabilities
    Svm,
    /// Distance-weighted k-nearest neighbours
    Knn,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [Algorithm::Ann, Algorithm::Svm, Algorithm::Knn];

    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Ann => "ann",
            Algorithm::Svm => "svm",
            Algorithm::Knn => "knn",
        }
    }

    /// Human-readable name used in chat responses.
    pub fn display_name(self) -> &'static str {
        match self {
            Algorithm::Ann => "Artificial Neural Network",
            Algorithm::Svm => "Support Vector Machine",
            Algorithm::Knn => "K-Nearest Neighbors",
        }
    }
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::Ann
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ann" => Ok(Algorithm::Ann),
            "svm" => Ok(Algorithm::Svm),
            "knn" => Ok(Algorithm::Knn),
            _ => Err(RegistryError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// A classifier that outputs the probability of the positive (fraud) class.
pub trait ProbabilisticClassifier {
    /// One probability per row of `records` (already scaled).
    fn predict_proba(&self, records: ArrayView2<f64>) -> Result<Array1<f64>, ModelError>;
}

/// The trained model inside a bundle.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", content = "model", rename_all = "lowercase")]
pub enum Classifier {
    Ann(mlp::MlpClassifier),
    Svm(svm::SvmClassifier),
    Knn(knn::KnnClassifier),
}

impl Classifier {
    /// Fit the classifier kind for `algorithm` with its fixed hyperparameters.
    pub fn fit(
        algorithm: Algorithm,
        records: &Array2<f64>,
        labels: &Array1<bool>,
        seed: u64,
    ) -> Result<Self, ModelError> {
        match algorithm {
            Algorithm::Ann => Ok(Classifier::Ann(mlp::MlpClassifier::fit(
                records,
                labels,
                &mlp::MlpParams::default(),
                seed,
            )?)),
            Algorithm::Svm => {
                let params = svm::SvmParams::default();
                let (records, labels) =
                    svm::subsample(records, labels, params.max_training_rows, seed);
                Ok(Classifier::Svm(svm::SvmClassifier::fit(&records, &labels, &params)?))
            }
            Algorithm::Knn => Ok(Classifier::Knn(knn::KnnClassifier::fit(
                records,
                labels,
                knn::DEFAULT_NEIGHBORS,
            )?)),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            Classifier::Ann(_) => Algorithm::Ann,
            Classifier::Svm(_) => Algorithm::Svm,
            Classifier::Knn(_) => Algorithm::Knn,
        }
    }
}

impl ProbabilisticClassifier for Classifier {
    fn predict_proba(&self, records: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        match self {
            Classifier::Ann(m) => m.predict_proba(records),
            Classifier::Svm(m) => m.predict_proba(records),
            Classifier::Knn(m) => m.predict_proba(records),
        }
    }
}

/// A trained classifier with everything needed to score a raw feature vector.
///
/// Bundles are never mutated; retraining builds a new one.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelBundle {
    pub classifier: Classifier,
    pub scaler: StandardScaler,
    pub feature_order: Vec<String>,
    pub metrics: EvaluationMetrics,
}

impl ModelBundle {
    pub fn algorithm(&self) -> Algorithm {
        self.classifier.algorithm()
    }

    /// Lay `features` out in this bundle's column order; names the vector
    /// does not know read as `0.0`.
    pub fn row(&self, features: &TransactionFeatures) -> Array2<f64> {
        let row: Vec<f64> = self
            .feature_order
            .iter()
            .map(|name| features.get_by_name(name))
            .collect();
        Array2::from_shape_vec((1, row.len()), row)
            .unwrap_or_else(|_| Array2::zeros((1, self.feature_order.len())))
    }

    /// Fraud probability for one feature vector.
    pub fn score(&self, features: &TransactionFeatures) -> Result<f64, ModelError> {
        let scaled = self.scaler.transform(&self.row(features))?;
        let proba = self.classifier.predict_proba(scaled.view())?;
        Ok(proba.get(0).copied().unwrap_or(0.0).clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("ann".parse::<Algorithm>().unwrap(), Algorithm::Ann);
        assert_eq!(" SVM ".parse::<Algorithm>().unwrap(), Algorithm::Svm);
        assert_eq!("Knn".parse::<Algorithm>().unwrap(), Algorithm::Knn);
        assert!(matches!(
            "rf".parse::<Algorithm>(),
            Err(RegistryError::UnknownAlgorithm(ref s)) if s == "rf"
        ));
    }

    #[test]
    fn test_algorithm_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Algorithm::Knn).unwrap(), "\"knn\"");
        assert_eq!(Algorithm::default(), Algorithm::Ann);
    }
}
