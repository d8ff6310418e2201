//! Gaussian-kernel support vector machine (the `svm` algorithm).
//!
//! Training uses linfa-svm with Platt scaling so the model outputs a
//! calibrated fraud probability instead of a bare decision value.

use super::ProbabilisticClassifier;
use crate::csv_reader::LabeledDataset;
use crate::error::ModelError;
use linfa::dataset::Pr;
use linfa::prelude::*;
use linfa_svm::Svm;
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Row limit for SVM training. The solver keeps a dense `n x n` kernel
/// matrix, so 5000 rows cost about 200 MB.
pub const MAX_TRAINING_ROWS: usize = 5_000;

#[derive(Debug, Clone)]
pub struct SvmParams {
    /// Width of the gaussian kernel, `exp(-|x-y|^2 / eps)`
    pub kernel_eps: f64,
    /// Penalty for misclassified positives and negatives
    pub c_positive: f64,
    pub c_negative: f64,
    pub max_training_rows: usize,
}

impl Default for SvmParams {
    fn default() -> Self {
        // eps = n_features matches gamma = 1 / n_features on standardised data.
        Self {
            kernel_eps: crate::features::FEATURE_COUNT as f64,
            c_positive: 1.0,
            c_negative: 1.0,
            max_training_rows: MAX_TRAINING_ROWS,
        }
    }
}

/// Seeded stratified sample of at most `max_rows` rows. Smaller inputs are
/// returned whole.
pub fn subsample(
    records: &Array2<f64>,
    labels: &Array1<bool>,
    max_rows: usize,
    seed: u64,
) -> (Array2<f64>, Array1<bool>) {
    let rows = records.nrows();
    if rows <= max_rows {
        return (records.clone(), labels.clone());
    }

    let full = LabeledDataset {
        feature_names: Vec::new(),
        records: records.clone(),
        labels: labels.clone(),
    };
    let mut sample = full.stratified_split(max_rows as f64 / rows as f64, seed).test;
    // Per-class rounding can overshoot by a row or two; the sample is shuffled.
    if sample.len() > max_rows {
        let keep: Vec<usize> = (0..max_rows).collect();
        sample = sample.select(&keep);
    }
    info!(rows, kept = sample.len(), fraud = sample.positives(), "Subsampled SVM training rows");
    (sample.records, sample.labels)
}

#[derive(Serialize, Deserialize)]
pub struct SvmClassifier {
    model: Svm<f64, Pr>,
    n_features: usize,
}

impl SvmClassifier {
    pub fn fit(
        records: &Array2<f64>,
        labels: &Array1<bool>,
        params: &SvmParams,
    ) -> Result<Self, ModelError> {
        if records.nrows() == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        if records.nrows() > params.max_training_rows {
            return Err(ModelError::TooManyRows {
                rows: records.nrows(),
                max: params.max_training_rows,
            });
        }
        let dataset = Dataset::new(records.clone(), labels.clone());
        let model = Svm::<f64, Pr>::params()
            .gaussian_kernel(params.kernel_eps)
            .pos_neg_weights(params.c_positive, params.c_negative)
            .fit(&dataset)?;

        Ok(Self {
            model,
            n_features: records.ncols(),
        })
    }

    pub fn support_vectors(&self) -> usize {
        self.model.nsupport()
    }
}

impl ProbabilisticClassifier for SvmClassifier {
    fn predict_proba(&self, records: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        if records.ncols() != self.n_features {
            return Err(ModelError::FeatureMismatch {
                expected: self.n_features,
                actual: records.ncols(),
            });
        }
        let proba: Array1<Pr> = self.model.predict(&records);
        Ok(proba.mapv(|p| f64::from(*p)))
    }
}

impl fmt::Debug for SvmClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SvmClassifier")
            .field("n_features", &self.n_features)
            .field("support_vectors", &self.support_vectors())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_clusters() -> (Array2<f64>, Array1<bool>) {
        let n = 60;
        let records = Array2::from_shape_fn((n, 2), |(i, j)| {
            let centre = if i % 3 == 0 { 1.5 } else { -1.5 };
            centre + ((i + j) % 4) as f64 * 0.05
        });
        let labels = (0..n).map(|i| i % 3 == 0).collect();
        (records, labels)
    }

    #[test]
    fn test_separates_clusters_with_probabilities() {
        let (x, y) = two_clusters();
        let params = SvmParams {
            kernel_eps: 2.0,
            ..SvmParams::default()
        };
        let model = SvmClassifier::fit(&x, &y, &params).unwrap();
        let proba = model.predict_proba(x.view()).unwrap();

        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        let correct = proba
            .iter()
            .zip(y.iter())
            .filter(|(&p, &label)| (p > 0.5) == label)
            .count();
        assert!(correct >= 55, "only {correct}/60 correct");
        assert!(model.support_vectors() > 0);
    }

    #[test]
    fn test_refuses_more_rows_than_the_limit() {
        let (x, y) = two_clusters();
        let params = SvmParams {
            max_training_rows: 59,
            ..SvmParams::default()
        };
        assert!(matches!(
            SvmClassifier::fit(&x, &y, &params),
            Err(ModelError::TooManyRows { rows: 60, max: 59 })
        ));
    }

    #[test]
    fn test_subsample_caps_rows_and_keeps_both_classes() {
        let (x, y) = two_clusters();
        let (sx, sy) = subsample(&x, &y, 25, 42);
        assert!(sx.nrows() <= 25 && sx.nrows() >= 23, "{} rows", sx.nrows());
        assert_eq!(sx.nrows(), sy.len());
        assert!(sy.iter().any(|&l| l) && sy.iter().any(|&l| !l));
        assert_eq!(subsample(&x, &y, 25, 42), (sx, sy));

        let (all_x, _) = subsample(&x, &y, 100, 42);
        assert_eq!(all_x, x);
    }

    #[test]
    fn test_rejects_wrong_feature_count() {
        let (x, y) = two_clusters();
        let model = SvmClassifier::fit(&x, &y, &SvmParams::default()).unwrap();
        assert!(matches!(
            model.predict_proba(Array2::zeros((2, 4)).view()),
            Err(ModelError::FeatureMismatch {
                expected: 2,
                actual: 4
            })
        ));
    }
}
