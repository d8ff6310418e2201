//! Distance-weighted k-nearest neighbours (the `knn` algorithm).

use super::ProbabilisticClassifier;
use crate::error::ModelError;
use linfa_nn::distance::L2Dist;
use linfa_nn::{CommonNearestNeighbour, NearestNeighbour};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

pub const DEFAULT_NEIGHBORS: usize = 5;

/// Memorises the training rows; the kd-tree is rebuilt for each batch
/// of queries since linfa-nn indexes borrow their data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnClassifier {
    records: Array2<f64>,
    labels: Array1<bool>,
    k: usize,
}

impl KnnClassifier {
    pub fn fit(records: &Array2<f64>, labels: &Array1<bool>, k: usize) -> Result<Self, ModelError> {
        if records.nrows() == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        Ok(Self {
            records: records.clone(),
            labels: labels.clone(),
            k: k.max(1),
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

impl ProbabilisticClassifier for KnnClassifier {
    fn predict_proba(&self, records: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        if records.ncols() != self.records.ncols() {
            return Err(ModelError::FeatureMismatch {
                expected: self.records.ncols(),
                actual: records.ncols(),
            });
        }

        let index = CommonNearestNeighbour::KdTree.from_batch(&self.records, L2Dist)?;
        let k = self.k.min(self.records.nrows());

        let mut out = Array1::zeros(records.nrows());
        for (slot, point) in out.iter_mut().zip(records.outer_iter()) {
            let neighbours = index.k_nearest(point, k)?;
            let weighted: Vec<(f64, bool)> = neighbours
                .iter()
                .map(|(p, i)| (euclidean(p, &point), self.labels[*i]))
                .collect();
            *slot = fraud_share(&weighted);
        }
        Ok(out)
    }
}

/// Inverse-distance weighted share of fraud among the neighbours. When any
/// neighbour sits exactly on the query point only the exact matches vote.
fn fraud_share(neighbours: &[(f64, bool)]) -> f64 {
    let exact: Vec<bool> = neighbours
        .iter()
        .filter(|(d, _)| *d == 0.0)
        .map(|(_, y)| *y)
        .collect();
    if !exact.is_empty() {
        return exact.iter().filter(|&&y| y).count() as f64 / exact.len() as f64;
    }

    let (fraud, total) = neighbours
        .iter()
        .fold((0.0, 0.0), |(fraud, total), &(d, y)| {
            let w = 1.0 / d;
            (if y { fraud + w } else { fraud }, total + w)
        });
    if total > 0.0 {
        fraud / total
    } else {
        0.0
    }
}

fn euclidean(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}
