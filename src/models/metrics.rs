//! Held-out evaluation of a trained classifier.

use super::Algorithm;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Binary confusion matrix with fraud as the positive class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tn: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
    pub tp: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(actual: &[bool], predicted: &[bool]) -> Self {
        let mut cm = ConfusionMatrix::default();
        for (&y, &p) in actual.iter().zip(predicted) {
            match (y, p) {
                (false, false) => cm.tn += 1,
                (false, true) => cm.fp += 1,
                (true, false) => cm.fn_ += 1,
                (true, true) => cm.tp += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.tn + self.fp + self.fn_ + self.tp
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tn + self.tp, self.total())
    }

    /// Zero when nothing was predicted positive.
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// Zero when the test split has no positives.
    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

/// Test-split metrics stored with every bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub algorithm: Algorithm,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub confusion_matrix: ConfusionMatrix,
    /// `None` when the test split holds a single class.
    pub roc_auc: Option<f64>,
    pub pr_auc: Option<f64>,
    pub n_train: usize,
    pub n_test: usize,
    pub n_fraud: usize,
    pub n_valid: usize,
}

impl EvaluationMetrics {
    /// Score a classifier's test-split probabilities. A row is predicted fraud
    /// when its probability exceeds 0.5.
    pub fn evaluate(algorithm: Algorithm, actual: &[bool], proba: &[f64], n_train: usize) -> Self {
        let predicted: Vec<bool> = proba.iter().map(|&p| p > 0.5).collect();
        let cm = ConfusionMatrix::from_predictions(actual, &predicted);
        let n_fraud = actual.iter().filter(|&&y| y).count();

        let roc_auc = roc_auc(actual, proba);
        let pr_auc = average_precision(actual, proba);
        if roc_auc.is_none() {
            warn!(%algorithm, "Could not calculate AUC: test split has a single class");
        }

        let metrics = EvaluationMetrics {
            algorithm,
            accuracy: cm.accuracy(),
            precision: cm.precision(),
            recall: cm.recall(),
            f1_score: cm.f1(),
            confusion_matrix: cm,
            roc_auc,
            pr_auc,
            n_train,
            n_test: actual.len(),
            n_fraud,
            n_valid: actual.len() - n_fraud,
        };
        info!(
            %algorithm,
            accuracy = %format!("{:.4}", metrics.accuracy),
            precision = %format!("{:.4}", metrics.precision),
            recall = %format!("{:.4}", metrics.recall),
            f1 = %format!("{:.4}", metrics.f1_score),
            "Evaluation complete"
        );
        metrics
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Area under the ROC curve via the rank-sum statistic, averaging the ranks
/// of tied scores.
pub fn roc_auc(actual: &[bool], scores: &[f64]) -> Option<f64> {
    let n_pos = actual.iter().filter(|&&y| y).count();
    let n_neg = actual.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // 1-based ranks i+1..=j+1 share their mean
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        rank_sum += order[i..=j].iter().filter(|&&k| actual[k]).count() as f64 * avg_rank;
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    Some((rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64))
}

/// Average precision: precision at each distinct threshold weighted by the
/// recall gained there.
pub fn average_precision(actual: &[bool], scores: &[f64]) -> Option<f64> {
    let n_pos = actual.iter().filter(|&&y| y).count();
    if n_pos == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let (mut tp, mut fp) = (0usize, 0usize);
    let mut prev_recall = 0.0;
    let mut ap = 0.0;
    let mut i = 0;
    while i < order.len() {
        let threshold = scores[order[i]];
        while i < order.len() && scores[order[i]] == threshold {
            if actual[order[i]] {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        let recall = tp as f64 / n_pos as f64;
        let precision = tp as f64 / (tp + fp) as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
    }
    Some(ap)
}
