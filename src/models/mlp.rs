//! Feed-forward neural network (the `ann` algorithm).
//!
//! Dense ReLU hidden layers with a single sigmoid output, trained on binary
//! cross-entropy with Adam and L2 regularisation. Early stopping holds out a
//! stratified validation slice and keeps the weights of the best epoch.

use super::ProbabilisticClassifier;
use crate::csv_reader::LabeledDataset;
use crate::error::ModelError;
use ndarray::{Array, Array1, Array2, ArrayView2, Axis, Dimension, Zip};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-8;
const LOG_CLIP: f64 = 1e-15;

/// Hyperparameters of the network. The defaults are the fixed `ann` settings.
#[derive(Debug, Clone)]
pub struct MlpParams {
    pub hidden_layers: Vec<usize>,
    pub learning_rate: f64,
    /// L2 penalty
    pub alpha: f64,
    pub batch_size: usize,
    pub max_epochs: usize,
    pub early_stopping: bool,
    pub validation_fraction: f64,
    /// Epochs without improvement before stopping
    pub patience: usize,
    pub tolerance: f64,
}

impl Default for MlpParams {
    fn default() -> Self {
        Self {
            hidden_layers: vec![64, 32],
            learning_rate: 1e-3,
            alpha: 1e-4,
            batch_size: 200,
            max_epochs: 30,
            early_stopping: true,
            validation_fraction: 0.1,
            patience: 10,
            tolerance: 1e-4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DenseLayer {
    /// `(inputs, outputs)`
    weights: Array2<f64>,
    bias: Array1<f64>,
}

/// Trained network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpClassifier {
    layers: Vec<DenseLayer>,
    epochs_trained: usize,
}

impl MlpClassifier {
    pub fn fit(
        records: &Array2<f64>,
        labels: &Array1<bool>,
        params: &MlpParams,
        seed: u64,
    ) -> Result<Self, ModelError> {
        if records.nrows() == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut model = Self::initialise(records.ncols(), &params.hidden_layers, &mut rng);

        let (fit_set, validation) = if params.early_stopping {
            let full = LabeledDataset {
                feature_names: Vec::new(),
                records: records.clone(),
                labels: labels.clone(),
            };
            let split = full.stratified_split(params.validation_fraction, seed);
            if split.test.is_empty() || split.train.is_empty() {
                (full, None)
            } else {
                (split.train, Some(split.test))
            }
        } else {
            let full = LabeledDataset {
                feature_names: Vec::new(),
                records: records.clone(),
                labels: labels.clone(),
            };
            (full, None)
        };

        let targets: Array1<f64> = fit_set.labels.mapv(|y| if y { 1.0 } else { 0.0 });
        let batch_size = params.batch_size.clamp(1, fit_set.len());
        let mut adam = AdamState::new(&model.layers);
        let mut order: Vec<usize> = (0..fit_set.len()).collect();

        let mut best_score = f64::NEG_INFINITY;
        let mut best_layers = model.layers.clone();
        let mut stale_epochs = 0;

        for epoch in 1..=params.max_epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(batch_size) {
                let x = fit_set.records.select(Axis(0), batch);
                let y = targets.select(Axis(0), batch);
                let activations = model.forward(x.view());
                let output = &activations[activations.len() - 1];
                epoch_loss += log_loss(output, &y) * batch.len() as f64;

                let (grad_w, grad_b) = model.gradients(&activations, &y, params.alpha);
                adam.step(&mut model.layers, &grad_w, &grad_b, params.learning_rate);
            }

            epoch_loss /= fit_set.len() as f64;
            if !epoch_loss.is_finite() {
                return Err(ModelError::Diverged(epoch));
            }
            model.epochs_trained = epoch;

            let Some(val) = validation.as_ref() else {
                debug!(epoch, loss = epoch_loss, "ANN epoch");
                continue;
            };

            let score = model.accuracy(val)?;
            debug!(epoch, loss = epoch_loss, validation_accuracy = score, "ANN epoch");
            if score > best_score + params.tolerance {
                best_score = score;
                best_layers = model.layers.clone();
                stale_epochs = 0;
            } else {
                stale_epochs += 1;
                if stale_epochs >= params.patience {
                    info!(epoch, best_validation_accuracy = best_score, "ANN early stopping");
                    break;
                }
            }
        }

        if validation.is_some() {
            model.layers = best_layers;
        }
        Ok(model)
    }

    fn initialise(n_inputs: usize, hidden: &[usize], rng: &mut StdRng) -> Self {
        let mut sizes = Vec::with_capacity(hidden.len() + 2);
        sizes.push(n_inputs);
        sizes.extend_from_slice(hidden);
        sizes.push(1);

        let mut layers = Vec::with_capacity(sizes.len() - 1);
        for w in sizes.windows(2) {
            let (fan_in, fan_out) = (w[0], w[1]);
            // Glorot uniform
            let bound = (6.0 / (fan_in + fan_out) as f64).sqrt();
            let dist = Uniform::new_inclusive(-bound, bound);
            let weights = Array2::from_shape_fn((fan_in, fan_out), |_| dist.sample(&mut *rng));
            let bias = Array1::from_shape_fn(fan_out, |_| dist.sample(&mut *rng));
            layers.push(DenseLayer { weights, bias });
        }

        Self {
            layers,
            epochs_trained: 0,
        }
    }

    /// Activations of every layer, input first, sigmoid output last.
    fn forward(&self, records: ArrayView2<f64>) -> Vec<Array2<f64>> {
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(records.to_owned());
        for (i, layer) in self.layers.iter().enumerate() {
            let z = activations[i].dot(&layer.weights) + &layer.bias;
            let a = if i + 1 == self.layers.len() {
                z.mapv(sigmoid)
            } else {
                z.mapv(|v| v.max(0.0))
            };
            activations.push(a);
        }
        activations
    }

    fn gradients(
        &self,
        activations: &[Array2<f64>],
        targets: &Array1<f64>,
        alpha: f64,
    ) -> (Vec<Array2<f64>>, Vec<Array1<f64>>) {
        let n = targets.len() as f64;
        let output = &activations[activations.len() - 1];
        let target = targets.view().insert_axis(Axis(1));
        let mut delta = (output - &target) / n;

        let mut grad_w = Vec::with_capacity(self.layers.len());
        let mut grad_b = Vec::with_capacity(self.layers.len());

        for i in (0..self.layers.len()).rev() {
            let layer = &self.layers[i];
            let gw = activations[i].t().dot(&delta) + &(&layer.weights * (alpha / n));
            let gb = delta.sum_axis(Axis(0));
            if i > 0 {
                let mut upstream = delta.dot(&layer.weights.t());
                upstream.zip_mut_with(&activations[i], |d, &a| {
                    if a <= 0.0 {
                        *d = 0.0;
                    }
                });
                delta = upstream;
            }
            grad_w.push(gw);
            grad_b.push(gb);
        }

        grad_w.reverse();
        grad_b.reverse();
        (grad_w, grad_b)
    }

    fn accuracy(&self, data: &LabeledDataset) -> Result<f64, ModelError> {
        let proba = self.predict_proba(data.records.view())?;
        let correct = proba
            .iter()
            .zip(data.labels.iter())
            .filter(|(&p, &y)| (p > 0.5) == y)
            .count();
        Ok(correct as f64 / data.len().max(1) as f64)
    }

    pub fn epochs_trained(&self) -> usize {
        self.epochs_trained
    }

    fn n_inputs(&self) -> usize {
        self.layers.first().map(|l| l.weights.nrows()).unwrap_or(0)
    }
}

impl ProbabilisticClassifier for MlpClassifier {
    fn predict_proba(&self, records: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        if records.ncols() != self.n_inputs() {
            return Err(ModelError::FeatureMismatch {
                expected: self.n_inputs(),
                actual: records.ncols(),
            });
        }
        let activations = self.forward(records);
        Ok(activations[activations.len() - 1].column(0).to_owned())
    }
}

struct AdamState {
    m_w: Vec<Array2<f64>>,
    v_w: Vec<Array2<f64>>,
    m_b: Vec<Array1<f64>>,
    v_b: Vec<Array1<f64>>,
    t: i32,
}

impl AdamState {
    fn new(layers: &[DenseLayer]) -> Self {
        Self {
            m_w: layers.iter().map(|l| Array2::zeros(l.weights.raw_dim())).collect(),
            v_w: layers.iter().map(|l| Array2::zeros(l.weights.raw_dim())).collect(),
            m_b: layers.iter().map(|l| Array1::zeros(l.bias.raw_dim())).collect(),
            v_b: layers.iter().map(|l| Array1::zeros(l.bias.raw_dim())).collect(),
            t: 0,
        }
    }

    fn step(
        &mut self,
        layers: &mut [DenseLayer],
        grad_w: &[Array2<f64>],
        grad_b: &[Array1<f64>],
        learning_rate: f64,
    ) {
        self.t += 1;
        let lr_t = learning_rate * (1.0 - ADAM_BETA2.powi(self.t)).sqrt()
            / (1.0 - ADAM_BETA1.powi(self.t));

        for (i, layer) in layers.iter_mut().enumerate() {
            adam_update(&mut layer.weights, &mut self.m_w[i], &mut self.v_w[i], &grad_w[i], lr_t);
            adam_update(&mut layer.bias, &mut self.m_b[i], &mut self.v_b[i], &grad_b[i], lr_t);
        }
    }
}

fn adam_update<D: Dimension>(
    param: &mut Array<f64, D>,
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    lr_t: f64,
) {
    Zip::from(param)
        .and(m)
        .and(v)
        .and(grad)
        .for_each(|p, m, v, &g| {
            *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
            *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
            *p -= lr_t * *m / (v.sqrt() + ADAM_EPSILON);
        });
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn log_loss(output: &Array2<f64>, targets: &Array1<f64>) -> f64 {
    let n = targets.len().max(1) as f64;
    output
        .column(0)
        .iter()
        .zip(targets.iter())
        .map(|(&p, &y)| {
            let p = p.clamp(LOG_CLIP, 1.0 - LOG_CLIP);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum::<f64>()
        / n
}
