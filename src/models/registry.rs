//! In-memory registry of trained bundles with lazy train-or-load.

use super::{Algorithm, Classifier, EvaluationMetrics, ModelBundle, ModelStore, ProbabilisticClassifier, StandardScaler};
use crate::csv_reader::TrainingData;
use crate::error::{DataError, ModelError, RegistryError};
use crate::features::TransactionFeatures;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Split and seeding used for every training run.
#[derive(Debug, Clone, Copy)]
pub struct TrainingSettings {
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

/// Raw model output for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub score: f64,
    /// Probability of the predicted class: `score` when it exceeds 0.5,
    /// otherwise `1 - score`.
    pub confidence: f64,
    pub algorithm: Algorithm,
}

impl Prediction {
    pub fn new(score: f64, algorithm: Algorithm) -> Self {
        let confidence = if score > 0.5 { score } else { 1.0 - score };
        Self {
            score,
            confidence,
            algorithm,
        }
    }
}

/// Owns the trained bundles and the active-algorithm pointer.
///
/// Training runs without holding any lock; the finished bundle is swapped in
/// whole, so concurrent readers see either the old bundle or the new one.
pub struct ModelRegistry {
    source: Box<dyn TrainingData>,
    store: ModelStore,
    settings: TrainingSettings,
    models: RwLock<HashMap<Algorithm, Arc<ModelBundle>>>,
    active: RwLock<Algorithm>,
}

impl ModelRegistry {
    pub fn new(source: impl TrainingData + 'static, store: ModelStore) -> Self {
        Self::with_settings(source, store, TrainingSettings::default())
    }

    pub fn with_settings(
        source: impl TrainingData + 'static,
        store: ModelStore,
        settings: TrainingSettings,
    ) -> Self {
        Self {
            source: Box::new(source),
            store,
            settings,
            models: RwLock::new(HashMap::new()),
            active: RwLock::new(Algorithm::default()),
        }
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    pub fn active(&self) -> Algorithm {
        *self.active.read()
    }

    /// Make `algorithm` servable.
    ///
    /// Unless `force_retrain` is set a persisted bundle is loaded instead of
    /// training; an unreadable one falls through to a fresh run. On failure
    /// nothing in memory or on disk changes.
    pub fn train(
        &self,
        algorithm: Algorithm,
        force_retrain: bool,
    ) -> Result<Arc<ModelBundle>, RegistryError> {
        if !force_retrain && self.store.exists(algorithm) {
            match self.store.load(algorithm) {
                Ok(bundle) => {
                    info!(%algorithm, "Using pre-trained model");
                    return Ok(self.install(bundle));
                }
                Err(e) => warn!(%algorithm, error = %e, "Failed to load model, retraining"),
            }
        }

        let started = Instant::now();
        let bundle = self.fit_bundle(algorithm).map_err(|e| {
            error!(%algorithm, error = %e, "Training failed");
            e
        })?;
        self.store.save(&bundle).map_err(|e| {
            error!(%algorithm, error = %e, "Failed to persist model");
            RegistryError::from(e)
        })?;

        info!(
            %algorithm,
            accuracy = bundle.metrics.accuracy,
            precision = bundle.metrics.precision,
            recall = bundle.metrics.recall,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Training complete and saved"
        );
        Ok(self.install(bundle))
    }

    fn fit_bundle(&self, algorithm: Algorithm) -> Result<ModelBundle, RegistryError> {
        let dataset = self.source.load()?;
        match dataset.positives() {
            0 => return Err(DataError::SingleClass(0).into()),
            p if p == dataset.len() => return Err(DataError::SingleClass(1).into()),
            _ => {}
        }

        let split = dataset.stratified_split(self.settings.test_fraction, self.settings.seed);
        info!(train = split.train.len(), test = split.test.len(), "Data split");

        let training = |source: ModelError| RegistryError::Training { algorithm, source };

        let scaler = StandardScaler::fit(&split.train.records).map_err(training)?;
        let x_train = scaler.transform(&split.train.records).map_err(training)?;
        let x_test = scaler.transform(&split.test.records).map_err(training)?;

        info!(%algorithm, samples = x_train.nrows(), "Training model");
        let classifier = Classifier::fit(algorithm, &x_train, &split.train.labels, self.settings.seed)
            .map_err(training)?;

        let proba = classifier.predict_proba(x_test.view()).map_err(training)?;
        let metrics = EvaluationMetrics::evaluate(
            algorithm,
            &split.test.labels.to_vec(),
            &proba.to_vec(),
            split.train.len(),
        );

        Ok(ModelBundle {
            classifier,
            scaler,
            feature_order: dataset.feature_names,
            metrics,
        })
    }

    fn install(&self, bundle: ModelBundle) -> Arc<ModelBundle> {
        let algorithm = bundle.algorithm();
        let bundle = Arc::new(bundle);
        self.models.write().insert(algorithm, Arc::clone(&bundle));
        bundle
    }

    /// Switch the default algorithm, training or loading it first if needed.
    /// The pointer only moves once the model is servable.
    pub fn set_active(&self, algorithm: Algorithm) -> Result<(), RegistryError> {
        if !self.is_ready(Some(algorithm)) {
            self.train(algorithm, false)?;
        }
        *self.active.write() = algorithm;
        info!(%algorithm, "Active algorithm set");
        Ok(())
    }

    pub fn is_ready(&self, algorithm: Option<Algorithm>) -> bool {
        let algorithm = algorithm.unwrap_or_else(|| self.active());
        self.models.read().contains_key(&algorithm)
    }

    pub fn bundle(&self, algorithm: Option<Algorithm>) -> Result<Arc<ModelBundle>, RegistryError> {
        let algorithm = algorithm.unwrap_or_else(|| self.active());
        self.models
            .read()
            .get(&algorithm)
            .cloned()
            .ok_or(RegistryError::NotLoaded(algorithm))
    }

    pub fn predict(
        &self,
        features: &TransactionFeatures,
        algorithm: Option<Algorithm>,
    ) -> Result<Prediction, RegistryError> {
        let bundle = self.bundle(algorithm)?;
        let algorithm = bundle.algorithm();
        let score = bundle
            .score(features)
            .map_err(|source| RegistryError::Scoring { algorithm, source })?;
        Ok(Prediction::new(score, algorithm))
    }

    pub fn metrics(&self, algorithm: Option<Algorithm>) -> Result<EvaluationMetrics, RegistryError> {
        Ok(self.bundle(algorithm)?.metrics.clone())
    }

    /// Algorithms that are in memory or have a persisted bundle.
    pub fn list_available(&self) -> BTreeSet<Algorithm> {
        let models = self.models.read();
        Algorithm::ALL
            .into_iter()
            .filter(|a| models.contains_key(a) || self.store.exists(*a))
            .collect()
    }
}
