//! Scoring facade shared by the chatbot and the command line.

use crate::error::RegistryError;
use crate::features::{FeatureVectorBuilder, TransactionFeatures};
use crate::models::{Algorithm, EvaluationMetrics, ModelRegistry};
use crate::rules::{
    apply_rules, triggered_rules, DecisionThresholds, FraudDecision, FALLBACK_BASE_SCORE,
    FALLBACK_CONFIDENCE,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// A decision for an `(amount, merchant)` pair, as produced for chat users.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub amount: f64,
    pub merchant: Option<String>,
    #[serde(flatten)]
    pub decision: FraudDecision,
    /// The model was unavailable and only the rule floors were applied.
    pub fallback: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainOutcome {
    pub status: &'static str,
    pub algorithm: Algorithm,
    pub metrics: EvaluationMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    pub status: &'static str,
    pub active_algorithm: Algorithm,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlgorithmListing {
    pub all: Vec<Algorithm>,
    pub available: BTreeSet<Algorithm>,
    pub active: Algorithm,
}

pub struct FraudService {
    registry: Arc<ModelRegistry>,
    builder: FeatureVectorBuilder,
    thresholds: DecisionThresholds,
    model_version: String,
}

impl FraudService {
    pub fn new(
        registry: Arc<ModelRegistry>,
        thresholds: DecisionThresholds,
        model_version: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            builder: FeatureVectorBuilder::new(),
            thresholds,
            model_version: model_version.into(),
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn thresholds(&self) -> DecisionThresholds {
        self.thresholds
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    /// Score a raw feature vector with the model alone.
    pub fn score(
        &self,
        features: &TransactionFeatures,
        algorithm: Option<Algorithm>,
    ) -> Result<FraudDecision, RegistryError> {
        let prediction = self.registry.predict(features, algorithm)?;
        let decision = self.thresholds.decide(prediction.score);
        Ok(FraudDecision {
            score: prediction.score,
            decision,
            confidence: prediction.confidence,
            algorithm: prediction.algorithm,
            model_version: self.model_version.clone(),
            reasons: vec![decision.reason().to_string()],
        })
    }

    /// Build features, score them, raise the score to the rule floors and
    /// decide. A model that is not loaded or fails to score never surfaces
    /// as an error: the rules alone decide, starting from a base score.
    pub fn assess(&self, amount: f64, merchant: Option<&str>, algorithm: Algorithm) -> Assessment {
        let features = self.builder.build(amount, merchant);

        let (base, confidence, fallback) = match self.registry.predict(&features, Some(algorithm)) {
            Ok(prediction) => (prediction.score, prediction.confidence, false),
            Err(e) => {
                warn!(%algorithm, error = %e, "Model unavailable, using business rules fallback");
                (FALLBACK_BASE_SCORE, FALLBACK_CONFIDENCE, true)
            }
        };

        let score = apply_rules(amount, merchant, base);
        let decision = self.thresholds.decide(score);
        let mut reasons: Vec<String> = triggered_rules(amount, merchant)
            .into_iter()
            .map(|r| r.reason().to_string())
            .collect();
        reasons.push(decision.reason().to_string());
        debug!(amount, base, score, %decision, fallback, "Transaction assessed");

        Assessment {
            amount,
            merchant: merchant.map(str::to_string),
            decision: FraudDecision {
                score,
                decision,
                confidence,
                algorithm,
                model_version: self.model_version.clone(),
                reasons,
            },
            fallback,
        }
    }

    pub fn train(&self, algorithm: Algorithm, force: bool) -> Result<TrainOutcome, RegistryError> {
        let bundle = self.registry.train(algorithm, force)?;
        Ok(TrainOutcome {
            status: "trained",
            algorithm,
            metrics: bundle.metrics.clone(),
        })
    }

    /// Parse and activate an algorithm. Unknown names are rejected before the
    /// registry is touched.
    pub fn select_algorithm(&self, name: &str) -> Result<Selection, RegistryError> {
        let algorithm: Algorithm = name.parse()?;
        self.registry.set_active(algorithm)?;
        Ok(Selection {
            status: "ok",
            active_algorithm: algorithm,
        })
    }

    pub fn list_algorithms(&self) -> AlgorithmListing {
        AlgorithmListing {
            all: Algorithm::ALL.to_vec(),
            available: self.registry.list_available(),
            active: self.registry.active(),
        }
    }

    pub fn metrics(&self, algorithm: Option<Algorithm>) -> Result<EvaluationMetrics, RegistryError> {
        self.registry.metrics(algorithm)
    }
}
