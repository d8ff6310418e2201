//! Synthetic feature vectors for free-text transactions.
//!
//! The pretrained classifiers expect the 30 columns of the public credit-card
//! fraud dataset: `Time`, `Amount` and the anonymised PCA components
//! `V1`..`V28`. A chat message only gives us an amount and maybe a merchant,
//! so the components are filled with amount-driven heuristics and a few
//! merchant-specific anomaly signals. The values carry no statistical meaning;
//! they only give the classifier a vector of the shape it was trained on.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of features in a transaction vector.
pub const FEATURE_COUNT: usize = 30;

/// Placeholder for `Time` when the caller does not know it.
pub const DEFAULT_TIME: f64 = 10_000.0;

/// Above this amount the high-value formula is used.
const HIGH_AMOUNT: f64 = 1000.0;

/// Below this amount the micro-transaction formula is used.
const MICRO_AMOUNT: f64 = 1.0;

/// Closed set of feature keys understood by the classifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureName {
    Time,
    Amount,
    V1,
    V2,
    V3,
    V4,
    V5,
    V6,
    V7,
    V8,
    V9,
    V10,
    V11,
    V12,
    V13,
    V14,
    V15,
    V16,
    V17,
    V18,
    V19,
    V20,
    V21,
    V22,
    V23,
    V24,
    V25,
    V26,
    V27,
    V28,
}

impl FeatureName {
    /// All features in dataset column order.
    pub const ALL: [FeatureName; FEATURE_COUNT] = [
        FeatureName::Time,
        FeatureName::V1,
        FeatureName::V2,
        FeatureName::V3,
        FeatureName::V4,
        FeatureName::V5,
        FeatureName::V6,
        FeatureName::V7,
        FeatureName::V8,
        FeatureName::V9,
        FeatureName::V10,
        FeatureName::V11,
        FeatureName::V12,
        FeatureName::V13,
        FeatureName::V14,
        FeatureName::V15,
        FeatureName::V16,
        FeatureName::V17,
        FeatureName::V18,
        FeatureName::V19,
        FeatureName::V20,
        FeatureName::V21,
        FeatureName::V22,
        FeatureName::V23,
        FeatureName::V24,
        FeatureName::V25,
        FeatureName::V26,
        FeatureName::V27,
        FeatureName::V28,
        FeatureName::Amount,
    ];

    /// PCA component `V{index}` for `index` in `1..=28`.
    pub fn component(index: usize) -> Option<FeatureName> {
        if (1..=28).contains(&index) {
            // V1..V28 sit between Time and Amount in ALL.
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    /// Slot of this feature inside a [`TransactionFeatures`] array.
    fn slot(self) -> usize {
        match self {
            FeatureName::Time => 0,
            FeatureName::Amount => FEATURE_COUNT - 1,
            other => other.component_index().unwrap_or(0),
        }
    }

    /// `Some(i)` for `Vi`, `None` for `Time` and `Amount`.
    pub fn component_index(self) -> Option<usize> {
        Self::ALL[1..=28]
            .iter()
            .position(|&f| f == self)
            .map(|pos| pos + 1)
    }

    pub fn as_str(self) -> &'static str {
        const NAMES: [&str; FEATURE_COUNT] = [
            "Time", "V1", "V2", "V3", "V4", "V5", "V6", "V7", "V8", "V9", "V10", "V11", "V12",
            "V13", "V14", "V15", "V16", "V17", "V18", "V19", "V20", "V21", "V22", "V23", "V24",
            "V25", "V26", "V27", "V28", "Amount",
        ];
        NAMES[self.slot()]
    }
}

impl fmt::Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not one of the 30 feature keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown feature '{0}'")]
pub struct UnknownFeature(pub String);

impl FromStr for FeatureName {
    type Err = UnknownFeature;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeatureName::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| UnknownFeature(s.to_string()))
    }
}

/// A complete feature vector: one value per [`FeatureName`].
///
/// Absent keys are `0.0`. Values are fixed once the vector is built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "HashMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct TransactionFeatures {
    values: [f64; FEATURE_COUNT],
}

impl TransactionFeatures {
    /// Vector with every feature set to `0.0`.
    pub fn zeroed() -> Self {
        Self {
            values: [0.0; FEATURE_COUNT],
        }
    }

    /// Build from arbitrary `(name, value)` pairs.
    ///
    /// Names outside the closed feature set are ignored and missing ones stay
    /// at `0.0`, matching how a dict-shaped scoring payload is read.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut features = Self::zeroed();
        for (name, value) in pairs {
            match name.parse::<FeatureName>() {
                Ok(feature) => features.values[feature.slot()] = value,
                Err(e) => tracing::debug!(error = %e, "Ignoring feature outside the model schema"),
            }
        }
        features
    }

    pub fn get(&self, feature: FeatureName) -> f64 {
        self.values[feature.slot()]
    }

    /// Value for a column name from a model's feature order; unknown names read as `0.0`.
    pub fn get_by_name(&self, name: &str) -> f64 {
        name.parse::<FeatureName>()
            .map(|f| self.get(f))
            .unwrap_or(0.0)
    }

    /// `(name, value)` pairs in dataset column order.
    pub fn iter(&self) -> impl Iterator<Item = (FeatureName, f64)> + '_ {
        FeatureName::ALL.iter().map(move |&f| (f, self.get(f)))
    }

    pub fn len(&self) -> usize {
        FEATURE_COUNT
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    fn set(&mut self, feature: FeatureName, value: f64) {
        self.values[feature.slot()] = value;
    }
}

impl From<HashMap<String, f64>> for TransactionFeatures {
    fn from(map: HashMap<String, f64>) -> Self {
        Self::from_pairs(map.iter().map(|(k, v)| (k.as_str(), *v)))
    }
}

impl From<TransactionFeatures> for BTreeMap<String, f64> {
    fn from(features: TransactionFeatures) -> Self {
        features
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), value))
            .collect()
    }
}

/// Maps an amount and optional merchant into the classifier feature space.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureVectorBuilder;

impl FeatureVectorBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build a vector with the placeholder `Time`.
    pub fn build(&self, amount: f64, merchant: Option<&str>) -> TransactionFeatures {
        self.build_at(amount, merchant, None)
    }

    /// Build a vector, using `time` for the `Time` feature when known.
    pub fn build_at(
        &self,
        amount: f64,
        merchant: Option<&str>,
        time: Option<f64>,
    ) -> TransactionFeatures {
        let mut features = TransactionFeatures::zeroed();
        features.set(FeatureName::Time, time.unwrap_or(DEFAULT_TIME));
        features.set(FeatureName::Amount, amount);

        let merchant = merchant.map(str::to_lowercase);
        let amount_log = amount.max(0.01).ln();

        for i in 1..=28 {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            let value = if i <= 14 {
                if amount > HIGH_AMOUNT {
                    (amount / 100.0) * sign * 0.5
                } else if amount < MICRO_AMOUNT {
                    amount * 10.0 * sign
                } else {
                    amount_log * sign * 0.2
                }
            } else if merchant.is_some() {
                0.1 * sign
            } else {
                0.0
            };
            if let Some(feature) = FeatureName::component(i) {
                features.set(feature, value);
            }
        }

        if let Some(m) = merchant.as_deref() {
            apply_merchant_signals(&mut features, m, amount);
        }

        features
    }
}

/// Overwrite late components with elevated values for known anomaly patterns.
/// Only the first matching pattern applies.
fn apply_merchant_signals(features: &mut TransactionFeatures, merchant: &str, amount: f64) {
    if merchant.contains("starbucks") && amount > 500.0 {
        features.set(FeatureName::V14, 2.5);
        features.set(FeatureName::V15, 1.8);
    } else if merchant.contains("uber") && amount > 300.0 {
        features.set(FeatureName::V16, 2.2);
    } else if merchant.contains("whole foods") && amount < 20.0 {
        features.set(FeatureName::V17, 1.5);
    } else if merchant.contains("unknown") || merchant.contains("suspicious") {
        for j in 20..28 {
            if let Some(feature) = FeatureName::component(j) {
                features.set(feature, 1.0 + j as f64 * 0.1);
            }
        }
    }
}
