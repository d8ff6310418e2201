//! Hand-coded risk floors layered over the model score, and the mapping from
//! score to decision.

use crate::models::Algorithm;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Base score used when no model is available.
pub const FALLBACK_BASE_SCORE: f64 = 0.01;
/// Confidence reported for rule-only decisions.
pub const FALLBACK_CONFIDENCE: f64 = 0.85;

/// A named risk floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskRule {
    CoffeeShopHighAmount,
    VeryHighAmount,
    MicroAmount,
    UnknownMerchant,
    RideshareHighAmount,
    UnusualGroceryAmount,
}

impl RiskRule {
    pub const ALL: [RiskRule; 6] = [
        RiskRule::CoffeeShopHighAmount,
        RiskRule::VeryHighAmount,
        RiskRule::MicroAmount,
        RiskRule::UnknownMerchant,
        RiskRule::RideshareHighAmount,
        RiskRule::UnusualGroceryAmount,
    ];

    pub fn floor(self) -> f64 {
        match self {
            RiskRule::CoffeeShopHighAmount => 0.08,
            RiskRule::VeryHighAmount => 0.06,
            RiskRule::MicroAmount => 0.07,
            RiskRule::UnknownMerchant => 0.12,
            RiskRule::RideshareHighAmount => 0.04,
            RiskRule::UnusualGroceryAmount => 0.03,
        }
    }

    /// Why the rule fired, as shown to users.
    pub fn reason(self) -> &'static str {
        match self {
            RiskRule::CoffeeShopHighAmount => "Unusually high amount at coffee shop",
            RiskRule::VeryHighAmount => "Very high transaction amount",
            RiskRule::MicroAmount => "Micro-transaction, often used to test stolen cards",
            RiskRule::UnknownMerchant => "Unknown merchant",
            RiskRule::RideshareHighAmount => "High ride sharing cost",
            RiskRule::UnusualGroceryAmount => "Unusual grocery amount",
        }
    }

    pub fn matches(self, amount: f64, merchant: Option<&str>) -> bool {
        let merchant = merchant.map(str::to_lowercase);
        let has = |needle: &str| merchant.as_deref().is_some_and(|m| m.contains(needle));
        match self {
            RiskRule::CoffeeShopHighAmount => has("starbucks") && amount > 500.0,
            RiskRule::VeryHighAmount => amount > 10_000.0,
            RiskRule::MicroAmount => amount < 0.1,
            RiskRule::UnknownMerchant => has("unknown") || has("suspicious"),
            RiskRule::RideshareHighAmount => has("uber") && amount > 300.0,
            RiskRule::UnusualGroceryAmount => has("whole foods") && !(5.0..=500.0).contains(&amount),
        }
    }
}

/// Raise `base_score` to the highest floor among the matching rules.
/// Floors never add up, and the result is capped at 1.0.
pub fn apply_rules(amount: f64, merchant: Option<&str>, base_score: f64) -> f64 {
    triggered_rules(amount, merchant)
        .into_iter()
        .fold(base_score, |score, rule| score.max(rule.floor()))
        .min(1.0)
}

/// Matching rules in table order.
pub fn triggered_rules(amount: f64, merchant: Option<&str>) -> Vec<RiskRule> {
    RiskRule::ALL
        .into_iter()
        .filter(|rule| rule.matches(amount, merchant))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Challenge,
    Block,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Challenge => "challenge",
            Decision::Block => "block",
        }
    }

    /// Why the score landed in this band.
    pub fn reason(self) -> &'static str {
        match self {
            Decision::Allow => "score_below_allow_threshold",
            Decision::Challenge => "score_between_allow_and_challenge_threshold",
            Decision::Block => "score_above_challenge_threshold",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score bands: below `allow` is allowed, below `challenge` is challenged,
/// anything else is blocked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionThresholds {
    pub allow: f64,
    pub challenge: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            allow: 0.01,
            challenge: 0.05,
        }
    }
}

impl DecisionThresholds {
    pub fn decide(&self, score: f64) -> Decision {
        if score < self.allow {
            Decision::Allow
        } else if score < self.challenge {
            Decision::Challenge
        } else {
            Decision::Block
        }
    }

    /// Flag used in history views: the score lands in the block band.
    pub fn is_fraud(&self, score: f64) -> bool {
        self.decide(score) == Decision::Block
    }
}

/// Final verdict on one transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FraudDecision {
    pub score: f64,
    pub decision: Decision,
    pub confidence: f64,
    pub algorithm: Algorithm,
    pub model_version: String,
    pub reasons: Vec<String>,
}
