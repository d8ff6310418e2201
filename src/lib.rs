//! Fraud assistant: credit-card fraud scoring with interchangeable classifiers,
//! business-rule floors and a keyword-driven chatbot.

pub mod chat;
pub mod config;
pub mod csv_reader;
pub mod error;
pub mod features;
pub mod models;
pub mod rules;
pub mod service;

pub use chat::Chatbot;
pub use features::{FeatureName, FeatureVectorBuilder, TransactionFeatures};
pub use models::{Algorithm, ModelRegistry};
pub use rules::{apply_rules, Decision, DecisionThresholds, FraudDecision};
pub use service::FraudService;

//test module
#[cfg(test)]
mod tests;
