//! Error types for the fraud assistant.
//!
//! Each layer owns one enum; the chat boundary is the only place errors are
//! turned into text instead of being propagated.

use crate::models::Algorithm;
use thiserror::Error;

/// Failures while loading the labelled training dataset.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("label column '{0}' not found in dataset")]
    MissingLabel(String),

    #[error("row {row}: column '{column}' is not a number ({value:?})")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },

    #[error("dataset contains no rows")]
    Empty,

    #[error("dataset needs both classes, found only label {0}")]
    SingleClass(u8),
}

/// Failures inside a classifier or its preprocessing.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("expected {expected} features, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("cannot fit on an empty training set")]
    EmptyTrainingSet,

    #[error("{rows} training rows exceed the limit of {max}")]
    TooManyRows { rows: usize, max: usize },

    #[error("SVM training failed: {0}")]
    Svm(#[from] linfa_svm::SvmError),

    #[error("nearest-neighbour index failed: {0}")]
    NnBuild(#[from] linfa_nn::BuildError),

    #[error("nearest-neighbour query failed: {0}")]
    NnQuery(#[from] linfa_nn::NnError),

    #[error("training diverged: non-finite loss at epoch {0}")]
    Diverged(usize),
}

/// Failures surfaced by the model registry. These are values, never panics.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown algorithm '{0}' (expected ann, svm or knn)")]
    UnknownAlgorithm(String),

    #[error("model {0} not loaded")]
    NotLoaded(Algorithm),

    #[error("dataset unavailable: {0}")]
    Data(#[from] DataError),

    #[error("training {algorithm} failed: {source}")]
    Training {
        algorithm: Algorithm,
        #[source]
        source: ModelError,
    },

    #[error("scoring with {algorithm} failed: {source}")]
    Scoring {
        algorithm: Algorithm,
        #[source]
        source: ModelError,
    },

    #[error("model store error: {0}")]
    Store(#[from] StoreError),
}

/// Failures reading or writing persisted bundles.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("model file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("model file is not a valid bundle: {0}")]
    Format(#[from] serde_json::Error),
}

/// Failures looking up users and their transactions.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("account store error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
