//! Labelled dataset loading and splitting.
//!
//! The training data is the public credit-card fraud table: a header row, a
//! binary `Class` label column and numeric feature columns.

use crate::error::DataError;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

/// Name of the label column in the credit-card dataset.
pub const LABEL_COLUMN: &str = "Class";

/// Feature matrix with binary labels and the column names of the features.
#[derive(Debug, Clone)]
pub struct LabeledDataset {
    pub feature_names: Vec<String>,
    pub records: Array2<f64>,
    pub labels: Array1<bool>,
}

/// Train/test halves produced by [`LabeledDataset::stratified_split`].
#[derive(Debug, Clone)]
pub struct SplitDataset {
    pub train: LabeledDataset,
    pub test: LabeledDataset,
}

impl LabeledDataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of positive (fraud) rows.
    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&y| y).count()
    }

    /// Rows at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> LabeledDataset {
        LabeledDataset {
            feature_names: self.feature_names.clone(),
            records: self.records.select(Axis(0), indices),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    /// Split into train and test halves, preserving the class ratio.
    ///
    /// Each class is shuffled with a seeded RNG and `test_fraction` of it
    /// (rounded, at least one row when the class has two or more) goes to the
    /// test half, so the split is reproducible for a given seed.
    pub fn stratified_split(&self, test_fraction: f64, seed: u64) -> SplitDataset {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut train_idx = Vec::with_capacity(self.len());
        let mut test_idx = Vec::new();

        for class in [false, true] {
            let mut idx: Vec<usize> = self
                .labels
                .iter()
                .enumerate()
                .filter(|(_, &y)| y == class)
                .map(|(i, _)| i)
                .collect();
            idx.shuffle(&mut rng);

            let mut n_test = (idx.len() as f64 * test_fraction).round() as usize;
            if n_test == 0 && idx.len() >= 2 && test_fraction > 0.0 {
                n_test = 1;
            }
            let n_test = n_test.min(idx.len());

            test_idx.extend_from_slice(&idx[..n_test]);
            train_idx.extend_from_slice(&idx[n_test..]);
        }

        train_idx.shuffle(&mut rng);
        test_idx.shuffle(&mut rng);

        SplitDataset {
            train: self.select(&train_idx),
            test: self.select(&test_idx),
        }
    }
}

/// Source of labelled training data for the model registry.
pub trait TrainingData: Send + Sync {
    fn load(&self) -> Result<LabeledDataset, DataError>;
}

/// Reads the dataset from a CSV file on disk.
#[derive(Debug, Clone)]
pub struct CsvDataSource {
    path: PathBuf,
}

impl CsvDataSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TrainingData for CsvDataSource {
    fn load(&self) -> Result<LabeledDataset, DataError> {
        info!(path = %self.path.display(), "Loading dataset");
        let file = File::open(&self.path)?;
        let dataset = read_dataset(file)?;
        info!(
            samples = dataset.len(),
            features = dataset.feature_names.len(),
            fraud = dataset.positives(),
            normal = dataset.len() - dataset.positives(),
            "Dataset loaded"
        );
        Ok(dataset)
    }
}

/// Parse a labelled dataset from any CSV reader.
///
/// Every column except [`LABEL_COLUMN`] is a feature, in header order. A
/// label is fraud when its numeric value is non-zero.
pub fn read_dataset<R: Read>(reader: R) -> Result<LabeledDataset, DataError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();

    let label_idx = headers
        .iter()
        .position(|h| h.trim() == LABEL_COLUMN)
        .ok_or_else(|| DataError::MissingLabel(LABEL_COLUMN.to_string()))?;

    let feature_names: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != label_idx)
        .map(|(_, h)| h.trim().to_string())
        .collect();

    let mut values = Vec::new();
    let mut labels = Vec::new();

    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        for (i, field) in record.iter().enumerate() {
            let parsed = parse_number(field).ok_or_else(|| DataError::InvalidValue {
                row: row + 1,
                column: headers.get(i).unwrap_or_default().to_string(),
                value: field.to_string(),
            })?;
            if i == label_idx {
                labels.push(parsed != 0.0);
            } else {
                values.push(parsed);
            }
        }
    }

    if labels.is_empty() {
        return Err(DataError::Empty);
    }

    let n_features = feature_names.len();
    let records = Array2::from_shape_vec((labels.len(), n_features), values).map_err(|_| {
        DataError::InvalidValue {
            row: 0,
            column: LABEL_COLUMN.to_string(),
            value: "ragged rows".to_string(),
        }
    })?;

    Ok(LabeledDataset {
        feature_names,
        records,
        labels: Array1::from(labels),
    })
}

fn parse_number(field: &str) -> Option<f64> {
    // The public dataset quotes its label column ("0"/"1").
    field.trim().trim_matches('"').parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Time,V1,V2,Amount,Class\n\
        0,-1.35,-0.07,149.62,\"0\"\n\
        1,1.19,0.26,2.69,\"0\"\n\
        2,-1.36,-1.34,378.66,\"1\"\n\
        3,-0.97,-0.19,123.50,\"0\"\n";

    #[test]
    fn test_read_dataset_separates_label() {
        let ds = read_dataset(SAMPLE.as_bytes()).unwrap();
        assert_eq!(ds.feature_names, vec!["Time", "V1", "V2", "Amount"]);
        assert_eq!(ds.records.dim(), (4, 4));
        assert_eq!(ds.records[[2, 3]], 378.66);
        assert_eq!(ds.positives(), 1);
        assert!(ds.labels[2]);
    }

    #[test]
    fn test_missing_label_column() {
        let err = read_dataset("Time,Amount\n0,1.0\n".as_bytes()).unwrap_err();
        assert!(matches!(err, DataError::MissingLabel(ref c) if c == "Class"));
    }

    #[test]
    fn test_non_numeric_value_is_reported() {
        let err = read_dataset("Amount,Class\nabc,0\n".as_bytes()).unwrap_err();
        match err {
            DataError::InvalidValue { row, column, .. } => {
                assert_eq!(row, 1);
                assert_eq!(column, "Amount");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_header_only_is_empty() {
        assert!(matches!(
            read_dataset("Amount,Class\n".as_bytes()),
            Err(DataError::Empty)
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let source = CsvDataSource::new("/definitely/not/here.csv");
        assert!(matches!(source.load(), Err(DataError::Io(_))));
    }

    #[test]
    fn test_stratified_split_keeps_both_classes() {
        let n = 100;
        let records = Array2::from_shape_fn((n, 2), |(i, j)| (i * 2 + j) as f64);
        let labels: Array1<bool> = (0..n).map(|i| i % 10 == 0).collect();
        let ds = LabeledDataset {
            feature_names: vec!["a".into(), "b".into()],
            records,
            labels,
        };

        let split = ds.stratified_split(0.2, 42);
        assert_eq!(split.train.len() + split.test.len(), n);
        assert_eq!(split.test.len(), 20);
        assert_eq!(split.test.positives(), 2);
        assert_eq!(split.train.positives(), 8);

        let again = ds.stratified_split(0.2, 42);
        assert_eq!(split.test.records, again.test.records);
    }
}
