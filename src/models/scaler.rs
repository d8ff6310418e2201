//! Per-column standardisation fitted on the training split only.

use crate::error::ModelError;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Zero-mean, unit-variance scaling per feature column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Learn column means and standard deviations.
    ///
    /// Constant columns get a scale of 1 so they map to zero instead of NaN.
    pub fn fit(records: &Array2<f64>) -> Result<Self, ModelError> {
        if records.nrows() == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        let mean = records
            .mean_axis(Axis(0))
            .ok_or(ModelError::EmptyTrainingSet)?;
        let scale = records
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });
        Ok(Self { mean, scale })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, records: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        if records.ncols() != self.n_features() {
            return Err(ModelError::FeatureMismatch {
                expected: self.n_features(),
                actual: records.ncols(),
            });
        }
        Ok((records - &self.mean) / &self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_transform_standardises_columns() {
        let x = array![[1.0, 10.0], [3.0, 10.0], [5.0, 10.0]];
        let scaler = StandardScaler::fit(&x).unwrap();
        let z = scaler.transform(&x).unwrap();

        let col0 = z.column(0);
        assert!((col0.sum()).abs() < 1e-12);
        assert!((col0[2] - 1.224744871391589).abs() < 1e-9);
        // Constant column maps to zero.
        assert!(z.column(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_transform_rejects_wrong_width() {
        let scaler = StandardScaler::fit(&array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let err = scaler.transform(&array![[1.0, 2.0, 3.0]]).unwrap_err();
        assert!(matches!(
            err,
            ModelError::FeatureMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }
}
