//! Per-column standardization

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Normalizer fitting or application failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizerFitError {
    #[error("cannot fit normalizer on empty history")]
    Empty,

    #[error("row {row} has {found} columns, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("history contains non-finite values")]
    NonFinite,

    #[error("normalizer is not fitted")]
    NotFitted,

    #[error("input has {found} columns, normalizer was fitted on {expected}")]
    DimensionMismatch { expected: usize, found: usize },
}

/// Mean / population standard deviation scaler
///
/// Columns with zero deviation get scale 1, so they are only centered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        !self.mean.is_empty()
    }

    /// Number of columns, 0 before fitting
    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    /// Fit on all rows, replacing any previous fit
    pub fn fit(&mut self, rows: &[Vec<f64>]) -> Result<(), NormalizerFitError> {
        let first = rows.first().ok_or(NormalizerFitError::Empty)?;
        let dim = first.len();
        if dim == 0 {
            return Err(NormalizerFitError::Empty);
        }

        for (row, values) in rows.iter().enumerate() {
            if values.len() != dim {
                return Err(NormalizerFitError::Ragged {
                    row,
                    expected: dim,
                    found: values.len(),
                });
            }
            if values.iter().any(|v| !v.is_finite()) {
                return Err(NormalizerFitError::NonFinite);
            }
        }

        let n = rows.len() as f64;
        let mut mean = vec![0.0; dim];
        for values in rows {
            for (m, v) in mean.iter_mut().zip(values) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut variance = vec![0.0; dim];
        for values in rows {
            for ((var, v), m) in variance.iter_mut().zip(values).zip(&mean) {
                *var += (v - m).powi(2);
            }
        }

        let scale = variance
            .into_iter()
            .map(|var| {
                let std = (var / n).sqrt();
                if std == 0.0 || !std.is_finite() {
                    1.0
                } else {
                    std
                }
            })
            .collect();

        self.mean = mean;
        self.scale = scale;
        Ok(())
    }

    /// Standardize one row
    pub fn transform(&self, row: &[f64]) -> Result<Vec<f64>, NormalizerFitError> {
        if !self.is_fitted() {
            return Err(NormalizerFitError::NotFitted);
        }
        if row.len() != self.mean.len() {
            return Err(NormalizerFitError::DimensionMismatch {
                expected: self.mean.len(),
                found: row.len(),
            });
        }

        Ok(row
            .iter()
            .zip(&self.mean)
            .zip(&self.scale)
            .map(|((v, m), s)| (v - m) / s)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_transform() {
        let mut scaler = StandardScaler::new();
        scaler
            .fit(&[vec![1.0, 10.0], vec![3.0, 10.0]])
            .unwrap();

        assert!(scaler.is_fitted());
        assert_eq!(scaler.dimension(), 2);
        // column 0: mean 2, std 1; column 1: constant, scale 1
        assert_eq!(scaler.transform(&[3.0, 10.0]).unwrap(), vec![1.0, 0.0]);
        assert_eq!(scaler.transform(&[0.0, 12.0]).unwrap(), vec![-2.0, 2.0]);
    }

    #[test]
    fn test_fit_errors() {
        let mut scaler = StandardScaler::new();
        assert_eq!(scaler.fit(&[]), Err(NormalizerFitError::Empty));
        assert!(matches!(
            scaler.fit(&[vec![1.0, 2.0], vec![1.0]]),
            Err(NormalizerFitError::Ragged { row: 1, .. })
        ));
        assert_eq!(
            scaler.fit(&[vec![f64::NAN]]),
            Err(NormalizerFitError::NonFinite)
        );
        assert!(!scaler.is_fitted());
    }

    #[test]
    fn test_transform_errors() {
        let mut scaler = StandardScaler::new();
        assert_eq!(scaler.transform(&[1.0]), Err(NormalizerFitError::NotFitted));

        scaler.fit(&[vec![1.0, 2.0]]).unwrap();
        assert_eq!(
            scaler.transform(&[1.0]),
            Err(NormalizerFitError::DimensionMismatch {
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn test_serde_round_trip() {
        let mut scaler = StandardScaler::new();
        scaler.fit(&[vec![1.0], vec![5.0]]).unwrap();
        let json = serde_json::to_string(&scaler).unwrap();
        let back: StandardScaler = serde_json::from_str(&json).unwrap();
        assert_eq!(scaler, back);
    }
}
