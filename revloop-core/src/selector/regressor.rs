//! Linear regression trained by stochastic gradient descent

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Incremental model update failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelUpdateError {
    #[error("input has {found} features, model was fitted on {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("input contains non-finite values")]
    NonFiniteInput,

    #[error("update produced non-finite weights")]
    Diverged,

    #[error("model has not been fitted")]
    NotFitted,
}

/// Squared-loss linear model with L2 penalty and constant step size
///
/// Each [`SgdRegressor::partial_fit`] call is one gradient step on one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SgdRegressor {
    learning_rate: f64,
    alpha: f64,
    weights: Vec<f64>,
    intercept: f64,
    updates: u64,
}

impl SgdRegressor {
    pub fn new(learning_rate: f64, alpha: f64) -> Self {
        Self {
            learning_rate,
            alpha,
            weights: Vec::new(),
            intercept: 0.0,
            updates: 0,
        }
    }

    /// Same hyperparameters, no learned weights
    pub fn reinitialized(&self) -> Self {
        Self::new(self.learning_rate, self.alpha)
    }

    pub fn is_fitted(&self) -> bool {
        !self.weights.is_empty()
    }

    /// Input dimensionality, fixed by the first fit
    pub fn dimension(&self) -> Option<usize> {
        self.is_fitted().then_some(self.weights.len())
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    fn raw_predict(&self, x: &[f64]) -> f64 {
        self.weights.iter().zip(x).map(|(w, v)| w * v).sum::<f64>() + self.intercept
    }

    fn check_input(&self, x: &[f64]) -> Result<(), ModelUpdateError> {
        if self.is_fitted() && x.len() != self.weights.len() {
            return Err(ModelUpdateError::DimensionMismatch {
                expected: self.weights.len(),
                found: x.len(),
            });
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(ModelUpdateError::NonFiniteInput);
        }
        Ok(())
    }

    /// Expected target for `x`
    pub fn predict(&self, x: &[f64]) -> Result<f64, ModelUpdateError> {
        if !self.is_fitted() {
            return Err(ModelUpdateError::NotFitted);
        }
        self.check_input(x)?;

        let y = self.raw_predict(x);
        if y.is_finite() {
            Ok(y)
        } else {
            Err(ModelUpdateError::Diverged)
        }
    }

    /// One SGD step towards `y`
    ///
    /// On error the model is left unchanged.
    pub fn partial_fit(&mut self, x: &[f64], y: f64) -> Result<(), ModelUpdateError> {
        self.check_input(x)?;
        if !y.is_finite() {
            return Err(ModelUpdateError::NonFiniteInput);
        }

        let mut weights = if self.is_fitted() {
            self.weights.clone()
        } else {
            vec![0.0; x.len()]
        };

        let prediction = weights.iter().zip(x).map(|(w, v)| w * v).sum::<f64>() + self.intercept;
        let residual = prediction - y;
        let eta = self.learning_rate;

        for (w, v) in weights.iter_mut().zip(x) {
            *w -= eta * (residual * v + self.alpha * *w);
        }
        let intercept = self.intercept - eta * residual;

        if weights.iter().any(|w| !w.is_finite()) || !intercept.is_finite() {
            return Err(ModelUpdateError::Diverged);
        }

        self.weights = weights;
        self.intercept = intercept;
        self.updates += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predict_before_fit() {
        let model = SgdRegressor::new(0.01, 0.0001);
        assert_eq!(model.predict(&[1.0]), Err(ModelUpdateError::NotFitted));
        assert_eq!(model.dimension(), None);
    }

    #[test]
    fn test_single_step() {
        let mut model = SgdRegressor::new(0.1, 0.0);
        model.partial_fit(&[1.0, 2.0], 10.0).unwrap();
        // residual = -10, w -= 0.1 * (-10 * x)
        assert_eq!(model.weights(), &[1.0, 2.0]);
        assert_eq!(model.intercept(), 1.0);
        assert_eq!(model.predict(&[1.0, 2.0]).unwrap(), 6.0);
        assert_eq!(model.updates(), 1);
    }

    #[test]
    fn test_converges_towards_target() {
        let mut model = SgdRegressor::new(0.05, 0.0001);
        for _ in 0..500 {
            model.partial_fit(&[1.0, 0.0], 8.0).unwrap();
            model.partial_fit(&[0.0, 1.0], 2.0).unwrap();
        }
        assert!((model.predict(&[1.0, 0.0]).unwrap() - 8.0).abs() < 0.5);
        assert!((model.predict(&[0.0, 1.0]).unwrap() - 2.0).abs() < 0.5);
    }

    #[test]
    fn test_dimension_fixed_by_first_fit() {
        let mut model = SgdRegressor::new(0.01, 0.0001);
        model.partial_fit(&[1.0, 2.0, 3.0], 5.0).unwrap();
        let before = model.clone();

        assert_eq!(
            model.partial_fit(&[1.0], 5.0),
            Err(ModelUpdateError::DimensionMismatch {
                expected: 3,
                found: 1
            })
        );
        assert_eq!(model, before);
    }

    #[test]
    fn test_divergence_detected() {
        let mut model = SgdRegressor::new(1e300, 0.0);
        let result = model.partial_fit(&[1e300], 1e300);
        assert_eq!(result, Err(ModelUpdateError::Diverged));
        assert!(!model.is_fitted());
    }

    #[test]
    fn test_reinitialized_keeps_hyperparameters() {
        let mut model = SgdRegressor::new(0.02, 0.5);
        model.partial_fit(&[1.0], 1.0).unwrap();
        let fresh = model.reinitialized();
        assert!(!fresh.is_fitted());
        assert_eq!(fresh, SgdRegressor::new(0.02, 0.5));
    }
}
