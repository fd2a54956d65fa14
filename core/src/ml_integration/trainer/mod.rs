//! Model Training Methods
//!
//! Estimator fitting over an already encoded design matrix.

pub mod boosting;
pub mod supervised;

pub use boosting::{train_gradient_boosting, BoostingParams, GradientBoostedTrees};
pub use supervised::{train_linear_regression, LinearModel};

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::metadata::ModelType;
use crate::error::PipelineError;

/// Which regressor sits behind the encoder
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorParams {
    GradientBoosting(BoostingParams),
    LinearRegression,
}

impl Default for EstimatorParams {
    fn default() -> Self {
        EstimatorParams::GradientBoosting(BoostingParams::default())
    }
}

impl EstimatorParams {
    pub fn fit(
        &self,
        features: &Array2<f64>,
        targets: &Array1<f64>,
    ) -> Result<Regressor, PipelineError> {
        match self {
            EstimatorParams::GradientBoosting(params) => {
                train_gradient_boosting(features, targets, *params).map(Regressor::Boosted)
            }
            EstimatorParams::LinearRegression => {
                train_linear_regression(features, targets).map(Regressor::Linear)
            }
        }
    }

    /// Name used in logs, metadata and the `ESTIMATOR` setting
    pub fn name(&self) -> &'static str {
        match self {
            EstimatorParams::GradientBoosting(_) => "gradient_boosting",
            EstimatorParams::LinearRegression => "linear_regression",
        }
    }
}

/// A fitted regressor
#[derive(Debug, Serialize, Deserialize)]
pub enum Regressor {
    Boosted(GradientBoostedTrees),
    Linear(LinearModel),
}

impl Regressor {
    pub fn n_features(&self) -> usize {
        match self {
            Regressor::Boosted(model) => model.n_features(),
            Regressor::Linear(model) => model.n_features(),
        }
    }

    pub fn model_type(&self) -> ModelType {
        match self {
            Regressor::Boosted(_) => ModelType::GradientBoosting,
            Regressor::Linear(_) => ModelType::LinearRegression,
        }
    }

    /// Raw outputs for every row of an encoded matrix
    pub fn predict(&self, features: &Array2<f64>) -> Result<Vec<f64>, String> {
        match self {
            Regressor::Boosted(model) => model.predict(features),
            Regressor::Linear(model) => Ok(features
                .rows()
                .into_iter()
                .map(|row| model.predict_row(row))
                .collect()),
        }
    }

    pub fn importances(&self) -> Vec<f64> {
        match self {
            Regressor::Boosted(model) => model.importances().to_vec(),
            Regressor::Linear(model) => model.importances(),
        }
    }
}
