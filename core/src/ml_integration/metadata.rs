//! ML Model Metadata Types
//!
//! Metadata recorded next to every registered model version, plus the
//! regression metrics shared by training and evaluation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Model metadata for tracking model versions and performance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Identifier of the training run that produced the version
    pub id: Uuid,
    pub name: String,
    pub version: u32,
    pub model_type: ModelType,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub training_data_size: usize,
    /// Training and evaluation metrics, flattened
    pub metrics: BTreeMap<String, f64>,
    pub hyperparameters: HashMap<String, serde_json::Value>,
    /// Feature names in model column order
    pub feature_names: Vec<String>,
    /// File names stored under the version's `artifacts/` directory
    pub artifacts: Vec<String>,
    pub description: String,
}

/// Estimators the pipeline can wrap
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ModelType {
    GradientBoosting,
    LinearRegression,
    Custom(String),
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelType::GradientBoosting => write!(f, "gradient_boosting"),
            ModelType::LinearRegression => write!(f, "linear_regression"),
            ModelType::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Standard regression scores over a set of predictions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    pub n_samples: usize,
}

impl RegressionMetrics {
    /// Score `predicted` against `actual`; `None` when empty or mismatched
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Option<Self> {
        if actual.is_empty() || actual.len() != predicted.len() {
            return None;
        }

        let n = actual.len() as f64;
        let mean = actual.iter().sum::<f64>() / n;
        let (abs_sum, sq_sum, ss_tot) = actual.iter().zip(predicted).fold(
            (0.0, 0.0, 0.0),
            |(abs_sum, sq_sum, ss_tot), (&y, &p)| {
                let err = y - p;
                (
                    abs_sum + err.abs(),
                    sq_sum + err * err,
                    ss_tot + (y - mean) * (y - mean),
                )
            },
        );

        // Constant targets: perfect fit scores 1, anything else 0
        let r2 = if ss_tot > 0.0 {
            1.0 - sq_sum / ss_tot
        } else if sq_sum == 0.0 {
            1.0
        } else {
            0.0
        };

        Some(Self {
            mae: abs_sum / n,
            rmse: (sq_sum / n).sqrt(),
            r2,
            n_samples: actual.len(),
        })
    }

    /// Insert the scores into `out` under `<prefix>_<metric>`
    pub fn write_into(&self, prefix: &str, out: &mut BTreeMap<String, f64>) {
        out.insert(format!("{}_mae", prefix), self.mae);
        out.insert(format!("{}_rmse", prefix), self.rmse);
        out.insert(format!("{}_r2", prefix), self.r2);
        out.insert(format!("{}_rows", prefix), self.n_samples as f64);
    }
}
