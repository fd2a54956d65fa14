//! Supervised Learning Training Methods

use linfa::prelude::*;
use linfa_linear::LinearRegression;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PipelineError;

/// Columns whose spread falls below this are left out of the fit
const MIN_FEATURE_STD: f64 = 1e-12;

/// Ordinary least squares coefficients in the raw feature scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    coefficients: Vec<f64>,
    intercept: f64,
    /// Per-feature standard deviation of the training matrix
    feature_std: Vec<f64>,
}

impl LinearModel {
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    /// Raw linear response for one encoded row
    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        self.intercept
            + row
                .iter()
                .zip(&self.coefficients)
                .map(|(x, c)| x * c)
                .sum::<f64>()
    }

    /// Share of the response spread carried by each feature
    ///
    /// Uses `|coef| * std` so features on different scales compare fairly;
    /// the result sums to one unless every coefficient is zero.
    pub fn importances(&self) -> Vec<f64> {
        let raw: Vec<f64> = self
            .coefficients
            .iter()
            .zip(&self.feature_std)
            .map(|(c, s)| (c * s).abs())
            .collect();
        let total: f64 = raw.iter().sum();
        if total > 0.0 {
            raw.iter().map(|v| v / total).collect()
        } else {
            raw
        }
    }
}

/// Fit ordinary least squares with an intercept
///
/// Features are standardised before handing them to linfa, which keeps the
/// normal equations well conditioned when areas and years share a matrix.
/// Constant columns get a zero coefficient.
pub fn train_linear_regression(
    features: &Array2<f64>,
    targets: &Array1<f64>,
) -> Result<LinearModel, PipelineError> {
    info!(
        "Starting Linear Regression training with {} samples and {} features",
        features.nrows(),
        features.ncols()
    );

    // Validate input data
    if features.nrows() != targets.len() {
        return Err(PipelineError::Fit(format!(
            "Features and targets must have same number of samples: {} vs {}",
            features.nrows(),
            targets.len()
        )));
    }

    if features.is_empty() || targets.is_empty() {
        return Err(PipelineError::InsufficientData {
            rows: features.nrows(),
            features: features.ncols(),
        });
    }

    let means = features
        .mean_axis(Axis(0))
        .ok_or_else(|| PipelineError::Fit("cannot average an empty matrix".to_string()))?;
    let stds = features.std_axis(Axis(0), 0.0);
    let active: Vec<usize> = (0..features.ncols())
        .filter(|&j| stds[j] > MIN_FEATURE_STD)
        .collect();

    if features.nrows() < active.len() + 1 {
        return Err(PipelineError::InsufficientData {
            rows: features.nrows(),
            features: active.len(),
        });
    }

    let mut coefficients = vec![0.0; features.ncols()];
    let mut intercept = targets.mean().unwrap_or(0.0);

    if active.is_empty() {
        debug!("All features are constant; fitting the mean only");
    } else {
        let mut standardised = features.select(Axis(1), &active);
        for (k, &j) in active.iter().enumerate() {
            let mut column = standardised.column_mut(k);
            column.mapv_inplace(|x| (x - means[j]) / stds[j]);
        }

        let dataset = Dataset::new(standardised, targets.clone());
        let fitted = LinearRegression::default()
            .fit(&dataset)
            .map_err(|e| PipelineError::Fit(format!("Linear regression training failed: {}", e)))?;

        // Undo the standardisation so the model scores raw rows
        intercept = fitted.intercept();
        for (k, &j) in active.iter().enumerate() {
            let coefficient = fitted.params()[k] / stds[j];
            coefficients[j] = coefficient;
            intercept -= coefficient * means[j];
        }
    }

    if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
        return Err(PipelineError::Fit(
            "solver returned non-finite coefficients".to_string(),
        ));
    }

    info!("Linear regression training completed successfully");

    Ok(LinearModel {
        coefficients,
        intercept,
        feature_std: stds.to_vec(),
    })
}
