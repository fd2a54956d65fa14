//! Valuation Pipeline
//!
//! Target encoding of the categorical features followed by a regressor,
//! gradient boosted trees unless configured otherwise. [`ModelPipeline`]
//! holds the untrained parameters; fitting yields a [`FittedPipeline`],
//! which is what gets persisted and served.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use super::encoder::{EncoderParams, TargetEncoder};
use super::metadata::RegressionMetrics;
use super::metadata::ModelType;
use super::trainer::{EstimatorParams, Regressor};
use crate::error::{InferenceError, PipelineError};
use crate::schema::{PropertyRecord, TrainingTable};

/// Layout version of the serialized [`FittedPipeline`]
pub const FORMAT_VERSION: u32 = 2;

/// Hyperparameters of the pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineParams {
    pub encoder: EncoderParams,
    pub estimator: EstimatorParams,
}

/// Untrained pipeline
#[derive(Debug, Clone, Default)]
pub struct ModelPipeline {
    params: PipelineParams,
}

impl ModelPipeline {
    pub fn new(params: PipelineParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> PipelineParams {
        self.params
    }

    /// Fit encoder and regressor on `table`
    ///
    /// Returns the fitted pipeline together with its in-sample metrics.
    pub fn fit(
        &self,
        table: &TrainingTable,
    ) -> Result<(FittedPipeline, RegressionMetrics), PipelineError> {
        let n_features = PropertyRecord::FEATURES.len();
        if table.len() < n_features + 1 {
            return Err(PipelineError::InsufficientData {
                rows: table.len(),
                features: n_features,
            });
        }

        let encoder = TargetEncoder::fit(table.records(), table.prices(), self.params.encoder);
        let design = encode_matrix(&encoder, table.records())
            .map_err(|e| PipelineError::Fit(format!("encoding training rows failed: {}", e)))?;
        let targets = Array1::from(table.prices().to_vec());

        debug!(
            rows = design.nrows(),
            columns = design.ncols(),
            estimator = self.params.estimator.name(),
            "Encoded design matrix"
        );
        let model = self.params.estimator.fit(&design, &targets)?;

        let fitted = FittedPipeline {
            format_version: FORMAT_VERSION,
            feature_names: PropertyRecord::feature_names(),
            encoder,
            model,
            params: self.params,
            training_rows: table.len(),
        };

        let predictions = fitted
            .predict_many(table.records())
            .map_err(|e| PipelineError::Fit(format!("scoring training rows failed: {}", e)))?;
        let metrics = RegressionMetrics::compute(table.prices(), &predictions).ok_or_else(|| {
            PipelineError::Fit("no predictions to score".to_string())
        })?;

        info!(
            rows = table.len(),
            mae = metrics.mae,
            rmse = metrics.rmse,
            r2 = metrics.r2,
            "Pipeline fitted"
        );
        Ok((fitted, metrics))
    }
}

/// Trained pipeline ready for inference
#[derive(Debug, Serialize, Deserialize)]
pub struct FittedPipeline {
    format_version: u32,
    feature_names: Vec<String>,
    encoder: TargetEncoder,
    model: Regressor,
    params: PipelineParams,
    training_rows: usize,
}

impl FittedPipeline {
    /// Predicted price for one record, never negative
    pub fn predict(&self, record: &PropertyRecord) -> Result<f64, InferenceError> {
        let prices = self.predict_many(std::slice::from_ref(record))?;
        prices.into_iter().next().ok_or(InferenceError::NonFinite)
    }

    /// Score a batch in one pass over the ensemble
    pub fn predict_many(&self, records: &[PropertyRecord]) -> Result<Vec<f64>, InferenceError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let design = encode_matrix(&self.encoder, records)?;
        let raw = self.model.predict(&design).map_err(InferenceError::Model)?;
        raw.into_iter()
            .map(|value| {
                if value.is_finite() {
                    Ok(value.max(0.0))
                } else {
                    Err(InferenceError::NonFinite)
                }
            })
            .collect()
    }

    /// Normalised importance per feature, in model column order
    pub fn feature_importances(&self) -> Vec<(String, f64)> {
        self.feature_names
            .iter()
            .cloned()
            .zip(self.model.importances())
            .collect()
    }

    /// Ensure the artifact was built for the current feature layout
    pub fn check_schema(&self) -> Result<(), InferenceError> {
        let expected = PropertyRecord::feature_names();
        if self.feature_names != expected || self.model.n_features() != expected.len() {
            return Err(InferenceError::SchemaMismatch {
                expected,
                found: self.feature_names.clone(),
            });
        }
        Ok(())
    }

    /// Categories the encoder knows for `field`
    pub fn vocabulary(&self, field: &str) -> Vec<&str> {
        self.encoder.vocabulary(field)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    pub fn params(&self) -> PipelineParams {
        self.params
    }

    pub fn training_rows(&self) -> usize {
        self.training_rows
    }

    pub fn model_type(&self) -> ModelType {
        self.model.model_type()
    }

    /// Parameters recorded with the registered version
    pub fn hyperparameters(&self) -> HashMap<String, serde_json::Value> {
        let mut params = HashMap::new();
        params.insert(
            "encoder_min_samples_leaf".to_string(),
            serde_json::json!(self.params.encoder.min_samples_leaf),
        );
        params.insert(
            "encoder_smoothing".to_string(),
            serde_json::json!(self.params.encoder.smoothing),
        );
        params.insert(
            "estimator".to_string(),
            serde_json::json!(self.params.estimator.name()),
        );
        match self.params.estimator {
            EstimatorParams::GradientBoosting(boosting) => {
                params.insert("learning_rate".to_string(), serde_json::json!(boosting.learning_rate));
                params.insert("n_estimators".to_string(), serde_json::json!(boosting.n_estimators));
                params.insert("max_depth".to_string(), serde_json::json!(boosting.max_depth));
                params.insert(
                    "min_samples_leaf".to_string(),
                    serde_json::json!(boosting.min_samples_leaf),
                );
                params.insert(
                    "min_samples_split".to_string(),
                    serde_json::json!(boosting.min_samples_split),
                );
                params.insert("loss".to_string(), serde_json::json!("absolute_error"));
            }
            EstimatorParams::LinearRegression => {
                params.insert("fit_intercept".to_string(), serde_json::json!(true));
            }
        }
        params
    }
}

fn encode_row(encoder: &TargetEncoder, record: &PropertyRecord) -> Result<Array1<f64>, InferenceError> {
    PropertyRecord::FEATURES
        .iter()
        .map(|&field| match record.categorical(field) {
            Some(value) => encoder.encode(field, value),
            None => record
                .numeric(field)
                .ok_or_else(|| InferenceError::InvalidRecord(format!("unknown feature '{}'", field))),
        })
        .collect::<Result<Vec<f64>, _>>()
        .map(Array1::from)
}

fn encode_matrix(
    encoder: &TargetEncoder,
    records: &[PropertyRecord],
) -> Result<Array2<f64>, InferenceError> {
    let n_features = PropertyRecord::FEATURES.len();
    let mut matrix = Array2::zeros((records.len(), n_features));
    for (i, record) in records.iter().enumerate() {
        matrix.row_mut(i).assign(&encode_row(encoder, record)?);
    }
    Ok(matrix)
}
