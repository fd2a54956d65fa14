//! Model Evaluation
//!
//! Holdout scoring, k-fold cross-validation and diagnostic plots. Everything
//! here is advisory: failures are logged and never stop registration.

pub mod plots;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

use super::metadata::RegressionMetrics;
use super::pipeline::{FittedPipeline, ModelPipeline};
use crate::error::InferenceError;
use crate::schema::TrainingTable;

/// Evaluator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Directory receiving the SVG plots
    pub plots_dir: PathBuf,
    /// Number of cross-validation folds
    pub cv_folds: usize,
    /// Seed for the fold shuffle
    pub seed: u64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            plots_dir: PathBuf::from("plots"),
            cv_folds: 5,
            seed: 42,
        }
    }
}

/// Mean and sample standard deviation of per-fold scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationSummary {
    pub folds: usize,
    pub train_rmse_mean: f64,
    pub train_rmse_std: f64,
    pub train_r2_mean: f64,
    pub train_r2_std: f64,
    pub test_rmse_mean: f64,
    pub test_rmse_std: f64,
    pub test_r2_mean: f64,
    pub test_r2_std: f64,
}

/// Outcome of one evaluation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Scores on the holdout rows the model could score
    pub holdout: Option<RegressionMetrics>,
    /// Holdout rows left out because the model could not score them
    pub holdout_skipped: usize,
    pub cross_validation: Option<CrossValidationSummary>,
    /// Plot files written during the pass
    pub artifacts: Vec<PathBuf>,
}

impl EvaluationReport {
    /// Flatten every score into one map, dropping non-finite values
    pub fn metrics(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        if let Some(holdout) = &self.holdout {
            holdout.write_into("holdout", &mut out);
        }
        out.insert("holdout_skipped".to_string(), self.holdout_skipped as f64);

        if let Some(cv) = &self.cross_validation {
            out.insert("cv_folds".to_string(), cv.folds as f64);
            out.insert("train_rmse_mean".to_string(), cv.train_rmse_mean);
            out.insert("train_rmse_std".to_string(), cv.train_rmse_std);
            out.insert("train_r2_mean".to_string(), cv.train_r2_mean);
            out.insert("train_r2_std".to_string(), cv.train_r2_std);
            out.insert("test_rmse_mean".to_string(), cv.test_rmse_mean);
            out.insert("test_rmse_std".to_string(), cv.test_rmse_std);
            out.insert("test_r2_mean".to_string(), cv.test_r2_mean);
            out.insert("test_r2_std".to_string(), cv.test_r2_std);
        }

        out.retain(|_, v| v.is_finite());
        out
    }
}

/// Scores a fitted pipeline
pub struct Evaluator {
    config: EvaluationConfig,
}

impl Evaluator {
    pub fn new(config: EvaluationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Score `fitted` on `holdout`, cross-validate on `train` and draw plots
    pub fn evaluate(
        &self,
        fitted: &FittedPipeline,
        holdout: &TrainingTable,
        train: &TrainingTable,
    ) -> EvaluationReport {
        let mut report = EvaluationReport::default();

        let scored = score_known(fitted, holdout);
        report.holdout_skipped = scored.skipped;
        report.holdout = RegressionMetrics::compute(&scored.actual, &scored.predicted);
        match &report.holdout {
            Some(m) => info!(
                rows = m.n_samples,
                skipped = scored.skipped,
                mae = m.mae,
                rmse = m.rmse,
                r2 = m.r2,
                "Holdout evaluation"
            ),
            None => warn!(skipped = scored.skipped, "No holdout rows could be scored"),
        }

        report.cross_validation = self.cross_validate(fitted, train);

        if let Err(e) = std::fs::create_dir_all(&self.config.plots_dir) {
            warn!(
                "Could not create plots directory {}: {}",
                self.config.plots_dir.display(),
                e
            );
            return report;
        }

        if !scored.actual.is_empty() {
            let path = self.config.plots_dir.join(plots::TRUE_VS_PREDICTED);
            match plots::true_vs_predicted(&path, &scored.actual, &scored.predicted) {
                Ok(()) => report.artifacts.push(path),
                Err(e) => warn!("Skipping true vs predicted plot: {}", e),
            }
        }

        let path = self.config.plots_dir.join(plots::FEATURE_IMPORTANCE);
        match plots::feature_importance(&path, &fitted.feature_importances()) {
            Ok(()) => report.artifacts.push(path),
            Err(e) => warn!("Skipping feature importance plot: {}", e),
        }

        report
    }

    fn cross_validate(
        &self,
        fitted: &FittedPipeline,
        train: &TrainingTable,
    ) -> Option<CrossValidationSummary> {
        let k = self.config.cv_folds;
        if k < 2 || train.len() < k * 2 {
            warn!(
                rows = train.len(),
                folds = k,
                "Too few rows for cross-validation, skipping"
            );
            return None;
        }

        let pipeline = ModelPipeline::new(fitted.params());
        let indices = train.shuffled_indices(self.config.seed);
        let folds = fold_bounds(indices.len(), k);

        let mut train_rmse = Vec::with_capacity(k);
        let mut train_r2 = Vec::with_capacity(k);
        let mut test_rmse = Vec::with_capacity(k);
        let mut test_r2 = Vec::with_capacity(k);

        for (fold, (start, end)) in folds.into_iter().enumerate() {
            let test_idx = &indices[start..end];
            let train_idx: Vec<usize> = indices[..start]
                .iter()
                .chain(&indices[end..])
                .copied()
                .collect();

            let (model, in_sample) = match pipeline.fit(&train.select(&train_idx)) {
                Ok(fit) => fit,
                Err(e) => {
                    warn!("Cross-validation fold {} failed, skipping CV: {}", fold, e);
                    return None;
                }
            };

            let scored = score_known(&model, &train.select(test_idx));
            let Some(out_of_sample) = RegressionMetrics::compute(&scored.actual, &scored.predicted)
            else {
                warn!("Cross-validation fold {} had no scorable rows", fold);
                continue;
            };

            train_rmse.push(in_sample.rmse);
            train_r2.push(in_sample.r2);
            test_rmse.push(out_of_sample.rmse);
            test_r2.push(out_of_sample.r2);
        }

        if test_rmse.is_empty() {
            return None;
        }

        let (train_rmse_mean, train_rmse_std) = mean_std(&train_rmse);
        let (train_r2_mean, train_r2_std) = mean_std(&train_r2);
        let (test_rmse_mean, test_rmse_std) = mean_std(&test_rmse);
        let (test_r2_mean, test_r2_std) = mean_std(&test_r2);

        info!(
            folds = test_rmse.len(),
            test_rmse_mean, test_r2_mean, "Cross-validation finished"
        );

        Some(CrossValidationSummary {
            folds: test_rmse.len(),
            train_rmse_mean,
            train_rmse_std,
            train_r2_mean,
            train_r2_std,
            test_rmse_mean,
            test_rmse_std,
            test_r2_mean,
            test_r2_std,
        })
    }
}

struct Scored {
    actual: Vec<f64>,
    predicted: Vec<f64>,
    skipped: usize,
}

/// Predictions for the rows the model can score
fn score_known(fitted: &FittedPipeline, table: &TrainingTable) -> Scored {
    let mut scored = Scored {
        actual: Vec::with_capacity(table.len()),
        predicted: Vec::with_capacity(table.len()),
        skipped: 0,
    };

    for (record, &price) in table.records().iter().zip(table.prices()) {
        match fitted.predict(record) {
            Ok(prediction) => {
                scored.actual.push(price);
                scored.predicted.push(prediction);
            }
            Err(InferenceError::UnseenCategory { .. }) => scored.skipped += 1,
            Err(e) => {
                warn!("Could not score evaluation row: {}", e);
                scored.skipped += 1;
            }
        }
    }
    scored
}

/// Contiguous `(start, end)` ranges splitting `n` items into `k` folds
///
/// The first `n % k` folds get one extra item.
fn fold_bounds(n: usize, k: usize) -> Vec<(usize, usize)> {
    let base = n / k;
    let extra = n % k;
    let mut bounds = Vec::with_capacity(k);
    let mut start = 0;
    for fold in 0..k {
        let size = base + usize::from(fold < extra);
        bounds.push((start, start + size));
        start += size;
    }
    bounds
}

/// Mean and sample standard deviation (ddof = 1)
fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (f64::NAN, f64::NAN);
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if n < 2 {
        return (mean, f64::NAN);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (mean, var.sqrt())
}
