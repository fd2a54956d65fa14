//! Training orchestration for the valuation model
//!
//! One run loads the source table, validates it, splits off a holdout,
//! fits the pipeline, evaluates it and registers the result.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::Settings;
use crate::data::{DataLoader, DataSource};
use crate::error::ValuatorError;
use crate::ml_integration::evaluation::{EvaluationConfig, EvaluationReport, Evaluator};
use crate::ml_integration::metadata::{ModelMetadata, RegressionMetrics};
use crate::ml_integration::model_management::ModelStore;
use crate::ml_integration::pipeline::{ModelPipeline, PipelineParams};
use crate::validation::{ValidationReport, ValidationRules, Validator};

/// Everything a finished training run produced
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub metadata: ModelMetadata,
    pub validation: ValidationReport,
    pub training_metrics: RegressionMetrics,
    pub evaluation: EvaluationReport,
}

/// Drives one end-to-end training run
pub struct TrainingOrchestrator {
    settings: Settings,
    params: PipelineParams,
}

impl TrainingOrchestrator {
    pub fn new(settings: Settings) -> Self {
        let mut params = PipelineParams::default();
        if let Some(estimator) = settings.estimator_params() {
            params.estimator = estimator;
        }
        Self { settings, params }
    }

    pub fn with_params(mut self, params: PipelineParams) -> Self {
        self.params = params;
        self
    }

    /// Train from `data_path`, or from the configured SQL source when absent
    pub async fn run(&self, data_path: Option<PathBuf>) -> Result<TrainingOutcome, ValuatorError> {
        let started = Instant::now();
        let settings = &self.settings;
        let store = ModelStore::from_settings(settings)?;

        let source = DataSource::from_settings(data_path, settings)?;
        info!(model = %settings.model_name, source = ?source, "Starting training run");
        let frame = DataLoader::new(source).load().await?;

        let rules = ValidationRules::default().with_max_rejection_rate(settings.max_rejection_rate);
        let validated = Validator::new(rules).validate(&frame)?;
        let table = validated.table;

        let (train, holdout) = table.train_test_split(settings.test_size, settings.random_seed);
        info!(
            train_rows = train.len(),
            holdout_rows = holdout.len(),
            "Split training data"
        );
        if holdout.is_empty() {
            warn!("Holdout is empty; evaluation will only cover cross-validation");
        }

        let (fitted, training_metrics) = ModelPipeline::new(self.params).fit(&train)?;

        let evaluator = Evaluator::new(EvaluationConfig {
            plots_dir: settings.plots_dir.clone(),
            cv_folds: settings.cv_folds,
            seed: settings.random_seed,
        });
        let evaluation = evaluator.evaluate(&fitted, &holdout, &train);

        let mut metrics = BTreeMap::new();
        training_metrics.write_into("training", &mut metrics);
        metrics.extend(evaluation.metrics());
        metrics.insert(
            "validation_rejected_rows".to_string(),
            validated.report.rejected_rows as f64,
        );

        let metadata = store.save(&fitted, &metrics, &evaluation.artifacts).await?;

        info!(
            model = %metadata.name,
            version = metadata.version,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Training run finished"
        );

        Ok(TrainingOutcome {
            metadata,
            validation: validated.report,
            training_metrics,
            evaluation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LoadError, PipelineError, ValidationError};
    use crate::ml_integration::metadata::ModelType;
    use std::fmt::Write as _;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> Settings {
        let registry = format!("file:{}", dir.path().join("mlruns").display());
        let vars = [
            ("MODEL_NAME", "unit-model".to_string()),
            ("MODEL_REGISTRY_URI", registry.clone()),
            ("MODEL_TRACKING_URI", registry),
            ("PLOTS_DIR", dir.path().join("plots").display().to_string()),
            ("CV_FOLDS", "3".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Settings::from_map(vars).unwrap()
    }

    fn write_csv(dir: &TempDir, rows: usize, bad_rows: usize) -> PathBuf {
        let mut csv =
            String::from("type,sector,net_usable_area,net_area,n_rooms,n_bathroom,year_built,price\n");
        for i in 0..rows {
            let area = 45.0 + (i % 11) as f64 * 15.0;
            let kind = if i % 2 == 0 { "house" } else { "apartment" };
            let sector = ["north", "south"][(i / 2) % 2];
            let price = 1_800.0 * area + (i % 3) as f64 * 500.0;
            writeln!(
                csv,
                "{},{},{},{},{},{},{},{}",
                kind,
                sector,
                area,
                area + 8.0,
                1 + (i / 3) % 4,
                1 + (i / 4) % 2,
                1970 + (i * 3) % 45,
                price
            )
            .unwrap();
        }
        for _ in 0..bad_rows {
            csv.push_str("house,north,-10,50,2,1,1990,100000\n");
        }
        let path = dir.path().join("train.csv");
        std::fs::write(&path, csv).unwrap();
        path
    }

    #[tokio::test]
    async fn test_run_registers_a_version() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, 40, 0);
        let outcome = TrainingOrchestrator::new(settings(&dir))
            .run(Some(path))
            .await
            .unwrap();

        assert_eq!(outcome.metadata.version, 1);
        assert_eq!(outcome.validation.accepted_rows, 40);
        assert!(outcome.metadata.metrics.contains_key("training_rmse"));
        assert!(outcome.metadata.metrics.contains_key("holdout_mae"));
        assert_eq!(outcome.metadata.artifacts.len(), 2);
        assert_eq!(outcome.metadata.model_type, ModelType::GradientBoosting);
        assert!(dir.path().join("plots").join("true_vs_predicted.svg").exists());
    }

    #[tokio::test]
    async fn test_estimator_setting_selects_the_regressor() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, 40, 0);
        let mut settings = settings(&dir);
        settings.estimator = "linear_regression".to_string();

        let outcome = TrainingOrchestrator::new(settings)
            .run(Some(path))
            .await
            .unwrap();
        assert_eq!(outcome.metadata.model_type, ModelType::LinearRegression);
        assert_eq!(outcome.metadata.hyperparameters["estimator"], "linear_regression");
    }

    #[tokio::test]
    async fn test_run_stops_on_high_rejection_rate() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, 30, 10);
        let err = TrainingOrchestrator::new(settings(&dir))
            .run(Some(path))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ValuatorError::Validation(ValidationError::RejectionRateExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_with_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = TrainingOrchestrator::new(settings(&dir))
            .run(Some(dir.path().join("absent.csv")))
            .await
            .unwrap_err();
        assert!(matches!(err, ValuatorError::Load(LoadError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_too_few_rows_fails_fit() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, 6, 0);
        let err = TrainingOrchestrator::new(settings(&dir))
            .run(Some(path))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ValuatorError::Pipeline(PipelineError::InsufficientData { .. })
        ));
    }
}
