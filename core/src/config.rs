//! Configuration Management Module
//!
//! Runtime settings resolved from environment variables on top of built-in
//! defaults. The binary loads a `.env` file first, so values from it are
//! seen here as ordinary environment variables.

use config::{Config, Environment, Map};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

use crate::error::ConfigError;
use crate::ml_integration::trainer::EstimatorParams;

/// Application-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Shared secret for the prediction endpoint
    pub api_key: Option<String>,
    /// Name models are registered under
    pub model_name: String,
    /// Location of the model registry
    pub model_registry_uri: String,
    /// Location where training runs are recorded
    pub model_tracking_uri: String,
    /// sqlx connection string used when no CSV path is given
    pub sql_connection: Option<String>,
    /// Query executed against `sql_connection`
    pub sql_query: Option<String>,
    /// Default tracing filter
    pub log_level: String,
    /// Directory receiving diagnostic plots
    pub plots_dir: PathBuf,
    /// Highest tolerated share of rejected training rows
    pub max_rejection_rate: f64,
    /// Share of validated rows held out for evaluation
    pub test_size: f64,
    /// Seed for splitting and cross-validation shuffles
    pub random_seed: u64,
    /// Number of cross-validation folds
    pub cv_folds: usize,
    /// Regressor behind the encoder: `gradient_boosting` or `linear_regression`
    pub estimator: String,
    /// Bind host for the API server
    pub host: String,
    /// Bind port for the API server
    pub port: u16,
}

impl Settings {
    /// Resolve settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::build(Environment::default().try_parsing(true))
    }

    /// Resolve settings from an explicit variable map instead of the process
    /// environment
    pub fn from_map(vars: Map<String, String>) -> Result<Self, ConfigError> {
        Self::build(Environment::default().try_parsing(true).source(Some(vars)))
    }

    fn build(environment: Environment) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .set_default("model_name", "property-valuation-model")?
            .set_default("model_registry_uri", "file:./mlruns")?
            .set_default("model_tracking_uri", "file:./mlruns")?
            .set_default("sql_connection", "sqlite://./data.db")?
            .set_default("sql_query", "SELECT * FROM properties")?
            .set_default("log_level", "info")?
            .set_default("plots_dir", "plots")?
            .set_default("max_rejection_rate", 0.1)?
            .set_default("test_size", 0.2)?
            .set_default("random_seed", 42)?
            .set_default("cv_folds", 5)?
            .set_default("estimator", "gradient_boosting")?
            .set_default("host", "0.0.0.0")?
            .set_default("port", 8000)?
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        debug!("Resolved settings for model '{}'", settings.model_name);
        Ok(settings)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.max_rejection_rate) {
            return Err(ConfigError::Invalid {
                key: "max_rejection_rate".to_string(),
                reason: "must be within [0, 1]".to_string(),
            });
        }

        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(ConfigError::Invalid {
                key: "test_size".to_string(),
                reason: "must be strictly between 0 and 1".to_string(),
            });
        }

        if self.cv_folds < 2 {
            return Err(ConfigError::Invalid {
                key: "cv_folds".to_string(),
                reason: "must be at least 2".to_string(),
            });
        }

        if self.estimator_params().is_none() {
            return Err(ConfigError::Invalid {
                key: "estimator".to_string(),
                reason: format!(
                    "unknown estimator '{}', expected gradient_boosting or linear_regression",
                    self.estimator
                ),
            });
        }

        if self.model_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "model_name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Estimator named by the `estimator` setting, with default hyperparameters
    pub fn estimator_params(&self) -> Option<EstimatorParams> {
        match self.estimator.as_str() {
            "gradient_boosting" => Some(EstimatorParams::default()),
            "linear_regression" => Some(EstimatorParams::LinearRegression),
            _ => None,
        }
    }

    /// Shared secret, required when serving
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        match self.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(ConfigError::MissingApiKey),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Map<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_map(Map::new()).unwrap();
        assert_eq!(settings.model_name, "property-valuation-model");
        assert_eq!(settings.model_registry_uri, "file:./mlruns");
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.cv_folds, 5);
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.estimator_params(), Some(EstimatorParams::default()));
        assert!(settings.api_key.is_none());
        assert!(settings.require_api_key().is_err());
    }

    #[test]
    fn test_environment_overrides() {
        let settings = Settings::from_map(vars(&[
            ("API_KEY", "secret"),
            ("MODEL_NAME", "demo"),
            ("MAX_REJECTION_RATE", "0.25"),
            ("PORT", "9090"),
            ("LOG_LEVEL", "debug"),
            ("ESTIMATOR", "linear_regression"),
        ]))
        .unwrap();

        assert_eq!(settings.require_api_key().unwrap(), "secret");
        assert_eq!(settings.model_name, "demo");
        assert_eq!(settings.max_rejection_rate, 0.25);
        assert_eq!(settings.port, 9090);
        assert_eq!(settings.log_level, "debug");
        assert_eq!(
            settings.estimator_params(),
            Some(EstimatorParams::LinearRegression)
        );
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(Settings::from_map(vars(&[("TEST_SIZE", "1.5")])).is_err());
        assert!(Settings::from_map(vars(&[("CV_FOLDS", "1")])).is_err());
        assert!(Settings::from_map(vars(&[("MAX_REJECTION_RATE", "2")])).is_err());
        assert!(Settings::from_map(vars(&[("ESTIMATOR", "random_forest")])).is_err());
    }
}
