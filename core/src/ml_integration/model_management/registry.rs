//! Model Registry
//!
//! File-backed registry of versioned pipelines plus a tracking area that
//! records one JSON document per training run.
//!
//! Layout under the registry root:
//!
//! ```text
//! models/<name>/<version>/model.bin
//! models/<name>/<version>/metadata.json
//! models/<name>/<version>/artifacts/*
//! ```
//!
//! `metadata.json` is written last, so a version directory without it is an
//! unfinished save and stays invisible to readers.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::StoreError;
use crate::ml_integration::metadata::{ModelMetadata, ModelType};
use crate::ml_integration::pipeline::{FittedPipeline, FORMAT_VERSION};

const MODEL_FILE: &str = "model.bin";
const METADATA_FILE: &str = "metadata.json";
const ARTIFACTS_DIR: &str = "artifacts";
const RUN_FILE: &str = "run.json";

/// A loaded pipeline with the metadata it was registered under
#[derive(Debug)]
pub struct FittedModel {
    pub pipeline: FittedPipeline,
    pub metadata: ModelMetadata,
}

/// Training run as recorded in the tracking area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingRun {
    pub run_id: Uuid,
    pub run_name: String,
    pub model_name: String,
    pub registered_version: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub metrics: BTreeMap<String, f64>,
    pub params: HashMap<String, serde_json::Value>,
}

/// Registry client for one model name
#[derive(Debug, Clone)]
pub struct ModelStore {
    name: String,
    registry_root: PathBuf,
    tracking_root: PathBuf,
}

impl ModelStore {
    pub fn new(name: &str, registry_uri: &str, tracking_uri: &str) -> Result<Self, StoreError> {
        validate_name(name)?;
        Ok(Self {
            name: name.to_string(),
            registry_root: resolve_uri(registry_uri)?,
            tracking_root: resolve_uri(tracking_uri)?,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, StoreError> {
        Self::new(
            &settings.model_name,
            &settings.model_registry_uri,
            &settings.model_tracking_uri,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn model_dir(&self) -> PathBuf {
        self.registry_root.join("models").join(&self.name)
    }

    fn version_dir(&self, version: u32) -> PathBuf {
        self.model_dir().join(version.to_string())
    }

    /// Register `pipeline` as the next version
    ///
    /// `artifact_files` are copied into the version's `artifacts/` directory.
    /// Non-finite metrics are dropped since JSON cannot carry them.
    pub async fn save(
        &self,
        pipeline: &FittedPipeline,
        metrics: &BTreeMap<String, f64>,
        artifact_files: &[PathBuf],
    ) -> Result<ModelMetadata, StoreError> {
        let model_dir = self.model_dir();
        fs::create_dir_all(&model_dir)
            .await
            .map_err(|e| StoreError::io(&model_dir, e))?;

        let (version, version_dir) = self.claim_version().await?;
        debug!("Claimed version {} at {}", version, version_dir.display());

        let bytes =
            bincode::serialize(pipeline).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let model_path = version_dir.join(MODEL_FILE);
        fs::write(&model_path, bytes)
            .await
            .map_err(|e| StoreError::io(&model_path, e))?;

        let artifacts_dir = version_dir.join(ARTIFACTS_DIR);
        fs::create_dir_all(&artifacts_dir)
            .await
            .map_err(|e| StoreError::io(&artifacts_dir, e))?;
        let mut artifacts = Vec::with_capacity(artifact_files.len());
        for file in artifact_files {
            let Some(file_name) = file.file_name() else {
                warn!("Skipping artifact without a file name: {}", file.display());
                continue;
            };
            fs::copy(file, artifacts_dir.join(file_name))
                .await
                .map_err(|e| StoreError::io(file, e))?;
            artifacts.push(file_name.to_string_lossy().into_owned());
        }

        let metrics: BTreeMap<String, f64> = metrics
            .iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(k, v)| (k.clone(), *v))
            .collect();

        let run_id = Uuid::new_v4();
        let created_at = chrono::Utc::now();
        let model_type = pipeline.model_type();
        let description = match model_type {
            ModelType::GradientBoosting => {
                "Target-encoded gradient boosted trees for property valuation"
            }
            _ => "Target-encoded linear regression for property valuation",
        };

        let metadata = ModelMetadata {
            id: run_id,
            name: self.name.clone(),
            version,
            model_type,
            created_at,
            training_data_size: pipeline.training_rows(),
            metrics,
            hyperparameters: pipeline.hyperparameters(),
            feature_names: pipeline.feature_names().to_vec(),
            artifacts,
            description: description.to_string(),
        };

        // Write-then-rename so readers never see a partial metadata file
        let json = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let staging = version_dir.join(format!("{}.tmp", METADATA_FILE));
        fs::write(&staging, json)
            .await
            .map_err(|e| StoreError::io(&staging, e))?;
        let metadata_path = version_dir.join(METADATA_FILE);
        fs::rename(&staging, &metadata_path)
            .await
            .map_err(|e| StoreError::io(&metadata_path, e))?;

        // Runs only ever point at versions readers can see, and a tracking
        // failure cannot take back a committed version
        let run = TrackingRun {
            run_id,
            run_name: format!("{}-v{}", self.name, version),
            model_name: self.name.clone(),
            registered_version: version,
            created_at,
            metrics: metadata.metrics.clone(),
            params: metadata.hyperparameters.clone(),
        };
        if let Err(e) = self.record_run(&run).await {
            warn!(model = %self.name, version, "Failed to record tracking run: {}", e);
        }

        info!(
            model = %self.name,
            version,
            run_id = %run_id,
            "Registered model version"
        );
        Ok(metadata)
    }

    /// Create the next version directory exclusively
    async fn claim_version(&self) -> Result<(u32, PathBuf), StoreError> {
        let mut version = self.highest_claimed().await?.map_or(1, |v| v + 1);
        loop {
            let dir = self.version_dir(version);
            match fs::create_dir(&dir).await {
                Ok(()) => return Ok((version, dir)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => version += 1,
                Err(e) => return Err(StoreError::io(&dir, e)),
            }
        }
    }

    async fn record_run(&self, run: &TrackingRun) -> Result<(), StoreError> {
        let run_dir = self
            .tracking_root
            .join("runs")
            .join(run.run_id.to_string());
        fs::create_dir_all(&run_dir)
            .await
            .map_err(|e| StoreError::io(&run_dir, e))?;

        let json =
            serde_json::to_vec_pretty(run).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let path = run_dir.join(RUN_FILE);
        fs::write(&path, json)
            .await
            .map_err(|e| StoreError::io(&path, e))
    }

    /// Numeric version directories, complete or not
    async fn version_dirs(&self) -> Result<Vec<u32>, StoreError> {
        let model_dir = self.model_dir();
        let mut entries = match fs::read_dir(&model_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&model_dir, e)),
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&model_dir, e))?
        {
            if let Some(version) = entry.file_name().to_str().and_then(|s| s.parse().ok()) {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    async fn highest_claimed(&self) -> Result<Option<u32>, StoreError> {
        Ok(self.version_dirs().await?.last().copied())
    }

    /// Complete versions in ascending order
    pub async fn list_versions(&self) -> Result<Vec<u32>, StoreError> {
        let mut complete = Vec::new();
        for version in self.version_dirs().await? {
            if is_file(&self.version_dir(version).join(METADATA_FILE)).await {
                complete.push(version);
            }
        }
        Ok(complete)
    }

    pub async fn latest_version(&self) -> Result<Option<u32>, StoreError> {
        Ok(self.list_versions().await?.last().copied())
    }

    /// Load the most recent complete version
    pub async fn load_latest(&self) -> Result<FittedModel, StoreError> {
        let version = self
            .latest_version()
            .await?
            .ok_or_else(|| StoreError::NotFound(self.name.clone()))?;
        self.load(version).await
    }

    pub async fn load(&self, version: u32) -> Result<FittedModel, StoreError> {
        let dir = self.version_dir(version);
        let metadata_path = dir.join(METADATA_FILE);
        if !is_file(&metadata_path).await {
            return Err(StoreError::VersionNotFound {
                name: self.name.clone(),
                version,
            });
        }

        let raw = fs::read(&metadata_path)
            .await
            .map_err(|e| StoreError::io(&metadata_path, e))?;
        let metadata: ModelMetadata =
            serde_json::from_slice(&raw).map_err(|e| StoreError::Serialization(e.to_string()))?;

        let model_path = dir.join(MODEL_FILE);
        let bytes = fs::read(&model_path)
            .await
            .map_err(|e| StoreError::io(&model_path, e))?;
        let pipeline: FittedPipeline =
            bincode::deserialize(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;

        if pipeline.format_version() != FORMAT_VERSION {
            return Err(StoreError::Incompatible(format!(
                "artifact format {} but this build reads {}",
                pipeline.format_version(),
                FORMAT_VERSION
            )));
        }
        pipeline
            .check_schema()
            .map_err(|e| StoreError::Incompatible(e.to_string()))?;

        info!(model = %self.name, version, "Loaded model version");
        Ok(FittedModel { pipeline, metadata })
    }
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

/// Local path behind a `file:` URI or plain path
fn resolve_uri(uri: &str) -> Result<PathBuf, StoreError> {
    let path = if let Some(rest) = uri.strip_prefix("file://") {
        rest
    } else if let Some(rest) = uri.strip_prefix("file:") {
        rest
    } else if uri.contains("://") {
        return Err(StoreError::UnsupportedUri(uri.to_string()));
    } else {
        uri
    };

    if path.is_empty() {
        return Err(StoreError::UnsupportedUri(uri.to_string()));
    }
    Ok(PathBuf::from(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml_integration::encoder::EncoderParams;
    use crate::ml_integration::pipeline::{ModelPipeline, PipelineParams};
    use crate::ml_integration::test_support::synthetic_table;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ModelStore {
        let uri = format!("file:{}", dir.path().display());
        ModelStore::new("valuation", &uri, &uri).unwrap()
    }

    fn fitted(smoothing: f64) -> FittedPipeline {
        let params = PipelineParams {
            encoder: EncoderParams {
                min_samples_leaf: 20,
                smoothing,
            },
            ..PipelineParams::default()
        };
        ModelPipeline::new(params)
            .fit(&synthetic_table(40))
            .unwrap()
            .0
    }

    #[tokio::test]
    async fn test_load_latest_returns_second_save() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let first = fitted(10.0);
        let second = fitted(2.0);
        assert_ne!(first.params(), second.params());

        let m1 = store.save(&first, &BTreeMap::new(), &[]).await.unwrap();
        let m2 = store.save(&second, &BTreeMap::new(), &[]).await.unwrap();
        assert_eq!(m1.version, 1);
        assert_eq!(m2.version, 2);

        let latest = store.load_latest().await.unwrap();
        assert_eq!(latest.metadata.version, 2);
        assert_eq!(latest.pipeline.params(), second.params());
        assert_eq!(store.load(1).await.unwrap().pipeline.params(), first.params());
        let rows = synthetic_table(5);
        assert_eq!(
            latest.pipeline.predict_many(rows.records()).unwrap(),
            second.predict_many(rows.records()).unwrap()
        );
        assert_eq!(store.list_versions().await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_incomplete_version_is_invisible() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.save(&fitted(10.0), &BTreeMap::new(), &[]).await.unwrap();

        // A crashed writer leaves a directory without metadata
        std::fs::create_dir_all(store.version_dir(2)).unwrap();
        assert_eq!(store.latest_version().await.unwrap(), Some(1));
        assert!(matches!(
            store.load(2).await,
            Err(StoreError::VersionNotFound { version: 2, .. })
        ));

        // The next save skips the claimed directory
        let metadata = store.save(&fitted(10.0), &BTreeMap::new(), &[]).await.unwrap();
        assert_eq!(metadata.version, 3);
    }

    #[tokio::test]
    async fn test_tracking_failure_keeps_committed_version() {
        let dir = TempDir::new().unwrap();
        let blocked = dir.path().join("tracking");
        std::fs::write(&blocked, "not a directory").unwrap();
        let registry = format!("file:{}", dir.path().join("registry").display());
        let tracking = format!("file:{}", blocked.display());
        let store = ModelStore::new("valuation", &registry, &tracking).unwrap();

        let metadata = store.save(&fitted(10.0), &BTreeMap::new(), &[]).await.unwrap();
        assert_eq!(metadata.version, 1);
        assert_eq!(store.load_latest().await.unwrap().metadata.id, metadata.id);
        assert!(blocked.is_file());
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert_eq!(store.latest_version().await.unwrap(), None);
        assert!(matches!(
            store.load_latest().await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_save_records_run_and_artifacts() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let plot = dir.path().join("plot.svg");
        std::fs::write(&plot, "<svg/>").unwrap();

        let metrics: BTreeMap<String, f64> = [
            ("holdout_mae".to_string(), 12.0),
            ("test_r2_std".to_string(), f64::NAN),
        ]
        .into_iter()
        .collect();
        let metadata = store
            .save(&fitted(10.0), &metrics, &[plot])
            .await
            .unwrap();

        assert_eq!(metadata.artifacts, vec!["plot.svg".to_string()]);
        assert_eq!(metadata.metrics.len(), 1);
        assert!(store.version_dir(1).join("artifacts/plot.svg").exists());

        let run_file = dir
            .path()
            .join("runs")
            .join(metadata.id.to_string())
            .join(RUN_FILE);
        let run: TrackingRun =
            serde_json::from_slice(&std::fs::read(run_file).unwrap()).unwrap();
        assert_eq!(run.registered_version, 1);
        assert_eq!(run.params, metadata.hyperparameters);
        assert_eq!(metadata.model_type, ModelType::GradientBoosting);
        assert_eq!(run.metrics.get("holdout_mae"), Some(&12.0));
    }

    #[test]
    fn test_uri_and_name_checks() {
        assert_eq!(resolve_uri("file:./mlruns").unwrap(), PathBuf::from("./mlruns"));
        assert_eq!(resolve_uri("file:///tmp/x").unwrap(), PathBuf::from("/tmp/x"));
        assert_eq!(resolve_uri("/srv/models").unwrap(), PathBuf::from("/srv/models"));
        assert!(matches!(
            resolve_uri("http://tracking:5000"),
            Err(StoreError::UnsupportedUri(_))
        ));

        assert!(ModelStore::new("ok-name_1.2", "file:x", "file:x").is_ok());
        for bad in ["", "..", "a/b", "spaced name"] {
            assert!(matches!(
                ModelStore::new(bad, "file:x", "file:x"),
                Err(StoreError::InvalidName(_))
            ));
        }
    }
}
