//! Gradient Boosted Regression Trees
//!
//! Least absolute deviation boosting over smartcore regression trees. Each
//! round grows a tree on the current residuals, then replaces every leaf's
//! output with the median residual of the training rows that reached it.

use ndarray::{Array1, Array2};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::error::PipelineError;

type RegressionTree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Seed for the column shuffles behind permutation importance
const IMPORTANCE_SEED: u64 = 42;

/// Boosting hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    /// Shrinkage applied to every tree's contribution
    pub learning_rate: f64,
    pub n_estimators: usize,
    pub max_depth: u16,
    pub min_samples_leaf: usize,
    pub min_samples_split: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            n_estimators: 300,
            max_depth: 5,
            min_samples_leaf: 1,
            min_samples_split: 2,
        }
    }
}

/// One boosting round
#[derive(Debug, Serialize, Deserialize)]
struct Stage {
    tree: RegressionTree,
    /// Median residual keyed by the bit pattern of the tree's leaf output
    leaf_values: BTreeMap<u64, f64>,
}

impl Stage {
    fn contributions(&self, matrix: &DenseMatrix<f64>) -> Result<Vec<f64>, String> {
        let outputs = self.tree.predict(matrix).map_err(|e| e.to_string())?;
        Ok(outputs
            .into_iter()
            .map(|out| self.leaf_values.get(&out.to_bits()).copied().unwrap_or(out))
            .collect())
    }
}

/// Fitted tree ensemble
#[derive(Debug, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    params: BoostingParams,
    /// Starting prediction, the median training target
    init: f64,
    stages: Vec<Stage>,
    n_features: usize,
    importances: Vec<f64>,
}

impl GradientBoostedTrees {
    pub fn params(&self) -> BoostingParams {
        self.params
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }

    /// Permutation importance measured on the training rows, summing to one
    pub fn importances(&self) -> &[f64] {
        &self.importances
    }

    /// Raw ensemble output for every row of `features`
    pub fn predict(&self, features: &Array2<f64>) -> Result<Vec<f64>, String> {
        if features.ncols() != self.n_features {
            return Err(format!(
                "expected {} feature columns, got {}",
                self.n_features,
                features.ncols()
            ));
        }
        let matrix = dense(features)?;
        self.predict_dense(&matrix, features.nrows())
    }

    fn predict_dense(&self, matrix: &DenseMatrix<f64>, rows: usize) -> Result<Vec<f64>, String> {
        let mut out = vec![self.init; rows];
        for stage in &self.stages {
            for (value, step) in out.iter_mut().zip(stage.contributions(matrix)?) {
                *value += self.params.learning_rate * step;
            }
        }
        Ok(out)
    }
}

/// Fit a boosted ensemble under absolute error loss
pub fn train_gradient_boosting(
    features: &Array2<f64>,
    targets: &Array1<f64>,
    params: BoostingParams,
) -> Result<GradientBoostedTrees, PipelineError> {
    info!(
        "Starting Gradient Boosting training with {} samples, {} features and {} estimators",
        features.nrows(),
        features.ncols(),
        params.n_estimators
    );

    if features.nrows() != targets.len() {
        return Err(PipelineError::Fit(format!(
            "Features and targets must have same number of samples: {} vs {}",
            features.nrows(),
            targets.len()
        )));
    }
    if features.nrows() < 2 || features.ncols() == 0 {
        return Err(PipelineError::InsufficientData {
            rows: features.nrows(),
            features: features.ncols(),
        });
    }
    if !(params.learning_rate > 0.0 && params.learning_rate.is_finite()) || params.n_estimators == 0
    {
        return Err(PipelineError::Fit(format!(
            "invalid boosting parameters: learning_rate={} n_estimators={}",
            params.learning_rate, params.n_estimators
        )));
    }

    let matrix = dense(features).map_err(PipelineError::Fit)?;
    let tree_params = DecisionTreeRegressorParameters::default()
        .with_max_depth(params.max_depth)
        .with_min_samples_leaf(params.min_samples_leaf)
        .with_min_samples_split(params.min_samples_split);

    let targets = targets.to_vec();
    let init = median(targets.clone()).unwrap_or(0.0);
    let mut current = vec![init; targets.len()];
    let mut stages = Vec::with_capacity(params.n_estimators);

    for round in 0..params.n_estimators {
        let residuals: Vec<f64> = targets.iter().zip(&current).map(|(y, f)| y - f).collect();
        let tree = RegressionTree::fit(&matrix, &residuals, tree_params.clone()).map_err(|e| {
            PipelineError::Fit(format!("tree {} failed to fit: {}", round, e))
        })?;
        let outputs = tree
            .predict(&matrix)
            .map_err(|e| PipelineError::Fit(format!("tree {} failed to score: {}", round, e)))?;

        let mut leaves: HashMap<u64, Vec<f64>> = HashMap::new();
        for (out, residual) in outputs.iter().zip(&residuals) {
            leaves.entry(out.to_bits()).or_default().push(*residual);
        }
        let leaf_values: BTreeMap<u64, f64> = leaves
            .into_iter()
            .filter_map(|(key, values)| median(values).map(|m| (key, m)))
            .collect();

        for (value, out) in current.iter_mut().zip(&outputs) {
            let step = leaf_values.get(&out.to_bits()).copied().unwrap_or(*out);
            *value += params.learning_rate * step;
        }
        stages.push(Stage { tree, leaf_values });
    }

    if current.iter().any(|v| !v.is_finite()) {
        return Err(PipelineError::Fit(
            "boosting produced non-finite predictions".to_string(),
        ));
    }

    let mut model = GradientBoostedTrees {
        params,
        init,
        stages,
        n_features: features.ncols(),
        importances: Vec::new(),
    };
    model.importances = permutation_importances(&model, features, &targets, &current)
        .map_err(PipelineError::Fit)?;

    debug!(
        stages = model.n_stages(),
        init = model.init,
        "Boosted ensemble fitted"
    );
    info!("Gradient boosting training completed successfully");
    Ok(model)
}

/// Rise in training MAE when one column is shuffled, normalised to one
fn permutation_importances(
    model: &GradientBoostedTrees,
    features: &Array2<f64>,
    targets: &[f64],
    baseline: &[f64],
) -> Result<Vec<f64>, String> {
    let base_mae = mean_absolute_error(targets, baseline);
    let mut raw = Vec::with_capacity(features.ncols());

    for j in 0..features.ncols() {
        let mut shuffled = features.clone();
        let mut column: Vec<f64> = features.column(j).to_vec();
        let mut rng = StdRng::seed_from_u64(IMPORTANCE_SEED + j as u64);
        column.shuffle(&mut rng);
        shuffled.column_mut(j).assign(&Array1::from(column));

        let predictions = model.predict(&shuffled)?;
        raw.push((mean_absolute_error(targets, &predictions) - base_mae).max(0.0));
    }

    let total: f64 = raw.iter().sum();
    if total > 0.0 {
        Ok(raw.iter().map(|v| v / total).collect())
    } else {
        Ok(raw)
    }
}

fn dense(features: &Array2<f64>) -> Result<DenseMatrix<f64>, String> {
    let rows: Vec<Vec<f64>> = features.rows().into_iter().map(|r| r.to_vec()).collect();
    DenseMatrix::from_2d_vec(&rows).map_err(|e| e.to_string())
}

fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let total: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum();
    total / actual.len().max(1) as f64
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn step_data() -> (Array2<f64>, Array1<f64>) {
        let rows: Vec<[f64; 2]> = (0..30)
            .map(|i| [f64::from(i), f64::from((i * 7) % 5)])
            .collect();
        let features = Array2::from_shape_fn((rows.len(), 2), |(i, j)| rows[i][j]);
        let targets = features
            .rows()
            .into_iter()
            .map(|r| if r[0] < 15.0 { 100.0 } else { 300.0 })
            .collect();
        (features, targets)
    }

    #[test]
    fn test_median() {
        assert_eq!(median(vec![3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(vec![4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(Vec::new()), None);
    }

    #[test]
    fn test_fits_a_step_and_stays_in_target_range() {
        let (features, targets) = step_data();
        let model = train_gradient_boosting(&features, &targets, BoostingParams::default()).unwrap();
        assert_eq!(model.n_stages(), 300);

        let predictions = model.predict(&features).unwrap();
        for (p, y) in predictions.iter().zip(targets.iter()) {
            assert!((p - y).abs() < 20.0, "predicted {} for {}", p, y);
            assert!((100.0..=300.0).contains(p));
        }

        let importances = model.importances();
        assert!((importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(importances[0] > importances[1]);
    }

    #[test]
    fn test_outlier_does_not_drag_the_fit() {
        let (features, mut targets) = step_data();
        targets[3] = 1.0e6;
        let model = train_gradient_boosting(&features, &targets, BoostingParams::default()).unwrap();
        let predictions = model.predict(&features).unwrap();
        assert!((predictions[5] - 100.0).abs() < 20.0);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let features = array![[1.0], [2.0], [3.0]];
        let targets = array![1.0, 2.0];
        assert!(train_gradient_boosting(&features, &targets, BoostingParams::default()).is_err());

        let one_row = array![[1.0]];
        let err = train_gradient_boosting(&one_row, &array![1.0], BoostingParams::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData { .. }));

        let (features, targets) = step_data();
        let params = BoostingParams {
            n_estimators: 0,
            ..BoostingParams::default()
        };
        assert!(train_gradient_boosting(&features, &targets, params).is_err());
    }

    #[test]
    fn test_column_count_is_checked_at_predict() {
        let (features, targets) = step_data();
        let params = BoostingParams {
            n_estimators: 5,
            ..BoostingParams::default()
        };
        let model = train_gradient_boosting(&features, &targets, params).unwrap();
        assert!(model.predict(&array![[1.0, 2.0, 3.0]]).is_err());
    }
}
