//! Fitted regression models over the engineered feature matrix.
//!
//! The model family is a closed enum: exhaustive matching keeps a new kind
//! from being silently unhandled anywhere in the pipeline.

use crate::error::ForecastError;
use crate::types::ModelKind;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::linear_regression::{
    LinearRegression, LinearRegressionParameters, LinearRegressionSolverName,
};
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};

#[cfg(feature = "arima")]
use super::arima::ArimaModel;

pub const RANDOM_SEED: u64 = 42;
pub const TREE_MAX_DEPTH: u16 = 10;
pub const FOREST_MAX_DEPTH: u16 = 15;
pub const FOREST_TREES: usize = 100;
pub const MIN_SAMPLES_SPLIT: usize = 5;
pub const MIN_SAMPLES_LEAF: usize = 2;

type LinearModel = LinearRegression<f64, f64, DenseMatrix<f64>, Vec<f64>>;
type TreeModel = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;
type ForestModel = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// A fitted regressor for one model kind.
///
/// Tree and forest variants carry their per-column importance vector,
/// computed at fit time and kept in lockstep with the stored feature-column
/// list.
#[derive(Debug)]
pub enum FittedModel {
    Linear(LinearModel),
    Tree { model: TreeModel, importance: Vec<f64> },
    Forest { model: ForestModel, importance: Vec<f64> },
    #[cfg(feature = "arima")]
    Arima(ArimaModel),
}

/// Persistable subset of [`FittedModel`]: the time-series model is kept in
/// memory only, it does not serialize portably.
#[derive(Serialize)]
enum StoredModelRef<'a> {
    Linear(&'a LinearModel),
    Tree {
        model: &'a TreeModel,
        importance: &'a [f64],
    },
    Forest {
        model: &'a ForestModel,
        importance: &'a [f64],
    },
}

#[derive(Deserialize)]
enum StoredModel {
    Linear(LinearModel),
    Tree {
        model: TreeModel,
        importance: Vec<f64>,
    },
    Forest {
        model: ForestModel,
        importance: Vec<f64>,
    },
}

impl FittedModel {
    pub fn kind(&self) -> ModelKind {
        match self {
            FittedModel::Linear(_) => ModelKind::Linear,
            FittedModel::Tree { .. } => ModelKind::Tree,
            FittedModel::Forest { .. } => ModelKind::Forest,
            #[cfg(feature = "arima")]
            FittedModel::Arima(_) => ModelKind::Arima,
        }
    }

    /// Importance vector for tree-based kinds, positionally aligned with the
    /// feature columns used at fit time.
    pub fn importance(&self) -> Option<&[f64]> {
        match self {
            FittedModel::Tree { importance, .. } | FittedModel::Forest { importance, .. } => {
                Some(importance)
            }
            _ => None,
        }
    }

    /// Predicts over a row-major feature matrix. Not applicable to the
    /// time-series kind, which forecasts from its own state.
    pub fn predict_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ForecastError> {
        let x = matrix(rows);
        let result = match self {
            FittedModel::Linear(model) => model.predict(&x),
            FittedModel::Tree { model, .. } => model.predict(&x),
            FittedModel::Forest { model, .. } => model.predict(&x),
            #[cfg(feature = "arima")]
            FittedModel::Arima(_) => {
                return Err(ForecastError::Fit(
                    "time-series model does not predict from feature rows".to_string(),
                ));
            }
        };
        result.map_err(|e| ForecastError::Fit(e.to_string()))
    }

    /// Serialized blob for the store, or `None` for the in-memory-only
    /// time-series kind.
    pub fn encode(&self) -> Result<Option<Vec<u8>>, ForecastError> {
        let stored = match self {
            FittedModel::Linear(model) => StoredModelRef::Linear(model),
            FittedModel::Tree { model, importance } => StoredModelRef::Tree {
                model,
                importance,
            },
            FittedModel::Forest { model, importance } => StoredModelRef::Forest {
                model,
                importance,
            },
            #[cfg(feature = "arima")]
            FittedModel::Arima(_) => return Ok(None),
        };
        Ok(Some(bincode::serialize(&stored)?))
    }

    pub fn decode(blob: &[u8]) -> Result<Self, ForecastError> {
        let stored: StoredModel = bincode::deserialize(blob)?;
        Ok(match stored {
            StoredModel::Linear(model) => FittedModel::Linear(model),
            StoredModel::Tree { model, importance } => FittedModel::Tree { model, importance },
            StoredModel::Forest { model, importance } => {
                FittedModel::Forest { model, importance }
            }
        })
    }
}

/// Fits one non-time-series kind on the training partition.
pub fn fit_regressor(
    kind: ModelKind,
    x_train: &[Vec<f64>],
    y_train: &[f64],
) -> Result<FittedModel, ForecastError> {
    let x = matrix(x_train);
    let y = y_train.to_vec();
    let fit_err = |e: smartcore::error::Failed| ForecastError::Fit(e.to_string());

    match kind {
        ModelKind::Linear => {
            // the SVD solver indexes out of bounds when the system is
            // underdetermined, so reject rows < columns up front and let the
            // caller record a per-kind failure
            let num_features = x_train.first().map_or(0, Vec::len);
            if x_train.len() < num_features {
                return Err(ForecastError::Fit(format!(
                    "linear fit needs at least {num_features} rows, got {}",
                    x_train.len()
                )));
            }
            // SVD handles the collinear constant metadata columns
            let params = LinearRegressionParameters::default()
                .with_solver(LinearRegressionSolverName::SVD);
            let model = LinearModel::fit(&x, &y, params).map_err(fit_err)?;
            Ok(FittedModel::Linear(model))
        }
        ModelKind::Tree => {
            let mut params = DecisionTreeRegressorParameters::default()
                .with_max_depth(TREE_MAX_DEPTH)
                .with_min_samples_split(MIN_SAMPLES_SPLIT)
                .with_min_samples_leaf(MIN_SAMPLES_LEAF);
            params.seed = Some(RANDOM_SEED);
            let model = TreeModel::fit(&x, &y, params).map_err(fit_err)?;
            Ok(FittedModel::Tree {
                model,
                importance: Vec::new(),
            })
        }
        ModelKind::Forest => {
            let params = RandomForestRegressorParameters::default()
                .with_n_trees(FOREST_TREES)
                .with_max_depth(FOREST_MAX_DEPTH)
                .with_min_samples_split(MIN_SAMPLES_SPLIT)
                .with_min_samples_leaf(MIN_SAMPLES_LEAF)
                .with_seed(RANDOM_SEED);
            let model = ForestModel::fit(&x, &y, params).map_err(fit_err)?;
            Ok(FittedModel::Forest {
                model,
                importance: Vec::new(),
            })
        }
        ModelKind::Arima => Err(ForecastError::Fit(
            "time-series kind is fit from the cleaned series, not the feature matrix".to_string(),
        )),
    }
}

/// Deterministic mean-ablation importance on the held-out partition: the
/// increase in mean squared error when one feature column is pinned to its
/// training mean, normalized over all columns.
pub fn ablation_importance(
    model: &FittedModel,
    x_train: &[Vec<f64>],
    x_eval: &[Vec<f64>],
    y_eval: &[f64],
) -> Result<Vec<f64>, ForecastError> {
    let num_features = x_eval.first().map_or(0, Vec::len);
    if num_features == 0 {
        return Ok(Vec::new());
    }

    let baseline = mse(y_eval, &model.predict_rows(x_eval)?);
    let mut increases = Vec::with_capacity(num_features);
    for feature in 0..num_features {
        let train_mean = x_train.iter().map(|row| row[feature]).sum::<f64>()
            / x_train.len().max(1) as f64;
        let ablated: Vec<Vec<f64>> = x_eval
            .iter()
            .map(|row| {
                let mut row = row.clone();
                row[feature] = train_mean;
                row
            })
            .collect();
        let ablated_mse = mse(y_eval, &model.predict_rows(&ablated)?);
        increases.push((ablated_mse - baseline).max(0.0));
    }

    let total: f64 = increases.iter().sum();
    if total > 0.0 {
        for value in &mut increases {
            *value /= total;
        }
    }
    Ok(increases)
}

fn mse(y_true: &[f64], y_pred: &[f64]) -> f64 {
    y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / y_true.len().max(1) as f64
}

// Panics on an empty row set; every caller supplies at least one row.
fn matrix(rows: &[Vec<f64>]) -> DenseMatrix<f64> {
    DenseMatrix::from_2d_vec(&rows.to_vec())
}
