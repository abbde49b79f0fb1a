//! Fill-level forecasting for a single bin.
//!
//! The forecaster is a per-bin state machine: untrained, trained in memory,
//! or loaded from the store. `train_models` fits the requested kinds and
//! persists them; `predict` and `feature_importance` lazily load a missing
//! kind from the store and fail with `ModelNotTrained` on a miss.

use crate::config::ForecastSettings;
use crate::error::ForecastError;
use crate::features::{self, FeatureEngineer};
use crate::preprocess::{Preprocessor, TARGET_COLUMN};
use crate::store::ModelStore;
use crate::table::FeatureTable;
use crate::types::{BinInfo, HourlyPrediction, ModelKind, PredictionResult, Reading};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

#[cfg(feature = "arima")]
pub mod arima;
pub mod metrics;
pub mod models;
pub mod trend;

use metrics::{ModelMetrics, TrainOutcome};
use models::FittedModel;

/// Per-kind training outcome, keyed in deterministic kind order.
pub type TrainingSummary = BTreeMap<ModelKind, TrainOutcome>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Number of top features returned by [`Forecaster::feature_importance`].
pub const TOP_FEATURES: usize = 15;

pub struct Forecaster<S: ModelStore> {
    bin_id: String,
    store: S,
    settings: ForecastSettings,
    preprocessor: Preprocessor,
    engineer: FeatureEngineer,
    models: HashMap<ModelKind, FittedModel>,
    feature_columns: Vec<String>,
}

impl<S: ModelStore> Forecaster<S> {
    pub fn new(bin_id: impl Into<String>, store: S) -> Self {
        Self::with_settings(bin_id, store, ForecastSettings::default())
    }

    pub fn with_settings(bin_id: impl Into<String>, store: S, settings: ForecastSettings) -> Self {
        Self {
            bin_id: bin_id.into(),
            store,
            preprocessor: Preprocessor::from_settings(&settings),
            engineer: FeatureEngineer::from_settings(&settings),
            settings,
            models: HashMap::new(),
            feature_columns: Vec::new(),
        }
    }

    pub fn bin_id(&self) -> &str {
        &self.bin_id
    }

    /// Feature columns used at the most recent fit or load.
    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    /// Cleans readings and runs the full feature chain, then drops rows left
    /// incomplete by lagging. An empty result means not enough history.
    pub fn prepare_data(&self, readings: &[Reading], bin: &BinInfo) -> FeatureTable {
        let cleaned = self.preprocessor.clean(readings);
        self.engineer_from_cleaned(cleaned, bin)
    }

    fn engineer_from_cleaned(&self, mut table: FeatureTable, bin: &BinInfo) -> FeatureTable {
        if table.is_empty() {
            return table;
        }
        self.engineer.engineer(&mut table, bin);
        table.drop_incomplete_rows();
        table
    }

    /// Trains the requested model kinds on an 80/20 temporal split and
    /// persists every successfully fitted non-time-series model.
    ///
    /// Table-level insufficiency aborts the whole call; a fit failure for
    /// one kind becomes an error entry for that kind only.
    pub fn train_models(
        &mut self,
        readings: &[Reading],
        bin: &BinInfo,
        kinds: &[ModelKind],
    ) -> Result<TrainingSummary, ForecastError> {
        let cleaned = self.preprocessor.clean(readings);
        let cleaned_target: Vec<f64> = cleaned
            .column(TARGET_COLUMN)
            .map(|v| v.to_vec())
            .unwrap_or_default();
        let table = self.engineer_from_cleaned(cleaned, bin);

        if table.num_rows() < self.settings.min_training_rows {
            return Err(ForecastError::InsufficientData(
                "insufficient data for training".to_string(),
            ));
        }

        let (feature_columns, rows, target) = design_matrix(&table);
        let split = (rows.len() as f64 * (1.0 - self.settings.test_fraction)) as usize;
        if split < self.settings.min_train_partition {
            return Err(ForecastError::InsufficientData(
                "insufficient training data".to_string(),
            ));
        }
        self.feature_columns = feature_columns;

        let (x_train, x_test) = rows.split_at(split);
        let (y_train, y_test) = target.split_at(split);

        let mut summary = TrainingSummary::new();
        // fixed kind order keeps the summary deterministic even when the
        // caller repeats or reorders kinds
        for kind in ModelKind::ALL {
            if !kinds.contains(&kind) {
                continue;
            }
            let outcome = match kind {
                ModelKind::Arima => self.train_time_series(&cleaned_target),
                _ => self.train_regressor(kind, x_train, y_train, x_test, y_test),
            };
            match outcome {
                Ok(metrics) => {
                    info!(
                        bin_id = %self.bin_id,
                        model = %kind,
                        rmse = metrics.rmse,
                        r2 = metrics.r2_score,
                        "trained model"
                    );
                    summary.insert(kind, TrainOutcome::Metrics(metrics));
                }
                Err(e) => {
                    warn!(bin_id = %self.bin_id, model = %kind, error = %e, "model fit failed");
                    summary.insert(
                        kind,
                        TrainOutcome::Failed {
                            error: e.to_string(),
                        },
                    );
                }
            }
        }

        self.persist_models()?;
        Ok(summary)
    }

    fn train_regressor(
        &mut self,
        kind: ModelKind,
        x_train: &[Vec<f64>],
        y_train: &[f64],
        x_test: &[Vec<f64>],
        y_test: &[f64],
    ) -> Result<ModelMetrics, ForecastError> {
        let mut model = models::fit_regressor(kind, x_train, y_train)?;
        let predictions = model.predict_rows(x_test)?;
        let metrics = metrics::evaluate(y_test, &predictions);

        if matches!(kind, ModelKind::Tree | ModelKind::Forest) {
            let importance = models::ablation_importance(&model, x_train, x_test, y_test)?;
            match &mut model {
                FittedModel::Tree {
                    importance: slot, ..
                }
                | FittedModel::Forest {
                    importance: slot, ..
                } => *slot = importance,
                _ => {}
            }
        }

        self.models.insert(kind, model);
        Ok(metrics)
    }

    #[cfg(feature = "arima")]
    fn train_time_series(&mut self, cleaned_target: &[f64]) -> Result<ModelMetrics, ForecastError> {
        let (model, metrics) = arima::fit(cleaned_target, &self.settings)?;
        self.models.insert(ModelKind::Arima, FittedModel::Arima(model));
        Ok(metrics)
    }

    #[cfg(not(feature = "arima"))]
    fn train_time_series(&mut self, _cleaned_target: &[f64]) -> Result<ModelMetrics, ForecastError> {
        Err(ForecastError::Fit(
            "time-series support not compiled in".to_string(),
        ))
    }

    fn persist_models(&self) -> Result<(), ForecastError> {
        for (kind, model) in &self.models {
            // the time-series model encodes to None and stays memory-only
            if let Some(blob) = model.encode()? {
                self.store.put_model(&self.bin_id, *kind, &blob)?;
            }
        }
        self.store
            .put_feature_columns(&self.bin_id, &self.feature_columns)?;
        Ok(())
    }

    /// Predicts hourly fill levels `hours_ahead` hours into the future using
    /// the requested kind, loading it from the store if necessary.
    pub fn predict(
        &mut self,
        readings: &[Reading],
        bin: &BinInfo,
        hours_ahead: u32,
        kind: ModelKind,
    ) -> Result<PredictionResult, ForecastError> {
        self.ensure_model(kind)?;

        let table = self.prepare_data(readings, bin);
        if table.is_empty() {
            return Err(ForecastError::InsufficientData(
                "insufficient data for prediction".to_string(),
            ));
        }

        let last = table.num_rows() - 1;
        let current_fill = table
            .value(last, TARGET_COLUMN)
            .ok_or_else(|| ForecastError::InsufficientData("target column missing".to_string()))?;
        let current_time = table.timestamp(last);

        let hourly = match self.models.get(&kind) {
            #[cfg(feature = "arima")]
            Some(FittedModel::Arima(model)) => {
                forecast_time_series(model, hours_ahead, current_time)
            }
            Some(model) => self.rollout(model, &table, bin, hours_ahead, current_time)?,
            None => return Err(ForecastError::ModelNotTrained(kind)),
        };

        let (hours_until_full, predicted_full_time) = first_full_hour(&hourly);
        let (predicted_fill_level, prediction_time) = match hourly.last() {
            Some(p) => (p.predicted_fill_level, p.timestamp),
            None => (metrics::round_to(current_fill, 2), current_time),
        };

        Ok(PredictionResult {
            bin_id: self.bin_id.clone(),
            model_kind: kind,
            current_fill_level: metrics::round_to(current_fill, 2),
            current_time,
            predicted_fill_level,
            prediction_time,
            hours_until_full,
            predicted_full_time,
            hourly_predictions: hourly,
        })
    }

    /// Iterative multi-step rollout for the regression kinds.
    ///
    /// Each future hour recomputes time features and bin metadata fresh but
    /// carries every other column (lags, rolling stats) forward unchanged
    /// from the previous step, updating only the predicted fill level.
    // Open question: because the carried lag/rolling columns are frozen
    // after step 1, multi-step forecasts lose time-series signal. This
    // mirrors the behavior downstream consumers already depend on; do not
    // recompute the features from the predicted sequence without a
    // coordinated change.
    fn rollout(
        &self,
        model: &FittedModel,
        table: &FeatureTable,
        bin: &BinInfo,
        hours_ahead: u32,
        current_time: OffsetDateTime,
    ) -> Result<Vec<HourlyPrediction>, ForecastError> {
        let mut carried: Vec<(String, f64)> = table.row(table.num_rows() - 1);
        let mut hourly = Vec::with_capacity(hours_ahead as usize);

        for hour in 1..=i64::from(hours_ahead) {
            let future_time = current_time + Duration::hours(hour);

            let mut row: Vec<(String, f64)> = features::time_feature_values(future_time)
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect();
            row.extend(features::metadata_feature_values(bin));
            for (name, value) in &carried {
                if !row.iter().any(|(n, _)| n == name) {
                    row.push((name.clone(), *value));
                }
            }

            // project onto the training-time column list, absent columns at 0
            let vector: Vec<f64> = self
                .feature_columns
                .iter()
                .map(|column| {
                    row.iter()
                        .find(|(name, _)| name == column)
                        .map_or(0.0, |(_, value)| *value)
                })
                .collect();

            let predicted = model.predict_rows(&[vector])?[0].clamp(0.0, 100.0);
            hourly.push(HourlyPrediction {
                timestamp: future_time,
                predicted_fill_level: metrics::round_to(predicted, 2),
            });

            set_value(&mut carried, TARGET_COLUMN, predicted);
        }
        Ok(hourly)
    }

    /// Top feature importances for the tree-based kinds, positionally
    /// aligned with the stored feature-column list.
    pub fn feature_importance(
        &mut self,
        kind: ModelKind,
    ) -> Result<Vec<FeatureImportance>, ForecastError> {
        if !matches!(kind, ModelKind::Tree | ModelKind::Forest) {
            return Err(ForecastError::UnsupportedModelKind(kind));
        }
        self.ensure_model(kind)?;

        let model = self
            .models
            .get(&kind)
            .ok_or(ForecastError::ModelNotTrained(kind))?;
        let importance = model
            .importance()
            .ok_or(ForecastError::UnsupportedModelKind(kind))?;

        let mut ranked: Vec<FeatureImportance> = self
            .feature_columns
            .iter()
            .zip(importance)
            .map(|(feature, value)| FeatureImportance {
                feature: feature.clone(),
                importance: metrics::round_to(*value, 4),
            })
            .collect();
        ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        ranked.truncate(TOP_FEATURES);
        Ok(ranked)
    }

    /// Loads the requested kind from the store when it is not resident.
    fn ensure_model(&mut self, kind: ModelKind) -> Result<(), ForecastError> {
        if self.models.contains_key(&kind) {
            return Ok(());
        }

        let Some(blob) = self.store.get_model(&self.bin_id, kind)? else {
            return Err(ForecastError::ModelNotTrained(kind));
        };
        let model = FittedModel::decode(&blob)?;
        if model.kind() != kind {
            return Err(ForecastError::ModelNotTrained(kind));
        }

        // the stored column list must accompany the model, otherwise the
        // prediction vector cannot be shaped
        let Some(columns) = self.store.get_feature_columns(&self.bin_id)? else {
            return Err(ForecastError::ModelNotTrained(kind));
        };
        self.feature_columns = columns;
        self.models.insert(kind, model);
        info!(bin_id = %self.bin_id, model = %kind, "loaded model from store");
        Ok(())
    }
}

/// Splits the feature table into (feature columns, row-major matrix, target),
/// excluding the target column and the timestamp axis from the features.
fn design_matrix(table: &FeatureTable) -> (Vec<String>, Vec<Vec<f64>>, Vec<f64>) {
    let feature_columns: Vec<String> = table
        .column_names()
        .into_iter()
        .filter(|name| *name != TARGET_COLUMN)
        .map(str::to_string)
        .collect();

    let rows: Vec<Vec<f64>> = (0..table.num_rows())
        .map(|row| {
            feature_columns
                .iter()
                .map(|column| table.value(row, column).unwrap_or(0.0))
                .collect()
        })
        .collect();
    let target = table
        .column(TARGET_COLUMN)
        .map(|v| v.to_vec())
        .unwrap_or_default();

    (feature_columns, rows, target)
}

#[cfg(feature = "arima")]
fn forecast_time_series(
    model: &arima::ArimaModel,
    hours_ahead: u32,
    current_time: OffsetDateTime,
) -> Vec<HourlyPrediction> {
    model
        .forecast(hours_ahead as usize)
        .into_iter()
        .enumerate()
        .map(|(i, level)| HourlyPrediction {
            timestamp: current_time + Duration::hours(i as i64 + 1),
            predicted_fill_level: metrics::round_to(level.clamp(0.0, 100.0), 2),
        })
        .collect()
}

/// First 1-indexed hour whose prediction is at or above 100%, if any.
fn first_full_hour(hourly: &[HourlyPrediction]) -> (Option<u32>, Option<OffsetDateTime>) {
    for (i, prediction) in hourly.iter().enumerate() {
        if prediction.predicted_fill_level >= 100.0 {
            return (Some(i as u32 + 1), Some(prediction.timestamp));
        }
    }
    (None, None)
}

fn set_value(row: &mut [(String, f64)], name: &str, value: f64) {
    if let Some(slot) = row.iter_mut().find(|(n, _)| n == name) {
        slot.1 = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn hourly(levels: &[f64]) -> Vec<HourlyPrediction> {
        levels
            .iter()
            .enumerate()
            .map(|(i, &level)| HourlyPrediction {
                timestamp: datetime!(2024-03-01 00:00 UTC) + Duration::hours(i as i64 + 1),
                predicted_fill_level: level,
            })
            .collect()
    }

    #[test]
    fn first_full_hour_is_one_indexed() {
        let (hours, ts) = first_full_hour(&hourly(&[80.0, 95.0, 100.0, 100.0]));

        assert_eq!(hours, Some(3));
        assert_eq!(ts, Some(datetime!(2024-03-01 03:00 UTC)));
    }

    #[test]
    fn first_full_hour_is_none_below_capacity() {
        let (hours, ts) = first_full_hour(&hourly(&[80.0, 90.0, 99.99]));

        assert_eq!(hours, None);
        assert_eq!(ts, None);
    }

    #[test]
    fn design_matrix_excludes_target() {
        let table = FeatureTable::from_columns(
            vec![datetime!(2024-03-01 00:00 UTC)],
            vec![
                (TARGET_COLUMN.to_string(), vec![42.0]),
                ("hour".to_string(), vec![6.0]),
            ],
        );

        let (columns, rows, target) = design_matrix(&table);

        assert_eq!(columns, vec!["hour".to_string()]);
        assert_eq!(rows, vec![vec![6.0]]);
        assert_eq!(target, vec![42.0]);
    }
}
