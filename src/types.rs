use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// A single sensor reading for a bin.
///
/// Readings arrive in storage order, not necessarily sorted by timestamp;
/// the preprocessor sorts them. Only the fill level is mandatory, the other
/// channels may be missing on cheaper sensor units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub fill_level_percent: f64,
    pub weight_kg: Option<f64>,
    pub temperature_c: Option<f64>,
    pub battery_percent: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinType {
    Residential,
    Commercial,
    PublicSpace,
}

/// Static bin metadata supplied by the caller per training/prediction call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinInfo {
    pub bin_type: BinType,
    pub capacity_liters: Option<f64>,
    pub zone: String,
    pub ward: Option<f64>,
    pub latitude: f64,
    pub longitude: f64,
}

/// The family of regression models the forecaster can train.
///
/// A closed set: exhaustive matches keep new kinds from being silently
/// unhandled. `Arima` is only functional when the `arima` feature is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Linear,
    Tree,
    Forest,
    Arima,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::Linear,
        ModelKind::Tree,
        ModelKind::Forest,
        ModelKind::Arima,
    ];

    /// Kinds trained when the caller does not ask for a specific set.
    pub const DEFAULT_TRAINING: [ModelKind; 3] =
        [ModelKind::Linear, ModelKind::Tree, ModelKind::Forest];

    pub const fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Linear => "linear",
            ModelKind::Tree => "tree",
            ModelKind::Forest => "forest",
            ModelKind::Arima => "arima",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPrediction {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub predicted_fill_level: f64,
}

/// Result of a multi-step-ahead prediction for a single bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub bin_id: String,
    pub model_kind: ModelKind,
    pub current_fill_level: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub current_time: OffsetDateTime,
    pub predicted_fill_level: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub prediction_time: OffsetDateTime,
    /// 1-indexed hour of the first prediction at or above 100%, if any.
    pub hours_until_full: Option<u32>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub predicted_full_time: Option<OffsetDateTime>,
    pub hourly_predictions: Vec<HourlyPrediction>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn model_kind_serializes_lowercase() {
        let json = serde_json::to_string(&ModelKind::Forest).unwrap();
        assert_eq!(json, "\"forest\"");

        let kind: ModelKind = serde_json::from_str("\"arima\"").unwrap();
        assert_eq!(kind, ModelKind::Arima);
    }

    #[test]
    fn bin_type_uses_snake_case() {
        let json = serde_json::to_string(&BinType::PublicSpace).unwrap();
        assert_eq!(json, "\"public_space\"");
    }

    #[test]
    fn prediction_result_timestamps_are_rfc3339() {
        let result = PredictionResult {
            bin_id: "BIN-001".to_string(),
            model_kind: ModelKind::Linear,
            current_fill_level: 42.0,
            current_time: datetime!(2024-03-01 06:00 UTC),
            predicted_fill_level: 55.5,
            prediction_time: datetime!(2024-03-02 06:00 UTC),
            hours_until_full: None,
            predicted_full_time: None,
            hourly_predictions: vec![],
        };

        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"current_time\":\"2024-03-01T06:00:00Z\""));
    }
}
