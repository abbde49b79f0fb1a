//! Feature engineering over the cleaned reading table.
//!
//! Transformations are pure and composable in a fixed order: time, lag,
//! rolling, rate, bin metadata. Each is a no-op when its source column is
//! absent or the table is empty, so partial tables flow through unchanged.

use crate::config::ForecastSettings;
use crate::preprocess::TARGET_COLUMN;
use crate::table::FeatureTable;
use crate::types::{BinInfo, BinType};
use std::f64::consts::TAU;
use time::OffsetDateTime;

#[derive(Debug, Clone)]
pub struct FeatureEngineer {
    lags: Vec<usize>,
    rolling_windows: Vec<usize>,
}

impl Default for FeatureEngineer {
    fn default() -> Self {
        Self::from_settings(&ForecastSettings::default())
    }
}

impl FeatureEngineer {
    pub fn from_settings(settings: &ForecastSettings) -> Self {
        Self {
            lags: settings.lags.clone(),
            rolling_windows: settings.rolling_windows.clone(),
        }
    }

    /// Runs the full chain in the fixed order. Rows left incomplete by
    /// lagging are dropped inside the lag step; the forecaster drops the
    /// remainder after the rate step.
    pub fn engineer(&self, table: &mut FeatureTable, bin: &BinInfo) {
        self.add_time_features(table);
        self.add_lag_features(table);
        self.add_rolling_features(table);
        self.add_rate_features(table);
        self.add_bin_metadata(table, bin);
    }

    /// Calendar features plus cyclical sin/cos pairs. The cyclical encoding
    /// keeps hour 23 and hour 0 adjacent instead of 23 apart.
    pub fn add_time_features(&self, table: &mut FeatureTable) {
        if table.is_empty() {
            return;
        }
        let rows: Vec<[(&'static str, f64); 9]> = table
            .timestamps()
            .iter()
            .map(|&ts| time_feature_values(ts))
            .collect();
        for (i, (name, _)) in time_feature_values(table.timestamp(0)).iter().enumerate() {
            let values: Vec<f64> = rows.iter().map(|row| row[i].1).collect();
            table.set_column(name, values);
        }
    }

    /// One column per configured lag holding the target value that many rows
    /// earlier. Rows without enough history are dropped here.
    pub fn add_lag_features(&self, table: &mut FeatureTable) {
        if table.is_empty() || !table.has_column(TARGET_COLUMN) {
            return;
        }
        let target = table.column(TARGET_COLUMN).unwrap_or_default().to_vec();
        for &lag in &self.lags {
            let values: Vec<f64> = (0..target.len())
                .map(|i| {
                    if i >= lag {
                        target[i - lag]
                    } else {
                        f64::NAN
                    }
                })
                .collect();
            table.set_column(&format!("{TARGET_COLUMN}_lag_{lag}"), values);
        }
        table.drop_incomplete_rows();
    }

    /// Rolling mean and standard deviation of the target, minimum period 1.
    /// A window is only materialized when the table has at least that many
    /// rows.
    pub fn add_rolling_features(&self, table: &mut FeatureTable) {
        if table.is_empty() || !table.has_column(TARGET_COLUMN) {
            return;
        }
        let target = table.column(TARGET_COLUMN).unwrap_or_default().to_vec();
        for &window in &self.rolling_windows {
            if target.len() < window {
                continue;
            }
            let means: Vec<f64> = (0..target.len())
                .map(|i| {
                    let start = (i + 1).saturating_sub(window);
                    mean(&target[start..=i])
                })
                .collect();
            let stds: Vec<f64> = (0..target.len())
                .map(|i| {
                    let start = (i + 1).saturating_sub(window);
                    sample_std(&target[start..=i])
                })
                .collect();
            table.set_column(&format!("{TARGET_COLUMN}_rolling_mean_{window}"), means);
            table.set_column(&format!("{TARGET_COLUMN}_rolling_std_{window}"), stds);
        }
    }

    /// Elapsed hours, target delta and fill rate per row. The first row has
    /// no predecessor; its elapsed/delta stay missing and get dropped by the
    /// final incomplete-row sweep. Non-finite rates map to 0.
    pub fn add_rate_features(&self, table: &mut FeatureTable) {
        if table.num_rows() < 2 || !table.has_column(TARGET_COLUMN) {
            return;
        }
        let target = table.column(TARGET_COLUMN).unwrap_or_default().to_vec();
        let timestamps = table.timestamps().to_vec();
        let n = timestamps.len();

        let mut elapsed = vec![f64::NAN; n];
        let mut delta = vec![f64::NAN; n];
        let mut rate = vec![0.0; n];
        for i in 1..n {
            elapsed[i] = (timestamps[i] - timestamps[i - 1]).as_seconds_f64() / 3600.0;
            delta[i] = target[i] - target[i - 1];
            let r = delta[i] / elapsed[i];
            rate[i] = if r.is_finite() { r } else { 0.0 };
        }

        table.set_column("time_diff_hours", elapsed);
        table.set_column("fill_change", delta);
        table.set_column("fill_rate", rate);
    }

    /// Static bin descriptors as constant columns: one-hot bin type, literal
    /// capacity and ward when present, and a fixed zone code.
    pub fn add_bin_metadata(&self, table: &mut FeatureTable, bin: &BinInfo) {
        let n = table.num_rows();
        for (name, value) in metadata_feature_values(bin) {
            table.set_column(&name, vec![value; n]);
        }
    }
}

/// Time features for a single timestamp, in pipeline column order. Shared
/// between table engineering and the prediction rollout, which recomputes
/// these fresh per future hour.
pub fn time_feature_values(ts: OffsetDateTime) -> [(&'static str, f64); 9] {
    let hour = ts.hour() as f64;
    let day_of_week = ts.weekday().number_days_from_monday() as f64;
    [
        ("hour", hour),
        ("day_of_week", day_of_week),
        ("is_weekend", if day_of_week >= 5.0 { 1.0 } else { 0.0 }),
        ("day_of_month", ts.day() as f64),
        ("month", u8::from(ts.month()) as f64),
        ("hour_sin", (TAU * hour / 24.0).sin()),
        ("hour_cos", (TAU * hour / 24.0).cos()),
        ("day_sin", (TAU * day_of_week / 7.0).sin()),
        ("day_cos", (TAU * day_of_week / 7.0).cos()),
    ]
}

/// Metadata features for one bin, in pipeline column order.
pub fn metadata_feature_values(bin: &BinInfo) -> Vec<(String, f64)> {
    let (residential, commercial, public) = match bin.bin_type {
        BinType::Residential => (1.0, 0.0, 0.0),
        BinType::Commercial => (0.0, 1.0, 0.0),
        BinType::PublicSpace => (0.0, 0.0, 1.0),
    };
    let mut features = vec![
        ("bin_type_residential".to_string(), residential),
        ("bin_type_commercial".to_string(), commercial),
        ("bin_type_public".to_string(), public),
    ];
    if let Some(capacity) = bin.capacity_liters {
        features.push(("capacity_liters".to_string(), capacity));
    }
    if let Some(ward) = bin.ward {
        features.push(("ward".to_string(), ward));
    }
    features.push(("zone_encoded".to_string(), zone_code(&bin.zone)));
    features
}

fn zone_code(zone: &str) -> f64 {
    match zone {
        "North" => 1.0,
        "South" => 2.0,
        "East" => 3.0,
        "West" => 4.0,
        "Central" => 5.0,
        _ => 0.0,
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator); 0 when undefined.
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}
