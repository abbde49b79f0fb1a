use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/fillcast.toml";

pub const DEFAULT_LAGS: [usize; 5] = [1, 2, 3, 6, 12];
pub const DEFAULT_ROLLING_WINDOWS: [usize; 3] = [6, 12, 24];
pub const DEFAULT_SMOOTHING_WINDOW: usize = 3;
pub const DEFAULT_FORWARD_FILL_LIMIT: usize = 2;
pub const DEFAULT_IQR_MULTIPLIER: f64 = 3.0;
pub const DEFAULT_MIN_TRAINING_ROWS: usize = 10;
pub const DEFAULT_MIN_TRAIN_PARTITION: usize = 5;
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
pub const DEFAULT_ARIMA_MIN_POINTS: usize = 20;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub forecast: ForecastSettings,
    #[serde(default)]
    pub route: RouteSettings,
    #[serde(default)]
    pub store: StoreSettings,
}

/// Knobs for the cleaning and feature-engineering pipeline.
///
/// Lags and rolling windows are expressed in rows, not hours: the sampling
/// cadence is whatever survived cleaning.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ForecastSettings {
    pub lags: Vec<usize>,
    pub rolling_windows: Vec<usize>,
    pub smoothing_window: usize,
    pub forward_fill_limit: usize,
    pub iqr_multiplier: f64,
    pub min_training_rows: usize,
    pub min_train_partition: usize,
    pub test_fraction: f64,
    pub arima_min_points: usize,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            lags: DEFAULT_LAGS.to_vec(),
            rolling_windows: DEFAULT_ROLLING_WINDOWS.to_vec(),
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
            forward_fill_limit: DEFAULT_FORWARD_FILL_LIMIT,
            iqr_multiplier: DEFAULT_IQR_MULTIPLIER,
            min_training_rows: DEFAULT_MIN_TRAINING_ROWS,
            min_train_partition: DEFAULT_MIN_TRAIN_PARTITION,
            test_fraction: DEFAULT_TEST_FRACTION,
            arima_min_points: DEFAULT_ARIMA_MIN_POINTS,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RouteSettings {
    pub average_speed_kmh: f64,
    pub service_minutes_per_bin: f64,
    pub depot_latitude: f64,
    pub depot_longitude: f64,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            average_speed_kmh: 30.0,
            service_minutes_per_bin: 5.0,
            depot_latitude: 28.6139,
            depot_longitude: 77.2090,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StoreSettings {
    /// Directory where trained model blobs are kept.
    pub model_dir: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("trained_models"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let settings = ForecastSettings::default();

        assert_eq!(settings.lags, vec![1, 2, 3, 6, 12]);
        assert_eq!(settings.rolling_windows, vec![6, 12, 24]);
        assert_eq!(settings.smoothing_window, 3);
        assert_eq!(settings.min_training_rows, 10);
        assert_eq!(settings.test_fraction, 0.2);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            [forecast]
            lags = [1, 2, 3]

            [route]
            average_speed_kmh = 40.0
            "#,
        )
        .unwrap();

        assert_eq!(config.forecast.lags, vec![1, 2, 3]);
        assert_eq!(config.forecast.smoothing_window, 3);
        assert_eq!(config.route.average_speed_kmh, 40.0);
        assert_eq!(config.route.service_minutes_per_bin, 5.0);
        assert_eq!(config.store.model_dir, PathBuf::from("trained_models"));
    }

    #[test]
    fn empty_toml_yields_full_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.forecast, ForecastSettings::default());
        assert_eq!(config.route, RouteSettings::default());
    }
}
