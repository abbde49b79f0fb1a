//! Closed-form trend extrapolation for bins without enough history for the
//! full model pipeline.
//!
//! Fits a least-squares line over (hours since first reading, fill level)
//! and extrapolates. With fewer than two points there is no trend: the last
//! observed level is returned as both current and predicted.

use crate::error::ForecastError;
use crate::forecaster::metrics::round_to;
use crate::types::Reading;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPrediction {
    pub bin_id: String,
    pub current_fill_level: f64,
    pub predicted_fill_level: f64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub predicted_full_time: Option<OffsetDateTime>,
    /// Fractional hours until the trend line reaches 100%, when rising.
    pub hours_until_full: Option<f64>,
}

pub fn predict_fill_level(
    bin_id: &str,
    readings: &[Reading],
    hours_ahead: u32,
) -> Result<TrendPrediction, ForecastError> {
    if readings.is_empty() {
        return Err(ForecastError::InsufficientData(
            "no readings for trend prediction".to_string(),
        ));
    }

    let mut points: Vec<(OffsetDateTime, f64)> = readings
        .iter()
        .map(|r| (r.timestamp, r.fill_level_percent))
        .collect();
    points.sort_by_key(|(ts, _)| *ts);

    let current_fill = points[points.len() - 1].1;
    if points.len() < 2 {
        return Ok(TrendPrediction {
            bin_id: bin_id.to_string(),
            current_fill_level: current_fill,
            predicted_fill_level: current_fill,
            predicted_full_time: None,
            hours_until_full: None,
        });
    }

    let first_time = points[0].0;
    let hours: Vec<f64> = points
        .iter()
        .map(|(ts, _)| (*ts - first_time).as_seconds_f64() / 3600.0)
        .collect();
    let levels: Vec<f64> = points.iter().map(|(_, level)| *level).collect();

    let n = hours.len() as f64;
    let x_mean = hours.iter().sum::<f64>() / n;
    let y_mean = levels.iter().sum::<f64>() / n;
    let numerator: f64 = hours
        .iter()
        .zip(&levels)
        .map(|(x, y)| (x - x_mean) * (y - y_mean))
        .sum();
    let denominator: f64 = hours.iter().map(|x| (x - x_mean).powi(2)).sum();
    let slope = if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    };
    let intercept = y_mean - slope * x_mean;

    let future_hour = hours[hours.len() - 1] + hours_ahead as f64;
    let predicted_fill = (slope * future_hour + intercept).clamp(0.0, 100.0);

    let (hours_until_full, predicted_full_time) = if slope > 0.0 && current_fill < 100.0 {
        let hours_left = (100.0 - current_fill) / slope;
        let full_time = points[points.len() - 1].0 + time::Duration::seconds_f64(hours_left * 3600.0);
        (Some(round_to(hours_left, 2)), Some(full_time))
    } else {
        (None, None)
    };

    Ok(TrendPrediction {
        bin_id: bin_id.to_string(),
        current_fill_level: round_to(current_fill, 2),
        predicted_fill_level: round_to(predicted_fill, 2),
        predicted_full_time,
        hours_until_full,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn reading(hour: i64, fill: f64) -> Reading {
        Reading {
            timestamp: datetime!(2024-03-01 00:00 UTC) + time::Duration::hours(hour),
            fill_level_percent: fill,
            weight_kg: None,
            temperature_c: None,
            battery_percent: None,
        }
    }

    #[test]
    fn empty_readings_are_an_error() {
        let result = predict_fill_level("BIN-001", &[], 24);
        assert!(matches!(result, Err(ForecastError::InsufficientData(_))));
    }

    #[test]
    fn single_reading_returns_current_as_prediction() {
        let prediction = predict_fill_level("BIN-001", &[reading(0, 37.5)], 24).unwrap();

        assert_eq!(prediction.current_fill_level, 37.5);
        assert_eq!(prediction.predicted_fill_level, 37.5);
        assert_eq!(prediction.hours_until_full, None);
        assert_eq!(prediction.predicted_full_time, None);
    }

    #[test]
    fn rising_trend_extrapolates_linearly() {
        // 2% per hour from 10%
        let readings: Vec<Reading> = (0..10).map(|h| reading(h, 10.0 + 2.0 * h as f64)).collect();

        let prediction = predict_fill_level("BIN-001", &readings, 10).unwrap();

        assert_eq!(prediction.current_fill_level, 28.0);
        assert!((prediction.predicted_fill_level - 48.0).abs() < 1e-6);
        // (100 - 28) / 2 = 36 hours
        assert_eq!(prediction.hours_until_full, Some(36.0));
        assert_eq!(
            prediction.predicted_full_time,
            Some(datetime!(2024-03-02 21:00 UTC))
        );
    }

    #[test]
    fn prediction_is_clamped_to_physical_range() {
        let readings: Vec<Reading> = (0..5).map(|h| reading(h, 60.0 + 15.0 * h as f64)).collect();

        let prediction = predict_fill_level("BIN-001", &readings, 24).unwrap();

        assert_eq!(prediction.predicted_fill_level, 100.0);
    }

    #[test]
    fn falling_trend_has_no_full_time() {
        let readings: Vec<Reading> = (0..5).map(|h| reading(h, 80.0 - 10.0 * h as f64)).collect();

        let prediction = predict_fill_level("BIN-001", &readings, 6).unwrap();

        assert_eq!(prediction.hours_until_full, None);
        assert_eq!(prediction.predicted_full_time, None);
    }

    #[test]
    fn unsorted_input_is_sorted_before_fitting() {
        let readings = vec![reading(2, 14.0), reading(0, 10.0), reading(1, 12.0)];

        let prediction = predict_fill_level("BIN-001", &readings, 1).unwrap();

        assert_eq!(prediction.current_fill_level, 14.0);
        assert!((prediction.predicted_fill_level - 16.0).abs() < 1e-6);
    }
}
