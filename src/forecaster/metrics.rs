//! Evaluation metrics for fitted models.

use serde::{Deserialize, Serialize};

/// Absolute tolerance (in fill-level points) for the accuracy metric.
pub const ACCURACY_TOLERANCE: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub rmse: f64,
    pub mae: f64,
    pub r2_score: f64,
    /// Percentage of predictions within [`ACCURACY_TOLERANCE`] of truth.
    pub accuracy_5pct: f64,
}

/// Per-kind training outcome: a fit failure for one kind does not abort the
/// sibling kinds, it becomes an error entry in the summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrainOutcome {
    Metrics(ModelMetrics),
    Failed { error: String },
}

impl TrainOutcome {
    pub fn metrics(&self) -> Option<&ModelMetrics> {
        match self {
            TrainOutcome::Metrics(m) => Some(m),
            TrainOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TrainOutcome::Failed { .. })
    }
}

/// Scores predictions against truth. Predictions are clipped to the physical
/// [0, 100] fill-level range before scoring.
pub fn evaluate(y_true: &[f64], y_pred: &[f64]) -> ModelMetrics {
    debug_assert_eq!(y_true.len(), y_pred.len());
    let n = y_true.len() as f64;
    let clipped: Vec<f64> = y_pred.iter().map(|p| p.clamp(0.0, 100.0)).collect();

    let mse = y_true
        .iter()
        .zip(&clipped)
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / n;
    let mae = y_true
        .iter()
        .zip(&clipped)
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / n;

    let mean_true = y_true.iter().sum::<f64>() / n;
    let ss_res = y_true
        .iter()
        .zip(&clipped)
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>();
    let ss_tot = y_true.iter().map(|t| (t - mean_true).powi(2)).sum::<f64>();
    let r2 = if ss_tot == 0.0 {
        if ss_res == 0.0 { 1.0 } else { 0.0 }
    } else {
        1.0 - ss_res / ss_tot
    };

    let within = y_true
        .iter()
        .zip(&clipped)
        .filter(|(t, p)| (*t - **p).abs() <= ACCURACY_TOLERANCE)
        .count() as f64;

    ModelMetrics {
        rmse: round_to(mse.sqrt(), 2),
        mae: round_to(mae, 2),
        r2_score: round_to(r2, 4),
        accuracy_5pct: round_to(within / n * 100.0, 2),
    }
}

pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions_score_perfectly() {
        let y = [10.0, 20.0, 30.0, 40.0];

        let metrics = evaluate(&y, &y);

        assert_eq!(metrics.rmse, 0.0);
        assert_eq!(metrics.mae, 0.0);
        assert_eq!(metrics.r2_score, 1.0);
        assert_eq!(metrics.accuracy_5pct, 100.0);
    }

    #[test]
    fn predictions_are_clipped_before_scoring() {
        let y_true = [100.0, 0.0];
        let y_pred = [130.0, -20.0];

        let metrics = evaluate(&y_true, &y_pred);

        // clipped to [100, 0]: exact after clipping
        assert_eq!(metrics.rmse, 0.0);
        assert_eq!(metrics.accuracy_5pct, 100.0);
    }

    #[test]
    fn constant_truth_with_errors_scores_zero_r2() {
        let y_true = [50.0, 50.0, 50.0];
        let y_pred = [40.0, 50.0, 60.0];

        let metrics = evaluate(&y_true, &y_pred);

        assert_eq!(metrics.r2_score, 0.0);
    }

    #[test]
    fn accuracy_counts_tolerance_inclusive() {
        let y_true = [50.0, 50.0, 50.0, 50.0];
        let y_pred = [55.0, 45.0, 56.0, 50.0];

        let metrics = evaluate(&y_true, &y_pred);

        assert_eq!(metrics.accuracy_5pct, 75.0);
    }

    #[test]
    fn rounding_uses_fixed_decimal_places() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(1.23456, 4), 1.2346);
        assert_eq!(round_to(-0.005, 2), -0.01);
    }

    #[test]
    fn outcome_serializes_like_metrics_or_error_map() {
        let ok = TrainOutcome::Metrics(ModelMetrics {
            rmse: 1.0,
            mae: 0.5,
            r2_score: 0.99,
            accuracy_5pct: 100.0,
        });
        let failed = TrainOutcome::Failed {
            error: "insufficient data".to_string(),
        };

        assert!(serde_json::to_string(&ok).unwrap().contains("\"rmse\":1.0"));
        assert_eq!(
            serde_json::to_string(&failed).unwrap(),
            "{\"error\":\"insufficient data\"}"
        );
    }
}
