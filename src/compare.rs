//! Cross-model comparison over a training summary.

use crate::forecaster::metrics::round_to;
use crate::forecaster::TrainingSummary;
use crate::types::ModelKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricBest {
    pub model: ModelKind,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub best_rmse: Option<MetricBest>,
    pub best_mae: Option<MetricBest>,
    pub best_r2: Option<MetricBest>,
    /// Model with the highest combined score, `1 / (rmse + 1) + r2`.
    pub recommended_model: Option<ModelKind>,
    pub all_metrics: TrainingSummary,
}

/// Ranks the successfully trained kinds by each metric and by a combined
/// score. Failed kinds are excluded from ranking but kept in `all_metrics`.
/// Ties resolve to the first kind in summary order.
pub fn compare_models(summary: &TrainingSummary) -> ComparisonResult {
    let mut best_rmse: Option<MetricBest> = None;
    let mut best_mae: Option<MetricBest> = None;
    let mut best_r2: Option<MetricBest> = None;
    let mut recommended: Option<(ModelKind, f64)> = None;

    for (&kind, outcome) in summary {
        let Some(metrics) = outcome.metrics() else {
            continue;
        };

        if best_rmse.as_ref().is_none_or(|b| metrics.rmse < b.value) {
            best_rmse = Some(MetricBest {
                model: kind,
                value: metrics.rmse,
            });
        }
        if best_mae.as_ref().is_none_or(|b| metrics.mae < b.value) {
            best_mae = Some(MetricBest {
                model: kind,
                value: metrics.mae,
            });
        }
        if best_r2.as_ref().is_none_or(|b| metrics.r2_score > b.value) {
            best_r2 = Some(MetricBest {
                model: kind,
                value: metrics.r2_score,
            });
        }

        let score = 1.0 / (metrics.rmse + 1.0) + metrics.r2_score;
        if recommended.is_none_or(|(_, best)| score > best) {
            recommended = Some((kind, score));
        }
    }

    ComparisonResult {
        best_rmse: best_rmse.map(rounded),
        best_mae: best_mae.map(rounded),
        best_r2: best_r2.map(rounded),
        recommended_model: recommended.map(|(kind, _)| kind),
        all_metrics: summary.clone(),
    }
}

fn rounded(best: MetricBest) -> MetricBest {
    MetricBest {
        model: best.model,
        value: round_to(best.value, 4),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecaster::metrics::{ModelMetrics, TrainOutcome};

    fn outcome(rmse: f64, mae: f64, r2: f64) -> TrainOutcome {
        TrainOutcome::Metrics(ModelMetrics {
            rmse,
            mae,
            r2_score: r2,
            accuracy_5pct: 90.0,
        })
    }

    #[test]
    fn picks_best_per_metric() {
        let mut summary = TrainingSummary::new();
        summary.insert(ModelKind::Linear, outcome(5.0, 4.0, 0.80));
        summary.insert(ModelKind::Tree, outcome(3.0, 2.5, 0.92));
        summary.insert(ModelKind::Forest, outcome(4.0, 2.0, 0.88));

        let result = compare_models(&summary);

        assert_eq!(result.best_rmse.unwrap().model, ModelKind::Tree);
        assert_eq!(result.best_mae.unwrap().model, ModelKind::Forest);
        assert_eq!(result.best_r2.unwrap().model, ModelKind::Tree);
        assert_eq!(result.recommended_model, Some(ModelKind::Tree));
    }

    #[test]
    fn skips_failed_kinds() {
        let mut summary = TrainingSummary::new();
        summary.insert(ModelKind::Linear, outcome(5.0, 4.0, 0.80));
        summary.insert(
            ModelKind::Arima,
            TrainOutcome::Failed {
                error: "fit failed".to_string(),
            },
        );

        let result = compare_models(&summary);

        assert_eq!(result.best_rmse.unwrap().model, ModelKind::Linear);
        assert_eq!(result.recommended_model, Some(ModelKind::Linear));
        assert_eq!(result.all_metrics.len(), 2);
    }

    #[test]
    fn all_failed_yields_no_bests() {
        let mut summary = TrainingSummary::new();
        summary.insert(
            ModelKind::Linear,
            TrainOutcome::Failed {
                error: "singular".to_string(),
            },
        );

        let result = compare_models(&summary);

        assert!(result.best_rmse.is_none());
        assert!(result.best_mae.is_none());
        assert!(result.best_r2.is_none());
        assert!(result.recommended_model.is_none());
    }

    #[test]
    fn ties_resolve_to_first_kind() {
        let mut summary = TrainingSummary::new();
        summary.insert(ModelKind::Linear, outcome(3.0, 2.0, 0.9));
        summary.insert(ModelKind::Tree, outcome(3.0, 2.0, 0.9));

        let result = compare_models(&summary);

        assert_eq!(result.best_rmse.unwrap().model, ModelKind::Linear);
        assert_eq!(result.recommended_model, Some(ModelKind::Linear));
    }
}
