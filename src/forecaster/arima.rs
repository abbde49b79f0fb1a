//! ARIMA(2,1,2) backend for the time-series model kind.
//!
//! Coefficient estimation is delegated to the `arima` crate; residual
//! bookkeeping and the forecast recursion are done here so the fitted model
//! can forecast without re-touching the estimator. The fitted model lives in
//! memory only — it is never persisted to the store.

use crate::config::ForecastSettings;
use crate::error::ForecastError;
use crate::forecaster::metrics::{self, ModelMetrics};
use tracing::debug;

/// Autoregressive order, differencing order, moving-average order.
pub const ARIMA_ORDER: (usize, usize, usize) = (2, 1, 2);

/// Fitted ARIMA model state: estimated coefficients plus the tail of the
/// differenced training series and its residuals, which seed the forecast
/// recursion.
#[derive(Debug, Clone)]
pub struct ArimaModel {
    intercept: f64,
    phi: Vec<f64>,
    theta: Vec<f64>,
    /// Most recent differenced values, oldest first.
    z_tail: Vec<f64>,
    /// Most recent residuals, oldest first.
    e_tail: Vec<f64>,
    /// Last level of the training series, the base for integration.
    last_level: f64,
}

/// Fits ARIMA(2,1,2) on the cleaned target series using an internal 80/20
/// temporal split, returning the model fitted on the training partition and
/// its held-out metrics.
pub fn fit(
    series: &[f64],
    settings: &ForecastSettings,
) -> Result<(ArimaModel, ModelMetrics), ForecastError> {
    if series.len() < settings.arima_min_points {
        return Err(ForecastError::InsufficientData(
            "insufficient data for ARIMA".to_string(),
        ));
    }

    let train_size = (series.len() as f64 * (1.0 - settings.test_fraction)) as usize;
    let (train, test) = series.split_at(train_size);

    let model = fit_train_partition(train)?;
    let forecast: Vec<f64> = model
        .forecast(test.len())
        .into_iter()
        .map(|v| v.clamp(0.0, 100.0))
        .collect();
    let metrics = metrics::evaluate(test, &forecast);

    debug!(
        train_points = train.len(),
        test_points = test.len(),
        rmse = metrics.rmse,
        "fitted ARIMA model"
    );
    Ok((model, metrics))
}

fn fit_train_partition(train: &[f64]) -> Result<ArimaModel, ForecastError> {
    let (p, d, q) = ARIMA_ORDER;
    let coef = ::arima::estimate::fit(train, p, d, q)
        .map_err(|e| ForecastError::Fit(format!("ARIMA estimation failed: {e:?}")))?;
    if coef.len() < 1 + p + q {
        return Err(ForecastError::Fit(format!(
            "ARIMA estimation returned {} coefficients, expected {}",
            coef.len(),
            1 + p + q
        )));
    }

    let intercept = coef[0];
    let phi = coef[1..1 + p].to_vec();
    let theta = coef[1 + p..1 + p + q].to_vec();

    // first-order differencing (d = 1)
    let z: Vec<f64> = train.windows(2).map(|w| w[1] - w[0]).collect();
    let residuals = arma_residuals(&z, intercept, &phi, &theta);

    let z_tail = tail(&z, p);
    let e_tail = tail(&residuals, q);
    Ok(ArimaModel {
        intercept,
        phi,
        theta,
        z_tail,
        e_tail,
        last_level: *train.last().unwrap_or(&0.0),
    })
}

impl ArimaModel {
    /// Forecasts `steps` future levels by running the ARMA recursion on the
    /// differenced series with future shocks at zero, then integrating back
    /// from the last observed level. Unclipped; callers apply the [0, 100]
    /// bound.
    pub fn forecast(&self, steps: usize) -> Vec<f64> {
        let mut z = self.z_tail.clone();
        let mut e = self.e_tail.clone();
        let mut level = self.last_level;
        let mut out = Vec::with_capacity(steps);

        for _ in 0..steps {
            let mut next = self.intercept;
            for (i, coef) in self.phi.iter().enumerate() {
                if let Some(past) = z.len().checked_sub(i + 1).and_then(|idx| z.get(idx)) {
                    next += coef * past;
                }
            }
            for (i, coef) in self.theta.iter().enumerate() {
                if let Some(shock) = e.len().checked_sub(i + 1).and_then(|idx| e.get(idx)) {
                    next += coef * shock;
                }
            }
            z.push(next);
            e.push(0.0);
            level += next;
            out.push(level);
        }
        out
    }
}

/// One-pass ARMA residual recursion with out-of-range history terms at zero.
fn arma_residuals(z: &[f64], intercept: f64, phi: &[f64], theta: &[f64]) -> Vec<f64> {
    let mut residuals = Vec::with_capacity(z.len());
    for t in 0..z.len() {
        let mut expected = intercept;
        for (i, coef) in phi.iter().enumerate() {
            if t > i {
                expected += coef * z[t - i - 1];
            }
        }
        for (i, coef) in theta.iter().enumerate() {
            if t > i {
                expected += coef * residuals[t - i - 1];
            }
        }
        residuals.push(z[t] - expected);
    }
    residuals
}

fn tail(values: &[f64], n: usize) -> Vec<f64> {
    values[values.len().saturating_sub(n)..].to_vec()
}
