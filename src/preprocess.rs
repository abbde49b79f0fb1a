//! Cleaning of raw bin readings into a regularized numeric table.
//!
//! The cleaning pass never fails: insufficient input simply yields a smaller
//! (possibly empty) table, and callers are expected to check emptiness.

use crate::config::ForecastSettings;
use crate::table::FeatureTable;
use crate::types::Reading;
use tracing::debug;

pub const TARGET_COLUMN: &str = "fill_level_percent";

/// Numeric reading channels, in the column order the pipeline uses.
pub const NUMERIC_COLUMNS: [&str; 4] = [
    TARGET_COLUMN,
    "weight_kg",
    "temperature_c",
    "battery_percent",
];

const MIN_ROWS_FOR_OUTLIER_REMOVAL: usize = 4;

#[derive(Debug, Clone)]
pub struct Preprocessor {
    forward_fill_limit: usize,
    iqr_multiplier: f64,
    smoothing_window: usize,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::from_settings(&ForecastSettings::default())
    }
}

impl Preprocessor {
    pub fn from_settings(settings: &ForecastSettings) -> Self {
        Self {
            forward_fill_limit: settings.forward_fill_limit,
            iqr_multiplier: settings.iqr_multiplier,
            smoothing_window: settings.smoothing_window,
        }
    }

    /// Cleans raw readings into a sorted, gap-filled, outlier-free and
    /// smoothed table keyed by timestamp.
    pub fn clean(&self, readings: &[Reading]) -> FeatureTable {
        let mut table = collate(readings);
        if table.is_empty() {
            return table;
        }

        table.sort_by_timestamp();
        self.handle_missing_values(&mut table);
        self.remove_outliers(&mut table);
        self.smooth_target(&mut table);

        debug!(
            input_rows = readings.len(),
            cleaned_rows = table.num_rows(),
            "cleaned reading table"
        );
        table
    }

    /// Forward-fill short gaps, linearly interpolate the rest in both
    /// directions, then drop any row that is still incomplete.
    fn handle_missing_values(&self, table: &mut FeatureTable) {
        for name in NUMERIC_COLUMNS {
            if let Some(values) = table.column(name) {
                let mut values = values.to_vec();
                forward_fill(&mut values, self.forward_fill_limit);
                interpolate_both_directions(&mut values);
                table.set_column(name, values);
            }
        }
        table.drop_incomplete_rows();
    }

    /// IQR-based outlier removal on the fill level only. Exact 0 and 100 are
    /// sensor saturation values and are never treated as outliers. Skipped
    /// when too few rows remain for meaningful quartiles.
    fn remove_outliers(&self, table: &mut FeatureTable) {
        if table.num_rows() < MIN_ROWS_FOR_OUTLIER_REMOVAL {
            return;
        }
        let Some(values) = table.column(TARGET_COLUMN) else {
            return;
        };

        let q1 = quantile(values, 0.25);
        let q3 = quantile(values, 0.75);
        let iqr = q3 - q1;
        let lower = q1 - self.iqr_multiplier * iqr;
        let upper = q3 + self.iqr_multiplier * iqr;

        let keep: Vec<bool> = values
            .iter()
            .map(|&v| (v >= lower && v <= upper) || v == 0.0 || v == 100.0)
            .collect();
        table.retain_rows(&keep);
    }

    /// Centered moving average over the fill level. Edges use partial
    /// windows, so the row count never changes.
    fn smooth_target(&self, table: &mut FeatureTable) {
        let n = table.num_rows();
        if n < self.smoothing_window {
            return;
        }
        let Some(values) = table.column(TARGET_COLUMN) else {
            return;
        };

        let half_before = (self.smoothing_window - 1) / 2;
        let half_after = self.smoothing_window / 2;
        let smoothed: Vec<f64> = (0..n)
            .map(|i| {
                let start = i.saturating_sub(half_before);
                let end = (i + half_after + 1).min(n);
                let window = &values[start..end];
                window.iter().sum::<f64>() / window.len() as f64
            })
            .collect();
        table.set_column(TARGET_COLUMN, smoothed);
    }
}

fn collate(readings: &[Reading]) -> FeatureTable {
    if readings.is_empty() {
        return FeatureTable::new();
    }

    let timestamps = readings.iter().map(|r| r.timestamp).collect();
    let opt = |v: Option<f64>| v.unwrap_or(f64::NAN);
    let columns = vec![
        (
            TARGET_COLUMN.to_string(),
            readings.iter().map(|r| r.fill_level_percent).collect(),
        ),
        (
            "weight_kg".to_string(),
            readings.iter().map(|r| opt(r.weight_kg)).collect(),
        ),
        (
            "temperature_c".to_string(),
            readings.iter().map(|r| opt(r.temperature_c)).collect(),
        ),
        (
            "battery_percent".to_string(),
            readings.iter().map(|r| opt(r.battery_percent)).collect(),
        ),
    ];
    FeatureTable::from_columns(timestamps, columns)
}

/// Fills each missing value from the last observed one, but only across runs
/// of at most `limit` consecutive gaps.
fn forward_fill(values: &mut [f64], limit: usize) {
    let mut last_valid: Option<f64> = None;
    let mut run = 0usize;
    for value in values.iter_mut() {
        if value.is_nan() {
            run += 1;
            if run <= limit {
                if let Some(fill) = last_valid {
                    *value = fill;
                    last_valid = Some(fill);
                }
            }
        } else {
            last_valid = Some(*value);
            run = 0;
        }
    }
}

/// Linear interpolation of interior gaps; leading and trailing gaps take the
/// nearest observed value. A column with no observed value is left untouched.
fn interpolate_both_directions(values: &mut [f64]) {
    let Some(first) = values.iter().position(|v| !v.is_nan()) else {
        return;
    };
    let last = values
        .iter()
        .rposition(|v| !v.is_nan())
        .unwrap_or(first);

    let head = values[first];
    for value in &mut values[..first] {
        *value = head;
    }
    let tail = values[last];
    for value in &mut values[last + 1..] {
        *value = tail;
    }

    let mut i = first;
    while i < last {
        if !values[i + 1].is_nan() {
            i += 1;
            continue;
        }
        // gap runs from i+1 up to the next observed index j
        let mut j = i + 1;
        while values[j].is_nan() {
            j += 1;
        }
        let span = (j - i) as f64;
        let step = (values[j] - values[i]) / span;
        let base = values[i];
        for offset in 1..(j - i) {
            values[i + offset] = base + step * offset as f64;
        }
        i = j;
    }
}

/// Linear-interpolated quantile over unsorted data, ranking at `q * (n - 1)`.
fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use time::macros::datetime;

    fn reading(hour: i64, fill: f64) -> Reading {
        full_reading(hour, fill, Some(12.0), Some(25.0), Some(90.0))
    }

    fn full_reading(
        hour: i64,
        fill: f64,
        weight_kg: Option<f64>,
        temperature_c: Option<f64>,
        battery_percent: Option<f64>,
    ) -> Reading {
        Reading {
            timestamp: datetime!(2024-03-01 00:00 UTC) + time::Duration::hours(hour),
            fill_level_percent: fill,
            weight_kg,
            temperature_c,
            battery_percent,
        }
    }

    #[test]
    fn empty_input_yields_empty_table() {
        let table = Preprocessor::default().clean(&[]);
        assert!(table.is_empty());
    }

    #[test]
    fn readings_are_sorted_by_timestamp() {
        let readings = vec![reading(2, 30.0), reading(0, 10.0), reading(1, 20.0)];

        let table = Preprocessor::default().clean(&readings);

        let ts: Vec<OffsetDateTime> = table.timestamps().to_vec();
        assert!(ts.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn short_gaps_are_forward_filled() {
        let mut values = vec![1.0, f64::NAN, f64::NAN, f64::NAN, 5.0];

        forward_fill(&mut values, 2);

        assert_eq!(values[1], 1.0);
        assert_eq!(values[2], 1.0);
        assert!(values[3].is_nan());
    }

    #[test]
    fn interpolation_fills_interior_and_edges() {
        let mut values = vec![f64::NAN, 2.0, f64::NAN, 4.0, f64::NAN];

        interpolate_both_directions(&mut values);

        assert_eq!(values, vec![2.0, 2.0, 3.0, 4.0, 4.0]);
    }

    #[test]
    fn all_missing_column_drops_every_row() {
        let readings: Vec<Reading> = (0..5)
            .map(|h| full_reading(h, 10.0 + h as f64, None, Some(25.0), Some(90.0)))
            .collect();

        let table = Preprocessor::default().clean(&readings);

        assert!(table.is_empty());
    }

    #[test]
    fn outliers_are_removed_but_boundaries_survive() {
        let mut readings: Vec<Reading> = (0..20).map(|h| reading(h, 50.0)).collect();
        readings.push(reading(20, 0.0));
        readings.push(reading(21, 100.0));

        // constant level: IQR is 0, so anything off 50 is an outlier unless
        // it sits exactly at a boundary
        let preprocessor = Preprocessor {
            smoothing_window: usize::MAX, // isolate outlier behavior
            ..Preprocessor::default()
        };
        let table = preprocessor.clean(&readings);
        let fill = table.column(TARGET_COLUMN).unwrap();

        assert_eq!(table.num_rows(), 22);
        assert!(fill.contains(&0.0));
        assert!(fill.contains(&100.0));
    }

    #[test]
    fn far_outlier_is_dropped() {
        let mut readings: Vec<Reading> = (0..10).map(|h| reading(h, 40.0 + h as f64)).collect();
        readings.push(reading(10, 99.0));

        let table = Preprocessor::default().clean(&readings);

        assert_eq!(table.num_rows(), 10);
    }

    #[test]
    fn smoothing_preserves_row_count() {
        let readings: Vec<Reading> = (0..10).map(|h| reading(h, (h * 10) as f64)).collect();

        let table = Preprocessor::default().clean(&readings);

        assert_eq!(table.num_rows(), 10);
    }

    #[test]
    fn smoothing_averages_centered_window() {
        let readings = vec![reading(0, 0.0), reading(1, 30.0), reading(2, 60.0)];

        let preprocessor = Preprocessor {
            iqr_multiplier: f64::INFINITY,
            ..Preprocessor::default()
        };
        let table = preprocessor.clean(&readings);
        let fill = table.column(TARGET_COLUMN).unwrap();

        assert_eq!(fill, &[15.0, 30.0, 45.0]);
    }

    #[test]
    fn cleaning_is_idempotent_on_already_clean_data() {
        // constant data with no gaps is a fixed point of every cleaning step
        let readings: Vec<Reading> = (0..12).map(|h| reading(h, 50.0)).collect();
        let preprocessor = Preprocessor::default();

        let once = preprocessor.clean(&readings);

        let recycled: Vec<Reading> = (0..once.num_rows())
            .map(|i| Reading {
                timestamp: once.timestamp(i),
                fill_level_percent: once.value(i, TARGET_COLUMN).unwrap(),
                weight_kg: once.value(i, "weight_kg"),
                temperature_c: once.value(i, "temperature_c"),
                battery_percent: once.value(i, "battery_percent"),
            })
            .collect();
        let twice = preprocessor.clean(&recycled);

        assert_eq!(once, twice);
    }

    #[test]
    fn quantile_interpolates_linearly() {
        let values = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&values, 0.25), 1.75);
        assert_eq!(quantile(&values, 0.75), 3.25);
        assert_eq!(quantile(&values, 0.0), 1.0);
        assert_eq!(quantile(&values, 1.0), 4.0);
    }
}
