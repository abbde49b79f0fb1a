//! Greedy collection-route planning over bins that need service.

use crate::config::RouteSettings;
use crate::forecaster::metrics::round_to;
use crate::types::BinType;
use serde::{Deserialize, Serialize};
use tracing::info;

const EARTH_RADIUS_KM: f64 = 6371.0088;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Bin candidate for a collection route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteBin {
    pub bin_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub bin_type: BinType,
    pub zone: String,
    pub fill_level_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStop {
    /// 1-based visit order.
    pub sequence: usize,
    pub bin_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub bin_type: BinType,
    pub zone: String,
    pub fill_level_percent: f64,
    /// Distance travelled from the previous stop (the depot for stop 1).
    pub distance_from_previous_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub stops: Vec<RouteStop>,
    pub bin_ids: Vec<String>,
    pub total_distance_km: f64,
    pub estimated_duration_minutes: f64,
}

/// Plans routes with nearest-neighbor ordering from a fixed depot.
pub struct RouteOptimizer {
    depot: GeoPoint,
    average_speed_kmh: f64,
    service_minutes_per_bin: f64,
}

impl RouteOptimizer {
    pub fn new(settings: &RouteSettings) -> Self {
        Self {
            depot: GeoPoint {
                latitude: settings.depot_latitude,
                longitude: settings.depot_longitude,
            },
            average_speed_kmh: settings.average_speed_kmh,
            service_minutes_per_bin: settings.service_minutes_per_bin,
        }
    }

    /// Orders the bins by repeatedly visiting the nearest unvisited one,
    /// starting from the depot, and closes the loop back to the depot.
    pub fn plan(&self, bins: &[RouteBin]) -> RoutePlan {
        if bins.is_empty() {
            return RoutePlan {
                stops: Vec::new(),
                bin_ids: Vec::new(),
                total_distance_km: 0.0,
                estimated_duration_minutes: 0.0,
            };
        }

        let mut remaining: Vec<&RouteBin> = bins.iter().collect();
        let mut stops = Vec::with_capacity(bins.len());
        let mut position = self.depot;
        let mut total_km = 0.0;

        while !remaining.is_empty() {
            let (index, leg_km) = remaining
                .iter()
                .enumerate()
                .map(|(i, bin)| {
                    let here = GeoPoint {
                        latitude: bin.latitude,
                        longitude: bin.longitude,
                    };
                    (i, haversine_km(position, here))
                })
                .min_by(|(_, a), (_, b)| a.total_cmp(b))
                .unwrap_or((0, 0.0));

            let bin = remaining.swap_remove(index);
            total_km += leg_km;
            position = GeoPoint {
                latitude: bin.latitude,
                longitude: bin.longitude,
            };
            stops.push(RouteStop {
                sequence: stops.len() + 1,
                bin_id: bin.bin_id.clone(),
                latitude: bin.latitude,
                longitude: bin.longitude,
                bin_type: bin.bin_type,
                zone: bin.zone.clone(),
                fill_level_percent: bin.fill_level_percent,
                distance_from_previous_km: round_to(leg_km, 2),
            });
        }

        // return leg to the depot
        total_km += haversine_km(position, self.depot);

        let duration = total_km / self.average_speed_kmh * 60.0
            + self.service_minutes_per_bin * stops.len() as f64;
        info!(
            stops = stops.len(),
            distance_km = round_to(total_km, 2),
            "planned collection route"
        );

        RoutePlan {
            bin_ids: stops.iter().map(|s| s.bin_id.clone()).collect(),
            stops,
            total_distance_km: round_to(total_km, 2),
            estimated_duration_minutes: round_to(duration, 2),
        }
    }
}

/// Bins at or above the given fill threshold, in input order.
pub fn bins_above_threshold(bins: &[RouteBin], threshold_percent: f64) -> Vec<RouteBin> {
    bins.iter()
        .filter(|bin| bin.fill_level_percent >= threshold_percent)
        .cloned()
        .collect()
}

/// Great-circle distance in kilometers.
pub fn haversine_km(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let dlat = (to.latitude - from.latitude).to_radians();
    let dlon = (to.longitude - from.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteSettings;

    fn bin(id: &str, latitude: f64, longitude: f64, fill: f64) -> RouteBin {
        RouteBin {
            bin_id: id.to_string(),
            latitude,
            longitude,
            bin_type: BinType::Residential,
            zone: "North".to_string(),
            fill_level_percent: fill,
        }
    }

    fn optimizer() -> RouteOptimizer {
        RouteOptimizer::new(&RouteSettings::default())
    }

    #[test]
    fn empty_input_yields_empty_plan() {
        let plan = optimizer().plan(&[]);

        assert!(plan.stops.is_empty());
        assert!(plan.bin_ids.is_empty());
        assert_eq!(plan.total_distance_km, 0.0);
        assert_eq!(plan.estimated_duration_minutes, 0.0);
    }

    #[test]
    fn visits_nearest_bin_first() {
        // three bins north of the depot at increasing distance
        let bins = vec![
            bin("far", 28.9, 77.2090, 90.0),
            bin("near", 28.7, 77.2090, 85.0),
            bin("mid", 28.8, 77.2090, 95.0),
        ];

        let plan = optimizer().plan(&bins);

        assert_eq!(plan.bin_ids, vec!["near", "mid", "far"]);
        assert_eq!(
            plan.stops.iter().map(|s| s.sequence).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn single_bin_distance_is_out_and_back() {
        let bins = vec![bin("only", 28.7, 77.2090, 90.0)];

        let plan = optimizer().plan(&bins);

        let leg = haversine_km(
            GeoPoint {
                latitude: 28.6139,
                longitude: 77.2090,
            },
            GeoPoint {
                latitude: 28.7,
                longitude: 77.2090,
            },
        );
        assert!((plan.total_distance_km - round_to(leg * 2.0, 2)).abs() < 0.02);
        assert_eq!(plan.stops[0].distance_from_previous_km, round_to(leg, 2));
    }

    #[test]
    fn duration_includes_service_time() {
        let bins = vec![
            bin("a", 28.7, 77.2090, 90.0),
            bin("b", 28.75, 77.2090, 85.0),
        ];

        let plan = optimizer().plan(&bins);

        let travel = plan.total_distance_km / 30.0 * 60.0;
        assert!((plan.estimated_duration_minutes - round_to(travel + 10.0, 2)).abs() < 0.02);
    }

    #[test]
    fn threshold_filter_keeps_input_order() {
        let bins = vec![
            bin("a", 28.7, 77.2, 80.0),
            bin("b", 28.8, 77.2, 79.9),
            bin("c", 28.9, 77.2, 100.0),
        ];

        let ready = bins_above_threshold(&bins, 80.0);

        let ids: Vec<&str> = ready.iter().map(|b| b.bin_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn haversine_known_distance() {
        // Delhi to Mumbai, roughly 1150 km
        let delhi = GeoPoint {
            latitude: 28.6139,
            longitude: 77.2090,
        };
        let mumbai = GeoPoint {
            latitude: 19.0760,
            longitude: 72.8777,
        };

        let km = haversine_km(delhi, mumbai);

        assert!(km > 1100.0 && km < 1200.0);
    }

    #[test]
    fn haversine_zero_for_same_point() {
        let p = GeoPoint {
            latitude: 28.6139,
            longitude: 77.2090,
        };

        assert_eq!(haversine_km(p, p), 0.0);
    }
}
