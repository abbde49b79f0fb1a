//! Fill-level forecasting and collection-route planning for smart waste bins.
//!
//! The pipeline runs per bin: raw sensor [`types::Reading`]s are cleaned by
//! [`preprocess::Preprocessor`], expanded into a feature table by
//! [`features::FeatureEngineer`], and fed to a [`forecaster::Forecaster`]
//! that trains, persists, and serves several model kinds. Trained models are
//! compared with [`compare::compare_models`], and bins predicted to need
//! service are sequenced by [`route::RouteOptimizer`].

pub mod compare;
pub mod config;
pub mod error;
pub mod features;
pub mod forecaster;
pub mod preprocess;
pub mod route;
pub mod store;
pub mod table;
pub mod types;

pub use compare::{compare_models, ComparisonResult};
pub use config::{Config, ForecastSettings, RouteSettings};
pub use error::{ForecastError, StoreError};
pub use forecaster::{Forecaster, TrainingSummary};
pub use route::{RouteBin, RouteOptimizer, RoutePlan};
pub use store::{FsModelStore, MemoryModelStore, ModelStore};
pub use types::{BinInfo, BinType, ModelKind, PredictionResult, Reading};
