//! Hotel revenue core: feature encoding, revenue prediction and KPI aggregation
//!
//! Serves two in-process functions over historical hotel bookings:
//! point-in-time revenue prediction for a single hypothetical booking, and
//! KPI aggregation (revenue, lead time, daily rate, cancellation rate) over
//! arbitrarily filtered subsets of the dataset.
//!
//! Modules:
//! - `schema`: Field definitions and the fixed feature layout
//! - `record`: Raw booking records as supplied by the UI or a dataset row
//! - `encoder`: Record → feature vector, reproducing the training-time mapping
//! - `gbdt`: Fixed-point gradient-boosted tree ensemble and model handle
//! - `prediction`: Validate → encode → infer pipeline
//! - `dataset`: Immutable CSV-backed booking snapshot
//! - `aggregation`: Filter specs, KPI summaries and breakdowns
//! - `config`: TOML configuration with environment overrides
//! - `context`: One-time startup wiring of shared state

pub mod aggregation;
pub mod config;
pub mod context;
pub mod dataset;
pub mod encoder;
pub mod errors;
pub mod fixed;
pub mod gbdt;
pub mod prediction;
pub mod record;
pub mod schema;
pub mod serde_canon;

pub use aggregation::{
    AggregationEngine, BookingStatus, FieldPredicate, FilterSpec, FilteredView, GroupSummary,
    KpiResult, MetricFields, MonthSummary, MonthlyValue, Predicate,
};
pub use config::{DatasetSource, RevenueConfig};
pub use context::RevenueContext;
pub use dataset::Dataset;
pub use encoder::{FeatureEncoder, FeatureVector};
pub use errors::{
    ConfigurationError, DatasetError, FieldError, ModelError, PredictionError, Result,
    RevenueError, Stage, ValidationErrors,
};
pub use fixed::{Fixed, SCALE};
pub use gbdt::{Model, ModelHandle, ModelInfo};
pub use prediction::{PredictionResult, PredictionService};
pub use record::{BookingRecord, RawValue};
pub use schema::{
    ColumnSpec, ColumnTransform, DatePart, FeatureColumn, FeatureLayout, FieldDomain, FieldKind,
    FieldSpec, Schema,
};

/// Crate version string for model-info and logs
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Encode one record against a schema, relative to today's date
pub fn encode(
    record: &BookingRecord,
    schema: &Schema,
) -> std::result::Result<FeatureVector, ValidationErrors> {
    FeatureEncoder::new(schema).encode(record)
}
