pub mod aggregation;
pub mod checks;
pub mod config;
pub mod error;
pub mod filter_normalizer;
pub mod geo;
pub mod insights;
pub mod llm;
pub mod pipeline;
pub mod query_spec;
pub mod row_source;
pub mod rows;
pub mod spec_validator;
pub mod summary;
pub mod taxonomy;
pub mod time;

pub use aggregation::{aggregate, AggregatedRow, AggregationEngine, MarginPolicy};
pub use checks::{compute_checks, Checks};
pub use config::DashboardConfig;
pub use error::{DashError, Result};
pub use filter_normalizer::normalize;
pub use insights::{build_insights, Insight, InsightKind};
pub use pipeline::{DashboardPipeline, ResultBundle};
pub use query_spec::{
    Dimension, Filter, FilterOp, FilterValue, Grain, Metric, QuerySpec, RawQuerySpec, TimeRange,
};
pub use rows::{DataRow, DerivedRow};
pub use spec_validator::{rule_fallback, validate};
