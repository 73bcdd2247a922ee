//! Component C: durable time-series store with online percentile queries.

pub mod percentile;
pub mod store;

pub use percentile::linear_interpolated_percentile;
pub use store::{require_independent_mount, Metric, MetricsStore};
