//! Aggregates over sealed profiles plus the JSON/SSE surface the dashboard
//! reads them from.

pub mod api;
pub mod collector;
pub mod percentiles;

pub use collector::{StatsCollector, StatsSnapshot};
pub use percentiles::LatencySummary;
