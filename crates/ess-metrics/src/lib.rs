//! Anonymous usage statistics for Essentials.
//!
//! A [`MetricsReporter`] decides at startup whether it may run, then
//! periodically asks a [`ServerStats`] view for counts, groups them into
//! graphs and submits the report to a [`MetricsSink`]. Storage caches can be
//! registered as [`Gauge`]s to report how many holders are open.

pub mod collector;
pub mod config;
pub mod error;
pub mod graph;
pub mod reporter;
pub mod sink;
pub mod stats;

pub use collector::{Collector, FnGauge, Gauge};
pub use config::MetricsConfig;
pub use error::{MetricsError, MetricsResult};
pub use graph::{Graph, MetricsReport, Plotter};
pub use reporter::{MetricsReporter, ReporterHandle, StartDecision};
pub use sink::{LogSink, MemorySink, MetricsSink};
pub use stats::{EconomyInfo, EconomyKind, FeatureSettings, Module, ServerStats};
