//! Observability: runtime telemetry (metrics) and sink abstractions.
//!
//! This module does not talk to the store. Engine code reports through
//! [`sink::record`]; structured logs go through `tracing` at the call site.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{EventOps, EventReport, EventState, TypeCounters, TypeSummary};
pub use sink::{MetricsEvent, MetricsSink, PlanKind, metrics_report, metrics_reset_all};
