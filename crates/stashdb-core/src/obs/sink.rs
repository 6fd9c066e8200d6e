//! Metrics sink boundary.
//!
//! Engine code MUST NOT touch obs::metrics directly.
//! All instrumentation flows through MetricsEvent and MetricsSink.
//!
//! This module is the only bridge between the staging/commit/query paths
//! and the thread-local metrics state.
use crate::obs::{EventReport, metrics};
use std::{cell::RefCell, sync::Arc};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Arc<dyn MetricsSink>>> = const { RefCell::new(None) };
}

///
/// PlanKind
///
/// How the query resolver answered a filter.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlanKind {
    PrimaryKey,
    Unique,
    Intersect,
    All,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug)]
pub enum MetricsEvent<'a> {
    Stage {
        type_name: &'a str,
    },
    IdAllocated {
        type_name: &'a str,
    },
    Commit {
        type_name: &'a str,
        objects: u64,
        unique_writes: u64,
        index_adds: u64,
        index_removes: u64,
    },
    Delete {
        type_name: &'a str,
        removed: u64,
        index_removes: u64,
    },
    Query {
        type_name: &'a str,
        plan: PlanKind,
        rows: u64,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricsEvent<'_>);
}

/// GlobalMetricsSink
/// Default sink that writes into the thread-local metrics state.
/// Acts as the concrete sink when no scoped override is installed.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent<'_>) {
        match event {
            MetricsEvent::Stage { type_name } => {
                metrics::with_state_mut(|m| {
                    m.ops.stage_calls = m.ops.stage_calls.saturating_add(1);
                    let entry = m.types.entry(type_name.to_string()).or_default();
                    entry.stage_calls = entry.stage_calls.saturating_add(1);
                });
            }

            MetricsEvent::IdAllocated { type_name } => {
                metrics::with_state_mut(|m| {
                    m.ops.ids_allocated = m.ops.ids_allocated.saturating_add(1);
                    let entry = m.types.entry(type_name.to_string()).or_default();
                    entry.ids_allocated = entry.ids_allocated.saturating_add(1);
                });
            }

            MetricsEvent::Commit {
                type_name,
                objects,
                unique_writes,
                index_adds,
                index_removes,
            } => {
                metrics::with_state_mut(|m| {
                    m.ops.commits = m.ops.commits.saturating_add(1);
                    m.ops.rows_written = m.ops.rows_written.saturating_add(objects);
                    m.ops.unique_writes = m.ops.unique_writes.saturating_add(unique_writes);
                    m.ops.index_adds = m.ops.index_adds.saturating_add(index_adds);
                    m.ops.index_removes = m.ops.index_removes.saturating_add(index_removes);

                    let entry = m.types.entry(type_name.to_string()).or_default();
                    entry.commits = entry.commits.saturating_add(1);
                    entry.rows_written = entry.rows_written.saturating_add(objects);
                    entry.index_adds = entry.index_adds.saturating_add(index_adds);
                    entry.index_removes = entry.index_removes.saturating_add(index_removes);
                });
            }

            MetricsEvent::Delete {
                type_name,
                removed,
                index_removes,
            } => {
                metrics::with_state_mut(|m| {
                    m.ops.delete_calls = m.ops.delete_calls.saturating_add(1);
                    m.ops.rows_deleted = m.ops.rows_deleted.saturating_add(removed);
                    m.ops.index_removes = m.ops.index_removes.saturating_add(index_removes);

                    let entry = m.types.entry(type_name.to_string()).or_default();
                    entry.delete_calls = entry.delete_calls.saturating_add(1);
                    entry.rows_deleted = entry.rows_deleted.saturating_add(removed);
                    entry.index_removes = entry.index_removes.saturating_add(index_removes);
                });
            }

            MetricsEvent::Query {
                type_name,
                plan,
                rows,
            } => {
                metrics::with_state_mut(|m| {
                    match plan {
                        PlanKind::PrimaryKey => {
                            m.ops.plan_primary_key = m.ops.plan_primary_key.saturating_add(1);
                        }
                        PlanKind::Unique => m.ops.plan_unique = m.ops.plan_unique.saturating_add(1),
                        PlanKind::Intersect => {
                            m.ops.plan_intersect = m.ops.plan_intersect.saturating_add(1);
                        }
                        PlanKind::All => m.ops.plan_all = m.ops.plan_all.saturating_add(1),
                    }
                    m.ops.rows_loaded = m.ops.rows_loaded.saturating_add(rows);

                    let entry = m.types.entry(type_name.to_string()).or_default();
                    entry.query_calls = entry.query_calls.saturating_add(1);
                    entry.rows_loaded = entry.rows_loaded.saturating_add(rows);
                });
            }
        }
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent<'_>) {
    let sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());
    match sink {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot the current metrics state for test and reporting plumbing.
///
/// `window_start_ms` filters by window start (`EventState::since_ms`),
/// not by per-event timestamps.
#[must_use]
pub fn metrics_report(window_start_ms: Option<u64>) -> EventReport {
    metrics::report_window_start(window_start_ms)
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override.
pub(crate) fn with_metrics_sink<T>(sink: &Arc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Arc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let prev = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = prev;
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(Arc::clone(sink)));
    let _guard = Guard(prev);

    f()
}

///
/// TESTS
///
