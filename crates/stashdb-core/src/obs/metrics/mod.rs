use serde::{Deserialize, Serialize};
use std::{
    cell::RefCell,
    cmp::Ordering,
    collections::BTreeMap,
    time::{SystemTime, UNIX_EPOCH},
};

///
/// EventState
/// Ephemeral, in-memory counters for staging, commit, delete and query.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub types: BTreeMap<String, TypeCounters>,
    pub since_ms: u64,
}

impl Default for EventState {
    fn default() -> Self {
        Self {
            ops: EventOps::default(),
            types: BTreeMap::new(),
            since_ms: now_millis(),
        }
    }
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    // Staging
    pub stage_calls: u64,
    pub ids_allocated: u64,

    // Commit
    pub commits: u64,
    pub rows_written: u64,
    pub unique_writes: u64,

    // Delete
    pub delete_calls: u64,
    pub rows_deleted: u64,

    // Query plans
    pub plan_primary_key: u64,
    pub plan_unique: u64,
    pub plan_intersect: u64,
    pub plan_all: u64,
    pub rows_loaded: u64,

    // Index maintenance
    pub index_adds: u64,
    pub index_removes: u64,
}

///
/// TypeCounters
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TypeCounters {
    pub stage_calls: u64,
    pub ids_allocated: u64,
    pub commits: u64,
    pub rows_written: u64,
    pub delete_calls: u64,
    pub rows_deleted: u64,
    pub query_calls: u64,
    pub rows_loaded: u64,
    pub index_adds: u64,
    pub index_removes: u64,
}

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&m.borrow()))
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&mut m.borrow_mut()))
}

/// Reset all counters and restart the window.
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

///
/// EventReport
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    /// Ephemeral runtime counters since `since_ms`.
    pub counters: Option<EventState>,
    /// Per-type counters and averages.
    pub type_counters: Vec<TypeSummary>,
}

///
/// TypeSummary
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TypeSummary {
    pub type_name: String,
    pub commits: u64,
    pub rows_written: u64,
    pub delete_calls: u64,
    pub rows_deleted: u64,
    pub query_calls: u64,
    pub rows_loaded: u64,
    pub avg_rows_per_commit: f64,
    pub avg_rows_per_query: f64,
    pub index_adds: u64,
    pub index_removes: u64,
}

#[expect(clippy::cast_precision_loss)]
fn average(total: u64, calls: u64) -> f64 {
    if calls > 0 {
        total as f64 / calls as f64
    } else {
        0.0
    }
}

/// Build a metrics report from in-memory counters.
#[must_use]
pub(crate) fn report() -> EventReport {
    let snap = with_state(Clone::clone);

    let mut type_counters = snap
        .types
        .iter()
        .map(|(name, c)| TypeSummary {
            type_name: name.clone(),
            commits: c.commits,
            rows_written: c.rows_written,
            delete_calls: c.delete_calls,
            rows_deleted: c.rows_deleted,
            query_calls: c.query_calls,
            rows_loaded: c.rows_loaded,
            avg_rows_per_commit: average(c.rows_written, c.commits),
            avg_rows_per_query: average(c.rows_loaded, c.query_calls),
            index_adds: c.index_adds,
            index_removes: c.index_removes,
        })
        .collect::<Vec<_>>();

    // Heaviest readers first, then by name.
    type_counters.sort_by(|a, b| {
        match b
            .avg_rows_per_query
            .partial_cmp(&a.avg_rows_per_query)
            .unwrap_or(Ordering::Equal)
        {
            Ordering::Equal => a.type_name.cmp(&b.type_name),
            other => other,
        }
    });

    EventReport {
        counters: Some(snap),
        type_counters,
    }
}

/// Build a report only if the current window started at or after
/// `window_start_ms`; an older window yields an empty report.
#[must_use]
pub(crate) fn report_window_start(window_start_ms: Option<u64>) -> EventReport {
    let since = with_state(|m| m.since_ms);
    match window_start_ms {
        Some(start) if since < start => EventReport::default(),
        _ => report(),
    }
}

///
/// TESTS
///
