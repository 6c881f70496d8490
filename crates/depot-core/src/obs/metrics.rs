use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    sync::{Mutex, PoisonError},
    time::{SystemTime, UNIX_EPOCH},
};

///
/// EventState
/// Ephemeral, in-memory counters shared by every session in the process.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub entities: BTreeMap<String, EntityCounters>,
    pub since_ms: u64,
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventOps {
    // Executor entrypoints
    pub load_calls: u64,
    pub find_calls: u64,
    pub count_calls: u64,
    pub insert_calls: u64,
    pub update_calls: u64,
    pub delete_calls: u64,

    // Database traffic
    pub statements: u64,
    pub rows_loaded: u64,
    pub rows_written: u64,
    pub transient_retries: u64,
    pub duplicate_keys: u64,

    // Cache traffic
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_stores: u64,
    pub cache_removes: u64,
    pub cache_failures: u64,

    // Wall time spent inside executor spans
    pub exec_micros_total: u128,
    pub exec_micros_max: u64,
}

///
/// EntityCounters
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EntityCounters {
    pub load_calls: u64,
    pub find_calls: u64,
    pub write_calls: u64,
    pub statements: u64,
    pub rows_loaded: u64,
    pub rows_written: u64,
    pub transient_retries: u64,
    pub duplicate_keys: u64,
}

static EVENT_STATE: Mutex<Option<EventState>> = Mutex::new(None);

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

fn fresh_state() -> EventState {
    EventState {
        since_ms: now_millis(),
        ..EventState::default()
    }
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    let mut guard = EVENT_STATE.lock().unwrap_or_else(PoisonError::into_inner);
    f(guard.get_or_insert_with(fresh_state))
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    let mut guard = EVENT_STATE.lock().unwrap_or_else(PoisonError::into_inner);
    f(guard.get_or_insert_with(fresh_state))
}

/// Reset all counters.
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = fresh_state());
}

/// Accumulate a span duration and track a max.
pub(crate) fn add_micros(total: &mut u128, max: &mut u64, delta: u64) {
    *total = total.saturating_add(u128::from(delta));
    if delta > *max {
        *max = delta;
    }
}

///
/// EventReport
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    /// Counters since `since_ms`; `None` when the window filter excluded them.
    pub counters: Option<EventOps>,
    pub since_ms: u64,
    /// Per-entity counters and averages.
    pub entity_counters: Vec<EntitySummary>,
}

///
/// EntitySummary
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EntitySummary {
    pub path: String,
    pub load_calls: u64,
    pub find_calls: u64,
    pub write_calls: u64,
    pub statements: u64,
    pub rows_loaded: u64,
    pub rows_written: u64,
    pub avg_rows_per_read: f64,
    pub transient_retries: u64,
    pub duplicate_keys: u64,
}

/// Build a report from in-memory counters.
///
/// `window_start_ms` filters by the state's window start, not per event.
#[must_use]
#[expect(clippy::cast_precision_loss)]
pub(crate) fn report_window_start(window_start_ms: Option<u64>) -> EventReport {
    let snap = with_state(Clone::clone);
    if let Some(start) = window_start_ms
        && start > snap.since_ms
    {
        return EventReport {
            since_ms: snap.since_ms,
            ..EventReport::default()
        };
    }

    let mut entity_counters: Vec<EntitySummary> = snap
        .entities
        .iter()
        .map(|(path, ops)| {
            let reads = ops.load_calls + ops.find_calls;
            let avg_rows_per_read = if reads > 0 {
                ops.rows_loaded as f64 / reads as f64
            } else {
                0.0
            };

            EntitySummary {
                path: path.clone(),
                load_calls: ops.load_calls,
                find_calls: ops.find_calls,
                write_calls: ops.write_calls,
                statements: ops.statements,
                rows_loaded: ops.rows_loaded,
                rows_written: ops.rows_written,
                avg_rows_per_read,
                transient_retries: ops.transient_retries,
                duplicate_keys: ops.duplicate_keys,
            }
        })
        .collect();

    // busiest entities first, path as tiebreaker
    entity_counters.sort_by(|a, b| {
        b.statements
            .cmp(&a.statements)
            .then_with(|| a.path.cmp(&b.path))
    });

    EventReport {
        counters: Some(snap.ops),
        since_ms: snap.since_ms,
        entity_counters,
    }
}
