//! Metrics sink boundary.
//!
//! Execution code never touches `obs::metrics` directly; every counter
//! update flows through a `MetricsEvent` and the active `MetricsSink`.

use crate::obs::metrics;
use std::{cell::RefCell, sync::Arc, time::Instant};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Arc<dyn MetricsSink>>> = RefCell::new(None);
}

///
/// ExecKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecKind {
    Load,
    Find,
    Count,
    Insert,
    Update,
    Delete,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent {
    ExecStart {
        kind: ExecKind,
        entity_path: &'static str,
    },
    ExecFinish {
        kind: ExecKind,
        entity_path: &'static str,
        rows_touched: u64,
        micros: u64,
    },
    StatementExecuted {
        entity_path: &'static str,
    },
    TransientRetry {
        entity_path: &'static str,
    },
    DuplicateKey {
        entity_path: &'static str,
    },
    CacheLookup {
        hit: bool,
    },
    CacheStore,
    CacheRemove,
    CacheFailure,
}

///
/// MetricsSink
///

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricsEvent);
}

/// GlobalMetricsSink
/// Default sink writing into the process-global counters.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent) {
        match event {
            MetricsEvent::ExecStart { kind, entity_path } => {
                metrics::with_state_mut(|m| {
                    let ops = &mut m.ops;
                    let counter = match kind {
                        ExecKind::Load => &mut ops.load_calls,
                        ExecKind::Find => &mut ops.find_calls,
                        ExecKind::Count => &mut ops.count_calls,
                        ExecKind::Insert => &mut ops.insert_calls,
                        ExecKind::Update => &mut ops.update_calls,
                        ExecKind::Delete => &mut ops.delete_calls,
                    };
                    *counter = counter.saturating_add(1);

                    let entry = m.entities.entry(entity_path.to_string()).or_default();
                    let counter = match kind {
                        ExecKind::Load => &mut entry.load_calls,
                        ExecKind::Find | ExecKind::Count => &mut entry.find_calls,
                        ExecKind::Insert | ExecKind::Update | ExecKind::Delete => {
                            &mut entry.write_calls
                        }
                    };
                    *counter = counter.saturating_add(1);
                });
            }

            MetricsEvent::ExecFinish {
                kind,
                entity_path,
                rows_touched,
                micros,
            } => {
                metrics::with_state_mut(|m| {
                    metrics::add_micros(
                        &mut m.ops.exec_micros_total,
                        &mut m.ops.exec_micros_max,
                        micros,
                    );

                    let entry = m.entities.entry(entity_path.to_string()).or_default();
                    match kind {
                        ExecKind::Load | ExecKind::Find => {
                            m.ops.rows_loaded = m.ops.rows_loaded.saturating_add(rows_touched);
                            entry.rows_loaded = entry.rows_loaded.saturating_add(rows_touched);
                        }
                        ExecKind::Insert | ExecKind::Update | ExecKind::Delete => {
                            m.ops.rows_written = m.ops.rows_written.saturating_add(rows_touched);
                            entry.rows_written = entry.rows_written.saturating_add(rows_touched);
                        }
                        ExecKind::Count => {}
                    }
                });
            }

            MetricsEvent::StatementExecuted { entity_path } => {
                metrics::with_state_mut(|m| {
                    m.ops.statements = m.ops.statements.saturating_add(1);
                    let entry = m.entities.entry(entity_path.to_string()).or_default();
                    entry.statements = entry.statements.saturating_add(1);
                });
            }

            MetricsEvent::TransientRetry { entity_path } => {
                metrics::with_state_mut(|m| {
                    m.ops.transient_retries = m.ops.transient_retries.saturating_add(1);
                    let entry = m.entities.entry(entity_path.to_string()).or_default();
                    entry.transient_retries = entry.transient_retries.saturating_add(1);
                });
            }

            MetricsEvent::DuplicateKey { entity_path } => {
                metrics::with_state_mut(|m| {
                    m.ops.duplicate_keys = m.ops.duplicate_keys.saturating_add(1);
                    let entry = m.entities.entry(entity_path.to_string()).or_default();
                    entry.duplicate_keys = entry.duplicate_keys.saturating_add(1);
                });
            }

            MetricsEvent::CacheLookup { hit } => metrics::with_state_mut(|m| {
                if hit {
                    m.ops.cache_hits = m.ops.cache_hits.saturating_add(1);
                } else {
                    m.ops.cache_misses = m.ops.cache_misses.saturating_add(1);
                }
            }),

            MetricsEvent::CacheStore => metrics::with_state_mut(|m| {
                m.ops.cache_stores = m.ops.cache_stores.saturating_add(1);
            }),

            MetricsEvent::CacheRemove => metrics::with_state_mut(|m| {
                m.ops.cache_removes = m.ops.cache_removes.saturating_add(1);
            }),

            MetricsEvent::CacheFailure => metrics::with_state_mut(|m| {
                m.ops.cache_failures = m.ops.cache_failures.saturating_add(1);
            }),
        }
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent) {
    let override_sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());
    match override_sink {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot the current metrics state.
///
/// `window_start_ms` filters by window start (`EventState::since_ms`),
/// not by per-event timestamps.
#[must_use]
pub fn metrics_report(window_start_ms: Option<u64>) -> metrics::EventReport {
    metrics::report_window_start(window_start_ms)
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary, thread-scoped metrics sink override.
pub fn with_metrics_sink<T>(sink: Arc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Arc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let prev = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = prev;
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}

///
/// Span
/// RAII guard that emits start/finish events for one executor call.
/// Finish accounting happens even on unwind.
///

pub(crate) struct Span {
    kind: ExecKind,
    entity_path: &'static str,
    start: Instant,
    rows: u64,
}

impl Span {
    #[must_use]
    pub(crate) fn new(kind: ExecKind, entity_path: &'static str) -> Self {
        record(MetricsEvent::ExecStart { kind, entity_path });

        Self {
            kind,
            entity_path,
            start: Instant::now(),
            rows: 0,
        }
    }

    pub(crate) const fn set_rows(&mut self, rows: u64) {
        self.rows = rows;
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        let micros = u64::try_from(self.start.elapsed().as_micros()).unwrap_or(u64::MAX);

        record(MetricsEvent::ExecFinish {
            kind: self.kind,
            entity_path: self.entity_path,
            rows_touched: self.rows,
            micros,
        });
    }
}
