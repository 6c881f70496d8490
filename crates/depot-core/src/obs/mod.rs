//! Observability: runtime counters and the sink boundary execution code
//! reports through. Structured logs go through `tracing` directly.

pub(crate) mod metrics;
pub(crate) mod sink;


// re-exports
pub use metrics::{EntitySummary, EventOps, EventReport};
pub use sink::{
    ExecKind, MetricsEvent, MetricsSink, metrics_report, metrics_reset_all, with_metrics_sink,
};
