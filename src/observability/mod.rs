//! Routing counters and the optional per-decision JSONL trace.

pub mod decision_trace;
pub mod metrics;

pub use decision_trace::record_decision;
pub use metrics::RouterMetrics;
