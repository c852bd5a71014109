//! Lightweight in-process metrics (dependency-free).
//!
//! Counters and gauges are atomics behind label-keyed maps, rendered in
//! Prometheus text format by the `/metrics` handler. No external metrics
//! crate is pulled in.

pub mod metrics;
