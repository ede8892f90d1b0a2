//! Resumable per-day rollups from a Prometheus-compatible query endpoint.
//!
//! One invocation is one run: for each configured metric, the engine plans
//! the day windows still pending since the metric's progress marker, fetches
//! raw samples per window, reduces them to the requested statistics, and
//! emits one JSON record per (window, aggregation) while advancing the
//! marker in a durable state file.

pub mod client;
pub mod config;
pub mod engine;
pub mod processor;
pub mod record;
pub mod reduce;
pub mod sink;
pub mod state;
pub mod window;
