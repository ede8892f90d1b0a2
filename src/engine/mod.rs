//! Run-scoped orchestration across all configured metrics.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::client::RangeQueryClient;
use crate::config::MetricConfig;
use crate::processor;
use crate::sink::RecordSink;
use crate::state::StateStore;

/// Per-run totals, logged at end of run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Records emitted per output stream.
    pub stream_counts: BTreeMap<String, usize>,

    /// Metrics that stopped early on a fetch failure this run.
    pub failed_metrics: Vec<String>,
}

/// Drives every metric through the processor and hands results off.
pub struct Engine<'a, C, S> {
    client: &'a C,
    sink: &'a mut S,
    state: &'a mut StateStore,
    start_date: DateTime<Utc>,
}

impl<'a, C: RangeQueryClient, S: RecordSink> Engine<'a, C, S> {
    pub fn new(
        client: &'a C,
        sink: &'a mut S,
        state: &'a mut StateStore,
        start_date: DateTime<Utc>,
    ) -> Self {
        Self {
            client,
            sink,
            state,
            start_date,
        }
    }

    /// Process all metrics for one scheduled execution.
    ///
    /// Metrics run independently and in order; one metric's fetch failure
    /// never aborts the others. Each metric's records are emitted and its
    /// marker persisted before the next metric starts, so a crash mid-run
    /// loses at most the in-flight metric's windows.
    pub async fn run(
        &mut self,
        metrics: &[MetricConfig],
        now: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        for metric in metrics {
            let resume_point = self.state.marker(&metric.name).unwrap_or(self.start_date);

            let outcome = processor::process(self.client, metric, resume_point, now).await;

            for record in &outcome.records {
                self.sink.emit(record)?;
                *summary.stream_counts.entry(record.stream.clone()).or_insert(0) += 1;
            }

            // Marker persists only after its records have been handed off.
            if outcome.marker > resume_point {
                self.state.set_marker(&metric.name, outcome.marker);
                self.state.save()?;
            }

            if let Some(fetch_error) = outcome.error {
                error!(
                    metric = %metric.name,
                    error = %fetch_error,
                    "metric stopped early; unfinished windows retry next run",
                );
                summary.failed_metrics.push(metric.name.clone());
            }
        }

        info!("------------------");
        for (stream, count) in &summary.stream_counts {
            info!(stream = %stream, records = *count, "emitted");
        }
        if !summary.failed_metrics.is_empty() {
            info!(failed = ?summary.failed_metrics, "metrics with fetch failures");
        }
        info!("------------------");

        Ok(summary)
    }
}
