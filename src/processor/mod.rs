//! Per-metric processing: plan windows, fetch, reduce, emit, advance.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::client::{FetchError, RangeQueryClient};
use crate::config::MetricConfig;
use crate::record::OutputRecord;
use crate::reduce::reduce;
use crate::window::plan;

/// Result of one metric's run.
#[derive(Debug)]
pub struct ProcessOutcome {
    /// Records for every completed window, in window order.
    pub records: Vec<OutputRecord>,

    /// End of the last fully processed window; equals the resume point when
    /// no window completed.
    pub marker: DateTime<Utc>,

    /// Fetch failure that stopped this metric early, if any.
    pub error: Option<FetchError>,
}

/// Process one metric end-to-end for this run.
///
/// Windows are handled strictly in chronological order. The marker advances
/// only after a window's records have been constructed; a fetch failure
/// stops this metric (remaining windows retry next run) without touching
/// the marker for the failed window.
pub async fn process<C: RangeQueryClient>(
    client: &C,
    metric: &MetricConfig,
    resume_point: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ProcessOutcome {
    info!(
        metric = %metric.name,
        query = %metric.query,
        resume = %resume_point.to_rfc3339(),
        "processing metric",
    );

    let mut records = Vec::new();
    let mut marker = resume_point;

    for window in plan(metric.period, resume_point, now) {
        let samples = match client
            .query_range(&metric.query, window, metric.step_duration())
            .await
        {
            Ok(samples) => samples,
            Err(error) => {
                return ProcessOutcome {
                    records,
                    marker,
                    error: Some(error),
                };
            }
        };

        for (kind, value) in reduce(&samples, &metric.aggregations) {
            match value {
                Some(value) => {
                    records.push(OutputRecord::new(&metric.name, kind, window, value));
                }
                None => {
                    debug!(
                        metric = %metric.name,
                        aggregation = kind.as_str(),
                        %window,
                        "no samples in window, skipping",
                    );
                }
            }
        }

        marker = window.end;
    }

    ProcessOutcome {
        records,
        marker,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::client::Sample;
    use crate::config::{AggregationKind, Period};
    use crate::window::TimeWindow;

    use super::*;

    /// Scripted client: per-window canned samples, or a failure at one window.
    struct ScriptedClient {
        samples: BTreeMap<DateTime<Utc>, Vec<f64>>,
        fail_at: Option<DateTime<Utc>>,
        calls: Mutex<Vec<DateTime<Utc>>>,
    }

    impl ScriptedClient {
        fn new(samples: BTreeMap<DateTime<Utc>, Vec<f64>>) -> Self {
            Self {
                samples,
                fail_at: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing_at(mut self, start: DateTime<Utc>) -> Self {
            self.fail_at = Some(start);
            self
        }

        fn calls(&self) -> Vec<DateTime<Utc>> {
            self.calls.lock().expect("lock").clone()
        }
    }

    impl RangeQueryClient for ScriptedClient {
        async fn query_range(
            &self,
            query: &str,
            window: TimeWindow,
            step: Duration,
        ) -> Result<Vec<Sample>, FetchError> {
            self.calls.lock().expect("lock").push(window.start);

            if self.fail_at == Some(window.start) {
                return Err(FetchError::Rejected {
                    query: query.to_string(),
                    window,
                    message: "scripted failure".to_string(),
                });
            }

            let values = self.samples.get(&window.start).cloned().unwrap_or_default();
            Ok(values
                .into_iter()
                .enumerate()
                .map(|(i, value)| Sample {
                    timestamp: window.start + chrono::Duration::from_std(step).expect("step fits")
                        * i as i32,
                    value: Some(value),
                })
                .collect())
        }
    }

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().expect("valid timestamp")
    }

    fn metric(kinds: Vec<AggregationKind>) -> MetricConfig {
        MetricConfig {
            name: "online_peak".to_string(),
            query: "sum(sessions_online)".to_string(),
            aggregations: kinds,
            period: Period::Day,
            step: 120,
        }
    }

    #[tokio::test]
    async fn test_processes_all_pending_windows() {
        let samples = BTreeMap::from([
            (ts("2018-11-01T00:00:00Z"), vec![10.0, 30.0, 20.0]),
            (ts("2018-11-02T00:00:00Z"), vec![5.0, 15.0]),
        ]);
        let client = ScriptedClient::new(samples);

        let outcome = process(
            &client,
            &metric(vec![AggregationKind::Max]),
            ts("2018-11-01T00:00:00Z"),
            ts("2018-11-03T00:00:00Z"),
        )
        .await;

        assert!(outcome.error.is_none());
        assert_eq!(outcome.marker, ts("2018-11-03T00:00:00Z"));
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].value, 30.0);
        assert_eq!(outcome.records[0].period_start, ts("2018-11-01T00:00:00Z"));
        assert_eq!(outcome.records[1].value, 15.0);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_at_failed_window() {
        let samples = BTreeMap::from([
            (ts("2018-11-01T00:00:00Z"), vec![1.0]),
            (ts("2018-11-02T00:00:00Z"), vec![2.0]),
            (ts("2018-11-03T00:00:00Z"), vec![3.0]),
            (ts("2018-11-04T00:00:00Z"), vec![4.0]),
            (ts("2018-11-05T00:00:00Z"), vec![5.0]),
        ]);
        let client =
            ScriptedClient::new(samples).failing_at(ts("2018-11-02T00:00:00Z"));

        let outcome = process(
            &client,
            &metric(vec![AggregationKind::Max]),
            ts("2018-11-01T00:00:00Z"),
            ts("2018-11-06T00:00:00Z"),
        )
        .await;

        // Window 1 emitted, marker past window 1 only, windows 3-5 untouched.
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].value, 1.0);
        assert_eq!(outcome.marker, ts("2018-11-02T00:00:00Z"));
        assert!(outcome.error.is_some());
        assert_eq!(
            client.calls(),
            vec![ts("2018-11-01T00:00:00Z"), ts("2018-11-02T00:00:00Z")],
        );
    }

    #[tokio::test]
    async fn test_empty_window_advances_without_records() {
        let samples = BTreeMap::from([(ts("2018-11-02T00:00:00Z"), vec![7.0])]);
        let client = ScriptedClient::new(samples);

        let outcome = process(
            &client,
            &metric(vec![AggregationKind::Max, AggregationKind::Avg]),
            ts("2018-11-01T00:00:00Z"),
            ts("2018-11-03T00:00:00Z"),
        )
        .await;

        // Day 1 has no samples: no records, but the window still completes.
        assert!(outcome.error.is_none());
        assert_eq!(outcome.records.len(), 2);
        for record in &outcome.records {
            assert_eq!(record.period_start, ts("2018-11-02T00:00:00Z"));
        }
        assert_eq!(outcome.marker, ts("2018-11-03T00:00:00Z"));
    }

    #[tokio::test]
    async fn test_nothing_pending_keeps_marker() {
        let client = ScriptedClient::new(BTreeMap::new());

        let outcome = process(
            &client,
            &metric(vec![AggregationKind::Max]),
            ts("2018-11-03T00:00:00Z"),
            ts("2018-11-03T00:00:00Z"),
        )
        .await;

        assert!(outcome.records.is_empty());
        assert!(outcome.error.is_none());
        assert_eq!(outcome.marker, ts("2018-11-03T00:00:00Z"));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_reruns_are_idempotent() {
        let samples = BTreeMap::from([
            (ts("2018-11-01T00:00:00Z"), vec![10.0, 30.0]),
            (ts("2018-11-02T00:00:00Z"), vec![20.0]),
        ]);
        let client = ScriptedClient::new(samples);
        let m = metric(vec![AggregationKind::Max, AggregationKind::Avg]);
        let resume = ts("2018-11-01T00:00:00Z");
        let now = ts("2018-11-03T00:00:00Z");

        let first = process(&client, &m, resume, now).await;
        let second = process(&client, &m, resume, now).await;

        assert_eq!(first.records, second.records);
        assert_eq!(first.marker, second.marker);
    }
}
