use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::AggregationKind;
use crate::window::TimeWindow;

/// One emitted rollup value for a (metric, window, aggregation) triple.
///
/// Immutable once constructed; handed to the sink and never touched again.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord {
    /// Output stream identifier, `"{metric}_{aggregation}"`.
    pub stream: String,

    pub metric: String,
    pub aggregation: AggregationKind,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub value: f64,
}

impl OutputRecord {
    /// Build a record for one aggregation over one window.
    pub fn new(metric: &str, kind: AggregationKind, window: TimeWindow, value: f64) -> Self {
        Self {
            stream: stream_name(metric, kind),
            metric: metric.to_string(),
            aggregation: kind,
            period_start: window.start,
            period_end: window.end,
            value,
        }
    }
}

/// Stream identifier for a (metric, aggregation) pair.
pub fn stream_name(metric: &str, kind: AggregationKind) -> String {
    format!("{metric}_{}", kind.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_name() {
        assert_eq!(stream_name("online_peak", AggregationKind::Max), "online_peak_max");
        assert_eq!(stream_name("latency", AggregationKind::Avg), "latency_avg");
    }

    #[test]
    fn test_record_serializes_rfc3339_bounds() {
        let window = TimeWindow {
            start: "2018-11-01T00:00:00Z".parse().expect("valid timestamp"),
            end: "2018-11-02T00:00:00Z".parse().expect("valid timestamp"),
        };
        let record = OutputRecord::new("online_peak", AggregationKind::Max, window, 21.5);

        let json = serde_json::to_value(&record).expect("record serializes");
        assert_eq!(json["stream"], "online_peak_max");
        assert_eq!(json["metric"], "online_peak");
        assert_eq!(json["aggregation"], "max");
        assert_eq!(json["period_start"], "2018-11-01T00:00:00Z");
        assert_eq!(json["period_end"], "2018-11-02T00:00:00Z");
        assert_eq!(json["value"], 21.5);
    }
}
