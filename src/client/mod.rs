//! Range-query client for Prometheus-compatible endpoints.
//!
//! One `/api/v1/query_range` request per (metric, window). The endpoint
//! treats the time range as inclusive at both boundaries, so samples at
//! `window.end` are dropped client-side to keep windows half-open.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::window::TimeWindow;

/// One raw data point. `value` is `None` for an explicit "no data" sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
}

/// Errors from fetching one window's samples.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("requesting {query:?} for {window}: {source}")]
    Transport {
        query: String,
        window: TimeWindow,
        source: reqwest::Error,
    },

    #[error("endpoint returned {status} for {query:?} over {window}: {body}")]
    Status {
        query: String,
        window: TimeWindow,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("endpoint rejected {query:?} over {window}: {message}")]
    Rejected {
        query: String,
        window: TimeWindow,
        message: String,
    },

    #[error("decoding response for {query:?} over {window}: {message}")]
    Decode {
        query: String,
        window: TimeWindow,
        message: String,
    },
}

/// Issues one ranged query for one metric window.
pub trait RangeQueryClient: Send + Sync {
    /// Fetch the samples for `query` over `window` at the given step.
    ///
    /// Returned samples are ordered by ascending timestamp and confined to
    /// `[window.start, window.end)`.
    fn query_range(
        &self,
        query: &str,
        window: TimeWindow,
        step: Duration,
    ) -> impl std::future::Future<Output = Result<Vec<Sample>, FetchError>> + Send;
}

/// HTTP-based range-query client.
pub struct Client {
    http: reqwest::Client,
    endpoint: String,
}

impl Client {
    /// Create a new client for the given endpoint base URL.
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        use anyhow::Context;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

impl RangeQueryClient for Client {
    async fn query_range(
        &self,
        query: &str,
        window: TimeWindow,
        step: Duration,
    ) -> Result<Vec<Sample>, FetchError> {
        let url = format!("{}/api/v1/query_range", self.endpoint);

        debug!(query, %window, step_secs = step.as_secs(), "range query");

        let response = self
            .http
            .get(&url)
            .query(&[
                ("query", query),
                ("start", &window.start.timestamp().to_string()),
                ("end", &window.end.timestamp().to_string()),
                ("step", &step.as_secs().to_string()),
            ])
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                query: query.to_string(),
                window,
                source,
            })?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                query: query.to_string(),
                window,
                status,
                body,
            });
        }

        let envelope: ApiResponse =
            response
                .json()
                .await
                .map_err(|source| FetchError::Decode {
                    query: query.to_string(),
                    window,
                    message: source.to_string(),
                })?;

        decode_samples(envelope, query, window)
    }
}

// --- JSON response structures ---

#[derive(Deserialize)]
struct ApiResponse {
    status: String,

    #[serde(default)]
    error: Option<String>,

    #[serde(default, rename = "errorType")]
    error_type: Option<String>,

    #[serde(default)]
    data: Option<ApiData>,
}

#[derive(Deserialize)]
struct ApiData {
    #[serde(default)]
    result: Vec<ApiSeries>,
}

#[derive(Deserialize)]
struct ApiSeries {
    #[serde(default)]
    metric: HashMap<String, String>,

    #[serde(default)]
    values: Vec<(f64, String)>,
}

/// Turn a decoded response envelope into clamped, ordered samples.
fn decode_samples(
    envelope: ApiResponse,
    query: &str,
    window: TimeWindow,
) -> Result<Vec<Sample>, FetchError> {
    let decode_err = |message: String| FetchError::Decode {
        query: query.to_string(),
        window,
        message,
    };

    if envelope.status != "success" {
        let message = match (envelope.error_type, envelope.error) {
            (Some(kind), Some(detail)) => format!("{kind}: {detail}"),
            (_, Some(detail)) => detail,
            _ => format!("status {:?}", envelope.status),
        };
        return Err(FetchError::Rejected {
            query: query.to_string(),
            window,
            message,
        });
    }

    let data = envelope
        .data
        .ok_or_else(|| decode_err("missing data field".to_string()))?;

    let mut result = data.result.into_iter();

    let Some(series) = result.next() else {
        return Ok(Vec::new());
    };

    let skipped = result.count();
    if skipped > 0 {
        warn!(
            query,
            %window,
            skipped,
            labels = ?series.metric,
            "query returned multiple series; using the first",
        );
    }

    let mut samples = Vec::with_capacity(series.values.len());

    for (ts, raw) in series.values {
        let timestamp = sample_timestamp(ts)
            .ok_or_else(|| decode_err(format!("invalid sample timestamp {ts}")))?;

        if timestamp < window.start || timestamp >= window.end {
            continue;
        }

        let parsed: f64 = raw
            .parse()
            .map_err(|_| decode_err(format!("non-numeric sample value {raw:?}")))?;

        // Prometheus encodes "no data" instants as NaN.
        let value = if parsed.is_nan() { None } else { Some(parsed) };

        samples.push(Sample { timestamp, value });
    }

    samples.sort_by_key(|s| s.timestamp);

    Ok(samples)
}

/// Convert an epoch-seconds float to a timestamp.
///
/// Rounding the fractional part can produce a full extra second of
/// nanoseconds; the overflow is carried into the seconds rather than
/// rejecting the sample.
fn sample_timestamp(ts: f64) -> Option<DateTime<Utc>> {
    let mut secs = ts.trunc() as i64;
    let mut nanos = (ts.fract() * 1e9).round() as i64;

    if nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    } else if nanos < 0 {
        secs -= 1;
        nanos += 1_000_000_000;
    }

    DateTime::from_timestamp(secs, nanos as u32)
}
