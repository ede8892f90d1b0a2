use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level configuration for a promtap run.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base URL of the query endpoint (e.g., "http://localhost:9090").
    pub endpoint: String,

    /// Default resume point for metrics without a persisted marker.
    pub start_date: DateTime<Utc>,

    /// HTTP request timeout. Default: 10s.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Metric definitions, processed in order.
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
}

/// One metric rollup definition.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricConfig {
    /// Metric identifier; output stream names derive from it.
    pub name: String,

    /// Query-language expression, passed through to the endpoint verbatim.
    pub query: String,

    /// Statistics to compute per window. Must be non-empty with no repeats.
    pub aggregations: Vec<AggregationKind>,

    /// Window granularity. Default: day.
    #[serde(default)]
    pub period: Period,

    /// Sampling resolution within a window, in seconds.
    pub step: u64,
}

impl MetricConfig {
    /// Sampling step as a duration.
    pub fn step_duration(&self) -> Duration {
        Duration::from_secs(self.step)
    }
}

/// Statistic computed over one window's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    Max,
    Min,
    Avg,
}

impl AggregationKind {
    /// Lowercase name as it appears in config, records, and stream names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Max => "max",
            Self::Min => "min",
            Self::Avg => "avg",
        }
    }
}

/// Window granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Day,
}

impl Default for Period {
    fn default() -> Self {
        Self::Day
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            bail!("endpoint is required");
        }

        if self.timeout.is_zero() {
            bail!("timeout must be positive");
        }

        if self.metrics.is_empty() {
            bail!("at least one metric is required");
        }

        let mut seen_names = HashSet::new();

        for metric in &self.metrics {
            if metric.name.is_empty() {
                bail!("metric name is required");
            }

            if !seen_names.insert(metric.name.as_str()) {
                bail!("duplicate metric name: {}", metric.name);
            }

            if metric.query.is_empty() {
                bail!("metric {}: query is required", metric.name);
            }

            if metric.aggregations.is_empty() {
                bail!(
                    "metric {}: at least one aggregation is required",
                    metric.name
                );
            }

            let mut seen_kinds = HashSet::new();
            for kind in &metric.aggregations {
                if !seen_kinds.insert(*kind) {
                    bail!(
                        "metric {}: aggregation appears more than once: {}",
                        metric.name,
                        kind.as_str()
                    );
                }
            }

            if metric.step == 0 {
                bail!("metric {}: step must be positive", metric.name);
            }
        }

        Ok(())
    }
}
