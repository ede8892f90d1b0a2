//! Durable per-metric progress markers.
//!
//! Markers live in a small JSON file mapping metric name to the end of its
//! last fully processed window. The file is rewritten via temp + rename so a
//! crash mid-write never leaves a truncated state file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    markers: BTreeMap<String, DateTime<Utc>>,
}

/// Loads, tracks, and persists progress markers for all metrics.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: StateFile,
}

impl StateStore {
    /// Open the state file at `path`. A missing file is an empty state.
    pub fn open(path: &Path) -> Result<Self> {
        let state = if path.exists() {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("reading state file {}", path.display()))?;

            serde_json::from_str(&data)
                .with_context(|| format!("parsing state file {}", path.display()))?
        } else {
            debug!(path = %path.display(), "no state file, starting fresh");
            StateFile::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            state,
        })
    }

    /// The marker for a metric, if one has been recorded.
    pub fn marker(&self, metric: &str) -> Option<DateTime<Utc>> {
        self.state.markers.get(metric).copied()
    }

    /// Record a metric's marker in memory. Call [`StateStore::save`] to persist.
    pub fn set_marker(&mut self, metric: &str, marker: DateTime<Utc>) {
        self.state.markers.insert(metric.to_string(), marker);
    }

    /// Persist all markers, replacing the state file atomically.
    pub fn save(&self) -> Result<()> {
        let data =
            serde_json::to_string_pretty(&self.state).context("serializing state")?;

        let tmp = self.path.with_extension("tmp");

        std::fs::write(&tmp, data)
            .with_context(|| format!("writing state file {}", tmp.display()))?;

        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing state file {}", self.path.display()))?;

        debug!(path = %self.path.display(), markers = self.state.markers.len(), "state saved");

        Ok(())
    }
}
