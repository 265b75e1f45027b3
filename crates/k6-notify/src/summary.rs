//! Loading of the end-of-test summary written by k6.
//!
//! Only the fields the report reads are modelled; everything else in the
//! document is ignored. Maps keep document order so threshold lines come out
//! in the same order k6 wrote them.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, error};

#[derive(Debug, Clone, Deserialize)]
pub struct Summary {
    pub state: State,
    pub metrics: IndexMap<String, Metric>,
    pub root_group: Group,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    pub test_run_duration_ms: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metric {
    pub values: HashMap<String, f64>,
    #[serde(default)]
    pub thresholds: Option<IndexMap<String, ThresholdResult>>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ThresholdResult {
    pub ok: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Group {
    #[serde(default)]
    pub checks: Vec<Check>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Check {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

impl Summary {
    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.get(name)
    }
}

impl Metric {
    pub fn value(&self, stat: &str) -> Option<f64> {
        self.values.get(stat).copied()
    }
}

/// Read and decode the summary at `path`.
///
/// A missing or undecodable file is logged and yields `None`; the caller is
/// expected to stop without notifying.
pub fn load_summary(path: &Path) -> Option<Summary> {
    if !path.exists() {
        error!(
            "no summary found at {}, the test run may have failed",
            path.display()
        );
        return None;
    }

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            error!("error reading summary {}: {e}", path.display());
            return None;
        }
    };

    match serde_json::from_str::<Summary>(&contents) {
        Ok(summary) => {
            debug!(
                "loaded summary with {} metrics and {} checks",
                summary.metrics.len(),
                summary.root_group.checks.len()
            );
            Some(summary)
        }
        Err(e) => {
            error!("error parsing summary {}: {e}", path.display());
            None
        }
    }
}
