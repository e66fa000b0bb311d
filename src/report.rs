//! Result rows: tab-separated for stdout, JSON for export.

use crate::error::Result;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// One measured trial, reported verbatim (no averaging).
#[derive(Debug, Clone, Serialize)]
pub struct TrialReport {
    pub trial: usize,
    pub workload: &'static str,
    pub policy: &'static str,
    pub ratio: f32,
    pub length: u64,
    pub data_ms: f64,
    pub exec_ms: f64,
    pub total_ms: f64,
}

impl fmt::Display for TrialReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{:.6}\t{}\t{:.6}\t{:.6}\t{:.6}",
            self.trial,
            self.workload,
            self.policy,
            self.ratio,
            self.length,
            self.data_ms,
            self.exec_ms,
            self.total_ms
        )
    }
}

pub fn write_json(path: &Path, rows: &[TrialReport]) -> Result<()> {
    let json = serde_json::to_string_pretty(rows)
        .map_err(|e| crate::error::Error::config(format!("JSON serialization failed: {}", e)))?;
    std::fs::write(path, json)?;
    Ok(())
}
