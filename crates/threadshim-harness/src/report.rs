//! Conformance report and run artifacts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::conformance::PropertyResult;
use crate::structured_log::{ArtifactIndex, Outcome, now_utc};

/// Summary of one conformance run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConformanceReport {
    pub run_id: String,
    pub backend: String,
    pub hostname: String,
    pub generated_utc: String,
    pub threads: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<PropertyResult>,
}

impl ConformanceReport {
    #[must_use]
    pub fn new(run_id: impl Into<String>, threads: usize, results: Vec<PropertyResult>) -> Self {
        let failed = results
            .iter()
            .filter(|r| r.outcome == Outcome::Fail)
            .count();
        Self {
            run_id: run_id.into(),
            backend: threadshim_core::backend_name().to_string(),
            hostname: threadshim_core::compat::hostname(),
            generated_utc: now_utc(),
            threads,
            passed: results.len() - failed,
            failed,
            results,
        }
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Writes `report.json` and `artifacts.json` next to the run log in
    /// `out_dir`. Returns the paths written.
    pub fn write_artifacts(
        &self,
        out_dir: &Path,
        log_path: &Path,
    ) -> std::io::Result<Vec<PathBuf>> {
        let report_path = out_dir.join(REPORT_FILE);
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(&report_path, json)?;

        let mut index = ArtifactIndex::new(&self.run_id, SUITE);
        index
            .add_file(log_path, LOG_FILE, "log")?
            .add_file(&report_path, REPORT_FILE, "report")?;
        let index_path = out_dir.join(INDEX_FILE);
        std::fs::write(&index_path, index.to_json().map_err(std::io::Error::other)?)?;

        Ok(vec![log_path.to_path_buf(), report_path, index_path])
    }
}

pub const SUITE: &str = "conformance";
pub const LOG_FILE: &str = "conformance.log.jsonl";
pub const REPORT_FILE: &str = "report.json";
pub const INDEX_FILE: &str = "artifacts.json";
