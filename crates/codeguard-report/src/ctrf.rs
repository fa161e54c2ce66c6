//! Common Test Report Format output. Each finding becomes a test; each
//! analyzer category with nothing at or above the threshold becomes a
//! passing test.

use std::path::Path;

use serde::{Deserialize, Serialize};

use codeguard_core::run::AnalysisRun;
use codeguard_core::types::Finding;

use crate::{display_path, ReportError};

pub const TOOL_NAME: &str = "codeguard";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CtrfReport {
    pub results: CtrfResults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CtrfResults {
    pub tool: CtrfTool,
    pub summary: CtrfSummary,
    pub tests: Vec<CtrfTest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CtrfTool {
    pub name: String,
    pub version: String,
}

/// Counts per status; `start` and `stop` are epoch milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtrfSummary {
    pub tests: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pending: usize,
    pub other: usize,
    pub start: i64,
    pub stop: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CtrfStatus {
    Passed,
    Failed,
    Skipped,
    Pending,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtrfTest {
    pub name: String,
    pub status: CtrfStatus,
    /// Milliseconds.
    pub duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owasp_mapping: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwe_mapping: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,
}

impl CtrfTest {
    fn class(name: String, status: CtrfStatus, duration: u64) -> Self {
        Self {
            suite: Some(name.clone()),
            name,
            status,
            duration,
            rule_id: None,
            owasp_mapping: None,
            cwe_mapping: None,
            message: None,
            file_path: None,
            line: None,
        }
    }

    fn finding(run: &AnalysisRun, finding: &Finding, status: CtrfStatus) -> Self {
        let file = display_path(&run.root, &finding.location.file)
            .to_string_lossy()
            .replace('\\', "/");
        Self {
            name: format!("{} {}:{}", finding.rule_id, file, finding.location.line),
            status,
            duration: 0,
            rule_id: Some(finding.rule_id.to_string()),
            owasp_mapping: finding.owasp.map(|o| format!("{}:2021", o.code())),
            cwe_mapping: finding.cwe.map(|c| c.to_string()),
            message: Some(finding.message.clone()),
            file_path: Some(file),
            line: Some(finding.location.line),
            suite: Some(format!("{}/{}", finding.analyzer, finding.category)),
        }
    }
}

impl CtrfReport {
    pub fn build(run: &AnalysisRun, version: &str) -> Self {
        let mut tests = Vec::new();

        for outcome in &run.analyzers {
            for &category in &outcome.categories {
                let name = format!("{}/{}", outcome.analyzer, category);
                if !outcome.ran {
                    tests.push(CtrfTest::class(name, CtrfStatus::Skipped, 0));
                    continue;
                }
                let failing = run
                    .failing_findings()
                    .any(|f| f.analyzer == outcome.analyzer && f.category == category);
                if !failing {
                    tests.push(CtrfTest::class(name, CtrfStatus::Passed, outcome.elapsed_ms));
                }
            }
        }

        for finding in run.findings() {
            let status = if finding.severity >= run.fail_on {
                CtrfStatus::Failed
            } else {
                CtrfStatus::Other
            };
            tests.push(CtrfTest::finding(run, finding, status));
        }

        for file in run.skipped_files() {
            let mut test = CtrfTest::class(
                format!("parse {}", file.unit.relative_path),
                CtrfStatus::Skipped,
                0,
            );
            test.suite = Some("corpus/parse".to_string());
            test.file_path = Some(file.unit.relative_path.clone());
            test.message = Some(file.unit.diagnostics.join("; "));
            tests.push(test);
        }

        let mut summary = CtrfSummary {
            tests: tests.len(),
            start: run.started_at.timestamp_millis(),
            stop: run.finished_at.timestamp_millis(),
            ..Default::default()
        };
        for test in &tests {
            match test.status {
                CtrfStatus::Passed => summary.passed += 1,
                CtrfStatus::Failed => summary.failed += 1,
                CtrfStatus::Skipped => summary.skipped += 1,
                CtrfStatus::Pending => summary.pending += 1,
                CtrfStatus::Other => summary.other += 1,
            }
        }

        Self {
            results: CtrfResults {
                tool: CtrfTool {
                    name: TOOL_NAME.to_string(),
                    version: version.to_string(),
                },
                summary,
                tests,
            },
        }
    }

    /// Write the report as pretty JSON, creating missing parent directories.
    pub fn write(&self, path: &Path) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(self)?;
        let write_err = |source: std::io::Error| ReportError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, json).map_err(write_err)?;
        tracing::debug!(path = %path.display(), tests = self.results.tests.len(), "wrote CTRF report");
        Ok(())
    }
}
