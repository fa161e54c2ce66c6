use serde::Serialize;

use codeguard_core::run::AnalysisRun;
use codeguard_core::types::Severity;

use crate::ReportError;

/// The sealed run plus pass/fail metadata.
#[derive(Debug, Serialize)]
pub struct CheckOutput<'a> {
    #[serde(flatten)]
    pub run: &'a AnalysisRun,
    pub check: CheckStatus,
}

#[derive(Debug, Serialize)]
pub struct CheckStatus {
    pub passed: bool,
    pub fail_on: Severity,
    pub failing_finding_count: usize,
}

/// Format a run as JSON for `--format json`.
pub fn format_report(run: &AnalysisRun, compact: bool) -> Result<String, ReportError> {
    let failing_finding_count = run.failing_findings().count();
    let output = CheckOutput {
        run,
        check: CheckStatus {
            passed: failing_finding_count == 0,
            fail_on: run.fail_on,
            failing_finding_count,
        },
    };
    let json = if compact {
        serde_json::to_string(&output)?
    } else {
        serde_json::to_string_pretty(&output)?
    };
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::sample_run;

    #[test]
    fn test_check_metadata() {
        let json = format_report(&sample_run(), true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["check"]["passed"], false);
        assert_eq!(value["check"]["fail_on"], "high");
        assert_eq!(value["check"]["failing_finding_count"], 1);
        assert_eq!(value["summary"]["total_findings"], 3);
        assert_eq!(value["files"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_finding_fields() {
        let json = format_report(&sample_run(), false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let finding = &value["files"][0]["findings"][0];
        assert_eq!(finding["rule_id"], "SEC-AUTH-001");
        assert_eq!(finding["severity"], "high");
        assert_eq!(finding["owasp"], "A01:2021");
        assert_eq!(finding["cwe"], 862);
        assert_eq!(finding["location"]["line"], 12);
    }
}
