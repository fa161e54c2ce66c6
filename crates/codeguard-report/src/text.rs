use colored::{ColoredString, Colorize};

use codeguard_core::run::AnalysisRun;
use codeguard_core::types::{Finding, Severity};

use crate::display_path;

fn severity_label(severity: Severity) -> ColoredString {
    match severity {
        Severity::Critical => "CRITICAL".red().bold(),
        Severity::High => "HIGH".red().bold(),
        Severity::Medium => "MEDIUM".yellow().bold(),
        Severity::Low => "LOW".blue().bold(),
        Severity::Info => "INFO".dimmed(),
    }
}

/// Format a run for terminal output. `verbose` lists every finding.
pub fn format_report(run: &AnalysisRun, verbose: bool) -> String {
    let mut out = String::new();

    out.push_str(&format!("\n{}\n", "Codeguard - Static Validation".bold()));
    out.push_str(&format!("{}\n\n", "=".repeat(40)));

    let summary = &run.summary;
    out.push_str(&format!(
        "{}: {} files analyzed, {} skipped, {} findings in {} ms\n",
        "Summary".bold(),
        summary.files_analyzed,
        summary.files_skipped,
        summary.total_findings,
        run.duration().as_millis(),
    ));

    if !summary.by_severity.is_empty() {
        let counts: Vec<String> = Severity::DESCENDING
            .iter()
            .filter_map(|s| summary.by_severity.get(s).map(|n| format!("{s}={n}")))
            .collect();
        out.push_str(&format!("  By severity: {}\n", counts.join(", ")));
    }
    if !summary.by_category.is_empty() {
        let counts: Vec<String> = summary
            .by_category
            .iter()
            .map(|(c, n)| format!("{c}={n}"))
            .collect();
        out.push_str(&format!("  By category: {}\n", counts.join(", ")));
    }

    out.push_str(&format!("\n{}\n{}\n", "Analyzers".bold(), "-".repeat(40)));
    for outcome in &run.analyzers {
        let status = if !outcome.ran {
            "skipped".dimmed()
        } else if outcome.passed {
            "ok".green()
        } else {
            "faulted".red()
        };
        out.push_str(&format!(
            "  {:<14} {:<8} {:>6} ms  {} findings\n",
            outcome.analyzer.to_string(),
            status,
            outcome.elapsed_ms,
            outcome.finding_count,
        ));
    }

    if verbose {
        let findings: Vec<&Finding> = run.findings().collect();
        if findings.is_empty() {
            out.push_str(&format!("\n{}\n", "No findings.".green().bold()));
        } else {
            out.push_str(&format!(
                "\n{} ({} found)\n{}\n",
                "Findings".bold(),
                findings.len(),
                "-".repeat(40)
            ));
            for f in findings {
                out.push_str(&format!(
                    "  {} [{}] {}:{} {} {}\n",
                    severity_label(f.severity),
                    f.category,
                    display_path(&run.root, &f.location.file).display(),
                    f.location.line,
                    f.rule_id,
                    f.message,
                ));
                if let Some(ref suggestion) = f.suggestion {
                    out.push_str(&format!("      {}: {}\n", "Suggestion".cyan(), suggestion));
                }
            }
        }
    }

    out.push('\n');
    out.push_str(&format_footer(run));
    out
}

/// `CHECK PASSED`, or `CHECK FAILED` with the number of findings at or
/// above the threshold.
pub fn format_footer(run: &AnalysisRun) -> String {
    let failing = run.failing_findings().count();
    if failing == 0 {
        format!("{}\n", "CHECK PASSED".green().bold())
    } else {
        format!(
            "{}: {} finding(s) at severity {} or above\n",
            "CHECK FAILED".red().bold(),
            failing,
            run.fail_on,
        )
    }
}
