use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tree::SourceUnit;
use crate::types::{AnalyzerKind, Category, Finding, Severity};

/// A source unit with every finding reported against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAnalysisResult {
    pub unit: SourceUnit,
    pub findings: Vec<Finding>,
}

/// How one analyzer fared during the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerOutcome {
    pub analyzer: AnalyzerKind,
    /// False when the analyzer was skipped on request.
    pub ran: bool,
    /// False when any invocation of the analyzer faulted.
    pub passed: bool,
    pub elapsed_ms: u64,
    pub finding_count: usize,
    pub categories: Vec<Category>,
}

/// Aggregate counts over the whole run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_findings: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_category: BTreeMap<Category, usize>,
    pub files_analyzed: usize,
    pub files_skipped: usize,
}

/// A sealed analysis run. Immutable once built by [`RunCollector::seal`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRun {
    pub root: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fail_on: Severity,
    pub files: Vec<FileAnalysisResult>,
    /// Findings not tied to a single analyzed file.
    pub corpus_findings: Vec<Finding>,
    pub analyzers: Vec<AnalyzerOutcome>,
    pub summary: RunSummary,
}

impl AnalysisRun {
    /// Every finding of the run: per-file findings in file order, then
    /// corpus findings.
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.files
            .iter()
            .flat_map(|f| f.findings.iter())
            .chain(self.corpus_findings.iter())
    }

    pub fn failing_findings(&self) -> impl Iterator<Item = &Finding> {
        let threshold = self.fail_on;
        self.findings().filter(move |f| f.severity >= threshold)
    }

    /// The run passes when no finding reaches the failure threshold.
    pub fn passed(&self) -> bool {
        self.failing_findings().next().is_none()
    }

    pub fn skipped_files(&self) -> impl Iterator<Item = &FileAnalysisResult> {
        self.files.iter().filter(|f| !f.unit.parse_succeeded)
    }

    pub fn outcome(&self, analyzer: AnalyzerKind) -> Option<&AnalyzerOutcome> {
        self.analyzers.iter().find(|o| o.analyzer == analyzer)
    }

    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct AnalyzerTally {
    ran: bool,
    faulted: bool,
    elapsed: Duration,
    categories: Vec<Category>,
}

/// Run-scoped accumulator, created when orchestration starts and consumed by
/// [`RunCollector::seal`].
#[derive(Debug)]
pub struct RunCollector {
    root: PathBuf,
    started_at: DateTime<Utc>,
    fail_on: Severity,
    files: Vec<FileAnalysisResult>,
    corpus_findings: Vec<Finding>,
    tallies: BTreeMap<AnalyzerKind, AnalyzerTally>,
}

impl RunCollector {
    pub fn start(root: PathBuf, fail_on: Severity) -> Self {
        Self {
            root,
            started_at: Utc::now(),
            fail_on,
            files: Vec::new(),
            corpus_findings: Vec::new(),
            tallies: BTreeMap::new(),
        }
    }

    pub fn register_analyzer(&mut self, analyzer: AnalyzerKind, ran: bool, categories: &[Category]) {
        let tally = self.tallies.entry(analyzer).or_default();
        tally.ran = ran;
        tally.categories = categories.to_vec();
    }

    pub fn record_time(&mut self, analyzer: AnalyzerKind, elapsed: Duration, faulted: bool) {
        let tally = self.tallies.entry(analyzer).or_default();
        tally.elapsed += elapsed;
        tally.faulted |= faulted;
    }

    pub fn add_file(&mut self, unit: SourceUnit, findings: Vec<Finding>) {
        self.files.push(FileAnalysisResult { unit, findings });
    }

    /// Attach findings produced after the barrier: each goes to the file it
    /// points at, anything else becomes a corpus finding.
    pub fn add_corpus_findings(&mut self, findings: Vec<Finding>) {
        let index: HashMap<PathBuf, usize> = self
            .files
            .iter()
            .enumerate()
            .map(|(i, f)| (f.unit.path.clone(), i))
            .collect();
        for finding in findings {
            match index.get(&finding.location.file) {
                Some(&i) => self.files[i].findings.push(finding),
                None => self.corpus_findings.push(finding),
            }
        }
    }

    pub fn units(&self) -> impl Iterator<Item = &SourceUnit> {
        self.files.iter().map(|f| &f.unit)
    }

    /// Sort everything deterministically, compute the summary, and freeze
    /// the run.
    pub fn seal(mut self) -> AnalysisRun {
        self.files.sort_by(|a, b| a.unit.path.cmp(&b.unit.path));
        for file in &mut self.files {
            file.findings.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        }
        self.corpus_findings
            .sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let mut summary = RunSummary::default();
        let mut per_analyzer: BTreeMap<AnalyzerKind, usize> = BTreeMap::new();
        for finding in self
            .files
            .iter()
            .flat_map(|f| f.findings.iter())
            .chain(self.corpus_findings.iter())
        {
            summary.total_findings += 1;
            *summary.by_severity.entry(finding.severity).or_default() += 1;
            *summary.by_category.entry(finding.category).or_default() += 1;
            *per_analyzer.entry(finding.analyzer).or_default() += 1;
        }
        summary.files_skipped = self
            .files
            .iter()
            .filter(|f| !f.unit.parse_succeeded)
            .count();
        summary.files_analyzed = self.files.len() - summary.files_skipped;

        let analyzers = self
            .tallies
            .into_iter()
            .map(|(analyzer, tally)| AnalyzerOutcome {
                analyzer,
                ran: tally.ran,
                passed: !tally.faulted,
                elapsed_ms: tally.elapsed.as_millis() as u64,
                finding_count: per_analyzer.get(&analyzer).copied().unwrap_or(0),
                categories: tally.categories,
            })
            .collect();

        AnalysisRun {
            root: self.root,
            started_at: self.started_at,
            finished_at: Utc::now(),
            fail_on: self.fail_on,
            files: self.files,
            corpus_findings: self.corpus_findings,
            analyzers,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Location;
    use std::path::Path;

    fn unit(path: &str, ok: bool) -> SourceUnit {
        let mut unit = SourceUnit::failed(Path::new(path), path.to_string(), vec![]);
        unit.parse_succeeded = ok;
        unit
    }

    fn finding(path: &str, line: usize, severity: Severity, category: Category) -> Finding {
        Finding::new(
            AnalyzerKind::Quality,
            "TEST-001",
            severity,
            category,
            Location {
                file: PathBuf::from(path),
                line,
                column: 1,
            },
            "test finding",
        )
    }

    #[test]
    fn test_seal_computes_summary() {
        let mut collector = RunCollector::start(PathBuf::from("."), Severity::High);
        collector.register_analyzer(AnalyzerKind::Quality, true, &[Category::Complexity]);
        collector.add_file(
            unit("b.cs", true),
            vec![
                finding("b.cs", 9, Severity::Medium, Category::Complexity),
                finding("b.cs", 2, Severity::High, Category::Complexity),
            ],
        );
        collector.add_file(unit("a.cs", false), vec![]);
        collector.add_corpus_findings(vec![
            finding("b.cs", 5, Severity::Low, Category::Naming),
            finding("elsewhere", 1, Severity::Info, Category::PatternViolation),
        ]);

        let run = collector.seal();
        assert_eq!(run.summary.total_findings, 4);
        assert_eq!(run.summary.files_analyzed, 1);
        assert_eq!(run.summary.files_skipped, 1);
        assert_eq!(run.summary.by_severity[&Severity::High], 1);
        assert_eq!(run.summary.by_category[&Category::Complexity], 2);
        assert_eq!(run.files[0].unit.path, PathBuf::from("a.cs"));
        let lines: Vec<_> = run.files[1].findings.iter().map(|f| f.location.line).collect();
        assert_eq!(lines, vec![2, 5, 9]);
        assert_eq!(run.corpus_findings.len(), 1);
        assert_eq!(run.outcome(AnalyzerKind::Quality).unwrap().finding_count, 3);
        assert!(!run.passed());
        assert_eq!(run.failing_findings().count(), 1);
    }

    #[test]
    fn test_passes_with_only_low_findings() {
        let mut collector = RunCollector::start(PathBuf::from("."), Severity::High);
        collector.add_file(
            unit("a.cs", true),
            vec![
                finding("a.cs", 1, Severity::Low, Category::Naming),
                finding("a.cs", 2, Severity::Info, Category::Documentation),
            ],
        );
        assert!(collector.seal().passed());
    }

    #[test]
    fn test_analyzer_fault_marks_outcome() {
        let mut collector = RunCollector::start(PathBuf::from("."), Severity::High);
        collector.register_analyzer(AnalyzerKind::Security, true, &[]);
        collector.record_time(AnalyzerKind::Security, Duration::from_millis(3), false);
        collector.record_time(AnalyzerKind::Security, Duration::from_millis(4), true);
        let run = collector.seal();
        let outcome = run.outcome(AnalyzerKind::Security).unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.elapsed_ms, 7);
    }
}
