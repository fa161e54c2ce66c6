use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::analyzer::{Analyzer, SourceParser};
use crate::config::{Config, RulesConfig};
use crate::corpus::{SourceCorpus, PARSE_STACK_SIZE};
use crate::error::PipelineError;
use crate::isolate;
use crate::run::{AnalysisRun, RunCollector};
use crate::tree::SourceUnit;
use crate::types::{AnalyzerKind, Category, Finding, Location, Severity};

/// Cooperative cancellation flag, checked between files.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of invoking one analyzer once.
struct Invocation {
    analyzer: AnalyzerKind,
    findings: Vec<Finding>,
    elapsed: Duration,
    faulted: bool,
}

/// Everything produced for one file on a worker thread.
struct FileOutcome {
    unit: SourceUnit,
    findings: Vec<Finding>,
    invocations: Vec<Invocation>,
}

/// Orchestrates a run: discovery, parallel per-file analysis, a barrier,
/// then corpus-wide analysis over every successfully parsed unit.
pub struct AnalysisPipeline {
    corpus: SourceCorpus,
    analyzers: Vec<Box<dyn Analyzer>>,
    config: Config,
    skip: BTreeSet<AnalyzerKind>,
    abort: AbortHandle,
}

impl AnalysisPipeline {
    pub fn new(
        parser: Arc<dyn SourceParser>,
        analyzers: Vec<Box<dyn Analyzer>>,
        config: Config,
    ) -> Self {
        let timeout = match config.project.parse_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        let corpus = SourceCorpus::new(parser, config.project.exclude_dirs.clone(), timeout);
        Self {
            corpus,
            analyzers,
            config,
            skip: BTreeSet::new(),
            abort: AbortHandle::new(),
        }
    }

    /// Analyzers that are registered but must not run.
    pub fn with_skipped(mut self, skip: impl IntoIterator<Item = AnalyzerKind>) -> Self {
        self.skip.extend(skip);
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn active_analyzers(&self) -> Vec<&dyn Analyzer> {
        self.analyzers
            .iter()
            .filter(|a| !self.skip.contains(&a.kind()))
            .map(|a| a.as_ref())
            .collect()
    }

    /// Analyze everything under `root` (a directory or a single file).
    pub fn run(&self, root: &Path) -> Result<AnalysisRun, PipelineError> {
        let files: Vec<PathBuf> = self.corpus.files(root)?.collect();
        let total = files.len();
        tracing::info!(
            root = %root.display(),
            language = self.corpus.language(),
            "discovered {total} source files"
        );

        let mut collector = RunCollector::start(root.to_path_buf(), self.config.rules.fail_on);
        for analyzer in &self.analyzers {
            let ran = !self.skip.contains(&analyzer.kind());
            if !ran {
                tracing::info!(analyzer = %analyzer.kind(), "skipped on request");
            }
            collector.register_analyzer(analyzer.kind(), ran, analyzer.categories());
        }
        let active = self.active_analyzers();

        let mut builder = rayon::ThreadPoolBuilder::new().stack_size(PARSE_STACK_SIZE);
        if let Some(jobs) = self.config.project.jobs {
            builder = builder.num_threads(jobs);
        }
        let pool = builder
            .build()
            .map_err(|e| PipelineError::WorkerPool(e.to_string()))?;

        let processed = AtomicUsize::new(0);
        let outcomes: Vec<FileOutcome> = pool.install(|| {
            files
                .par_iter()
                .filter_map(|path| {
                    if self.abort.is_aborted() {
                        return None;
                    }
                    let outcome = self.analyze_file(root, path, &active);
                    processed.fetch_add(1, Ordering::Relaxed);
                    Some(outcome)
                })
                .collect()
        });

        if self.abort.is_aborted() {
            let processed = processed.into_inner();
            tracing::warn!("run aborted after {processed} of {total} files");
            return Err(PipelineError::Aborted { processed, total });
        }

        for outcome in outcomes {
            for invocation in &outcome.invocations {
                collector.record_time(invocation.analyzer, invocation.elapsed, invocation.faulted);
            }
            let findings = self.apply_rules(outcome.findings.into_iter().chain(
                outcome.invocations.into_iter().flat_map(|i| i.findings),
            ));
            collector.add_file(outcome.unit, findings);
        }

        // Barrier: every file is parsed and analyzed before corpus-wide rules run.
        let corpus_invocations: Vec<Invocation> = {
            let units: Vec<&SourceUnit> = collector.units().filter(|u| u.parse_succeeded).collect();
            tracing::info!("running corpus analysis over {} units", units.len());
            let root_location = Location {
                file: root.to_path_buf(),
                line: 1,
                column: 1,
            };
            active
                .iter()
                .map(|analyzer| {
                    self.invoke(*analyzer, &root_location, || analyzer.analyze_corpus(&units))
                })
                .collect()
        };
        for invocation in corpus_invocations {
            collector.record_time(invocation.analyzer, invocation.elapsed, invocation.faulted);
            let findings = self.apply_rules(invocation.findings.into_iter());
            collector.add_corpus_findings(findings);
        }

        let run = collector.seal();
        tracing::info!(
            findings = run.summary.total_findings,
            files = run.summary.files_analyzed,
            skipped = run.summary.files_skipped,
            "analysis complete in {}ms",
            run.duration().as_millis()
        );
        Ok(run)
    }

    fn analyze_file(&self, root: &Path, path: &Path, active: &[&dyn Analyzer]) -> FileOutcome {
        tracing::debug!(file = %path.display(), "analyzing");
        let loaded = self.corpus.load(root, path);
        let mut invocations = Vec::new();
        if loaded.unit.parse_succeeded {
            let location = loaded.unit.file_location();
            for analyzer in active {
                let unit = &loaded.unit;
                invocations.push(self.invoke(*analyzer, &location, || analyzer.analyze_file(unit)));
            }
        }
        FileOutcome {
            unit: loaded.unit,
            findings: loaded.findings,
            invocations,
        }
    }

    /// Run one analyzer call in isolation. An error or panic becomes a
    /// tool-failure finding at `location` and marks the analyzer as faulted;
    /// it never takes down the run. Contained panics print no banner.
    fn invoke(
        &self,
        analyzer: &dyn Analyzer,
        location: &Location,
        work: impl FnOnce() -> anyhow::Result<Vec<Finding>>,
    ) -> Invocation {
        let kind = analyzer.kind();
        let started = Instant::now();
        let result = isolate::contain(work);
        let elapsed = started.elapsed();

        let failure = match result {
            Ok(Ok(findings)) => {
                return Invocation {
                    analyzer: kind,
                    findings,
                    elapsed,
                    faulted: false,
                }
            }
            Ok(Err(e)) => format!("{e:#}"),
            Err(panic) => panic,
        };

        tracing::warn!(analyzer = %kind, file = %location.file.display(), "analyzer failed: {failure}");
        let finding = Finding::new(
            kind,
            "CORE-ANALYZER-001",
            Severity::Medium,
            Category::ToolFailure,
            location.clone(),
            format!("{kind} analyzer failed: {failure}"),
        );
        Invocation {
            analyzer: kind,
            findings: vec![finding],
            elapsed,
            faulted: true,
        }
    }

    fn apply_rules(&self, findings: impl Iterator<Item = Finding>) -> Vec<Finding> {
        apply_rule_config(&self.config.rules, findings)
    }
}

/// Drop disabled rules and apply per-rule severity overrides.
pub fn apply_rule_config(rules: &RulesConfig, findings: impl Iterator<Item = Finding>) -> Vec<Finding> {
    findings
        .filter(|f| !rules.is_disabled(&f.rule_id))
        .map(|f| match rules.severity_override(&f.rule_id) {
            Some(severity) => f.with_severity(severity),
            None => f,
        })
        .collect()
}
