use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use walkdir::WalkDir;

use crate::analyzer::{ParseCancelled, SourceParser};
use crate::error::PipelineError;
use crate::isolate;
use crate::tree::SourceUnit;
use crate::types::{AnalyzerKind, Category, Finding, Severity};

/// Stack size for worker threads; lowering recurses once per syntax level.
pub const PARSE_STACK_SIZE: usize = 16 * 1024 * 1024;

/// A unit together with the findings produced while loading it.
pub struct LoadedUnit {
    pub unit: SourceUnit,
    pub findings: Vec<Finding>,
}

impl LoadedUnit {
    fn failed(unit: SourceUnit, rule: &str, severity: Severity, message: String) -> Self {
        let finding = Finding::new(
            AnalyzerKind::Corpus,
            rule,
            severity,
            Category::ToolFailure,
            unit.file_location(),
            message,
        );
        Self {
            unit,
            findings: vec![finding],
        }
    }
}

enum ParseOutcome {
    Parsed(SourceUnit),
    Failed(String),
    TimedOut,
}

/// Enumerates and parses the source files under a root.
pub struct SourceCorpus {
    parser: Arc<dyn SourceParser>,
    exclude_dirs: Vec<String>,
    timeout: Option<Duration>,
}

impl SourceCorpus {
    pub fn new(parser: Arc<dyn SourceParser>, exclude_dirs: Vec<String>, timeout: Option<Duration>) -> Self {
        Self {
            parser,
            exclude_dirs,
            timeout,
        }
    }

    pub fn language(&self) -> &'static str {
        self.parser.language()
    }

    /// Lazily walk `root` for files the parser handles, pruning excluded
    /// directories. A root that is a file yields just that file.
    pub fn files(&self, root: &Path) -> Result<impl Iterator<Item = PathBuf> + '_, PipelineError> {
        if !root.exists() {
            return Err(PipelineError::PathNotFound(root.to_path_buf()));
        }
        let extensions = self.parser.file_extensions();
        let iter = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(move |entry| {
                !(entry.depth() > 0
                    && entry.file_type().is_dir()
                    && self.is_excluded(&entry.file_name().to_string_lossy()))
            })
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("skipping unreadable entry: {e}");
                    None
                }
            })
            .filter(move |entry| {
                entry.file_type().is_file()
                    && entry
                        .path()
                        .extension()
                        .is_some_and(|ext| extensions.iter().any(|e| ext == *e))
            })
            .map(|entry| entry.into_path());
        Ok(iter)
    }

    fn is_excluded(&self, dir_name: &str) -> bool {
        self.exclude_dirs.iter().any(|d| d == dir_name)
    }

    /// Read and parse one file. Never fails: read errors, syntax errors, and
    /// timeouts come back as a unit with `parse_succeeded == false` plus a
    /// finding describing why.
    pub fn load(&self, root: &Path, path: &Path) -> LoadedUnit {
        let relative_path = relative_path(root, path);

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(file = %path.display(), "failed to read: {e}");
                let message = format!("could not read file: {e}");
                let unit = SourceUnit::failed(path, relative_path, vec![message.clone()]);
                return LoadedUnit::failed(unit, "CORE-READ-001", Severity::Info, message);
            }
        };

        match self.parse(path, &relative_path, &content) {
            ParseOutcome::Parsed(unit) if unit.parse_succeeded => LoadedUnit {
                unit,
                findings: Vec::new(),
            },
            ParseOutcome::Parsed(unit) => {
                tracing::warn!(file = %path.display(), "syntax errors, skipping analysis");
                let detail = unit
                    .diagnostics
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "syntax error".to_string());
                let message = format!(
                    "file could not be parsed and was excluded from analysis: {detail}"
                );
                LoadedUnit::failed(unit, "CORE-PARSE-001", Severity::Info, message)
            }
            ParseOutcome::Failed(reason) => {
                tracing::warn!(file = %path.display(), "parser failed: {reason}");
                let unit = SourceUnit::failed(path, relative_path, vec![reason.clone()]);
                let message = format!("parser failed and the file was excluded from analysis: {reason}");
                LoadedUnit::failed(unit, "CORE-PARSE-001", Severity::Info, message)
            }
            ParseOutcome::TimedOut => {
                let limit = self.timeout.unwrap_or_default().as_millis();
                tracing::warn!(file = %path.display(), "parse timed out after {limit}ms");
                let message = format!("parsing exceeded the {limit}ms limit; file skipped");
                let unit = SourceUnit::failed(path, relative_path, vec![message.clone()]);
                LoadedUnit::failed(unit, "CORE-TIMEOUT-001", Severity::Low, message)
            }
        }
    }

    /// Parse on the calling thread. A timeout is a deadline handed to the
    /// parser, which cancels itself in place once it passes.
    fn parse(&self, path: &Path, relative_path: &str, content: &str) -> ParseOutcome {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let result = isolate::contain(|| {
            self.parser.parse_until(path, relative_path, content, deadline)
        });
        match result {
            Ok(Ok(unit)) => ParseOutcome::Parsed(unit),
            Ok(Err(e)) if e.is::<ParseCancelled>() => ParseOutcome::TimedOut,
            Ok(Err(e)) => ParseOutcome::Failed(format!("{e:#}")),
            Err(panic) => ParseOutcome::Failed(format!("parser {panic}")),
        }
    }
}

/// `/`-separated path of `path` below `root`; the file name when `root` is
/// the file itself.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let rel = if rel.as_os_str().is_empty() {
        path.file_name().map(Path::new).unwrap_or(path)
    } else {
        rel
    };
    rel.to_string_lossy().replace('\\', "/")
}
