use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod ctrf;
pub mod json;
pub mod text;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write report to {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Path of a finding relative to the scan root, for display. A run rooted at
/// a single file keeps the file's own path.
pub fn display_path<'a>(root: &Path, file: &'a Path) -> &'a Path {
    match file.strip_prefix(root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel,
        _ => file,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use codeguard_core::run::{AnalysisRun, RunCollector};
    use codeguard_core::tree::SourceUnit;
    use codeguard_core::types::{
        AnalyzerKind, Category, Finding, Location, OwaspCategory, Severity,
    };

    fn at(file: &str, line: usize) -> Location {
        Location {
            file: PathBuf::from(file),
            line,
            column: 1,
        }
    }

    /// Quality and security ran, architecture was skipped, one file failed
    /// to parse.
    pub(crate) fn sample_run() -> AnalysisRun {
        let mut collector = RunCollector::start(PathBuf::from("/repo"), Severity::High);
        collector.register_analyzer(
            AnalyzerKind::Quality,
            true,
            &[Category::Complexity, Category::Naming],
        );
        collector.register_analyzer(
            AnalyzerKind::Security,
            true,
            &[Category::SqlInjection, Category::Authorization],
        );
        collector.register_analyzer(
            AnalyzerKind::Architecture,
            false,
            &[Category::DependencyViolation, Category::PatternViolation],
        );

        let controller = "/repo/Api/OrdersController.cs";
        let mut unit = SourceUnit::failed(Path::new(controller), "Api/OrdersController.cs".into(), vec![]);
        unit.parse_succeeded = true;
        collector.add_file(
            unit,
            vec![
                Finding::new(
                    AnalyzerKind::Security,
                    "SEC-AUTH-001",
                    Severity::High,
                    Category::Authorization,
                    at(controller, 12),
                    "action 'Delete' has no [Authorize] or [AllowAnonymous]",
                )
                .with_owasp(OwaspCategory::A01BrokenAccessControl)
                .with_cwe(862),
                Finding::new(
                    AnalyzerKind::Quality,
                    "QUAL-NAME-002",
                    Severity::Low,
                    Category::Naming,
                    at(controller, 20),
                    "method 'getAll' is not PascalCase",
                ),
            ],
        );

        let broken = "/repo/Broken.cs";
        collector.add_file(
            SourceUnit::failed(
                Path::new(broken),
                "Broken.cs".into(),
                vec!["syntax error at 2:20 near `{`".into()],
            ),
            vec![Finding::new(
                AnalyzerKind::Corpus,
                "CORE-PARSE-001",
                Severity::Info,
                Category::ToolFailure,
                at(broken, 1),
                "could not parse Broken.cs: syntax error at 2:20 near `{`",
            )],
        );
        collector.seal()
    }

    #[test]
    fn test_display_path() {
        let root = Path::new("/src/shop");
        assert_eq!(
            display_path(root, Path::new("/src/shop/Api/OrdersController.cs")),
            Path::new("Api/OrdersController.cs")
        );
        assert_eq!(
            display_path(Path::new("/src/shop/Program.cs"), Path::new("/src/shop/Program.cs")),
            Path::new("/src/shop/Program.cs")
        );
        assert_eq!(
            display_path(root, Path::new("/elsewhere/A.cs")),
            Path::new("/elsewhere/A.cs")
        );
    }
}
