use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use thiserror::Error;

use crate::tree::SourceUnit;
use crate::types::{AnalyzerKind, Category, Finding};

/// Trait that each source language backend must implement.
pub trait SourceParser: Send + Sync {
    /// Language name (e.g., "csharp")
    fn language(&self) -> &'static str;

    /// File extensions this parser handles (e.g., &["cs"])
    fn file_extensions(&self) -> &[&str];

    /// Parse a source file into a SourceUnit. Syntax errors produce a unit
    /// with `parse_succeeded == false`; `Err` is reserved for failures of the
    /// parser itself.
    fn parse(&self, path: &Path, relative_path: &str, content: &str) -> Result<SourceUnit> {
        self.parse_until(path, relative_path, content, None)
    }

    /// Like [`parse`](Self::parse), but gives up once `deadline` passes and
    /// returns [`ParseCancelled`].
    fn parse_until(
        &self,
        path: &Path,
        relative_path: &str,
        content: &str,
        deadline: Option<Instant>,
    ) -> Result<SourceUnit>;
}

/// A parse stopped at its deadline.
#[derive(Debug, Error)]
#[error("parse cancelled at its deadline")]
pub struct ParseCancelled;

/// Trait that each analyzer must implement. Per-file work runs on worker
/// threads; corpus work runs once after every file has been parsed.
pub trait Analyzer: Send + Sync {
    fn kind(&self) -> AnalyzerKind;

    /// Categories this analyzer can report, used to render per-class results.
    fn categories(&self) -> &[Category];

    /// Analyze one successfully parsed unit.
    fn analyze_file(&self, _unit: &SourceUnit) -> Result<Vec<Finding>> {
        Ok(Vec::new())
    }

    /// Analyze the whole corpus of successfully parsed units.
    fn analyze_corpus(&self, _units: &[&SourceUnit]) -> Result<Vec<Finding>> {
        Ok(Vec::new())
    }
}
