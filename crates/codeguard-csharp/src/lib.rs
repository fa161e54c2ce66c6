use std::ops::ControlFlow;
use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use thiserror::Error;
use tree_sitter::{Language, LanguageError, Node, ParseOptions, ParseState, Parser, Point};

use codeguard_core::analyzer::{ParseCancelled, SourceParser};
use codeguard_core::tree::SourceUnit;

mod lower;

use lower::Lowerer;

/// Number of syntax error positions kept per file.
const MAX_DIAGNOSTICS: usize = 5;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("C# grammar is incompatible with the tree-sitter runtime: {0}")]
    Grammar(#[from] LanguageError),

    #[error("tree-sitter returned no tree for {}", .0.display())]
    NoTree(std::path::PathBuf),
}

/// C# source backend using tree-sitter.
pub struct CSharpParser {
    language: Language,
}

impl CSharpParser {
    pub fn new() -> Result<Self, ParseError> {
        let language: Language = tree_sitter_c_sharp::LANGUAGE.into();
        // Fail early if the grammar ABI does not match the runtime.
        Parser::new().set_language(&language)?;
        Ok(Self { language })
    }
}

impl SourceParser for CSharpParser {
    fn language(&self) -> &'static str {
        "csharp"
    }

    fn file_extensions(&self) -> &[&str] {
        &["cs"]
    }

    fn parse_until(
        &self,
        path: &Path,
        relative_path: &str,
        content: &str,
        deadline: Option<Instant>,
    ) -> Result<SourceUnit> {
        let mut parser = Parser::new();
        parser.set_language(&self.language).map_err(ParseError::from)?;

        let bytes = content.as_bytes();
        let mut read = |offset: usize, _: Point| bytes.get(offset..).unwrap_or_default();
        let mut check_deadline = |_: &ParseState| match deadline {
            Some(d) if Instant::now() >= d => ControlFlow::Break(()),
            _ => ControlFlow::Continue(()),
        };
        let options = ParseOptions::new().progress_callback(&mut check_deadline);
        let tree = match parser.parse_with_options(&mut read, None, Some(options)) {
            Some(tree) => tree,
            None if deadline.is_some_and(|d| Instant::now() >= d) => {
                tracing::debug!(file = relative_path, "parse cancelled at deadline");
                return Err(ParseCancelled.into());
            }
            None => return Err(ParseError::NoTree(path.to_path_buf()).into()),
        };
        let root = tree.root_node();

        let diagnostics = if root.has_error() {
            let mut found = Vec::new();
            collect_errors(root, content, &mut found);
            if found.is_empty() {
                found.push("syntax error".to_string());
            }
            found
        } else {
            Vec::new()
        };
        if !diagnostics.is_empty() {
            tracing::debug!(file = relative_path, errors = diagnostics.len(), "syntax errors");
        }

        Ok(SourceUnit {
            path: path.to_path_buf(),
            relative_path: relative_path.to_string(),
            root: Lowerer::new(content).lower_root(root),
            parse_succeeded: diagnostics.is_empty(),
            diagnostics,
        })
    }
}

fn collect_errors(node: Node, source: &str, found: &mut Vec<String>) {
    if found.len() >= MAX_DIAGNOSTICS {
        return;
    }
    let pos = node.start_position();
    if node.is_missing() {
        found.push(format!(
            "missing `{}` at {}:{}",
            node.kind(),
            pos.row + 1,
            pos.column + 1
        ));
        return;
    }
    if node.is_error() {
        let snippet: String = node
            .utf8_text(source.as_bytes())
            .unwrap_or("")
            .chars()
            .take(40)
            .collect();
        found.push(format!(
            "syntax error at {}:{} near `{}`",
            pos.row + 1,
            pos.column + 1,
            snippet.trim()
        ));
        return;
    }
    if !node.has_error() {
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_errors(child, source, found);
    }
}
