use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::Location;

/// Kind of a syntax tree node. Parser backends lower their concrete trees
/// into these variants; anything they don't recognise is made transparent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    CompilationUnit,
    Namespace,
    Using,
    /// class, struct, or record declaration
    Class,
    Interface,
    Enum,
    Method,
    Constructor,
    LocalFunction,
    Field,
    Property,
    /// get / set / init accessor; `ident` holds the keyword
    Accessor,
    ParameterList,
    Parameter,
    Attribute,
    BaseType,
    Block,
    /// Condition expression of an `If`/`ElseIf`
    Condition,
    If,
    /// `if` that is the `else` branch of another `if`
    ElseIf,
    While,
    Do,
    For,
    ForEach,
    Switch,
    /// switch section or switch-expression arm; `text` is "default" for
    /// default/discard cases
    SwitchCase,
    SwitchExpression,
    Try,
    Catch,
    /// `a ? b : c`
    Conditional,
    /// lambda or anonymous method
    Lambda,
    Return,
    /// `ident` is the invoked member name, `text` the full callee expression
    Invocation,
    /// `ident` is the constructed type name
    ObjectCreation,
    Argument,
    /// `ident` is the member name, `text` the full expression
    MemberAccess,
    /// `text` holds the operator
    Assignment,
    VariableDeclarator,
    /// `text` holds the operator
    Binary,
    /// `text` holds the literal including quotes
    StringLiteral,
    InterpolatedString,
    /// numeric, boolean, char, or null literal
    Literal,
    Identifier,
}

impl NodeKind {
    /// Nodes that open a new lexical nesting level for control flow.
    pub fn is_control_flow(&self) -> bool {
        matches!(
            self,
            NodeKind::If
                | NodeKind::While
                | NodeKind::Do
                | NodeKind::For
                | NodeKind::ForEach
                | NodeKind::Switch
                | NodeKind::Try
        )
    }

    /// Nodes whose bodies belong to a separate function.
    pub fn is_function_boundary(&self) -> bool {
        matches!(
            self,
            NodeKind::Method
                | NodeKind::Constructor
                | NodeKind::LocalFunction
                | NodeKind::Lambda
                | NodeKind::Class
                | NodeKind::Interface
        )
    }

    pub fn is_type_declaration(&self) -> bool {
        matches!(
            self,
            NodeKind::Class | NodeKind::Interface | NodeKind::Enum
        )
    }
}

/// Source span, 1-based lines and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

impl Span {
    pub fn new(start_line: usize, start_col: usize, end_line: usize, end_col: usize) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Number of source lines covered, inclusive.
    pub fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    pub fn contains(&self, other: &Span) -> bool {
        (self.start_line, self.start_col) <= (other.start_line, other.start_col)
            && (other.end_line, other.end_col) <= (self.end_line, self.end_col)
    }
}

/// A node of the parser-independent syntax tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub kind: NodeKind,
    pub span: Span,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ident: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Leading documentation comment, markers stripped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<String>,
    /// Attribute names with any namespace qualifier and `Attribute` suffix removed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self {
            kind,
            span,
            ident: None,
            text: None,
            doc: None,
            modifiers: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_ident(mut self, ident: impl Into<String>) -> Self {
        self.ident = Some(ident.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_children(mut self, children: Vec<TreeNode>) -> Self {
        self.children = children;
        self
    }

    pub fn ident(&self) -> &str {
        self.ident.as_deref().unwrap_or("")
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| m == modifier)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    pub fn is_public(&self) -> bool {
        self.has_modifier("public")
    }

    /// No explicit access modifier, or an explicit `private`.
    pub fn is_private(&self) -> bool {
        const ACCESS: [&str; 4] = ["public", "protected", "internal", "file"];
        !self.modifiers.iter().any(|m| ACCESS.contains(&m.as_str()))
    }

    pub fn children_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &TreeNode> {
        self.children.iter().filter(move |c| c.kind == kind)
    }

    pub fn first_child(&self, kind: NodeKind) -> Option<&TreeNode> {
        self.children.iter().find(|c| c.kind == kind)
    }

    /// Body of a function-like node: its `Block` child.
    pub fn body(&self) -> Option<&TreeNode> {
        self.first_child(NodeKind::Block)
    }

    /// Parameters of a function-like node.
    pub fn parameters(&self) -> impl Iterator<Item = &TreeNode> {
        self.first_child(NodeKind::ParameterList)
            .into_iter()
            .flat_map(|list| list.children_of_kind(NodeKind::Parameter))
    }

    /// Names of base types from the declaration's base list.
    pub fn base_types(&self) -> impl Iterator<Item = &str> {
        self.children_of_kind(NodeKind::BaseType).map(|b| b.ident())
    }

    /// Pre-order iterator over this node and all descendants.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    /// Pre-order walk that does not enter nested function boundaries below
    /// this node (the node itself is always visited).
    pub fn walk_within_function<'a>(&'a self, visit: &mut impl FnMut(&'a TreeNode)) {
        visit(self);
        for child in &self.children {
            if child.kind.is_function_boundary() {
                continue;
            }
            child.walk_within_function(visit);
        }
    }

    /// A class that serves HTTP requests through MVC routing: named
    /// `*Controller`, deriving from `Controller`/`ControllerBase`, or marked
    /// `[ApiController]`.
    pub fn is_controller(&self) -> bool {
        self.kind == NodeKind::Class
            && (self.ident().ends_with("Controller")
                || self.has_attribute("ApiController")
                || self
                    .base_types()
                    .any(|b| matches!(b, "Controller" | "ControllerBase")))
    }

    pub fn contains_identifier(&self, name: &str) -> bool {
        self.descendants().any(|n| {
            (n.kind == NodeKind::Identifier && n.ident() == name)
                || (n.kind == NodeKind::MemberAccess && root_identifier(n.text()) == name)
        })
    }
}

/// Leading identifier of a dotted expression: `dto.Name.Length` -> `dto`.
pub fn root_identifier(expr: &str) -> &str {
    let end = expr
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '@'))
        .unwrap_or(expr.len());
    &expr[..end]
}

pub struct Descendants<'a> {
    stack: Vec<&'a TreeNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a TreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// One parsed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceUnit {
    pub path: PathBuf,
    /// Path relative to the scan root, `/`-separated.
    pub relative_path: String,
    pub root: TreeNode,
    pub parse_succeeded: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

impl SourceUnit {
    pub fn failed(path: &Path, relative_path: String, diagnostics: Vec<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            relative_path,
            root: TreeNode::new(NodeKind::CompilationUnit, Span::new(1, 1, 1, 1)),
            parse_succeeded: false,
            diagnostics,
        }
    }

    pub fn location(&self, node: &TreeNode) -> Location {
        Location {
            file: self.path.clone(),
            line: node.span.start_line,
            column: node.span.start_col,
        }
    }

    pub fn file_location(&self) -> Location {
        Location {
            file: self.path.clone(),
            line: 1,
            column: 1,
        }
    }

    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Declared namespace: block-scoped or file-scoped, first one wins.
    pub fn namespace(&self) -> Option<&str> {
        self.root
            .descendants()
            .find(|n| n.kind == NodeKind::Namespace)
            .map(|n| n.ident())
    }

    /// `using` directives anywhere in the unit, in source order.
    pub fn usings(&self) -> impl Iterator<Item = &TreeNode> {
        self.root
            .descendants()
            .filter(|n| n.kind == NodeKind::Using)
    }

    /// Class, interface, and enum declarations, including nested ones.
    pub fn type_declarations(&self) -> impl Iterator<Item = &TreeNode> {
        self.root
            .descendants()
            .filter(|n| n.kind.is_type_declaration())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(kind: NodeKind, line: usize) -> TreeNode {
        TreeNode::new(kind, Span::new(line, 1, line, 10))
    }

    #[test]
    fn test_descendants_preorder() {
        let tree = node(NodeKind::Block, 1).with_children(vec![
            node(NodeKind::If, 2).with_children(vec![node(NodeKind::Return, 3)]),
            node(NodeKind::Return, 4),
        ]);
        let kinds: Vec<_> = tree.descendants().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::Block,
                NodeKind::If,
                NodeKind::Return,
                NodeKind::Return
            ]
        );
    }

    #[test]
    fn test_walk_within_function_skips_lambdas() {
        let tree = node(NodeKind::Block, 1).with_children(vec![
            node(NodeKind::If, 2),
            node(NodeKind::Lambda, 3).with_children(vec![node(NodeKind::If, 4)]),
        ]);
        let mut ifs = 0;
        tree.walk_within_function(&mut |n| {
            if n.kind == NodeKind::If {
                ifs += 1;
            }
        });
        assert_eq!(ifs, 1);
    }

    #[test]
    fn test_privacy_defaults() {
        let mut field = node(NodeKind::Field, 1);
        assert!(field.is_private());
        field.modifiers = vec!["private".into(), "readonly".into()];
        assert!(field.is_private());
        field.modifiers = vec!["protected".into()];
        assert!(!field.is_private());
    }

    #[test]
    fn test_is_controller() {
        let mut class = node(NodeKind::Class, 1).with_ident("OrdersController");
        assert!(class.is_controller());
        class.ident = Some("Orders".into());
        assert!(!class.is_controller());
        class.attributes = vec!["ApiController".into()];
        assert!(class.is_controller());
        class.attributes.clear();
        class.children = vec![node(NodeKind::BaseType, 1).with_ident("ControllerBase")];
        assert!(class.is_controller());
        assert!(!node(NodeKind::Interface, 1).with_ident("IController").is_controller());
    }

    #[test]
    fn test_span_line_count() {
        assert_eq!(Span::new(10, 5, 64, 6).line_count(), 55);
        assert_eq!(Span::new(3, 1, 3, 9).line_count(), 1);
    }

    #[test]
    fn test_root_identifier() {
        assert_eq!(root_identifier("dto.Name.Length"), "dto");
        assert_eq!(root_identifier("id"), "id");
        assert_eq!(root_identifier("_context.Products"), "_context");
    }
}
