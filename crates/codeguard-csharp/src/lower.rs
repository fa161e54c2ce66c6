//! Lowering from the tree-sitter C# grammar into the parser-independent
//! [`TreeNode`] model. Grammar node kinds without a counterpart are made
//! transparent: their children are lifted into the parent.

use tree_sitter::Node;

use codeguard_core::tree::{NodeKind, Span, TreeNode};

/// Grammar nodes dropped entirely, including their children.
const DROPPED_KINDS: &[&str] = &[
    "comment",
    "modifier",
    "predefined_type",
    "type_parameter_list",
    "type_parameter_constraints_clause",
    "extern_alias_directive",
    "preproc_region",
    "preproc_endregion",
    "preproc_pragma",
];

/// Declarations that can carry a leading `///` documentation comment.
fn documentable(kind: NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Class
            | NodeKind::Interface
            | NodeKind::Enum
            | NodeKind::Method
            | NodeKind::Constructor
            | NodeKind::LocalFunction
            | NodeKind::Property
            | NodeKind::Field
    )
}

pub(crate) struct Lowerer<'s> {
    src: &'s str,
}

impl<'s> Lowerer<'s> {
    pub(crate) fn new(src: &'s str) -> Self {
        Self { src }
    }

    pub(crate) fn lower_root(&self, root: Node) -> TreeNode {
        let mut children = Vec::new();
        self.lower_children(root, &[], &mut children);
        TreeNode::new(NodeKind::CompilationUnit, span(root)).with_children(children)
    }

    fn text(&self, node: Node) -> &'s str {
        node.utf8_text(self.src.as_bytes()).unwrap_or("")
    }

    fn field_text(&self, node: Node, field: &str) -> Option<&'s str> {
        node.child_by_field_name(field).map(|n| self.text(n))
    }

    /// Lower every named child of `node` into `out`, skipping the given
    /// fields. Runs of doc comments attach to the next declaration.
    fn lower_children(&self, node: Node, skip_fields: &[&str], out: &mut Vec<TreeNode>) {
        let skip: Vec<usize> = skip_fields
            .iter()
            .filter_map(|f| node.child_by_field_name(f))
            .map(|n| n.id())
            .collect();

        let mut doc: Vec<&str> = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() == "comment" {
                let text = self.text(child);
                if text.starts_with("///") || text.starts_with("/**") {
                    doc.push(text);
                } else {
                    doc.clear();
                }
                continue;
            }
            if skip.contains(&child.id()) {
                continue;
            }
            let first = out.len();
            self.lower_into(child, out);
            let pending = std::mem::take(&mut doc);
            if pending.is_empty() {
                continue;
            }
            if let Some(decl) = out.get_mut(first) {
                if documentable(decl.kind) {
                    decl.doc = strip_doc(&pending);
                }
            }
        }
    }

    fn lowered_children(&self, node: Node, skip_fields: &[&str]) -> Vec<TreeNode> {
        let mut children = Vec::new();
        self.lower_children(node, skip_fields, &mut children);
        children
    }

    fn lower_field(&self, node: Node, field: &str, out: &mut Vec<TreeNode>) {
        if let Some(child) = node.child_by_field_name(field) {
            self.lower_into(child, out);
        }
    }

    /// A declaration node with its name, modifiers, and attributes filled in.
    fn declaration(&self, kind: NodeKind, node: Node, skip_fields: &[&str]) -> TreeNode {
        let mut decl = TreeNode::new(kind, span(node));
        decl.ident = self.field_text(node, "name").map(str::to_string);
        decl.text = self
            .field_text(node, "type")
            .or_else(|| self.field_text(node, "returns"))
            .map(str::to_string);
        decl.modifiers = self.modifiers(node);
        decl.attributes = self.attributes(node);
        decl.children = self.lowered_children(node, skip_fields);
        decl
    }

    fn lower_into(&self, node: Node, out: &mut Vec<TreeNode>) {
        let kind = node.kind();
        if DROPPED_KINDS.contains(&kind) {
            return;
        }
        match kind {
            "using_directive" => {
                out.push(
                    TreeNode::new(NodeKind::Using, span(node))
                        .with_ident(using_target(self.text(node))),
                );
            }
            "namespace_declaration" | "file_scoped_namespace_declaration" => {
                let mut ns = TreeNode::new(NodeKind::Namespace, span(node));
                ns.ident = self.field_text(node, "name").map(compact);
                ns.children = self.lowered_children(node, &["name"]);
                out.push(ns);
            }
            "class_declaration"
            | "struct_declaration"
            | "record_declaration"
            | "record_struct_declaration" => {
                out.push(self.declaration(NodeKind::Class, node, &["name"]));
            }
            "interface_declaration" => {
                out.push(self.declaration(NodeKind::Interface, node, &["name"]));
            }
            "enum_declaration" => {
                out.push(self.declaration(NodeKind::Enum, node, &["name", "body"]));
            }
            "method_declaration" => {
                out.push(self.declaration(NodeKind::Method, node, &["name", "returns", "type"]));
            }
            "constructor_declaration" => {
                out.push(self.declaration(NodeKind::Constructor, node, &["name"]));
            }
            "local_function_statement" => {
                out.push(self.declaration(
                    NodeKind::LocalFunction,
                    node,
                    &["name", "returns", "type"],
                ));
            }
            "field_declaration" | "event_field_declaration" => self.lower_field_declaration(node, out),
            "property_declaration" => {
                out.push(self.declaration(NodeKind::Property, node, &["name", "type"]));
            }
            "accessor_declaration" => {
                let mut accessor = TreeNode::new(NodeKind::Accessor, span(node));
                accessor.ident = Some(self.accessor_keyword(node));
                accessor.modifiers = self.modifiers(node);
                accessor.attributes = self.attributes(node);
                accessor.children = self.lowered_children(node, &["name"]);
                out.push(accessor);
            }
            "parameter_list" => {
                out.push(
                    TreeNode::new(NodeKind::ParameterList, span(node))
                        .with_children(self.lowered_children(node, &[])),
                );
            }
            "parameter" => {
                out.push(self.declaration(NodeKind::Parameter, node, &["name", "type"]));
            }
            "attribute" => {
                let name = self.field_text(node, "name").unwrap_or_default();
                out.push(
                    TreeNode::new(NodeKind::Attribute, span(node))
                        .with_ident(attribute_name(name))
                        .with_children(self.lowered_children(node, &["name"])),
                );
            }
            "base_list" => {
                let mut cursor = node.walk();
                for base in node.named_children(&mut cursor) {
                    if base.kind() == "comment" {
                        continue;
                    }
                    out.push(
                        TreeNode::new(NodeKind::BaseType, span(base))
                            .with_ident(simple_type_name(self.text(base))),
                    );
                }
            }
            "block" | "arrow_expression_clause" => {
                out.push(
                    TreeNode::new(NodeKind::Block, span(node))
                        .with_children(self.lowered_children(node, &[])),
                );
            }
            "if_statement" => out.push(self.lower_if(node, NodeKind::If)),
            "while_statement" => out.push(self.simple(NodeKind::While, node)),
            "do_statement" => out.push(self.simple(NodeKind::Do, node)),
            "for_statement" => out.push(self.simple(NodeKind::For, node)),
            "foreach_statement" => {
                out.push(
                    TreeNode::new(NodeKind::ForEach, span(node))
                        .with_children(self.lowered_children(node, &["type", "left"])),
                );
            }
            "switch_statement" => out.push(self.simple(NodeKind::Switch, node)),
            "switch_section" => {
                let mut case = self.simple(NodeKind::SwitchCase, node);
                if self.is_default_section(node) {
                    case.text = Some("default".to_string());
                }
                out.push(case);
            }
            "switch_expression" => out.push(self.simple(NodeKind::SwitchExpression, node)),
            "switch_expression_arm" => {
                let mut arm = self.simple(NodeKind::SwitchCase, node);
                if self.is_discard_arm(node) {
                    arm.text = Some("default".to_string());
                }
                out.push(arm);
            }
            "try_statement" => out.push(self.simple(NodeKind::Try, node)),
            "catch_clause" => out.push(self.simple(NodeKind::Catch, node)),
            "conditional_expression" => out.push(self.simple(NodeKind::Conditional, node)),
            "lambda_expression" | "anonymous_method_expression" => {
                out.push(self.simple(NodeKind::Lambda, node));
            }
            "return_statement" => out.push(self.simple(NodeKind::Return, node)),
            "invocation_expression" => {
                let callee = node.child_by_field_name("function");
                let mut call = TreeNode::new(NodeKind::Invocation, span(node));
                call.text = callee.map(|c| compact(self.text(c)));
                call.ident = callee.map(|c| self.member_name(c));
                call.children = self.lowered_children(node, &[]);
                out.push(call);
            }
            "object_creation_expression" => {
                let mut creation = TreeNode::new(NodeKind::ObjectCreation, span(node));
                creation.ident = self.field_text(node, "type").map(simple_type_name);
                creation.children = self.lowered_children(node, &["type"]);
                out.push(creation);
            }
            "argument" => out.push(self.simple(NodeKind::Argument, node)),
            "member_access_expression" | "member_binding_expression" => {
                let mut access = TreeNode::new(NodeKind::MemberAccess, span(node));
                access.ident = self.field_text(node, "name").map(str::to_string);
                access.text = Some(compact(self.text(node)));
                access.children = self.lowered_children(node, &["name"]);
                out.push(access);
            }
            "assignment_expression" => {
                let mut assign = TreeNode::new(NodeKind::Assignment, span(node));
                assign.text = Some(self.operator(node));
                self.lower_field(node, "left", &mut assign.children);
                self.lower_field(node, "right", &mut assign.children);
                out.push(assign);
            }
            "variable_declarator" => {
                let mut decl = TreeNode::new(NodeKind::VariableDeclarator, span(node));
                let name = self.declarator_name(node);
                decl.ident = name.map(|n| self.text(n).to_string());
                let skip = name.map(|n| n.id());
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    if Some(child.id()) != skip {
                        self.lower_into(child, &mut decl.children);
                    }
                }
                out.push(decl);
            }
            "binary_expression" => {
                let mut binary = TreeNode::new(NodeKind::Binary, span(node));
                binary.text = Some(self.operator(node));
                self.lower_field(node, "left", &mut binary.children);
                self.lower_field(node, "right", &mut binary.children);
                out.push(binary);
            }
            "string_literal" | "verbatim_string_literal" | "raw_string_literal" => {
                out.push(TreeNode::new(NodeKind::StringLiteral, span(node)).with_text(self.text(node)));
            }
            "interpolated_string_expression" => {
                out.push(
                    TreeNode::new(NodeKind::InterpolatedString, span(node))
                        .with_text(self.text(node))
                        .with_children(self.lowered_children(node, &[])),
                );
            }
            "character_literal" | "integer_literal" | "real_literal" | "boolean_literal"
            | "null_literal" => {
                out.push(TreeNode::new(NodeKind::Literal, span(node)).with_text(self.text(node)));
            }
            "identifier" => {
                out.push(TreeNode::new(NodeKind::Identifier, span(node)).with_ident(self.text(node)));
            }
            "generic_name" => {
                out.push(
                    TreeNode::new(NodeKind::Identifier, span(node))
                        .with_ident(simple_type_name(self.text(node))),
                );
            }
            _ => self.lower_children(node, &[], out),
        }
    }

    fn simple(&self, kind: NodeKind, node: Node) -> TreeNode {
        TreeNode::new(kind, span(node)).with_children(self.lowered_children(node, &[]))
    }

    /// `if` with its condition wrapped in a `Condition` node. An `if` in
    /// the else branch becomes `ElseIf`.
    fn lower_if(&self, node: Node, kind: NodeKind) -> TreeNode {
        let mut stmt = TreeNode::new(kind, span(node));
        if let Some(condition) = node.child_by_field_name("condition") {
            let mut wrapped = TreeNode::new(NodeKind::Condition, span(condition));
            self.lower_into(condition, &mut wrapped.children);
            stmt.children.push(wrapped);
        }
        self.lower_field(node, "consequence", &mut stmt.children);
        if let Some(mut alternative) = node.child_by_field_name("alternative") {
            if alternative.kind() == "else_clause" {
                if let Some(inner) = alternative.named_child(0) {
                    alternative = inner;
                }
            }
            if alternative.kind() == "if_statement" {
                stmt.children.push(self.lower_if(alternative, NodeKind::ElseIf));
            } else {
                self.lower_into(alternative, &mut stmt.children);
            }
        }
        stmt
    }

    fn lower_field_declaration(&self, node: Node, out: &mut Vec<TreeNode>) {
        let modifiers = self.modifiers(node);
        let attributes = self.attributes(node);
        let mut cursor = node.walk();
        for declaration in node.named_children(&mut cursor) {
            if declaration.kind() != "variable_declaration" {
                continue;
            }
            let type_name = self.field_text(declaration, "type").map(str::to_string);
            let mut inner = declaration.walk();
            for declarator in declaration.named_children(&mut inner) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                let mut field = TreeNode::new(NodeKind::Field, span(declarator));
                let name = self.declarator_name(declarator);
                field.ident = name.map(|n| self.text(n).to_string());
                field.text = type_name.clone();
                field.modifiers = modifiers.clone();
                field.attributes = attributes.clone();
                let skip = name.map(|n| n.id());
                let mut values = declarator.walk();
                for child in declarator.named_children(&mut values) {
                    if Some(child.id()) != skip {
                        self.lower_into(child, &mut field.children);
                    }
                }
                out.push(field);
            }
        }
    }

    fn declarator_name<'t>(&self, declarator: Node<'t>) -> Option<Node<'t>> {
        declarator.child_by_field_name("name").or_else(|| {
            let mut cursor = declarator.walk();
            let found = declarator
                .named_children(&mut cursor)
                .find(|c| c.kind() == "identifier");
            found
        })
    }

    fn modifiers(&self, node: Node) -> Vec<String> {
        let mut cursor = node.walk();
        node.named_children(&mut cursor)
            .filter(|c| c.kind() == "modifier")
            .map(|c| self.text(c).trim().to_string())
            .collect()
    }

    fn attributes(&self, node: Node) -> Vec<String> {
        let mut names = Vec::new();
        let mut cursor = node.walk();
        for list in node.named_children(&mut cursor) {
            if list.kind() != "attribute_list" {
                continue;
            }
            let mut inner = list.walk();
            for attribute in list.named_children(&mut inner) {
                if attribute.kind() != "attribute" {
                    continue;
                }
                if let Some(name) = self.field_text(attribute, "name") {
                    names.push(attribute_name(name));
                }
            }
        }
        names
    }

    fn accessor_keyword(&self, node: Node) -> String {
        if let Some(name) = self.field_text(node, "name") {
            return name.to_string();
        }
        let mut cursor = node.walk();
        let keyword = node
            .children(&mut cursor)
            .map(|c| c.kind())
            .find(|k| matches!(*k, "get" | "set" | "init" | "add" | "remove"));
        keyword.unwrap_or_default().to_string()
    }

    /// Invoked member name of a callee: `_db.Users.FromSqlRaw` -> `FromSqlRaw`.
    fn member_name(&self, callee: Node) -> String {
        match callee.kind() {
            "member_access_expression" | "member_binding_expression" => self
                .field_text(callee, "name")
                .map(simple_type_name)
                .unwrap_or_default(),
            _ => simple_type_name(self.text(callee)),
        }
    }

    fn operator(&self, node: Node) -> String {
        if let Some(op) = node.child_by_field_name("operator") {
            return self.text(op).to_string();
        }
        let left = node.child_by_field_name("left").map(|n| n.end_byte()).unwrap_or(0);
        let mut cursor = node.walk();
        let op = node
            .children(&mut cursor)
            .find(|c| !c.is_named() && c.start_byte() >= left)
            .map(|c| self.text(c).to_string());
        op.unwrap_or_default()
    }

    /// A switch section is a default section when none of its labels is a
    /// `case` label.
    fn is_default_section(&self, node: Node) -> bool {
        let mut cursor = node.walk();
        let has_case = node.children(&mut cursor).any(|c| {
            matches!(
                c.kind(),
                "case" | "case_switch_label" | "case_pattern_switch_label"
            )
        });
        !has_case
    }

    fn is_discard_arm(&self, node: Node) -> bool {
        node.named_child(0)
            .is_some_and(|pattern| pattern.kind() == "discard" || self.text(pattern).trim() == "_")
    }
}

fn span(node: Node) -> Span {
    let start = node.start_position();
    let end = node.end_position();
    Span::new(start.row + 1, start.column + 1, end.row + 1, end.column + 1)
}

/// Remove all whitespace: `System . Linq` -> `System.Linq`.
fn compact(text: &str) -> String {
    text.split_whitespace().collect()
}

/// Namespace or type referenced by a `using` directive, including the
/// `static` and alias forms.
fn using_target(text: &str) -> String {
    let body = text.trim().trim_end_matches(';');
    let target = body.rsplit('=').next().unwrap_or(body);
    let target: String = target
        .split_whitespace()
        .filter(|t| !matches!(*t, "global" | "using" | "static" | "unsafe"))
        .collect();
    match target.find('<') {
        Some(i) => target[..i].to_string(),
        None => target,
    }
}

/// `System.ComponentModel.DataAnnotations.RequiredAttribute` -> `Required`.
fn attribute_name(text: &str) -> String {
    let name = simple_type_name(text);
    match name.strip_suffix("Attribute") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => name,
    }
}

/// Unqualified name without generic arguments or a primary constructor
/// argument list: `Base.IRepository<User>` -> `IRepository`.
fn simple_type_name(text: &str) -> String {
    let text = text.trim();
    let end = text.find(['<', '(']).unwrap_or(text.len());
    let name = text[..end].trim();
    let name = name.rsplit(['.', ':']).next().unwrap_or(name);
    name.trim().to_string()
}

fn strip_doc(lines: &[&str]) -> Option<String> {
    let stripped: Vec<String> = lines
        .iter()
        .flat_map(|comment| comment.lines())
        .map(|line| {
            let line = line.trim();
            let line = line
                .strip_prefix("///")
                .or_else(|| line.strip_prefix("/**"))
                .unwrap_or(line);
            let line = line.strip_suffix("*/").unwrap_or(line);
            line.trim_start_matches('*').trim().to_string()
        })
        .filter(|l| !l.is_empty())
        .collect();
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.join("\n"))
    }
}
