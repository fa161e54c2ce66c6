//! The security rule table and its detectors.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use codeguard_core::tree::{root_identifier, NodeKind, SourceUnit, TreeNode};
use codeguard_core::types::{AnalyzerKind, Category, Finding, Location, OwaspCategory, Severity};

use crate::RuleContext;

/// A detector match: where, and what to say about it.
pub struct Hit {
    pub location: Location,
    pub message: String,
}

impl Hit {
    fn at(unit: &SourceUnit, node: &TreeNode, message: impl Into<String>) -> Self {
        Self {
            location: unit.location(node),
            message: message.into(),
        }
    }
}

/// One row of the rule table.
pub struct SecurityRule {
    pub id: &'static str,
    pub severity: Severity,
    pub category: Category,
    pub owasp: OwaspCategory,
    pub cwe: u32,
    pub suggestion: &'static str,
    pub detect: fn(&RuleContext) -> Vec<Hit>,
}

impl SecurityRule {
    pub fn finding(&self, hit: Hit) -> Finding {
        Finding::new(
            AnalyzerKind::Security,
            self.id,
            self.severity,
            self.category,
            hit.location,
            hit.message,
        )
        .with_owasp(self.owasp)
        .with_cwe(self.cwe)
        .with_suggestion(self.suggestion)
    }
}

pub static RULES: &[SecurityRule] = &[
    SecurityRule {
        id: "SEC-SECRET-001",
        severity: Severity::High,
        category: Category::Secrets,
        owasp: OwaspCategory::A07AuthenticationFailures,
        cwe: 798,
        suggestion: "Load credentials from configuration, user secrets, or a vault.",
        detect: hardcoded_secrets,
    },
    SecurityRule {
        id: "SEC-SECRET-002",
        severity: Severity::High,
        category: Category::Secrets,
        owasp: OwaspCategory::A07AuthenticationFailures,
        cwe: 798,
        suggestion: "Keep connection strings out of source; read them from configuration.",
        detect: connection_string_credentials,
    },
    SecurityRule {
        id: "SEC-SQL-001",
        severity: Severity::Critical,
        category: Category::SqlInjection,
        owasp: OwaspCategory::A03Injection,
        cwe: 89,
        suggestion: "Use parameterized queries, FromSqlInterpolated, or LINQ.",
        detect: sql_injection,
    },
    SecurityRule {
        id: "SEC-AUTH-001",
        severity: Severity::High,
        category: Category::Authorization,
        owasp: OwaspCategory::A01BrokenAccessControl,
        cwe: 862,
        suggestion: "Add [Authorize] to the action or controller, or [AllowAnonymous] if public by intent.",
        detect: missing_authorization,
    },
    SecurityRule {
        id: "SEC-INPUT-001",
        severity: Severity::Medium,
        category: Category::InputValidation,
        owasp: OwaspCategory::A03Injection,
        cwe: 20,
        suggestion: "Check ModelState.IsValid or validate the parameter before using it.",
        detect: missing_input_validation,
    },
    SecurityRule {
        id: "SEC-LOG-001",
        severity: Severity::Medium,
        category: Category::Secrets,
        owasp: OwaspCategory::A09LoggingFailures,
        cwe: 532,
        suggestion: "Never log credentials; log an identifier or a redacted value instead.",
        detect: sensitive_logging,
    },
    SecurityRule {
        id: "SEC-CORS-001",
        severity: Severity::High,
        category: Category::Cors,
        owasp: OwaspCategory::A05SecurityMisconfiguration,
        cwe: 942,
        suggestion: "Restrict CORS to an explicit list of trusted origins.",
        detect: permissive_cors_origin,
    },
    SecurityRule {
        id: "SEC-CORS-002",
        severity: Severity::Low,
        category: Category::Cors,
        owasp: OwaspCategory::A05SecurityMisconfiguration,
        cwe: 942,
        suggestion: "List the headers and methods the API actually needs.",
        detect: permissive_cors_headers,
    },
    SecurityRule {
        id: "SEC-CSRF-001",
        severity: Severity::Medium,
        category: Category::PatternViolation,
        owasp: OwaspCategory::A01BrokenAccessControl,
        cwe: 352,
        suggestion: "Register anti-forgery services and validate tokens on state-changing endpoints.",
        detect: missing_antiforgery,
    },
];

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

static CONNECTION_PASSWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(^|;)\s*(password|pwd)\s*=\s*[^;\s]+").unwrap());

/// Content of a string literal without prefix and quotes.
fn literal_value(text: &str) -> &str {
    let text = text.strip_suffix("u8").unwrap_or(text);
    text.trim_start_matches(['@', '$']).trim_matches('"')
}

fn non_empty_literal(node: &TreeNode) -> bool {
    node.kind == NodeKind::StringLiteral && !literal_value(node.text()).is_empty()
}

/// Member or variable name on the left of an assignment.
fn assigned_name(target: &TreeNode) -> &str {
    match target.kind {
        NodeKind::Identifier | NodeKind::MemberAccess => target.ident(),
        _ => "",
    }
}

fn hardcoded_secrets(ctx: &RuleContext) -> Vec<Hit> {
    let mut hits = Vec::new();
    for node in ctx.unit.root.descendants() {
        let (name, value) = match node.kind {
            NodeKind::Field | NodeKind::Property | NodeKind::VariableDeclarator => {
                (node.ident(), node.children.iter().find(|c| non_empty_literal(c)))
            }
            NodeKind::Assignment if node.text() == "=" && node.children.len() == 2 => (
                assigned_name(&node.children[0]),
                Some(&node.children[1]).filter(|c| non_empty_literal(c)),
            ),
            _ => continue,
        };
        if value.is_some() && ctx.is_secret_name(name) {
            hits.push(Hit::at(
                ctx.unit,
                node,
                format!("hardcoded secret assigned to '{name}'"),
            ));
        }
    }
    hits
}

fn connection_string_credentials(ctx: &RuleContext) -> Vec<Hit> {
    ctx.unit
        .root
        .descendants()
        .filter(|n| n.kind == NodeKind::StringLiteral)
        .filter(|n| CONNECTION_PASSWORD.is_match(literal_value(n.text())))
        .map(|n| Hit::at(ctx.unit, n, "connection string literal embeds a password"))
        .collect()
}

// ---------------------------------------------------------------------------
// SQL injection
// ---------------------------------------------------------------------------

/// Raw query execution members (EF Core, ADO.NET, Dapper).
const SQL_SINKS: &[&str] = &[
    "FromSqlRaw",
    "ExecuteSqlRaw",
    "ExecuteSqlRawAsync",
    "SqlQueryRaw",
    "ExecuteSqlCommand",
    "ExecuteSqlCommandAsync",
    "Query",
    "QueryAsync",
    "QueryFirst",
    "QueryFirstAsync",
    "QueryFirstOrDefault",
    "QueryFirstOrDefaultAsync",
    "QuerySingle",
    "QuerySingleAsync",
    "QuerySingleOrDefault",
    "QuerySingleOrDefaultAsync",
    "QueryMultiple",
    "QueryMultipleAsync",
    "Execute",
    "ExecuteAsync",
    "ExecuteScalar",
    "ExecuteScalarAsync",
    "ExecuteReader",
    "ExecuteReaderAsync",
];

/// Kinds that open a new taint scope.
fn is_scope(kind: NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Method
            | NodeKind::Constructor
            | NodeKind::LocalFunction
            | NodeKind::Accessor
            | NodeKind::Class
            | NodeKind::Interface
            | NodeKind::Enum
    )
}

/// Nodes of `scope` that do not belong to a nested scope. Lambdas share
/// their enclosing scope.
fn scope_nodes(scope: &TreeNode) -> Vec<&TreeNode> {
    fn collect<'a>(node: &'a TreeNode, out: &mut Vec<&'a TreeNode>) {
        for child in &node.children {
            if is_scope(child.kind) {
                continue;
            }
            out.push(child);
            collect(child, out);
        }
    }
    let mut out = Vec::new();
    collect(scope, &mut out);
    out
}

fn has_string_operand(node: &TreeNode) -> bool {
    node.descendants()
        .any(|n| matches!(n.kind, NodeKind::StringLiteral | NodeKind::InterpolatedString))
}

fn has_value_operand(node: &TreeNode) -> bool {
    node.descendants().any(|n| {
        matches!(
            n.kind,
            NodeKind::Identifier | NodeKind::MemberAccess | NodeKind::Invocation
        )
    })
}

/// Whether an expression builds a query string from runtime values.
fn is_dynamic_string(expr: &TreeNode, tainted: &HashSet<&str>) -> bool {
    match expr.kind {
        NodeKind::Binary if expr.text() == "+" => {
            (has_string_operand(expr) && has_value_operand(expr))
                || expr.children.iter().any(|c| is_dynamic_string(c, tainted))
        }
        NodeKind::InterpolatedString => !expr.children.is_empty(),
        NodeKind::Invocation => {
            let callee = expr.text();
            matches!(expr.ident(), "Format" | "Concat")
                && (callee.starts_with("string.") || callee.starts_with("String."))
        }
        NodeKind::Identifier => tainted.contains(expr.ident()),
        NodeKind::Argument => expr.children.iter().any(|c| is_dynamic_string(c, tainted)),
        _ => false,
    }
}

/// Local names assigned a dynamically built string, iterated to a fixpoint
/// so `a = b + x; c = a;` taints both.
fn tainted_locals<'a>(nodes: &[&'a TreeNode]) -> HashSet<&'a str> {
    let mut tainted: HashSet<&str> = HashSet::new();
    loop {
        let before = tainted.len();
        for node in nodes {
            match node.kind {
                NodeKind::VariableDeclarator => {
                    if node.children.iter().any(|c| is_dynamic_string(c, &tainted)) {
                        tainted.insert(node.ident());
                    }
                }
                NodeKind::Assignment if node.children.len() == 2 => {
                    let target = &node.children[0];
                    let value = &node.children[1];
                    if target.kind != NodeKind::Identifier {
                        continue;
                    }
                    let dynamic = match node.text() {
                        "+=" => has_value_operand(value) || is_dynamic_string(value, &tainted),
                        "=" => is_dynamic_string(value, &tainted),
                        _ => false,
                    };
                    if dynamic {
                        tainted.insert(target.ident());
                    }
                }
                _ => {}
            }
        }
        if tainted.len() == before {
            return tainted;
        }
    }
}

fn sql_injection(ctx: &RuleContext) -> Vec<Hit> {
    let mut hits = Vec::new();
    let scopes = std::iter::once(&ctx.unit.root).chain(ctx.unit.root.descendants().filter(|n| {
        matches!(
            n.kind,
            NodeKind::Method | NodeKind::Constructor | NodeKind::LocalFunction | NodeKind::Accessor
        )
    }));
    for scope in scopes {
        let nodes = scope_nodes(scope);
        let tainted = tainted_locals(&nodes);
        for node in nodes {
            match node.kind {
                NodeKind::Invocation if SQL_SINKS.contains(&node.ident()) => {
                    let dynamic = node
                        .children_of_kind(NodeKind::Argument)
                        .any(|a| is_dynamic_string(a, &tainted));
                    if dynamic {
                        hits.push(Hit::at(
                            ctx.unit,
                            node,
                            format!(
                                "query built from concatenated or interpolated input passed to {}",
                                node.ident()
                            ),
                        ));
                    }
                }
                NodeKind::ObjectCreation if node.ident().ends_with("Command") => {
                    let dynamic = node
                        .children_of_kind(NodeKind::Argument)
                        .next()
                        .is_some_and(|a| is_dynamic_string(a, &tainted));
                    if dynamic {
                        hits.push(Hit::at(
                            ctx.unit,
                            node,
                            format!("{} created with a dynamically built query", node.ident()),
                        ));
                    }
                }
                NodeKind::Assignment if node.children.len() == 2 => {
                    let target = &node.children[0];
                    if target.kind == NodeKind::MemberAccess
                        && target.ident() == "CommandText"
                        && is_dynamic_string(&node.children[1], &tainted)
                    {
                        hits.push(Hit::at(
                            ctx.unit,
                            node,
                            "CommandText assigned a dynamically built query",
                        ));
                    }
                }
                _ => {}
            }
        }
    }
    hits
}

// ---------------------------------------------------------------------------
// Controllers: authorization and input validation
// ---------------------------------------------------------------------------

/// Public instance methods of a controller that routing can reach.
fn actions(class: &TreeNode) -> impl Iterator<Item = &TreeNode> {
    class.children_of_kind(NodeKind::Method).filter(|m| {
        m.is_public() && !m.has_modifier("static") && !m.has_attribute("NonAction")
    })
}

fn controllers(unit: &SourceUnit) -> impl Iterator<Item = &TreeNode> {
    unit.root.descendants().filter(|n| n.is_controller())
}

fn missing_authorization(ctx: &RuleContext) -> Vec<Hit> {
    let mut hits = Vec::new();
    for class in controllers(ctx.unit) {
        if class.has_attribute("Authorize") || class.has_attribute("AllowAnonymous") {
            continue;
        }
        for action in actions(class) {
            if action.has_attribute("Authorize") || action.has_attribute("AllowAnonymous") {
                continue;
            }
            hits.push(Hit::at(
                ctx.unit,
                action,
                format!(
                    "action '{}.{}' has no [Authorize] or [AllowAnonymous]",
                    class.ident(),
                    action.ident()
                ),
            ));
        }
    }
    hits
}

/// Receivers that look like persistence handles: `_context`, `db`,
/// `_userRepository`, `Users` DbSets reached through them.
fn is_data_access_receiver(callee: &str) -> bool {
    let root = root_identifier(callee)
        .trim_start_matches('_')
        .to_ascii_lowercase();
    root == "db"
        || root.ends_with("context")
        || root.contains("repo")
        || root.contains("dbset")
        || root == "connection"
        || root == "conn"
}

fn is_data_access_call(node: &TreeNode) -> bool {
    node.kind == NodeKind::Invocation
        && (is_data_access_receiver(node.text()) || SQL_SINKS.contains(&node.ident()))
}

/// A call or member access that validates input as a whole or a given
/// parameter.
fn is_guard_call(node: &TreeNode) -> bool {
    if node.kind != NodeKind::Invocation {
        return false;
    }
    let name = node.ident();
    name.starts_with("ThrowIf") || name.contains("Validate") || node.text().starts_with("Guard.")
}

fn mentions_model_state(node: &TreeNode) -> bool {
    node.kind == NodeKind::MemberAccess && node.text().contains("ModelState.IsValid")
}

/// Argument expression that is the parameter itself or one of its members.
fn passes_directly(argument: &TreeNode, param: &str) -> bool {
    argument.children.iter().any(|expr| match expr.kind {
        NodeKind::Identifier => expr.ident() == param,
        NodeKind::MemberAccess => root_identifier(expr.text()) == param,
        _ => false,
    })
}

fn missing_input_validation(ctx: &RuleContext) -> Vec<Hit> {
    let mut hits = Vec::new();
    for class in controllers(ctx.unit) {
        for action in actions(class) {
            let Some(body) = action.body() else { continue };
            let params: Vec<&str> = action
                .parameters()
                .filter(|p| !p.text().ends_with("CancellationToken"))
                .map(|p| p.ident())
                .filter(|p| !p.is_empty())
                .collect();
            if params.is_empty() {
                continue;
            }

            let mut guarded: HashSet<&str> = HashSet::new();
            let mut reported: HashSet<&str> = HashSet::new();
            let mut all_guarded = false;
            for node in body.descendants() {
                if all_guarded {
                    break;
                }
                if mentions_model_state(node) {
                    all_guarded = true;
                    continue;
                }
                if node.kind == NodeKind::Condition || is_guard_call(node) {
                    for &p in &params {
                        if node.contains_identifier(p) {
                            guarded.insert(p);
                        }
                    }
                    continue;
                }
                if !is_data_access_call(node) {
                    continue;
                }
                for argument in node.children_of_kind(NodeKind::Argument) {
                    for &p in &params {
                        if guarded.contains(p) || reported.contains(p) {
                            continue;
                        }
                        if passes_directly(argument, p) {
                            reported.insert(p);
                            hits.push(Hit::at(
                                ctx.unit,
                                argument,
                                format!(
                                    "parameter '{p}' of action '{}' reaches {} without validation",
                                    action.ident(),
                                    node.text()
                                ),
                            ));
                        }
                    }
                }
            }
        }
    }
    hits
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

const LOG_LEVEL_METHODS: &[&str] = &[
    "Information",
    "Debug",
    "Warning",
    "Error",
    "Fatal",
    "Verbose",
    "Trace",
    "Info",
    "Warn",
    "Critical",
];

fn is_logging_call(node: &TreeNode) -> bool {
    if node.kind != NodeKind::Invocation {
        return false;
    }
    let name = node.ident();
    let receiver = root_identifier(node.text())
        .trim_start_matches('_')
        .to_ascii_lowercase();
    (name.starts_with("Log") && name != "Login" && name != "Logout")
        || ((receiver == "logger" || receiver == "log") && LOG_LEVEL_METHODS.contains(&name))
}

fn sensitive_logging(ctx: &RuleContext) -> Vec<Hit> {
    let mut hits = Vec::new();
    for call in ctx.unit.root.descendants().filter(|n| is_logging_call(n)) {
        let leaked = call
            .children_of_kind(NodeKind::Argument)
            .flat_map(|a| a.descendants())
            .find(|n| {
                matches!(n.kind, NodeKind::Identifier | NodeKind::MemberAccess)
                    && ctx.is_secret_name(n.ident())
            });
        if let Some(leak) = leaked {
            hits.push(Hit::at(
                ctx.unit,
                call,
                format!("'{}' is written to the log by {}", leak.ident(), call.ident()),
            ));
        }
    }
    hits
}

// ---------------------------------------------------------------------------
// CORS
// ---------------------------------------------------------------------------

fn invocations<'a>(unit: &'a SourceUnit, names: &'a [&str]) -> impl Iterator<Item = &'a TreeNode> {
    unit.root
        .descendants()
        .filter(move |n| n.kind == NodeKind::Invocation && names.contains(&n.ident()))
}

/// `_ => true` style predicate.
fn is_always_true_lambda(node: &TreeNode) -> bool {
    node.kind == NodeKind::Lambda
        && node
            .children
            .last()
            .is_some_and(|body| body.kind == NodeKind::Literal && body.text() == "true")
}

fn permissive_cors_origin(ctx: &RuleContext) -> Vec<Hit> {
    let mut hits = Vec::new();
    for call in invocations(ctx.unit, &["AllowAnyOrigin", "WithOrigins", "SetIsOriginAllowed"]) {
        let args: Vec<&TreeNode> = call.children_of_kind(NodeKind::Argument).collect();
        let permissive = match call.ident() {
            "AllowAnyOrigin" => true,
            "WithOrigins" => args.iter().any(|a| {
                a.children
                    .iter()
                    .any(|c| c.kind == NodeKind::StringLiteral && literal_value(c.text()) == "*")
            }),
            _ => args
                .iter()
                .any(|a| a.descendants().any(is_always_true_lambda)),
        };
        if permissive {
            hits.push(Hit::at(
                ctx.unit,
                call,
                format!("CORS policy accepts any origin via {}", call.ident()),
            ));
        }
    }
    hits
}

fn permissive_cors_headers(ctx: &RuleContext) -> Vec<Hit> {
    invocations(ctx.unit, &["AllowAnyHeader", "AllowAnyMethod"])
        .map(|call| {
            Hit::at(
                ctx.unit,
                call,
                format!("CORS policy is unrestricted via {}", call.ident()),
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// CSRF
// ---------------------------------------------------------------------------

const STATE_CHANGING_REGISTRATIONS: &[&str] = &[
    "AddControllers",
    "AddControllersWithViews",
    "AddMvc",
    "AddRazorPages",
    "MapControllers",
    "MapPost",
    "MapPut",
    "MapPatch",
    "MapDelete",
];

const ANTIFORGERY_WIRING: &[&str] = &["AddAntiforgery", "UseAntiforgery"];

fn is_bootstrap_unit(unit: &SourceUnit) -> bool {
    let file = unit.file_name().to_ascii_lowercase();
    file == "program.cs"
        || file == "startup.cs"
        || unit.root.descendants().any(|n| {
            (n.kind == NodeKind::Invocation && n.ident() == "CreateBuilder")
                || (n.kind == NodeKind::Method && n.ident() == "ConfigureServices")
        })
}

fn has_antiforgery(unit: &SourceUnit) -> bool {
    unit.root.descendants().any(|n| {
        (n.kind == NodeKind::Invocation && ANTIFORGERY_WIRING.contains(&n.ident()))
            || n.ident().contains("AutoValidateAntiforgeryToken")
            || n.ident().contains("ValidateAntiForgeryToken")
    })
}

fn missing_antiforgery(ctx: &RuleContext) -> Vec<Hit> {
    if !is_bootstrap_unit(ctx.unit) || has_antiforgery(ctx.unit) {
        return Vec::new();
    }
    invocations(ctx.unit, STATE_CHANGING_REGISTRATIONS)
        .next()
        .map(|call| {
            Hit::at(
                ctx.unit,
                call,
                format!(
                    "{} registers state-changing endpoints without anti-forgery protection",
                    call.ident()
                ),
            )
        })
        .into_iter()
        .collect()
}
