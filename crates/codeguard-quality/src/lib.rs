use anyhow::Result;

use codeguard_core::analyzer::Analyzer;
use codeguard_core::config::QualityConfig;
use codeguard_core::metrics::FunctionMetrics;
use codeguard_core::tree::{NodeKind, SourceUnit, TreeNode};
use codeguard_core::types::{AnalyzerKind, Category, Finding, Severity};

const CATEGORIES: &[Category] = &[
    Category::Complexity,
    Category::Length,
    Category::Parameters,
    Category::Nesting,
    Category::Naming,
    Category::Documentation,
];

/// Per-declaration size, complexity, naming, and documentation checks.
pub struct QualityAnalyzer {
    config: QualityConfig,
}

impl QualityAnalyzer {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    fn finding(
        &self,
        unit: &SourceUnit,
        node: &TreeNode,
        rule: &str,
        severity: Severity,
        category: Category,
        message: String,
    ) -> Finding {
        Finding::new(
            AnalyzerKind::Quality,
            rule,
            severity,
            category,
            unit.location(node),
            message,
        )
    }

    fn check_class(&self, unit: &SourceUnit, class: &TreeNode, findings: &mut Vec<Finding>) {
        let name = class.ident();
        let methods = class.children_of_kind(NodeKind::Method).count();
        if methods > self.config.max_methods_per_class {
            findings.push(
                self.finding(
                    unit,
                    class,
                    "QUAL-SRP-001",
                    Severity::Medium,
                    Category::Complexity,
                    format!(
                        "class '{name}' declares too many methods: {methods}>{}",
                        self.config.max_methods_per_class
                    ),
                )
                .with_suggestion("Split the class along its responsibilities."),
            );
        }
        if !is_pascal_case(name) {
            findings.push(self.finding(
                unit,
                class,
                "QUAL-NAME-001",
                Severity::Low,
                Category::Naming,
                format!("class '{name}' should start with an uppercase letter"),
            ));
        }
        if class.doc.is_none() {
            findings.push(self.finding(
                unit,
                class,
                "QUAL-DOC-001",
                Severity::Info,
                Category::Documentation,
                format!("class '{name}' has no documentation comment"),
            ));
        }
    }

    fn check_method(&self, unit: &SourceUnit, method: &TreeNode, findings: &mut Vec<Finding>) {
        self.check_function_shape(unit, method, findings);

        let name = method.ident();
        if !is_pascal_case(name) {
            findings.push(self.finding(
                unit,
                method,
                "QUAL-NAME-002",
                Severity::Low,
                Category::Naming,
                format!("method '{name}' should start with an uppercase letter"),
            ));
        }
        if method.is_public() && method.doc.is_none() {
            findings.push(self.finding(
                unit,
                method,
                "QUAL-DOC-002",
                Severity::Low,
                Category::Documentation,
                format!("public method '{name}' has no documentation comment"),
            ));
        }
    }

    /// Complexity, length, parameter, and nesting limits. Applies to methods,
    /// constructors, and local functions alike.
    fn check_function_shape(&self, unit: &SourceUnit, method: &TreeNode, findings: &mut Vec<Finding>) {
        let name = method.ident();
        let what = match method.kind {
            NodeKind::Constructor => "constructor",
            NodeKind::LocalFunction => "local function",
            _ => "method",
        };
        let metrics = FunctionMetrics::of(method);
        let cfg = &self.config;

        if metrics.cyclomatic_complexity > cfg.max_cyclomatic_complexity {
            findings.push(
                self.finding(
                    unit,
                    method,
                    "QUAL-CC-001",
                    Severity::Medium,
                    Category::Complexity,
                    format!(
                        "{what} '{name}' has cyclomatic complexity {}>{}",
                        metrics.cyclomatic_complexity, cfg.max_cyclomatic_complexity
                    ),
                )
                .with_suggestion("Extract branches into well-named helper methods."),
            );
        }
        if metrics.body_lines > cfg.max_method_lines {
            findings.push(self.finding(
                unit,
                method,
                "QUAL-LEN-001",
                Severity::Medium,
                Category::Length,
                format!(
                    "{what} '{name}' body spans {}>{} lines",
                    metrics.body_lines, cfg.max_method_lines
                ),
            ));
        }
        if metrics.parameter_count > cfg.max_parameters {
            findings.push(
                self.finding(
                    unit,
                    method,
                    "QUAL-PARAM-001",
                    Severity::Medium,
                    Category::Parameters,
                    format!(
                        "{what} '{name}' takes {}>{} parameters",
                        metrics.parameter_count, cfg.max_parameters
                    ),
                )
                .with_suggestion("Group related parameters into a parameter object."),
            );
        }
        if metrics.nesting_depth > cfg.max_nesting_depth {
            findings.push(
                self.finding(
                    unit,
                    method,
                    "QUAL-NEST-001",
                    Severity::Medium,
                    Category::Nesting,
                    format!(
                        "{what} '{name}' has nesting depth {}>{}",
                        metrics.nesting_depth, cfg.max_nesting_depth
                    ),
                )
                .with_suggestion("Use guard clauses to flatten nested blocks."),
            );
        }
    }

    fn check_property(&self, unit: &SourceUnit, property: &TreeNode, findings: &mut Vec<Finding>) {
        let name = property.ident();
        if !is_pascal_case(name) {
            findings.push(self.finding(
                unit,
                property,
                "QUAL-NAME-003",
                Severity::Low,
                Category::Naming,
                format!("property '{name}' should start with an uppercase letter"),
            ));
        }
    }

    fn check_field(&self, unit: &SourceUnit, field: &TreeNode, findings: &mut Vec<Finding>) {
        if !field.is_private() || field.has_modifier("const") {
            return;
        }
        let name = field.ident();
        let prefix = &self.config.private_field_prefix;
        if !name.is_empty() && !name.starts_with(prefix.as_str()) {
            findings.push(self.finding(
                unit,
                field,
                "QUAL-NAME-004",
                Severity::Low,
                Category::Naming,
                format!("private field '{name}' should start with '{prefix}'"),
            ));
        }
    }
}

impl Analyzer for QualityAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Quality
    }

    fn categories(&self) -> &[Category] {
        CATEGORIES
    }

    fn analyze_file(&self, unit: &SourceUnit) -> Result<Vec<Finding>> {
        let mut findings = Vec::new();
        for node in unit.root.descendants() {
            match node.kind {
                NodeKind::Class => self.check_class(unit, node, &mut findings),
                NodeKind::Method => self.check_method(unit, node, &mut findings),
                NodeKind::Constructor | NodeKind::LocalFunction => {
                    self.check_function_shape(unit, node, &mut findings)
                }
                NodeKind::Property => self.check_property(unit, node, &mut findings),
                NodeKind::Field => self.check_field(unit, node, &mut findings),
                _ => {}
            }
        }
        tracing::debug!(file = %unit.relative_path, count = findings.len(), "quality checks done");
        Ok(findings)
    }
}

/// True when the identifier starts with an uppercase letter. A verbatim `@`
/// prefix is ignored; empty identifiers are not judged.
fn is_pascal_case(name: &str) -> bool {
    let name = name.trim_start_matches('@');
    name.chars().next().is_none_or(char::is_uppercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeguard_core::analyzer::SourceParser;
    use codeguard_csharp::CSharpParser;
    use std::path::Path;

    fn analyze(source: &str) -> Vec<Finding> {
        analyze_with(QualityConfig::default(), source)
    }

    fn analyze_with(config: QualityConfig, source: &str) -> Vec<Finding> {
        let unit = CSharpParser::new()
            .unwrap()
            .parse(Path::new("Sample.cs"), "Sample.cs", source)
            .unwrap();
        assert!(unit.parse_succeeded, "{:?}", unit.diagnostics);
        QualityAnalyzer::new(config).analyze_file(&unit).unwrap()
    }

    fn rules(findings: &[Finding]) -> Vec<&str> {
        let mut ids: Vec<&str> = findings.iter().map(|f| f.rule_id.as_str()).collect();
        ids.sort();
        ids
    }

    /// A documented method declared on line 5 with 4 nested and 7 sequential
    /// ifs (complexity 12, depth 4) padded to a 55-line body.
    fn complex_method_source() -> String {
        let mut body = String::new();
        body.push_str("        int x = 0;\n");
        body.push_str("        if (a > 0) {\n");
        body.push_str("            if (a > 1) {\n");
        body.push_str("                if (a > 2) {\n");
        body.push_str("                    if (a > 3) { x++; }\n");
        body.push_str("                }\n");
        body.push_str("            }\n");
        body.push_str("        }\n");
        for i in 0..7 {
            body.push_str(&format!("        if (a == {i}) x++;\n"));
        }
        // 15 lines so far; 37 more, the return, and both braces make 55
        for _ in 0..37 {
            body.push_str("        x++;\n");
        }
        body.push_str("        return x;\n");
        format!(
            "/// Calculates things.\npublic class Calculator\n{{\n    /// Runs.\n    public int Run(int a)\n    {{\n{body}    }}\n}}\n"
        )
    }

    #[test]
    fn test_complex_method_reports_three_findings() {
        let findings = analyze(&complex_method_source());
        assert_eq!(rules(&findings), vec!["QUAL-CC-001", "QUAL-LEN-001", "QUAL-NEST-001"]);

        let cc = findings.iter().find(|f| f.rule_id.as_str() == "QUAL-CC-001").unwrap();
        assert!(cc.message.contains("complexity 12>10"), "{}", cc.message);
        assert_eq!(cc.category, Category::Complexity);
        let len = findings.iter().find(|f| f.rule_id.as_str() == "QUAL-LEN-001").unwrap();
        assert!(len.message.contains("55>50"), "{}", len.message);
        let nest = findings.iter().find(|f| f.rule_id.as_str() == "QUAL-NEST-001").unwrap();
        assert!(nest.message.contains("4>3"), "{}", nest.message);
        assert!(findings.iter().all(|f| f.severity == Severity::Medium));
        // every finding points at the declaration of Run
        assert!(findings.iter().all(|f| f.location.line == 5), "{findings:?}");
        assert!(findings.iter().all(|f| f.location.file == Path::new("Sample.cs")));
    }

    #[test]
    fn test_attributes_start_the_declaration() {
        let mut ifs = String::new();
        for i in 0..11 {
            ifs.push_str(&format!("        if (a == {i}) a++;\n"));
        }
        let source = format!(
            "/// x\npublic class Legacy\n{{\n    /// Old.\n    [Obsolete]\n    public int Run(int a)\n    {{\n{ifs}        return a;\n    }}\n}}\n"
        );
        let findings = analyze(&source);
        assert_eq!(rules(&findings), vec!["QUAL-CC-001"]);
        assert_eq!(findings[0].location.line, 5);
    }

    #[test]
    fn test_constructor_and_local_function_shape() {
        let mut ifs = String::new();
        for i in 0..12 {
            ifs.push_str(&format!("        if (a == {i}) a++;\n"));
        }
        let source = format!(
            r#"/// x
public class Setup
{{
    /// Builds.
    public Setup(int a)
    {{
{ifs}    }}

    /// Runs.
    public void Run()
    {{
        int Inner(int a, int b, int c, int d, int e, int f, int g, int h) => a;
        Inner(1, 2, 3, 4, 5, 6, 7, 8);
    }}
}}
"#
        );
        let findings = analyze(&source);
        assert_eq!(rules(&findings), vec!["QUAL-CC-001", "QUAL-PARAM-001"]);

        let cc = findings.iter().find(|f| f.rule_id.as_str() == "QUAL-CC-001").unwrap();
        assert_eq!(cc.message, "constructor 'Setup' has cyclomatic complexity 13>10");
        assert_eq!(cc.location.line, 5);
        let params = findings.iter().find(|f| f.rule_id.as_str() == "QUAL-PARAM-001").unwrap();
        assert_eq!(params.message, "local function 'Inner' takes 8>7 parameters");
        assert_eq!(params.location.line, 24);
    }

    #[test]
    fn test_clean_class_has_no_findings() {
        let findings = analyze(
            r#"
/// An order.
public class Order
{
    private readonly int _id;
    private const int MaxLines = 10;

    public string Name { get; set; }

    /// Total.
    public int Total(int a, int b) => a + b;
}
"#,
        );
        assert!(findings.is_empty(), "{findings:?}");
    }

    #[test]
    fn test_naming_rules() {
        let findings = analyze(
            r#"
/// x
public class order
{
    private int count;
    protected int visible;
    public string name { get; set; }
    private void doWork() { }
}
"#,
        );
        assert_eq!(
            rules(&findings),
            vec!["QUAL-NAME-001", "QUAL-NAME-002", "QUAL-NAME-003", "QUAL-NAME-004"]
        );
        assert!(findings
            .iter()
            .all(|f| f.category == Category::Naming && f.severity == Severity::Low));
    }

    #[test]
    fn test_documentation_rules() {
        let findings = analyze(
            r#"
public class Service
{
    public void Run() { }
    private void Helper() { }
}
"#,
        );
        assert_eq!(rules(&findings), vec!["QUAL-DOC-001", "QUAL-DOC-002"]);
        let class_doc = findings.iter().find(|f| f.rule_id.as_str() == "QUAL-DOC-001").unwrap();
        assert_eq!(class_doc.severity, Severity::Info);
    }

    #[test]
    fn test_too_many_parameters_and_methods() {
        let mut methods = String::new();
        for i in 0..21 {
            methods.push_str(&format!("    private void M{i}() {{ }}\n"));
        }
        methods.push_str(
            "    private void Wide(int a, int b, int c, int d, int e, int f, int g, int h) { }\n",
        );
        let source = format!("/// Big.\npublic class Big\n{{\n{methods}}}\n");
        let findings = analyze(&source);
        assert_eq!(rules(&findings), vec!["QUAL-PARAM-001", "QUAL-SRP-001"]);
        let srp = findings.iter().find(|f| f.rule_id.as_str() == "QUAL-SRP-001").unwrap();
        assert!(srp.message.contains("22>20"), "{}", srp.message);
    }

    #[test]
    fn test_thresholds_from_config() {
        let config = QualityConfig {
            max_parameters: 1,
            private_field_prefix: "m_".to_string(),
            ..QualityConfig::default()
        };
        let findings = analyze_with(
            config,
            r#"
/// x
public class Pair
{
    private int m_left;
    private int _right;

    /// Sum.
    public int Sum(int a, int b) => a + b;
}
"#,
        );
        assert_eq!(rules(&findings), vec!["QUAL-NAME-004", "QUAL-PARAM-001"]);
    }

    #[test]
    fn test_pascal_case() {
        assert!(is_pascal_case("Order"));
        assert!(is_pascal_case("@Event"));
        assert!(!is_pascal_case("order"));
        assert!(!is_pascal_case("_order"));
        assert!(is_pascal_case(""));
    }
}
