use anyhow::{Context, Result};
use regex::Regex;

use codeguard_core::analyzer::Analyzer;
use codeguard_core::config::SecurityConfig;
use codeguard_core::tree::SourceUnit;
use codeguard_core::types::{AnalyzerKind, Category, Finding};

pub mod rules;

pub use rules::{SecurityRule, RULES};

const CATEGORIES: &[Category] = &[
    Category::Secrets,
    Category::SqlInjection,
    Category::Authorization,
    Category::InputValidation,
    Category::Cors,
    Category::PatternViolation,
];

/// What a detector sees: the unit under analysis and the compiled
/// credential-name matcher.
pub struct RuleContext<'a> {
    pub unit: &'a SourceUnit,
    secret_names: &'a Regex,
}

impl RuleContext<'_> {
    /// Whether an identifier names a credential. `cancellationToken` and
    /// friends are not secrets.
    pub fn is_secret_name(&self, name: &str) -> bool {
        !name.is_empty()
            && self.secret_names.is_match(name)
            && !name.to_ascii_lowercase().contains("cancellation")
    }
}

/// Runs the static security rule table over each unit.
pub struct SecurityAnalyzer {
    secret_names: Regex,
}

impl SecurityAnalyzer {
    pub fn new(config: &SecurityConfig) -> Result<Self> {
        let secret_names = Regex::new(&config.secret_name_pattern).with_context(|| {
            format!(
                "invalid security.secret_name_pattern '{}'",
                config.secret_name_pattern
            )
        })?;
        Ok(Self { secret_names })
    }
}

impl Analyzer for SecurityAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Security
    }

    fn categories(&self) -> &[Category] {
        CATEGORIES
    }

    fn analyze_file(&self, unit: &SourceUnit) -> Result<Vec<Finding>> {
        let ctx = RuleContext {
            unit,
            secret_names: &self.secret_names,
        };
        let mut findings = Vec::new();
        for rule in RULES {
            let hits = (rule.detect)(&ctx);
            if !hits.is_empty() {
                tracing::debug!(file = %unit.relative_path, rule = rule.id, hits = hits.len(), "rule matched");
            }
            findings.extend(hits.into_iter().map(|hit| rule.finding(hit)));
        }
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeguard_core::analyzer::SourceParser;
    use codeguard_core::types::{OwaspCategory, Severity};
    use codeguard_csharp::CSharpParser;
    use std::path::Path;

    pub(crate) fn analyze_named(file: &str, source: &str) -> Vec<Finding> {
        let unit = CSharpParser::new()
            .unwrap()
            .parse(Path::new(file), file, source)
            .unwrap();
        assert!(unit.parse_succeeded, "{:?}", unit.diagnostics);
        SecurityAnalyzer::new(&SecurityConfig::default())
            .unwrap()
            .analyze_file(&unit)
            .unwrap()
    }

    fn analyze(source: &str) -> Vec<Finding> {
        analyze_named("Sample.cs", source)
    }

    fn with_rule<'a>(findings: &'a [Finding], rule: &str) -> Vec<&'a Finding> {
        findings.iter().filter(|f| f.rule_id.as_str() == rule).collect()
    }

    #[test]
    fn test_rule_table_is_well_formed() {
        let mut ids: Vec<&str> = RULES.iter().map(|r| r.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), RULES.len());
        assert!(RULES.iter().all(|r| r.id.starts_with("SEC-")));
    }

    #[test]
    fn test_hardcoded_secrets() {
        let findings = analyze(
            r#"
public class Settings
{
    private const string ApiKey = "sk-live-123";
    private string _password = "";
    public string ClientSecret { get; set; } = "shh";

    public void Configure(CancellationToken cancellationToken)
    {
        var token = "abc123";
        var name = "not a secret";
        options.Password = "hunter2";
    }
}
"#,
        );
        let secrets = with_rule(&findings, "SEC-SECRET-001");
        let lines: Vec<usize> = secrets.iter().map(|f| f.location.line).collect();
        assert_eq!(lines, vec![4, 6, 10, 12]);
        let first = secrets[0];
        assert_eq!(first.severity, Severity::High);
        assert_eq!(first.category, Category::Secrets);
        assert_eq!(first.owasp, Some(OwaspCategory::A07AuthenticationFailures));
        assert_eq!(first.cwe.map(|c| c.0), Some(798));
    }

    #[test]
    fn test_connection_string_password() {
        let findings = analyze(
            r#"
public class Db
{
    private readonly string _conn = "Server=db;Database=shop;User Id=sa;Password=P@ss;";
    private readonly string _safe = "Server=db;Database=shop;Integrated Security=true;";
}
"#,
        );
        let hits = with_rule(&findings, "SEC-SECRET-002");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].location.line, 4);
    }

    #[test]
    fn test_custom_secret_pattern() {
        let config = SecurityConfig {
            secret_name_pattern: "(?i)pin".to_string(),
        };
        let unit = CSharpParser::new()
            .unwrap()
            .parse(
                Path::new("A.cs"),
                "A.cs",
                "class A { string Pin = \"1234\"; string Password = \"x\"; }",
            )
            .unwrap();
        let findings = SecurityAnalyzer::new(&config)
            .unwrap()
            .analyze_file(&unit)
            .unwrap();
        assert_eq!(with_rule(&findings, "SEC-SECRET-001").len(), 1);
    }

    #[test]
    fn test_invalid_secret_pattern_is_an_error() {
        let config = SecurityConfig {
            secret_name_pattern: "(unclosed".to_string(),
        };
        assert!(SecurityAnalyzer::new(&config).is_err());
    }
}
