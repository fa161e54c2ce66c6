use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Stable rule identifier, e.g. "QUAL-CC-001".
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub String);

impl RuleId {
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Location in source code
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// Architectural layer in clean/onion architecture.
/// Ordered from innermost (Domain=0) to outermost (Presentation=3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ArchLayer {
    Domain,
    Application,
    Infrastructure,
    Presentation,
}

impl ArchLayer {
    pub const ALL: [ArchLayer; 4] = [
        ArchLayer::Domain,
        ArchLayer::Application,
        ArchLayer::Infrastructure,
        ArchLayer::Presentation,
    ];

    /// Numeric depth: 0 = innermost, 3 = outermost.
    pub fn depth(&self) -> u8 {
        match self {
            ArchLayer::Domain => 0,
            ArchLayer::Application => 1,
            ArchLayer::Infrastructure => 2,
            ArchLayer::Presentation => 3,
        }
    }

    /// Returns true if `self` depending on `other` is a violation
    /// (inner layer depending on outer layer).
    pub fn violates_dependency_on(&self, other: &ArchLayer) -> bool {
        self.depth() < other.depth()
    }

    /// Layers this layer may import, excluding itself.
    pub fn allowed_dependencies(&self) -> &'static [ArchLayer] {
        match self {
            ArchLayer::Domain => &[],
            ArchLayer::Application => &[ArchLayer::Domain],
            ArchLayer::Infrastructure => &[ArchLayer::Domain, ArchLayer::Application],
            ArchLayer::Presentation => &[
                ArchLayer::Domain,
                ArchLayer::Application,
                ArchLayer::Infrastructure,
            ],
        }
    }
}

impl fmt::Display for ArchLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchLayer::Domain => write!(f, "Domain"),
            ArchLayer::Application => write!(f, "Application"),
            ArchLayer::Infrastructure => write!(f, "Infrastructure"),
            ArchLayer::Presentation => write!(f, "Presentation"),
        }
    }
}

/// Severity of a finding. Declared from least to most severe so that the
/// derived ordering gives `Critical > High > Medium > Low > Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// All severities, most severe first.
    pub const DESCENDING: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "low" => Ok(Severity::Low),
            "medium" | "warning" | "warn" => Ok(Severity::Medium),
            "high" | "error" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(anyhow::anyhow!("unknown severity: {s}")),
        }
    }
}

/// Class of issue a finding belongs to. Attached when the finding is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Complexity,
    Naming,
    Documentation,
    Length,
    Parameters,
    Nesting,
    SqlInjection,
    Authorization,
    InputValidation,
    Secrets,
    Cors,
    DependencyViolation,
    PatternViolation,
    ToolFailure,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Complexity => "complexity",
            Category::Naming => "naming",
            Category::Documentation => "documentation",
            Category::Length => "length",
            Category::Parameters => "parameters",
            Category::Nesting => "nesting",
            Category::SqlInjection => "sql-injection",
            Category::Authorization => "authorization",
            Category::InputValidation => "input-validation",
            Category::Secrets => "secrets",
            Category::Cors => "cors",
            Category::DependencyViolation => "dependency-violation",
            Category::PatternViolation => "pattern-violation",
            Category::ToolFailure => "tool-failure",
        };
        write!(f, "{name}")
    }
}

/// OWASP Top 10 (2021) category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwaspCategory {
    #[serde(rename = "A01:2021")]
    A01BrokenAccessControl,
    #[serde(rename = "A02:2021")]
    A02CryptographicFailures,
    #[serde(rename = "A03:2021")]
    A03Injection,
    #[serde(rename = "A04:2021")]
    A04InsecureDesign,
    #[serde(rename = "A05:2021")]
    A05SecurityMisconfiguration,
    #[serde(rename = "A06:2021")]
    A06VulnerableComponents,
    #[serde(rename = "A07:2021")]
    A07AuthenticationFailures,
    #[serde(rename = "A08:2021")]
    A08IntegrityFailures,
    #[serde(rename = "A09:2021")]
    A09LoggingFailures,
    #[serde(rename = "A10:2021")]
    A10ServerSideRequestForgery,
}

impl OwaspCategory {
    /// Short code, e.g. "A01".
    pub fn code(&self) -> &'static str {
        match self {
            OwaspCategory::A01BrokenAccessControl => "A01",
            OwaspCategory::A02CryptographicFailures => "A02",
            OwaspCategory::A03Injection => "A03",
            OwaspCategory::A04InsecureDesign => "A04",
            OwaspCategory::A05SecurityMisconfiguration => "A05",
            OwaspCategory::A06VulnerableComponents => "A06",
            OwaspCategory::A07AuthenticationFailures => "A07",
            OwaspCategory::A08IntegrityFailures => "A08",
            OwaspCategory::A09LoggingFailures => "A09",
            OwaspCategory::A10ServerSideRequestForgery => "A10",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            OwaspCategory::A01BrokenAccessControl => "Broken Access Control",
            OwaspCategory::A02CryptographicFailures => "Cryptographic Failures",
            OwaspCategory::A03Injection => "Injection",
            OwaspCategory::A04InsecureDesign => "Insecure Design",
            OwaspCategory::A05SecurityMisconfiguration => "Security Misconfiguration",
            OwaspCategory::A06VulnerableComponents => "Vulnerable and Outdated Components",
            OwaspCategory::A07AuthenticationFailures => "Identification and Authentication Failures",
            OwaspCategory::A08IntegrityFailures => "Software and Data Integrity Failures",
            OwaspCategory::A09LoggingFailures => "Security Logging and Monitoring Failures",
            OwaspCategory::A10ServerSideRequestForgery => "Server-Side Request Forgery",
        }
    }
}

impl fmt::Display for OwaspCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:2021-{}", self.code(), self.title())
    }
}

/// CWE weakness identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CweId(pub u32);

impl fmt::Display for CweId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CWE-{}", self.0)
    }
}

/// Which part of the suite produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerKind {
    /// Discovery and parsing.
    Corpus,
    Quality,
    Security,
    Architecture,
}

impl AnalyzerKind {
    /// The analyzers that can be skipped from the command line.
    pub const SKIPPABLE: [AnalyzerKind; 3] = [
        AnalyzerKind::Quality,
        AnalyzerKind::Security,
        AnalyzerKind::Architecture,
    ];
}

impl fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalyzerKind::Corpus => write!(f, "corpus"),
            AnalyzerKind::Quality => write!(f, "quality"),
            AnalyzerKind::Security => write!(f, "security"),
            AnalyzerKind::Architecture => write!(f, "architecture"),
        }
    }
}

impl std::str::FromStr for AnalyzerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quality" => Ok(AnalyzerKind::Quality),
            "security" => Ok(AnalyzerKind::Security),
            "architecture" | "arch" => Ok(AnalyzerKind::Architecture),
            _ => Err(anyhow::anyhow!(
                "unknown analyzer: {s} (expected quality, security, or architecture)"
            )),
        }
    }
}

/// One reported issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub rule_id: RuleId,
    pub severity: Severity,
    pub category: Category,
    pub message: String,
    pub location: Location,
    pub analyzer: AnalyzerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owasp: Option<OwaspCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwe: Option<CweId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Finding {
    pub fn new(
        analyzer: AnalyzerKind,
        rule_id: &str,
        severity: Severity,
        category: Category,
        location: Location,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: RuleId::new(rule_id),
            severity,
            category,
            message: message.into(),
            location,
            analyzer,
            owasp: None,
            cwe: None,
            suggestion: None,
        }
    }

    pub fn with_owasp(mut self, owasp: OwaspCategory) -> Self {
        self.owasp = Some(owasp);
        self
    }

    pub fn with_cwe(mut self, cwe: u32) -> Self {
        self.cwe = Some(CweId(cwe));
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Ordering key used to keep reports deterministic.
    pub fn sort_key(&self) -> (&Location, &RuleId, &str) {
        (&self.location, &self.rule_id, &self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arch_layer_depth() {
        assert_eq!(ArchLayer::Domain.depth(), 0);
        assert_eq!(ArchLayer::Application.depth(), 1);
        assert_eq!(ArchLayer::Infrastructure.depth(), 2);
        assert_eq!(ArchLayer::Presentation.depth(), 3);
    }

    #[test]
    fn test_allowed_dependencies_match_direction_rule() {
        for from in ArchLayer::ALL {
            for to in ArchLayer::ALL {
                if from == to {
                    continue;
                }
                let allowed = from.allowed_dependencies().contains(&to);
                assert_eq!(
                    allowed,
                    !from.violates_dependency_on(&to),
                    "{from} -> {to}"
                );
            }
        }
        assert!(ArchLayer::Domain.allowed_dependencies().is_empty());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("critical".parse::<Severity>().unwrap(), Severity::Critical);
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!("error".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!("warn".parse::<Severity>().unwrap(), Severity::Medium);
        assert_eq!("info".parse::<Severity>().unwrap(), Severity::Info);
        assert!("unknown".parse::<Severity>().is_err());
    }

    #[test]
    fn test_owasp_code_and_serialization() {
        let owasp = OwaspCategory::A01BrokenAccessControl;
        assert_eq!(owasp.code(), "A01");
        assert_eq!(serde_json::to_string(&owasp).unwrap(), "\"A01:2021\"");
        assert_eq!(CweId(89).to_string(), "CWE-89");
    }

    #[test]
    fn test_analyzer_kind_parse() {
        assert_eq!(
            "Security".parse::<AnalyzerKind>().unwrap(),
            AnalyzerKind::Security
        );
        assert!("corpus".parse::<AnalyzerKind>().is_err());
    }
}
