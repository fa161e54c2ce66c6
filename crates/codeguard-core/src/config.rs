use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::types::{RuleId, Severity};

pub const CONFIG_FILE_NAME: &str = ".codeguard.toml";

/// Top-level configuration from `.codeguard.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub layers: LayersConfig,
    #[serde(default)]
    pub architecture: ArchitectureConfig,
    #[serde(default)]
    pub rules: RulesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Directory names pruned from discovery wherever they appear.
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
    /// Per-file parse timeout in milliseconds; 0 disables it.
    #[serde(default = "default_parse_timeout_ms")]
    pub parse_timeout_ms: u64,
    /// Worker threads; rayon's default when unset.
    #[serde(default)]
    pub jobs: Option<usize>,
}

fn default_exclude_dirs() -> Vec<String> {
    ["bin", "obj", ".git", ".vs", "node_modules", "packages", "TestResults"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_parse_timeout_ms() -> u64 {
    10_000
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            exclude_dirs: default_exclude_dirs(),
            parse_timeout_ms: default_parse_timeout_ms(),
            jobs: None,
        }
    }
}

/// Thresholds for the quality analyzer. A value is flagged when it exceeds
/// the threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default = "default_max_methods")]
    pub max_methods_per_class: usize,
    #[serde(default = "default_max_complexity")]
    pub max_cyclomatic_complexity: u32,
    #[serde(default = "default_max_method_lines")]
    pub max_method_lines: usize,
    #[serde(default = "default_max_parameters")]
    pub max_parameters: usize,
    #[serde(default = "default_max_nesting")]
    pub max_nesting_depth: usize,
    #[serde(default = "default_private_field_prefix")]
    pub private_field_prefix: String,
}

fn default_max_methods() -> usize {
    20
}
fn default_max_complexity() -> u32 {
    10
}
fn default_max_method_lines() -> usize {
    50
}
fn default_max_parameters() -> usize {
    7
}
fn default_max_nesting() -> usize {
    3
}
fn default_private_field_prefix() -> String {
    "_".to_string()
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            max_methods_per_class: default_max_methods(),
            max_cyclomatic_complexity: default_max_complexity(),
            max_method_lines: default_max_method_lines(),
            max_parameters: default_max_parameters(),
            max_nesting_depth: default_max_nesting(),
            private_field_prefix: default_private_field_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Case-insensitive regex for identifiers that hold credentials.
    #[serde(default = "default_secret_pattern")]
    pub secret_name_pattern: String,
}

pub fn default_secret_pattern() -> String {
    "(?i)(password|passwd|pwd|secret|api_?key|token|connection_?string)".to_string()
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            secret_name_pattern: default_secret_pattern(),
        }
    }
}

/// Glob patterns mapping namespaces (dots read as `/`) and file paths to
/// architectural layers. Matching is case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayersConfig {
    #[serde(default = "default_domain_patterns")]
    pub domain: Vec<String>,
    #[serde(default = "default_application_patterns")]
    pub application: Vec<String>,
    #[serde(default = "default_infrastructure_patterns")]
    pub infrastructure: Vec<String>,
    #[serde(default = "default_presentation_patterns")]
    pub presentation: Vec<String>,
    /// Namespace prefixes of framework and third-party code, never checked.
    #[serde(default = "default_external_prefixes")]
    pub external: Vec<String>,
}

fn patterns(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| format!("**/{n}")).collect()
}

fn default_domain_patterns() -> Vec<String> {
    patterns(&["Domain", "Entities", "Models", "ValueObjects"])
}

fn default_application_patterns() -> Vec<String> {
    patterns(&["Application", "Services", "UseCases", "Dtos", "Contracts"])
}

fn default_infrastructure_patterns() -> Vec<String> {
    patterns(&["Infrastructure", "Data", "Persistence", "Repositories"])
}

fn default_presentation_patterns() -> Vec<String> {
    patterns(&["Presentation", "Controllers", "Api", "Web", "Endpoints"])
}

fn default_external_prefixes() -> Vec<String> {
    [
        "System",
        "Microsoft",
        "Newtonsoft",
        "AutoMapper",
        "FluentValidation",
        "MediatR",
        "Serilog",
        "Swashbuckle",
        "Dapper",
        "Npgsql",
        "Xunit",
        "NUnit",
        "Moq",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for LayersConfig {
    fn default() -> Self {
        Self {
            domain: default_domain_patterns(),
            application: default_application_patterns(),
            infrastructure: default_infrastructure_patterns(),
            presentation: default_presentation_patterns(),
            external: default_external_prefixes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchitectureConfig {
    /// Minimum decision points before a controller method is judged on density.
    #[serde(default = "default_controller_min_decisions")]
    pub controller_min_decision_points: u32,
    /// Decision points per body line above which a controller method is flagged.
    #[serde(default = "default_controller_density")]
    pub controller_max_decision_density: f64,
}

fn default_controller_min_decisions() -> u32 {
    3
}
fn default_controller_density() -> f64 {
    0.2
}

impl Default for ArchitectureConfig {
    fn default() -> Self {
        Self {
            controller_min_decision_points: default_controller_min_decisions(),
            controller_max_decision_density: default_controller_density(),
        }
    }
}

/// Rule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Findings at or above this severity fail the run.
    #[serde(default = "default_fail_on")]
    pub fail_on: Severity,
    /// Rule ids whose findings are dropped.
    #[serde(default)]
    pub disabled: Vec<String>,
    /// Per-rule severity overrides.
    #[serde(default)]
    pub severities: HashMap<String, Severity>,
}

fn default_fail_on() -> Severity {
    Severity::High
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            fail_on: default_fail_on(),
            disabled: Vec::new(),
            severities: HashMap::new(),
        }
    }
}

impl RulesConfig {
    pub fn is_disabled(&self, rule: &RuleId) -> bool {
        self.disabled.iter().any(|d| d == rule.as_str())
    }

    pub fn severity_override(&self, rule: &RuleId) -> Option<Severity> {
        self.severities.get(rule.as_str()).copied()
    }
}

impl Config {
    /// Load configuration from a `.codeguard.toml` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let config: Config = toml::from_str(&content).with_context(|| {
            format!(
                "failed to parse '{}'. Run `codeguard init` to create a valid config file",
                path.display()
            )
        })?;
        Ok(config)
    }

    /// Load from `.codeguard.toml` in the given directory or any ancestor, or
    /// return defaults. A config file that exists but fails to parse is an error.
    pub fn discover(dir: &Path) -> Result<Self> {
        let start = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        let mut current = if start.is_file() {
            start.parent().map(Path::to_path_buf).unwrap_or(start)
        } else {
            start
        };
        loop {
            let config_path = current.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                tracing::debug!(path = %config_path.display(), "using config file");
                return Self::load(&config_path);
            }
            if !current.pop() {
                break;
            }
        }
        Ok(Self::default())
    }

    /// Generate default TOML content for `codeguard init`.
    pub fn default_toml() -> String {
        r#"# codeguard - static validation configuration

[project]
exclude_dirs = ["bin", "obj", ".git", ".vs", "node_modules", "packages", "TestResults"]
# Per-file parse timeout in milliseconds (0 disables)
parse_timeout_ms = 10000
# jobs = 4

[quality]
max_methods_per_class = 20
max_cyclomatic_complexity = 10
max_method_lines = 50
max_parameters = 7
max_nesting_depth = 3
private_field_prefix = "_"

[security]
secret_name_pattern = "(?i)(password|passwd|pwd|secret|api_?key|token|connection_?string)"

[layers]
# Glob patterns over namespaces (dots read as '/') and file paths.
# The leftmost matching namespace segment decides the layer.
domain = ["**/Domain", "**/Entities", "**/Models", "**/ValueObjects"]
application = ["**/Application", "**/Services", "**/UseCases", "**/Dtos", "**/Contracts"]
infrastructure = ["**/Infrastructure", "**/Data", "**/Persistence", "**/Repositories"]
presentation = ["**/Presentation", "**/Controllers", "**/Api", "**/Web", "**/Endpoints"]
# Framework and third-party namespace prefixes that are never checked
external = ["System", "Microsoft", "Newtonsoft", "AutoMapper", "FluentValidation", "MediatR", "Serilog", "Swashbuckle", "Dapper", "Npgsql", "Xunit", "NUnit", "Moq"]

[architecture]
controller_min_decision_points = 3
controller_max_decision_density = 0.2

[rules]
# Severity levels: "critical", "high", "medium", "low", "info"
fail_on = "high"
disabled = []

[rules.severities]
# "QUAL-DOC-001" = "low"
"#
        .to_string()
    }
}
