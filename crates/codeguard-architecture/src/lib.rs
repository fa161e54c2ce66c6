use anyhow::Result;

use codeguard_core::analyzer::Analyzer;
use codeguard_core::config::{ArchitectureConfig, LayersConfig};
use codeguard_core::graph::{DependencyEdge, DependencyGraph};
use codeguard_core::layer::{LayerClassifier, LayerResolution};
use codeguard_core::tree::SourceUnit;
use codeguard_core::types::{AnalyzerKind, ArchLayer, Category, Finding, Severity};

mod structure;

const CATEGORIES: &[Category] = &[Category::DependencyViolation, Category::PatternViolation];

/// A unit placed in the namespace graph.
struct PlacedUnit<'a> {
    unit: &'a SourceUnit,
    /// Graph node name: the declared namespace, or the relative path for
    /// units that declare none.
    node: String,
    layer: Option<ArchLayer>,
}

/// Enforces layer dependency direction and structural patterns over the
/// whole corpus.
pub struct ArchitectureAnalyzer {
    classifier: LayerClassifier,
    config: ArchitectureConfig,
}

impl ArchitectureAnalyzer {
    pub fn new(layers: &LayersConfig, config: ArchitectureConfig) -> Result<Self> {
        Ok(Self {
            classifier: LayerClassifier::new(layers)?,
            config,
        })
    }

    fn place<'a>(&self, unit: &'a SourceUnit) -> PlacedUnit<'a> {
        let namespace = unit.namespace();
        let layer = namespace
            .and_then(|ns| self.classifier.classify_namespace(ns))
            .or_else(|| self.classifier.classify_path(&unit.relative_path));
        PlacedUnit {
            unit,
            node: namespace.unwrap_or(&unit.relative_path).to_string(),
            layer,
        }
    }

    /// Add every `using` of every unit to the graph and report unknown
    /// targets and unclassified units along the way.
    fn build_graph(&self, placed: &[PlacedUnit], findings: &mut Vec<Finding>) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for p in placed {
            graph.ensure_node(&p.node, p.layer);
            if p.layer.is_none() {
                findings.push(
                    Finding::new(
                        AnalyzerKind::Architecture,
                        "ARCH-LAYER-001",
                        Severity::Low,
                        Category::PatternViolation,
                        p.unit.file_location(),
                        format!(
                            "cannot determine the architectural layer of '{}'",
                            p.node
                        ),
                    )
                    .with_suggestion(
                        "Name the namespace or directory after its layer, or add a pattern to [layers].",
                    ),
                );
            }

            for using in p.unit.usings() {
                let target = using.ident();
                if target.is_empty() || target == p.node {
                    continue;
                }
                let to_layer = match self.classifier.resolve_import(target) {
                    LayerResolution::External => continue,
                    LayerResolution::Layer(layer) => Some(layer),
                    LayerResolution::Unknown => {
                        findings.push(Finding::new(
                            AnalyzerKind::Architecture,
                            "ARCH-DEP-002",
                            Severity::Low,
                            Category::PatternViolation,
                            p.unit.location(using),
                            format!("'using {target}' does not resolve to a known layer"),
                        ));
                        None
                    }
                };
                graph.add_dependency(DependencyEdge {
                    from_namespace: p.node.clone(),
                    from_layer: p.layer,
                    to_namespace: target.to_string(),
                    to_layer,
                    location: p.unit.location(using),
                });
            }
        }
        graph
    }
}

impl Analyzer for ArchitectureAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Architecture
    }

    fn categories(&self) -> &[Category] {
        CATEGORIES
    }

    fn analyze_corpus(&self, units: &[&SourceUnit]) -> Result<Vec<Finding>> {
        let mut units = units.to_vec();
        units.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        let placed: Vec<PlacedUnit> = units.iter().map(|u| self.place(u)).collect();

        let mut findings = Vec::new();
        let graph = self.build_graph(&placed, &mut findings);
        tracing::info!(
            namespaces = graph.node_count(),
            dependencies = graph.edge_count(),
            "dependency graph built"
        );

        detect_layer_violations(&graph, &mut findings);
        detect_cycles(&graph, &mut findings);
        for p in &placed {
            structure::check_unit(p.unit, p.layer, &self.config, &mut findings);
        }
        Ok(findings)
    }
}

fn detect_layer_violations(graph: &DependencyGraph, findings: &mut Vec<Finding>) {
    for edge in graph.edges().filter(|e| e.violates_policy()) {
        let (Some(from_layer), Some(to_layer)) = (edge.from_layer, edge.to_layer) else {
            continue;
        };
        findings.push(
            Finding::new(
                AnalyzerKind::Architecture,
                "ARCH-DEP-001",
                Severity::High,
                Category::DependencyViolation,
                edge.location.clone(),
                format!(
                    "{from_layer} layer depends on {to_layer} layer (using {})",
                    edge.to_namespace
                ),
            )
            .with_suggestion(format!(
                "The {from_layer} layer should not depend on the {to_layer} layer. \
                 Introduce an interface in the inner layer and implement it in the outer one."
            )),
        );
    }
}

/// Cycles through an unclassified namespace are not reported.
fn detect_cycles(graph: &DependencyGraph, findings: &mut Vec<Finding>) {
    for cycle in graph.find_cycles() {
        if cycle.iter().any(|n| n.layer.is_none()) {
            continue;
        }
        let Some(edge) = graph.cycle_edge(&cycle) else {
            continue;
        };
        let members = cycle
            .iter()
            .map(|n| n.namespace.as_str())
            .collect::<Vec<_>>()
            .join(" <-> ");
        findings.push(
            Finding::new(
                AnalyzerKind::Architecture,
                "ARCH-DEP-003",
                Severity::Medium,
                Category::DependencyViolation,
                edge.location.clone(),
                format!("circular namespace dependency: {members}"),
            )
            .with_suggestion(
                "Break the cycle by introducing an interface or moving the shared types.",
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeguard_core::analyzer::SourceParser;
    use codeguard_csharp::CSharpParser;
    use std::path::Path;

    pub(crate) fn analyze(files: &[(&str, &str)]) -> Vec<Finding> {
        let parser = CSharpParser::new().unwrap();
        let units: Vec<SourceUnit> = files
            .iter()
            .map(|(rel, src)| {
                let unit = parser.parse(Path::new(rel), rel, src).unwrap();
                assert!(unit.parse_succeeded, "{rel}: {:?}", unit.diagnostics);
                unit
            })
            .collect();
        let refs: Vec<&SourceUnit> = units.iter().collect();
        ArchitectureAnalyzer::new(&LayersConfig::default(), ArchitectureConfig::default())
            .unwrap()
            .analyze_corpus(&refs)
            .unwrap()
    }

    pub(crate) fn with_rule<'a>(findings: &'a [Finding], rule: &str) -> Vec<&'a Finding> {
        findings.iter().filter(|f| f.rule_id.as_str() == rule).collect()
    }

    const ORDER: &str = r#"
namespace Shop.Domain.Entities
{
    public class Order
    {
        public int Id { get; private set; }
        public decimal Total { get; private set; }
    }
}
"#;

    #[test]
    fn test_domain_importing_infrastructure_is_flagged() {
        let findings = analyze(&[
            (
                "Domain/Order.cs",
                r#"using System;
using Shop.Infrastructure.Data;

namespace Shop.Domain.Entities
{
    public class Order { }
}
"#,
            ),
            (
                "Infrastructure/ShopDbContext.cs",
                "namespace Shop.Infrastructure.Data { public class ShopDbContext { } }",
            ),
        ]);
        let deps = with_rule(&findings, "ARCH-DEP-001");
        assert_eq!(deps.len(), 1);
        let dep = deps[0];
        assert_eq!(dep.severity, Severity::High);
        assert_eq!(dep.category, Category::DependencyViolation);
        assert_eq!(dep.location.line, 2);
        assert!(dep.message.contains("Domain layer depends on Infrastructure layer"));
        assert!(dep.message.contains("Shop.Infrastructure.Data"));
    }

    #[test]
    fn test_clean_layering_has_no_dependency_violations() {
        let findings = analyze(&[
            ("Domain/Order.cs", ORDER),
            (
                "Application/IOrderRepository.cs",
                r#"using Shop.Domain.Entities;
namespace Shop.Application.Interfaces
{
    public interface IOrderRepository { Order Find(int id); }
}
"#,
            ),
            (
                "Infrastructure/OrderRepository.cs",
                r#"using Shop.Application.Interfaces;
using Shop.Domain.Entities;
namespace Shop.Infrastructure.Persistence
{
    public class OrderRepository : IOrderRepository
    {
        public Order Find(int id) { return null; }
    }
}
"#,
            ),
            (
                "Api/OrdersController.cs",
                r#"using Microsoft.AspNetCore.Mvc;
using Shop.Application.Interfaces;
namespace Shop.Api.Controllers
{
    public class OrdersController : ControllerBase
    {
        private readonly IOrderRepository _orders;
        public IActionResult Get(int id) { return Ok(_orders.Find(id)); }
    }
}
"#,
            ),
        ]);
        assert!(
            findings.is_empty(),
            "unexpected findings: {:#?}",
            findings
        );
    }

    #[test]
    fn test_unknown_targets_and_unclassified_units() {
        let findings = analyze(&[
            (
                "Order.cs",
                "using Shop.Shared;\nusing System.Linq;\nnamespace Shop { public class Order { } }\n",
            ),
            ("Domain/Order.cs", ORDER),
        ]);
        let unknown = with_rule(&findings, "ARCH-DEP-002");
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].location.line, 1);
        assert_eq!(unknown[0].severity, Severity::Low);

        let unclassified = with_rule(&findings, "ARCH-LAYER-001");
        assert_eq!(unclassified.len(), 1);
        assert_eq!(unclassified[0].location.file, Path::new("Order.cs"));
        assert_eq!(unclassified[0].category, Category::PatternViolation);
    }

    #[test]
    fn test_path_fallback_without_namespace() {
        let findings = analyze(&[(
            "src/Domain/Invoice.cs",
            "using Shop.Infrastructure.Mail;\npublic class Invoice { }\n",
        )]);
        assert_eq!(with_rule(&findings, "ARCH-DEP-001").len(), 1);
        assert!(with_rule(&findings, "ARCH-LAYER-001").is_empty());
    }

    #[test]
    fn test_cycles_between_classified_namespaces() {
        let findings = analyze(&[
            (
                "Application/Orders.cs",
                "using Shop.Application.Billing;\nnamespace Shop.Application.Orders { class A { } }\n",
            ),
            (
                "Application/Billing.cs",
                "using Shop.Application.Orders;\nnamespace Shop.Application.Billing { class B { } }\n",
            ),
        ]);
        let cycles = with_rule(&findings, "ARCH-DEP-003");
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].severity, Severity::Medium);
        assert!(cycles[0]
            .message
            .contains("Shop.Application.Billing <-> Shop.Application.Orders"));
    }

    #[test]
    fn test_cycles_through_unknown_namespaces_are_legal() {
        let findings = analyze(&[
            (
                "Application/Orders.cs",
                "using Shop.Common;\nnamespace Shop.Application.Orders { class A { } }\n",
            ),
            (
                "Common.cs",
                "using Shop.Application.Orders;\nnamespace Shop.Common { class C { } }\n",
            ),
        ]);
        assert!(with_rule(&findings, "ARCH-DEP-003").is_empty());
    }

    #[test]
    fn test_findings_do_not_depend_on_input_order() {
        let a = (
            "Domain/A.cs",
            "using Shop.Infrastructure.X;\nnamespace Shop.Domain { class A { } }\n",
        );
        let b = (
            "Domain/B.cs",
            "using Shop.Presentation.Y;\nnamespace Shop.Domain.B { class B { } }\n",
        );
        let mut first = analyze(&[a, b]);
        let mut second = analyze(&[b, a]);
        first.sort_by(|x, y| x.sort_key().cmp(&y.sort_key()));
        second.sort_by(|x, y| x.sort_key().cmp(&y.sort_key()));
        assert_eq!(first, second);
    }
}
