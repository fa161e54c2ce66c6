//! Structural pattern checks: entity encapsulation, repository placement,
//! and thin controllers.

use codeguard_core::config::ArchitectureConfig;
use codeguard_core::metrics::FunctionMetrics;
use codeguard_core::tree::{root_identifier, NodeKind, SourceUnit, TreeNode};
use codeguard_core::types::{AnalyzerKind, ArchLayer, Category, Finding, Severity};

/// EF Core and ADO.NET calls that execute SQL or flush a unit of work.
const DATA_ACCESS_CALLS: &[&str] = &[
    "FromSql",
    "FromSqlRaw",
    "FromSqlInterpolated",
    "ExecuteSql",
    "ExecuteSqlAsync",
    "ExecuteSqlRaw",
    "ExecuteSqlRawAsync",
    "ExecuteSqlInterpolated",
    "ExecuteSqlInterpolatedAsync",
    "SqlQuery",
    "SqlQueryRaw",
    "ExecuteReader",
    "ExecuteReaderAsync",
    "ExecuteNonQuery",
    "ExecuteNonQueryAsync",
    "ExecuteScalar",
    "ExecuteScalarAsync",
];

/// Types whose construction inside a controller means it talks to the
/// database itself.
const DATA_ACCESS_TYPES: &[&str] = &["SqlConnection", "SqlCommand", "NpgsqlConnection"];

pub(crate) fn check_unit(
    unit: &SourceUnit,
    layer: Option<ArchLayer>,
    config: &ArchitectureConfig,
    findings: &mut Vec<Finding>,
) {
    for decl in unit.root.descendants() {
        match decl.kind {
            NodeKind::Interface => check_repository_interface(unit, decl, layer, findings),
            NodeKind::Class => {
                check_repository_class(unit, decl, layer, findings);
                if layer == Some(ArchLayer::Domain) {
                    check_entity(unit, decl, findings);
                }
                if decl.is_controller() || layer == Some(ArchLayer::Presentation) {
                    check_controller(unit, decl, config, findings);
                }
            }
            _ => {}
        }
    }
}

fn check_entity(unit: &SourceUnit, class: &TreeNode, findings: &mut Vec<Finding>) {
    if class.has_modifier("static") {
        return;
    }
    for member in &class.children {
        let exposed = match member.kind {
            NodeKind::Property => member.is_public() && has_public_setter(member),
            NodeKind::Field => {
                member.is_public()
                    && !member.has_modifier("readonly")
                    && !member.has_modifier("const")
            }
            _ => false,
        };
        if !exposed {
            continue;
        }
        let what = if member.kind == NodeKind::Field {
            "public mutable field"
        } else {
            "public setter"
        };
        findings.push(
            Finding::new(
                AnalyzerKind::Architecture,
                "ARCH-ENTITY-001",
                Severity::Medium,
                Category::PatternViolation,
                unit.location(member),
                format!(
                    "domain type '{}' exposes a {what} on '{}'",
                    class.ident(),
                    member.ident()
                ),
            )
            .with_suggestion("Change state through methods that enforce the entity's invariants."),
        );
    }
}

/// `set` without a narrowing modifier. `init` accessors are not setters.
fn has_public_setter(property: &TreeNode) -> bool {
    property
        .children_of_kind(NodeKind::Accessor)
        .filter(|a| a.ident() == "set")
        .any(|a| {
            !["private", "protected", "internal"]
                .iter()
                .any(|m| a.has_modifier(m))
        })
}

fn is_repository_interface(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next() == Some('I')
        && chars.next().is_some_and(|c| c.is_ascii_uppercase())
        && name.ends_with("Repository")
}

fn check_repository_interface(
    unit: &SourceUnit,
    iface: &TreeNode,
    layer: Option<ArchLayer>,
    findings: &mut Vec<Finding>,
) {
    let Some(layer) = layer else { return };
    if layer == ArchLayer::Application || !is_repository_interface(iface.ident()) {
        return;
    }
    findings.push(
        Finding::new(
            AnalyzerKind::Architecture,
            "ARCH-REPO-001",
            Severity::High,
            Category::DependencyViolation,
            unit.location(iface),
            format!(
                "repository interface '{}' is declared in the {layer} layer",
                iface.ident()
            ),
        )
        .with_suggestion("Declare repository interfaces in the Application layer."),
    );
}

fn check_repository_class(
    unit: &SourceUnit,
    class: &TreeNode,
    layer: Option<ArchLayer>,
    findings: &mut Vec<Finding>,
) {
    let Some(layer) = layer else { return };
    if layer == ArchLayer::Infrastructure || !class.ident().ends_with("Repository") {
        return;
    }
    findings.push(
        Finding::new(
            AnalyzerKind::Architecture,
            "ARCH-REPO-002",
            Severity::High,
            Category::DependencyViolation,
            unit.location(class),
            format!(
                "repository implementation '{}' is declared in the {layer} layer",
                class.ident()
            ),
        )
        .with_suggestion("Move repository implementations to the Infrastructure layer."),
    );
}

fn check_controller(
    unit: &SourceUnit,
    class: &TreeNode,
    config: &ArchitectureConfig,
    findings: &mut Vec<Finding>,
) {
    for method in class.children_of_kind(NodeKind::Method) {
        let Some(body) = method.body() else { continue };

        if let Some(access) = body.descendants().find(|n| is_data_access(n)) {
            let via = match access.kind {
                NodeKind::ObjectCreation => format!("new {}", access.ident()),
                _ => access.text().to_string(),
            };
            findings.push(
                Finding::new(
                    AnalyzerKind::Architecture,
                    "ARCH-CTRL-001",
                    Severity::Medium,
                    Category::PatternViolation,
                    unit.location(access),
                    format!(
                        "controller method '{}' accesses data directly via {via}",
                        method.ident()
                    ),
                )
                .with_suggestion("Go through an application service or repository interface."),
            );
        }

        let metrics = FunctionMetrics::of(method);
        let decisions = metrics.decision_points();
        if decisions < config.controller_min_decision_points || metrics.body_lines == 0 {
            continue;
        }
        let density = f64::from(decisions) / metrics.body_lines as f64;
        if density > config.controller_max_decision_density {
            findings.push(
                Finding::new(
                    AnalyzerKind::Architecture,
                    "ARCH-CTRL-002",
                    Severity::Medium,
                    Category::PatternViolation,
                    unit.location(method),
                    format!(
                        "controller method '{}' contains business logic: {decisions} decision points in {} lines",
                        method.ident(),
                        metrics.body_lines
                    ),
                )
                .with_suggestion("Move the branching into the Application layer."),
            );
        }
    }
}

/// Whether the receiver names a database context (`_context`, `db`,
/// `ShopDbContext`). `HttpContext` and friends are not.
fn is_context_receiver(name: &str) -> bool {
    let name = name.trim_start_matches('_').to_ascii_lowercase();
    name == "db" || name == "context" || name == "dbcontext" || name.ends_with("dbcontext")
}

fn is_data_access(node: &TreeNode) -> bool {
    match node.kind {
        NodeKind::Invocation => {
            node.ident().starts_with("SaveChanges")
                || DATA_ACCESS_CALLS.contains(&node.ident())
                || is_context_receiver(root_identifier(node.text()))
        }
        NodeKind::MemberAccess => is_context_receiver(root_identifier(node.text())),
        NodeKind::ObjectCreation => {
            node.ident().ends_with("DbContext") || DATA_ACCESS_TYPES.contains(&node.ident())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{analyze, with_rule};

    #[test]
    fn test_entity_public_setters_and_fields() {
        let findings = analyze(&[(
            "Domain/Product.cs",
            r#"namespace Shop.Domain.Entities
{
    public class Product
    {
        public string Name { get; set; }
        public decimal Price { get; private set; }
        public string Sku { get; init; }
        public int Stock;
        public readonly int Version;
        public const int MaxStock = 100;
        internal string Notes { get; set; }
    }
}
"#,
        )]);
        let entity = with_rule(&findings, "ARCH-ENTITY-001");
        let lines: Vec<usize> = entity.iter().map(|f| f.location.line).collect();
        assert_eq!(lines, vec![5, 8]);
        assert!(entity[0].message.contains("public setter on 'Name'"));
        assert!(entity[1].message.contains("public mutable field on 'Stock'"));
        assert_eq!(entity[0].severity, Severity::Medium);
    }

    #[test]
    fn test_entity_rules_only_apply_to_domain() {
        let findings = analyze(&[(
            "Application/OrderDto.cs",
            "namespace Shop.Application.Dtos { public class OrderDto { public int Id { get; set; } } }",
        )]);
        assert!(with_rule(&findings, "ARCH-ENTITY-001").is_empty());
    }

    #[test]
    fn test_repository_placement() {
        let findings = analyze(&[
            (
                "Domain/IOrderRepository.cs",
                "namespace Shop.Domain.Repositories { public interface IOrderRepository { } }",
            ),
            (
                "Application/OrderRepository.cs",
                "namespace Shop.Application.Services { public class OrderRepository { } }",
            ),
            (
                "Application/ICustomerRepository.cs",
                "namespace Shop.Application.Interfaces { public interface ICustomerRepository { } }",
            ),
            (
                "Infrastructure/CustomerRepository.cs",
                "namespace Shop.Infrastructure.Persistence { public class CustomerRepository { } }",
            ),
        ]);
        let interfaces = with_rule(&findings, "ARCH-REPO-001");
        assert_eq!(interfaces.len(), 1);
        assert!(interfaces[0].message.contains("IOrderRepository"));
        assert!(interfaces[0].message.contains("Domain layer"));
        assert_eq!(interfaces[0].severity, Severity::High);
        assert_eq!(interfaces[0].category, Category::DependencyViolation);

        let classes = with_rule(&findings, "ARCH-REPO-002");
        assert_eq!(classes.len(), 1);
        assert!(classes[0].message.contains("OrderRepository"));
        assert!(classes[0].message.contains("Application layer"));
    }

    #[test]
    fn test_controller_data_access() {
        let findings = analyze(&[(
            "Api/ProductsController.cs",
            r#"using Microsoft.AspNetCore.Mvc;
namespace Shop.Api.Controllers
{
    public class ProductsController : ControllerBase
    {
        private readonly ShopDbContext _context;

        public IActionResult Create(Product product)
        {
            _context.Products.Add(product);
            _context.SaveChanges();
            return Ok();
        }

        public IActionResult Me()
        {
            return Ok(HttpContext.User.Identity.Name);
        }
    }
}
"#,
        )]);
        let access = with_rule(&findings, "ARCH-CTRL-001");
        assert_eq!(access.len(), 1);
        assert_eq!(access[0].location.line, 10);
        assert!(access[0].message.contains("'Create'"));
        assert!(access[0].message.contains("_context.Products.Add"));
    }

    #[test]
    fn test_controller_business_logic_density() {
        let findings = analyze(&[(
            "Api/OrdersController.cs",
            r#"namespace Shop.Api.Controllers
{
    public class OrdersController : ControllerBase
    {
        public IActionResult Create(OrderDto dto)
        {
            if (dto == null) return BadRequest();
            if (dto.Total > 1000) dto.Discount = 10;
            if (dto.Items.Count == 0) return BadRequest();
            if (dto.IsVip) dto.Discount += 5;
            return Ok(_service.Place(dto));
        }

        public IActionResult Get(int id)
        {
            if (id <= 0) return BadRequest();
            return Ok(_service.Find(id));
        }
    }
}
"#,
        )]);
        let logic = with_rule(&findings, "ARCH-CTRL-002");
        assert_eq!(logic.len(), 1);
        assert_eq!(logic[0].location.line, 5);
        assert!(logic[0].message.contains("4 decision points in 7 lines"));
        assert!(with_rule(&findings, "ARCH-CTRL-001").is_empty());
    }

    #[test]
    fn test_context_receiver() {
        assert!(is_context_receiver("_context"));
        assert!(is_context_receiver("db"));
        assert!(is_context_receiver("ShopDbContext"));
        assert!(!is_context_receiver("HttpContext"));
        assert!(!is_context_receiver("_orders"));
    }

    #[test]
    fn test_repository_interface_name() {
        assert!(is_repository_interface("IOrderRepository"));
        assert!(is_repository_interface("IRepository"));
        assert!(!is_repository_interface("Repository"));
        assert!(!is_repository_interface("InventoryRepository"));
    }
}
