use serde::{Deserialize, Serialize};

use crate::tree::{NodeKind, TreeNode};

/// Size and shape metrics for one function-like declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionMetrics {
    pub cyclomatic_complexity: u32,
    pub body_lines: usize,
    pub parameter_count: usize,
    pub nesting_depth: usize,
}

impl FunctionMetrics {
    /// Metrics for a method, constructor, or local function node.
    /// Declarations without a body (abstract, interface, extern) report a
    /// complexity of 1 and zero lines.
    pub fn of(function: &TreeNode) -> Self {
        let body = function.body();
        Self {
            cyclomatic_complexity: body.map_or(1, cyclomatic_complexity),
            body_lines: body.map_or(0, |b| b.span.line_count()),
            parameter_count: function.parameters().count(),
            nesting_depth: body.map_or(0, nesting_depth),
        }
    }

    /// Branch points beyond the single straight-line path.
    pub fn decision_points(&self) -> u32 {
        self.cyclomatic_complexity.saturating_sub(1)
    }
}

/// Whether a node adds an independent path through the code.
fn is_decision_point(node: &TreeNode) -> bool {
    match node.kind {
        NodeKind::If
        | NodeKind::ElseIf
        | NodeKind::While
        | NodeKind::Do
        | NodeKind::For
        | NodeKind::ForEach
        | NodeKind::Catch
        | NodeKind::Conditional => true,
        NodeKind::SwitchCase => node.text() != "default",
        _ => false,
    }
}

/// 1 + decision points found under `body`. Nested lambdas, local functions,
/// and nested types are measured separately and do not contribute.
pub fn cyclomatic_complexity(body: &TreeNode) -> u32 {
    let mut complexity = 1;
    body.walk_within_function(&mut |node| {
        if is_decision_point(node) {
            complexity += 1;
        }
    });
    complexity
}

/// Maximum number of control-flow constructs enclosing any node of `body`.
/// An `else if` continues the chain of its parent `if` and does not open a
/// new level.
pub fn nesting_depth(body: &TreeNode) -> usize {
    fn descend(node: &TreeNode, depth: usize) -> usize {
        let mut max = depth;
        for child in &node.children {
            if child.kind.is_function_boundary() {
                continue;
            }
            let child_depth = if child.kind.is_control_flow() {
                depth + 1
            } else {
                depth
            };
            max = max.max(descend(child, child_depth));
        }
        max
    }

    descend(body, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Span;

    fn node(kind: NodeKind) -> TreeNode {
        TreeNode::new(kind, Span::new(1, 1, 1, 1))
    }

    fn nested_ifs(levels: usize) -> TreeNode {
        let mut inner = node(NodeKind::Return);
        for _ in 0..levels {
            inner = node(NodeKind::If).with_children(vec![
                node(NodeKind::Condition),
                node(NodeKind::Block).with_children(vec![inner]),
            ]);
        }
        node(NodeKind::Block).with_children(vec![inner])
    }

    #[test]
    fn test_empty_body_complexity_is_one() {
        assert_eq!(cyclomatic_complexity(&node(NodeKind::Block)), 1);
    }

    #[test]
    fn test_each_independent_if_adds_one() {
        let mut body = node(NodeKind::Block);
        for n in 0..12 {
            assert_eq!(cyclomatic_complexity(&body), 1 + n);
            body.children.push(node(NodeKind::If));
        }
    }

    #[test]
    fn test_default_switch_case_not_counted() {
        let body = node(NodeKind::Block).with_children(vec![node(NodeKind::Switch)
            .with_children(vec![
                node(NodeKind::SwitchCase),
                node(NodeKind::SwitchCase),
                node(NodeKind::SwitchCase).with_text("default"),
            ])]);
        assert_eq!(cyclomatic_complexity(&body), 3);
    }

    #[test]
    fn test_lambda_branches_do_not_count() {
        let body = node(NodeKind::Block).with_children(vec![
            node(NodeKind::If),
            node(NodeKind::Lambda).with_children(vec![node(NodeKind::If), node(NodeKind::If)]),
        ]);
        assert_eq!(cyclomatic_complexity(&body), 2);
    }

    #[test]
    fn test_nesting_depth_equals_levels() {
        for k in 0..6 {
            assert_eq!(nesting_depth(&nested_ifs(k)), k);
        }
    }

    #[test]
    fn test_else_if_chain_is_flat() {
        let chain = node(NodeKind::If).with_children(vec![
            node(NodeKind::Block),
            node(NodeKind::ElseIf).with_children(vec![
                node(NodeKind::Block),
                node(NodeKind::ElseIf).with_children(vec![node(NodeKind::Block)]),
            ]),
        ]);
        let body = node(NodeKind::Block).with_children(vec![chain]);
        assert_eq!(nesting_depth(&body), 1);
        assert_eq!(cyclomatic_complexity(&body), 4);
    }
}
