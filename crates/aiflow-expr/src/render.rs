//! Inline rendering of a trace: the expression with every leaf replaced by
//! its resolved value, e.g. `21 >= 18 && "NL" in ["NL", "BE"]`.

use serde_json::Value;

use crate::eval::{NodeKind, TraceNode};

/// Placeholder for an operand that was never evaluated.
const SKIPPED: &str = "...";

pub fn expression_with_values(node: &TraceNode) -> String {
    let inner = render_inner(node);
    if node.parens == 0 {
        return inner;
    }
    format!("{}{inner}{}", "(".repeat(node.parens), ")".repeat(node.parens))
}

fn render_inner(node: &TraceNode) -> String {
    match node.kind {
        NodeKind::Literal | NodeKind::Field => value_text(node.value.as_ref()),
        NodeKind::Array => format!("[{}]", join(&node.children)),
        NodeKind::Unary => match node.children.first() {
            Some(child) => format!("!{}", expression_with_values(child)),
            None => value_text(node.value.as_ref()),
        },
        NodeKind::Binary => {
            let op = node.operator.as_deref().unwrap_or("?");
            let left = node
                .children
                .first()
                .map(expression_with_values)
                .unwrap_or_else(|| SKIPPED.to_string());
            let right = node
                .children
                .get(1)
                .map(expression_with_values)
                .unwrap_or_else(|| SKIPPED.to_string());
            format!("{left} {op} {right}")
        }
        NodeKind::Call => format!(
            "{}({})",
            node.operator.as_deref().unwrap_or_default(),
            join(&node.children)
        ),
    }
}

fn join(children: &[TraceNode]) -> String {
    children
        .iter()
        .map(expression_with_values)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Compact JSON for a resolved value, `undefined` when unresolved.
pub fn value_text(value: Option<&Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "undefined".into(),
    }
}
