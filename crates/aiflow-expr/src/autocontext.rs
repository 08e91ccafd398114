//! Sample-context synthesis for the condition preview.
//!
//! Walks an expression and writes field values that would make its
//! comparisons and membership tests succeed. Never used during a real run.

use serde_json::{json, Map, Value};

use crate::ast::{BinaryOp, Builtin, Expr};
use crate::parser::parse_expression;
use crate::value::number_value;

/// Build a sample context for `expression`. Unparseable expressions and
/// expressions with no deducible fields get [`fallback_context`].
pub fn build_auto_context(expression: &str) -> Value {
    let Ok(ast) = parse_expression(expression) else {
        return fallback_context();
    };
    let ctx = collect(&ast);
    if ctx.is_empty() {
        fallback_context()
    } else {
        Value::Object(ctx)
    }
}

/// Fixed example fields shown when nothing can be deduced.
pub fn fallback_context() -> Value {
    json!({
        "ticket": {
            "id": "T-1234",
            "priority": "medium",
            "type": "technical",
            "status": "open",
            "channel": "email"
        },
        "customer": {
            "id": "C-42",
            "country": "NL",
            "segment": "pro",
            "language": "nl",
            "age": 21
        },
        "meta": {
            "source": "inbox",
            "environment": "dev"
        }
    })
}

/// Collect sample values from an already-parsed expression.
pub fn collect(ast: &Expr) -> Map<String, Value> {
    let mut ctx = Map::new();
    walk(ast, &mut ctx);
    ctx
}

fn walk(node: &Expr, ctx: &mut Map<String, Value>) {
    match node {
        Expr::Binary {
            op, left, right, ..
        } => {
            sample_binary(*op, left, right, ctx);
            walk(left, ctx);
            walk(right, ctx);
        }
        Expr::Unary { operand, .. } => walk(operand, ctx),
        Expr::Array { elements, .. } => elements.iter().for_each(|e| walk(e, ctx)),
        Expr::Call { function, args, .. } => {
            match function {
                Builtin::Contains => {
                    if let [haystack, needle] = args.as_slice() {
                        if let (Some(path), Some(lit @ Value::String(_))) =
                            (haystack.as_field(), needle.as_literal())
                        {
                            set_path(ctx, path, lit.clone());
                        }
                    }
                }
            }
            args.iter().for_each(|a| walk(a, ctx));
        }
        Expr::Literal { .. } | Expr::Field { .. } => {}
    }
}

fn sample_binary(op: BinaryOp, left: &Expr, right: &Expr, ctx: &mut Map<String, Value>) {
    if op == BinaryOp::In {
        if let (Some(path), Expr::Array { elements, .. }) = (left.as_field(), right) {
            if let Some(first) = elements.first().and_then(Expr::as_literal) {
                set_path(ctx, path, first.clone());
            }
        }
        return;
    }

    // Normalise to `field <op> literal`.
    let (path, op, literal) = match (left.as_field(), right.as_literal()) {
        (Some(path), Some(lit)) => (path, op, lit),
        _ => match (right.as_field(), left.as_literal()) {
            (Some(path), Some(lit)) => (path, op.mirrored(), lit),
            _ => return,
        },
    };

    let sample = match op {
        BinaryOp::Eq => literal.clone(),
        BinaryOp::Ne => different_value(literal),
        BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le => match literal.as_f64() {
            Some(n) if op == BinaryOp::Gt => number_value(n + 1.0),
            Some(n) if op == BinaryOp::Lt => number_value(n - 1.0),
            _ => literal.clone(),
        },
        BinaryOp::And | BinaryOp::Or | BinaryOp::In => return,
    };
    set_path(ctx, path, sample);
}

fn different_value(value: &Value) -> Value {
    match value {
        Value::Bool(b) => Value::Bool(!b),
        Value::Number(n) => n
            .as_f64()
            .map(|f| number_value(f + 1.0))
            .unwrap_or_else(|| Value::from("other")),
        Value::String(s) => Value::String(format!("{s}_other")),
        Value::Null => Value::from("non-null"),
        _ => Value::from("other"),
    }
}

/// Write `value` at a dotted path, creating intermediate objects. Existing
/// leaves and non-object intermediates are left alone.
fn set_path(ctx: &mut Map<String, Value>, path: &str, value: Value) {
    let parts: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = parts.split_last() else {
        return;
    };

    let mut cur = ctx;
    for part in parents {
        let entry = cur
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match entry {
            Value::Object(map) => cur = map,
            _ => return,
        }
    }
    cur.entry(last.to_string()).or_insert(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{matches, EvalScope};

    #[test]
    fn test_equality_and_membership() {
        let ctx = build_auto_context("customer.age >= 18 && customer.country in ['NL', 'BE']");
        assert_eq!(ctx, json!({ "customer": { "age": 18, "country": "NL" } }));
    }

    #[test]
    fn test_strict_bounds_and_inequality() {
        let ctx = build_auto_context("score > 0.5 && retries < 3 && tier != 'free' && vip != true");
        assert_eq!(ctx["score"], json!(1.5));
        assert_eq!(ctx["retries"], json!(2));
        assert_eq!(ctx["tier"], json!("free_other"));
        assert_eq!(ctx["vip"], json!(false));
    }

    #[test]
    fn test_literal_on_the_left_is_mirrored() {
        let ctx = build_auto_context("18 < customer.age");
        assert_eq!(ctx, json!({ "customer": { "age": 19 } }));
    }

    #[test]
    fn test_first_writer_wins() {
        let ctx = build_auto_context("status == 'open' || status == 'closed'");
        assert_eq!(ctx, json!({ "status": "open" }));

        // `a` is already a leaf, so `a.b` cannot be written beneath it.
        let ctx = build_auto_context("a == 1 && a.b == 2");
        assert_eq!(ctx, json!({ "a": 1 }));
    }

    #[test]
    fn test_contains_assigns_literal() {
        let ctx = build_auto_context("contains(ticket.subject, 'refund')");
        assert_eq!(ctx, json!({ "ticket": { "subject": "refund" } }));
    }

    #[test]
    fn test_fallback_on_error_or_nothing_to_deduce() {
        assert_eq!(build_auto_context("a == (1"), fallback_context());
        assert_eq!(build_auto_context("a # b"), fallback_context());
        assert_eq!(build_auto_context("flag"), fallback_context());
        assert_eq!(build_auto_context("always"), fallback_context());
    }

    #[test]
    fn test_generated_context_satisfies_expression() {
        let expr = "NOT (user.role == 'blocked') && user.age >= 18 && user.tier in ['gold']";
        let ctx = build_auto_context(expr);
        // Negated comparisons are sampled as written, so only the positive part holds.
        let scope = EvalScope::from_value(ctx);
        assert!(matches("user.age >= 18 && user.tier in ['gold']", &scope));
    }
}
