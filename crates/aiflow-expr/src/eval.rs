use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::ast::{BinaryOp, Builtin, Expr};
use crate::error::Result;
use crate::parser::parse_expression;
use crate::render::expression_with_values;
use crate::value::{compare, loose_eq, to_text, truthy, Ordered};

/// The object a condition is evaluated against.
///
/// Built by the router as `{context, output, agentId, user}`; the studio may
/// also wrap an arbitrary JSON document with [`EvalScope::from_value`].
#[derive(Debug, Clone, Default)]
pub struct EvalScope {
    root: Value,
}

impl EvalScope {
    pub fn new(context: &Map<String, Value>, output: Option<&Value>, agent_id: Option<&str>) -> Self {
        let mut root = Map::new();
        root.insert("context".into(), Value::Object(context.clone()));
        if let Some(output) = output {
            root.insert("output".into(), output.clone());
        }
        if let Some(agent_id) = agent_id {
            root.insert("agentId".into(), Value::String(agent_id.to_string()));
        }
        if let Some(user) = context.get("user") {
            root.insert("user".into(), user.clone());
        }
        Self {
            root: Value::Object(root),
        }
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Resolve a dotted path. The first segment is looked up in `output`,
    /// then `context`, then the scope object itself; `None` is `undefined`.
    pub fn resolve(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let rest: Vec<&str> = segments.collect();

        let in_section = |name: &str| {
            self.root
                .get(name)
                .and_then(Value::as_object)
                .and_then(|section| section.get(first))
        };
        let start = in_section("output")
            .or_else(|| in_section("context"))
            .or_else(|| self.root.as_object().and_then(|root| root.get(first)))?;

        descend(start, &rest)
    }
}

fn descend<'v>(start: &'v Value, segments: &[&str]) -> Option<&'v Value> {
    let mut cur = start;
    for segment in segments {
        cur = match cur {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Literal,
    Field,
    Unary,
    Binary,
    Array,
    Call,
}

/// Evaluated mirror of an expression node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceNode {
    pub kind: NodeKind,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    /// Resolved value; absent when the node evaluated to `undefined`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TraceNode>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub short_circuited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Parenthesis pairs written around the node.
    #[serde(skip_serializing_if = "is_zero")]
    pub parens: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl TraceNode {
    fn leaf(kind: NodeKind, source: &str, value: Option<Value>) -> Self {
        Self {
            kind,
            source: source.to_string(),
            operator: None,
            value,
            children: Vec::new(),
            short_circuited: false,
            error: None,
            parens: 0,
        }
    }
}

/// A field visited during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferencedField {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// How a trace consumer should present a condition result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    True,
    False,
    /// The expression did not produce a boolean.
    Unknown,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::True => "TRUE",
            Self::False => "FALSE",
            Self::Unknown => "UNKNOWN",
        })
    }
}

/// Full record of one condition evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionTrace {
    pub expression: String,
    pub expression_with_values: String,
    /// `Some` only when the root value is a boolean.
    pub result: Option<bool>,
    pub root: TraceNode,
    pub referenced_fields: Vec<ReferencedField>,
}

impl ConditionTrace {
    /// Routing interpretation: only a literal `true` matches.
    pub fn matched(&self) -> bool {
        self.result == Some(true)
    }

    pub fn verdict(&self) -> Verdict {
        match self.result {
            Some(true) => Verdict::True,
            Some(false) => Verdict::False,
            None => Verdict::Unknown,
        }
    }
}

/// Parse and evaluate `expression`, returning the full trace.
pub fn evaluate_with_trace(expression: &str, scope: &EvalScope) -> Result<ConditionTrace> {
    let ast = parse_expression(expression)?;
    Ok(trace_expr(expression, &ast, scope))
}

/// Evaluate an already-parsed expression.
pub fn trace_expr(expression: &str, ast: &Expr, scope: &EvalScope) -> ConditionTrace {
    let mut evaluator = Evaluator {
        scope,
        fields: Vec::new(),
    };
    let root = evaluator.eval(ast);
    let result = match root.value {
        Some(Value::Bool(b)) => Some(b),
        _ => None,
    };
    ConditionTrace {
        expression: expression.to_string(),
        expression_with_values: expression_with_values(&root),
        result,
        root,
        referenced_fields: evaluator.fields,
    }
}

/// Router entry point. Malformed expressions never match.
pub fn matches(expression: &str, scope: &EvalScope) -> bool {
    match evaluate_with_trace(expression, scope) {
        Ok(trace) => trace.matched(),
        Err(e) => {
            warn!(expression, error = %e, "Condition failed to parse, treating as no match");
            false
        }
    }
}

struct Evaluator<'s> {
    scope: &'s EvalScope,
    fields: Vec<ReferencedField>,
}

impl Evaluator<'_> {
    fn eval(&mut self, expr: &Expr) -> TraceNode {
        TraceNode {
            parens: expr.parens(),
            ..self.eval_node(expr)
        }
    }

    fn eval_node(&mut self, expr: &Expr) -> TraceNode {
        match expr {
            Expr::Literal { value, source, .. } => {
                TraceNode::leaf(NodeKind::Literal, source, Some(value.clone()))
            }
            Expr::Field { path, source, .. } => {
                let value = self.scope.resolve(path).cloned();
                self.fields.push(ReferencedField {
                    path: path.clone(),
                    value: value.clone(),
                });
                TraceNode::leaf(NodeKind::Field, source, value)
            }
            Expr::Array { elements, source, .. } => {
                let children: Vec<TraceNode> = elements.iter().map(|e| self.eval(e)).collect();
                let value = Value::Array(
                    children
                        .iter()
                        .map(|c| c.value.clone().unwrap_or(Value::Null))
                        .collect(),
                );
                TraceNode {
                    children,
                    ..TraceNode::leaf(NodeKind::Array, source, Some(value))
                }
            }
            Expr::Unary { operand, source, .. } => {
                let child = self.eval(operand);
                let value = Value::Bool(!truthy(child.value.as_ref()));
                TraceNode {
                    operator: Some("!".into()),
                    children: vec![child],
                    ..TraceNode::leaf(NodeKind::Unary, source, Some(value))
                }
            }
            Expr::Binary {
                op,
                left,
                right,
                source,
                ..
            } => self.eval_binary(*op, left, right, source),
            Expr::Call {
                function,
                args,
                source,
                ..
            } => {
                let children: Vec<TraceNode> = args.iter().map(|a| self.eval(a)).collect();
                let value = match function {
                    Builtin::Contains => contains(
                        children.first().and_then(|c| c.value.as_ref()),
                        children.get(1).and_then(|c| c.value.as_ref()),
                    ),
                };
                TraceNode {
                    operator: Some(function.name().into()),
                    children,
                    ..TraceNode::leaf(NodeKind::Call, source, Some(Value::Bool(value)))
                }
            }
        }
    }

    fn eval_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, source: &str) -> TraceNode {
        let left = self.eval(left);

        let short = match (op, &left.value) {
            (BinaryOp::And, Some(Value::Bool(false))) => Some(false),
            (BinaryOp::Or, Some(Value::Bool(true))) => Some(true),
            _ => None,
        };
        if let Some(value) = short {
            return TraceNode {
                operator: Some(op.symbol().into()),
                children: vec![left],
                short_circuited: true,
                ..TraceNode::leaf(NodeKind::Binary, source, Some(Value::Bool(value)))
            };
        }

        let right = self.eval(right);
        let (l, r) = (left.value.as_ref(), right.value.as_ref());
        let mut error = None;
        let value = match op {
            BinaryOp::And => truthy(l) && truthy(r),
            BinaryOp::Or => truthy(l) || truthy(r),
            BinaryOp::Eq => loose_eq(l, r),
            BinaryOp::Ne => !loose_eq(l, r),
            BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le => match compare(l, r) {
                Ordered::Known(ord) => match op {
                    BinaryOp::Gt => ord == Ordering::Greater,
                    BinaryOp::Ge => ord != Ordering::Less,
                    BinaryOp::Lt => ord == Ordering::Less,
                    _ => ord != Ordering::Greater,
                },
                Ordered::Nan => false,
                Ordered::Incomparable => {
                    error = Some("operands are not comparable".to_string());
                    false
                }
            },
            BinaryOp::In => match r {
                Some(Value::Array(items)) => items.iter().any(|item| loose_eq(l, Some(item))),
                _ => false,
            },
        };

        TraceNode {
            operator: Some(op.symbol().into()),
            children: vec![left, right],
            error,
            ..TraceNode::leaf(NodeKind::Binary, source, Some(Value::Bool(value)))
        }
    }
}

/// `contains(haystack, needle)`: case-insensitive for strings, membership
/// for arrays.
fn contains(haystack: Option<&Value>, needle: Option<&Value>) -> bool {
    match haystack {
        Some(Value::String(s)) => s.to_lowercase().contains(&to_text(needle).to_lowercase()),
        Some(Value::Array(items)) => items.iter().any(|item| match (item, needle) {
            (Value::String(a), Some(Value::String(b))) => a.to_lowercase() == b.to_lowercase(),
            _ => loose_eq(Some(item), needle),
        }),
        _ => false,
    }
}
