use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Binary operators, lowest precedence first: `||`, `&&`, then the flat
/// comparison group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::In => "in",
        }
    }

    /// The operator with its operands swapped (`a < b` ≡ `b > a`).
    pub fn mirrored(&self) -> Self {
        match self {
            Self::Gt => Self::Lt,
            Self::Ge => Self::Le,
            Self::Lt => Self::Gt,
            Self::Le => Self::Ge,
            other => *other,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Built-in functions callable from expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Contains,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "contains" => Some(Self::Contains),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Self::Contains => 2,
        }
    }
}

/// Immutable expression tree. Every node keeps the source text it was
/// reconstructed from so traces can display it, and `parens` counts the
/// parenthesis pairs written around it.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal {
        value: Value,
        source: String,
        parens: usize,
    },
    Field {
        path: String,
        source: String,
        parens: usize,
    },
    Unary {
        operand: Box<Expr>,
        source: String,
        parens: usize,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        source: String,
        parens: usize,
    },
    Array {
        elements: Vec<Expr>,
        source: String,
        parens: usize,
    },
    Call {
        function: Builtin,
        args: Vec<Expr>,
        source: String,
        parens: usize,
    },
}

impl Expr {
    pub fn literal(value: Value, source: impl Into<String>) -> Self {
        Self::Literal {
            value,
            source: source.into(),
            parens: 0,
        }
    }

    pub fn field(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::Field {
            source: path.clone(),
            path,
            parens: 0,
        }
    }

    pub fn not(operand: Expr) -> Self {
        let source = format!("!{}", operand.source());
        Self::Unary {
            operand: Box::new(operand),
            source,
            parens: 0,
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        let source = format!("{} {} {}", left.source(), op, right.source());
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            source,
            parens: 0,
        }
    }

    pub fn array(elements: Vec<Expr>) -> Self {
        let source = format!(
            "[{}]",
            elements
                .iter()
                .map(|e| e.source())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Self::Array {
            elements,
            source,
            parens: 0,
        }
    }

    pub fn call(function: Builtin, args: Vec<Expr>) -> Self {
        let source = format!(
            "{}({})",
            function.name(),
            args.iter().map(|a| a.source()).collect::<Vec<_>>().join(", ")
        );
        Self::Call {
            function,
            args,
            source,
            parens: 0,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            Self::Literal { source, .. }
            | Self::Field { source, .. }
            | Self::Unary { source, .. }
            | Self::Binary { source, .. }
            | Self::Array { source, .. }
            | Self::Call { source, .. } => source,
        }
    }

    /// Longest path from this node down to a leaf; leaves are 0.
    pub fn height(&self) -> usize {
        let tallest = |children: &[Expr]| children.iter().map(Expr::height).max().unwrap_or(0);
        match self {
            Self::Literal { .. } | Self::Field { .. } => 0,
            Self::Unary { operand, .. } => operand.height() + 1,
            Self::Binary { left, right, .. } => left.height().max(right.height()) + 1,
            Self::Array { elements, .. } => tallest(elements) + 1,
            Self::Call { args, .. } => tallest(args) + 1,
        }
    }

    /// Number of parenthesis pairs enclosing the node in the source.
    pub fn parens(&self) -> usize {
        match self {
            Self::Literal { parens, .. }
            | Self::Field { parens, .. }
            | Self::Unary { parens, .. }
            | Self::Binary { parens, .. }
            | Self::Array { parens, .. }
            | Self::Call { parens, .. } => *parens,
        }
    }

    /// Record one more pair of parentheses around the node; the tree is
    /// unchanged.
    pub fn parenthesized(mut self) -> Self {
        let wrapped = format!("({})", self.source());
        match &mut self {
            Self::Literal { source, parens, .. }
            | Self::Field { source, parens, .. }
            | Self::Unary { source, parens, .. }
            | Self::Binary { source, parens, .. }
            | Self::Array { source, parens, .. }
            | Self::Call { source, parens, .. } => {
                *source = wrapped;
                *parens += 1;
            }
        }
        self
    }

    pub fn as_field(&self) -> Option<&str> {
        match self {
            Self::Field { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Self::Literal { value, .. } => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source())
    }
}
