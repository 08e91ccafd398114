pub mod ast;
pub mod autocontext;
pub mod error;
pub mod eval;
pub mod parser;
pub mod render;
pub mod rewrite;
pub mod token;
pub mod value;

pub use ast::{BinaryOp, Builtin, Expr};
pub use autocontext::{build_auto_context, fallback_context};
pub use error::{ExprError, Result};
pub use eval::{
    evaluate_with_trace, matches, trace_expr, ConditionTrace, EvalScope, NodeKind,
    ReferencedField, TraceNode, Verdict,
};
pub use parser::{parse_expression, MAX_DEPTH};
pub use render::expression_with_values;
pub use rewrite::{auto_rewrite, AutoRewrite, KnownField, RewriteChange};
pub use token::{tokenize, Token, TokenKind};
