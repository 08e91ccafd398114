use serde_json::Value;

use crate::ast::{BinaryOp, Builtin, Expr};
use crate::error::{ExprError, Result};
use crate::token::{tokenize, Operator, Token, TokenKind};
use crate::value::number_value;

/// Limit on both parser recursion (groups, brackets, calls, `!`) and the
/// height of the resulting tree. Evaluation and rendering recurse over the
/// tree, so this bounds their stack use too.
pub const MAX_DEPTH: usize = 128;

/// Tokenize and parse an expression string.
pub fn parse_expression(expr: &str) -> Result<Expr> {
    let tokens = tokenize(expr)?;
    parse(&tokens)
}

/// Parse a token stream into an expression tree. The whole stream must be
/// consumed.
pub fn parse(tokens: &[Token]) -> Result<Expr> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(t) => Err(expected("end of expression", t)),
    }
}

fn expected(what: &str, found: &Token) -> ExprError {
    ExprError::Expected {
        expected: what.to_string(),
        found: found.text.clone(),
        position: found.position,
    }
}

fn comparison_op(op: Operator) -> Option<BinaryOp> {
    match op {
        Operator::Eq => Some(BinaryOp::Eq),
        Operator::Ne => Some(BinaryOp::Ne),
        Operator::Gt => Some(BinaryOp::Gt),
        Operator::Ge => Some(BinaryOp::Ge),
        Operator::Lt => Some(BinaryOp::Lt),
        Operator::Le => Some(BinaryOp::Le),
        Operator::In => Some(BinaryOp::In),
        _ => None,
    }
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn advance(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Consume the next token if it has the given kind.
    fn eat(&mut self, kind: TokenKind) -> Option<&'t Token> {
        if self.peek_kind() == Some(kind) {
            self.advance()
        } else {
            None
        }
    }

    fn descend(&mut self, position: usize) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep {
                limit: MAX_DEPTH,
                position,
            });
        }
        Ok(())
    }

    /// Reject nodes whose tree height exceeds the limit.
    fn bounded(&self, expr: Expr, position: usize) -> Result<Expr> {
        if expr.height() > MAX_DEPTH {
            return Err(ExprError::TooDeep {
                limit: MAX_DEPTH,
                position,
            });
        }
        Ok(expr)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<&'t Token> {
        match self.advance() {
            Some(t) if t.kind == kind => Ok(t),
            Some(t) => Err(expected(what, t)),
            None => Err(ExprError::UnexpectedEnd {
                expected: what.to_string(),
            }),
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut node = self.parse_and()?;
        while let Some(op) = self.eat(TokenKind::Op(Operator::Or)) {
            let right = self.parse_and()?;
            node = self.bounded(Expr::binary(BinaryOp::Or, node, right), op.position)?;
        }
        Ok(node)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut node = self.parse_comparison()?;
        while let Some(op) = self.eat(TokenKind::Op(Operator::And)) {
            let right = self.parse_comparison()?;
            node = self.bounded(Expr::binary(BinaryOp::And, node, right), op.position)?;
        }
        Ok(node)
    }

    /// All comparison operators share one precedence level and associate to
    /// the left: `a == b == c` is `(a == b) == c`.
    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut node = self.parse_unary()?;
        while let Some(TokenKind::Op(op)) = self.peek_kind() {
            let Some(op) = comparison_op(op) else { break };
            let position = self.advance().map_or(0, |t| t.position);
            let right = self.parse_unary()?;
            node = self.bounded(Expr::binary(op, node, right), position)?;
        }
        Ok(node)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if let Some(not) = self.eat(TokenKind::Op(Operator::Not)) {
            self.descend(not.position)?;
            let operand = self.parse_unary()?;
            self.depth -= 1;
            return self.bounded(Expr::not(operand), not.position);
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.advance().ok_or_else(|| ExprError::UnexpectedEnd {
            expected: "expression".into(),
        })?;

        match token.kind {
            TokenKind::LParen => {
                self.descend(token.position)?;
                let inner = self.parse_or()?;
                self.expect(TokenKind::RParen, "')'")?;
                self.depth -= 1;
                Ok(inner.parenthesized())
            }
            TokenKind::LBrack => {
                self.descend(token.position)?;
                let array = self.parse_array()?;
                self.depth -= 1;
                self.bounded(array, token.position)
            }
            TokenKind::Number => {
                let n: f64 = token.text.parse().map_err(|_| ExprError::InvalidNumber {
                    text: token.text.clone(),
                    position: token.position,
                })?;
                Ok(Expr::literal(number_value(n), token.text.clone()))
            }
            TokenKind::String => Ok(Expr::literal(
                Value::String(token.text.clone()),
                format!("\"{}\"", token.text),
            )),
            TokenKind::Boolean => Ok(Expr::literal(
                Value::Bool(token.text != "false"),
                token.text.clone(),
            )),
            TokenKind::Null => Ok(Expr::literal(Value::Null, "null")),
            TokenKind::Ident => {
                if self.peek_kind() == Some(TokenKind::LParen) {
                    self.descend(token.position)?;
                    let call = self.parse_call(token)?;
                    self.depth -= 1;
                    self.bounded(call, token.position)
                } else {
                    Ok(Expr::field(token.text.clone()))
                }
            }
            _ => Err(expected("expression", token)),
        }
    }

    fn parse_array(&mut self) -> Result<Expr> {
        let mut elements = Vec::new();
        if self.peek_kind() == Some(TokenKind::RBrack) {
            self.advance();
            return Ok(Expr::array(elements));
        }
        loop {
            elements.push(self.parse_or()?);
            match self.advance() {
                Some(t) if t.kind == TokenKind::Comma => continue,
                Some(t) if t.kind == TokenKind::RBrack => break,
                Some(t) => return Err(expected("',' or ']'", t)),
                None => {
                    return Err(ExprError::UnexpectedEnd {
                        expected: "']'".into(),
                    })
                }
            }
        }
        Ok(Expr::array(elements))
    }

    fn parse_call(&mut self, name: &Token) -> Result<Expr> {
        let function = Builtin::from_name(&name.text).ok_or_else(|| ExprError::UnknownFunction {
            name: name.text.clone(),
        })?;
        self.expect(TokenKind::LParen, "'('")?;

        let mut args = Vec::new();
        if self.peek_kind() == Some(TokenKind::RParen) {
            self.advance();
        } else {
            loop {
                args.push(self.parse_or()?);
                match self.advance() {
                    Some(t) if t.kind == TokenKind::Comma => continue,
                    Some(t) if t.kind == TokenKind::RParen => break,
                    Some(t) => return Err(expected("',' or ')'", t)),
                    None => {
                        return Err(ExprError::UnexpectedEnd {
                            expected: "')'".into(),
                        })
                    }
                }
            }
        }

        if args.len() != function.arity() {
            return Err(ExprError::Arity {
                function: function.name().to_string(),
                expected: function.arity(),
                found: args.len(),
            });
        }
        Ok(Expr::call(function, args))
    }
}
