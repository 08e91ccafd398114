use std::fmt;

use crate::error::{ExprError, Result};

/// Operator tokens. Keyword spellings (`AND`, `or`, `NOT`, ...) lex to the
/// same variants as their symbolic forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Or,
    And,
    Not,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Not => "!",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::In => "in",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Number,
    String,
    Boolean,
    Null,
    /// Identifier, possibly a dotted field path (`customer.age`).
    Ident,
    Op(Operator),
    LParen,
    RParen,
    LBrack,
    RBrack,
    Comma,
}

/// A lexed token. `text` holds the literal body for strings (without quotes),
/// the canonical symbol for operators, and the source spelling otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Character offset of the token start.
    pub position: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, position: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            position,
        }
    }

    fn op(op: Operator, position: usize) -> Self {
        Self::new(TokenKind::Op(op), op.symbol(), position)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn keyword(ident: &str) -> Option<TokenKind> {
    match ident {
        "true" | "false" | "always" => Some(TokenKind::Boolean),
        "null" => Some(TokenKind::Null),
        "in" => Some(TokenKind::Op(Operator::In)),
        "and" | "AND" => Some(TokenKind::Op(Operator::And)),
        "or" | "OR" => Some(TokenKind::Op(Operator::Or)),
        "not" | "NOT" => Some(TokenKind::Op(Operator::Not)),
        _ => None,
    }
}

/// Turn an expression string into a flat token stream.
pub fn tokenize(expr: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Strings: no escapes, the opening quote must be matched.
        if c == '\'' || c == '"' {
            let start = i;
            i += 1;
            let body_start = i;
            while i < chars.len() && chars[i] != c {
                i += 1;
            }
            if i >= chars.len() {
                return Err(ExprError::UnterminatedString { position: start });
            }
            let body: String = chars[body_start..i].iter().collect();
            tokens.push(Token::new(TokenKind::String, body, start));
            i += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            let mut seen_dot = false;
            while i < chars.len() {
                let d = chars[i];
                if d.is_ascii_digit() {
                    i += 1;
                } else if d == '.' && !seen_dot {
                    seen_dot = true;
                    i += 1;
                } else {
                    break;
                }
            }
            let text: String = chars[start..i].iter().collect();
            if text.parse::<f64>().is_err() {
                return Err(ExprError::InvalidNumber {
                    text,
                    position: start,
                });
            }
            tokens.push(Token::new(TokenKind::Number, text, start));
            continue;
        }

        if is_ident_start(c) {
            let start = i;
            while i < chars.len() && is_ident_char(chars[i]) {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            let token = match keyword(&ident) {
                Some(TokenKind::Op(op)) => Token::op(op, start),
                Some(kind) => Token::new(kind, ident, start),
                None => Token::new(TokenKind::Ident, ident, start),
            };
            tokens.push(token);
            continue;
        }

        let single = match c {
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '[' => Some(TokenKind::LBrack),
            ']' => Some(TokenKind::RBrack),
            ',' => Some(TokenKind::Comma),
            _ => None,
        };
        if let Some(kind) = single {
            tokens.push(Token::new(kind, c.to_string(), i));
            i += 1;
            continue;
        }

        // Two-character operators win over their one-character prefixes.
        let next = chars.get(i + 1).copied();
        let two = match (c, next) {
            ('=', Some('=')) => Some(Operator::Eq),
            ('!', Some('=')) => Some(Operator::Ne),
            ('>', Some('=')) => Some(Operator::Ge),
            ('<', Some('=')) => Some(Operator::Le),
            ('&', Some('&')) => Some(Operator::And),
            ('|', Some('|')) => Some(Operator::Or),
            _ => None,
        };
        if let Some(op) = two {
            tokens.push(Token::op(op, i));
            i += 2;
            continue;
        }

        let one = match c {
            '<' => Some(Operator::Lt),
            '>' => Some(Operator::Gt),
            '!' => Some(Operator::Not),
            _ => None,
        };
        match one {
            Some(op) => {
                tokens.push(Token::op(op, i));
                i += 1;
            }
            None => return Err(ExprError::UnexpectedChar { ch: c, position: i }),
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(expr: &str) -> Vec<TokenKind> {
        tokenize(expr).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_dotted_identifier_is_one_token() {
        let tokens = tokenize("customer.address.city == 'Utrecht'").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].kind, TokenKind::Ident);
        assert_eq!(tokens[0].text, "customer.address.city");
        assert_eq!(tokens[2].kind, TokenKind::String);
        assert_eq!(tokens[2].text, "Utrecht");
    }

    #[test]
    fn test_two_char_operators_are_greedy() {
        assert_eq!(
            kinds("a >= 1 && b <= 2 || c != 3"),
            vec![
                TokenKind::Ident,
                TokenKind::Op(Operator::Ge),
                TokenKind::Number,
                TokenKind::Op(Operator::And),
                TokenKind::Ident,
                TokenKind::Op(Operator::Le),
                TokenKind::Number,
                TokenKind::Op(Operator::Or),
                TokenKind::Ident,
                TokenKind::Op(Operator::Ne),
                TokenKind::Number,
            ]
        );
    }

    #[test]
    fn test_reserved_words() {
        assert_eq!(
            kinds("true false null in always"),
            vec![
                TokenKind::Boolean,
                TokenKind::Boolean,
                TokenKind::Null,
                TokenKind::Op(Operator::In),
                TokenKind::Boolean,
            ]
        );
    }

    #[test]
    fn test_keyword_operators() {
        let tokens = tokenize("NOT a OR b and c").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Op(Operator::Not));
        assert_eq!(tokens[0].text, "!");
        assert_eq!(tokens[2].kind, TokenKind::Op(Operator::Or));
        assert_eq!(tokens[4].kind, TokenKind::Op(Operator::And));
    }

    #[test]
    fn test_brackets_and_numbers() {
        let tokens = tokenize("x in [1, 2.5]").unwrap();
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                TokenKind::Ident,
                TokenKind::Op(Operator::In),
                TokenKind::LBrack,
                TokenKind::Number,
                TokenKind::Comma,
                TokenKind::Number,
                TokenKind::RBrack,
            ]
        );
        assert_eq!(tokens[5].text, "2.5");
    }

    #[test]
    fn test_quotes_do_not_nest() {
        let tokens = tokenize(r#"a == "it's""#).unwrap();
        assert_eq!(tokens[2].text, "it's");
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("a == 1 + 2").unwrap_err();
        assert_eq!(err, ExprError::UnexpectedChar { ch: '+', position: 7 });
        assert!(err.is_lex_error());
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("name == 'bob").unwrap_err();
        assert_eq!(err, ExprError::UnterminatedString { position: 8 });
    }

    #[test]
    fn test_second_decimal_point_is_rejected() {
        assert!(tokenize("1.2.3").is_err());
    }

    #[test]
    fn test_single_ampersand_is_rejected() {
        assert!(matches!(
            tokenize("a & b"),
            Err(ExprError::UnexpectedChar { ch: '&', .. })
        ));
    }
}
