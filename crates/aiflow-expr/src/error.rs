use thiserror::Error;

/// Errors raised while lexing or parsing a condition expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    // Lexing
    #[error("Unexpected character '{ch}' at position {position}")]
    UnexpectedChar { ch: char, position: usize },

    #[error("Unterminated string literal starting at position {position}")]
    UnterminatedString { position: usize },

    #[error("Invalid number literal '{text}' at position {position}")]
    InvalidNumber { text: String, position: usize },

    // Parsing
    #[error("Expected {expected} but found '{found}' at position {position}")]
    Expected {
        expected: String,
        found: String,
        position: usize,
    },

    #[error("Unexpected end of expression, expected {expected}")]
    UnexpectedEnd { expected: String },

    #[error("Unknown function: {name}")]
    UnknownFunction { name: String },

    #[error("Function {function} takes {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("Expression nests deeper than {limit} levels at position {position}")]
    TooDeep { limit: usize, position: usize },
}

impl ExprError {
    /// True for errors produced by the tokenizer rather than the parser.
    pub fn is_lex_error(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedChar { .. } | Self::UnterminatedString { .. } | Self::InvalidNumber { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ExprError>;
