use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiflowError {
    // Project errors
    #[error("Project validation failed: {}", codes.join(", "))]
    Validation { codes: Vec<String> },

    #[error("Flow has no entry agent")]
    MissingEntryAgent,

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Failed to load project: {0}")]
    ProjectLoad(String),

    // Agent errors
    #[error("Agent execution failed: {agent}: {message}")]
    AgentExecution { agent: String, message: String },

    #[error("Run cancelled")]
    Cancelled,

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool type '{kind}' not implemented in this runtime (only supports HTTP tools): {tool}")]
    UnsupportedToolType { tool: String, kind: String },

    #[error("HTTP tool has no endpoint: {0}")]
    MissingEndpoint(String),

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Tool invocation failed: {tool}: {message}")]
    ToolInvocation { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Token provider error: {0}")]
    TokenProvider(String),

    // Expression errors
    #[error("Expression error: {0}")]
    Expression(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AiflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_joins_codes() {
        let err = AiflowError::Validation {
            codes: vec!["MISSING_ENTRY_AGENT".into(), "DUPLICATE_AGENT_ID".into()],
        };
        assert_eq!(
            err.to_string(),
            "Project validation failed: MISSING_ENTRY_AGENT, DUPLICATE_AGENT_ID"
        );
    }

    #[test]
    fn test_tool_errors_name_the_tool() {
        let err = AiflowError::UnsupportedToolType {
            tool: "summarize".into(),
            kind: "builtin".into(),
        };
        assert!(err.to_string().contains("only supports HTTP tools"));
        assert!(AiflowError::ToolNotFound("x".into()).to_string().contains("not found"));
    }
}
