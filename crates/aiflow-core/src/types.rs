use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique run identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of one tool call, as stored in the context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("ok".into(), Value::Bool(self.ok));
        if let Some(data) = &self.data {
            obj.insert("data".into(), data.clone());
        }
        if let Some(error) = &self.error {
            obj.insert("error".into(), Value::String(error.clone()));
        }
        Value::Object(obj)
    }
}

/// A fully built HTTP call, ready for a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// JSON text for non-GET requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Run event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Run started at the entry agent.
    RunStarted { run_id: RunId, entry_agent: String },
    /// An agent is about to execute.
    AgentStarted { step: usize, agent_id: String },
    /// An agent returned its raw output.
    AgentCompleted { agent_id: String, output: String },
    /// A tool call finished (successfully or not).
    ToolFinished {
        agent_id: String,
        tool: String,
        outcome: ToolOutcome,
    },
    /// A rule fired and the run moves on.
    Transition {
        from: String,
        to: String,
        rule_id: String,
    },
    /// Run ended: dead end, step ceiling, or cancellation.
    RunFinished {
        run_id: RunId,
        finished: bool,
        steps: usize,
        final_agent_id: Option<String>,
    },
    /// Run aborted with an error.
    RunFailed { run_id: RunId, error: String },
}

impl RunEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunFinished { .. } | Self::RunFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_outcome_value_shape() {
        assert_eq!(
            ToolOutcome::success(json!({ "label": "network" })).to_value(),
            json!({ "ok": true, "data": { "label": "network" } })
        );
        assert_eq!(
            ToolOutcome::failure("Tool not found: x").to_value(),
            json!({ "ok": false, "error": "Tool not found: x" })
        );
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
        assert_eq!(RunId::from_string("abc").to_string(), "abc");
    }
}
