use std::collections::HashMap;

use futures::future::BoxFuture;
use serde_json::Value;

use aiflow_core::error::Result;
use aiflow_core::traits::AgentExecutor;
use aiflow_core::{Agent, FlowContext};

/// Executor that answers without calling a model.
///
/// Scripted outputs win; otherwise JSON agents get a fixed completion object
/// and text agents a fixed sentence.
#[derive(Debug, Clone, Default)]
pub struct SimulatedExecutor {
    outputs: HashMap<String, Value>,
}

impl SimulatedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outputs(outputs: HashMap<String, Value>) -> Self {
        Self { outputs }
    }

    fn respond(&self, agent: &Agent) -> String {
        match self.outputs.get(&agent.id) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None if agent.wants_json() => {
                r#"{"status":"completed","summary":"Simulated result"}"#.to_string()
            }
            None => format!(
                "[Simulated Output from {}]: Task completed successfully.",
                agent.display_name()
            ),
        }
    }
}

impl AgentExecutor for SimulatedExecutor {
    fn execute<'a>(
        &'a self,
        agent: &'a Agent,
        _context: &'a FlowContext,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { Ok(self.respond(agent)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_default_outputs_by_format() {
        let exec = SimulatedExecutor::new();
        let ctx = FlowContext::new();

        let json_agent = Agent::new("triage").with_output_format("json");
        let out = exec.execute(&json_agent, &ctx).await.unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, json!({ "status": "completed", "summary": "Simulated result" }));

        let mut text_agent = Agent::new("writer");
        text_agent.name = "Writer".into();
        let out = exec.execute(&text_agent, &ctx).await.unwrap();
        assert_eq!(out, "[Simulated Output from Writer]: Task completed successfully.");
    }

    #[tokio::test]
    async fn test_scripted_outputs_take_precedence() {
        let exec = SimulatedExecutor::with_outputs(HashMap::from([
            ("a".to_string(), json!("verbatim text")),
            ("b".to_string(), json!({ "classification": "Network Issue" })),
        ]));
        let ctx = FlowContext::new();

        let a = exec.execute(&Agent::new("a"), &ctx).await.unwrap();
        assert_eq!(a, "verbatim text");

        let b = exec
            .execute(&Agent::new("b").with_output_format("json"), &ctx)
            .await
            .unwrap();
        assert_eq!(b, r#"{"classification":"Network Issue"}"#);
    }
}
