use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use aiflow_core::error::{AiflowError, Result};
use aiflow_core::traits::{HttpTransport, TokenProvider};
use aiflow_core::{FlowContext, ToolAuth, ToolDefinition, ToolOutcome};

use crate::registry::ToolRegistry;
use crate::request::{build_http_request, ToolInvocation};

/// Context key under which tool results are stored, keyed by agent id and
/// then tool name.
pub const TOOLS_KEY: &str = "__tools";

/// Invokes HTTP tools and records their outcomes in the flow context.
pub struct ToolRunner {
    registry: ToolRegistry,
    transport: Arc<dyn HttpTransport>,
    token_provider: Option<Arc<dyn TokenProvider>>,
    global_api_key: Option<String>,
}

impl ToolRunner {
    pub fn new(registry: ToolRegistry, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            registry,
            transport,
            token_provider: None,
            global_api_key: None,
        }
    }

    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    pub fn with_global_api_key(mut self, key: Option<String>) -> Self {
        self.global_api_key = key;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Invoke one tool. Errors are returned, not recorded.
    pub async fn invoke(&self, name: &str, invocation: &ToolInvocation) -> Result<Value> {
        let definition = self
            .registry
            .resolve(name)
            .ok_or_else(|| AiflowError::ToolNotFound(name.to_string()))?;

        let definition = self.with_resolved_token(name, definition).await?;
        let mut invocation = invocation.clone();
        if invocation.global_api_key.is_none() {
            invocation.global_api_key = self.global_api_key.clone();
        }
        let request = build_http_request(name, &definition, &invocation)?;
        debug!(tool = name, method = %request.method, url = %request.url, "Sending tool request");

        let timeout_secs = self.transport.timeout_secs();
        let response = match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            self.transport.send(request),
        )
        .await
        {
            Ok(result) => result.map_err(|e| match e {
                AiflowError::ToolTimeout { timeout_secs, .. } => AiflowError::ToolTimeout {
                    tool: name.to_string(),
                    timeout_secs,
                },
                AiflowError::ToolInvocation { message, .. } => AiflowError::ToolInvocation {
                    tool: name.to_string(),
                    message,
                },
                other => other,
            })?,
            Err(_) => {
                return Err(AiflowError::ToolTimeout {
                    tool: name.to_string(),
                    timeout_secs,
                })
            }
        };

        if !response.is_success() {
            return Err(AiflowError::ToolInvocation {
                tool: name.to_string(),
                message: format!("HTTP {}: {}", response.status, response.body),
            });
        }

        Ok(serde_json::from_str(&response.body).unwrap_or(Value::String(response.body)))
    }

    /// Fill in an oauth2 token from the provider when the definition has none.
    async fn with_resolved_token(
        &self,
        name: &str,
        definition: &ToolDefinition,
    ) -> Result<ToolDefinition> {
        let mut definition = definition.clone();
        if let (ToolDefinition::Http(tool), Some(provider)) = (&mut definition, &self.token_provider) {
            let pending = tool
                .auth
                .clone()
                .filter(|a| matches!(a, ToolAuth::OAuth2 { token: None, .. }));
            if let Some(auth) = pending {
                let fetched = provider
                    .token(name, &auth)
                    .await
                    .map_err(|e| AiflowError::TokenProvider(e.to_string()))?;
                if let Some(ToolAuth::OAuth2 { token, .. }) = &mut tool.auth {
                    *token = Some(fetched);
                }
            }
        }
        Ok(definition)
    }

    /// Run every tool an agent requested, in order, and merge the outcomes
    /// into `context.__tools.<agent_id>.<tool>`.
    ///
    /// Never fails: a missing tool, an unsupported tool type, or a failed
    /// call becomes an `{ok: false, error}` outcome.
    pub async fn run_for_agent(
        &self,
        agent_id: &str,
        tool_names: &[String],
        context: &mut FlowContext,
        input: &Value,
    ) -> Vec<(String, ToolOutcome)> {
        let mut results = Vec::with_capacity(tool_names.len());

        for name in tool_names {
            let outcome = match self.registry.resolve(name) {
                None => ToolOutcome::failure(AiflowError::ToolNotFound(name.clone()).to_string()),
                Some(def) if def.as_http().is_none() => ToolOutcome::failure(
                    AiflowError::UnsupportedToolType {
                        tool: name.clone(),
                        kind: def.kind().to_string(),
                    }
                    .to_string(),
                ),
                Some(_) => match self.invoke(name, &ToolInvocation::new(input.clone())).await {
                    Ok(data) => ToolOutcome::success(data),
                    Err(e) => ToolOutcome::failure(e.to_string()),
                },
            };

            if outcome.ok {
                info!(agent_id, tool = %name, "Tool call succeeded");
            } else {
                warn!(agent_id, tool = %name, error = ?outcome.error, "Tool call failed");
            }
            context.insert_path(&[TOOLS_KEY, agent_id, name.as_str()], outcome.to_value());
            results.push((name.clone(), outcome));
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiflow_core::{HttpTool, ToolSpec};
    use aiflow_test_utils::{MockTransport, StaticTokenProvider};
    use serde_json::json;

    fn runner(registry: ToolRegistry, transport: Arc<MockTransport>) -> ToolRunner {
        ToolRunner::new(registry, transport)
    }

    #[tokio::test]
    async fn test_no_tools_leaves_context_untouched() {
        let mut ctx = FlowContext::from_value(json!({ "foo": "bar" }));
        let runner = runner(ToolRegistry::new(), Arc::new(MockTransport::new()));

        let results = runner
            .run_for_agent("agent1", &[], &mut ctx, &json!({ "x": 1 }))
            .await;

        assert!(results.is_empty());
        assert_eq!(ctx, FlowContext::from_value(json!({ "foo": "bar" })));
    }

    #[tokio::test]
    async fn test_missing_tool_is_recorded_as_error() {
        let mut ctx = FlowContext::new();
        let runner = runner(ToolRegistry::new(), Arc::new(MockTransport::new()));

        let results = runner
            .run_for_agent("agent1", &["unknown_tool".into()], &mut ctx, &json!({}))
            .await;

        let (name, outcome) = &results[0];
        assert_eq!(name, "unknown_tool");
        assert!(!outcome.ok);
        assert!(outcome.error.as_deref().unwrap().contains("not found"));
        assert_eq!(
            ctx.get_path(&["__tools", "agent1", "unknown_tool"]),
            Some(&outcome.to_value())
        );
    }

    #[tokio::test]
    async fn test_unsupported_tool_type_is_recorded_as_error() {
        let mut registry = ToolRegistry::new();
        registry.register("builtin_tool", ToolDefinition::Builtin(ToolSpec::default()));
        let transport = Arc::new(MockTransport::new());
        let runner = runner(registry, transport.clone());
        let mut ctx = FlowContext::new();

        let results = runner
            .run_for_agent("agent1", &["builtin_tool".into()], &mut ctx, &json!({}))
            .await;

        let outcome = &results[0].1;
        assert!(!outcome.ok);
        assert!(outcome.error.as_deref().unwrap().contains("not implemented"));
        assert_eq!(
            ctx.get_path(&["__tools", "agent1", "builtin_tool"]),
            Some(&outcome.to_value())
        );
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_http_tool_success_stores_parsed_json() {
        let mut registry = ToolRegistry::new();
        registry.register(
            "classify",
            ToolDefinition::Http(HttpTool::new("https://api.example.com", "POST").with_auth(
                ToolAuth::ApiKey {
                    key: None,
                    header_key: None,
                },
            )),
        );
        let transport =
            Arc::new(MockTransport::new().with_response(200, r#"{"label":"network"}"#));
        let runner = runner(registry, transport.clone()).with_global_api_key(Some("GK".into()));
        let mut ctx = FlowContext::from_value(json!({ "__tools": { "agent0": { "x": { "ok": true } } } }));

        let results = runner
            .run_for_agent("agent1", &["classify".into()], &mut ctx, &json!({ "text": "wifi" }))
            .await;

        assert_eq!(results[0].1, ToolOutcome::success(json!({ "label": "network" })));
        assert_eq!(
            ctx.get_path(&["__tools", "agent1", "classify", "data", "label"]),
            Some(&json!("network"))
        );
        assert!(ctx.get_path(&["__tools", "agent0", "x"]).is_some());

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].headers["X-API-Key"], "GK");
        assert_eq!(sent[0].body.as_deref(), Some(r#"{"text":"wifi"}"#));
    }

    #[tokio::test]
    async fn test_text_response_and_http_error() {
        let mut registry = ToolRegistry::new();
        registry.register(
            "echo",
            ToolDefinition::Http(HttpTool::new("https://api.example.com/echo", "GET")),
        );
        let transport = Arc::new(
            MockTransport::new()
                .with_response(200, "plain text")
                .with_response(503, "unavailable"),
        );
        let runner = runner(registry, transport);
        let mut ctx = FlowContext::new();
        let tools = vec!["echo".to_string(), "echo".to_string()];

        let results = runner.run_for_agent("a", &tools, &mut ctx, &json!({})).await;

        assert_eq!(results[0].1.data, Some(json!("plain text")));
        assert!(!results[1].1.ok);
        assert!(results[1].1.error.as_deref().unwrap().contains("HTTP 503"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_transport_times_out() {
        let mut registry = ToolRegistry::new();
        registry.register(
            "slow",
            ToolDefinition::Http(HttpTool::new("https://api.example.com/slow", "GET")),
        );
        let transport = Arc::new(MockTransport::new().with_delay(Duration::from_secs(5), 1));
        let runner = runner(registry, transport);

        let err = runner
            .invoke("slow", &ToolInvocation::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AiflowError::ToolTimeout { timeout_secs: 1, .. }));
    }

    #[tokio::test]
    async fn test_oauth2_token_from_provider() {
        let mut registry = ToolRegistry::new();
        registry.register(
            "crm",
            ToolDefinition::Http(HttpTool::new("https://crm.example.com/contacts", "GET").with_auth(
                ToolAuth::OAuth2 {
                    token: None,
                    client_id: Some("id".into()),
                    client_secret: None,
                    token_endpoint: Some("https://auth.example.com/token".into()),
                    scope: None,
                },
            )),
        );
        let transport = Arc::new(MockTransport::new());
        let runner = runner(registry.clone(), transport.clone())
            .with_token_provider(Arc::new(StaticTokenProvider("tok-1".into())));

        runner.invoke("crm", &ToolInvocation::default()).await.unwrap();
        assert_eq!(transport.requests()[0].headers["Authorization"], "Bearer tok-1");

        // Without a provider the request goes out unauthenticated.
        let transport = Arc::new(MockTransport::new());
        let plain = ToolRunner::new(registry, transport.clone());
        plain.invoke("crm", &ToolInvocation::default()).await.unwrap();
        assert!(!transport.requests()[0].headers.contains_key("Authorization"));
    }
}
