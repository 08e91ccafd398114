//! Mocks and fixtures shared by the AIFlow test suites.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::json;

use aiflow_core::error::{AiflowError, Result};
use aiflow_core::traits::{AgentExecutor, HttpTransport, TokenProvider};
use aiflow_core::{Agent, FlowContext, HttpRequest, HttpResponse, Project, ToolAuth};

/// In-memory transport that records every request and replays scripted
/// responses (default: `200 {}`).
#[derive(Default)]
pub struct MockTransport {
    requests: Mutex<Vec<HttpRequest>>,
    responses: Mutex<VecDeque<HttpResponse>>,
    delay: Option<Duration>,
    timeout_secs: Option<u64>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, status: u16, body: impl Into<String>) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(HttpResponse {
                status,
                body: body.into(),
            });
        self
    }

    /// Sleep before answering; pair with a short timeout to provoke one.
    pub fn with_delay(mut self, delay: Duration, timeout_secs: u64) -> Self {
        self.delay = Some(delay);
        self.timeout_secs = Some(timeout_secs);
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl HttpTransport for MockTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request);
            let next = self
                .responses
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            Ok(next.unwrap_or(HttpResponse {
                status: 200,
                body: "{}".into(),
            }))
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(30)
    }
}

/// Executor returning scripted outputs per agent id.
#[derive(Default)]
pub struct MockExecutor {
    outputs: HashMap<String, String>,
    failing: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, agent_id: &str, output: impl Into<String>) -> Self {
        self.outputs.insert(agent_id.to_string(), output.into());
        self
    }

    pub fn failing_for(mut self, agent_id: &str) -> Self {
        self.failing.push(agent_id.to_string());
        self
    }

    /// Agent ids in execution order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AgentExecutor for MockExecutor {
    fn execute<'a>(
        &'a self,
        agent: &'a Agent,
        _context: &'a FlowContext,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(agent.id.clone());
            if self.failing.contains(&agent.id) {
                return Err(AiflowError::AgentExecution {
                    agent: agent.id.clone(),
                    message: "model unavailable".into(),
                });
            }
            Ok(self.outputs.get(&agent.id).cloned().unwrap_or_default())
        })
    }
}

/// Token provider handing out a fixed token.
pub struct StaticTokenProvider(pub String);

impl TokenProvider for StaticTokenProvider {
    fn token<'a>(&'a self, _tool: &'a str, _auth: &'a ToolAuth) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { Ok(self.0.clone()) })
    }
}

/// Support-desk flow: `triage` classifies and routes to `network`,
/// `billing`, or `human`; `network` escalates to `human` on high priority.
pub fn support_project() -> Project {
    serde_json::from_value(json!({
        "metadata": { "name": "Support desk", "version": "1.0.0" },
        "flow": {
            "schema_version": "1.0",
            "entry_agent": "triage",
            "agents": ["triage", "network", "billing", "human"],
            "variables": { "language": "nl" },
            "logic": [
                { "id": "r1", "from": "triage", "to": "network", "condition": "classification == 'Network Issue'" },
                { "id": "r2", "from": "triage", "to": "billing", "condition": "classification == 'Billing Issue'" },
                { "id": "r3", "from": "triage", "to": "human", "condition": "always" },
                { "id": "r4", "from": "network", "to": "human", "condition": "priority == 'High'" }
            ]
        },
        "agents": [
            { "id": "triage", "name": "Triage", "role": "classifier", "output_format": "json", "tools": ["classify"] },
            { "id": "network", "name": "Network Support", "output_format": "json" },
            { "id": "billing", "name": "Billing Support" },
            { "id": "human", "name": "Human Handoff" }
        ],
        "tools": {
            "classify": {
                "type": "http",
                "endpoint": "https://api.example.com",
                "method": "POST",
                "auth": { "type": "api_key", "header_key": "X-API-Key" }
            },
            "summarize": { "type": "builtin" }
        }
    }))
    .unwrap_or_default()
}
