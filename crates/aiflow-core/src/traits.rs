use futures::future::BoxFuture;

use crate::context::FlowContext;
use crate::error::Result;
use crate::project::{Agent, Project, ToolAuth, ValidationIssue};
use crate::types::{HttpRequest, HttpResponse};

/// Runs one agent against the current context.
pub trait AgentExecutor: Send + Sync + 'static {
    /// Return the agent's raw textual output (JSON text when the agent
    /// answers in JSON).
    fn execute<'a>(
        &'a self,
        agent: &'a Agent,
        context: &'a FlowContext,
    ) -> BoxFuture<'a, Result<String>>;
}

/// Checked before any step runs.
pub trait ProjectValidator: Send + Sync {
    fn validate(&self, project: &Project) -> Vec<ValidationIssue>;
}

/// Supplies already-exchanged bearer tokens for oauth2 tools.
pub trait TokenProvider: Send + Sync {
    fn token<'a>(&'a self, tool: &'a str, auth: &'a ToolAuth) -> BoxFuture<'a, Result<String>>;
}

/// Sends built HTTP requests.
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>>;

    /// Timeout in seconds applied per request.
    fn timeout_secs(&self) -> u64 {
        30
    }
}
