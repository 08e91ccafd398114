use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AiflowError, Result};

/// A complete workflow project: flow graph, agents, and tool registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub metadata: ProjectMetadata,
    #[serde(default)]
    pub flow: Flow,
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub tools: HashMap<String, ToolDefinition>,
    /// Prompt file name to prompt text.
    #[serde(default)]
    pub prompts: HashMap<String, String>,
}

impl Project {
    /// Load a project from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AiflowError::ProjectLoad(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| AiflowError::ProjectLoad(format!("{}: {e}", path.display())))
    }

    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    /// Rules leaving `agent_id`, in declaration order.
    pub fn rules_from<'a>(&'a self, agent_id: &'a str) -> impl Iterator<Item = &'a Rule> + 'a {
        self.flow.logic.iter().filter(move |r| r.from == agent_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub creator: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Flow {
    #[serde(default)]
    pub schema_version: String,
    #[serde(default)]
    pub entry_agent: String,
    #[serde(default)]
    pub agents: Vec<String>,
    /// Seed values copied into the context before a run.
    #[serde(default)]
    pub variables: Map<String, Value>,
    /// Routing rules. Order among rules sharing a `from` decides ties.
    #[serde(default)]
    pub logic: Vec<Rule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_handling: Option<ErrorHandling>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorHandling {
    #[serde(default)]
    pub retry: u32,
    #[serde(default)]
    pub fallback_agent: String,
}

/// A conditioned edge `from -> to`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<String>,
}

impl Rule {
    pub fn new(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            condition: condition.into(),
            ..Default::default()
        }
    }

    /// The condition to evaluate; blank conditions mean `always`.
    pub fn effective_condition(&self) -> &str {
        let c = self.condition.trim();
        if c.is_empty() {
            "always"
        } else {
            c
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentModel {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub model: AgentModel,
    /// Prompt file name, looked up in `Project::prompts`.
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub memory: String,
    /// `"json"` when the agent is expected to answer with a JSON object.
    #[serde(default)]
    pub output_format: String,
}

impl Agent {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            ..Default::default()
        }
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = format.into();
        self
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    pub fn wants_json(&self) -> bool {
        self.output_format.eq_ignore_ascii_case("json")
    }
}

/// A tool an agent can call. Only `http` tools are invocable by the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolDefinition {
    Http(HttpTool),
    Builtin(ToolSpec),
    Python(ToolSpec),
}

impl ToolDefinition {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Builtin(_) => "builtin",
            Self::Python(_) => "python",
        }
    }

    pub fn as_http(&self) -> Option<&HttpTool> {
        match self {
            Self::Http(tool) => Some(tool),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpTool {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<ToolAuth>,
}

impl HttpTool {
    pub fn new(endpoint: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: Some(method.into()),
            ..Default::default()
        }
    }

    pub fn with_auth(mut self, auth: ToolAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Upper-cased method, `GET` when unset.
    pub fn method(&self) -> String {
        self.method
            .as_deref()
            .map(|m| m.trim().to_uppercase())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "GET".to_string())
    }
}

/// Metadata for tools the runtime cannot invoke.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolAuth {
    None,
    ApiKey {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        header_key: Option<String>,
    },
    Bearer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    /// Token exchange happens outside the runtime; only `token` is consumed.
    #[serde(rename = "oauth2")]
    OAuth2 {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_secret: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token_endpoint: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueLevel {
    Error,
    Warning,
}

/// One finding from project validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub level: IssueLevel,
    pub code: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Error,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Warning,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == IssueLevel::Error
    }
}
