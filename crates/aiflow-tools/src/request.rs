use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use aiflow_core::error::{AiflowError, Result};
use aiflow_core::{HttpRequest, ToolDefinition};

use crate::auth::build_auth_headers;

/// What an agent asks a tool to do.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Appended to the endpoint as a path segment.
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub global_api_key: Option<String>,
}

impl ToolInvocation {
    pub fn new(input: Value) -> Self {
        Self {
            input,
            ..Default::default()
        }
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_global_api_key(mut self, key: Option<String>) -> Self {
        self.global_api_key = key;
        self
    }
}

/// Build the HTTP request for an `http` tool.
///
/// GET sends the input object as query parameters in key order; other
/// methods send it as a JSON body.
pub fn build_http_request(
    name: &str,
    definition: &ToolDefinition,
    invocation: &ToolInvocation,
) -> Result<HttpRequest> {
    let tool = definition
        .as_http()
        .ok_or_else(|| AiflowError::UnsupportedToolType {
            tool: name.to_string(),
            kind: definition.kind().to_string(),
        })?;

    let endpoint = tool.endpoint.trim();
    if endpoint.is_empty() {
        return Err(AiflowError::MissingEndpoint(name.to_string()));
    }

    let method = tool.method();
    http::Method::from_bytes(method.as_bytes())
        .map_err(|_| AiflowError::InvalidMethod(method.clone()))?;

    let mut url = match invocation.operation.as_deref().map(str::trim) {
        Some(op) if !op.is_empty() => format!(
            "{}/{}",
            endpoint.trim_end_matches('/'),
            op.trim_start_matches('/')
        ),
        _ => endpoint.to_string(),
    };

    let mut headers = BTreeMap::new();
    let mut body = None;

    if method == "GET" {
        let query = query_string(&invocation.input);
        if !query.is_empty() {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&query);
        }
    } else {
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        let payload = match &invocation.input {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        body = Some(serde_json::to_string(&payload)?);
    }

    let auth_headers = build_auth_headers(tool.auth.as_ref(), invocation.global_api_key.as_deref());
    for (k, v) in auth_headers {
        http::HeaderName::from_bytes(k.as_bytes())
            .map_err(|_| AiflowError::InvalidHeader(k.clone()))?;
        headers.insert(k, v);
    }

    Ok(HttpRequest {
        method,
        url,
        headers,
        body,
    })
}

/// Percent-encoded `key=value` pairs for an input object, in key order.
fn query_string(input: &Value) -> String {
    let Value::Object(map) = input else {
        return String::new();
    };
    map.iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                urlencoding::encode(k),
                urlencoding::encode(&query_value(v))
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn query_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(query_value).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}
