use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context};
use serde_json::{Map, Value};

use aiflow_expr::KnownField;

/// Read a JSON argument that is either a file path or inline JSON.
pub fn json_arg(arg: &str) -> anyhow::Result<Value> {
    let path = Path::new(arg);
    if path.is_file() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    } else {
        serde_json::from_str(arg).context("argument is neither a file nor valid JSON")
    }
}

/// Like [`json_arg`] but requires an object; `None` yields an empty map.
pub fn object_arg(arg: Option<&str>) -> anyhow::Result<Map<String, Value>> {
    match arg.map(json_arg).transpose()? {
        None => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => bail!("expected a JSON object, got {}", kind(&other)),
    }
}

/// Mock outputs keyed by agent id.
pub fn outputs_arg(arg: Option<&str>) -> anyhow::Result<HashMap<String, Value>> {
    Ok(object_arg(arg)?.into_iter().collect())
}

/// `path` or `path=alias1,alias2`.
pub fn known_field(arg: &str) -> KnownField {
    match arg.split_once('=') {
        Some((path, aliases)) => KnownField::new(path.trim()).with_aliases(
            aliases
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty()),
        ),
        None => KnownField::new(arg.trim()),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
