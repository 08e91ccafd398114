use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Accumulating variables of one run.
///
/// Keys are strings; values are JSON. The context only ever grows: agent
/// outputs and tool results are merged in with last-write-wins on collision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowContext {
    data: Map<String, Value>,
}

impl FlowContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(data: Map<String, Value>) -> Self {
        Self { data }
    }

    /// Build a context from a JSON value. Non-object values give an empty
    /// context.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(data) => Self { data },
            _ => Self::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), Value::String(value.into()));
    }

    /// Merge another context into this one (overwrites on conflict).
    pub fn merge(&mut self, other: &FlowContext) {
        self.merge_map(&other.data);
    }

    /// Shallow-merge a JSON object's keys into the context.
    pub fn merge_map(&mut self, other: &Map<String, Value>) {
        for (k, v) in other {
            self.data.insert(k.clone(), v.clone());
        }
    }

    /// Write `value` at a nested key path, creating (or replacing
    /// non-object) intermediates. Siblings along the path are kept.
    pub fn insert_path(&mut self, path: &[&str], value: Value) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        let mut cur = &mut self.data;
        for key in parents {
            let slot = cur
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            cur = match slot {
                Value::Object(map) => map,
                _ => return,
            };
        }
        cur.insert(last.to_string(), value);
    }

    /// Nested lookup by key path.
    pub fn get_path(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut cur = self.data.get(*first)?;
        for key in rest {
            cur = cur.get(*key)?;
        }
        Some(cur)
    }

    /// Record an agent's raw output.
    ///
    /// The output is stored under `last_output` and `<agent_id>.output`,
    /// parsed as JSON when possible. A JSON object is also merged into the
    /// top level. Returns the stored value.
    pub fn ingest_output(&mut self, agent_id: &str, raw: &str) -> Value {
        let parsed = serde_json::from_str::<Value>(raw.trim())
            .unwrap_or_else(|_| Value::String(raw.to_string()));

        self.data.insert("last_output".into(), parsed.clone());
        self.data
            .insert(format!("{agent_id}.output"), parsed.clone());
        if let Value::Object(obj) = &parsed {
            self.merge_map(obj);
        }
        parsed
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.data
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.data)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
}

impl From<Map<String, Value>> for FlowContext {
    fn from(data: Map<String, Value>) -> Self {
        Self { data }
    }
}
