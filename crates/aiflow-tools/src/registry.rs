use std::collections::HashMap;

use aiflow_core::{Project, ToolDefinition};

/// Registry of tool definitions declared by a project.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_project(project: &Project) -> Self {
        Self {
            tools: project.tools.clone(),
        }
    }

    /// Register a tool definition under `name`.
    pub fn register(&mut self, name: impl Into<String>, definition: ToolDefinition) {
        self.tools.insert(name.into(), definition);
    }

    /// Unregister a tool by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    /// Look up a tool; `None` when the name is not registered.
    pub fn resolve(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    /// Registered tool names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl From<HashMap<String, ToolDefinition>> for ToolRegistry {
    fn from(tools: HashMap<String, ToolDefinition>) -> Self {
        Self { tools }
    }
}
