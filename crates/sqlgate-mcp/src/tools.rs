//! Tool registry.
//!
//! Holds the fixed gateway tools plus one tool per template, and remembers
//! which template backs each generated tool.

use crate::protocol::ToolDefinition;
use std::collections::BTreeMap;

/// How a registered tool is served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolTarget {
    /// One of the fixed gateway tools.
    Builtin,
    /// Runs the named template file.
    Template(String),
}

#[derive(Debug, Clone)]
struct Entry {
    definition: ToolDefinition,
    target: ToolTarget,
}

/// Registry of available MCP tools, listed in name order.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Entry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; returns false if the name is already taken.
    pub fn register(&mut self, definition: ToolDefinition, target: ToolTarget) -> bool {
        if self.tools.contains_key(&definition.name) {
            return false;
        }
        self.tools
            .insert(definition.name.clone(), Entry { definition, target });
        true
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|e| &e.definition)
    }

    pub fn target(&self, name: &str) -> Option<&ToolTarget> {
        self.tools.get(name).map(|e| &e.target)
    }

    pub fn list(&self) -> Vec<&ToolDefinition> {
        self.tools.values().map(|e| &e.definition).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}
