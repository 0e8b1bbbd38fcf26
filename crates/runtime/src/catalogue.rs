//! Discovered tool catalogue.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConnectError;

/// A tool as advertised by the tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl From<mcp::Tool> for ToolDescriptor {
    fn from(tool: mcp::Tool) -> Self {
        Self {
            name: tool.name,
            description: tool.description.unwrap_or_default(),
            input_schema: tool.input_schema,
        }
    }
}

/// Ordered, immutable snapshot of the tools one connection discovered.
///
/// Names are unique. A reconnect replaces the whole catalogue.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalogue {
    tools: Arc<[ToolDescriptor]>,
}

impl ToolCatalogue {
    /// The empty catalogue held by a connection that is not ready.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the catalogue from a discovery response.
    ///
    /// An empty list is a failed discovery, as is a repeated name.
    pub fn from_discovery(tools: Vec<ToolDescriptor>) -> Result<Self, ConnectError> {
        if tools.is_empty() {
            return Err(ConnectError::NoToolsDiscovered);
        }

        let mut seen = HashSet::with_capacity(tools.len());
        for tool in &tools {
            if !seen.insert(tool.name.as_str()) {
                return Err(ConnectError::DuplicateTool(tool.name.clone()));
            }
        }

        Ok(Self {
            tools: tools.into(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn to_vec(&self) -> Vec<ToolDescriptor> {
        self.tools.to_vec()
    }
}
