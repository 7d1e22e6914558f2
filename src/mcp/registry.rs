//! Tool registry
//!
//! A name-keyed mapping of registered tools. Names are unique across all
//! modules; duplicate registration fails immediately. Enumeration follows
//! registration order so `tools/list` output is stable.

use std::sync::{Arc, RwLock};

use dashmap::DashMap;

use crate::error::{ConfigError, DataMcpError, Result};
use crate::mcp::dispatch::RegisteredTool;
use crate::mcp::types::ToolDescriptor;

#[derive(Default)]
pub struct ToolRegistry {
    tools: DashMap<String, Arc<RegisteredTool>>,
    order: RwLock<Vec<String>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails if the name is already taken.
    pub fn register(&self, tool: RegisteredTool) -> Result<()> {
        let name = tool.name().to_string();

        match self.tools.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(DataMcpError::Config(ConfigError::ToolExists { name }))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Arc::new(tool));
                self.order.write().expect("registry order lock").push(name.clone());
                tracing::debug!(tool = %name, "Registered tool");
                Ok(())
            }
        }
    }

    /// Look up a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<RegisteredTool>> {
        self.tools.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Enumerate descriptors in registration order
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.order
            .read()
            .expect("registry order lock")
            .iter()
            .filter_map(|name| self.tools.get(name).map(|t| t.descriptor()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Drop every registered tool. Used only during shutdown.
    pub fn clear(&self) {
        self.tools.clear();
        self.order.write().expect("registry order lock").clear();
    }
}
