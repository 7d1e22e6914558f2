//! Tool modules
//!
//! A module groups related tools behind one lifecycle: `on_load` runs before
//! its tools are registered, `on_unload` runs during shutdown. Tools are
//! registered through the dispatch pipeline and stay in the registry for the
//! life of the process (unload does not unregister; shutdown clears the
//! registry wholesale).

pub mod database;
pub mod web;

use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ConfigError, DataMcpError, Result, ValidationError};
use crate::mcp::dispatch::{RegisteredTool, ToolSpec};
use crate::mcp::registry::ToolRegistry;

/// Deserialize tool arguments into a handler's argument struct.
pub(crate) fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| {
        DataMcpError::Validation(ValidationError::InvalidArguments {
            message: e.to_string(),
        })
    })
}

/// Module identity and metadata
#[derive(Debug, Clone)]
pub struct ModuleConfig {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
}

impl ModuleConfig {
    pub fn new(name: &str, version: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            description: Some(description.to_string()),
        }
    }
}

/// A cohesive group of tools sharing configuration and lifecycle
pub trait Module: Send + Sync {
    /// Module identity
    fn config(&self) -> ModuleConfig;

    /// Declared tools; consumed once at registration
    fn tools(&self) -> Vec<ToolSpec>;

    /// Called before the module's tools are registered
    fn on_load(&self) {}

    /// Called during shutdown
    fn on_unload(&self) {}
}

/// Registers modules against the tool registry and drives their lifecycle.
pub struct ModuleManager {
    registry: Arc<ToolRegistry>,
    modules: Mutex<Vec<Arc<dyn Module>>>,
}

impl ModuleManager {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            modules: Mutex::new(Vec::new()),
        }
    }

    /// Initialize a module: run `on_load`, then register every declared tool
    /// through the dispatch pipeline. A module name can only be registered
    /// once; a second attempt fails without touching the registry.
    pub fn register_module(&self, module: Arc<dyn Module>) -> Result<()> {
        let config = module.config();

        {
            let modules = self.modules.lock().expect("module list lock");
            if modules.iter().any(|m| m.config().name == config.name) {
                return Err(DataMcpError::Config(ConfigError::ModuleExists {
                    name: config.name,
                }));
            }
        }

        tracing::info!(module = %config.name, version = %config.version, "Initializing module");
        module.on_load();

        let tools = module.tools();
        let tool_count = tools.len();
        for spec in tools {
            self.registry.register(RegisteredTool::wrap(spec)?)?;
        }

        self.modules.lock().expect("module list lock").push(module);
        tracing::info!(
            module = %config.name,
            version = %config.version,
            tools = tool_count,
            "Module loaded"
        );
        Ok(())
    }

    pub fn module_count(&self) -> usize {
        self.modules.lock().expect("module list lock").len()
    }

    /// Metadata for every registered module
    pub fn module_info(&self) -> Vec<ModuleConfig> {
        self.modules
            .lock()
            .expect("module list lock")
            .iter()
            .map(|m| m.config())
            .collect()
    }

    /// Run `on_unload` for every module and clear the registry.
    pub fn shutdown(&self) {
        let modules: Vec<Arc<dyn Module>> =
            self.modules.lock().expect("module list lock").drain(..).collect();
        for module in modules {
            let name = module.config().name;
            module.on_unload();
            tracing::info!(module = %name, "Module unloaded");
        }
        self.registry.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::dispatch::handler;
    use crate::mcp::types::CallToolResult;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeModule {
        name: &'static str,
        loads: Arc<AtomicUsize>,
        unloads: Arc<AtomicUsize>,
    }

    impl Module for FakeModule {
        fn config(&self) -> ModuleConfig {
            ModuleConfig::new(self.name, "1.0.0", "test module")
        }

        fn tools(&self) -> Vec<ToolSpec> {
            vec![ToolSpec::new(
                format!("{}_ping", self.name),
                "Ping",
                json!({"type": "object"}),
                handler(|_| async { Ok(CallToolResult::text("pong")) }),
            )]
        }

        fn on_load(&self) {
            self.loads.fetch_add(1, Ordering::SeqCst);
        }

        fn on_unload(&self) {
            self.unloads.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fake(name: &'static str) -> (Arc<FakeModule>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let loads = Arc::new(AtomicUsize::new(0));
        let unloads = Arc::new(AtomicUsize::new(0));
        let module = Arc::new(FakeModule {
            name,
            loads: Arc::clone(&loads),
            unloads: Arc::clone(&unloads),
        });
        (module, loads, unloads)
    }

    #[test]
    fn test_register_runs_on_load_and_registers_tools() {
        let registry = Arc::new(ToolRegistry::new());
        let manager = ModuleManager::new(Arc::clone(&registry));
        let (module, loads, _) = fake("alpha");

        manager.register_module(module).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(registry.get("alpha_ping").is_some());
        assert_eq!(manager.module_count(), 1);
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Arc::new(ToolRegistry::new());
        let manager = ModuleManager::new(registry);
        let (first, _, _) = fake("alpha");
        let (second, loads, _) = fake("alpha");

        manager.register_module(first).unwrap();
        let err = manager.register_module(second).unwrap_err();
        assert!(err.to_string().contains("already registered"));
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_shutdown_unloads_and_clears_registry() {
        let registry = Arc::new(ToolRegistry::new());
        let manager = ModuleManager::new(Arc::clone(&registry));
        let (module, _, unloads) = fake("alpha");

        manager.register_module(module).unwrap();
        manager.shutdown();
        assert_eq!(unloads.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
        assert_eq!(manager.module_count(), 0);
    }
}
