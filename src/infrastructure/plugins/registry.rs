//! Capability registry - help metadata and command bindings for loaded plugins
//!
//! One owned, lock-guarded instance per process, written only by the
//! lifecycle coordinator and read freely by the help menu and the command
//! dispatch path. A record is present here if and only if its module is
//! currently resident; half-installed plugins are never registered.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::info;

use super::interface::PluginModule;

/// Fallback shown when help is requested for an unknown category. The help
/// menu is an interactive callback the remote side cannot retry, so lookup
/// must always produce text.
pub const HELP_FALLBACK: &str = "No help available for this category.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loaded,
    Failed,
}

/// Everything the process knows about one installed plugin.
#[derive(Clone)]
pub struct PluginRecord {
    pub name: String,
    pub source_path: PathBuf,
    pub manifest_path: Option<PathBuf>,
    pub help_text: String,
    pub commands: Vec<String>,
    pub state: LoadState,
    pub module: Arc<dyn PluginModule>,
}

impl std::fmt::Debug for PluginRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRecord")
            .field("name", &self.name)
            .field("source_path", &self.source_path)
            .field("manifest_path", &self.manifest_path)
            .field("commands", &self.commands)
            .field("state", &self.state)
            .finish()
    }
}

pub struct CapabilityRegistry {
    // registration order backs the help menu, so a Vec rather than a map
    records: RwLock<Vec<PluginRecord>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    /// Insert or replace the entry for `record.name`. A replaced entry keeps
    /// its position in the menu.
    pub fn register(&self, record: PluginRecord) {
        let mut records = match self.records.write() {
            Ok(records) => records,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(existing) = records.iter_mut().find(|r| r.name == record.name) {
            *existing = record;
        } else {
            info!("Registered plugin: {}", record.name);
            records.push(record);
        }
    }

    /// Remove the entry for `name`; no-op when absent.
    pub fn unregister(&self, name: &str) {
        let mut records = match self.records.write() {
            Ok(records) => records,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(pos) = records.iter().position(|r| r.name == name) {
            records.remove(pos);
            info!("Unregistered plugin: {}", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<PluginRecord> {
        self.records
            .read()
            .ok()?
            .iter()
            .find(|r| r.name == name)
            .cloned()
    }

    /// Category names for the help menu, in registration order.
    pub fn categories(&self) -> Vec<String> {
        self.records
            .read()
            .ok()
            .map(|records| records.iter().map(|r| r.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Help text for `name`, or the fixed fallback. Never fails.
    pub fn render_help(&self, name: &str) -> String {
        match self.get(name) {
            Some(record) => record.help_text,
            None => HELP_FALLBACK.to_string(),
        }
    }

    /// Find the record whose module answers to `command`.
    pub fn find_command(&self, command: &str) -> Option<PluginRecord> {
        self.records
            .read()
            .ok()?
            .iter()
            .find(|r| r.commands.iter().any(|c| c == command))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().ok().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullModule;

    impl PluginModule for NullModule {
        fn name(&self) -> &str {
            "null"
        }

        fn execute(&self, _command: &str, _args: &[String]) -> Result<String, String> {
            Err("nothing to do".to_string())
        }
    }

    fn record(name: &str, help: &str, commands: &[&str]) -> PluginRecord {
        PluginRecord {
            name: name.to_string(),
            source_path: PathBuf::from(format!("plugins/{}.so", name)),
            manifest_path: None,
            help_text: help.to_string(),
            commands: commands.iter().map(|c| c.to_string()).collect(),
            state: LoadState::Loaded,
            module: Arc::new(NullModule),
        }
    }

    #[test]
    fn test_categories_keep_registration_order() {
        let registry = CapabilityRegistry::new();
        registry.register(record("zeta", "z", &[]));
        registry.register(record("alpha", "a", &[]));
        registry.register(record("mid", "m", &[]));

        assert_eq!(registry.categories(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_register_replaces_in_place() {
        let registry = CapabilityRegistry::new();
        registry.register(record("one", "first", &[]));
        registry.register(record("two", "second", &[]));
        registry.register(record("one", "updated", &[]));

        assert_eq!(registry.categories(), vec!["one", "two"]);
        assert_eq!(registry.render_help("one"), "updated");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_render_help_falls_back() {
        let registry = CapabilityRegistry::new();
        assert_eq!(registry.render_help("ghost"), HELP_FALLBACK);

        registry.register(record("greet", "Greets the user", &[]));
        assert_eq!(registry.render_help("greet"), "Greets the user");

        registry.unregister("greet");
        assert_eq!(registry.render_help("greet"), HELP_FALLBACK);
    }

    #[test]
    fn test_unregister_absent_is_noop() {
        let registry = CapabilityRegistry::new();
        registry.unregister("ghost");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_find_command() {
        let registry = CapabilityRegistry::new();
        registry.register(record("greet", "", &["hello", "hi"]));

        assert_eq!(registry.find_command("hi").map(|r| r.name), Some("greet".to_string()));
        assert!(registry.find_command("bye").is_none());
    }
}
