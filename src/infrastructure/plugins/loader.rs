//! Plugin loader - binds stored artifacts into the running process
//!
//! Bindings are keyed by plugin name so repeated install/uninstall cycles
//! of one name replace the previous module instead of leaking it. All
//! load-time failures stay inside `load`; the binding table is untouched
//! unless the whole load succeeds.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, RwLock};
use libloading::{Library, Symbol};
use tracing::{info, warn};

use crate::application::errors::PluginError;
use super::interface::{PluginInitFn, PluginModule, PLUGIN_INIT_SYMBOL};

/// A live module together with whatever backs it in memory.
pub struct LoadedModule {
    module: Arc<dyn PluginModule>,
    // a dylib-backed module must not outlive its library
    _library: Option<Library>,
}

impl LoadedModule {
    pub fn new(module: Arc<dyn PluginModule>, library: Option<Library>) -> Self {
        Self {
            module,
            _library: library,
        }
    }

    pub fn module(&self) -> Arc<dyn PluginModule> {
        self.module.clone()
    }
}

/// Resolves a stored artifact into a live module. The rest of the lifecycle
/// code only sees this seam, so the dynamic-loading mechanism stays in one
/// place (and tests can substitute an in-process resolver).
pub trait ModuleResolver: Send + Sync {
    fn resolve(&self, name: &str, path: &Path) -> Result<LoadedModule, PluginError>;
}

/// Shared-library resolver: loads the artifact with `libloading` and calls
/// its exported init symbol.
pub struct DylibResolver;

impl ModuleResolver for DylibResolver {
    fn resolve(&self, name: &str, path: &Path) -> Result<LoadedModule, PluginError> {
        let library = unsafe { Library::new(path) }
            .map_err(|e| PluginError::LoadFailed(format!("failed to load library: {}", e)))?;

        let init: Symbol<PluginInitFn> = unsafe { library.get(PLUGIN_INIT_SYMBOL) }
            .map_err(|e| PluginError::LoadFailed(format!("missing init symbol: {}", e)))?;

        // a panicking init must not take the host down with it
        let raw = panic::catch_unwind(AssertUnwindSafe(|| init()))
            .map_err(|_| PluginError::LoadFailed(format!("init panicked in '{}'", name)))?;
        if raw.is_null() {
            return Err(PluginError::LoadFailed("plugin init returned null".to_string()));
        }

        let module: Arc<dyn PluginModule> = unsafe { Arc::from(Box::from_raw(raw)) };
        info!("Loaded plugin module: {}", module.name());
        Ok(LoadedModule::new(module, Some(library)))
    }
}

/// What the coordinator needs after a successful load.
pub struct LoadSummary {
    pub module: Arc<dyn PluginModule>,
    pub help_text: String,
    pub commands: Vec<String>,
    // keeps a replaced binding alive until the caller has swapped its
    // registry record; dropped with the summary
    _displaced: Option<LoadedModule>,
}

impl std::fmt::Debug for LoadSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadSummary")
            .field("module", &self.module.name())
            .field("help_text", &self.help_text)
            .field("commands", &self.commands)
            .finish()
    }
}

pub struct PluginLoader {
    resolver: Box<dyn ModuleResolver>,
    modules: RwLock<HashMap<String, LoadedModule>>,
}

impl PluginLoader {
    pub fn new(resolver: Box<dyn ModuleResolver>) -> Self {
        Self {
            resolver,
            modules: RwLock::new(HashMap::new()),
        }
    }

    pub fn dylib() -> Self {
        Self::new(Box::new(DylibResolver))
    }

    /// Load the artifact at `path` and bind it under `name`, replacing any
    /// prior binding for that name. On failure the binding table is exactly
    /// as it was before the call.
    pub fn load(&self, name: &str, path: &Path) -> Result<LoadSummary, PluginError> {
        let loaded = self.resolver.resolve(name, path)?;
        let module = loaded.module();

        let help_text = match module.help() {
            Some(text) => text,
            None => {
                warn!("Plugin '{}' exposes no help text", name);
                String::new()
            }
        };
        let commands = module.commands();

        let mut modules = self
            .modules
            .write()
            .map_err(|_| PluginError::LoadFailed("loader lock poisoned".to_string()))?;
        let displaced = modules.insert(name.to_string(), loaded);

        Ok(LoadSummary {
            module,
            help_text,
            commands,
            _displaced: displaced,
        })
    }

    /// Drop the binding for `name`. Idempotent: unloading an absent name
    /// does nothing.
    pub fn unload(&self, name: &str) {
        let removed = match self.modules.write() {
            Ok(mut modules) => modules.remove(name),
            Err(_) => None,
        };
        if let Some(loaded) = removed {
            loaded.module.shutdown();
            info!("Unloaded plugin module: {}", name);
        }
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.modules
            .read()
            .ok()
            .map(|m| m.contains_key(name))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedModule {
        name: String,
        help: Option<String>,
    }

    impl PluginModule for FixedModule {
        fn name(&self) -> &str {
            &self.name
        }

        fn help(&self) -> Option<String> {
            self.help.clone()
        }

        fn execute(&self, command: &str, _args: &[String]) -> Result<String, String> {
            Ok(format!("{} ran {}", self.name, command))
        }
    }

    /// Resolver that fails for paths containing "broken" and otherwise
    /// produces a module whose help text is the file stem.
    struct PathResolver {
        calls: AtomicUsize,
        with_help: bool,
    }

    impl PathResolver {
        fn new(with_help: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                with_help,
            }
        }
    }

    impl ModuleResolver for PathResolver {
        fn resolve(&self, name: &str, path: &Path) -> Result<LoadedModule, PluginError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if path.to_string_lossy().contains("broken") {
                return Err(PluginError::LoadFailed("top-level error".to_string()));
            }
            let module = FixedModule {
                name: name.to_string(),
                help: self.with_help.then(|| format!("help for {}", name)),
            };
            Ok(LoadedModule::new(Arc::new(module), None))
        }
    }

    #[test]
    fn test_load_and_replace_binding() {
        let loader = PluginLoader::new(Box::new(PathResolver::new(true)));

        let first = loader.load("greet", Path::new("/x/greet.so")).unwrap();
        assert_eq!(first.help_text, "help for greet");
        assert!(loader.is_loaded("greet"));

        // same name again: replaced, not duplicated
        let second = loader.load("greet", Path::new("/x/greet.so")).unwrap();
        assert_eq!(second.help_text, "help for greet");
        assert!(loader.is_loaded("greet"));
    }

    #[test]
    fn test_failed_load_leaves_bindings_untouched() {
        let loader = PluginLoader::new(Box::new(PathResolver::new(true)));
        loader.load("good", Path::new("/x/good.so")).unwrap();

        let err = loader.load("broken", Path::new("/x/broken.so")).unwrap_err();
        assert!(matches!(err, PluginError::LoadFailed(_)));
        assert!(!loader.is_loaded("broken"));
        assert!(loader.is_loaded("good"));
    }

    #[test]
    fn test_missing_help_substitutes_empty() {
        let loader = PluginLoader::new(Box::new(PathResolver::new(false)));
        let summary = loader.load("mute", Path::new("/x/mute.so")).unwrap();
        assert_eq!(summary.help_text, "");
    }

    #[test]
    fn test_unload_is_idempotent() {
        let loader = PluginLoader::new(Box::new(PathResolver::new(true)));
        loader.load("greet", Path::new("/x/greet.so")).unwrap();

        loader.unload("greet");
        assert!(!loader.is_loaded("greet"));
        // absent binding: no panic, no error
        loader.unload("greet");
        loader.unload("never-loaded");
    }
}
