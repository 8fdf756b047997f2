//! Plugin capability interface

/// Capability interface every loadable module implements.
///
/// This is the whole contract between the host and third-party code: a
/// name, optional help text for the interactive menu, the command names the
/// module answers to, and one execute entry point.
pub trait PluginModule: Send + Sync {
    /// Unique identifier, matching the artifact name
    fn name(&self) -> &str;

    /// Help text shown in the interactive help menu
    fn help(&self) -> Option<String> {
        None
    }

    /// Command names this module answers to
    fn commands(&self) -> Vec<String> {
        Vec::new()
    }

    /// Execute one of the contributed commands
    fn execute(&self, command: &str, args: &[String]) -> Result<String, String>;

    /// Cleanup resources when the module is unloaded
    fn shutdown(&self) {}
}

/// Function signature for plugin initialization
pub type PluginInitFn = extern "C" fn() -> *mut dyn PluginModule;

/// Symbol every plugin library must export
pub const PLUGIN_INIT_SYMBOL: &[u8] = b"tessera_plugin_init";
