//! Plugin system for tessera-bot
//!
//! Plugins are dynamically loaded shared libraries that extend bot
//! functionality. Each plugin exports an init symbol returning an object
//! that implements the `PluginModule` capability interface.

pub mod interface;
pub mod loader;
pub mod registry;

pub use interface::PluginModule;
pub use loader::{DylibResolver, ModuleResolver, PluginLoader};
pub use registry::{CapabilityRegistry, PluginRecord};
