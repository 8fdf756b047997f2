//! Plugin lifecycle coordination
//!
//! Sequences install/uninstall/export across the artifact store, the
//! dependency installer, the loader and the capability registry. An install
//! either fully succeeds or rolls back to nothing; no half-installed plugin
//! is ever observable across calls. Only one operation per plugin name may
//! be in flight at a time; a second request gets `Busy` instead of being
//! interleaved.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::application::errors::PluginError;
use crate::infrastructure::artifacts::ArtifactStore;
use crate::infrastructure::deps::DependencyInstaller;
use crate::infrastructure::plugins::loader::PluginLoader;
use crate::infrastructure::plugins::registry::{CapabilityRegistry, LoadState, PluginRecord};

/// One stored artifact streamed back by `export`. Items fail independently;
/// one unreadable file does not abort the rest.
pub struct ExportedArtifact {
    pub name: String,
    pub result: Result<Vec<u8>, PluginError>,
}

pub struct LifecycleService {
    store: ArtifactStore,
    installer: DependencyInstaller,
    loader: PluginLoader,
    registry: Arc<CapabilityRegistry>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// Clears the in-flight mark when an operation ends, by any path.
struct OpGuard {
    name: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for OpGuard {
    fn drop(&mut self) {
        let mut set = match self.in_flight.lock() {
            Ok(set) => set,
            Err(poisoned) => poisoned.into_inner(),
        };
        set.remove(&self.name);
    }
}

impl LifecycleService {
    pub fn new(
        store: ArtifactStore,
        installer: DependencyInstaller,
        loader: PluginLoader,
        registry: Arc<CapabilityRegistry>,
    ) -> Self {
        Self {
            store,
            installer,
            loader,
            registry,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    fn begin(&self, name: &str) -> Result<OpGuard, PluginError> {
        let mut set = match self.in_flight.lock() {
            Ok(set) => set,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !set.insert(name.to_string()) {
            return Err(PluginError::Busy(name.to_string()));
        }
        Ok(OpGuard {
            name: name.to_string(),
            in_flight: self.in_flight.clone(),
        })
    }

    /// Install a plugin from an uploaded artifact, plus an optional
    /// dependency manifest. Any failure after the artifact was written
    /// deletes it again before the error is reported.
    pub async fn install(
        &self,
        file_name: &str,
        bytes: &[u8],
        manifest: Option<&[u8]>,
    ) -> Result<PluginRecord, PluginError> {
        let name = self.store.plugin_name(file_name)?;
        let _guard = self.begin(&name)?;

        let source_path = self.store.save_artifact(&name, bytes).await?;
        let manifest_path = match manifest {
            Some(manifest_bytes) => match self.store.save_manifest(&name, manifest_bytes).await {
                Ok(path) => Some(path),
                Err(err) => {
                    self.roll_back(&name).await;
                    return Err(err);
                }
            },
            None => None,
        };

        if let Err(err) = self.installer.ensure(manifest_path.as_deref()).await {
            // unmet dependencies would usually make the load fail anyway
            self.roll_back(&name).await;
            return Err(err);
        }

        let summary = match self.loader.load(&name, &source_path) {
            Ok(summary) => summary,
            Err(err) => {
                self.roll_back(&name).await;
                return Err(err);
            }
        };

        let record = PluginRecord {
            name: name.clone(),
            source_path,
            manifest_path,
            help_text: summary.help_text.clone(),
            commands: summary.commands.clone(),
            state: LoadState::Loaded,
            module: summary.module.clone(),
        };
        self.registry.register(record.clone());
        info!("Installed plugin: {}", name);
        Ok(record)
    }

    /// Uninstall a plugin by name. Unknown names report `NotFound` without
    /// side effects. The registry entry goes first so no concurrent help or
    /// dispatch lookup can observe a record whose module is already gone.
    pub async fn uninstall(&self, name: &str) -> Result<(), PluginError> {
        ArtifactStore::validate_name(name)?;
        let _guard = self.begin(name)?;

        if !self.store.has_artifact(name) {
            return Err(PluginError::NotFound(name.to_string()));
        }

        self.registry.unregister(name);
        self.loader.unload(name);
        self.store.delete(name).await?;
        info!("Uninstalled plugin: {}", name);
        Ok(())
    }

    /// Read back every stored artifact, best effort per item.
    pub async fn export(&self) -> Result<Vec<ExportedArtifact>, PluginError> {
        let names = self.store.list().await?;
        let mut items = Vec::with_capacity(names.len());
        for name in names {
            let result = self.store.read_artifact(&name).await;
            items.push(ExportedArtifact { name, result });
        }
        Ok(items)
    }

    /// Load and register every stored artifact, typically at startup. A
    /// failing plugin is logged and skipped; the artifact stays on disk so
    /// the operator can fix the environment and restart.
    pub async fn load_installed(&self) -> usize {
        let names = match self.store.list().await {
            Ok(names) => names,
            Err(err) => {
                warn!("Could not scan plugin directory: {}", err);
                return 0;
            }
        };

        let mut count = 0;
        for name in names {
            let path = self.store.artifact_path(&name);
            match self.loader.load(&name, &path) {
                Ok(summary) => {
                    let record = PluginRecord {
                        name: name.clone(),
                        source_path: path,
                        manifest_path: self.store.stored_manifest(&name),
                        help_text: summary.help_text.clone(),
                        commands: summary.commands.clone(),
                        state: LoadState::Loaded,
                        module: summary.module.clone(),
                    };
                    self.registry.register(record);
                    count += 1;
                }
                Err(err) => warn!("Skipping stored plugin '{}': {}", name, err),
            }
        }
        count
    }

    async fn roll_back(&self, name: &str) {
        match self.store.delete(name).await {
            Ok(()) | Err(PluginError::NotFound(_)) => {}
            Err(err) => warn!("Rollback could not delete artifact '{}': {}", name, err),
        }
    }
}
