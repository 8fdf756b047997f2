//! Artifact store - the on-disk files behind installed plugins
//!
//! One artifact file per plugin, named `<name>.<artifact-ext>`, with an
//! optional sibling dependency manifest `<name>.<manifest-ext>`. The store
//! exclusively owns artifact lifecycle; nothing else in the process creates
//! or deletes files in the plugin directory.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::application::errors::PluginError;

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_-]*$").expect("valid name pattern"));

pub struct ArtifactStore {
    directory: PathBuf,
    artifact_ext: String,
    manifest_ext: String,
}

impl ArtifactStore {
    pub fn new(
        directory: impl Into<PathBuf>,
        artifact_ext: impl Into<String>,
        manifest_ext: impl Into<String>,
    ) -> Self {
        Self {
            directory: directory.into(),
            artifact_ext: artifact_ext.into(),
            manifest_ext: manifest_ext.into(),
        }
    }

    pub async fn init(&self) -> Result<(), PluginError> {
        tokio::fs::create_dir_all(&self.directory).await?;
        Ok(())
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Validate a bare plugin name: non-empty, no path separators or
    /// traversal segments, nothing outside the allowed character set.
    pub fn validate_name(name: &str) -> Result<(), PluginError> {
        if name.is_empty() {
            return Err(PluginError::InvalidArtifactName("name is empty".to_string()));
        }
        if !NAME_RE.is_match(name) {
            return Err(PluginError::InvalidArtifactName(format!(
                "'{}' contains characters outside [A-Za-z0-9_-]",
                name
            )));
        }
        Ok(())
    }

    /// Derive the plugin name from an uploaded file name, enforcing the
    /// artifact extension marker.
    pub fn plugin_name(&self, file_name: &str) -> Result<String, PluginError> {
        let suffix = format!(".{}", self.artifact_ext);
        let stem = file_name.strip_suffix(suffix.as_str()).ok_or_else(|| {
            PluginError::InvalidArtifactName(format!(
                "'{}' does not end with .{}",
                file_name, self.artifact_ext
            ))
        })?;
        Self::validate_name(stem)?;
        Ok(stem.to_string())
    }

    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{}.{}", name, self.artifact_ext))
    }

    pub fn manifest_path(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{}.{}", name, self.manifest_ext))
    }

    pub fn has_artifact(&self, name: &str) -> bool {
        Self::validate_name(name).is_ok() && self.artifact_path(name).exists()
    }

    /// Path of the stored manifest for `name`, if one exists on disk.
    pub fn stored_manifest(&self, name: &str) -> Option<PathBuf> {
        let path = self.manifest_path(name);
        path.exists().then_some(path)
    }

    pub async fn save_artifact(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, PluginError> {
        Self::validate_name(name)?;
        let path = self.artifact_path(name);
        tokio::fs::write(&path, bytes).await?;
        debug!("Saved artifact {}", path.display());
        Ok(path)
    }

    pub async fn save_manifest(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, PluginError> {
        Self::validate_name(name)?;
        let path = self.manifest_path(name);
        tokio::fs::write(&path, bytes).await?;
        debug!("Saved manifest {}", path.display());
        Ok(path)
    }

    pub async fn read_artifact(&self, name: &str) -> Result<Vec<u8>, PluginError> {
        Self::validate_name(name)?;
        let path = self.artifact_path(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PluginError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the artifact for `name`, plus its manifest when present.
    /// Reports `NotFound` when no artifact is stored; the caller turns that
    /// into a user-visible message rather than a fault.
    pub async fn delete(&self, name: &str) -> Result<(), PluginError> {
        Self::validate_name(name)?;
        let path = self.artifact_path(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PluginError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        let manifest = self.manifest_path(name);
        if let Err(e) = tokio::fs::remove_file(&manifest).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }
        debug!("Deleted artifact {}", path.display());
        Ok(())
    }

    /// Enumerate stored plugin names (artifact files only, manifests are
    /// not listed). Sorted so export output is stable.
    pub async fn list(&self) -> Result<Vec<String>, PluginError> {
        let suffix = format!(".{}", self.artifact_ext);
        let mut names = Vec::new();

        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(stem) = file_name.strip_suffix(suffix.as_str()) {
                if Self::validate_name(stem).is_ok() {
                    names.push(stem.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::PluginError;

    fn store(dir: &Path) -> ArtifactStore {
        ArtifactStore::new(dir, "so", "txt")
    }

    #[test]
    fn test_plugin_name_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        assert_eq!(store.plugin_name("greet.so").unwrap(), "greet");
        assert_eq!(store.plugin_name("my_plugin-2.so").unwrap(), "my_plugin-2");
    }

    #[test]
    fn test_plugin_name_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        for bad in [
            "greet.txt",
            "greet",
            ".so",
            "../evil.so",
            "a/b.so",
            "sp ace.so",
            "",
        ] {
            assert!(
                matches!(store.plugin_name(bad), Err(PluginError::InvalidArtifactName(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_save_list_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.init().await.unwrap();

        store.save_artifact("greet", b"payload").await.unwrap();
        store.save_artifact("other", b"x").await.unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["greet", "other"]);
        assert_eq!(store.read_artifact("greet").await.unwrap(), b"payload");
        assert!(store.has_artifact("greet"));

        store.delete("greet").await.unwrap();
        assert!(!store.has_artifact("greet"));
        assert_eq!(store.list().await.unwrap(), vec!["other"]);
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.init().await.unwrap();

        assert!(matches!(
            store.delete("ghost").await,
            Err(PluginError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_manifest_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.init().await.unwrap();

        store.save_artifact("dep", b"lib").await.unwrap();
        store.save_manifest("dep", b"requests\n").await.unwrap();
        assert!(store.stored_manifest("dep").is_some());

        store.delete("dep").await.unwrap();
        assert!(store.stored_manifest("dep").is_none());
        assert!(!store.has_artifact("dep"));
    }

    #[tokio::test]
    async fn test_list_skips_manifests() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.init().await.unwrap();

        store.save_artifact("dep", b"lib").await.unwrap();
        store.save_manifest("dep", b"requests\n").await.unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["dep"]);
    }
}
