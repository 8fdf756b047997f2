//! Dependency installer - runs the host package tool for plugin manifests

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::application::errors::PluginError;
use crate::infrastructure::config::InstallerConfig;

/// Invokes the configured package tool as a subprocess with a dependency
/// manifest as its final argument. Failure is always reported as a value;
/// an owner-triggered install must not be able to hang or crash the host.
pub struct DependencyInstaller {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl DependencyInstaller {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &InstallerConfig) -> Self {
        Self::new(
            &config.program,
            config.args.clone(),
            Duration::from_secs(config.timeout_seconds),
        )
    }

    /// No-op success when there is no manifest; otherwise run the package
    /// tool and map a non-zero exit or a timeout to `DependencyInstallFailed`.
    pub async fn ensure(&self, manifest: Option<&Path>) -> Result<(), PluginError> {
        let Some(path) = manifest else {
            return Ok(());
        };
        if !path.exists() {
            debug!("No dependency manifest at {}", path.display());
            return Ok(());
        }

        info!("Installing dependencies from {}", path.display());
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // dropping the future on timeout must reap the subprocess
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(PluginError::DependencyInstallFailed {
                    exit_code: None,
                    output: format!("timed out after {}s", self.timeout.as_secs()),
                });
            }
        };

        if output.status.success() {
            return Ok(());
        }

        let mut captured = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !captured.is_empty() {
                captured.push('\n');
            }
            captured.push_str(stderr.trim());
        }

        Err(PluginError::DependencyInstallFailed {
            exit_code: output.status.code(),
            output: captured,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn manifest_file(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("deps.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "somepackage").unwrap();
        path
    }

    #[tokio::test]
    async fn test_no_manifest_is_noop() {
        let installer = DependencyInstaller::new("false", vec![], Duration::from_secs(5));
        assert!(installer.ensure(None).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_manifest_file_is_noop() {
        let installer = DependencyInstaller::new("false", vec![], Duration::from_secs(5));
        let missing = Path::new("/nonexistent/deps.txt");
        assert!(installer.ensure(Some(missing)).await.is_ok());
    }

    #[tokio::test]
    async fn test_zero_exit_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest_file(dir.path());

        let installer =
            DependencyInstaller::new("sh", vec!["-c".into(), "true".into()], Duration::from_secs(5));
        assert!(installer.ensure(Some(&manifest)).await.is_ok());
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_code_and_output() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest_file(dir.path());

        let installer = DependencyInstaller::new(
            "sh",
            vec!["-c".into(), "echo boom >&2; exit 7".into()],
            Duration::from_secs(5),
        );
        match installer.ensure(Some(&manifest)).await {
            Err(PluginError::DependencyInstallFailed { exit_code, output }) => {
                assert_eq!(exit_code, Some(7));
                assert!(output.contains("boom"), "output was {:?}", output);
            }
            other => panic!("expected DependencyInstallFailed, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_timeout_reports_dependency_failure() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest_file(dir.path());

        let installer = DependencyInstaller::new(
            "sh",
            vec!["-c".into(), "sleep 5".into()],
            Duration::from_millis(200),
        );
        match installer.ensure(Some(&manifest)).await {
            Err(PluginError::DependencyInstallFailed { exit_code, output }) => {
                assert_eq!(exit_code, None);
                assert!(output.contains("timed out"), "output was {:?}", output);
            }
            other => panic!("expected timeout failure, got {:?}", other.err()),
        }
    }
}
