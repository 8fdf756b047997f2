//! Application layer errors

use thiserror::Error;

/// General bot errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Command execution errors
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Command not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Permission denied")]
    PermissionDenied,
}

/// Plugin lifecycle errors
///
/// Every failure mode of install/uninstall is represented here so the
/// lifecycle coordinator can hand a structured result back to the command
/// surface instead of letting a fault escape and take the process down.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Invalid artifact name: {0}")]
    InvalidArtifactName(String),

    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Dependency install failed ({}): {output}", exit_label(.exit_code))]
    DependencyInstallFailed {
        /// None when the installer was killed before it could exit
        exit_code: Option<i32>,
        output: String,
    },

    #[error("Load failed: {0}")]
    LoadFailed(String),

    #[error("Another operation on plugin '{0}' is already in flight")]
    Busy(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {}", c),
        None => "terminated".to_string(),
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
