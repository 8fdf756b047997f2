//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::application::errors::ConfigError;

/// Bot configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub bot: BotConfig,
    pub owner: OwnerConfig,
    pub plugins: PluginsConfig,
    pub installer: InstallerConfig,
    pub logging: LoggingConfig,
    pub adapters: AdaptersConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BotConfig {
    pub name: String,
    pub prefix: String,
}

/// The single operator allowed to manage the plugin lifecycle
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OwnerConfig {
    pub id: String,
    pub notify_on_start: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PluginsConfig {
    pub directory: PathBuf,
    pub artifact_extension: String,
    pub manifest_extension: String,
    pub auto_load: bool,
}

/// Host package tool invoked for plugin dependency manifests.
/// The manifest path is appended as the final argument.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct InstallerConfig {
    pub program: String,
    pub args: Vec<String>,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoggingConfig {
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AdaptersConfig {
    pub telegram: Option<TelegramConfig>,
    pub console: Option<ConsoleConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TelegramConfig {
    pub enabled: bool,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConsoleConfig {
    pub enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot: BotConfig {
                name: "tessera-bot".to_string(),
                prefix: "/".to_string(),
            },
            owner: OwnerConfig {
                id: String::new(),
                notify_on_start: true,
            },
            plugins: PluginsConfig {
                directory: PathBuf::from("./plugins"),
                artifact_extension: "so".to_string(),
                manifest_extension: "txt".to_string(),
                auto_load: true,
            },
            installer: InstallerConfig {
                program: "pip".to_string(),
                args: vec!["install".to_string(), "-r".to_string()],
                timeout_seconds: 60,
            },
            logging: LoggingConfig {
                file: Some(PathBuf::from("tessera-bot.log")),
            },
            adapters: AdaptersConfig {
                telegram: Some(TelegramConfig {
                    enabled: false,
                    token: None,
                }),
                console: Some(ConsoleConfig {
                    enabled: true,
                }),
            },
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))
    }

    /// Check if a user ID is the configured owner. An unset owner id never
    /// matches, so lifecycle commands stay locked until one is configured.
    pub fn is_owner(&self, user_id: &str) -> bool {
        !self.owner.id.is_empty() && self.owner.id == user_id
    }

    pub fn load_env() -> Self {
        // Load from environment variables
        let mut config = Config::default();

        if let Ok(token) = std::env::var("BOT_TOKEN") {
            if let Some(ref mut tg) = config.adapters.telegram {
                tg.token = Some(token);
                tg.enabled = true;
            }
        }

        if let Ok(prefix) = std::env::var("BOT_PREFIX") {
            config.bot.prefix = prefix;
        }

        if let Ok(owner) = std::env::var("BOT_OWNER_ID") {
            config.owner.id = owner;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roundtrip() {
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.bot.prefix, "/");
        assert_eq!(parsed.plugins.artifact_extension, "so");
        assert_eq!(parsed.installer.timeout_seconds, 60);
    }

    #[test]
    fn test_owner_check() {
        let mut config = Config::default();
        assert!(!config.is_owner("12345"), "unset owner must match nobody");

        config.owner.id = "12345".to_string();
        assert!(config.is_owner("12345"));
        assert!(!config.is_owner("99999"));
    }

    #[test]
    fn test_partial_config_uses_kebab_case() {
        let yaml = r#"
bot:
  name: test
  prefix: "!"
owner:
  id: "42"
  notify-on-start: false
plugins:
  directory: /tmp/plugins
  artifact-extension: so
  manifest-extension: txt
  auto-load: false
installer:
  program: apt-get
  args: ["install", "-y"]
  timeout-seconds: 30
logging:
  file: null
adapters:
  telegram: null
  console:
    enabled: true
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.bot.prefix, "!");
        assert!(!config.owner.notify_on_start);
        assert_eq!(config.installer.program, "apt-get");
        assert!(config.logging.file.is_none());
    }
}
