use crate::domain::entities::{Command, CommandRegistry, Content, Message, PERMISSION_OWNER};
use crate::application::errors::CommandError;

/// Service for managing and executing the static (non-plugin) commands
pub struct CommandService {
    registry: CommandRegistry,
    prefix: String,
    owner_id: Option<String>,
}

impl CommandService {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            registry: CommandRegistry::new(),
            prefix: prefix.into(),
            owner_id: None,
        }
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        let owner_id = owner_id.into();
        if !owner_id.is_empty() {
            self.owner_id = Some(owner_id);
        }
        self
    }

    pub fn register(&mut self, command: Command) {
        self.registry.register(command);
    }

    pub fn register_defaults(&mut self) {
        self.register(Command::new("start")
            .with_description("Start the bot")
            .with_handler(|_| {
                Ok("Hello! I'm a group management bot!".to_string())
            }));

        self.register(Command::new("version")
            .with_description("Show bot version")
            .with_handler(|_| {
                Ok(format!("tessera-bot v{}", env!("CARGO_PKG_VERSION")))
            }));

        self.register(Command::new("dev")
            .with_description("Developer mode")
            .with_permission(PERMISSION_OWNER)
            .with_handler(|_| {
                Ok("Developer mode active. Use /devhelp for all commands.".to_string())
            }));

        self.register(Command::new("devhelp")
            .with_description("List developer commands")
            .with_usage("/devhelp")
            .with_aliases(vec!["dh".to_string()])
            .with_permission(PERMISSION_OWNER)
            .with_handler(|_| {
                Ok("\
/install - Install a plugin (reply to an uploaded artifact).\n\
/uninstall <name> - Uninstall a plugin.\n\
/export - Export installed plugins.\n\
/log - Get the bot's logs.\n\
/reset - Reset bot data.\n\
/restart - Restart the bot.\n\
/leave <chat_id> - Force bot to leave a chat."
                    .to_string())
            }));

        // acknowledged but deliberately non-destructive
        self.register(Command::new("reset")
            .with_description("Reset bot data")
            .with_permission(PERMISSION_OWNER)
            .with_handler(|_| {
                Ok("Bot reset successfully!".to_string())
            }));
    }

    /// Dispatch a parsed command message. Owner-only commands require the
    /// sender to match the configured owner id.
    pub fn handle(&self, message: &Message) -> Result<Option<String>, CommandError> {
        let Content::Command { name, .. } = &message.content else {
            return Ok(None);
        };

        let cmd = self.registry.find(name)
            .ok_or_else(|| CommandError::NotFound(name.clone()))?;

        if cmd.owner_only() && !self.is_owner(message.sender_id()) {
            return Err(CommandError::PermissionDenied);
        }

        if let Some(handler) = &cmd.handler {
            Ok(Some(handler(message.clone())?))
        } else {
            Ok(Some(format!("Command {} not implemented", cmd.name)))
        }
    }

    pub fn is_owner(&self, sender_id: Option<&str>) -> bool {
        match (&self.owner_id, sender_id) {
            (Some(owner), Some(sender)) => owner == sender,
            _ => false,
        }
    }

    pub fn get_help(&self, command: Option<&str>) -> String {
        if let Some(name) = command {
            if let Some(cmd) = self.registry.get(name) {
                let mut help = format!("/{} - {}", cmd.name, cmd.description.as_deref().unwrap_or("No description"));
                if let Some(usage) = &cmd.usage {
                    help.push_str(&format!("\nUsage: {}", usage));
                }
                return help;
            }
            return format!("Command /{} not found", name);
        }

        let mut help = "Available commands:\n".to_string();
        for cmd in self.registry.all() {
            help.push_str(&format!("  /{} - {}\n", cmd.name, cmd.description.as_deref().unwrap_or("")));
        }
        help
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::User;

    fn command(name: &str, sender: Option<&str>) -> Message {
        let msg = Message::from_command("chat", name, vec![]);
        match sender {
            Some(id) => msg.with_sender(User::new(id)),
            None => msg,
        }
    }

    fn service() -> CommandService {
        let mut service = CommandService::new("/").with_owner("42");
        service.register_defaults();
        service
    }

    #[test]
    fn test_public_command() {
        let service = service();
        let response = service.handle(&command("start", None)).unwrap().unwrap();
        assert!(response.contains("group management bot"));
    }

    #[test]
    fn test_owner_gate() {
        let service = service();

        assert!(matches!(
            service.handle(&command("dev", Some("99"))),
            Err(CommandError::PermissionDenied)
        ));
        assert!(matches!(
            service.handle(&command("dev", None)),
            Err(CommandError::PermissionDenied)
        ));

        let response = service.handle(&command("dev", Some("42"))).unwrap().unwrap();
        assert!(response.contains("Developer mode"));
    }

    #[test]
    fn test_unknown_command() {
        let service = service();
        assert!(matches!(
            service.handle(&command("nope", None)),
            Err(CommandError::NotFound(_))
        ));
    }

    #[test]
    fn test_reset_is_acknowledge_only() {
        let service = service();
        let response = service.handle(&command("reset", Some("42"))).unwrap().unwrap();
        assert_eq!(response, "Bot reset successfully!");
    }
}
