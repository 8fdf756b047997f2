//! Domain entities

pub mod command;
pub mod message;
pub mod user;

pub use command::{Command, CommandRegistry, PERMISSION_OWNER};
pub use message::{Content, Message, MessageType};
pub use user::User;
