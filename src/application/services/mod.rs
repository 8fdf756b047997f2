//! Application services

pub mod command_service;
pub mod lifecycle;


pub use command_service::CommandService;
pub use lifecycle::{ExportedArtifact, LifecycleService};
