//! Application services - Business logic orchestration

pub mod command_service;
pub mod supervisor;

pub use command_service::CommandService;
pub use supervisor::{ConnectionSupervisor, SupervisorHandle};
