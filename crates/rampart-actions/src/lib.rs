//! # rampart-actions
//!
//! Containment and notification action plugins for Rampart.
//!
//! This crate provides the action registry and the built-in response
//! actions, and adapts them to the core engine's executor seam via
//! [`RegistryExecutor`].

pub mod block_ip;
pub mod disable_user;
pub mod isolate_host;
pub mod notify;
pub mod registry;

pub use block_ip::BlockIpAction;
pub use disable_user::DisableUserAction;
pub use isolate_host::IsolateHostAction;
pub use notify::SendNotificationAction;
pub use registry::{
    Action, ActionContext, ActionError, ActionRegistry, ActionResult, ParameterDef,
    ParameterType, RegistryExecutor,
};

use std::sync::Arc;

/// Builds a registry populated with the built-in actions.
pub fn default_registry() -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register(Arc::new(BlockIpAction::new()));
    registry.register(Arc::new(IsolateHostAction::new()));
    registry.register(Arc::new(DisableUserAction::new()));
    registry.register(Arc::new(SendNotificationAction::new()));
    registry
}
