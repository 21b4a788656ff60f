// Core moderation module - the action engine, message screening and alerts.
// Following the same pattern as the audit module.

pub mod moderation_models;
pub mod moderation_service;

pub use moderation_models::*;
pub use moderation_service::*;
