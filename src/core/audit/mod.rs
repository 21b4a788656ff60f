// Core audit module - participants, content records, actions and the event trail.

pub mod audit_models;
pub mod audit_service;

pub use audit_models::*;
pub use audit_service::*;
