// Core platform module - the port the engine and verification flow talk through.

pub mod community_platform;

pub use community_platform::*;
