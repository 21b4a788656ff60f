// The core module contains all business logic.
// Each feature gets its own submodule; nothing here talks to Discord or SQLite directly.

#[path = "audit/mod.rs"]
pub mod audit;

#[path = "automod/mod.rs"]
pub mod automod;

#[path = "moderation/mod.rs"]
pub mod moderation;

#[path = "platform/mod.rs"]
pub mod platform;

#[path = "verification/mod.rs"]
pub mod verification;
