// Discord side of moderation: commands, automod screening and alert buttons.

pub mod alerts;
pub mod automod_handler;
pub mod commands;
