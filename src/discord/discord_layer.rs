// Discord layer - commands, event listeners and the platform adapter.
//
// This layer is THIN: it turns serenity types into core requests and core
// results into embeds. Rules live in `core/`.

#[path = "embeds.rs"]
pub mod embeds;

#[path = "logging/mod.rs"]
pub mod logging;

#[path = "moderation/mod.rs"]
pub mod moderation;

#[path = "platform/serenity_platform.rs"]
pub mod platform;

#[path = "presence.rs"]
pub mod presence;

#[path = "verification/mod.rs"]
pub mod verification;

use crate::config::BotConfig;
use crate::core::audit::{AuditLog, ParticipantRef};
use crate::core::moderation::ModerationService;
use crate::core::verification::VerificationService;
use crate::infra::audit::SqliteAuditStore;
use crate::infra::verification::HcaptchaClient;
use platform::SerenityPlatform;
use poise::serenity_prelude as serenity;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub type Moderation = ModerationService<SqliteAuditStore, SerenityPlatform>;
pub type Verification = VerificationService<SqliteAuditStore, SerenityPlatform, HcaptchaClient>;

/// Shared state handed to every command and event handler.
pub struct Data {
    pub audit: Arc<AuditLog<SqliteAuditStore>>,
    pub moderation: Arc<Moderation>,
    pub verification: Arc<Verification>,
    pub config: Arc<BotConfig>,
    pub bot_ready: Arc<AtomicBool>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

pub fn participant(user: &serenity::User) -> ParticipantRef {
    ParticipantRef::named(user.id.get(), user.name.clone())
}

/// Reply with an ephemeral error embed. Used for every rejected command.
pub async fn reply_error(ctx: Context<'_>, message: impl Into<String>) -> Result<(), Error> {
    ctx.send(
        poise::CreateReply::default()
            .embed(embeds::error(message))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}
