// Passive audit listeners and the mod channel they mirror into.

pub mod events;
pub mod formatter;

use crate::discord::Data;
use poise::serenity_prelude as serenity;

/// Best-effort post to the configured mod channel.
pub async fn post_to_mod_channel(ctx: &serenity::Context, data: &Data, embed: serenity::CreateEmbed) {
    let channel = serenity::ChannelId::new(data.config.mod_channel_id);
    if let Err(e) = channel
        .send_message(&ctx.http, serenity::CreateMessage::new().embed(embed))
        .await
    {
        tracing::warn!("Failed to send log to channel {}: {}", channel, e);
    }
}
