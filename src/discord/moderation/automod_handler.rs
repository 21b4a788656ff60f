// Inbound message screening. Translates a serenity message into the engine's
// `ObservedMessage` and posts the alert when something is flagged.

use crate::core::moderation::ObservedMessage;
use crate::discord::moderation::alerts::post_alert;
use crate::discord::{participant, Data};
use poise::serenity_prelude as serenity;

pub async fn handle_message(ctx: &serenity::Context, data: &Data, msg: &serenity::Message) {
    if msg.author.bot {
        return;
    }
    // Only the configured guild is moderated; DMs are ignored.
    let guild_id = match msg.guild_id {
        Some(id) if id.get() == data.config.guild_id => id.get(),
        _ => return,
    };

    let observed = ObservedMessage {
        message_id: msg.id.get(),
        channel_id: msg.channel_id.get(),
        guild_id,
        author: participant(&msg.author),
        content: msg.content.clone(),
    };

    if let Some(alert) = data.moderation.screen_message(observed).await {
        post_alert(ctx, data, &alert).await;
    }
}
