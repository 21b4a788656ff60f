// Bot presence and readiness.
//
// Discord-layer glue only: the web server reads `bot_ready` for `/health`.

use crate::discord::Data;
use poise::serenity_prelude as serenity;
use std::sync::atomic::Ordering;

/// Called once the gateway session is ready.
pub fn on_ready(ctx: &serenity::Context, data: &Data) {
    let activity = serenity::ActivityData::watching("over the server 🛡️");
    ctx.set_presence(Some(activity), serenity::OnlineStatus::Online);
    data.bot_ready.store(true, Ordering::SeqCst);
}
