use crate::core::verification::{Delivery, IssueReason};
use crate::discord::{embeds, participant, Data};
use crate::discord::logging::post_to_mod_channel;
use poise::serenity_prelude as serenity;
use tracing::error;

/// Send a captcha link to every human who joins the configured guild.
pub async fn handle_member_join(ctx: &serenity::Context, data: &Data, member: &serenity::Member) {
    if member.user.bot || member.guild_id.get() != data.config.guild_id {
        return;
    }

    match data
        .verification
        .issue(participant(&member.user), IssueReason::Join)
        .await
    {
        Ok(outcome) if outcome.delivery == Delivery::Undelivered => {
            // Staff can resume the flow with /reverify once the member opens DMs.
            let embed = serenity::CreateEmbed::new()
                .title("⚠️ Verification link not delivered")
                .description(format!(
                    "Could not reach {} by DM or in the system channel. Use `/reverify` once they can receive messages.",
                    embeds::mention(member.user.id.get())
                ))
                .color(embeds::WARNING)
                .timestamp(serenity::Timestamp::now());
            post_to_mod_channel(ctx, data, embed).await;
        }
        Ok(_) => {}
        Err(e) => error!(user_id = member.user.id.get(), "Failed to issue verification: {}", e),
    }
}
