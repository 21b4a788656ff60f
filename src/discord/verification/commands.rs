use crate::core::verification::Delivery;
use crate::discord::{embeds, participant, reply_error, Context, Error};
use poise::serenity_prelude as serenity;

/// Send a member a fresh verification link.
#[poise::command(slash_command, guild_only)]
pub async fn reverify(
    ctx: Context<'_>,
    #[description = "Member who needs a new link"] member: serenity::User,
) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;

    let outcome = match ctx
        .data()
        .verification
        .reissue(ctx.author().id.get(), participant(&member))
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => return reply_error(ctx, e.to_string()).await,
    };

    let embed = match outcome.delivery {
        Delivery::Direct | Delivery::Fallback => embeds::success(
            "Verification link sent",
            format!(
                "Sent {} a new link via {}.",
                embeds::mention(member.id.get()),
                outcome.delivery.as_str()
            ),
        ),
        Delivery::Undelivered => serenity::CreateEmbed::new()
            .title("⚠️ Link not delivered")
            .description(format!(
                "{} could not be reached. Share this link with them directly:\n{}",
                embeds::mention(member.id.get()),
                outcome.link
            ))
            .color(embeds::WARNING),
    };

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}
