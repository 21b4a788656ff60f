// Moderation slash commands.
//
// Every command builds an `ActionRequest` and hands it to the engine, which
// runs the permission and rank checks itself. Nothing here decides policy.

use crate::core::audit::{ActionKind, ParticipantRef};
use crate::core::moderation::{ActionReceipt, ActionRequest};
use crate::core::platform::Capability;
use crate::discord::logging::post_to_mod_channel;
use crate::discord::{embeds, participant, reply_error, Context, Error};
use poise::serenity_prelude as serenity;
use tracing::info;

/// Embed describing an executed action. Shared with alert buttons.
pub fn receipt_embed(receipt: &ActionReceipt, actor: &ParticipantRef) -> serenity::CreateEmbed {
    let color = match receipt.kind {
        ActionKind::Warn | ActionKind::Timeout => embeds::WARNING,
        ActionKind::Kick | ActionKind::Ban => embeds::DANGER,
        ActionKind::Unban => embeds::SUCCESS,
        ActionKind::Purge => embeds::INFO,
    };

    let mut embed = serenity::CreateEmbed::new()
        .title(format!("🔨 {}", receipt.kind.past_tense()))
        .color(color)
        .field("Moderator", embeds::describe(actor), true)
        .timestamp(serenity::Timestamp::now())
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Action #{}",
            receipt.action_id
        )));

    if let Some(target) = &receipt.target {
        embed = embed.field("Member", embeds::describe(target), true);
    }
    if let Some(minutes) = receipt.duration_minutes {
        embed = embed.field("Duration", format!("{} minutes", minutes), true);
    }
    if let Some(count) = receipt.purged {
        embed = embed.field("Messages deleted", count.to_string(), true);
    }
    embed = embed.field("Reason", embeds::field_value(&receipt.reason), false);

    if receipt.kind != ActionKind::Purge && receipt.kind != ActionKind::Unban {
        let notified = if receipt.notified { "Yes" } else { "No (DMs closed)" };
        embed = embed.field("Member notified", notified, true);
    }
    embed
}

/// Run one request through the engine and report the outcome.
async fn run_action(ctx: Context<'_>, request: ActionRequest) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;
    let actor = request.actor.clone();
    let kind = request.kind;

    match ctx.data().moderation.execute(request).await {
        Ok(receipt) => {
            info!(actor_id = actor.id, kind = %kind, action_id = receipt.action_id, "Command action executed");
            let embed = receipt_embed(&receipt, &actor);
            ctx.send(poise::CreateReply::default().embed(embed.clone()).ephemeral(true))
                .await?;
            post_to_mod_channel(ctx.serenity_context(), ctx.data(), embed).await;
        }
        Err(e) => reply_error(ctx, e.to_string()).await?,
    }
    Ok(())
}

/// Warn a member. The warning is recorded and the member is told by DM.
#[poise::command(slash_command, guild_only)]
pub async fn warn(
    ctx: Context<'_>,
    #[description = "Member to warn"] member: serenity::User,
    #[description = "Why they are being warned"] reason: String,
) -> Result<(), Error> {
    let request = ActionRequest::new(ActionKind::Warn, participant(&member), participant(ctx.author()))
        .with_reason(Some(reason));
    run_action(ctx, request).await
}

/// Kick a member from the server.
#[poise::command(slash_command, guild_only)]
pub async fn kick(
    ctx: Context<'_>,
    #[description = "Member to kick"] member: serenity::User,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    let request = ActionRequest::new(ActionKind::Kick, participant(&member), participant(ctx.author()))
        .with_reason(reason);
    run_action(ctx, request).await
}

/// Ban a member and delete their last day of messages.
#[poise::command(slash_command, guild_only)]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "Member to ban"] member: serenity::User,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    let request = ActionRequest::new(ActionKind::Ban, participant(&member), participant(ctx.author()))
        .with_reason(reason);
    run_action(ctx, request).await
}

/// Time a member out for up to 28 days.
#[poise::command(slash_command, guild_only)]
pub async fn timeout(
    ctx: Context<'_>,
    #[description = "Member to time out"] member: serenity::User,
    #[description = "Duration in minutes (1-40320)"]
    #[min = 1]
    #[max = 40320]
    minutes: u32,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    let request = ActionRequest::new(ActionKind::Timeout, participant(&member), participant(ctx.author()))
        .with_duration(minutes)
        .with_reason(reason);
    run_action(ctx, request).await
}

/// Lift a ban by user id.
#[poise::command(slash_command, guild_only)]
pub async fn unban(
    ctx: Context<'_>,
    #[description = "ID of the banned user"] user_id: String,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    let Ok(id) = user_id.trim().parse::<u64>() else {
        return reply_error(ctx, "That is not a valid user ID").await;
    };
    let request = ActionRequest::new(ActionKind::Unban, ParticipantRef::id_only(id), participant(ctx.author()))
        .with_reason(reason);
    run_action(ctx, request).await
}

/// Bulk-delete recent messages in this channel.
#[poise::command(slash_command, guild_only)]
pub async fn purge(
    ctx: Context<'_>,
    #[description = "How many messages (1-100)"]
    #[min = 1]
    #[max = 100]
    count: u32,
    #[description = "Only delete messages from this member"] member: Option<serenity::User>,
) -> Result<(), Error> {
    let request = ActionRequest::purge(
        participant(ctx.author()),
        ctx.channel_id().get(),
        count,
        member.as_ref().map(participant),
    );
    run_action(ctx, request).await
}

/// Show a member's verification state and moderation record.
#[poise::command(slash_command, guild_only)]
pub async fn userinfo(
    ctx: Context<'_>,
    #[description = "Member to look up"] member: serenity::User,
) -> Result<(), Error> {
    let data = ctx.data();
    if let Err(e) = data
        .moderation
        .authorize(ctx.author().id.get(), Capability::ManageMessages)
        .await
    {
        return reply_error(ctx, e.to_string()).await;
    }

    let id = member.id.get();
    let summary = data.audit.summary(id).await?;
    let state = data.verification.state(id, chrono::Utc::now()).await?;

    let first_seen = summary
        .participant
        .as_ref()
        .map(|p| format!("<t:{}:R>", p.created_at.timestamp()))
        .unwrap_or_else(|| "Never seen".to_string());
    let verified_at = summary
        .participant
        .as_ref()
        .and_then(|p| p.verified_at)
        .map(|at| format!("<t:{}:f>", at.timestamp()))
        .unwrap_or_else(|| "-".to_string());

    let recent = data.audit.history(id, 5).await?;
    let activity = if recent.is_empty() {
        "No recorded activity".to_string()
    } else {
        recent
            .iter()
            .map(|e| format!("<t:{}:R> `{}` {}", e.created_at.timestamp(), e.kind, e.detail))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let embed = embeds::info(&format!("👤 {}", member.name))
        .thumbnail(member.face())
        .field("User", format!("{} (`{}`)", embeds::mention(id), id), false)
        .field("Verification", state.as_str(), true)
        .field("Verified at", verified_at, true)
        .field("First seen", first_seen, true)
        .field("Warnings", summary.warning_count.to_string(), true)
        .field("Actions", summary.action_count.to_string(), true)
        .field("Flagged messages", summary.flagged_message_count.to_string(), true)
        .field("Recent activity", embeds::field_value(&activity), false);

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// List recent moderation actions, optionally for one member.
#[poise::command(slash_command, guild_only)]
pub async fn modlog(
    ctx: Context<'_>,
    #[description = "Only show actions against this member"] member: Option<serenity::User>,
    #[description = "How many entries (1-25, default 10)"]
    #[min = 1]
    #[max = 25]
    limit: Option<u32>,
) -> Result<(), Error> {
    let data = ctx.data();
    if let Err(e) = data
        .moderation
        .authorize(ctx.author().id.get(), Capability::ManageMessages)
        .await
    {
        return reply_error(ctx, e.to_string()).await;
    }

    let actions = data
        .audit
        .mod_log(member.as_ref().map(|m| m.id.get()), limit.unwrap_or(10))
        .await?;

    let title = match &member {
        Some(m) => format!("📋 Moderation log for {}", m.name),
        None => "📋 Moderation log".to_string(),
    };
    let description = if actions.is_empty() {
        "No moderation actions recorded.".to_string()
    } else {
        actions
            .iter()
            .map(|a| {
                let duration = a
                    .duration_minutes
                    .map(|m| format!(" ({}m)", m))
                    .unwrap_or_default();
                format!(
                    "`#{}` **{}**{} {} by {} <t:{}:R>\n└ {}",
                    a.id,
                    a.kind.past_tense(),
                    duration,
                    embeds::mention(a.target_id),
                    embeds::mention(a.moderator_id),
                    a.created_at.timestamp(),
                    a.reason.as_deref().unwrap_or("No reason provided"),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let embed = embeds::info(&title).description(embeds::truncate(&description, 4000));
    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// List recent staff activity, optionally for one moderator.
#[poise::command(slash_command, guild_only)]
pub async fn stafflog(
    ctx: Context<'_>,
    #[description = "Only show this moderator"] moderator: Option<serenity::User>,
    #[description = "How many entries (1-25, default 15)"]
    #[min = 1]
    #[max = 25]
    limit: Option<u32>,
) -> Result<(), Error> {
    let data = ctx.data();
    if let Err(e) = data
        .moderation
        .authorize(ctx.author().id.get(), Capability::Administrator)
        .await
    {
        return reply_error(ctx, e.to_string()).await;
    }

    let events = data
        .audit
        .staff_log(moderator.as_ref().map(|m| m.id.get()), limit.unwrap_or(15))
        .await?;

    let description = if events.is_empty() {
        "No staff activity recorded.".to_string()
    } else {
        events
            .iter()
            .map(|e| {
                format!(
                    "{} <t:{}:R>\n└ {}",
                    embeds::mention(e.subject_id),
                    e.created_at.timestamp(),
                    e.detail
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let embed = embeds::info("🛡️ Staff log").description(embeds::truncate(&description, 4000));
    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Manage the blacklist of flagged words.
#[poise::command(
    slash_command,
    subcommands("blacklist_add", "blacklist_remove", "blacklist_count", "blacklist_reload"),
    guild_only
)]
pub async fn blacklist(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

async fn staff_only(ctx: Context<'_>) -> Result<bool, Error> {
    match ctx
        .data()
        .moderation
        .authorize(ctx.author().id.get(), Capability::ManageMessages)
        .await
    {
        Ok(()) => Ok(true),
        Err(e) => {
            reply_error(ctx, e.to_string()).await?;
            Ok(false)
        }
    }
}

/// Add a word to the blacklist.
#[poise::command(slash_command, guild_only, rename = "add")]
pub async fn blacklist_add(
    ctx: Context<'_>,
    #[description = "Word or phrase to flag"] term: String,
) -> Result<(), Error> {
    if !staff_only(ctx).await? {
        return Ok(());
    }
    let embed = match ctx.data().moderation.matcher().add_term(&term) {
        Ok(true) => {
            info!(actor_id = ctx.author().id.get(), "Blacklist term added");
            embeds::success("Blacklist updated", "Term added.")
        }
        Ok(false) => embeds::info("Blacklist unchanged").description("That term is already blacklisted."),
        Err(e) => embeds::error(e.to_string()),
    };
    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Remove a word from the blacklist.
#[poise::command(slash_command, guild_only, rename = "remove")]
pub async fn blacklist_remove(
    ctx: Context<'_>,
    #[description = "Word or phrase to stop flagging"] term: String,
) -> Result<(), Error> {
    if !staff_only(ctx).await? {
        return Ok(());
    }
    let embed = match ctx.data().moderation.matcher().remove_term(&term) {
        Ok(true) => {
            info!(actor_id = ctx.author().id.get(), "Blacklist term removed");
            embeds::success("Blacklist updated", "Term removed.")
        }
        Ok(false) => embeds::info("Blacklist unchanged").description("That term was not blacklisted."),
        Err(e) => embeds::error(e.to_string()),
    };
    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Show how many terms are blacklisted.
#[poise::command(slash_command, guild_only, rename = "count")]
pub async fn blacklist_count(ctx: Context<'_>) -> Result<(), Error> {
    if !staff_only(ctx).await? {
        return Ok(());
    }
    let count = ctx.data().moderation.matcher().term_count();
    let embed = embeds::info("📝 Blacklist").description(format!("{} terms are blacklisted.", count));
    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Re-read the blacklist file, keeping words added at runtime.
#[poise::command(slash_command, guild_only, rename = "reload")]
pub async fn blacklist_reload(ctx: Context<'_>) -> Result<(), Error> {
    if !staff_only(ctx).await? {
        return Ok(());
    }
    let embed = match ctx.data().moderation.matcher().reload() {
        Ok(count) => embeds::success("Blacklist reloaded", format!("{} terms are now blacklisted.", count)),
        Err(e) => embeds::error(e.to_string()),
    };
    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Every moderation command, for registration.
pub fn all() -> Vec<poise::Command<crate::discord::Data, Error>> {
    vec![
        warn(),
        kick(),
        ban(),
        timeout(),
        unban(),
        purge(),
        userinfo(),
        modlog(),
        stafflog(),
        blacklist(),
    ]
}
