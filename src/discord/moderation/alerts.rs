// Flagged-message alerts in the mod channel and their action buttons.

use crate::core::moderation::{
    alert_custom_id, parse_alert_custom_id, AlertChoice, AlertError, ModerationAlert,
};
use crate::discord::moderation::commands::receipt_embed;
use crate::discord::{embeds, participant, Data, Error};
use poise::serenity_prelude as serenity;
use tracing::{info, warn};

fn button_style(choice: AlertChoice) -> serenity::ButtonStyle {
    match choice {
        AlertChoice::Warn => serenity::ButtonStyle::Secondary,
        AlertChoice::Timeout => serenity::ButtonStyle::Primary,
        AlertChoice::Kick | AlertChoice::Ban => serenity::ButtonStyle::Danger,
    }
}

fn alert_buttons(alert_id: u64, target_id: u64, disabled: bool) -> Vec<serenity::CreateActionRow> {
    let buttons = AlertChoice::ALL
        .into_iter()
        .map(|choice| {
            serenity::CreateButton::new(alert_custom_id(alert_id, target_id, choice))
                .label(choice.label())
                .style(button_style(choice))
                .disabled(disabled)
        })
        .collect();
    vec![serenity::CreateActionRow::Buttons(buttons)]
}

fn alert_embed(alert: &ModerationAlert) -> serenity::CreateEmbed {
    let removed = if alert.message_deleted {
        "Yes"
    } else {
        "No, remove it manually"
    };
    serenity::CreateEmbed::new()
        .title("🚨 Flagged message")
        .color(embeds::DANGER)
        .field("Member", embeds::describe(&alert.target), true)
        .field("Channel", format!("<#{}>", alert.channel_id), true)
        .field("Message removed", removed, true)
        .field("Matched terms", embeds::field_value(&alert.matches.join(", ")), false)
        .field("Content", embeds::field_value(&alert.excerpt), false)
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Message ID: {}",
            alert.id
        )))
        .timestamp(serenity::Timestamp::now())
}

/// Post a fresh alert with armed buttons, pinging the mod role when configured.
pub async fn post_alert(ctx: &serenity::Context, data: &Data, alert: &ModerationAlert) {
    let mut message = serenity::CreateMessage::new()
        .embed(alert_embed(alert))
        .components(alert_buttons(alert.id, alert.target.id, false));
    if let Some(role_id) = data.config.mod_role_id {
        message = message.content(format!("<@&{}>", role_id));
    }

    let channel = serenity::ChannelId::new(data.config.mod_channel_id);
    if let Err(e) = channel.send_message(&ctx.http, message).await {
        warn!(alert_id = alert.id, "Failed to post moderation alert: {}", e);
    }
}

async fn respond(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    embed: serenity::CreateEmbed,
) -> Result<(), Error> {
    component
        .create_response(
            &ctx.http,
            serenity::CreateInteractionResponse::Message(
                serenity::CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

/// Disable every button on the alert and note who handled it.
async fn close_alert(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    alert_id: u64,
    target_id: u64,
    resolution: Option<String>,
) {
    let mut edit = serenity::EditMessage::new().components(alert_buttons(alert_id, target_id, true));
    if let (Some(resolution), Some(original)) = (resolution, component.message.embeds.first()) {
        let embed = serenity::CreateEmbed::from(original.clone())
            .color(embeds::SUCCESS)
            .field("Resolution", resolution, false);
        edit = edit.embed(embed);
    }
    if let Err(e) = component
        .message
        .channel_id
        .edit_message(&ctx.http, component.message.id, edit)
        .await
    {
        warn!(alert_id, "Failed to disable alert buttons: {}", e);
    }
}

/// Handle a click on an alert button. Clicks on other components are ignored.
pub async fn handle_component(
    ctx: &serenity::Context,
    data: &Data,
    component: &serenity::ComponentInteraction,
) -> Result<(), Error> {
    let Some((alert_id, target_id, choice)) = parse_alert_custom_id(&component.data.custom_id)
    else {
        return Ok(());
    };
    let actor = participant(&component.user);

    match data
        .moderation
        .resolve_alert(alert_id, target_id, choice, actor.clone())
        .await
    {
        Ok((_alert, receipt)) => {
            info!(alert_id, actor_id = actor.id, choice = choice.as_str(), "Alert resolved");
            respond(ctx, component, receipt_embed(&receipt, &actor)).await?;
            let resolution = format!(
                "{} by {}",
                receipt.kind.past_tense(),
                embeds::mention(actor.id)
            );
            close_alert(ctx, component, alert_id, target_id, Some(resolution)).await;
        }
        Err(AlertError::AlreadyResolved) => {
            respond(ctx, component, embeds::error(AlertError::AlreadyResolved.to_string())).await?;
            close_alert(ctx, component, alert_id, target_id, None).await;
        }
        Err(e) => {
            respond(ctx, component, embeds::error(e.to_string())).await?;
        }
    }
    Ok(())
}
