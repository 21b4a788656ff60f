// This is the entry point of the moderation bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (SQLite, hCaptcha)
// - `discord/` = Discord-specific adapters (commands, events, platform port)
// - `web/` = The captcha verification web server
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Start the verification web server
// 4. Set up the Discord framework and event handlers

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;
#[path = "web/web_layer.rs"]
mod web;

mod config;

use crate::config::BotConfig;
use crate::core::audit::AuditLog;
use crate::core::automod::BlacklistMatcher;
use crate::core::moderation::ModerationService;
use crate::core::verification::{ChallengeTokenService, VerificationService};
use crate::discord::logging::events as logging_events;
use crate::discord::moderation::{alerts, automod_handler};
use crate::discord::platform::SerenityPlatform;
use crate::discord::verification::join_handler;
use crate::discord::{presence, Data, Error};
use crate::infra::audit::SqliteAuditStore;
use crate::infra::verification::HcaptchaClient;
use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Built-in blacklist terms. Real deployments extend this through `BLACKLIST_FILE`.
const DEFAULT_BLACKLIST: &[&str] = &[];

/// Event handler for non-command Discord events.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            automod_handler::handle_message(ctx, data, new_message).await;
        }
        serenity::FullEvent::InteractionCreate {
            interaction: serenity::Interaction::Component(component),
        } => {
            if let Err(e) = alerts::handle_component(ctx, data, component).await {
                tracing::error!("Error handling alert button: {}", e);
            }
        }
        serenity::FullEvent::GuildMemberAddition { new_member } => {
            logging_events::handle_member_join(ctx, data, new_member).await;
            join_handler::handle_member_join(ctx, data, new_member).await;
        }
        serenity::FullEvent::GuildMemberRemoval {
            guild_id,
            user,
            member_data_if_available,
        } => {
            logging_events::handle_member_remove(
                ctx,
                data,
                *guild_id,
                user,
                member_data_if_available.as_ref(),
            )
            .await;
        }
        serenity::FullEvent::GuildMemberUpdate {
            old_if_available,
            event,
            ..
        } => {
            logging_events::handle_member_update(ctx, data, old_if_available.as_ref(), event)
                .await;
        }
        serenity::FullEvent::MessageUpdate {
            old_if_available,
            event,
            ..
        } => {
            logging_events::handle_message_update(ctx, data, old_if_available.as_ref(), event)
                .await;
        }
        serenity::FullEvent::MessageDelete {
            channel_id,
            deleted_message_id,
            guild_id,
        } => {
            logging_events::handle_message_delete(
                ctx,
                data,
                *channel_id,
                *deleted_message_id,
                *guild_id,
            )
            .await;
        }
        serenity::FullEvent::GuildBanAddition {
            guild_id,
            banned_user,
        } => {
            logging_events::handle_ban(ctx, data, *guild_id, banned_user, true).await;
        }
        serenity::FullEvent::GuildBanRemoval {
            guild_id,
            unbanned_user,
        } => {
            logging_events::handle_ban(ctx, data, *guild_id, unbanned_user, false).await;
        }
        serenity::FullEvent::VoiceStateUpdate { old, new } => {
            logging_events::handle_voice_state_update(ctx, data, old.as_ref(), new).await;
        }

        _ => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = BotConfig::from_env().context("Invalid configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Create our services with their dependencies.
    // This is the "composition root" where we wire everything together.

    let store = SqliteAuditStore::connect(&config.database_url)
        .await
        .context("Failed to initialize the audit database")?;

    let matcher = Arc::new(
        BlacklistMatcher::load(DEFAULT_BLACKLIST, &config.blacklist_file)
            .context("Failed to load the blacklist")?,
    );

    let verifier = HcaptchaClient::new(config.hcaptcha_secret_key.clone())
        .context("Failed to create the hCaptcha client")?;
    let tokens = ChallengeTokenService::new(&config.signing_secret);

    // The gateway client does not exist yet, so the platform adapter gets its own HTTP client.
    let http = Arc::new(serenity::Http::new(&config.discord_token));
    let platform = Arc::new(SerenityPlatform::new(
        http,
        config.guild_id,
        config.verified_role_id,
    ));

    let audit = Arc::new(AuditLog::new(store.clone()));
    let moderation = Arc::new(ModerationService::new(
        store.clone(),
        Arc::clone(&platform),
        Arc::clone(&matcher),
    ));
    let verification = Arc::new(VerificationService::new(
        store,
        Arc::clone(&platform),
        verifier,
        tokens,
        &config.captcha_server_url,
    ));

    let bot_ready = Arc::new(AtomicBool::new(false));
    let config = Arc::new(config);

    // ========================================================================
    // VERIFICATION WEB SERVER
    // ========================================================================

    let web_state = Arc::new(web::WebState {
        verification: Arc::clone(&verification),
        site_key: config.hcaptcha_site_key.clone(),
        bot_ready: Arc::clone(&bot_ready),
    });
    let app = web::router(web_state);
    let port = config.port;
    tokio::spawn(async move {
        if let Err(e) = web::serve(app, port).await {
            tracing::error!("Verification server stopped: {}", e);
        }
    });

    let data = Data {
        audit,
        moderation,
        verification,
        config: Arc::clone(&config),
        bot_ready,
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to screen message content
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_MODERATION
        | serenity::GatewayIntents::GUILD_VOICE_STATES
        | serenity::GatewayIntents::DIRECT_MESSAGES;

    let mut commands = discord::moderation::commands::all();
    commands.push(discord::verification::commands::reverify());

    let guild_id = serenity::GuildId::new(config.guild_id);
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands,
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                tracing::info!(user = %ready.user.name, "Connected to Discord");

                poise::builtins::register_in_guild(ctx, &framework.options().commands, guild_id)
                    .await?;
                tracing::info!("Commands registered");

                presence::on_ready(ctx, &data);
                Ok(data)
            })
        })
        .build();

    // The message cache backs edit/delete logging for messages we never stored.
    let mut settings = serenity::cache::Settings::default();
    settings.max_messages = 10000;

    let mut client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .cache_settings(settings)
        .await
        .context("Error creating client")?;

    client.start().await.context("Error running bot")?;
    Ok(())
}
