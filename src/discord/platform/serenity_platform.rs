// Discord implementation of the platform port.
//
// Ranks and capabilities are computed from the guild's role table over HTTP so
// the answer is correct even when the member is not cached.

use crate::core::platform::{
    Capability, CommunityPlatform, Effect, EffectOutcome, Notice, PlatformError,
};
use crate::discord::embeds;
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SerenityPlatform {
    http: Arc<serenity::Http>,
    guild_id: serenity::GuildId,
    verified_role_id: serenity::RoleId,
}

impl SerenityPlatform {
    pub fn new(http: Arc<serenity::Http>, guild_id: u64, verified_role_id: u64) -> Self {
        Self {
            http,
            guild_id: serenity::GuildId::new(guild_id),
            verified_role_id: serenity::RoleId::new(verified_role_id),
        }
    }

    async fn guild(&self) -> Result<serenity::PartialGuild, PlatformError> {
        self.guild_id
            .to_partial_guild(&self.http)
            .await
            .map_err(map_error)
    }

    async fn member(&self, user_id: u64) -> Result<serenity::Member, PlatformError> {
        self.guild_id
            .member(&self.http, serenity::UserId::new(user_id))
            .await
            .map_err(map_error)
    }

    async fn permissions(&self, user_id: u64) -> Result<serenity::Permissions, PlatformError> {
        let guild = self.guild().await?;
        if guild.owner_id.get() == user_id {
            return Ok(serenity::Permissions::all());
        }
        let member = self.member(user_id).await?;

        // @everyone shares the guild's id.
        let everyone = serenity::RoleId::new(self.guild_id.get());
        let mut permissions = guild
            .roles
            .get(&everyone)
            .map(|r| r.permissions)
            .unwrap_or_else(serenity::Permissions::empty);
        for role_id in &member.roles {
            if let Some(role) = guild.roles.get(role_id) {
                permissions |= role.permissions;
            }
        }
        Ok(permissions)
    }

    async fn purge(
        &self,
        channel_id: u64,
        limit: u32,
        author_id: Option<u64>,
    ) -> Result<EffectOutcome, PlatformError> {
        let channel = serenity::ChannelId::new(channel_id);
        // Fetch a full page when filtering so `limit` applies to the author's messages.
        let fetch = if author_id.is_some() { 100 } else { limit.min(100) as u8 };
        let messages = channel
            .messages(&self.http, serenity::GetMessages::new().limit(fetch))
            .await
            .map_err(map_error)?;

        let ids: Vec<serenity::MessageId> = messages
            .iter()
            .filter(|m| author_id.map_or(true, |a| m.author.id.get() == a))
            .take(limit as usize)
            .map(|m| m.id)
            .collect();

        let (mut bulk, single) = split_for_bulk_delete(&ids, chrono::Utc::now().timestamp());
        if bulk.len() >= 2 {
            channel
                .delete_messages(&self.http, bulk.iter().copied())
                .await
                .map_err(map_error)?;
            bulk.clear();
        }
        for id in bulk.into_iter().chain(single) {
            channel
                .delete_message(&self.http, id)
                .await
                .map_err(map_error)?;
        }
        Ok(EffectOutcome::Purged(ids.len()))
    }
}

/// Discord rejects a bulk delete containing any message older than this.
const BULK_DELETE_MAX_AGE_SECS: i64 = 14 * 24 * 60 * 60;

/// Split ids into (bulk-deletable, must-delete-individually) as of `now`.
fn split_for_bulk_delete(
    ids: &[serenity::MessageId],
    now: i64,
) -> (Vec<serenity::MessageId>, Vec<serenity::MessageId>) {
    ids.iter()
        .copied()
        .partition(|id| now - id.created_at().unix_timestamp() < BULK_DELETE_MAX_AGE_SECS)
}

fn required_permission(capability: Capability) -> serenity::Permissions {
    match capability {
        Capability::ManageMessages => serenity::Permissions::MANAGE_MESSAGES,
        Capability::ModerateMembers => serenity::Permissions::MODERATE_MEMBERS,
        Capability::KickMembers => serenity::Permissions::KICK_MEMBERS,
        Capability::BanMembers => serenity::Permissions::BAN_MEMBERS,
        Capability::ManageRoles => serenity::Permissions::MANAGE_ROLES,
        Capability::Administrator => serenity::Permissions::ADMINISTRATOR,
    }
}

/// Map serenity errors onto the port's error kinds by HTTP status.
fn map_error(err: serenity::Error) -> PlatformError {
    if let serenity::Error::Http(http_err) = &err {
        match http_err.status_code().map(|s| s.as_u16()) {
            Some(403) => return PlatformError::Forbidden,
            Some(404) => return PlatformError::NotFound,
            _ => {}
        }
    }
    PlatformError::Other(err.to_string())
}

fn notice_message(notice: &Notice, mention: Option<u64>) -> serenity::CreateMessage {
    let mut message = serenity::CreateMessage::new().embed(
        serenity::CreateEmbed::new()
            .title(&notice.title)
            .description(&notice.body)
            .color(embeds::VERIFY),
    );
    if let Some(user_id) = mention {
        message = message.content(format!("<@{}>", user_id));
    }
    if let Some((label, url)) = &notice.link {
        message = message.components(vec![serenity::CreateActionRow::Buttons(vec![
            serenity::CreateButton::new_link(url).label(label),
        ])]);
    }
    message
}

fn timestamp(at: chrono::DateTime<chrono::Utc>) -> Result<serenity::Timestamp, PlatformError> {
    serenity::Timestamp::from_unix_timestamp(at.timestamp())
        .map_err(|e| PlatformError::Other(e.to_string()))
}

#[async_trait]
impl CommunityPlatform for SerenityPlatform {
    async fn is_automated(&self, user_id: u64) -> Result<bool, PlatformError> {
        let user = serenity::UserId::new(user_id)
            .to_user(&self.http)
            .await
            .map_err(map_error)?;
        Ok(user.bot)
    }

    async fn rank(&self, user_id: u64) -> Result<i64, PlatformError> {
        let guild = self.guild().await?;
        if guild.owner_id.get() == user_id {
            return Ok(i64::MAX);
        }
        let member = self.member(user_id).await?;
        let top = member
            .roles
            .iter()
            .filter_map(|id| guild.roles.get(id))
            .map(|role| role.position as i64)
            .max()
            .unwrap_or(0);
        Ok(top)
    }

    async fn has_capability(
        &self,
        user_id: u64,
        capability: Capability,
    ) -> Result<bool, PlatformError> {
        let permissions = self.permissions(user_id).await?;
        Ok(permissions.administrator() || permissions.contains(required_permission(capability)))
    }

    async fn send_direct(&self, user_id: u64, notice: &Notice) -> Result<(), PlatformError> {
        let channel = serenity::UserId::new(user_id)
            .create_dm_channel(&self.http)
            .await
            .map_err(map_error)?;
        channel
            .send_message(&self.http, notice_message(notice, None))
            .await
            .map_err(map_error)?;
        Ok(())
    }

    /// Posts in the guild's system channel, mentioning the participant.
    async fn send_fallback(&self, user_id: u64, notice: &Notice) -> Result<(), PlatformError> {
        let channel = self
            .guild()
            .await?
            .system_channel_id
            .ok_or(PlatformError::NotFound)?;
        channel
            .send_message(&self.http, notice_message(notice, Some(user_id)))
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn execute_effect(&self, effect: Effect) -> Result<EffectOutcome, PlatformError> {
        debug!(?effect, "Executing platform effect");
        match effect {
            Effect::Kick { user_id, reason } => {
                self.guild_id
                    .kick_with_reason(&self.http, serenity::UserId::new(user_id), &reason)
                    .await
                    .map_err(map_error)?;
            }
            Effect::Ban {
                user_id,
                reason,
                delete_message_days,
            } => {
                self.guild_id
                    .ban_with_reason(
                        &self.http,
                        serenity::UserId::new(user_id),
                        delete_message_days,
                        &reason,
                    )
                    .await
                    .map_err(map_error)?;
            }
            Effect::Unban { user_id } => {
                self.guild_id
                    .unban(&self.http, serenity::UserId::new(user_id))
                    .await
                    .map_err(map_error)?;
            }
            Effect::Timeout {
                user_id,
                until,
                reason,
            } => {
                self.guild_id
                    .edit_member(
                        &self.http,
                        serenity::UserId::new(user_id),
                        serenity::EditMember::new()
                            .disable_communication_until_datetime(timestamp(until)?)
                            .audit_log_reason(&reason),
                    )
                    .await
                    .map_err(map_error)?;
            }
            Effect::Purge {
                channel_id,
                limit,
                author_id,
            } => return self.purge(channel_id, limit, author_id).await,
            Effect::DeleteMessage {
                channel_id,
                message_id,
            } => {
                serenity::ChannelId::new(channel_id)
                    .delete_message(&self.http, serenity::MessageId::new(message_id))
                    .await
                    .map_err(map_error)?;
            }
            Effect::GrantVerifiedRole { user_id } => {
                let result = self
                    .http
                    .add_member_role(
                        self.guild_id,
                        serenity::UserId::new(user_id),
                        self.verified_role_id,
                        Some("Completed captcha verification"),
                    )
                    .await;
                if let Err(e) = result {
                    warn!(user_id, "Failed to add verified role: {}", e);
                    return Err(map_error(e));
                }
            }
        }
        Ok(EffectOutcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_map_to_discord_permissions() {
        assert_eq!(
            required_permission(Capability::KickMembers),
            serenity::Permissions::KICK_MEMBERS
        );
        assert_eq!(
            required_permission(Capability::ModerateMembers),
            serenity::Permissions::MODERATE_MEMBERS
        );
        assert_eq!(
            required_permission(Capability::Administrator),
            serenity::Permissions::ADMINISTRATOR
        );
    }

    // Snowflake for a message created `age_secs` before `now`.
    fn message_aged(now: i64, age_secs: i64) -> serenity::MessageId {
        const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;
        let ms = (now - age_secs) * 1000 - DISCORD_EPOCH_MS;
        serenity::MessageId::new((ms as u64) << 22)
    }

    #[test]
    fn test_old_messages_are_deleted_individually() {
        let now = chrono::Utc::now().timestamp();
        let day = 24 * 60 * 60;
        let fresh = [message_aged(now, 60), message_aged(now, day)];
        let old = [
            message_aged(now, 15 * day),
            message_aged(now, 20 * day),
            message_aged(now, 400 * day),
        ];
        let ids = [old[0], fresh[0], old[1], fresh[1], old[2]];

        let (bulk, single) = split_for_bulk_delete(&ids, now);
        assert_eq!(bulk, fresh.to_vec());
        assert_eq!(single, old.to_vec());

        let (bulk, single) = split_for_bulk_delete(&old, now);
        assert!(bulk.is_empty());
        assert_eq!(single.len(), 3);
    }

    #[test]
    fn test_notice_message_carries_mention_and_link() {
        let notice = Notice::new("Verification required", "Click below")
            .with_link("Verify", "https://example.com/verify/abc");
        let json = serde_json::to_value(notice_message(&notice, Some(42))).unwrap();
        assert_eq!(json["content"], "<@42>");
        assert_eq!(json["embeds"][0]["title"], "Verification required");
        let rendered = json["components"].to_string();
        assert!(rendered.contains("https://example.com/verify/abc"));
        assert!(rendered.contains("Verify"));

        let plain = serde_json::to_value(notice_message(&Notice::new("t", "b"), None)).unwrap();
        assert!(plain.get("content").map_or(true, |c| c.is_null()));
        assert!(plain.get("components").map_or(true, |c| c.is_null()));
    }
}
