// Passive audit listeners.
//
// Each gateway event is reduced to plain values, diffed by the pure helpers
// below, then stored and mirrored to the mod channel. Bot accounts are skipped.

use crate::core::audit::{kinds, NewAuditEvent, ParticipantRef};
use crate::discord::logging::formatter::{format_log_entry, LogEntry};
use crate::discord::logging::post_to_mod_channel;
use crate::discord::{embeds, participant, Data};
use poise::serenity_prelude::{self as serenity, Context};
use std::collections::HashSet;

/// Content excerpt kept in stored audit details.
const DETAIL_EXCERPT: usize = 500;
/// Content excerpt shown in the mirrored embed.
const HEADLINE_EXCERPT: usize = 200;

/// The parts of a member we diff between two updates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberSnapshot {
    pub username: String,
    pub nick: Option<String>,
    pub avatar: Option<String>,
    pub roles: Vec<u64>,
    /// Unix seconds.
    pub timed_out_until: Option<i64>,
}

impl MemberSnapshot {
    fn from_member(member: &serenity::Member) -> Self {
        Self {
            username: member.user.name.clone(),
            nick: member.nick.clone(),
            avatar: member.user.avatar.as_ref().map(|h| h.to_string()),
            roles: member.roles.iter().map(|r| r.get()).collect(),
            timed_out_until: member.communication_disabled_until.map(|t| t.unix_timestamp()),
        }
    }

    fn from_update(event: &serenity::GuildMemberUpdateEvent) -> Self {
        Self {
            username: event.user.name.clone(),
            nick: event.nick.clone(),
            avatar: event.user.avatar.as_ref().map(|h| h.to_string()),
            roles: event.roles.iter().map(|r| r.get()).collect(),
            timed_out_until: event.communication_disabled_until.map(|t| t.unix_timestamp()),
        }
    }
}

fn role_list(ids: &[u64]) -> String {
    ids.iter()
        .map(|id| format!("<@&{}>", id))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Every audit entry implied by a member update.
pub fn member_changes(
    subject: &ParticipantRef,
    before: &MemberSnapshot,
    after: &MemberSnapshot,
    now: i64,
) -> Vec<LogEntry> {
    let mention = embeds::mention(subject.id);
    let mut entries = Vec::new();

    let old_roles: HashSet<u64> = before.roles.iter().copied().collect();
    let new_roles: HashSet<u64> = after.roles.iter().copied().collect();
    let mut added: Vec<u64> = new_roles.difference(&old_roles).copied().collect();
    let mut removed: Vec<u64> = old_roles.difference(&new_roles).copied().collect();
    added.sort_unstable();
    removed.sort_unstable();
    if !added.is_empty() || !removed.is_empty() {
        let mut parts = Vec::new();
        if !added.is_empty() {
            parts.push(format!("Roles added: {}", role_list(&added)));
        }
        if !removed.is_empty() {
            parts.push(format!("Roles removed: {}", role_list(&removed)));
        }
        let detail = parts.join(" | ");
        entries.push(LogEntry::new(
            NewAuditEvent::new(subject.clone(), kinds::ROLE_CHANGE, detail.clone()),
            format!("🏷️ **Role Update** - {}\n{}", mention, detail),
        ));
    }

    if before.nick != after.nick {
        let old = before.nick.as_deref().unwrap_or(&before.username);
        let new = after.nick.as_deref().unwrap_or(&after.username);
        entries.push(LogEntry::new(
            NewAuditEvent::new(
                subject.clone(),
                kinds::NICKNAME_CHANGE,
                format!("'{}' → '{}'", old, new),
            ),
            format!("✏️ **Nickname Change** - {}\n`{}` → `{}`", mention, old, new),
        ));
    }

    if before.username != after.username {
        entries.push(LogEntry::new(
            NewAuditEvent::new(
                subject.clone(),
                kinds::USERNAME_CHANGE,
                format!("'{}' → '{}'", before.username, after.username),
            ),
            format!(
                "📛 **Username Change** - {}\n`{}` → `{}`",
                mention, before.username, after.username
            ),
        ));
    }

    if before.avatar != after.avatar {
        entries.push(LogEntry::new(
            NewAuditEvent::new(subject.clone(), kinds::AVATAR_CHANGE, "User changed their avatar"),
            format!("🖼️ **Avatar Changed** - {}", mention),
        ));
    }

    let was_timed_out = before.timed_out_until.is_some_and(|t| t > now);
    let is_timed_out = after.timed_out_until.filter(|t| *t > now);
    match (was_timed_out, is_timed_out) {
        (false, Some(until)) => entries.push(LogEntry::new(
            NewAuditEvent::new(
                subject.clone(),
                kinds::TIMEOUT_APPLIED,
                format!("Timed out until <t:{}:F>", until),
            ),
            format!(
                "⏰ **Timeout Applied** - {}\nUntil: <t:{}:F> (<t:{}:R>)",
                mention, until, until
            ),
        )),
        (true, None) => entries.push(LogEntry::new(
            NewAuditEvent::new(subject.clone(), kinds::TIMEOUT_REMOVED, "Timeout was removed"),
            format!("✅ **Timeout Removed** - {}", mention),
        )),
        _ => {}
    }

    entries
}

/// Voice join, leave or move. `None` when the channel did not change.
pub fn voice_change(
    subject: &ParticipantRef,
    before: Option<u64>,
    after: Option<u64>,
) -> Option<LogEntry> {
    let mention = embeds::mention(subject.id);
    let (kind, detail, headline) = match (before, after) {
        (None, Some(new)) => (
            kinds::VOICE_JOIN,
            format!("Joined voice channel: <#{}>", new),
            format!("🔊 **Voice Join** - {} joined <#{}>", mention, new),
        ),
        (Some(old), None) => (
            kinds::VOICE_LEAVE,
            format!("Left voice channel: <#{}>", old),
            format!("🔇 **Voice Leave** - {} left <#{}>", mention, old),
        ),
        (Some(old), Some(new)) if old != new => (
            kinds::VOICE_MOVE,
            format!("Moved: <#{}> → <#{}>", old, new),
            format!("🔀 **Voice Move** - {}: <#{}> → <#{}>", mention, old, new),
        ),
        _ => return None,
    };
    Some(LogEntry::new(
        NewAuditEvent::new(subject.clone(), kind, detail),
        headline,
    ))
}

/// A content edit. `None` when the text is unchanged (embed-only updates).
pub fn message_edit(
    subject: &ParticipantRef,
    channel_id: u64,
    before: &str,
    after: &str,
) -> Option<LogEntry> {
    if before == after {
        return None;
    }
    Some(LogEntry::new(
        NewAuditEvent::new(
            subject.clone(),
            kinds::MESSAGE_EDIT,
            format!(
                "Channel: <#{}> | Before: {} | After: {}",
                channel_id,
                embeds::truncate(before, DETAIL_EXCERPT),
                embeds::truncate(after, DETAIL_EXCERPT)
            ),
        ),
        format!(
            "✏️ **Message Edited** - {} in <#{}>\n**Before:** {}\n**After:** {}",
            embeds::mention(subject.id),
            channel_id,
            embeds::truncate(before, HEADLINE_EXCERPT),
            embeds::truncate(after, HEADLINE_EXCERPT)
        ),
    ))
}

pub fn message_delete(subject: &ParticipantRef, channel_id: u64, content: &str) -> LogEntry {
    let shown = if content.is_empty() {
        "*[empty/embed]*".to_string()
    } else {
        embeds::truncate(content, HEADLINE_EXCERPT)
    };
    LogEntry::new(
        NewAuditEvent::new(
            subject.clone(),
            kinds::MESSAGE_DELETE,
            format!(
                "Channel: <#{}> | Content: {}",
                channel_id,
                embeds::truncate(content, DETAIL_EXCERPT)
            ),
        ),
        format!(
            "🗑️ **Message Deleted** - {} in <#{}>\n**Content:** {}",
            embeds::mention(subject.id),
            channel_id,
            shown
        ),
    )
}

/// Store the entry and mirror it. Neither step can fail the dispatch loop.
async fn publish(ctx: &Context, data: &Data, entry: LogEntry) {
    let embed = format_log_entry(&entry);
    let LogEntry { event, .. } = entry;
    data.audit.record(event.subject, &event.kind, event.detail).await;
    post_to_mod_channel(ctx, data, embed).await;
}

fn in_guild(data: &Data, guild_id: serenity::GuildId) -> bool {
    guild_id.get() == data.config.guild_id
}

pub async fn handle_member_join(ctx: &Context, data: &Data, member: &serenity::Member) {
    if member.user.bot || !in_guild(data, member.guild_id) {
        return;
    }
    let subject = participant(&member.user);
    let created = member.user.id.created_at().unix_timestamp();
    let entry = LogEntry::new(
        NewAuditEvent::new(subject.clone(), kinds::JOIN, "Joined the server"),
        format!(
            "📥 **Member Joined** - {}\nAccount created: <t:{}:R>",
            embeds::describe(&subject),
            created
        ),
    );
    publish(ctx, data, entry).await;
}

pub async fn handle_member_remove(
    ctx: &Context,
    data: &Data,
    guild_id: serenity::GuildId,
    user: &serenity::User,
    member_data: Option<&serenity::Member>,
) {
    if user.bot || !in_guild(data, guild_id) {
        return;
    }
    let roles = member_data
        .map(|m| m.roles.iter().map(|r| r.get()).collect::<Vec<_>>())
        .filter(|r| !r.is_empty())
        .map(|r| role_list(&r))
        .unwrap_or_else(|| "None".to_string());
    let subject = participant(user);
    let entry = LogEntry::new(
        NewAuditEvent::new(subject.clone(), kinds::LEAVE, "Left or was removed from the server"),
        format!(
            "📤 **Member Left** - {} (`{}`)\nRoles: {}",
            embeds::describe(&subject),
            user.id,
            roles
        ),
    );
    publish(ctx, data, entry).await;
}

pub async fn handle_member_update(
    ctx: &Context,
    data: &Data,
    old: Option<&serenity::Member>,
    event: &serenity::GuildMemberUpdateEvent,
) {
    if event.user.bot || !in_guild(data, event.guild_id) {
        return;
    }
    // Without a cached "before" there is nothing to diff against.
    let Some(old) = old else {
        return;
    };

    let subject = participant(&event.user);
    let before = MemberSnapshot::from_member(old);
    let after = MemberSnapshot::from_update(event);
    let now = chrono::Utc::now().timestamp();
    for entry in member_changes(&subject, &before, &after, now) {
        publish(ctx, data, entry).await;
    }
}

pub async fn handle_message_update(
    ctx: &Context,
    data: &Data,
    old: Option<&serenity::Message>,
    event: &serenity::MessageUpdateEvent,
) {
    match event.guild_id {
        Some(guild_id) if in_guild(data, guild_id) => {}
        _ => return,
    }
    let Some(after) = &event.content else {
        return;
    };
    if event.author.as_ref().is_some_and(|a| a.bot) {
        return;
    }

    // Prefer our stored copy; the cache only holds recent messages.
    let stored = match data.audit.find_content(event.id.get()).await {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(message_id = event.id.get(), "Failed to load stored message: {}", e);
            None
        }
    };
    let (subject, channel_id, before) = match (stored, old) {
        (Some(record), _) => (
            ParticipantRef::id_only(record.author_id),
            record.channel_id,
            record.content,
        ),
        (None, Some(old)) if !old.author.bot => (
            participant(&old.author),
            old.channel_id.get(),
            old.content.clone(),
        ),
        _ => return,
    };

    if let Some(entry) = message_edit(&subject, channel_id, &before, after) {
        publish(ctx, data, entry).await;
    }
}

pub async fn handle_message_delete(
    ctx: &Context,
    data: &Data,
    channel_id: serenity::ChannelId,
    message_id: serenity::MessageId,
    guild_id: Option<serenity::GuildId>,
) {
    match guild_id {
        Some(guild_id) if in_guild(data, guild_id) => {}
        _ => return,
    }

    let stored = match data.audit.find_content(message_id.get()).await {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(message_id = message_id.get(), "Failed to load stored message: {}", e);
            None
        }
    };
    let snapshot = match stored {
        Some(record) => Some((ParticipantRef::id_only(record.author_id), record.content)),
        None => ctx
            .cache
            .message(channel_id, message_id)
            .filter(|m| !m.author.bot)
            .map(|m| (participant(&m.author), m.content.clone())),
    };
    let Some((subject, content)) = snapshot else {
        return;
    };

    publish(ctx, data, message_delete(&subject, channel_id.get(), &content)).await;
}

pub async fn handle_ban(
    ctx: &Context,
    data: &Data,
    guild_id: serenity::GuildId,
    user: &serenity::User,
    banned: bool,
) {
    if user.bot || !in_guild(data, guild_id) {
        return;
    }
    let subject = participant(user);
    let entry = if banned {
        LogEntry::new(
            NewAuditEvent::new(subject.clone(), kinds::BANNED, "User banned from the server"),
            format!("🔨 **Member Banned** - {} (`{}`)", embeds::describe(&subject), user.id),
        )
    } else {
        LogEntry::new(
            NewAuditEvent::new(subject.clone(), kinds::UNBANNED, "User unbanned from the server"),
            format!("✅ **Member Unbanned** - {} (`{}`)", embeds::describe(&subject), user.id),
        )
    };
    publish(ctx, data, entry).await;
}

pub async fn handle_voice_state_update(
    ctx: &Context,
    data: &Data,
    old: Option<&serenity::VoiceState>,
    new: &serenity::VoiceState,
) {
    match new.guild_id {
        Some(guild_id) if in_guild(data, guild_id) => {}
        _ => return,
    }
    let subject = match new.member.as_ref() {
        Some(member) if member.user.bot => return,
        Some(member) => participant(&member.user),
        None => ParticipantRef::id_only(new.user_id.get()),
    };

    let before = old.and_then(|s| s.channel_id.map(|id| id.get()));
    let after = new.channel_id.map(|id| id.get());
    if let Some(entry) = voice_change(&subject, before, after) {
        publish(ctx, data, entry).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> ParticipantRef {
        ParticipantRef::named(7, "alice")
    }

    fn snapshot() -> MemberSnapshot {
        MemberSnapshot {
            username: "alice".into(),
            nick: None,
            avatar: Some("abc".into()),
            roles: vec![1, 2],
            timed_out_until: None,
        }
    }

    fn kinds_of(entries: &[LogEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.event.kind.as_str()).collect()
    }

    #[test]
    fn test_no_change_no_entries() {
        assert!(member_changes(&subject(), &snapshot(), &snapshot(), 1_000).is_empty());
    }

    #[test]
    fn test_role_diff() {
        let mut after = snapshot();
        after.roles = vec![2, 3];
        let entries = member_changes(&subject(), &snapshot(), &after, 1_000);
        assert_eq!(kinds_of(&entries), vec![kinds::ROLE_CHANGE]);
        assert_eq!(
            entries[0].event.detail,
            "Roles added: <@&3> | Roles removed: <@&1>"
        );
    }

    #[test]
    fn test_nickname_falls_back_to_username() {
        let mut after = snapshot();
        after.nick = Some("ally".into());
        let entries = member_changes(&subject(), &snapshot(), &after, 1_000);
        assert_eq!(kinds_of(&entries), vec![kinds::NICKNAME_CHANGE]);
        assert_eq!(entries[0].event.detail, "'alice' → 'ally'");
    }

    #[test]
    fn test_username_and_avatar() {
        let mut after = snapshot();
        after.username = "alice2".into();
        after.avatar = None;
        let entries = member_changes(&subject(), &snapshot(), &after, 1_000);
        assert_eq!(
            kinds_of(&entries),
            vec![kinds::USERNAME_CHANGE, kinds::AVATAR_CHANGE]
        );
    }

    #[test]
    fn test_timeout_applied_and_removed() {
        let mut timed_out = snapshot();
        timed_out.timed_out_until = Some(5_000);

        let applied = member_changes(&subject(), &snapshot(), &timed_out, 1_000);
        assert_eq!(kinds_of(&applied), vec![kinds::TIMEOUT_APPLIED]);
        assert!(applied[0].event.detail.contains("<t:5000:F>"));

        let removed = member_changes(&subject(), &timed_out, &snapshot(), 1_000);
        assert_eq!(kinds_of(&removed), vec![kinds::TIMEOUT_REMOVED]);

        // An already-expired timeout being cleared is not a removal.
        assert!(member_changes(&subject(), &timed_out, &snapshot(), 6_000).is_empty());
    }

    #[test]
    fn test_voice_transitions() {
        let s = subject();
        assert_eq!(voice_change(&s, None, Some(1)).unwrap().event.kind, kinds::VOICE_JOIN);
        assert_eq!(voice_change(&s, Some(1), None).unwrap().event.kind, kinds::VOICE_LEAVE);
        assert_eq!(voice_change(&s, Some(1), Some(2)).unwrap().event.kind, kinds::VOICE_MOVE);
        assert!(voice_change(&s, Some(1), Some(1)).is_none());
        assert!(voice_change(&s, None, None).is_none());
    }

    #[test]
    fn test_message_edit_and_delete() {
        let s = subject();
        assert!(message_edit(&s, 9, "same", "same").is_none());

        let edit = message_edit(&s, 9, "before", "after").unwrap();
        assert_eq!(edit.event.kind, kinds::MESSAGE_EDIT);
        assert_eq!(edit.event.detail, "Channel: <#9> | Before: before | After: after");

        let long = "x".repeat(1_000);
        let delete = message_delete(&s, 9, &long);
        assert_eq!(delete.event.kind, kinds::MESSAGE_DELETE);
        assert!(delete.event.detail.chars().count() < 600);
        assert!(message_delete(&s, 9, "").headline.contains("*[empty/embed]*"));
    }
}
