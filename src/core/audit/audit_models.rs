// Audit domain models - the durable record of everything the bot observes or does.
//
// Pure domain types, no Discord or SQL types. Ids are raw platform snowflakes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum stored length of a message body, in characters.
pub const MAX_CONTENT_CHARS: usize = 4000;

/// Audit event kinds. Kinds are open string tags; these are the ones the bot writes.
pub mod kinds {
    pub const JOIN: &str = "join";
    pub const LEAVE: &str = "leave";
    pub const ROLE_CHANGE: &str = "role_change";
    pub const NICKNAME_CHANGE: &str = "nickname_change";
    pub const USERNAME_CHANGE: &str = "username_change";
    pub const AVATAR_CHANGE: &str = "avatar_change";
    pub const TIMEOUT_APPLIED: &str = "timeout_applied";
    pub const TIMEOUT_REMOVED: &str = "timeout_removed";
    pub const MESSAGE_EDIT: &str = "message_edit";
    pub const MESSAGE_DELETE: &str = "message_delete";
    pub const MESSAGE_FLAGGED: &str = "message_flagged";
    pub const VOICE_JOIN: &str = "voice_join";
    pub const VOICE_LEAVE: &str = "voice_leave";
    pub const VOICE_MOVE: &str = "voice_move";
    pub const VERIFICATION_ISSUED: &str = "verification_issued";
    pub const VERIFIED: &str = "verified";
    pub const WARNED: &str = "warned";
    pub const TIMED_OUT: &str = "timed_out";
    pub const KICKED: &str = "kicked";
    pub const BANNED: &str = "banned";
    pub const UNBANNED: &str = "unbanned";
    pub const PURGE: &str = "purge";
    /// Staff-activity facet, attributed to the acting moderator.
    pub const MOD_ACTION_PERFORMED: &str = "mod_action_performed";
}

/// Reference to a participant as seen in an event.
///
/// `name` is `None` when only the id is known (e.g. a token callback); the
/// stored display name is then left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantRef {
    pub id: u64,
    pub name: Option<String>,
}

impl ParticipantRef {
    pub fn named(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
        }
    }

    pub fn id_only(id: u64) -> Self {
        Self { id, name: None }
    }

    /// Name for display, falling back to the raw id.
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("ID:{}", self.id))
    }
}

/// A tracked community member. Never hard-deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: u64,
    pub display_name: String,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Blacklist hits. The only level automod assigns.
    Severe,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Severe => "SEVERE",
        }
    }
}

/// Flag fields of a content record. Set at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFlag {
    pub reason: String,
    pub severity: Severity,
}

/// One observed message, ready to be written.
#[derive(Debug, Clone)]
pub struct NewContentRecord {
    pub message_id: u64,
    pub author: ParticipantRef,
    pub guild_id: u64,
    pub channel_id: u64,
    pub content: String,
    pub flag: Option<ContentFlag>,
}

impl NewContentRecord {
    /// Build a record, capping `content` at [`MAX_CONTENT_CHARS`].
    pub fn new(
        message_id: u64,
        author: ParticipantRef,
        guild_id: u64,
        channel_id: u64,
        content: &str,
    ) -> Self {
        Self {
            message_id,
            author,
            guild_id,
            channel_id,
            content: content.chars().take(MAX_CONTENT_CHARS).collect(),
            flag: None,
        }
    }

    pub fn flagged(mut self, reason: impl Into<String>, severity: Severity) -> Self {
        self.flag = Some(ContentFlag {
            reason: reason.into(),
            severity,
        });
        self
    }
}

/// A stored content record.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRecord {
    pub message_id: u64,
    pub author_id: u64,
    pub channel_id: u64,
    pub content: String,
    pub flagged: bool,
    pub flag_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Kinds of moderation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Warn,
    Timeout,
    Kick,
    Ban,
    Unban,
    Purge,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Warn => "warn",
            ActionKind::Timeout => "timeout",
            ActionKind::Kick => "kick",
            ActionKind::Ban => "ban",
            ActionKind::Unban => "unban",
            ActionKind::Purge => "purge",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "warn" => Some(ActionKind::Warn),
            "timeout" => Some(ActionKind::Timeout),
            "kick" => Some(ActionKind::Kick),
            "ban" => Some(ActionKind::Ban),
            "unban" => Some(ActionKind::Unban),
            "purge" => Some(ActionKind::Purge),
            _ => None,
        }
    }

    /// Audit kind written against the target for this action.
    pub fn audit_kind(&self) -> &'static str {
        match self {
            ActionKind::Warn => kinds::WARNED,
            ActionKind::Timeout => kinds::TIMED_OUT,
            ActionKind::Kick => kinds::KICKED,
            ActionKind::Ban => kinds::BANNED,
            ActionKind::Unban => kinds::UNBANNED,
            ActionKind::Purge => kinds::PURGE,
        }
    }

    /// Past-tense verb for messages ("Warned", "Timed out", ...).
    pub fn past_tense(&self) -> &'static str {
        match self {
            ActionKind::Warn => "Warned",
            ActionKind::Timeout => "Timed out",
            ActionKind::Kick => "Kicked",
            ActionKind::Ban => "Banned",
            ActionKind::Unban => "Unbanned",
            ActionKind::Purge => "Purged",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct NewModerationAction {
    pub target: ParticipantRef,
    pub moderator: ParticipantRef,
    pub kind: ActionKind,
    pub reason: Option<String>,
    pub duration_minutes: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModerationActionRecord {
    pub id: i64,
    pub target_id: u64,
    pub moderator_id: u64,
    pub kind: ActionKind,
    pub reason: Option<String>,
    pub duration_minutes: Option<u32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditEvent {
    pub subject: ParticipantRef,
    pub kind: String,
    pub detail: String,
}

impl NewAuditEvent {
    pub fn new(subject: ParticipantRef, kind: &str, detail: impl Into<String>) -> Self {
        Self {
            subject,
            kind: kind.to_string(),
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: i64,
    pub subject_id: u64,
    pub kind: String,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

/// Everything one executed action writes, committed together.
#[derive(Debug, Clone)]
pub struct ActionBatch {
    pub action: NewModerationAction,
    /// Reason for the denormalized warning row (warn actions only).
    pub warning: Option<String>,
    pub events: Vec<NewAuditEvent>,
}

/// Read-side filter for audit events. Results are newest first.
///
/// An empty `kinds` list matches every kind.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub subject: Option<u64>,
    pub kinds: Vec<String>,
    pub limit: u32,
}

/// Counts shown by `/userinfo`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticipantSummary {
    pub participant: Option<Participant>,
    pub warning_count: u64,
    pub action_count: u64,
    pub flagged_message_count: u64,
}
