// Moderation domain models - requests, receipts, alerts.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts commands and button clicks into these.

use crate::core::audit::{ActionKind, ParticipantRef, StoreError};
use crate::core::platform::{Capability, PlatformError};
use std::sync::atomic::{AtomicU8, Ordering};
use thiserror::Error;

/// Longest allowed timeout, in minutes (28 days).
pub const MAX_TIMEOUT_MINUTES: u32 = 40_320;
/// Largest allowed purge batch.
pub const MAX_PURGE_COUNT: u32 = 100;
/// Timeout applied from an alert's timeout button.
pub const ALERT_TIMEOUT_MINUTES: u32 = 60;
/// Reason recorded for actions taken from an alert.
pub const ALERT_REASON: &str = "Flagged message: blacklisted content";
pub const DEFAULT_REASON: &str = "No reason provided";

impl ActionKind {
    /// Capability the actor must hold for this action.
    pub fn required_capability(&self) -> Capability {
        match self {
            ActionKind::Warn | ActionKind::Purge => Capability::ManageMessages,
            ActionKind::Timeout => Capability::ModerateMembers,
            ActionKind::Kick => Capability::KickMembers,
            ActionKind::Ban | ActionKind::Unban => Capability::BanMembers,
        }
    }

    /// Whether the actor has to outrank the target.
    pub fn requires_rank(&self) -> bool {
        matches!(self, ActionKind::Kick | ActionKind::Ban | ActionKind::Timeout)
    }

    /// Whether the target is a current member who could be a bot account.
    pub fn targets_member(&self) -> bool {
        matches!(
            self,
            ActionKind::Warn | ActionKind::Timeout | ActionKind::Kick | ActionKind::Ban
        )
    }
}

/// Where a purge runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeScope {
    pub channel_id: u64,
    pub count: u32,
}

/// One moderation request, from a command or an alert button.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub kind: ActionKind,
    /// Required for everything except purge, where it narrows to one author.
    pub target: Option<ParticipantRef>,
    pub actor: ParticipantRef,
    pub reason: Option<String>,
    pub duration_minutes: Option<u32>,
    pub purge: Option<PurgeScope>,
}

impl ActionRequest {
    pub fn new(kind: ActionKind, target: ParticipantRef, actor: ParticipantRef) -> Self {
        Self {
            kind,
            target: Some(target),
            actor,
            reason: None,
            duration_minutes: None,
            purge: None,
        }
    }

    pub fn purge(
        actor: ParticipantRef,
        channel_id: u64,
        count: u32,
        author: Option<ParticipantRef>,
    ) -> Self {
        Self {
            kind: ActionKind::Purge,
            target: author,
            actor,
            reason: None,
            duration_minutes: None,
            purge: Some(PurgeScope { channel_id, count }),
        }
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason.filter(|r| !r.trim().is_empty());
        self
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    pub fn reason_or_default(&self) -> String {
        self.reason
            .clone()
            .unwrap_or_else(|| DEFAULT_REASON.to_string())
    }
}

/// What an executed action did.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReceipt {
    pub action_id: i64,
    pub kind: ActionKind,
    pub target: Option<ParticipantRef>,
    pub reason: String,
    pub duration_minutes: Option<u32>,
    /// Messages deleted, for purges.
    pub purged: Option<usize>,
    /// Whether the target was told.
    pub notified: bool,
}

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("Cannot moderate bot accounts")]
    ProtectedTarget,
    #[error("You cannot moderate someone with an equal or higher role")]
    InsufficientRank,
    #[error("You need the {0} permission to do this")]
    MissingCapability(Capability),
    #[error("Platform refused the action: {0}")]
    Platform(#[from] PlatformError),
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
    /// The platform effect happened but the audit write failed.
    #[error("Action was applied but could not be recorded: {0}")]
    NotRecorded(StoreError),
}

/// The fixed set of alert buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertChoice {
    Warn,
    Timeout,
    Kick,
    Ban,
}

impl AlertChoice {
    pub const ALL: [AlertChoice; 4] = [
        AlertChoice::Warn,
        AlertChoice::Timeout,
        AlertChoice::Kick,
        AlertChoice::Ban,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertChoice::Warn => "warn",
            AlertChoice::Timeout => "timeout",
            AlertChoice::Kick => "kick",
            AlertChoice::Ban => "ban",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AlertChoice::Warn => "Warn",
            AlertChoice::Timeout => "Timeout 1h",
            AlertChoice::Kick => "Kick",
            AlertChoice::Ban => "Ban",
        }
    }

    pub fn action_kind(&self) -> ActionKind {
        match self {
            AlertChoice::Warn => ActionKind::Warn,
            AlertChoice::Timeout => ActionKind::Timeout,
            AlertChoice::Kick => ActionKind::Kick,
            AlertChoice::Ban => ActionKind::Ban,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }
}

pub const ALERT_ID_PREFIX: &str = "modalert";

/// Button id carrying everything needed to act on an alert after a restart.
pub fn alert_custom_id(alert_id: u64, target_id: u64, choice: AlertChoice) -> String {
    format!(
        "{}:{}:{}:{}",
        ALERT_ID_PREFIX,
        alert_id,
        target_id,
        choice.as_str()
    )
}

/// Inverse of [`alert_custom_id`].
pub fn parse_alert_custom_id(custom_id: &str) -> Option<(u64, u64, AlertChoice)> {
    let mut parts = custom_id.split(':');
    if parts.next()? != ALERT_ID_PREFIX {
        return None;
    }
    let alert_id = parts.next()?.parse().ok()?;
    let target_id = parts.next()?.parse().ok()?;
    let choice = AlertChoice::parse(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }
    Some((alert_id, target_id, choice))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertState {
    Armed = 0,
    Executing = 1,
    Resolved = 2,
}

impl AlertState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => AlertState::Armed,
            1 => AlertState::Executing,
            _ => AlertState::Resolved,
        }
    }
}

/// One flagged-message alert and its one-shot state.
#[derive(Debug)]
pub struct ModerationAlert {
    /// Id of the flagged message.
    pub id: u64,
    pub target: ParticipantRef,
    pub channel_id: u64,
    pub matches: Vec<String>,
    pub excerpt: String,
    pub message_deleted: bool,
    state: AtomicU8,
}

impl ModerationAlert {
    pub fn new(
        id: u64,
        target: ParticipantRef,
        channel_id: u64,
        matches: Vec<String>,
        excerpt: String,
        message_deleted: bool,
    ) -> Self {
        Self {
            id,
            target,
            channel_id,
            matches,
            excerpt,
            message_deleted,
            state: AtomicU8::new(AlertState::Armed as u8),
        }
    }

    /// Rebuild an armed alert from a button id when the original is gone.
    pub fn rearmed(id: u64, target_id: u64) -> Self {
        Self::new(
            id,
            ParticipantRef::id_only(target_id),
            0,
            Vec::new(),
            String::new(),
            false,
        )
    }

    pub fn state(&self) -> AlertState {
        AlertState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Compare-and-set from `from` to `to`. Returns the observed state on failure.
    pub(crate) fn transition(&self, from: AlertState, to: AlertState) -> Result<(), AlertState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(AlertState::from_u8)
    }
}

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("This alert has already been handled")]
    AlreadyResolved,
    #[error("Another moderator is acting on this alert")]
    InFlight,
    #[error(transparent)]
    Action(#[from] ModerationError),
}
