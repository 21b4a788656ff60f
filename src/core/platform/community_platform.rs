// Host platform port.
//
// Everything the core needs from the chat platform, expressed without any
// platform types. The Discord adapter in `discord/platform` implements it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

/// Capability grants checked before an action runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ManageMessages,
    ModerateMembers,
    KickMembers,
    BanMembers,
    ManageRoles,
    Administrator,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::ManageMessages => "Manage Messages",
            Capability::ModerateMembers => "Moderate Members",
            Capability::KickMembers => "Kick Members",
            Capability::BanMembers => "Ban Members",
            Capability::ManageRoles => "Manage Roles",
            Capability::Administrator => "Administrator",
        };
        write!(f, "{}", name)
    }
}

/// A short message addressed to one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub body: String,
    /// Optional `(label, url)` button.
    pub link: Option<(String, String)>,
}

impl Notice {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            link: None,
        }
    }

    pub fn with_link(mut self, label: impl Into<String>, url: impl Into<String>) -> Self {
        self.link = Some((label.into(), url.into()));
        self
    }
}

/// A side effect on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Kick {
        user_id: u64,
        reason: String,
    },
    Ban {
        user_id: u64,
        reason: String,
        delete_message_days: u8,
    },
    Unban {
        user_id: u64,
    },
    Timeout {
        user_id: u64,
        until: DateTime<Utc>,
        reason: String,
    },
    /// Bulk-delete up to `limit` recent messages, optionally only from one author.
    Purge {
        channel_id: u64,
        limit: u32,
        author_id: Option<u64>,
    },
    DeleteMessage {
        channel_id: u64,
        message_id: u64,
    },
    GrantVerifiedRole {
        user_id: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectOutcome {
    Done,
    /// Number of messages actually deleted.
    Purged(usize),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("missing platform permission")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("platform error: {0}")]
    Other(String),
}

#[async_trait]
pub trait CommunityPlatform: Send + Sync {
    /// Whether `user_id` is an automated (bot) account.
    async fn is_automated(&self, user_id: u64) -> Result<bool, PlatformError>;

    /// Position in the role hierarchy. Higher outranks lower.
    async fn rank(&self, user_id: u64) -> Result<i64, PlatformError>;

    async fn has_capability(
        &self,
        user_id: u64,
        capability: Capability,
    ) -> Result<bool, PlatformError>;

    /// Message the participant directly.
    async fn send_direct(&self, user_id: u64, notice: &Notice) -> Result<(), PlatformError>;

    /// Message the participant on the community's fallback surface.
    async fn send_fallback(&self, user_id: u64, notice: &Notice) -> Result<(), PlatformError>;

    async fn execute_effect(&self, effect: Effect) -> Result<EffectOutcome, PlatformError>;
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Recording platform used by the core service tests.

    use super::*;
    use dashmap::{DashMap, DashSet};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MockPlatform {
        pub ranks: DashMap<u64, i64>,
        pub capabilities: DashMap<u64, Vec<Capability>>,
        pub bots: DashSet<u64>,
        /// Users whose direct messages are closed.
        pub dms_closed: DashSet<u64>,
        pub fallback_broken: AtomicBool,
        /// Effects that should fail with `Forbidden`.
        pub effects_forbidden: AtomicBool,
        pub role_grant_broken: AtomicBool,
        pub effects: Mutex<Vec<Effect>>,
        pub direct: Mutex<Vec<(u64, Notice)>>,
        pub fallback: Mutex<Vec<(u64, Notice)>>,
    }

    impl MockPlatform {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_member(self, user_id: u64, rank: i64, caps: &[Capability]) -> Self {
            self.ranks.insert(user_id, rank);
            self.capabilities.insert(user_id, caps.to_vec());
            self
        }

        pub fn with_bot(self, user_id: u64) -> Self {
            self.bots.insert(user_id);
            self.ranks.insert(user_id, 0);
            self
        }

        pub fn effect_log(&self) -> Vec<Effect> {
            self.effects.lock().unwrap().clone()
        }

        pub fn direct_log(&self) -> Vec<(u64, Notice)> {
            self.direct.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommunityPlatform for MockPlatform {
        async fn is_automated(&self, user_id: u64) -> Result<bool, PlatformError> {
            Ok(self.bots.contains(&user_id))
        }

        async fn rank(&self, user_id: u64) -> Result<i64, PlatformError> {
            Ok(self.ranks.get(&user_id).map(|r| *r).unwrap_or(0))
        }

        async fn has_capability(
            &self,
            user_id: u64,
            capability: Capability,
        ) -> Result<bool, PlatformError> {
            Ok(self
                .capabilities
                .get(&user_id)
                .map(|caps| {
                    caps.contains(&capability) || caps.contains(&Capability::Administrator)
                })
                .unwrap_or(false))
        }

        async fn send_direct(&self, user_id: u64, notice: &Notice) -> Result<(), PlatformError> {
            if self.dms_closed.contains(&user_id) {
                return Err(PlatformError::Forbidden);
            }
            self.direct.lock().unwrap().push((user_id, notice.clone()));
            Ok(())
        }

        async fn send_fallback(&self, user_id: u64, notice: &Notice) -> Result<(), PlatformError> {
            if self.fallback_broken.load(Ordering::SeqCst) {
                return Err(PlatformError::NotFound);
            }
            self.fallback.lock().unwrap().push((user_id, notice.clone()));
            Ok(())
        }

        async fn execute_effect(&self, effect: Effect) -> Result<EffectOutcome, PlatformError> {
            if let Effect::GrantVerifiedRole { .. } = effect {
                if self.role_grant_broken.load(Ordering::SeqCst) {
                    return Err(PlatformError::Forbidden);
                }
            } else if self.effects_forbidden.load(Ordering::SeqCst) {
                return Err(PlatformError::Forbidden);
            }
            let outcome = match &effect {
                Effect::Purge { limit, .. } => EffectOutcome::Purged(*limit as usize),
                _ => EffectOutcome::Done,
            };
            self.effects.lock().unwrap().push(effect);
            Ok(outcome)
        }
    }
}
