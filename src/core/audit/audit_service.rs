// Audit log - storage port plus the read/write service the rest of the bot uses.
//
// The store trait is the only way core code touches persistence. Every
// multi-row write is one trait call so the implementation can wrap it in a
// single transaction.

use super::audit_models::{
    kinds, ActionBatch, AuditEvent, AuditQuery, ContentRecord, ModerationActionRecord,
    NewAuditEvent, NewContentRecord, Participant, ParticipantRef, ParticipantSummary,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::error;

/// Upper bound on any reporting query.
pub const MAX_QUERY_LIMIT: u32 = 25;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    StorageError(String),
}

/// Persistence port for participants, content, actions and audit events.
///
/// Implementations must ensure the referenced participant rows exist before
/// writing anything that points at them, inside the same transaction.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Create the participant, or refresh its display name when one is given.
    async fn upsert_participant(&self, participant: &ParticipantRef) -> Result<(), StoreError>;

    async fn get_participant(&self, id: u64) -> Result<Option<Participant>, StoreError>;

    /// Append a single audit event.
    async fn append(&self, event: NewAuditEvent) -> Result<(), StoreError>;

    /// Write a content record, plus an optional audit event, in one transaction.
    ///
    /// A record for an already-seen message id keeps its content; only an unset
    /// flag may be filled in.
    async fn record_content(
        &self,
        record: NewContentRecord,
        event: Option<NewAuditEvent>,
    ) -> Result<(), StoreError>;

    async fn find_content(&self, message_id: u64) -> Result<Option<ContentRecord>, StoreError>;

    /// Write an action, its warning row and its audit events in one transaction.
    /// Returns the new action id.
    async fn record_action(&self, batch: ActionBatch) -> Result<i64, StoreError>;

    /// Set the verified flag and write `event`, in one transaction.
    ///
    /// Returns `true` only when this call flipped the flag. The event is written
    /// only in that case.
    async fn mark_verified(
        &self,
        participant_id: u64,
        at: DateTime<Utc>,
        event: NewAuditEvent,
    ) -> Result<bool, StoreError>;

    /// Audit events matching `query`, newest first.
    async fn query_events(&self, query: AuditQuery) -> Result<Vec<AuditEvent>, StoreError>;

    /// Moderation actions, optionally for one target, newest first.
    async fn recent_actions(
        &self,
        target_id: Option<u64>,
        limit: u32,
    ) -> Result<Vec<ModerationActionRecord>, StoreError>;

    async fn participant_summary(&self, id: u64) -> Result<ParticipantSummary, StoreError>;
}

fn clamp_limit(limit: u32) -> u32 {
    limit.clamp(1, MAX_QUERY_LIMIT)
}

/// Append-only audit trail with its reporting queries.
pub struct AuditLog<S: AuditStore> {
    store: S,
}

impl<S: AuditStore> AuditLog<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Append from an event listener. Failures are logged and dropped so the
    /// dispatch loop keeps going.
    pub async fn record(&self, subject: ParticipantRef, kind: &str, detail: impl Into<String>) {
        let subject_id = subject.id;
        if let Err(e) = self
            .store
            .append(NewAuditEvent::new(subject, kind, detail))
            .await
        {
            error!(user_id = subject_id, kind, "Failed to append audit event: {}", e);
        }
    }

    pub async fn find_content(&self, message_id: u64) -> Result<Option<ContentRecord>, StoreError> {
        self.store.find_content(message_id).await
    }

    /// Full history for one participant.
    pub async fn history(&self, subject_id: u64, limit: u32) -> Result<Vec<AuditEvent>, StoreError> {
        self.store
            .query_events(AuditQuery {
                subject: Some(subject_id),
                kinds: Vec::new(),
                limit: clamp_limit(limit),
            })
            .await
    }

    /// Backing query for `/modlog`.
    pub async fn mod_log(
        &self,
        target_id: Option<u64>,
        limit: u32,
    ) -> Result<Vec<ModerationActionRecord>, StoreError> {
        self.store
            .recent_actions(target_id, clamp_limit(limit))
            .await
    }

    /// Backing query for `/stafflog`: the staff-activity facet of every action,
    /// plus purge summaries which are attributed to the moderator directly.
    pub async fn staff_log(
        &self,
        moderator_id: Option<u64>,
        limit: u32,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        self.store
            .query_events(AuditQuery {
                subject: moderator_id,
                kinds: vec![
                    kinds::MOD_ACTION_PERFORMED.to_string(),
                    kinds::PURGE.to_string(),
                ],
                limit: clamp_limit(limit),
            })
            .await
    }

    pub async fn summary(&self, participant_id: u64) -> Result<ParticipantSummary, StoreError> {
        self.store.participant_summary(participant_id).await
    }
}
