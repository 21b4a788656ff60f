// Moderation engine - core business logic for every moderation action.
//
// This service handles:
// - Staff actions (warn, timeout, kick, ban, unban, purge) behind ordered checks
// - Screening incoming messages against the blacklist
// - One-shot alerts for flagged messages
//
// Order for every action: validate input, checks, notify (kick/ban), effect,
// then one transaction for the action row, warning row and audit events.

use super::moderation_models::*;
use crate::core::audit::{
    kinds, ActionBatch, ActionKind, AuditStore, NewAuditEvent, NewContentRecord,
    NewModerationAction, ParticipantRef, Severity,
};
use crate::core::automod::BlacklistMatcher;
use crate::core::platform::{Capability, CommunityPlatform, Effect, EffectOutcome, Notice};
use chrono::{Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Longest excerpt of a flagged message kept on its alert.
const ALERT_EXCERPT_CHARS: usize = 500;

/// A guild message as the screening step sees it.
#[derive(Debug, Clone)]
pub struct ObservedMessage {
    pub message_id: u64,
    pub channel_id: u64,
    pub guild_id: u64,
    pub author: ParticipantRef,
    pub content: String,
}

pub struct ModerationService<S: AuditStore, P: CommunityPlatform> {
    store: S,
    platform: Arc<P>,
    matcher: Arc<BlacklistMatcher>,
    // Flagged message id -> alert, while armed or executing
    alerts: DashMap<u64, Arc<ModerationAlert>>,
    // Ids of alerts that already ran, without their payload
    resolved: DashSet<u64>,
}

impl<S: AuditStore, P: CommunityPlatform> ModerationService<S, P> {
    pub fn new(store: S, platform: Arc<P>, matcher: Arc<BlacklistMatcher>) -> Self {
        Self {
            store,
            platform,
            matcher,
            alerts: DashMap::new(),
            resolved: DashSet::new(),
        }
    }

    pub fn matcher(&self) -> &Arc<BlacklistMatcher> {
        &self.matcher
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Capability gate for read-only and admin commands.
    pub async fn authorize(&self, actor_id: u64, capability: Capability) -> Result<(), ModerationError> {
        if self.platform.has_capability(actor_id, capability).await? {
            Ok(())
        } else {
            info!(actor_id, %capability, "Denied: missing capability");
            Err(ModerationError::MissingCapability(capability))
        }
    }

    fn validate(request: &ActionRequest) -> Result<(), ModerationError> {
        if request.kind != ActionKind::Purge && request.target.is_none() {
            return Err(ModerationError::InvalidInput(
                "This action needs a target".into(),
            ));
        }
        match request.kind {
            ActionKind::Timeout => match request.duration_minutes {
                Some(m) if (1..=MAX_TIMEOUT_MINUTES).contains(&m) => Ok(()),
                _ => Err(ModerationError::InvalidInput(format!(
                    "Timeout duration must be between 1 and {} minutes",
                    MAX_TIMEOUT_MINUTES
                ))),
            },
            ActionKind::Purge => match &request.purge {
                Some(scope) if (1..=MAX_PURGE_COUNT).contains(&scope.count) => Ok(()),
                _ => Err(ModerationError::InvalidInput(format!(
                    "Purge count must be between 1 and {}",
                    MAX_PURGE_COUNT
                ))),
            },
            _ => Ok(()),
        }
    }

    /// Run the ordered checks. First failure wins.
    async fn check(&self, request: &ActionRequest) -> Result<(), ModerationError> {
        let actor_id = request.actor.id;

        if let Some(target) = &request.target {
            if request.kind.targets_member() && self.platform.is_automated(target.id).await? {
                info!(actor_id, target_id = target.id, kind = %request.kind, "Denied: target is a bot");
                return Err(ModerationError::ProtectedTarget);
            }

            if request.kind.requires_rank() {
                let actor_rank = self.platform.rank(actor_id).await?;
                let target_rank = self.platform.rank(target.id).await?;
                if actor_rank <= target_rank {
                    info!(
                        actor_id,
                        target_id = target.id,
                        actor_rank,
                        target_rank,
                        "Denied: actor does not outrank target"
                    );
                    return Err(ModerationError::InsufficientRank);
                }
            }
        }

        self.authorize(actor_id, request.kind.required_capability())
            .await
    }

    fn notice_for(request: &ActionRequest, reason: &str) -> Notice {
        let body = match (request.kind, request.duration_minutes) {
            (ActionKind::Timeout, Some(minutes)) => format!(
                "You have been timed out for {} minutes.\n**Reason:** {}",
                minutes, reason
            ),
            (kind, _) => format!(
                "You have been {}.\n**Reason:** {}",
                kind.past_tense().to_lowercase(),
                reason
            ),
        };
        Notice::new("Moderation notice", body)
    }

    async fn notify(&self, target_id: u64, notice: &Notice) -> bool {
        match self.platform.send_direct(target_id, notice).await {
            Ok(()) => true,
            Err(e) => {
                info!(target_id, "Could not notify target: {}", e);
                false
            }
        }
    }

    fn effect_for(request: &ActionRequest, reason: &str) -> Option<Effect> {
        let target_id = request.target.as_ref().map(|t| t.id);
        match (request.kind, target_id) {
            (ActionKind::Warn, _) => None,
            (ActionKind::Timeout, Some(user_id)) => Some(Effect::Timeout {
                user_id,
                until: Utc::now()
                    + Duration::minutes(request.duration_minutes.unwrap_or(0) as i64),
                reason: reason.to_string(),
            }),
            (ActionKind::Kick, Some(user_id)) => Some(Effect::Kick {
                user_id,
                reason: reason.to_string(),
            }),
            (ActionKind::Ban, Some(user_id)) => Some(Effect::Ban {
                user_id,
                reason: reason.to_string(),
                delete_message_days: 1,
            }),
            (ActionKind::Unban, Some(user_id)) => Some(Effect::Unban { user_id }),
            (ActionKind::Purge, author) => request.purge.as_ref().map(|scope| Effect::Purge {
                channel_id: scope.channel_id,
                limit: scope.count,
                author_id: author,
            }),
            _ => None,
        }
    }

    fn batch_for(request: &ActionRequest, reason: &str, purged: Option<usize>) -> ActionBatch {
        let actor = request.actor.clone();

        if request.kind == ActionKind::Purge {
            let scope = request
                .purge
                .as_ref()
                .map(|s| s.channel_id)
                .unwrap_or_default();
            let author = request
                .target
                .as_ref()
                .map(|t| format!(" from {} ({})", t.label(), t.id))
                .unwrap_or_default();
            let detail = format!(
                "Purged {} messages in channel {}{}",
                purged.unwrap_or(0),
                scope,
                author
            );
            return ActionBatch {
                action: NewModerationAction {
                    target: request.target.clone().unwrap_or_else(|| actor.clone()),
                    moderator: actor.clone(),
                    kind: ActionKind::Purge,
                    reason: Some(detail.clone()),
                    duration_minutes: None,
                },
                warning: None,
                events: vec![NewAuditEvent::new(actor, kinds::PURGE, detail)],
            };
        }

        let target = request
            .target
            .clone()
            .unwrap_or_else(|| ParticipantRef::id_only(0));
        let duration = request
            .duration_minutes
            .map(|m| format!(" for {} minutes", m))
            .unwrap_or_default();

        ActionBatch {
            action: NewModerationAction {
                target: target.clone(),
                moderator: actor.clone(),
                kind: request.kind,
                reason: Some(reason.to_string()),
                duration_minutes: request.duration_minutes,
            },
            warning: (request.kind == ActionKind::Warn).then(|| reason.to_string()),
            events: vec![
                NewAuditEvent::new(
                    target.clone(),
                    request.kind.audit_kind(),
                    format!(
                        "{}{} by {} ({}): {}",
                        request.kind.past_tense(),
                        duration,
                        actor.label(),
                        actor.id,
                        reason
                    ),
                ),
                NewAuditEvent::new(
                    actor,
                    kinds::MOD_ACTION_PERFORMED,
                    format!(
                        "{} {} ({}){}: {}",
                        request.kind,
                        target.label(),
                        target.id,
                        duration,
                        reason
                    ),
                ),
            ],
        }
    }

    /// Execute one moderation action.
    pub async fn execute(&self, request: ActionRequest) -> Result<ActionReceipt, ModerationError> {
        Self::validate(&request)?;
        self.check(&request).await?;

        let reason = request.reason_or_default();
        let target_id = request.target.as_ref().map(|t| t.id);
        let notice = Self::notice_for(&request, &reason);

        // Kicked or banned members can no longer be reached afterwards.
        let mut notified = false;
        if matches!(request.kind, ActionKind::Kick | ActionKind::Ban) {
            if let Some(id) = target_id {
                notified = self.notify(id, &notice).await;
            }
        }

        let mut purged = None;
        let effect_applied = match Self::effect_for(&request, &reason) {
            Some(effect) => {
                let outcome = self.platform.execute_effect(effect).await.map_err(|e| {
                    warn!(
                        actor_id = request.actor.id,
                        ?target_id,
                        kind = %request.kind,
                        "Moderation effect failed: {}",
                        e
                    );
                    ModerationError::Platform(e)
                })?;
                if let EffectOutcome::Purged(count) = outcome {
                    purged = Some(count);
                }
                true
            }
            None => false,
        };

        if matches!(request.kind, ActionKind::Warn | ActionKind::Timeout) {
            if let Some(id) = target_id {
                notified = self.notify(id, &notice).await;
            }
        }

        let batch = Self::batch_for(&request, &reason, purged);
        let action_id = match self.store.record_action(batch).await {
            Ok(id) => id,
            Err(e) if effect_applied => {
                error!(
                    actor_id = request.actor.id,
                    ?target_id,
                    kind = %request.kind,
                    "Moderation effect applied but not recorded: {}",
                    e
                );
                return Err(ModerationError::NotRecorded(e));
            }
            Err(e) => {
                error!(actor_id = request.actor.id, ?target_id, "Failed to record action: {}", e);
                return Err(ModerationError::Storage(e));
            }
        };

        info!(
            action_id,
            actor_id = request.actor.id,
            ?target_id,
            kind = %request.kind,
            "Moderation action executed"
        );

        Ok(ActionReceipt {
            action_id,
            kind: request.kind,
            target: request.target,
            reason,
            duration_minutes: request.duration_minutes,
            purged,
            notified,
        })
    }

    /// Record an incoming message and act on it if it is blacklisted.
    ///
    /// Returns the armed alert for a flagged message. A failed storage write or
    /// message removal is logged and does not stop the alert.
    pub async fn screen_message(&self, message: ObservedMessage) -> Option<Arc<ModerationAlert>> {
        let classification = self.matcher.classify(&message.content);
        let record = NewContentRecord::new(
            message.message_id,
            message.author.clone(),
            message.guild_id,
            message.channel_id,
            &message.content,
        );

        if !classification.flagged {
            if let Err(e) = self.store.record_content(record, None).await {
                error!(message_id = message.message_id, "Failed to record message: {}", e);
            }
            return None;
        }

        let explanation = classification.explanation();
        let event = NewAuditEvent::new(
            message.author.clone(),
            kinds::MESSAGE_FLAGGED,
            format!("{} (message {})", explanation, message.message_id),
        );
        if let Err(e) = self
            .store
            .record_content(record.flagged(&explanation, Severity::Severe), Some(event))
            .await
        {
            error!(message_id = message.message_id, "Failed to record flagged message: {}", e);
        }

        let deleted = match self
            .platform
            .execute_effect(Effect::DeleteMessage {
                channel_id: message.channel_id,
                message_id: message.message_id,
            })
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(message_id = message.message_id, "Failed to remove flagged message: {}", e);
                false
            }
        };

        info!(
            user_id = message.author.id,
            message_id = message.message_id,
            terms = ?classification.matches,
            "Flagged message"
        );

        let alert = Arc::new(ModerationAlert::new(
            message.message_id,
            message.author,
            message.channel_id,
            classification.matches,
            message.content.chars().take(ALERT_EXCERPT_CHARS).collect(),
            deleted,
        ));
        self.alerts.insert(alert.id, alert.clone());
        Some(alert)
    }

    /// Handle a click on an alert button.
    ///
    /// Only one click ever executes. A failed execution re-arms the alert.
    pub async fn resolve_alert(
        &self,
        alert_id: u64,
        target_id: u64,
        choice: AlertChoice,
        actor: ParticipantRef,
    ) -> Result<(Arc<ModerationAlert>, ActionReceipt), AlertError> {
        // `finish` marks the id resolved before removing the entry, so checking
        // under the entry lock cannot miss a resolution.
        let alert = match self.alerts.entry(alert_id) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                if self.resolved.contains(&alert_id) {
                    return Err(AlertError::AlreadyResolved);
                }
                entry
                    .insert(Arc::new(ModerationAlert::rearmed(alert_id, target_id)))
                    .clone()
            }
        };

        match alert.transition(AlertState::Armed, AlertState::Executing) {
            Ok(()) => {}
            Err(AlertState::Executing) => return Err(AlertError::InFlight),
            Err(_) => return Err(AlertError::AlreadyResolved),
        }

        let mut request = ActionRequest::new(choice.action_kind(), alert.target.clone(), actor)
            .with_reason(Some(ALERT_REASON.to_string()));
        if choice == AlertChoice::Timeout {
            request = request.with_duration(ALERT_TIMEOUT_MINUTES);
        }

        match self.execute(request).await {
            Ok(receipt) => {
                self.finish(&alert);
                Ok((alert, receipt))
            }
            Err(ModerationError::NotRecorded(e)) => {
                // The effect is out there, a second click would repeat it.
                self.finish(&alert);
                Err(AlertError::Action(ModerationError::NotRecorded(e)))
            }
            Err(e) => {
                let _ = alert.transition(AlertState::Executing, AlertState::Armed);
                Err(AlertError::Action(e))
            }
        }
    }

    fn finish(&self, alert: &ModerationAlert) {
        let _ = alert.transition(AlertState::Executing, AlertState::Resolved);
        self.resolved.insert(alert.id);
        self.alerts.remove(&alert.id);
    }

    #[cfg(test)]
    pub fn alert(&self, alert_id: u64) -> Option<Arc<ModerationAlert>> {
        self.alerts.get(&alert_id).map(|a| a.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audit::test_support::MockAuditStore;
    use crate::core::platform::test_support::MockPlatform;
    use std::sync::atomic::Ordering;

    const MOD: u64 = 10;
    const ADMIN: u64 = 11;
    const MEMBER: u64 = 20;
    const BOT: u64 = 30;

    fn platform() -> MockPlatform {
        MockPlatform::new()
            .with_member(
                MOD,
                5,
                &[
                    Capability::ManageMessages,
                    Capability::ModerateMembers,
                    Capability::KickMembers,
                ],
            )
            .with_member(ADMIN, 10, &[Capability::Administrator])
            .with_member(MEMBER, 1, &[])
            .with_bot(BOT)
    }

    fn service_with(
        platform: MockPlatform,
        terms: &[&str],
    ) -> ModerationService<MockAuditStore, MockPlatform> {
        ModerationService::new(
            MockAuditStore::new(),
            Arc::new(platform),
            Arc::new(BlacklistMatcher::new(terms.iter().copied()).unwrap()),
        )
    }

    fn service() -> ModerationService<MockAuditStore, MockPlatform> {
        service_with(platform(), &["scam"])
    }

    fn who(id: u64) -> ParticipantRef {
        ParticipantRef::named(id, format!("user{}", id))
    }

    #[tokio::test]
    async fn test_warn_writes_action_warning_and_both_facets() {
        let svc = service();
        let receipt = svc
            .execute(
                ActionRequest::new(ActionKind::Warn, who(MEMBER), who(MOD))
                    .with_reason(Some("spamming".into())),
            )
            .await
            .unwrap();

        assert_eq!(receipt.kind, ActionKind::Warn);
        assert!(receipt.notified);
        assert!(svc.platform.effect_log().is_empty());

        let store = svc.store();
        assert_eq!(store.action_count(), 1);
        assert_eq!(store.warnings.lock().unwrap().len(), 1);
        let warned = store.events_of_kind(kinds::WARNED);
        assert_eq!(warned.len(), 1);
        assert_eq!(warned[0].subject_id, MEMBER);
        let staff = store.events_of_kind(kinds::MOD_ACTION_PERFORMED);
        assert_eq!(staff.len(), 1);
        assert_eq!(staff[0].subject_id, MOD);
    }

    #[tokio::test]
    async fn test_kick_rejected_without_rank_has_no_effect_and_no_write() {
        let platform = platform();
        platform.ranks.insert(MEMBER, 5);
        let svc = service_with(platform, &[]);

        let err = svc
            .execute(ActionRequest::new(ActionKind::Kick, who(MEMBER), who(MOD)))
            .await
            .unwrap_err();

        assert!(matches!(err, ModerationError::InsufficientRank));
        assert!(svc.platform.effect_log().is_empty());
        assert!(svc.platform.direct_log().is_empty());
        assert_eq!(svc.store().action_count(), 0);
        assert!(svc.store().events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lower_rank_actor_is_rejected() {
        let svc = service();
        let err = svc
            .execute(ActionRequest::new(ActionKind::Ban, who(MOD), who(MEMBER)))
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::InsufficientRank));
    }

    #[tokio::test]
    async fn test_bot_target_is_rejected_first() {
        let platform = platform();
        // The bot check runs before the rank check.
        platform.ranks.insert(BOT, 100);
        let svc = service_with(platform, &[]);

        let err = svc
            .execute(ActionRequest::new(ActionKind::Kick, who(BOT), who(MEMBER)))
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::ProtectedTarget));
    }

    #[tokio::test]
    async fn test_missing_capability() {
        let svc = service();
        let err = svc
            .execute(ActionRequest::new(ActionKind::Ban, who(MEMBER), who(MOD)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ModerationError::MissingCapability(Capability::BanMembers)
        ));

        // Administrators hold every capability.
        let receipt = svc
            .execute(ActionRequest::new(ActionKind::Ban, who(MEMBER), who(ADMIN)))
            .await
            .unwrap();
        assert_eq!(receipt.kind, ActionKind::Ban);
    }

    #[tokio::test]
    async fn test_timeout_duration_bounds() {
        let svc = service();
        for minutes in [0, MAX_TIMEOUT_MINUTES + 1] {
            let err = svc
                .execute(
                    ActionRequest::new(ActionKind::Timeout, who(MEMBER), who(MOD))
                        .with_duration(minutes),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, ModerationError::InvalidInput(_)));
        }

        let receipt = svc
            .execute(
                ActionRequest::new(ActionKind::Timeout, who(MEMBER), who(MOD))
                    .with_duration(MAX_TIMEOUT_MINUTES),
            )
            .await
            .unwrap();
        assert_eq!(receipt.duration_minutes, Some(MAX_TIMEOUT_MINUTES));
        assert!(matches!(
            svc.platform.effect_log()[0],
            Effect::Timeout { user_id: MEMBER, .. }
        ));
    }

    #[tokio::test]
    async fn test_kick_notifies_before_effect_and_survives_closed_dms() {
        let platform = platform();
        platform.dms_closed.insert(MEMBER);
        let svc = service_with(platform, &[]);

        let receipt = svc
            .execute(ActionRequest::new(ActionKind::Kick, who(MEMBER), who(MOD)))
            .await
            .unwrap();
        assert!(!receipt.notified);
        assert_eq!(svc.platform.effect_log().len(), 1);
        assert_eq!(svc.store().events_of_kind(kinds::KICKED).len(), 1);
    }

    #[tokio::test]
    async fn test_platform_failure_aborts_without_write() {
        let platform = platform();
        platform.effects_forbidden.store(true, Ordering::SeqCst);
        let svc = service_with(platform, &[]);

        let err = svc
            .execute(ActionRequest::new(ActionKind::Kick, who(MEMBER), who(MOD)))
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::Platform(_)));
        assert_eq!(svc.store().action_count(), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_after_effect_is_reported() {
        let svc = service();
        svc.store().fail_writes.store(true, Ordering::SeqCst);

        let err = svc
            .execute(ActionRequest::new(ActionKind::Kick, who(MEMBER), who(MOD)))
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::NotRecorded(_)));
        assert_eq!(svc.platform.effect_log().len(), 1);
    }

    #[tokio::test]
    async fn test_purge_writes_one_action_and_one_event() {
        let svc = service();
        let receipt = svc
            .execute(ActionRequest::purge(who(MOD), 77, 25, Some(who(MEMBER))))
            .await
            .unwrap();

        assert_eq!(receipt.purged, Some(25));
        assert_eq!(
            svc.platform.effect_log(),
            vec![Effect::Purge {
                channel_id: 77,
                limit: 25,
                author_id: Some(MEMBER)
            }]
        );
        assert_eq!(svc.store().action_count(), 1);
        let events = svc.store().events.lock().unwrap().clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, kinds::PURGE);
        assert_eq!(events[0].subject_id, MOD);
    }

    #[tokio::test]
    async fn test_purge_count_bounds() {
        let svc = service();
        let err = svc
            .execute(ActionRequest::purge(who(MOD), 77, 101, None))
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_flagged_message_end_to_end() {
        let svc = service_with(platform(), &["free nitro"]);
        let alert = svc
            .screen_message(ObservedMessage {
                message_id: 500,
                channel_id: 77,
                guild_id: 1,
                author: who(MEMBER),
                content: "get FR33 N1TR0 here".into(),
            })
            .await
            .expect("message should be flagged");

        let record = svc.store().contents.get(&500).unwrap().clone();
        assert!(record.flagged);
        assert_eq!(
            record.flag_reason.as_deref(),
            Some("Blacklisted words detected: free nitro")
        );
        assert_eq!(svc.store().events_of_kind(kinds::MESSAGE_FLAGGED).len(), 1);
        assert_eq!(
            svc.platform.effect_log(),
            vec![Effect::DeleteMessage {
                channel_id: 77,
                message_id: 500
            }]
        );
        assert!(alert.message_deleted);
        assert_eq!(alert.state(), AlertState::Armed);
    }

    #[tokio::test]
    async fn test_flagged_message_removal_failure_is_not_fatal() {
        let platform = platform();
        platform.effects_forbidden.store(true, Ordering::SeqCst);
        let svc = service_with(platform, &["scam"]);

        let alert = svc
            .screen_message(ObservedMessage {
                message_id: 501,
                channel_id: 77,
                guild_id: 1,
                author: who(MEMBER),
                content: "totally not a scam".into(),
            })
            .await
            .unwrap();
        assert!(!alert.message_deleted);
        assert!(svc.store().contents.get(&501).unwrap().flagged);
    }

    #[tokio::test]
    async fn test_clean_message_is_recorded_unflagged() {
        let svc = service();
        let alert = svc
            .screen_message(ObservedMessage {
                message_id: 502,
                channel_id: 77,
                guild_id: 1,
                author: who(MEMBER),
                content: "hello there".into(),
            })
            .await;
        assert!(alert.is_none());
        assert!(!svc.store().contents.get(&502).unwrap().flagged);
        assert!(svc.platform.effect_log().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_alert_clicks_execute_once() {
        let svc = Arc::new(service());
        let alert = svc
            .screen_message(ObservedMessage {
                message_id: 600,
                channel_id: 77,
                guild_id: 1,
                author: who(MEMBER),
                content: "scam link".into(),
            })
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let svc = svc.clone();
            let choice = AlertChoice::ALL[i % 4];
            let choice = if choice == AlertChoice::Ban {
                AlertChoice::Kick
            } else {
                choice
            };
            handles.push(tokio::spawn(async move {
                svc.resolve_alert(600, MEMBER, choice, who(MOD)).await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(AlertError::AlreadyResolved) | Err(AlertError::InFlight) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(svc.store().action_count(), 1);
        assert_eq!(alert.state(), AlertState::Resolved);
        assert!(matches!(
            svc.resolve_alert(600, MEMBER, AlertChoice::Warn, who(MOD))
                .await,
            Err(AlertError::AlreadyResolved)
        ));
    }

    #[tokio::test]
    async fn test_failed_click_rearms_alert() {
        let svc = service();
        svc.screen_message(ObservedMessage {
            message_id: 700,
            channel_id: 77,
            guild_id: 1,
            author: who(MEMBER),
            content: "scam".into(),
        })
        .await
        .unwrap();

        // The member cannot act on their own alert.
        let err = svc
            .resolve_alert(700, MEMBER, AlertChoice::Kick, who(MEMBER))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AlertError::Action(ModerationError::InsufficientRank)
        ));
        assert_eq!(svc.alert(700).unwrap().state(), AlertState::Armed);

        let (_, receipt) = svc
            .resolve_alert(700, MEMBER, AlertChoice::Timeout, who(MOD))
            .await
            .unwrap();
        assert_eq!(receipt.duration_minutes, Some(ALERT_TIMEOUT_MINUTES));
        assert_eq!(receipt.reason, ALERT_REASON);
    }

    #[tokio::test]
    async fn test_unknown_alert_is_rearmed_from_button() {
        let svc = service();
        let (alert, receipt) = svc
            .resolve_alert(999, MEMBER, AlertChoice::Warn, who(MOD))
            .await
            .unwrap();
        assert_eq!(alert.target.id, MEMBER);
        assert_eq!(receipt.kind, ActionKind::Warn);
    }

    #[tokio::test]
    async fn test_resolved_alert_drops_its_payload() {
        let svc = service();
        svc.screen_message(ObservedMessage {
            message_id: 800,
            channel_id: 77,
            guild_id: 1,
            author: who(MEMBER),
            content: "scam link here".into(),
        })
        .await
        .unwrap();
        assert!(svc.alert(800).is_some());

        svc.resolve_alert(800, MEMBER, AlertChoice::Warn, who(MOD))
            .await
            .unwrap();
        assert!(svc.alert(800).is_none());
        assert!(svc.alerts.is_empty());
        assert!(svc.resolved.contains(&800));

        // The button id alone must not re-arm a resolved alert.
        assert!(matches!(
            svc.resolve_alert(800, MEMBER, AlertChoice::Kick, who(MOD)).await,
            Err(AlertError::AlreadyResolved)
        ));
        assert!(svc.alerts.is_empty());
        assert_eq!(svc.store().action_count(), 1);
    }
}
