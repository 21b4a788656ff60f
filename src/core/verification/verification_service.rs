// Verification flow - gate new members behind a captcha.
//
// issue:  participant -> signed link -> DM (or fallback) -> "verification_issued"
// submit: token -> captcha check -> verified flag + "verified" event -> role grant
//
// The verified flag and its event are one transaction. The role grant happens
// after the commit and is allowed to fail.

use super::challenge_token::{ChallengeTokenService, TOKEN_MAX_AGE_SECS};
use super::verification_models::*;
use crate::core::audit::{kinds, AuditQuery, AuditStore, NewAuditEvent, ParticipantRef};
use crate::core::platform::{Capability, CommunityPlatform, Effect, Notice};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct VerificationService<S: AuditStore, P: CommunityPlatform, V: ChallengeVerifier> {
    store: S,
    platform: Arc<P>,
    verifier: V,
    tokens: ChallengeTokenService,
    public_url: String,
}

impl<S: AuditStore, P: CommunityPlatform, V: ChallengeVerifier> VerificationService<S, P, V> {
    pub fn new(
        store: S,
        platform: Arc<P>,
        verifier: V,
        tokens: ChallengeTokenService,
        public_url: &str,
    ) -> Self {
        Self {
            store,
            platform,
            verifier,
            tokens,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn link_for(&self, token: &str) -> String {
        format!("{}/verify/{}", self.public_url, token)
    }

    /// Participant a token belongs to, if it is still valid.
    pub fn check_token(&self, token: &str) -> Option<u64> {
        self.tokens.validate(token)
    }

    /// Issue a fresh challenge and try to deliver it.
    pub async fn issue(
        &self,
        member: ParticipantRef,
        reason: IssueReason,
    ) -> Result<IssueOutcome, VerificationError> {
        self.store.upsert_participant(&member).await?;

        let token = self
            .tokens
            .issue(member.id)
            .map_err(|e| VerificationError::Token(e.to_string()))?;
        let link = self.link_for(&token);

        let notice = Notice::new(
            "Verification required",
            format!(
                "Welcome! Please complete the captcha to get access to the server.\n\
                 The link expires in {} minutes.",
                TOKEN_MAX_AGE_SECS / 60
            ),
        )
        .with_link("Verify", link.clone());

        let delivery = match self.platform.send_direct(member.id, &notice).await {
            Ok(()) => Delivery::Direct,
            Err(e) => {
                info!(user_id = member.id, "Direct delivery failed, trying fallback: {}", e);
                match self.platform.send_fallback(member.id, &notice).await {
                    Ok(()) => Delivery::Fallback,
                    Err(e) => {
                        warn!(user_id = member.id, "Could not deliver verification link: {}", e);
                        Delivery::Undelivered
                    }
                }
            }
        };

        self.store
            .append(NewAuditEvent::new(
                member.clone(),
                kinds::VERIFICATION_ISSUED,
                format!(
                    "Verification challenge issued ({}), delivery: {}",
                    reason.as_str(),
                    delivery.as_str()
                ),
            ))
            .await?;

        info!(user_id = member.id, reason = reason.as_str(), delivery = delivery.as_str(), "Issued verification challenge");
        Ok(IssueOutcome { link, delivery })
    }

    /// Staff-initiated reissue. Always allowed for humans, whatever their state.
    pub async fn reissue(
        &self,
        actor_id: u64,
        target: ParticipantRef,
    ) -> Result<IssueOutcome, VerificationError> {
        if !self
            .platform
            .has_capability(actor_id, Capability::ManageRoles)
            .await?
        {
            info!(actor_id, "Denied reverify: missing Manage Roles");
            return Err(VerificationError::Unauthorized);
        }
        if self.platform.is_automated(target.id).await? {
            return Err(VerificationError::ProtectedTarget);
        }
        self.issue(target, IssueReason::Reissue).await
    }

    pub async fn submit(&self, token: &str, response: &str) -> Result<SubmitOutcome, SubmitError> {
        self.submit_at(token, response, Utc::now()).await
    }

    /// Complete a challenge. Safe to repeat with the same token.
    pub async fn submit_at(
        &self,
        token: &str,
        response: &str,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome, SubmitError> {
        let participant_id = self
            .tokens
            .validate_at(token, now)
            .ok_or(SubmitError::InvalidToken)?;

        if response.trim().is_empty() {
            debug!(user_id = participant_id, "Submission without captcha response");
            return Err(SubmitError::MissingResponse);
        }

        match self.verifier.verify(response).await {
            Ok(true) => {}
            Ok(false) => {
                info!(user_id = participant_id, "Captcha not solved");
                return Err(SubmitError::ChallengeRejected);
            }
            Err(e) => {
                warn!(user_id = participant_id, "Captcha verifier failed: {}", e);
                return Err(SubmitError::ChallengeRejected);
            }
        }

        let newly_verified = self
            .store
            .mark_verified(
                participant_id,
                now,
                NewAuditEvent::new(
                    ParticipantRef::id_only(participant_id),
                    kinds::VERIFIED,
                    "Completed captcha verification",
                ),
            )
            .await
            .map_err(|e| {
                error!(user_id = participant_id, "Failed to store verification: {}", e);
                SubmitError::Storage(e)
            })?;

        // Re-granting on a repeat submit lets a failed grant be retried.
        let access_granted = match self
            .platform
            .execute_effect(Effect::GrantVerifiedRole {
                user_id: participant_id,
            })
            .await
        {
            Ok(_) => true,
            Err(e) => {
                error!(user_id = participant_id, "Verified but could not grant role: {}", e);
                false
            }
        };

        if newly_verified {
            info!(user_id = participant_id, "Participant verified");
            let notice = Notice::new(
                "Verification complete",
                "You have been verified and now have access to the server. Welcome!",
            );
            if let Err(e) = self.platform.send_direct(participant_id, &notice).await {
                debug!(user_id = participant_id, "Could not send confirmation: {}", e);
            }
        }

        Ok(SubmitOutcome {
            participant_id,
            newly_verified,
            access_granted,
        })
    }

    /// Current state, derived from the flag and the latest challenge event.
    pub async fn state(
        &self,
        participant_id: u64,
        now: DateTime<Utc>,
    ) -> Result<VerificationState, VerificationError> {
        if let Some(participant) = self.store.get_participant(participant_id).await? {
            if participant.verified {
                return Ok(VerificationState::Verified);
            }
        }

        let latest = self
            .store
            .query_events(AuditQuery {
                subject: Some(participant_id),
                kinds: vec![kinds::VERIFICATION_ISSUED.to_string()],
                limit: 1,
            })
            .await?;

        Ok(match latest.first() {
            Some(event) if (now - event.created_at).num_seconds() <= TOKEN_MAX_AGE_SECS => {
                VerificationState::ChallengeIssued
            }
            Some(_) => VerificationState::Expired,
            None => VerificationState::Unverified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audit::test_support::MockAuditStore;
    use crate::core::platform::test_support::MockPlatform;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MEMBER: u64 = 20;
    const MOD: u64 = 10;
    const BOT: u64 = 30;

    enum Answer {
        Solved,
        Unsolved,
        Down,
    }

    struct MockVerifier {
        answer: Answer,
        calls: AtomicUsize,
    }

    impl MockVerifier {
        fn new(answer: Answer) -> Self {
            Self {
                answer,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChallengeVerifier for MockVerifier {
        async fn verify(&self, _response: &str) -> Result<bool, VerifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.answer {
                Answer::Solved => Ok(true),
                Answer::Unsolved => Ok(false),
                Answer::Down => Err(VerifierError::Transport("connection refused".into())),
            }
        }
    }

    type Service = VerificationService<MockAuditStore, MockPlatform, MockVerifier>;

    fn service_with(platform: MockPlatform, answer: Answer) -> Service {
        VerificationService::new(
            MockAuditStore::new(),
            Arc::new(platform),
            MockVerifier::new(answer),
            ChallengeTokenService::new("secret"),
            "https://verify.example.com/",
        )
    }

    fn service(answer: Answer) -> Service {
        service_with(
            MockPlatform::new()
                .with_member(MEMBER, 1, &[])
                .with_member(MOD, 5, &[Capability::ManageRoles])
                .with_bot(BOT),
            answer,
        )
    }

    fn token_of(link: &str) -> &str {
        link.rsplit('/').next().unwrap()
    }

    fn member() -> ParticipantRef {
        ParticipantRef::named(MEMBER, "newbie")
    }

    #[tokio::test]
    async fn test_issue_delivers_by_dm() {
        let svc = service(Answer::Solved);
        let outcome = svc.issue(member(), IssueReason::Join).await.unwrap();

        assert_eq!(outcome.delivery, Delivery::Direct);
        assert!(outcome
            .link
            .starts_with("https://verify.example.com/verify/"));
        let dms = svc.platform.direct_log();
        assert_eq!(dms.len(), 1);
        assert_eq!(dms[0].1.link.as_ref().unwrap().1, outcome.link);

        let issued = svc.store().events_of_kind(kinds::VERIFICATION_ISSUED);
        assert_eq!(issued.len(), 1);
        assert!(issued[0].detail.contains("direct message"));
        assert_eq!(
            svc.state(MEMBER, Utc::now()).await.unwrap(),
            VerificationState::ChallengeIssued
        );
    }

    #[tokio::test]
    async fn test_issue_falls_back_then_gives_up() {
        let platform = MockPlatform::new();
        platform.dms_closed.insert(MEMBER);
        let svc = service_with(platform, Answer::Solved);

        let outcome = svc.issue(member(), IssueReason::Join).await.unwrap();
        assert_eq!(outcome.delivery, Delivery::Fallback);

        svc.platform.fallback_broken.store(true, Ordering::SeqCst);
        let outcome = svc.issue(member(), IssueReason::Join).await.unwrap();
        assert_eq!(outcome.delivery, Delivery::Undelivered);
        assert_eq!(
            svc.store().events_of_kind(kinds::VERIFICATION_ISSUED).len(),
            2
        );
    }

    #[tokio::test]
    async fn test_submit_verifies_once_and_is_idempotent() {
        let svc = service(Answer::Solved);
        let outcome = svc.issue(member(), IssueReason::Join).await.unwrap();
        let token = token_of(&outcome.link);

        let first = svc.submit(token, "captcha-response").await.unwrap();
        assert_eq!(
            first,
            SubmitOutcome {
                participant_id: MEMBER,
                newly_verified: true,
                access_granted: true,
            }
        );
        assert!(svc.store().is_verified(MEMBER));

        let second = svc.submit(token, "captcha-response").await.unwrap();
        assert!(!second.newly_verified);
        assert!(second.access_granted);

        assert_eq!(svc.store().events_of_kind(kinds::VERIFIED).len(), 1);
        assert_eq!(
            svc.state(MEMBER, Utc::now()).await.unwrap(),
            VerificationState::Verified
        );
        let grants = svc
            .platform
            .effect_log()
            .into_iter()
            .filter(|e| matches!(e, Effect::GrantVerifiedRole { user_id: MEMBER }))
            .count();
        assert_eq!(grants, 2);
        // Link DM plus one confirmation.
        assert_eq!(svc.platform.direct_log().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_token_never_reaches_verifier() {
        let svc = service(Answer::Solved);
        let err = svc.submit("bogus", "captcha-response").await.unwrap_err();

        assert!(matches!(err, SubmitError::InvalidToken));
        assert_eq!(svc.verifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let svc = service(Answer::Solved);
        let outcome = svc.issue(member(), IssueReason::Join).await.unwrap();

        let later = Utc::now() + Duration::minutes(31);
        let err = svc
            .submit_at(token_of(&outcome.link), "captcha-response", later)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::InvalidToken));
        assert_eq!(
            svc.state(MEMBER, later).await.unwrap(),
            VerificationState::Expired
        );
    }

    #[tokio::test]
    async fn test_missing_response() {
        let svc = service(Answer::Solved);
        let outcome = svc.issue(member(), IssueReason::Join).await.unwrap();
        let err = svc
            .submit(token_of(&outcome.link), "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::MissingResponse));
    }

    #[tokio::test]
    async fn test_verifier_failure_fails_closed() {
        for answer in [Answer::Unsolved, Answer::Down] {
            let svc = service(answer);
            let outcome = svc.issue(member(), IssueReason::Join).await.unwrap();
            let err = svc
                .submit(token_of(&outcome.link), "captcha-response")
                .await
                .unwrap_err();

            assert!(matches!(err, SubmitError::ChallengeRejected));
            assert!(!svc.store().is_verified(MEMBER));
            assert!(svc.store().events_of_kind(kinds::VERIFIED).is_empty());
        }
    }

    #[tokio::test]
    async fn test_role_grant_failure_keeps_verification() {
        let svc = service(Answer::Solved);
        svc.platform.role_grant_broken.store(true, Ordering::SeqCst);
        let outcome = svc.issue(member(), IssueReason::Join).await.unwrap();

        let result = svc
            .submit(token_of(&outcome.link), "captcha-response")
            .await
            .unwrap();
        assert!(result.newly_verified);
        assert!(!result.access_granted);
        assert!(svc.store().is_verified(MEMBER));
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported() {
        let svc = service(Answer::Solved);
        let outcome = svc.issue(member(), IssueReason::Join).await.unwrap();
        svc.store().fail_writes.store(true, Ordering::SeqCst);

        let err = svc
            .submit(token_of(&outcome.link), "captcha-response")
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Storage(_)));
        assert!(svc.platform.effect_log().is_empty());
    }

    #[tokio::test]
    async fn test_reissue_checks() {
        let svc = service(Answer::Solved);

        let err = svc.reissue(MEMBER, member()).await.unwrap_err();
        assert!(matches!(err, VerificationError::Unauthorized));

        let err = svc
            .reissue(MOD, ParticipantRef::named(BOT, "bot"))
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::ProtectedTarget));

        let outcome = svc.reissue(MOD, member()).await.unwrap();
        assert_eq!(outcome.delivery, Delivery::Direct);
        let issued = svc.store().events_of_kind(kinds::VERIFICATION_ISSUED);
        assert!(issued[0].detail.contains("reissue"));
    }

    #[tokio::test]
    async fn test_unknown_participant_is_unverified() {
        let svc = service(Answer::Solved);
        assert_eq!(
            svc.state(12345, Utc::now()).await.unwrap(),
            VerificationState::Unverified
        );
    }
}
