// Verification domain models.

use crate::core::audit::StoreError;
use async_trait::async_trait;
use thiserror::Error;

/// Why a challenge was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueReason {
    Join,
    Reissue,
}

impl IssueReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueReason::Join => "join",
            IssueReason::Reissue => "reissue",
        }
    }
}

/// Where the challenge link ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Direct,
    Fallback,
    /// Neither surface worked; only a reissue can resume the flow.
    Undelivered,
}

impl Delivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            Delivery::Direct => "direct message",
            Delivery::Fallback => "fallback channel",
            Delivery::Undelivered => "undelivered",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueOutcome {
    pub link: String,
    pub delivery: Delivery,
}

/// Derived verification state of one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationState {
    Unverified,
    ChallengeIssued,
    Expired,
    Verified,
}

impl VerificationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationState::Unverified => "Unverified",
            VerificationState::ChallengeIssued => "Challenge issued",
            VerificationState::Expired => "Challenge expired",
            VerificationState::Verified => "Verified",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub participant_id: u64,
    /// False when the participant was already verified.
    pub newly_verified: bool,
    /// Whether the verified role is now in place.
    pub access_granted: bool,
}

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("Cannot verify bot accounts")]
    ProtectedTarget,
    #[error("You need the Manage Roles permission to do this")]
    Unauthorized,
    #[error("Could not create a verification link: {0}")]
    Token(String),
    #[error("Platform error: {0}")]
    Platform(#[from] crate::core::platform::PlatformError),
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Why a submission was turned down. Messages are shown to the participant.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("This verification link has expired or is invalid. Please request a new one from the server.")]
    InvalidToken,
    #[error("Please complete the captcha before submitting.")]
    MissingResponse,
    #[error("Captcha verification failed. Please try again.")]
    ChallengeRejected,
    #[error("An error occurred. Please try again later.")]
    Storage(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("verifier unreachable: {0}")]
    Transport(String),
    #[error("verifier returned an unexpected response: {0}")]
    Api(String),
}

/// Third-party challenge check. `Ok(false)` means the challenge was not solved.
#[async_trait]
pub trait ChallengeVerifier: Send + Sync {
    async fn verify(&self, response: &str) -> Result<bool, VerifierError>;
}
