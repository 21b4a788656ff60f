// Challenge tokens - signed, self-contained, time-limited verification links.
//
// A token is an HS256 JWT over {sub, iat} scoped by a fixed audience. Nothing
// is stored server-side; the only way a token dies is by getting old.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Audience tag that keeps these tokens from being accepted anywhere else.
pub const TOKEN_AUDIENCE: &str = "captcha-verify";

/// Maximum token age, in seconds. A token exactly this old is still valid.
pub const TOKEN_MAX_AGE_SECS: i64 = 30 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token signature mismatch")]
    Tampered,
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct ChallengeClaims {
    sub: String,
    iat: i64,
    aud: String,
}

pub struct ChallengeTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl ChallengeTokenService {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Age is enforced against `iat` below, there is no `exp` claim.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["aud"]);
        validation.set_audience(&[TOKEN_AUDIENCE]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn issue(&self, participant_id: u64) -> Result<String, TokenError> {
        self.issue_at(participant_id, Utc::now())
    }

    pub fn issue_at(&self, participant_id: u64, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = ChallengeClaims {
            sub: participant_id.to_string(),
            iat: now.timestamp(),
            aud: TOKEN_AUDIENCE.to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Participant id bound to `token`, or `None` for any invalid token.
    pub fn validate(&self, token: &str) -> Option<u64> {
        self.validate_at(token, Utc::now())
    }

    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Option<u64> {
        match self.check_at(token, now) {
            Ok(id) => Some(id),
            Err(TokenError::Tampered) => {
                warn!("Rejected verification token with a bad signature");
                None
            }
            Err(e) => {
                debug!("Rejected verification token: {}", e);
                None
            }
        }
    }

    /// Like [`validate_at`](Self::validate_at) but keeps the rejection reason.
    pub fn check_at(&self, token: &str, now: DateTime<Utc>) -> Result<u64, TokenError> {
        let data = decode::<ChallengeClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::Tampered,
                other => TokenError::Malformed(format!("{:?}", other)),
            })?;

        let age = now.timestamp() - data.claims.iat;
        if age < 0 {
            return Err(TokenError::Malformed("issued in the future".into()));
        }
        if age > TOKEN_MAX_AGE_SECS {
            return Err(TokenError::Expired);
        }

        data.claims
            .sub
            .parse::<u64>()
            .map_err(|_| TokenError::Malformed("subject is not a participant id".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn service() -> ChallengeTokenService {
        ChallengeTokenService::new("test-signing-secret")
    }

    fn issued_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let svc = service();
        let token = svc.issue_at(123456789012345678, issued_at()).unwrap();
        assert_eq!(svc.validate_at(&token, issued_at()), Some(123456789012345678));
    }

    #[test]
    fn test_expiry_boundary() {
        let svc = service();
        let t = issued_at();
        let token = svc.issue_at(42, t).unwrap();

        let just_inside = t + Duration::minutes(29) + Duration::seconds(59);
        let just_outside = t + Duration::minutes(30) + Duration::seconds(1);

        assert_eq!(svc.validate_at(&token, just_inside), Some(42));
        assert_eq!(svc.validate_at(&token, t + Duration::minutes(30)), Some(42));
        assert_eq!(svc.validate_at(&token, just_outside), None);
        assert_eq!(svc.check_at(&token, just_outside), Err(TokenError::Expired));
    }

    #[test]
    fn test_any_single_character_change_is_rejected() {
        let svc = service();
        let token = svc.issue_at(42, issued_at()).unwrap();

        for (i, original) in token.char_indices() {
            let replacement = if original == 'A' { 'B' } else { 'A' };
            let mut tampered = token.clone();
            tampered.replace_range(i..i + original.len_utf8(), &replacement.to_string());
            assert_eq!(
                svc.validate_at(&tampered, issued_at()),
                None,
                "tampered token accepted at index {i}"
            );
        }
    }

    #[test]
    fn test_other_secret_is_tampered() {
        let token = ChallengeTokenService::new("other-secret")
            .issue_at(42, issued_at())
            .unwrap();
        assert_eq!(
            service().check_at(&token, issued_at()),
            Err(TokenError::Tampered)
        );
    }

    #[test]
    fn test_wrong_audience_is_rejected() {
        let claims = ChallengeClaims {
            sub: "42".into(),
            iat: issued_at().timestamp(),
            aud: "password-reset".into(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-signing-secret"),
        )
        .unwrap();
        assert_eq!(service().validate_at(&token, issued_at()), None);
    }

    #[test]
    fn test_future_token_is_rejected() {
        let svc = service();
        let token = svc.issue_at(42, issued_at() + Duration::minutes(5)).unwrap();
        assert!(matches!(
            svc.check_at(&token, issued_at()),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let svc = service();
        assert_eq!(svc.validate_at("", issued_at()), None);
        assert_eq!(svc.validate_at("not.a.token", issued_at()), None);
    }
}
