// hCaptcha siteverify client, the production challenge verifier.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::core::verification::{ChallengeVerifier, VerifierError};

const SITEVERIFY_URL: &str = "https://hcaptcha.com/siteverify";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Server-side hCaptcha check.
pub struct HcaptchaClient {
    client: Client,
    secret: String,
    verify_url: String,
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    #[serde(default)]
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

impl HcaptchaClient {
    pub fn new(secret: String) -> Result<Self, VerifierError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VerifierError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            secret,
            verify_url: SITEVERIFY_URL.to_string(),
        })
    }
}

#[async_trait]
impl ChallengeVerifier for HcaptchaClient {
    async fn verify(&self, response: &str) -> Result<bool, VerifierError> {
        let resp = self
            .client
            .post(&self.verify_url)
            .form(&[("secret", self.secret.as_str()), ("response", response)])
            .send()
            .await
            .map_err(|e| VerifierError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(VerifierError::Api(format!("HTTP {}", resp.status())));
        }

        let body: SiteVerifyResponse = resp
            .json()
            .await
            .map_err(|e| VerifierError::Api(e.to_string()))?;

        if !body.success {
            debug!(errors = ?body.error_codes, "hCaptcha rejected response");
        }
        Ok(body.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_siteverify_response() {
        let ok: SiteVerifyResponse = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(ok.success);

        let rejected: SiteVerifyResponse = serde_json::from_str(
            r#"{"success":false,"error-codes":["invalid-input-response"]}"#,
        )
        .unwrap();
        assert!(!rejected.success);
        assert_eq!(rejected.error_codes, vec!["invalid-input-response"]);
    }

    #[tokio::test]
    async fn test_unreachable_verifier_is_an_error() {
        let mut client = HcaptchaClient::new("secret".into()).unwrap();
        client.verify_url = "http://127.0.0.1:9/siteverify".into();

        let result = client.verify("response").await;
        assert!(matches!(result, Err(VerifierError::Transport(_))));
    }
}
