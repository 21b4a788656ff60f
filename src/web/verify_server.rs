// Verification web server.
//
// Endpoints:
//   GET  /               -> liveness text
//   GET  /health         -> {"status": "ok", "bot_ready": bool}
//   GET  /verify/:token  -> captcha page (or error page)
//   POST /verify/:token  -> check captcha, mark verified

use super::pages;
use crate::core::audit::AuditStore;
use crate::core::platform::CommunityPlatform;
use crate::core::verification::{ChallengeVerifier, SubmitError, VerificationService};
use axum::extract::{Path, State};
use axum::response::Html;
use axum::routing::get;
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct WebState<S: AuditStore, P: CommunityPlatform, V: ChallengeVerifier> {
    pub verification: Arc<VerificationService<S, P, V>>,
    pub site_key: String,
    /// Flipped once the gateway reports ready.
    pub bot_ready: Arc<AtomicBool>,
}

#[derive(Debug, Deserialize)]
struct ChallengeForm {
    #[serde(rename = "h-captcha-response", default)]
    h_captcha_response: String,
}

async fn root() -> &'static str {
    "Bot is alive and running!"
}

async fn health<S, P, V>(State(state): State<Arc<WebState<S, P, V>>>) -> Json<Value>
where
    S: AuditStore + 'static,
    P: CommunityPlatform + 'static,
    V: ChallengeVerifier + 'static,
{
    Json(json!({
        "status": "ok",
        "bot_ready": state.bot_ready.load(Ordering::SeqCst),
    }))
}

async fn challenge_page<S, P, V>(
    State(state): State<Arc<WebState<S, P, V>>>,
    Path(token): Path<String>,
) -> Html<String>
where
    S: AuditStore + 'static,
    P: CommunityPlatform + 'static,
    V: ChallengeVerifier + 'static,
{
    match state.verification.check_token(&token) {
        Some(_) => Html(pages::challenge(&token, &state.site_key)),
        None => Html(pages::error(&SubmitError::InvalidToken.to_string())),
    }
}

async fn submit_challenge<S, P, V>(
    State(state): State<Arc<WebState<S, P, V>>>,
    Path(token): Path<String>,
    form: Option<Form<ChallengeForm>>,
) -> Html<String>
where
    S: AuditStore + 'static,
    P: CommunityPlatform + 'static,
    V: ChallengeVerifier + 'static,
{
    let response = form
        .map(|Form(form)| form.h_captcha_response)
        .unwrap_or_default();

    match state.verification.submit(&token, &response).await {
        Ok(_) => Html(pages::success()),
        Err(e) => Html(pages::error(&e.to_string())),
    }
}

pub fn router<S, P, V>(state: Arc<WebState<S, P, V>>) -> Router
where
    S: AuditStore + 'static,
    P: CommunityPlatform + 'static,
    V: ChallengeVerifier + 'static,
{
    Router::new()
        .route("/", get(root))
        .route("/health", get(health::<S, P, V>))
        .route(
            "/verify/:token",
            get(challenge_page::<S, P, V>).post(submit_challenge::<S, P, V>),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(app: Router, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Verification server listening on port {}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
