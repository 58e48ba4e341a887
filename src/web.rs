//! HTTP transport for the four protocol routes
//!
//! Thin boundary layer: it owns the session cookie and the JSON encoding of
//! requests and responses, and hands everything else to the flow controller.

use crate::config::RpConfig;
use crate::error::RpError;
use crate::flow::RelyingParty;
use crate::verify::{AuthenticationResponse, RegistrationResponse};
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

const SESSION_COOKIE: &str = "rp_session";

#[derive(Clone)]
pub struct AppState {
    pub rp: Arc<RelyingParty>,
    pub config: Arc<RpConfig>,
}

#[derive(Debug, Deserialize)]
pub struct AccountRequest {
    pub account: String,
}

pub fn create_router(state: AppState) -> Router {
    // Permissive CORS during development only
    let cors = if cfg!(debug_assertions) {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin([state.config.rp_origin.parse().unwrap()])
            .allow_methods([axum::http::Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE])
            .allow_credentials(true)
    };

    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/register-challenge", post(register_challenge))
        .route("/register-response", post(register_response))
        .route("/login-challenge", post(login_challenge))
        .route("/login-response", post(login_response))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(64 * 1024))
                .layer(cors),
        )
        .with_state(state)
}

/// Read the session handle from the request cookies.
fn session_from(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE).map(|c| c.value().to_string())
}

/// Existing session handle, or a fresh one minted into the jar for a first
/// interaction. The jar only emits Set-Cookie for cookies it added.
fn session_or_new(jar: CookieJar) -> (String, CookieJar) {
    if let Some(id) = session_from(&jar) {
        return (id, jar);
    }
    let id = Uuid::new_v4().to_string();
    let cookie = Cookie::build((SESSION_COOKIE, id.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    (id, jar.add(cookie))
}

async fn register_challenge(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<AccountRequest>,
) -> Response {
    let (session_id, jar) = session_or_new(jar);
    match state.rp.register_challenge(&session_id, &request.account).await {
        Ok(grant) => (jar, Json(grant)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn register_response(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<RegistrationResponse>,
) -> Response {
    let Some(session_id) = session_from(&jar) else {
        return RpError::SessionNotFound.into_response();
    };
    match state.rp.register_response(&session_id, &payload).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn login_challenge(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<AccountRequest>,
) -> Response {
    let (session_id, jar) = session_or_new(jar);
    match state.rp.login_challenge(&session_id, &request.account).await {
        Ok(grant) => (jar, Json(grant)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn login_response(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<AuthenticationResponse>,
) -> Response {
    let Some(session_id) = session_from(&jar) else {
        return RpError::SessionNotFound.into_response();
    };
    match state.rp.login_response(&session_id, &payload).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => e.into_response(),
    }
}
