// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava OAuth routes.
//!
//! The server only holds the client secret; tokens are handed to the browser,
//! which keeps them in local storage.

use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::error::{AppError, Result};
use crate::models::TokenResponse;
use crate::AppState;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

/// How long a signed OAuth state stays valid.
const STATE_MAX_AGE_MS: u128 = 10 * 60 * 1000;

/// Where the browser lands after a failed authorization.
const AUTH_FAILED_REDIRECT: &str = "/?error=auth_failed";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth", get(auth_url))
        .route("/api/auth-url", get(auth_url))
        .route("/api/callback", get(auth_callback))
        .route("/api/token-exchange", post(token_exchange))
        .route("/api/token-refresh", post(token_refresh))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "public/generated/")
)]
pub struct AuthUrlResponse {
    #[serde(rename = "authUrl")]
    pub auth_url: String,
}

fn now_millis() -> Result<u128> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_millis())
}

/// Build the Strava authorization URL.
async fn auth_url(State(state): State<Arc<AppState>>) -> Result<Json<AuthUrlResponse>> {
    let oauth_state = sign_state(&state.config.oauth_state_key, now_millis()?)?;
    let auth_url = state
        .strava
        .authorize_url(&state.config.redirect_uri(), &oauth_state);

    tracing::info!(
        client_id = %state.config.strava_client_id,
        redirect_uri = %state.config.redirect_uri(),
        "Issued authorization URL"
    );

    Ok(Json(AuthUrlResponse { auth_url }))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - exchange the code and hand the tokens to the front end
/// in the query string.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from Strava");
        return Redirect::temporary(AUTH_FAILED_REDIRECT);
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        tracing::warn!("OAuth callback without code");
        return Redirect::temporary(AUTH_FAILED_REDIRECT);
    };

    let state_ok = match (params.state.as_deref(), now_millis()) {
        (Some(s), Ok(now)) => verify_state(s, &state.config.oauth_state_key, now),
        _ => false,
    };
    if !state_ok {
        tracing::error!("Invalid, expired or missing OAuth state parameter");
        return Redirect::temporary(AUTH_FAILED_REDIRECT);
    }

    tracing::info!("Exchanging authorization code for tokens");

    let tokens = match state.strava.exchange_code(&code).await {
        Ok(json) => serde_json::from_value::<TokenResponse>(json).unwrap_or_default(),
        Err(e) => {
            tracing::warn!(error = %e, "Code exchange failed in callback");
            return Redirect::temporary(AUTH_FAILED_REDIRECT);
        }
    };

    match token_redirect(&tokens) {
        Some(location) => {
            tracing::info!("OAuth successful, redirecting with tokens");
            Redirect::temporary(&location)
        }
        None => {
            tracing::warn!("Token response did not contain an access token");
            Redirect::temporary(AUTH_FAILED_REDIRECT)
        }
    }
}

/// `/?access_token=..&refresh_token=..&expires_in=..` for a token response.
fn token_redirect(tokens: &TokenResponse) -> Option<String> {
    let access_token = tokens.access_token.as_deref().filter(|t| !t.is_empty())?;
    let refresh_token = tokens.refresh_token.as_deref().unwrap_or_default();

    let expires_in = match (tokens.expires_in, tokens.expires_at) {
        (Some(expires_in), _) => expires_in,
        (None, Some(expires_at)) => {
            let now_secs = now_millis().ok()? / 1000;
            (expires_at as i128 - now_secs as i128).max(0) as i64
        }
        (None, None) => 0,
    };

    Some(format!(
        "/?access_token={}&refresh_token={}&expires_in={}",
        urlencoding::encode(access_token),
        urlencoding::encode(refresh_token),
        expires_in
    ))
}

#[derive(Deserialize)]
pub struct TokenExchangeRequest {
    code: String,
}

/// Proxy the authorization-code exchange.
async fn token_exchange(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TokenExchangeRequest>,
) -> Result<Json<serde_json::Value>> {
    if body.code.trim().is_empty() {
        return Err(AppError::BadRequest("code is required".to_string()));
    }
    let tokens = state.strava.exchange_code(body.code.trim()).await?;
    tracing::info!("Token exchange proxied");
    Ok(Json(tokens))
}

#[derive(Deserialize)]
pub struct TokenRefreshRequest {
    refresh_token: String,
}

/// Proxy the token refresh.
async fn token_refresh(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TokenRefreshRequest>,
) -> Result<Json<serde_json::Value>> {
    if body.refresh_token.trim().is_empty() {
        return Err(AppError::BadRequest("refresh_token is required".to_string()));
    }
    let tokens = state.strava.refresh_token(body.refresh_token.trim()).await?;
    tracing::info!("Token refresh proxied");
    Ok(Json(tokens))
}

/// Signed OAuth state: base64url("timestamp_hex|signature_hex").
pub fn sign_state(secret: &[u8], now_ms: u128) -> Result<String> {
    let payload = format!("{:x}", now_ms);

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    Ok(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, signature)))
}

/// Check the signature and age of an OAuth state parameter.
pub fn verify_state(state: &str, secret: &[u8], now_ms: u128) -> bool {
    let Some(decoded) = URL_SAFE_NO_PAD
        .decode(state)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
    else {
        return false;
    };

    let Some((timestamp_hex, signature_hex)) = decoded.split_once('|') else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(timestamp_hex.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    if !bool::from(expected.as_bytes().ct_eq(signature_hex.as_bytes())) {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return false;
    }

    match u128::from_str_radix(timestamp_hex, 16) {
        Ok(issued) => issued <= now_ms && now_ms - issued <= STATE_MAX_AGE_MS,
        Err(_) => false,
    }
}
