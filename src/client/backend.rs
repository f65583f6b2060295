// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client for the companion server's OAuth endpoints.

use std::future::Future;

use serde::Deserialize;
use serde_json::json;

use crate::error::ClientError;
use crate::models::TokenResponse;

/// The OAuth operations the client delegates to the companion server,
/// which holds the client secret.
pub trait AuthBackend: Send + Sync {
    /// URL of the Strava authorization page.
    fn auth_url(&self) -> impl Future<Output = Result<String, ClientError>> + Send;

    /// Exchange an authorization code for tokens.
    fn exchange_code(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<TokenResponse, ClientError>> + Send;

    /// Trade a refresh token for a new token pair.
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenResponse, ClientError>> + Send;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthUrlBody {
    auth_url: String,
}

/// `AuthBackend` over HTTP to `/api/*` on the companion server.
#[derive(Debug, Clone)]
pub struct CompanionClient {
    http: reqwest::Client,
    base_url: String,
}

impl CompanionClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_token(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<TokenResponse, String> {
        let response = self
            .http
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {}: {}", status, body));
        }

        response
            .json()
            .await
            .map_err(|e| format!("JSON parse error: {}", e))
    }
}

impl AuthBackend for CompanionClient {
    async fn auth_url(&self) -> Result<String, ClientError> {
        let response = self
            .http
            .get(self.url("/api/auth-url"))
            .send()
            .await
            .map_err(|e| ClientError::AuthInit(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ClientError::AuthInit(format!("HTTP {}", response.status())));
        }

        let body: AuthUrlBody = response
            .json()
            .await
            .map_err(|e| ClientError::AuthInit(format!("JSON parse error: {}", e)))?;
        Ok(body.auth_url)
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, ClientError> {
        self.post_token("/api/token-exchange", json!({ "code": code }))
            .await
            .map_err(ClientError::TokenExchange)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ClientError> {
        self.post_token(
            "/api/token-refresh",
            json!({ "refresh_token": refresh_token }),
        )
        .await
        .map_err(ClientError::TokenRefresh)
    }
}
