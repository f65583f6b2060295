// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava API clients.
//!
//! - `StravaOAuth`: server-side authorization URL, code exchange and token
//!   refresh, using the confidential client secret
//! - `StravaApi`: bearer-token activity pages, used by the client pipeline

use serde::Deserialize;

use crate::client::repository::ActivitySource;
use crate::config::Config;
use crate::error::{AppError, ClientError};
use crate::models::Activity;

pub const DEFAULT_OAUTH_URL: &str = "https://www.strava.com/oauth";
pub const DEFAULT_API_URL: &str = "https://www.strava.com/api/v3";

/// Read-only access to all of the athlete's activities.
pub const OAUTH_SCOPE: &str = "read,activity:read_all";

/// Server-side Strava OAuth client.
#[derive(Clone)]
pub struct StravaOAuth {
    http: reqwest::Client,
    oauth_url: String,
    client_id: String,
    client_secret: String,
}

impl StravaOAuth {
    /// Create a new OAuth client with credentials.
    pub fn new(oauth_url: &str, client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            oauth_url: oauth_url.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.strava_oauth_url,
            config.strava_client_id.clone(),
            config.strava_client_secret.clone(),
        )
    }

    /// Authorization page URL for the given callback and signed state.
    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> String {
        format!(
            "{}/authorize?\
             client_id={}&\
             redirect_uri={}&\
             response_type=code&\
             approval_prompt=auto&\
             scope={}&\
             state={}",
            self.oauth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            OAUTH_SCOPE,
            urlencoding::encode(state)
        )
    }

    /// Exchange an authorization code for tokens. Returns Strava's JSON as is.
    pub async fn exchange_code(&self, code: &str) -> Result<serde_json::Value, AppError> {
        self.token_request(&[("code", code), ("grant_type", "authorization_code")])
            .await
            .map_err(AppError::TokenExchange)
    }

    /// Refresh an access token. Returns Strava's JSON as is.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<serde_json::Value, AppError> {
        self.token_request(&[
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
        .map_err(AppError::TokenRefresh)
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<serde_json::Value, String> {
        let mut form = vec![
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        form.extend_from_slice(params);

        let response = self
            .http
            .post(format!("{}/token", self.oauth_url))
            .form(&form)
            .send()
            .await
            .map_err(|e| format!("Token request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "Strava token endpoint returned error");
            return Err(format!("Strava returned status {}", status));
        }

        response
            .json()
            .await
            .map_err(|e| format!("Failed to parse token response: {}", e))
    }
}

/// Bearer-token client for the athlete activity list.
#[derive(Debug, Clone)]
pub struct StravaApi {
    http: reqwest::Client,
    base_url: String,
}

impl Default for StravaApi {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

impl StravaApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// One page of the athlete's activities.
    pub async fn list_activities(
        &self,
        access_token: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Activity>, ClientError> {
        let url = format!("{}/athlete/activities", self.base_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("page", page.to_string()), ("per_page", per_page.to_string())])
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        check_response_json(response).await
    }
}

impl ActivitySource for StravaApi {
    async fn fetch_page(
        &self,
        access_token: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Activity>, ClientError> {
        self.list_activities(access_token, page, per_page).await
    }
}

/// Check response status and parse the JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();

        if status.as_u16() == 401 {
            return Err(ClientError::Unauthorized);
        }

        if status.as_u16() == 429 {
            tracing::warn!("Strava rate limit hit (429)");
        }

        return Err(ClientError::Network(format!("HTTP {}: {}", status, body)));
    }

    response
        .json()
        .await
        .map_err(|e| ClientError::Network(format!("JSON parse error: {}", e)))
}
