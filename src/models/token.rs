// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth token models.

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Margin before token expiration when we proactively refresh (5 minutes).
pub const TOKEN_REFRESH_SKEW_MS: i64 = 5 * 60 * 1000;

/// Persisted credentials for the signed-in athlete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry as epoch milliseconds.
    pub expires_at: i64,
}

impl TokenRecord {
    /// Build a record from an `expires_in` (seconds) relative to `now_ms`.
    ///
    /// Fails with `InvalidExpiry` when the expiry does not fit in epoch
    /// milliseconds.
    pub fn expiring_in(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in_secs: i64,
        now_ms: i64,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: expiry_after(expires_in_secs, now_ms)?,
        })
    }

    /// True when `now_ms` is past `expires_at - skew_ms`.
    ///
    /// Exact equality counts as not yet expiring.
    pub fn is_expiring_soon(&self, now_ms: i64, skew_ms: i64) -> bool {
        now_ms > self.expires_at.saturating_sub(skew_ms)
    }

    /// Convert a Strava token response into a record.
    ///
    /// Prefers `expires_in`; falls back to the absolute `expires_at` (seconds).
    pub fn from_response(response: TokenResponse, now_ms: i64) -> Result<Self, ClientError> {
        let access_token = response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(ClientError::EmptyToken)?;
        let refresh_token = response.refresh_token.unwrap_or_default();

        let expires_at = match (response.expires_in, response.expires_at) {
            (Some(expires_in), _) => expiry_after(expires_in, now_ms)?,
            (None, Some(expires_at)) => expires_at
                .checked_mul(1000)
                .ok_or(ClientError::InvalidExpiry)?,
            (None, None) => now_ms,
        };

        Ok(Self {
            access_token,
            refresh_token,
            expires_at,
        })
    }
}

fn expiry_after(expires_in_secs: i64, now_ms: i64) -> Result<i64, ClientError> {
    expires_in_secs
        .checked_mul(1000)
        .and_then(|ms| now_ms.checked_add(ms))
        .ok_or(ClientError::InvalidExpiry)
}

/// Token JSON returned by Strava (and proxied verbatim by the companion server).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds until expiry.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Absolute expiry, epoch seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
}
