// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Configuration loaded from environment variables (and `.env` if present).

use std::env;
use std::path::PathBuf;

use crate::services::strava::{DEFAULT_API_URL, DEFAULT_OAUTH_URL};

/// Companion server configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Strava OAuth client ID (public)
    pub strava_client_id: String,
    /// Public base URL of this deployment; the OAuth redirect URI hangs off it
    pub public_url: String,
    /// Server port
    pub port: u16,
    /// Directory with the static front end
    pub static_dir: PathBuf,
    /// Strava OAuth base URL (authorize + token)
    pub strava_oauth_url: String,
    /// Strava REST API base URL
    pub strava_api_url: String,

    // --- Secrets ---
    /// Strava OAuth client secret
    pub strava_client_secret: String,
    /// HMAC key for the OAuth state parameter (raw bytes)
    pub oauth_state_key: Vec<u8>,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            strava_client_id: "test_client_id".to_string(),
            public_url: "http://localhost:3000".to_string(),
            port: 3000,
            static_dir: PathBuf::from("public"),
            strava_oauth_url: DEFAULT_OAUTH_URL.to_string(),
            strava_api_url: DEFAULT_API_URL.to_string(),
            strava_client_secret: "test_secret".to_string(),
            oauth_state_key: b"test_state_key_32_bytes_minimum!".to_vec(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let public_url = var("PUBLIC_URL")
            .or_else(|| var("VERCEL_URL").map(|host| format!("https://{}", host)))
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            strava_client_id: var("STRAVA_CLIENT_ID")
                .ok_or(ConfigError::Missing("STRAVA_CLIENT_ID"))?,
            public_url,
            port: var("PORT").and_then(|p| p.parse().ok()).unwrap_or(3000),
            static_dir: var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("public")),
            strava_oauth_url: var("STRAVA_OAUTH_URL")
                .unwrap_or_else(|| DEFAULT_OAUTH_URL.to_string()),
            strava_api_url: var("STRAVA_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),

            strava_client_secret: var("STRAVA_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .ok_or(ConfigError::Missing("STRAVA_CLIENT_SECRET"))?,
            oauth_state_key: var("OAUTH_STATE_KEY")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing("OAUTH_STATE_KEY"))?
                .into_bytes(),
        })
    }

    /// OAuth redirect URI registered with Strava.
    pub fn redirect_uri(&self) -> String {
        format!("{}/api/callback", self.public_url)
    }
}

/// Terminal client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the companion server
    pub server_url: String,
    /// Where tokens are persisted between runs
    pub token_path: PathBuf,
    /// Strava REST API base URL
    pub strava_api_url: String,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            server_url: var("FOREST_SERVER_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            token_path: var("FOREST_TOKEN_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".forest/tokens.json")),
            strava_api_url: var("STRAVA_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
