// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity Forest: every Strava activity as a tree.
//!
//! Two halves:
//! - `client`: the page-side pipeline (token lifecycle, paginated activity
//!   load, stats, popover placement, rendering)
//! - `routes`: a small companion server that holds the OAuth client secret
//!   and proxies the code exchange and token refresh

pub mod client;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use services::StravaOAuth;

/// Shared server state.
pub struct AppState {
    pub config: Config,
    pub strava: StravaOAuth,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let strava = StravaOAuth::from_config(&config);
        Self { config, strava }
    }
}
