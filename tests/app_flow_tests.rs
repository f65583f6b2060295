// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application state machine tests.
//!
//! These tests verify that:
//! 1. Each launch path (query tokens, code, stored tokens, error) ends in
//!    the right state
//! 2. Tokens are refreshed before they expire, once, even under concurrency
//! 3. Credential failures sign the user out and clear storage
//! 4. Signing out abandons a load that is still running

use activity_forest::client::{ForestApp, Launch, LaunchParams, MemoryStorage, Phase};
use activity_forest::error::ClientError;
use activity_forest::models::{TokenRecord, TokenResponse, TOKEN_REFRESH_SKEW_MS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

mod common;
use common::{
    city_ride, morning_run, now_ms, numbered_activities, ScriptedBackend, ScriptedSource,
};

type TestApp = ForestApp<ScriptedBackend, ScriptedSource, MemoryStorage>;

fn two_activity_source() -> ScriptedSource {
    ScriptedSource::with_pages(vec![Ok(vec![morning_run(), city_ride()])])
}

fn app_with(backend: ScriptedBackend, source: ScriptedSource) -> TestApp {
    ForestApp::new(backend, source, MemoryStorage::new())
}

/// Store tokens as a previous session would have.
fn store_tokens(app: &TestApp, access_token: &str, expires_at: i64) {
    app.token_store()
        .save(&TokenRecord {
            access_token: access_token.to_string(),
            refresh_token: "stored_refresh".to_string(),
            expires_at,
        })
        .unwrap();
}

fn fetched_tokens(app: &TestApp) -> Vec<String> {
    app.repository()
        .source()
        .calls()
        .into_iter()
        .map(|(token, _, _)| token)
        .collect()
}

// ─── Launch ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_code_launch_exchanges_and_loads() {
    let app = app_with(ScriptedBackend::default(), two_activity_source());

    app.start("?code=auth_code_123&scope=read,activity:read_all").await;

    let state = app.state();
    assert_eq!(state.phase(), Phase::Ready);
    assert!(state.is_authenticated);
    assert_eq!(state.access_token.as_deref(), Some("exchanged_access"));
    assert_eq!(state.activities.len(), 2);
    assert_eq!(state.error, None);

    let stored = app.token_store().load().unwrap().unwrap();
    assert_eq!(stored.access_token, "exchanged_access");
    assert_eq!(stored.refresh_token, "exchanged_refresh");
    assert!(stored.expires_at > now_ms());
    assert!(fetched_tokens(&app).iter().all(|t| t == "exchanged_access"));
}

#[tokio::test]
async fn test_query_tokens_are_stored_and_used() {
    let app = app_with(ScriptedBackend::default(), two_activity_source());

    app.start("/?access_token=query_access&refresh_token=query_refresh&expires_in=21600")
        .await;

    let state = app.state();
    assert_eq!(state.access_token.as_deref(), Some("query_access"));
    assert_eq!(state.activities.len(), 2);

    let stored = app.token_store().load().unwrap().unwrap();
    assert_eq!(stored.refresh_token, "query_refresh");
    let expected = now_ms() + 21600 * 1000;
    assert!((stored.expires_at - expected).abs() < 5_000);
    assert_eq!(app.backend().refresh_count(), 0);
}

#[tokio::test]
async fn test_incomplete_query_tokens_are_rejected() {
    let app = app_with(ScriptedBackend::default(), two_activity_source());

    app.start("?access_token=query_access").await;

    let state = app.state();
    assert!(!state.is_authenticated);
    assert_eq!(
        state.error.as_deref(),
        Some("Authentication failed. Please try again.")
    );
    assert_eq!(app.token_store().load().unwrap(), None);
    assert!(fetched_tokens(&app).is_empty());
}

#[tokio::test]
async fn test_error_query_shows_authentication_failure() {
    let app = app_with(ScriptedBackend::default(), two_activity_source());

    app.start("?error=auth_failed").await;

    let state = app.state();
    assert_eq!(state.phase(), Phase::Error);
    assert!(!state.is_authenticated);
    assert_eq!(
        state.error.as_deref(),
        Some("Authentication failed. Please try again.")
    );
    assert!(fetched_tokens(&app).is_empty());
}

#[tokio::test]
async fn test_stored_tokens_resume_session() {
    let app = app_with(ScriptedBackend::default(), two_activity_source());
    store_tokens(&app, "stored_access", now_ms() + 3_600_000);

    app.start("").await;

    let state = app.state();
    assert_eq!(state.phase(), Phase::Ready);
    assert_eq!(state.activities.len(), 2);
    assert_eq!(fetched_tokens(&app), vec!["stored_access", "stored_access"]);
    assert_eq!(app.backend().refresh_count(), 0);
}

#[tokio::test]
async fn test_no_tokens_waits_for_login() {
    let app = app_with(ScriptedBackend::default(), two_activity_source());

    app.start("").await;

    assert_eq!(app.state().phase(), Phase::Unauthenticated);
    assert!(fetched_tokens(&app).is_empty());
}

#[tokio::test]
async fn test_out_of_range_expiry_is_rejected() {
    let app = app_with(ScriptedBackend::default(), two_activity_source());

    app.start("?access_token=a&refresh_token=b&expires_in=9223372036854775")
        .await;

    let state = app.state();
    assert!(!state.is_authenticated);
    assert_eq!(
        state.error.as_deref(),
        Some("Authentication failed. Please try again.")
    );
    assert_eq!(app.token_store().load().unwrap(), None);
    assert!(fetched_tokens(&app).is_empty());
}

#[tokio::test]
async fn test_refresh_with_out_of_range_expiry_signs_out() {
    let backend = ScriptedBackend {
        refresh: Ok(TokenResponse {
            access_token: Some("refreshed_access".to_string()),
            refresh_token: Some("refreshed_refresh".to_string()),
            expires_in: Some(i64::MAX),
            expires_at: None,
        }),
        ..ScriptedBackend::default()
    };
    let app = app_with(backend, two_activity_source());
    store_tokens(&app, "old_access", now_ms() - 1_000);

    app.load_activities().await;

    let state = app.state();
    assert!(!state.is_authenticated);
    assert_eq!(
        state.error.as_deref(),
        Some("Failed to refresh authentication. Please log in again.")
    );
    assert_eq!(app.token_store().load().unwrap(), None);
}

#[tokio::test]
async fn test_launch_precedence() {
    let app = app_with(ScriptedBackend::default(), ScriptedSource::default());
    store_tokens(&app, "stored_access", now_ms() + 3_600_000);

    let rejected = app
        .resolve_launch(&LaunchParams::parse("?error=denied&code=abc"))
        .unwrap();
    assert_eq!(rejected, Launch::Rejected("denied".to_string()));

    let tokens = app
        .resolve_launch(&LaunchParams::parse(
            "?access_token=a&refresh_token=r&expires_in=60&code=abc",
        ))
        .unwrap();
    assert!(matches!(tokens, Launch::Tokens(ref r) if r.access_token == "a"));

    let code = app.resolve_launch(&LaunchParams::parse("?code=abc")).unwrap();
    assert_eq!(code, Launch::Code("abc".to_string()));

    let stored = app.resolve_launch(&LaunchParams::default()).unwrap();
    assert!(matches!(stored, Launch::Stored(ref r) if r.access_token == "stored_access"));
}

// ─── Login ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_returns_authorization_url() {
    let app = app_with(ScriptedBackend::default(), ScriptedSource::default());

    let url = app.login().await;

    assert_eq!(
        url.as_deref(),
        Some("https://www.strava.com/oauth/authorize?client_id=1")
    );
    assert_eq!(app.state().phase(), Phase::Authenticating);
}

#[tokio::test]
async fn test_login_failure_sets_error() {
    let backend = ScriptedBackend {
        auth_url: Err(ClientError::AuthInit("connection refused".to_string())),
        ..ScriptedBackend::default()
    };
    let app = app_with(backend, ScriptedSource::default());

    assert_eq!(app.login().await, None);

    let state = app.state();
    assert_eq!(state.error.as_deref(), Some("Failed to initialize login"));
    assert!(!state.login_pending);
}

#[tokio::test]
async fn test_exchange_failure_leaves_user_signed_out() {
    let backend = ScriptedBackend {
        exchange: Err(ClientError::TokenExchange("HTTP 500".to_string())),
        ..ScriptedBackend::default()
    };
    let app = app_with(backend, two_activity_source());

    app.start("?code=bad_code").await;

    let state = app.state();
    assert!(!state.is_authenticated);
    assert!(!state.is_loading);
    assert_eq!(
        state.error.as_deref(),
        Some("Authentication failed. Please try again.")
    );
    assert_eq!(app.token_store().load().unwrap(), None);
}

#[tokio::test]
async fn test_exchange_without_access_token_fails() {
    let backend = ScriptedBackend {
        exchange: Ok(TokenResponse {
            refresh_token: Some("r".to_string()),
            expires_in: Some(21600),
            ..TokenResponse::default()
        }),
        ..ScriptedBackend::default()
    };
    let app = app_with(backend, two_activity_source());

    app.complete_login("code").await;

    let state = app.state();
    assert!(!state.is_authenticated);
    assert_eq!(
        state.error.as_deref(),
        Some("Authentication failed. Please try again.")
    );
}

// ─── Token refresh ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_expiring_token_is_refreshed_before_fetch() {
    let app = app_with(ScriptedBackend::default(), two_activity_source());
    store_tokens(&app, "old_access", now_ms() + 60_000);

    app.load_activities().await;

    assert_eq!(app.backend().refresh_count(), 1);
    assert_eq!(
        *app.backend().refreshed_with.lock().unwrap(),
        vec!["stored_refresh".to_string()]
    );
    assert!(fetched_tokens(&app).iter().all(|t| t == "refreshed_access"));

    let state = app.state();
    assert_eq!(state.access_token.as_deref(), Some("refreshed_access"));
    assert_eq!(state.activities.len(), 2);

    let stored = app.token_store().load().unwrap().unwrap();
    assert_eq!(stored.access_token, "refreshed_access");
    assert_eq!(stored.refresh_token, "refreshed_refresh");
}

#[tokio::test]
async fn test_token_outside_margin_is_not_refreshed() {
    let app = app_with(ScriptedBackend::default(), two_activity_source());
    store_tokens(&app, "fresh_access", now_ms() + TOKEN_REFRESH_SKEW_MS + 60_000);

    app.load_activities().await;

    assert_eq!(app.backend().refresh_count(), 0);
    assert!(fetched_tokens(&app).iter().all(|t| t == "fresh_access"));
}

#[tokio::test]
async fn test_refresh_failure_forces_logout() {
    let backend = ScriptedBackend {
        refresh: Err(ClientError::TokenRefresh("HTTP 400".to_string())),
        ..ScriptedBackend::default()
    };
    let app = app_with(backend, two_activity_source());
    store_tokens(&app, "old_access", now_ms() - 1_000);

    app.start("").await;

    let state = app.state();
    assert!(!state.is_authenticated);
    assert_eq!(state.access_token, None);
    assert!(state.activities.is_empty());
    assert_eq!(
        state.error.as_deref(),
        Some("Failed to refresh authentication. Please log in again.")
    );
    assert_eq!(app.token_store().load().unwrap(), None);
    assert!(fetched_tokens(&app).is_empty());
}

#[tokio::test]
async fn test_concurrent_loads_share_one_refresh() {
    let backend = ScriptedBackend {
        refresh_delay: Some(Duration::from_millis(50)),
        ..ScriptedBackend::default()
    };
    let app = app_with(backend, two_activity_source());
    store_tokens(&app, "old_access", now_ms() + 1_000);

    tokio::join!(app.load_activities(), app.load_activities());

    assert_eq!(app.backend().refresh_count(), 1);
    let tokens = fetched_tokens(&app);
    assert!(!tokens.is_empty());
    assert!(tokens.iter().all(|t| t == "refreshed_access"));
    assert_eq!(app.state().activities.len(), 2);
}

#[tokio::test]
async fn test_rejected_token_is_refreshed_once_and_retried() {
    let source = ScriptedSource {
        rejected_tokens: vec!["revoked_access".to_string()],
        ..two_activity_source()
    };
    let app = app_with(ScriptedBackend::default(), source);
    store_tokens(&app, "revoked_access", now_ms() + 3_600_000);

    app.load_activities().await;

    assert_eq!(app.backend().refresh_count(), 1);
    let state = app.state();
    assert_eq!(state.error, None);
    assert_eq!(state.activities.len(), 2);
    assert_eq!(state.access_token.as_deref(), Some("refreshed_access"));
    assert_eq!(fetched_tokens(&app)[0], "revoked_access");
}

#[tokio::test]
async fn test_rejected_after_refresh_forces_logout() {
    let source = ScriptedSource {
        rejected_tokens: vec!["revoked_access".to_string(), "refreshed_access".to_string()],
        ..two_activity_source()
    };
    let app = app_with(ScriptedBackend::default(), source);
    store_tokens(&app, "revoked_access", now_ms() + 3_600_000);

    app.load_activities().await;

    assert_eq!(app.backend().refresh_count(), 1);
    let state = app.state();
    assert!(!state.is_authenticated);
    assert_eq!(
        state.error.as_deref(),
        Some("Failed to refresh authentication. Please log in again.")
    );
    assert_eq!(app.token_store().load().unwrap(), None);
}

// ─── Loading ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_failure_keeps_session() {
    let source = ScriptedSource::with_pages(vec![
        Ok(numbered_activities(0, 200)),
        Err(ClientError::Network("HTTP 503".to_string())),
    ]);
    let app = app_with(ScriptedBackend::default(), source);
    store_tokens(&app, "stored_access", now_ms() + 3_600_000);

    app.load_activities().await;

    let state = app.state();
    assert!(state.is_authenticated);
    assert!(state.activities.is_empty());
    assert!(!state.is_loading);
    assert_eq!(
        state.error.as_deref(),
        Some("Failed to fetch activities. Please try again.")
    );
    assert!(app.token_store().load().unwrap().is_some());
}

#[tokio::test]
async fn test_loading_is_visible_while_fetching() {
    let source = ScriptedSource {
        delay: Some(Duration::from_millis(30)),
        ..two_activity_source()
    };
    let app = app_with(ScriptedBackend::default(), source);
    store_tokens(&app, "stored_access", now_ms() + 3_600_000);

    let watch_loading = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        app.state().phase()
    };
    let ((), seen) = tokio::join!(app.load_activities(), watch_loading);

    assert_eq!(seen, Phase::Loading);
    assert_eq!(app.state().phase(), Phase::Ready);
}

#[tokio::test]
async fn test_reload_clears_previous_error() {
    let app = app_with(ScriptedBackend::default(), two_activity_source());
    app.start("?error=auth_failed").await;
    assert!(app.state().error.is_some());

    store_tokens(&app, "stored_access", now_ms() + 3_600_000);
    app.load_activities().await;

    assert_eq!(app.state().error, None);
    assert_eq!(app.summary().count, 2);
}

// ─── Logout ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_logout_clears_everything() {
    let app = app_with(ScriptedBackend::default(), two_activity_source());
    store_tokens(&app, "stored_access", now_ms() + 3_600_000);
    app.start("").await;
    assert_eq!(app.state().activities.len(), 2);

    app.logout();

    let state = app.state();
    assert_eq!(state.phase(), Phase::Unauthenticated);
    assert!(state.activities.is_empty());
    assert_eq!(state.access_token, None);
    assert_eq!(app.token_store().load().unwrap(), None);
}

#[tokio::test]
async fn test_logout_abandons_load_in_flight() {
    let source = ScriptedSource {
        delay: Some(Duration::from_millis(100)),
        ..two_activity_source()
    };
    let app = app_with(ScriptedBackend::default(), source);
    store_tokens(&app, "stored_access", now_ms() + 3_600_000);

    let sign_out_midway = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        app.logout();
    };
    tokio::join!(app.load_activities(), sign_out_midway);

    // Give a stray completion the chance to land if it were going to.
    tokio::time::sleep(Duration::from_millis(150)).await;

    let state = app.state();
    assert!(!state.is_authenticated);
    assert!(!state.is_loading);
    assert!(state.activities.is_empty());
    assert_eq!(state.error, None);
}

#[tokio::test]
async fn test_logout_discards_refresh_finishing_afterwards() {
    // Repeat: the refresh reply and the sign-out become ready together, and
    // the outcome must not depend on which one is polled first.
    for round in 0..25 {
        let started = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let backend = ScriptedBackend {
            refresh: Ok(common::token_response(
                "after_logout_access",
                "after_logout_refresh",
            )),
            refresh_started: Some(started.clone()),
            refresh_gate: Some(gate.clone()),
            ..ScriptedBackend::default()
        };
        let app = app_with(backend, two_activity_source());
        store_tokens(&app, "old_access", now_ms() + 1_000);

        let sign_out_during_refresh = async {
            started.notified().await;
            gate.notify_one();
            app.logout();
        };
        tokio::join!(app.load_activities(), sign_out_during_refresh);

        let state = app.state();
        assert!(!state.is_authenticated, "round {}", round);
        assert_eq!(state.access_token, None, "round {}", round);
        assert!(state.activities.is_empty(), "round {}", round);
        assert_eq!(state.error, None, "round {}", round);
        assert_eq!(app.token_store().load().unwrap(), None, "round {}", round);
        assert!(fetched_tokens(&app).is_empty(), "round {}", round);
    }
}

#[tokio::test]
async fn test_failed_refresh_after_logout_keeps_new_session() {
    let started = Arc::new(Notify::new());
    let gate = Arc::new(Notify::new());
    let backend = ScriptedBackend {
        refresh: Err(ClientError::TokenRefresh("HTTP 400".to_string())),
        refresh_started: Some(started.clone()),
        refresh_gate: Some(gate.clone()),
        ..ScriptedBackend::default()
    };
    let app = app_with(backend, two_activity_source());
    store_tokens(&app, "old_access", now_ms() + 1_000);

    // Sign out mid-refresh, then sign in again before the refresh fails.
    let sign_out_and_back_in = async {
        started.notified().await;
        app.logout();
        store_tokens(&app, "next_access", now_ms() + 3_600_000);
        gate.notify_one();
    };
    tokio::join!(app.load_activities(), sign_out_and_back_in);

    let stored = app.token_store().load().unwrap();
    assert_eq!(stored.map(|r| r.access_token).as_deref(), Some("next_access"));
    assert_eq!(app.state().error, None);
}
