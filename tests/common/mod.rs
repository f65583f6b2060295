// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use activity_forest::client::{ActivitySource, AuthBackend};
use activity_forest::config::Config;
use activity_forest::error::ClientError;
use activity_forest::models::{Activity, TokenResponse};
use activity_forest::routes::create_router;
use activity_forest::AppState;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::TimeZone;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ─── Fixtures ────────────────────────────────────────────────────────────────

/// The morning run used throughout the display tests.
#[allow(dead_code)]
pub fn morning_run() -> Activity {
    Activity {
        name: "Morning Run in Central Park".to_string(),
        start_date: chrono::Utc.with_ymd_and_hms(2024, 12, 28, 8, 30, 0).unwrap(),
        distance: 5200.0,
        moving_time: 1800,
        average_speed: 2.88,
        total_elevation_gain: 45.0,
        activity_type: "Run".to_string(),
    }
}

#[allow(dead_code)]
pub fn city_ride() -> Activity {
    Activity {
        name: "Evening City Ride".to_string(),
        start_date: chrono::Utc.with_ymd_and_hms(2024, 12, 27, 17, 0, 0).unwrap(),
        distance: 15000.0,
        moving_time: 3600,
        average_speed: 4.16,
        total_elevation_gain: 120.0,
        activity_type: "Ride".to_string(),
    }
}

/// `count` distinct activities named "Activity {offset + i}".
#[allow(dead_code)]
pub fn numbered_activities(offset: usize, count: usize) -> Vec<Activity> {
    (offset..offset + count)
        .map(|i| Activity {
            name: format!("Activity {}", i),
            distance: 1000.0 + i as f64,
            moving_time: 600,
            ..morning_run()
        })
        .collect()
}

#[allow(dead_code)]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[allow(dead_code)]
pub fn token_response(access_token: &str, refresh_token: &str) -> TokenResponse {
    TokenResponse {
        access_token: Some(access_token.to_string()),
        refresh_token: Some(refresh_token.to_string()),
        expires_in: Some(21600),
        expires_at: None,
    }
}

// ─── In-process fakes ────────────────────────────────────────────────────────

/// Activity source that serves scripted pages.
#[derive(Default)]
#[allow(dead_code)]
pub struct ScriptedSource {
    /// Result for page N at index N-1; pages past the end are empty.
    pub pages: Vec<Result<Vec<Activity>, ClientError>>,
    /// Tokens answered with 401.
    pub rejected_tokens: Vec<String>,
    pub delay: Option<Duration>,
    pub calls: Mutex<Vec<(String, u32, u32)>>,
}

#[allow(dead_code)]
impl ScriptedSource {
    pub fn with_pages(pages: Vec<Result<Vec<Activity>, ClientError>>) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, u32, u32)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ActivitySource for ScriptedSource {
    async fn fetch_page(
        &self,
        access_token: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Activity>, ClientError> {
        self.calls
            .lock()
            .unwrap()
            .push((access_token.to_string(), page, per_page));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.rejected_tokens.iter().any(|t| t == access_token) {
            return Err(ClientError::Unauthorized);
        }

        self.pages
            .get(page as usize - 1)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Auth backend with canned answers.
#[allow(dead_code)]
pub struct ScriptedBackend {
    pub auth_url: Result<String, ClientError>,
    pub exchange: Result<TokenResponse, ClientError>,
    pub refresh: Result<TokenResponse, ClientError>,
    pub refresh_delay: Option<Duration>,
    /// Notified when a refresh request starts.
    pub refresh_started: Option<Arc<Notify>>,
    /// When set, a refresh waits for a permit before answering.
    pub refresh_gate: Option<Arc<Notify>>,
    pub refresh_calls: AtomicUsize,
    pub refreshed_with: Mutex<Vec<String>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            auth_url: Ok("https://www.strava.com/oauth/authorize?client_id=1".to_string()),
            exchange: Ok(token_response("exchanged_access", "exchanged_refresh")),
            refresh: Ok(token_response("refreshed_access", "refreshed_refresh")),
            refresh_delay: None,
            refresh_started: None,
            refresh_gate: None,
            refresh_calls: AtomicUsize::new(0),
            refreshed_with: Mutex::new(Vec::new()),
        }
    }
}

#[allow(dead_code)]
impl ScriptedBackend {
    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

impl AuthBackend for ScriptedBackend {
    async fn auth_url(&self) -> Result<String, ClientError> {
        self.auth_url.clone()
    }

    async fn exchange_code(&self, _code: &str) -> Result<TokenResponse, ClientError> {
        self.exchange.clone()
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ClientError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refreshed_with
            .lock()
            .unwrap()
            .push(refresh_token.to_string());
        if let Some(started) = &self.refresh_started {
            started.notify_one();
        }
        if let Some(gate) = &self.refresh_gate {
            gate.notified().await;
        }
        if let Some(delay) = self.refresh_delay {
            tokio::time::sleep(delay).await;
        }
        self.refresh.clone()
    }
}

// ─── Mock Strava over HTTP ───────────────────────────────────────────────────

/// Minimal stand-in for Strava's OAuth token endpoint and activity list.
#[derive(Default)]
#[allow(dead_code)]
pub struct MockStrava {
    pub activities: Vec<Activity>,
    /// The only bearer token the activity list accepts.
    pub access_token: String,
    pub client_secret: String,
    pub fail_token_endpoint: bool,
    pub delay: Duration,
    pub token_requests: Mutex<Vec<HashMap<String, String>>>,
}

#[derive(Deserialize)]
struct PageQuery {
    page: usize,
    per_page: usize,
}

async fn mock_token(
    State(mock): State<Arc<MockStrava>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    mock.token_requests.lock().unwrap().push(form.clone());

    let secret_ok = form.get("client_secret") == Some(&mock.client_secret);
    if mock.fail_token_endpoint || !secret_ok {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": "Bad Request", "errors": [{"code": "invalid"}]})),
        )
            .into_response();
    }

    Json(json!({
        "token_type": "Bearer",
        "access_token": mock.access_token,
        "refresh_token": "mock_refresh",
        "expires_at": chrono::Utc::now().timestamp() + 21600,
        "expires_in": 21600,
    }))
    .into_response()
}

async fn mock_activities(
    State(mock): State<Arc<MockStrava>>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Response {
    tokio::time::sleep(mock.delay).await;

    let expected = format!("Bearer {}", mock.access_token);
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(expected.as_str());
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "Authorization Error"})),
        )
            .into_response();
    }

    let start = (query.page.max(1) - 1) * query.per_page;
    let page: Vec<Activity> = mock
        .activities
        .iter()
        .skip(start)
        .take(query.per_page)
        .cloned()
        .collect();
    Json(page).into_response()
}

#[allow(dead_code)]
impl MockStrava {
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/oauth/token", post(mock_token))
            .route("/api/v3/athlete/activities", get(mock_activities))
            .with_state(self)
    }
}

/// Serve `app` on an ephemeral local port; returns its base URL.
#[allow(dead_code)]
pub async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Test config pointing Strava URLs at `strava_base`.
#[allow(dead_code)]
pub fn test_config(strava_base: &str) -> Config {
    Config {
        strava_oauth_url: format!("{}/oauth", strava_base),
        strava_api_url: format!("{}/api/v3", strava_base),
        ..Config::default()
    }
}

/// Create a test app backed by `mock`. Returns the router and shared state.
#[allow(dead_code)]
pub async fn create_test_app(mock: MockStrava) -> (Router, Arc<AppState>, Arc<MockStrava>) {
    let mock = Arc::new(mock);
    let strava_base = spawn_server(mock.clone().router()).await;
    let state = Arc::new(AppState::new(test_config(&strava_base)));
    (create_router(state.clone()), state, mock)
}
