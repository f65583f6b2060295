// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application state machine.
//!
//! `ForestApp` owns the `ApplicationState` and is the only thing that
//! mutates it. It drives:
//! - launch from URL query parameters or stored tokens
//! - the login redirect and code exchange
//! - token refresh before authenticated calls (5-minute margin)
//! - the paginated activity load
//! - logout, which also abandons any load still in flight
//!
//! Every error is caught here and turned into the state's `error` message.

use std::future::Future;
use std::sync::Mutex;

use tokio::sync::watch;

use crate::client::aggregate::{summarize, Summary};
use crate::client::backend::AuthBackend;
use crate::client::repository::{ActivityRepository, ActivitySource};
use crate::client::state::ApplicationState;
use crate::client::token_store::{KeyValueStorage, TokenStore};
use crate::error::ClientError;
use crate::models::{Activity, TokenRecord, TOKEN_REFRESH_SKEW_MS};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// OAuth-related query parameters present when the page loads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchParams {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
}

impl LaunchParams {
    /// Parse a query string. Accepts a bare query (`a=1&b=2`), one with a
    /// leading `?`, or a full URL.
    pub fn parse(input: &str) -> Self {
        let query = match input.split_once('?') {
            Some((_, query)) => query,
            None if input.contains('=') => input,
            None => "",
        };
        let query = query.split('#').next().unwrap_or_default();

        let mut params = Self::default();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = value.replace('+', " ");
            let value = match urlencoding::decode(&value) {
                Ok(v) => v.into_owned(),
                Err(_) => continue,
            };
            if value.is_empty() {
                continue;
            }
            match key {
                "access_token" => params.access_token = Some(value),
                "refresh_token" => params.refresh_token = Some(value),
                "expires_in" => params.expires_in = Some(value),
                "code" => params.code = Some(value),
                "error" => params.error = Some(value),
                _ => {}
            }
        }
        params
    }

    /// Whether the query carried OAuth results the host should strip from
    /// its address bar.
    pub fn has_oauth_params(&self) -> bool {
        self.access_token.is_some() || self.code.is_some() || self.error.is_some()
    }
}

/// How the app starts, decided synchronously from the query and storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launch {
    /// The authorization server reported an error.
    Rejected(String),
    /// Tokens were handed over in the query.
    Tokens(TokenRecord),
    /// An authorization code still needs exchanging.
    Code(String),
    /// Tokens from a previous session.
    Stored(TokenRecord),
    SignedOut,
}

pub struct ForestApp<B, A, S> {
    backend: B,
    repository: ActivityRepository<A>,
    tokens: TokenStore<S>,
    state: Mutex<ApplicationState>,
    /// Serializes token refreshes.
    refresh_lock: tokio::sync::Mutex<()>,
    /// Bumped on every sign-out; work started under an older value is dropped.
    session: watch::Sender<u64>,
}

impl<B, A, S> ForestApp<B, A, S>
where
    B: AuthBackend,
    A: ActivitySource,
    S: KeyValueStorage,
{
    pub fn new(backend: B, source: A, storage: S) -> Self {
        Self::with_repository(backend, ActivityRepository::new(source), storage)
    }

    pub fn with_repository(backend: B, repository: ActivityRepository<A>, storage: S) -> Self {
        let (session, _) = watch::channel(0);
        Self {
            backend,
            repository,
            tokens: TokenStore::new(storage),
            state: Mutex::new(ApplicationState::new()),
            refresh_lock: tokio::sync::Mutex::new(()),
            session,
        }
    }

    /// Snapshot of the current state, for rendering.
    pub fn state(&self) -> ApplicationState {
        self.lock_state().clone()
    }

    pub fn summary(&self) -> Summary {
        summarize(&self.lock_state().activities)
    }

    pub fn token_store(&self) -> &TokenStore<S> {
        &self.tokens
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn repository(&self) -> &ActivityRepository<A> {
        &self.repository
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ApplicationState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update<R>(&self, f: impl FnOnce(&mut ApplicationState) -> R) -> R {
        let mut state = self.lock_state();
        let out = f(&mut state);
        debug_assert!(state.is_consistent());
        out
    }

    fn epoch(&self) -> u64 {
        *self.session.borrow()
    }

    /// Run `fut` unless a sign-out happens first. Returns `None` when the
    /// session changed, in which case the result must not touch state.
    async fn unless_signed_out<F: Future>(&self, epoch: u64, fut: F) -> Option<F::Output> {
        let mut session = self.session.subscribe();
        tokio::select! {
            out = fut => (self.epoch() == epoch).then_some(out),
            _ = session.wait_for(|current| *current != epoch) => None,
        }
    }

    /// Apply `f` to the state unless a sign-out happened since `epoch`.
    ///
    /// Runs under the state lock, which is also held around `end_session`
    /// while it bumps the epoch, so a commit and a sign-out never interleave.
    fn commit<R>(&self, epoch: u64, f: impl FnOnce(&mut ApplicationState) -> R) -> Option<R> {
        let mut state = self.lock_state();
        if self.epoch() != epoch {
            return None;
        }
        let out = f(&mut state);
        debug_assert!(state.is_consistent());
        Some(out)
    }

    // ─── Launch ──────────────────────────────────────────────────────────────

    /// Decide how to start: query error, then query tokens, then query code,
    /// then stored tokens, then signed out.
    pub fn resolve_launch(&self, params: &LaunchParams) -> Result<Launch, ClientError> {
        if let Some(error) = &params.error {
            return Ok(Launch::Rejected(error.clone()));
        }

        if let Some(access_token) = &params.access_token {
            let expires_in = params
                .expires_in
                .as_deref()
                .and_then(|v| v.trim().parse::<i64>().ok());
            return Ok(match (&params.refresh_token, expires_in) {
                (Some(refresh_token), Some(expires_in)) => {
                    match TokenRecord::expiring_in(
                        access_token.clone(),
                        refresh_token.clone(),
                        expires_in,
                        now_ms(),
                    ) {
                        Ok(record) => Launch::Tokens(record),
                        Err(e) => Launch::Rejected(e.to_string()),
                    }
                }
                _ => Launch::Rejected("incomplete token parameters".to_string()),
            });
        }

        if let Some(code) = &params.code {
            return Ok(Launch::Code(code.clone()));
        }

        Ok(match self.tokens.load()? {
            Some(record) => Launch::Stored(record),
            None => Launch::SignedOut,
        })
    }

    /// Start the app for a page load with the given query string.
    pub async fn start(&self, query: &str) {
        let epoch = self.epoch();
        let params = LaunchParams::parse(query);
        let launch = match self.resolve_launch(&params) {
            Ok(launch) => launch,
            Err(e) => {
                self.report(epoch, &e);
                return;
            }
        };

        match launch {
            Launch::Rejected(reason) => self.report(epoch, &ClientError::AuthRejected(reason)),
            Launch::Tokens(record) => {
                tracing::info!("Tokens received from OAuth callback");
                self.accept_tokens(epoch, record).await;
            }
            Launch::Code(code) => self.complete_login(&code).await,
            Launch::Stored(record) => {
                tracing::info!("Resuming with stored tokens");
                self.update(|s| s.authenticate(record.access_token));
                self.load_activities().await;
            }
            Launch::SignedOut => tracing::debug!("No stored tokens, waiting for login"),
        }
    }

    // ─── Authentication ──────────────────────────────────────────────────────

    /// Begin login. Returns the authorization URL the host should navigate
    /// to, or `None` after recording the error.
    pub async fn login(&self) -> Option<String> {
        let epoch = self.epoch();
        self.update(|s| s.begin_login());
        match self.backend.auth_url().await {
            Ok(url) => {
                tracing::info!("Redirecting to Strava authorization");
                Some(url)
            }
            Err(e) => {
                self.report(epoch, &e);
                None
            }
        }
    }

    /// Exchange an authorization code, store the tokens, and load activities.
    pub async fn complete_login(&self, code: &str) {
        let epoch = self.epoch();
        self.update(|s| s.begin_loading());

        let exchange = async {
            let response = self.backend.exchange_code(code).await?;
            TokenRecord::from_response(response, now_ms())
        };

        match self.unless_signed_out(epoch, exchange).await {
            Some(Ok(record)) => {
                tracing::info!("Authorization code exchanged");
                self.accept_tokens(epoch, record).await;
            }
            Some(Err(e)) => self.report(epoch, &e),
            None => tracing::info!("Code exchange abandoned after sign-out"),
        }
    }

    /// Store tokens obtained in session `epoch` and load activities.
    async fn accept_tokens(&self, epoch: u64, record: TokenRecord) {
        let saved = self.commit(epoch, |s| {
            self.tokens.save(&record)?;
            s.authenticate(record.access_token.clone());
            Ok::<_, ClientError>(())
        });
        match saved {
            Some(Ok(())) => self.load_activities().await,
            Some(Err(e)) => self.report(epoch, &e),
            None => tracing::info!("Tokens discarded after sign-out"),
        }
    }

    /// Sign out: forget tokens and activities and abandon in-flight work.
    pub fn logout(&self) {
        self.end_session(&mut self.lock_state(), None);
        tracing::info!("Signed out");
    }

    /// Bump the session epoch, clear the tokens, and reset the state.
    ///
    /// Callers hold the state lock, so no `commit` from the old session can
    /// land afterwards.
    fn end_session(&self, state: &mut ApplicationState, error: Option<String>) {
        self.session.send_modify(|epoch| *epoch += 1);
        if let Err(e) = self.tokens.clear() {
            tracing::warn!(error = %e, "Failed to clear stored tokens");
        }
        state.sign_out();
        state.error = error;
    }

    /// Surface an error raised by work started in session `epoch`.
    fn report(&self, epoch: u64, err: &ClientError) {
        let reauthenticate = err.requires_reauthentication();
        let reported = self.commit(epoch, |s| {
            if reauthenticate {
                self.end_session(s, Some(err.user_message().to_string()));
            } else {
                s.fail(err.user_message());
            }
        });

        match (reported, reauthenticate) {
            (None, _) => tracing::debug!(error = %err, "Ignoring error from an ended session"),
            (Some(()), true) => {
                tracing::warn!(error = %err, "Credentials no longer valid, signed out")
            }
            (Some(()), false) => tracing::warn!(error = %err, "Operation failed"),
        }
    }

    // ─── Tokens ──────────────────────────────────────────────────────────────

    /// Stored access token, refreshed first if it expires within the margin.
    /// The flag reports whether a refresh happened.
    async fn valid_access_token(&self, epoch: u64) -> Result<(String, bool), ClientError> {
        let record = self.tokens.load()?.ok_or(ClientError::MissingToken)?;
        if !record.is_expiring_soon(now_ms(), TOKEN_REFRESH_SKEW_MS) {
            return Ok((record.access_token, false));
        }
        let token = self.refresh_tokens(epoch, None).await?;
        Ok((token, true))
    }

    /// Refresh the stored tokens, at most one refresh at a time.
    ///
    /// With `rejected`, refresh only if the stored access token is still the
    /// one the API rejected; otherwise only if it is expiring. Either way a
    /// token refreshed by another caller while we waited is reused.
    ///
    /// The refreshed tokens are stored only if session `epoch` is still
    /// current; after a sign-out they are dropped and `SignedOut` returned.
    async fn refresh_tokens(
        &self,
        epoch: u64,
        rejected: Option<&str>,
    ) -> Result<String, ClientError> {
        let _guard = self.refresh_lock.lock().await;

        let record = self.tokens.load()?.ok_or(ClientError::MissingToken)?;
        let needed = match rejected {
            Some(rejected) => record.access_token == rejected,
            None => record.is_expiring_soon(now_ms(), TOKEN_REFRESH_SKEW_MS),
        };
        if !needed {
            tracing::debug!("Token already refreshed by another call");
            return Ok(record.access_token);
        }

        tracing::info!("Refreshing access token");
        let refreshed = match self.backend.refresh(&record.refresh_token).await {
            Ok(response) => TokenRecord::from_response(response, now_ms())
                .map_err(|e| ClientError::TokenRefresh(e.to_string())),
            Err(ClientError::TokenRefresh(msg)) => Err(ClientError::TokenRefresh(msg)),
            Err(other) => Err(ClientError::TokenRefresh(other.to_string())),
        };

        match refreshed {
            Ok(new_record) => {
                self.commit(epoch, |s| {
                    self.tokens.save(&new_record)?;
                    s.authenticate(new_record.access_token.clone());
                    Ok::<_, ClientError>(())
                })
                .ok_or(ClientError::SignedOut)??;
                tracing::info!(expires_at = new_record.expires_at, "Access token refreshed");
                Ok(new_record.access_token)
            }
            Err(e) => {
                // Clear while still holding the refresh lock so waiting
                // callers see no tokens rather than the dead refresh token.
                let cleared = self.commit(epoch, |_| self.tokens.clear());
                if let Some(Err(clear_err)) = cleared {
                    tracing::warn!(error = %clear_err, "Failed to clear stored tokens");
                }
                Err(e)
            }
        }
    }

    // ─── Activities ──────────────────────────────────────────────────────────

    /// Load every activity with a valid token and publish them to the state.
    pub async fn load_activities(&self) {
        let epoch = self.epoch();
        self.update(|s| s.begin_loading());

        let fetched = self
            .unless_signed_out(epoch, self.fetch_with_valid_token(epoch))
            .await;
        match fetched {
            Some(Ok(activities)) => {
                let count = activities.len();
                if self.commit(epoch, |s| s.finish_loading(activities)).is_some() {
                    tracing::info!(count, "Activities loaded");
                }
            }
            Some(Err(e)) => self.report(epoch, &e),
            None => tracing::info!("Activity load abandoned after sign-out"),
        }
    }

    async fn fetch_with_valid_token(&self, epoch: u64) -> Result<Vec<Activity>, ClientError> {
        let (token, refreshed) = self.valid_access_token(epoch).await?;
        match self.repository.fetch_all(&token).await {
            Err(ClientError::Unauthorized) if !refreshed => {
                tracing::info!("Access token rejected, refreshing once and retrying");
                let token = self.refresh_tokens(epoch, Some(&token)).await?;
                self.repository.fetch_all(&token).await
            }
            other => other,
        }
    }
}
