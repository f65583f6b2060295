// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Page-lifetime application state.
//!
//! The flags are orthogonal; `phase()` collapses them into the coarse state
//! a reader usually cares about. Only `ForestApp` calls the transitions.

use crate::models::Activity;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationState {
    pub activities: Vec<Activity>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub is_authenticated: bool,
    pub access_token: Option<String>,
    /// Set while the browser is being sent to the authorization page.
    pub login_pending: bool,
}

/// Coarse view of the state flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unauthenticated,
    Authenticating,
    Loading,
    Ready,
    Error,
}

impl ApplicationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        if self.is_loading {
            Phase::Loading
        } else if self.error.is_some() {
            Phase::Error
        } else if self.is_authenticated {
            Phase::Ready
        } else if self.login_pending {
            Phase::Authenticating
        } else {
            Phase::Unauthenticated
        }
    }

    /// `is_authenticated` implies a non-empty access token.
    pub fn is_consistent(&self) -> bool {
        !self.is_authenticated || self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub(crate) fn begin_login(&mut self) {
        self.login_pending = true;
        self.error = None;
    }

    pub(crate) fn authenticate(&mut self, access_token: String) {
        if access_token.is_empty() {
            return;
        }
        self.access_token = Some(access_token);
        self.is_authenticated = true;
        self.login_pending = false;
    }

    pub(crate) fn begin_loading(&mut self) {
        self.is_loading = true;
        self.error = None;
    }

    pub(crate) fn finish_loading(&mut self, activities: Vec<Activity>) {
        self.activities = activities;
        self.is_loading = false;
    }

    /// Record a failure. Activities are dropped so a partial list is never
    /// shown as complete; authentication is left as is.
    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.activities.clear();
        self.is_loading = false;
        self.login_pending = false;
        self.error = Some(message.into());
    }

    /// Back to signed out. The error, if any, is kept so it stays visible.
    pub(crate) fn sign_out(&mut self) {
        self.activities.clear();
        self.is_loading = false;
        self.is_authenticated = false;
        self.access_token = None;
        self.login_pending = false;
    }
}
