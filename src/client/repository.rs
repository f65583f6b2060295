// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Paginated retrieval of the athlete's activities.

use std::future::Future;

use crate::error::ClientError;
use crate::models::Activity;

/// Largest page size Strava allows for the activity list.
pub const PAGE_SIZE: u32 = 200;

/// One page of activities per call.
///
/// Implementations return `ClientError::Unauthorized` for a rejected token
/// and `ClientError::Network` for every other failure.
pub trait ActivitySource: Send + Sync {
    fn fetch_page(
        &self,
        access_token: &str,
        page: u32,
        per_page: u32,
    ) -> impl Future<Output = Result<Vec<Activity>, ClientError>> + Send;
}

/// Fetches every activity for a token, one page at a time.
pub struct ActivityRepository<A> {
    source: A,
    per_page: u32,
}

impl<A: ActivitySource> ActivityRepository<A> {
    pub fn new(source: A) -> Self {
        Self::with_page_size(source, PAGE_SIZE)
    }

    pub fn with_page_size(source: A, per_page: u32) -> Self {
        Self {
            source,
            per_page: per_page.max(1),
        }
    }

    pub fn source(&self) -> &A {
        &self.source
    }

    /// Fetch pages 1, 2, ... until one comes back empty.
    ///
    /// Pages are requested strictly in sequence. Results keep server order.
    /// Any failure discards the pages already fetched.
    pub async fn fetch_all(&self, access_token: &str) -> Result<Vec<Activity>, ClientError> {
        let mut page = 1u32;
        let mut activities = Vec::new();

        loop {
            let batch = match self
                .source
                .fetch_page(access_token, page, self.per_page)
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::warn!(
                        page,
                        discarded = activities.len(),
                        error = %e,
                        "Activity page fetch failed"
                    );
                    return Err(e);
                }
            };

            if batch.is_empty() {
                break;
            }

            tracing::debug!(page, count = batch.len(), "Fetched activity page");
            activities.extend(batch);
            page += 1;
        }

        tracing::info!(
            pages = page - 1,
            count = activities.len(),
            "Fetched all activities"
        );
        Ok(activities)
    }
}
