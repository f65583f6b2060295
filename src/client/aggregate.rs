// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Summary statistics over the fetched activities.

use serde::Serialize;

use crate::models::Activity;

/// Totals shown in the stats panel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Summary {
    pub count: usize,
    pub total_distance_km: f64,
    pub total_time_hours: f64,
}

/// Sum distance and moving time across every activity.
pub fn summarize(activities: &[Activity]) -> Summary {
    let meters: f64 = activities.iter().map(|a| a.distance).sum();
    let seconds: u64 = activities.iter().map(|a| a.moving_time).sum();

    Summary {
        count: activities.len(),
        total_distance_km: meters / 1000.0,
        total_time_hours: seconds as f64 / 3600.0,
    }
}
