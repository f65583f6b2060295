// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava activity summary as returned by `GET /athlete/activities`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded exercise session.
///
/// Activities are never mutated after they are fetched; the list endpoint
/// returns many more fields than these, which are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Activity name/title
    pub name: String,
    /// Start date/time (ISO 8601)
    pub start_date: DateTime<Utc>,
    /// Distance in meters
    #[serde(default)]
    pub distance: f64,
    /// Moving time in seconds
    #[serde(default)]
    pub moving_time: u64,
    /// Average speed in meters/second
    #[serde(default)]
    pub average_speed: f64,
    /// Elevation gain in meters
    #[serde(default)]
    pub total_elevation_gain: f64,
    /// Activity type (Ride, Run, Hike, etc.)
    #[serde(rename = "type", default)]
    pub activity_type: String,
}

impl Activity {
    /// Distance in kilometers.
    pub fn distance_km(&self) -> f64 {
        self.distance / 1000.0
    }

    /// Moving time in hours.
    pub fn moving_hours(&self) -> f64 {
        self.moving_time as f64 / 3600.0
    }

    /// Average speed in km/h.
    pub fn average_speed_kmh(&self) -> f64 {
        self.average_speed * 3.6
    }
}
