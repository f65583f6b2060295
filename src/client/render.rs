// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Render layer.
//!
//! `Page` is a retained model of the visible page: which containers are
//! shown, the stats panel text, one tree per activity, and at most one
//! popover. `render` fully replaces everything derived from the state, so
//! calling it twice with the same state yields the same page. A host UI
//! toolkit mirrors `Page` onto real widgets.

use std::fmt;

use crate::client::aggregate::summarize;
use crate::client::geometry::{place, Position, Rect, Side, Size, Viewport};
use crate::client::state::ApplicationState;
use crate::models::Activity;

pub const TREE_GLYPH: &str = "🌳";

/// Popover size used for placement when the host does not measure it.
pub const DEFAULT_POPOVER_SIZE: Size = Size {
    width: 250.0,
    height: 190.0,
};

/// Visibility of each top-level container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Visibility {
    pub auth: bool,
    pub loading: bool,
    pub error: bool,
    pub stats: bool,
    pub forest: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatsPanel {
    pub caption: String,
    pub total_activities: String,
    pub total_distance: String,
    pub total_time: String,
}

/// One clickable grid item.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    pub glyph: &'static str,
    pub tooltip: String,
}

/// Detail overlay for one activity.
#[derive(Debug, Clone, PartialEq)]
pub struct Popover {
    /// Index of the activity (and its tree) this popover describes.
    pub activity_index: usize,
    pub title: String,
    pub rows: Vec<(&'static str, String)>,
    pub position: Position,
    pub side: Side,
    pub size: Size,
}

impl Popover {
    fn for_activity(activity_index: usize, activity: &Activity) -> Self {
        Self {
            activity_index,
            title: activity.name.clone(),
            rows: popover_rows(activity),
            position: Position {
                top: 0.0,
                left: 0.0,
            },
            side: Side::Above,
            size: DEFAULT_POPOVER_SIZE,
        }
    }

    /// Look up a row value by label.
    pub fn value(&self, label: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, v)| v.as_str())
    }

    /// Bounds in document coordinates.
    pub fn bounds(&self) -> Rect {
        Rect::new(
            self.position.left,
            self.position.top,
            self.size.width,
            self.size.height,
        )
    }
}

/// What a document-level click landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickTarget {
    Popover,
    Tree(usize),
    Elsewhere,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub visibility: Visibility,
    pub error_message: String,
    pub stats: StatsPanel,
    pub trees: Vec<Tree>,
    popover: Option<Popover>,
    popover_size: Size,
    /// Activities the trees were built from, so clicks can resolve them.
    rendered: Vec<Activity>,
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Page {
    pub fn new() -> Self {
        Self::with_popover_size(DEFAULT_POPOVER_SIZE)
    }

    /// Use a measured popover size for placement.
    pub fn with_popover_size(popover_size: Size) -> Self {
        Self {
            visibility: Visibility {
                auth: true,
                ..Visibility::default()
            },
            error_message: String::new(),
            stats: StatsPanel::default(),
            trees: Vec::new(),
            popover: None,
            popover_size,
            rendered: Vec::new(),
        }
    }

    /// Redraw everything derived from `state`.
    ///
    /// An open popover survives only if the activity list is unchanged.
    pub fn render(&mut self, state: &ApplicationState) {
        let has_activities = !state.activities.is_empty();

        self.visibility = Visibility {
            auth: !state.is_loading && !has_activities,
            loading: state.is_loading,
            error: state.error.is_some(),
            stats: has_activities,
            forest: has_activities,
        };
        self.error_message = state.error.clone().unwrap_or_default();

        if self.rendered != state.activities {
            self.remove_popover();
            self.rendered = state.activities.clone();
            self.trees = self.rendered.iter().map(tree_for).collect();
        }

        self.stats = if has_activities {
            stats_panel(&self.rendered)
        } else {
            StatsPanel::default()
        };
    }

    pub fn popover(&self) -> Option<&Popover> {
        self.popover.as_ref()
    }

    pub fn popover_count(&self) -> usize {
        usize::from(self.popover.is_some())
    }

    /// Open the popover for tree `index`, replacing any open one.
    ///
    /// `anchor` is the tree's bounding box in viewport coordinates.
    pub fn open_popover(
        &mut self,
        index: usize,
        anchor: Rect,
        viewport: Viewport,
    ) -> Option<&Popover> {
        self.remove_popover();
        let activity = self.rendered.get(index)?;

        let mut popover = Popover::for_activity(index, activity);
        let (position, side) = place(anchor, self.popover_size, viewport);
        popover.position = position;
        popover.side = side;
        popover.size = self.popover_size;

        tracing::debug!(index, top = position.top, left = position.left, "Popover opened");
        self.popover = Some(popover);
        self.popover.as_ref()
    }

    pub fn remove_popover(&mut self) {
        self.popover = None;
    }

    /// Handle a click anywhere on the page. Clicks outside the popover that
    /// are not on a tree close it; tree clicks go through `open_popover`.
    pub fn click(&mut self, target: ClickTarget) {
        if target == ClickTarget::Elsewhere {
            self.remove_popover();
        }
    }
}

fn tree_for(activity: &Activity) -> Tree {
    Tree {
        glyph: TREE_GLYPH,
        tooltip: format!("{} - {:.2}km", activity.name, activity.distance_km()),
    }
}

fn stats_panel(activities: &[Activity]) -> StatsPanel {
    let summary = summarize(activities);
    StatsPanel {
        caption: format!(
            "Each tree represents one of your {} activities",
            summary.count
        ),
        total_activities: summary.count.to_string(),
        total_distance: format!("{:.1} km", summary.total_distance_km),
        total_time: format!("{:.1} hours", summary.total_time_hours),
    }
}

fn popover_rows(activity: &Activity) -> Vec<(&'static str, String)> {
    vec![
        (
            "Date",
            activity.start_date.format("%A, %B %-d, %Y").to_string(),
        ),
        ("Distance", format!("{:.2} km", activity.distance_km())),
        ("Duration", format!("{:.2} hours", activity.moving_hours())),
        (
            "Average Speed",
            format!("{:.2} km/h", activity.average_speed_kmh()),
        ),
        (
            "Elevation Gain",
            format!("{:.0} m", activity.total_elevation_gain),
        ),
    ]
}

/// Plain-text rendering for terminals.
impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const TREES_PER_ROW: usize = 20;

        if self.visibility.loading {
            writeln!(f, "Loading activities...")?;
        }
        if self.visibility.error {
            writeln!(f, "Error: {}", self.error_message)?;
        }
        if self.visibility.auth {
            writeln!(f, "Not connected. Run `forest login` to connect with Strava.")?;
        }
        if self.visibility.stats {
            writeln!(f, "{}", self.stats.caption)?;
            writeln!(
                f,
                "Activities: {}  Distance: {}  Time: {}",
                self.stats.total_activities, self.stats.total_distance, self.stats.total_time
            )?;
        }
        if self.visibility.forest {
            for row in self.trees.chunks(TREES_PER_ROW) {
                let line: String = row.iter().map(|t| t.glyph).collect();
                writeln!(f, "{}", line)?;
            }
        }
        if let Some(popover) = &self.popover {
            writeln!(f, "{}", popover.title)?;
            for (label, value) in &popover.rows {
                writeln!(f, "  {}: {}", label, value)?;
            }
        }
        Ok(())
    }
}
