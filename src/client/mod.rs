// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client-side pipeline: tokens, activity loading, state, and rendering.

pub mod aggregate;
pub mod app;
pub mod backend;
pub mod geometry;
pub mod render;
pub mod repository;
pub mod state;
pub mod token_store;

pub use aggregate::{summarize, Summary};
pub use app::{ForestApp, Launch, LaunchParams};
pub use backend::{AuthBackend, CompanionClient};
pub use geometry::{place, Position, Rect, Side, Size, Viewport};
pub use render::{ClickTarget, Page, Popover};
pub use repository::{ActivityRepository, ActivitySource, PAGE_SIZE};
pub use state::{ApplicationState, Phase};
pub use token_store::{FileStorage, KeyValueStorage, MemoryStorage, TokenStore};
