//! ViewState — the derived, render-ready snapshot published by BrowseCore.
//!
//! Presentation (TUI, HTTP API) only ever reads clones of this; all writes
//! happen inside the BrowseCore event loop.  `rev` is a monotonically
//! increasing counter so clients can cheaply detect missed updates.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::model::{Country, PlaybackStatus, Station};

/// Pushed on the broadcast channel after every state change.
#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    /// The ViewState snapshot changed; receivers should fetch it.
    StateUpdated,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ViewState {
    /// Monotonic revision counter — incremented on every published change.
    pub rev: u64,

    // ── Country browsing ───────────────────────────────────────────────────
    /// Filtered + paged slice of the catalog, ready to render.
    pub countries: Vec<Country>,
    /// More filtered entries exist beyond the current page.
    pub has_more: bool,
    pub filter: String,
    pub catalog_loading: bool,
    pub catalog_error: Option<String>,
    pub drawer_open: bool,

    // ── Stations for the selected country ──────────────────────────────────
    pub selected: Option<Country>,
    pub stations: Vec<Station>,
    pub stations_loading: bool,
    /// Station-fetch failure scoped to the current selection.
    pub last_error: Option<String>,

    // ── Playback ───────────────────────────────────────────────────────────
    pub playback: PlaybackStatus,
    pub now_playing: Option<Station>,
    pub playback_error: Option<String>,
}

/// Shared handle: BrowseCore publishes, everyone else snapshots.
#[derive(Clone, Default)]
pub struct StateHandle {
    inner: Arc<RwLock<ViewState>>,
}

impl StateHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> ViewState {
        self.inner.read().await.clone()
    }

    pub(crate) async fn publish(&self, state: ViewState) {
        *self.inner.write().await = state;
    }
}
