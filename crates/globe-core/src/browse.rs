//! BrowseCore — single-owner event loop for all browse + playback state.
//!
//! Everything that mutates state flows through this loop as a
//! `BrowseEvent`: user intents from the TUI/HTTP surfaces, fetch
//! settlements from spawned directory tasks, and audio events from the
//! sink driver.  `handle_event` itself is synchronous and returns the side
//! effect to perform (if any), which keeps every ordering scenario
//! unit-testable without a network or a clock; the async `run` loop spawns
//! the effects and feeds their settlements back into the same channel.
//!
//! Race rule: a station fetch settlement carries the country code it was
//! issued for and is applied only while that code still matches the
//! current selection — last selection wins, not last response.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::catalog::{page, CountryCatalog, PAGE_SIZE};
use crate::directory::DirectoryClient;
use crate::error::{FetchError, LoadError};
use crate::model::{Country, Station};
use crate::playback::{AudioEvent, PlaybackController, SinkCommand};
use crate::state::{BroadcastMessage, StateHandle, ViewState};

// ── Events ────────────────────────────────────────────────────────────────────

/// User intents from the presentation layer (data-down / events-up).
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    FilterChanged(String),
    LoadMore,
    OpenDrawer,
    CloseDrawer,
    ToggleDrawer,
    /// Select a country by ISO code.
    SelectCountry(String),
    /// Select a station (by id) from the current station list.
    SelectStation(String),
    TogglePause,
    Pause,
    Resume,
    StopPlayback,
}

/// All inputs into the BrowseCore loop.
#[derive(Debug)]
pub enum BrowseEvent {
    Intent(Intent),
    CatalogLoaded(Result<CountryCatalog, LoadError>),
    StationsFetched {
        /// The selection this fetch was issued for.
        country: String,
        result: Result<Vec<Station>, FetchError>,
    },
    Audio(AudioEvent),
}

/// Asynchronous work requested by `handle_event`; performed by `run`.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    LoadCatalog,
    FetchStations(String),
}

// ── BrowseState ───────────────────────────────────────────────────────────────

/// Mutable browse state, only ever touched by BrowseCore.
#[derive(Debug, Default)]
struct BrowseState {
    filter: String,
    /// Cumulative page index, starting at 1.  Reset on filter change.
    page: usize,
    drawer_open: bool,
    selected: Option<Country>,
    stations: Vec<Station>,
    stations_loading: bool,
    last_error: Option<String>,
}

// ── BrowseCore ────────────────────────────────────────────────────────────────

pub struct BrowseCore {
    catalog: CountryCatalog,
    catalog_loading: bool,
    catalog_error: Option<String>,
    state: BrowseState,
    playback: PlaybackController,
    rev: u64,
    view: StateHandle,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
}

impl BrowseCore {
    pub fn new(
        sink_tx: mpsc::UnboundedSender<SinkCommand>,
        view: StateHandle,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
    ) -> Self {
        Self {
            catalog: CountryCatalog::default(),
            catalog_loading: false,
            catalog_error: None,
            state: BrowseState {
                page: 1,
                drawer_open: true,
                ..BrowseState::default()
            },
            playback: PlaybackController::new(sink_tx),
            rev: 0,
            view,
            broadcast_tx,
        }
    }

    /// Kick off the one catalog load of the session.
    pub fn start(&mut self) -> SideEffect {
        self.catalog_loading = true;
        SideEffect::LoadCatalog
    }

    /// Run the event loop.  Returns when the event channel closes (all
    /// intent senders dropped, i.e. the UI exited).
    pub async fn run(
        mut self,
        client: Arc<DirectoryClient>,
        mut event_rx: mpsc::Receiver<BrowseEvent>,
        event_tx: mpsc::Sender<BrowseEvent>,
    ) {
        info!("browse: starting event loop");
        let effect = self.start();
        self.perform(effect, &client, &event_tx);
        self.publish().await;

        while let Some(event) = event_rx.recv().await {
            if let Some(effect) = self.handle_event(event) {
                self.perform(effect, &client, &event_tx);
            }
            self.publish().await;
        }
        info!("browse: event channel closed, shutting down");
    }

    // ── Event handling (synchronous, the actual state machine) ────────────────

    pub fn handle_event(&mut self, event: BrowseEvent) -> Option<SideEffect> {
        match event {
            BrowseEvent::Intent(intent) => self.handle_intent(intent),
            BrowseEvent::CatalogLoaded(result) => {
                self.on_catalog_loaded(result);
                None
            }
            BrowseEvent::StationsFetched { country, result } => {
                self.on_stations_fetched(country, result);
                None
            }
            BrowseEvent::Audio(event) => {
                self.playback.handle_audio_event(event);
                None
            }
        }
    }

    fn handle_intent(&mut self, intent: Intent) -> Option<SideEffect> {
        match intent {
            Intent::FilterChanged(text) => {
                self.state.filter = text;
                // Changing the filter always restarts paging.
                self.state.page = 1;
                None
            }
            Intent::LoadMore => {
                let filtered = self.catalog.filter(&self.state.filter);
                let (_, has_more) = page(&filtered, self.state.page, PAGE_SIZE);
                if has_more {
                    self.state.page += 1;
                }
                None
            }
            Intent::OpenDrawer => {
                self.state.drawer_open = true;
                None
            }
            Intent::CloseDrawer => {
                self.state.drawer_open = false;
                None
            }
            Intent::ToggleDrawer => {
                self.state.drawer_open = !self.state.drawer_open;
                None
            }
            Intent::SelectCountry(code) => self.select_country(&code),
            Intent::SelectStation(id) => {
                match self.state.stations.iter().find(|s| s.id == id) {
                    Some(station) => {
                        info!("browse: play station '{}'", station.name);
                        self.playback.play(station.clone());
                    }
                    None => warn!("browse: unknown station id '{}'", id),
                }
                None
            }
            Intent::TogglePause => {
                self.playback.toggle_pause();
                None
            }
            Intent::Pause => {
                self.playback.pause();
                None
            }
            Intent::Resume => {
                self.playback.resume();
                None
            }
            Intent::StopPlayback => {
                self.playback.stop();
                None
            }
        }
    }

    fn select_country(&mut self, code: &str) -> Option<SideEffect> {
        let Some(country) = self.catalog.by_code(code).cloned() else {
            warn!("browse: unknown country code '{}'", code);
            return None;
        };
        info!("browse: selected {} ({})", country.name, country.code);
        self.state.selected = Some(country);
        self.state.stations.clear();
        self.state.last_error = None;
        self.state.stations_loading = true;
        self.state.drawer_open = false;
        Some(SideEffect::FetchStations(code.to_string()))
    }

    fn on_catalog_loaded(&mut self, result: Result<CountryCatalog, LoadError>) {
        self.catalog_loading = false;
        match result {
            Ok(catalog) => {
                self.catalog = catalog;
                self.catalog_error = None;
            }
            Err(e) => {
                warn!("browse: catalog load failed: {}", e);
                self.catalog_error = Some(e.to_string());
            }
        }
    }

    fn on_stations_fetched(&mut self, country: String, result: Result<Vec<Station>, FetchError>) {
        // Last selection wins: a settlement for anything but the current
        // selection is discarded outright.  It also must not clear the
        // loading flag — that belongs to the newer in-flight fetch.
        let current = self.state.selected.as_ref().map(|c| c.code.as_str());
        if current != Some(country.as_str()) {
            debug!(
                "browse: discarding stale station fetch for {} (current {:?})",
                country, current
            );
            return;
        }
        self.state.stations_loading = false;
        match result {
            Ok(stations) => {
                info!("browse: {} stations for {}", stations.len(), country);
                self.state.stations = stations;
                self.state.last_error = None;
            }
            Err(e) => {
                warn!("browse: station fetch for {} failed: {}", country, e);
                self.state.last_error = Some(e.to_string());
            }
        }
    }

    // ── Side effects ──────────────────────────────────────────────────────────

    fn perform(
        &self,
        effect: SideEffect,
        client: &Arc<DirectoryClient>,
        event_tx: &mpsc::Sender<BrowseEvent>,
    ) {
        let client = Arc::clone(client);
        let tx = event_tx.clone();
        match effect {
            SideEffect::LoadCatalog => {
                tokio::spawn(async move {
                    let result = CountryCatalog::load(&client).await;
                    let _ = tx.send(BrowseEvent::CatalogLoaded(result)).await;
                });
            }
            SideEffect::FetchStations(code) => {
                tokio::spawn(async move {
                    let result = client.stations_for(&code).await;
                    let _ = tx
                        .send(BrowseEvent::StationsFetched {
                            country: code,
                            result,
                        })
                        .await;
                });
            }
        }
    }

    // ── Derived view ──────────────────────────────────────────────────────────

    /// Build the render-ready snapshot from current state.
    pub fn view(&self) -> ViewState {
        let filtered = self.catalog.filter(&self.state.filter);
        let (countries, has_more) = page(&filtered, self.state.page, PAGE_SIZE);
        let session = self.playback.session();
        ViewState {
            rev: self.rev,
            countries,
            has_more,
            filter: self.state.filter.clone(),
            catalog_loading: self.catalog_loading,
            catalog_error: self.catalog_error.clone(),
            drawer_open: self.state.drawer_open,
            selected: self.state.selected.clone(),
            stations: self.state.stations.clone(),
            stations_loading: self.state.stations_loading,
            last_error: self.state.last_error.clone(),
            playback: self.playback.status(),
            now_playing: session.map(|s| s.station.clone()),
            playback_error: session.and_then(|s| s.error.clone()),
        }
    }

    async fn publish(&mut self) {
        self.rev += 1;
        self.view.publish(self.view()).await;
        let _ = self.broadcast_tx.send(BroadcastMessage::StateUpdated);
    }
}
