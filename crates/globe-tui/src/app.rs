//! App — the terminal event loop.
//!
//! Architecture:
//! - `App` holds the latest `ViewState` snapshot plus purely-local UI state
//!   (cursors, filter input, clipboard).
//! - A `tokio::mpsc` channel carries `AppMessage` events in from background
//!   tasks: terminal input from a blocking reader, state pushes from the
//!   browse loop's broadcast channel.
//! - Every user action becomes an `Intent` sent out through `event_tx`; the
//!   UI never mutates shared state directly.

use std::io;
use std::time::{Duration, Instant};

use ratatui::crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame, Terminal,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use unicode_width::UnicodeWidthStr;

use globe_core::browse::{BrowseEvent, Intent};
use globe_core::model::PlaybackStatus;
use globe_core::state::{BroadcastMessage, StateHandle, ViewState};

use crate::theme;
use crate::widgets::{FilterAction, FilterInput};

// ── Internal event bus ────────────────────────────────────────────────────────

enum AppMessage {
    Event(Event),
    StateUpdated(ViewState),
}

/// How long the "copied" hint stays in the status bar.
const COPY_HINT_TTL: Duration = Duration::from_secs(3);

pub struct App {
    view: ViewState,
    state_handle: StateHandle,
    event_tx: mpsc::Sender<BrowseEvent>,

    filter: FilterInput,
    country_cursor: usize,
    station_cursor: usize,

    clipboard: Option<arboard::Clipboard>,
    copy_hint: Option<(String, Instant)>,

    should_quit: bool,
}

impl App {
    pub fn new(state_handle: StateHandle, event_tx: mpsc::Sender<BrowseEvent>) -> Self {
        Self {
            view: ViewState::default(),
            state_handle,
            event_tx,
            filter: FilterInput::default(),
            country_cursor: 0,
            station_cursor: 0,
            clipboard: arboard::Clipboard::new()
                .map_err(|e| warn!("clipboard unavailable: {}", e))
                .ok(),
            copy_hint: None,
            should_quit: false,
        }
    }

    // ── Main run loop ─────────────────────────────────────────────────────────

    pub async fn run(
        mut self,
        mut broadcast_rx: broadcast::Receiver<BroadcastMessage>,
    ) -> anyhow::Result<()> {
        debug!("run(): entering alternate screen");
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let (tx, mut rx) = mpsc::channel::<AppMessage>(256);

        // ── Background task: keyboard events ──────────────────────────────────
        let input_tx = tx.clone();
        tokio::task::spawn_blocking(move || loop {
            match event::read() {
                Ok(ev) => {
                    if input_tx.blocking_send(AppMessage::Event(ev)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        });

        // ── Background task: browse loop state pushes ─────────────────────────
        let bc_tx = tx.clone();
        let bc_handle = self.state_handle.clone();
        tokio::spawn(async move {
            loop {
                match broadcast_rx.recv().await {
                    Ok(BroadcastMessage::StateUpdated) => {
                        let snapshot = bc_handle.snapshot().await;
                        if bc_tx.send(AppMessage::StateUpdated(snapshot)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("broadcast receiver lagged by {} messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        // Expires the copy hint without waiting for the next key press.
        let mut ui_tick = tokio::time::interval(Duration::from_millis(500));
        ui_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        self.view = self.state_handle.snapshot().await;

        // ── Main loop ─────────────────────────────────────────────────────────
        loop {
            terminal.draw(|f| self.draw(f))?;

            if self.should_quit {
                break;
            }

            tokio::select! {
                Some(msg) = rx.recv() => {
                    self.handle_message(msg).await;
                    // Coalesce bursts so a flood of state pushes draws once.
                    while let Ok(next) = rx.try_recv() {
                        self.handle_message(next).await;
                    }
                }
                _ = ui_tick.tick() => {
                    if let Some((_, at)) = self.copy_hint {
                        if at.elapsed() > COPY_HINT_TTL {
                            self.copy_hint = None;
                        }
                    }
                }
            }
        }

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;
        Ok(())
    }

    async fn handle_message(&mut self, msg: AppMessage) {
        match msg {
            AppMessage::Event(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                self.handle_key(key).await;
            }
            AppMessage::Event(_) => {}
            AppMessage::StateUpdated(view) => {
                self.view = view;
                self.clamp_cursors();
            }
        }
    }

    fn clamp_cursors(&mut self) {
        // Country list has one extra virtual row when more pages remain.
        let country_rows = self.view.countries.len() + usize::from(self.view.has_more);
        if country_rows > 0 {
            self.country_cursor = self.country_cursor.min(country_rows - 1);
        } else {
            self.country_cursor = 0;
        }
        if !self.view.stations.is_empty() {
            self.station_cursor = self.station_cursor.min(self.view.stations.len() - 1);
        } else {
            self.station_cursor = 0;
        }
    }

    // ── Key handling ──────────────────────────────────────────────────────────

    async fn handle_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }

        if self.filter.is_active() {
            match self.filter.handle_key(key) {
                FilterAction::Changed(text) => {
                    self.country_cursor = 0;
                    self.send(Intent::FilterChanged(text)).await;
                }
                FilterAction::Confirmed | FilterAction::Cancelled => {}
            }
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Tab => self.send(Intent::ToggleDrawer).await,
            KeyCode::Char('/') if self.view.drawer_open => self.filter.activate(),
            KeyCode::Char(' ') => self.send(Intent::TogglePause).await,
            KeyCode::Char('s') => self.send(Intent::StopPlayback).await,
            KeyCode::Char('y') => self.copy_stream_url(),
            KeyCode::Up | KeyCode::Char('k') => self.move_cursor(-1),
            KeyCode::Down | KeyCode::Char('j') => self.move_cursor(1),
            KeyCode::Enter => self.confirm_selection().await,
            KeyCode::Char('m') if self.view.drawer_open && self.view.has_more => {
                self.send(Intent::LoadMore).await;
            }
            KeyCode::Esc if !self.view.drawer_open => self.send(Intent::OpenDrawer).await,
            _ => {}
        }
    }

    fn move_cursor(&mut self, delta: i64) {
        let (cursor, len) = if self.view.drawer_open {
            (
                &mut self.country_cursor,
                self.view.countries.len() + usize::from(self.view.has_more),
            )
        } else {
            (&mut self.station_cursor, self.view.stations.len())
        };
        if len == 0 {
            return;
        }
        let next = (*cursor as i64 + delta).clamp(0, len as i64 - 1);
        *cursor = next as usize;
    }

    async fn confirm_selection(&mut self) {
        if self.view.drawer_open {
            if self.country_cursor < self.view.countries.len() {
                let code = self.view.countries[self.country_cursor].code.clone();
                self.station_cursor = 0;
                self.send(Intent::SelectCountry(code)).await;
            } else if self.view.has_more {
                // The virtual "load more" row at the bottom of the list.
                self.send(Intent::LoadMore).await;
            }
        } else if let Some(station) = self.view.stations.get(self.station_cursor) {
            let id = station.id.clone();
            self.send(Intent::SelectStation(id)).await;
        }
    }

    fn copy_stream_url(&mut self) {
        let Some(station) = self.view.stations.get(self.station_cursor) else {
            return;
        };
        let Some(clipboard) = self.clipboard.as_mut() else {
            self.copy_hint = Some(("clipboard unavailable".into(), Instant::now()));
            return;
        };
        match clipboard.set_text(station.stream_url.clone()) {
            Ok(()) => {
                self.copy_hint = Some((format!("copied URL for {}", station.name), Instant::now()));
            }
            Err(e) => {
                warn!("clipboard write failed: {}", e);
                self.copy_hint = Some(("copy failed".into(), Instant::now()));
            }
        }
    }

    async fn send(&self, intent: Intent) {
        if self.event_tx.send(BrowseEvent::Intent(intent)).await.is_err() {
            warn!("browse loop gone, intent dropped");
        }
    }

    // ── Drawing ───────────────────────────────────────────────────────────────

    fn draw(&mut self, frame: &mut Frame) {
        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .split(frame.area());

        if self.view.drawer_open {
            let panes = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(38), Constraint::Percentage(62)])
                .split(outer[0]);
            self.draw_drawer(frame, panes[0]);
            self.draw_stations(frame, panes[1], false);
        } else {
            self.draw_stations(frame, outer[0], true);
        }

        self.draw_status_bar(frame, outer[1]);
    }

    fn draw_drawer(&mut self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(" Countries ")
            .borders(Borders::ALL)
            .border_style(theme::style_focused_border());
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(1)])
            .split(inner);

        self.filter.draw(frame, rows[0]);

        if self.view.catalog_loading {
            let msg = Paragraph::new("loading countries...").style(theme::style_secondary());
            frame.render_widget(msg, rows[1]);
            return;
        }
        if let Some(err) = &self.view.catalog_error {
            let msg = Paragraph::new(format!("country list unavailable: {err}"))
                .style(theme::style_error());
            frame.render_widget(msg, rows[1]);
            return;
        }

        let mut items: Vec<ListItem> = self
            .view
            .countries
            .iter()
            .map(|c| {
                ListItem::new(Line::from(vec![
                    Span::raw(format!("{} ", c.flag)),
                    Span::styled(c.name.clone(), theme::style_default()),
                    Span::styled(
                        format!("  {}", c.station_count),
                        theme::style_secondary(),
                    ),
                ]))
            })
            .collect();
        if self.view.has_more {
            items.push(ListItem::new(Line::from(Span::styled(
                "  ··· load more (m)",
                theme::style_accent(),
            ))));
        }
        if items.is_empty() {
            let msg = Paragraph::new("no countries match").style(theme::style_muted());
            frame.render_widget(msg, rows[1]);
            return;
        }

        let list = List::new(items).highlight_style(theme::style_selected_focused());
        let mut state = ListState::default();
        state.select(Some(self.country_cursor));
        frame.render_stateful_widget(list, rows[1], &mut state);
    }

    fn draw_stations(&mut self, frame: &mut Frame, area: Rect, focused: bool) {
        let title = match &self.view.selected {
            Some(country) => format!(" {} {} ", country.flag, country.name),
            None => " Stations ".to_string(),
        };
        let border = if focused {
            theme::style_focused_border()
        } else {
            theme::style_unfocused_border()
        };
        let block = Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(border);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        if self.view.stations_loading {
            let msg = Paragraph::new("loading stations...").style(theme::style_secondary());
            frame.render_widget(msg, inner);
            return;
        }
        if let Some(err) = &self.view.last_error {
            let msg =
                Paragraph::new(format!("stations unavailable: {err}")).style(theme::style_error());
            frame.render_widget(msg, inner);
            return;
        }
        if self.view.selected.is_none() {
            let msg = Paragraph::new("pick a country to list its stations")
                .style(theme::style_muted());
            frame.render_widget(msg, inner);
            return;
        }
        if self.view.stations.is_empty() {
            let msg = Paragraph::new("no playable stations here").style(theme::style_muted());
            frame.render_widget(msg, inner);
            return;
        }

        let now_playing_id = self.view.now_playing.as_ref().map(|s| s.id.clone());
        let items: Vec<ListItem> = self
            .view
            .stations
            .iter()
            .map(|s| {
                let playing = now_playing_id.as_deref() == Some(s.id.as_str());
                let name_style = if playing {
                    theme::style_playing().add_modifier(Modifier::BOLD)
                } else {
                    theme::style_default()
                };
                let mut spans = vec![
                    Span::styled(if playing { "▶ " } else { "  " }, theme::style_playing()),
                    Span::styled(s.name.clone(), name_style),
                ];
                if s.bitrate_kbps > 0 {
                    spans.push(Span::styled(
                        format!("  {}kbps", s.bitrate_kbps),
                        theme::style_secondary(),
                    ));
                }
                spans.push(Span::styled(
                    format!("  ★{}", s.votes),
                    Style::default().fg(theme::C_VOTES),
                ));
                if !s.genres.is_empty() {
                    spans.push(Span::styled(
                        format!("  {}", s.genres.join(", ")),
                        Style::default().fg(theme::C_TAG),
                    ));
                }
                ListItem::new(Line::from(spans))
            })
            .collect();

        let highlight = if focused {
            theme::style_selected_focused()
        } else {
            theme::style_selected()
        };
        let list = List::new(items).highlight_style(highlight);
        let mut state = ListState::default();
        state.select(Some(self.station_cursor));
        frame.render_stateful_widget(list, inner, &mut state);
    }

    fn draw_status_bar(&mut self, frame: &mut Frame, area: Rect) {
        let mut spans: Vec<Span> = Vec::new();

        let (label, style) = match self.view.playback {
            PlaybackStatus::Idle => ("idle", theme::style_muted()),
            PlaybackStatus::Loading => ("loading", Style::default().fg(theme::C_LOADING)),
            PlaybackStatus::Playing => ("playing", theme::style_playing()),
            PlaybackStatus::Paused => ("paused", theme::style_secondary()),
            PlaybackStatus::Errored => ("error", theme::style_error()),
        };
        spans.push(Span::styled(format!(" {label} "), style.add_modifier(Modifier::BOLD)));

        if let Some(station) = &self.view.now_playing {
            spans.push(Span::styled(station.name.clone(), theme::style_default()));
        }
        if let Some(err) = &self.view.playback_error {
            spans.push(Span::styled(format!("  {err}"), theme::style_error()));
        }
        if let Some((hint, _)) = &self.copy_hint {
            spans.push(Span::styled(format!("  {hint}"), theme::style_accent()));
        }

        let left_width: usize = spans.iter().map(|s| s.content.width()).sum();
        let keys = "q quit · / filter · tab drawer · ⏎ select · ␣ pause · s stop · y copy ";
        let pad = (area.width as usize)
            .saturating_sub(left_width)
            .saturating_sub(keys.width());
        spans.push(Span::raw(" ".repeat(pad)));
        spans.push(Span::styled(keys, theme::style_muted()));

        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }
}
