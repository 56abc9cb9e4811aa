// ==========================================
// TERMINAL UI
// ==========================================
// Ratatui front end: search prompt, results pane, queue pane, up-next
// pane, and a player bar. Slow work (search, collection loads) runs in
// spawned tasks that report back over an mpsc channel drained each
// frame, same as player events; the draw loop itself never blocks.

use std::io;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame, Terminal,
};
use tokio::sync::mpsc;
use tracing::error;

use crate::catalog::{CollectionDetails, CollectionSummary, SearchResults};
use crate::error::Error;
use crate::player::audio::SinkState;
use crate::player::events::PlayerEvent;
use crate::player::session::{PlayerSession, Snapshot};
use crate::store::Store;
use crate::track::{format_time, Track};

const SAVED_PLAYLIST: &str = "saved";

enum Mode {
    Normal,
    Searching,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Pane {
    Results,
    Queue,
    UpNext,
}

/// One row in the search results pane.
enum SearchEntry {
    Song(Track),
    Collection(CollectionSummary),
}

/// Completions from background tasks.
enum UiMessage {
    SearchDone(SearchResults),
    SearchFailed(String),
    CollectionLoaded(CollectionDetails),
    CollectionFailed(String),
    VideoReady(String),
    VideoFailed(String),
}

pub struct App {
    session: PlayerSession,
    store: Store,
    player_events: mpsc::UnboundedReceiver<PlayerEvent>,
    messages_rx: mpsc::UnboundedReceiver<UiMessage>,
    messages_tx: mpsc::UnboundedSender<UiMessage>,
    mode: Mode,
    focus: Pane,
    search_query: String,
    results: Vec<SearchEntry>,
    selected_result: usize,
    selected_queue: usize,
    selected_up_next: usize,
    is_searching: bool,
    is_loading: bool,
    /// Cancel handle for an in-flight video-stream fetch, if any.
    video_fetch: Option<crate::resolver::CancelHandle>,
    /// The auto-advance poll runs as a task so a slow resolution never
    /// stalls the draw loop; at most one is in flight.
    poll_task: Option<tokio::task::JoinHandle<()>>,
    status: String,
    should_quit: bool,
}

impl App {
    pub fn new(
        session: PlayerSession,
        store: Store,
        player_events: mpsc::UnboundedReceiver<PlayerEvent>,
    ) -> Self {
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        let volume = store.volume();
        session.set_volume(volume);
        // Seed the results pane with the last session's listening.
        let results: Vec<SearchEntry> = store
            .recently_played()
            .iter()
            .cloned()
            .map(SearchEntry::Song)
            .collect();
        let status = if results.is_empty() {
            String::new()
        } else {
            "Recently played".to_string()
        };
        App {
            session,
            store,
            player_events,
            messages_rx,
            messages_tx,
            mode: Mode::Normal,
            focus: Pane::Results,
            search_query: String::new(),
            results,
            selected_result: 0,
            selected_queue: 0,
            selected_up_next: 0,
            is_searching: false,
            is_loading: false,
            video_fetch: None,
            poll_task: None,
            status,
            should_quit: false,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        loop {
            let snapshot = self.session.snapshot();
            terminal.draw(|f| self.draw(f, &snapshot))?;

            self.drain_messages();
            self.drain_player_events();
            if self.poll_task.as_ref().map_or(true, |t| t.is_finished()) {
                let session = self.session.clone();
                self.poll_task = Some(tokio::spawn(async move {
                    session.poll_finished().await;
                }));
            }

            if event::poll(std::time::Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    self.handle_key(key.code);
                }
            }

            if self.should_quit {
                break;
            }
        }

        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;
        Ok(())
    }

    // ==========================================
    // BACKGROUND COMPLETIONS
    // ==========================================

    fn drain_messages(&mut self) {
        while let Ok(message) = self.messages_rx.try_recv() {
            match message {
                UiMessage::SearchDone(results) => {
                    self.results = results
                        .songs
                        .into_iter()
                        .map(SearchEntry::Song)
                        .chain(results.collections.into_iter().map(SearchEntry::Collection))
                        .collect();
                    self.selected_result = 0;
                    self.is_searching = false;
                    self.status = format!("Found {} results", self.results.len());
                }
                UiMessage::SearchFailed(reason) => {
                    self.is_searching = false;
                    self.status = format!("Search failed: {reason}");
                }
                UiMessage::CollectionLoaded(details) => {
                    if let Some(first) = details.tracks.first().cloned() {
                        self.status = format!("Playing {}", details.title);
                        let session = self.session.clone();
                        tokio::spawn(async move {
                            session.play(first, Some(details.tracks)).await;
                        });
                    } else {
                        self.status = format!("{} is empty", details.title);
                    }
                }
                UiMessage::CollectionFailed(reason) => {
                    self.status = format!("Could not load collection: {reason}");
                }
                // A completion landing after the overlay was closed (the
                // handle is gone) is dropped, not surfaced.
                UiMessage::VideoReady(url) => {
                    if self.video_fetch.take().is_some() {
                        self.status = format!("Video stream: {}", &url[..url.len().min(72)]);
                    }
                }
                UiMessage::VideoFailed(reason) => {
                    if self.video_fetch.take().is_some() {
                        self.status = format!("Video unavailable: {reason}");
                    }
                }
            }
        }
    }

    fn drain_player_events(&mut self) {
        while let Ok(event) = self.player_events.try_recv() {
            match event {
                PlayerEvent::TrackChanged(Some(track)) => {
                    self.status = format!("Now playing: {} - {}", track.title, track.artist_line());
                    self.store.record_recent(&track);
                }
                PlayerEvent::TrackChanged(None) => {}
                PlayerEvent::QueueEnded => {
                    self.status = "Queue ended".to_string();
                }
                PlayerEvent::Loading(loading) => {
                    self.is_loading = loading;
                }
                PlayerEvent::PlayFailed { title, reason } => {
                    error!(%title, %reason, "play failed");
                    self.status = format!("Could not play {title}: {reason}");
                }
                // Queue/up-next contents are re-read from the snapshot
                // every frame; nothing to do beyond clamping selection.
                PlayerEvent::QueueChanged | PlayerEvent::UpNextChanged => {
                    let snapshot = self.session.snapshot();
                    self.selected_queue =
                        self.selected_queue.min(snapshot.tracks.len().saturating_sub(1));
                    self.selected_up_next = self
                        .selected_up_next
                        .min(snapshot.up_next.len().saturating_sub(1));
                }
            }
        }
    }

    // ==========================================
    // INPUT
    // ==========================================

    fn handle_key(&mut self, key: KeyCode) {
        match self.mode {
            Mode::Searching => self.handle_search_key(key),
            Mode::Normal => self.handle_normal_key(key),
        }
    }

    fn handle_search_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char(c) => self.search_query.push(c),
            KeyCode::Backspace => {
                self.search_query.pop();
            }
            KeyCode::Enter => {
                let query = std::mem::take(&mut self.search_query);
                self.start_search(query);
                self.mode = Mode::Normal;
            }
            KeyCode::Esc => {
                self.search_query.clear();
                self.mode = Mode::Normal;
            }
            _ => {}
        }
    }

    // Play paths run as spawned tasks: resolution takes seconds, and the
    // draw loop must keep rendering (and rapid skips must keep issuing
    // tokens) while one is in flight.
    fn handle_normal_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('/') => self.mode = Mode::Searching,
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Pane::Results => Pane::Queue,
                    Pane::Queue => Pane::UpNext,
                    Pane::UpNext => Pane::Results,
                };
            }
            KeyCode::Char(' ') => self.session.toggle_pause(),
            KeyCode::Char('n') => {
                let session = self.session.clone();
                tokio::spawn(async move { session.play_next().await });
            }
            KeyCode::Char('p') => {
                let session = self.session.clone();
                tokio::spawn(async move { session.play_previous().await });
            }
            KeyCode::Up => self.change_volume(5),
            KeyCode::Down => self.change_volume(-5),
            KeyCode::Char('j') => self.move_selection(1),
            KeyCode::Char('k') => self.move_selection(-1),
            KeyCode::Enter => self.activate_selection(),
            KeyCode::Char('a') => self.append_selected(),
            KeyCode::Char('i') => self.insert_selected_next(),
            KeyCode::Char('d') => {
                if self.focus == Pane::Queue {
                    let session = self.session.clone();
                    let index = self.selected_queue;
                    tokio::spawn(async move { session.queue_remove(index).await });
                }
            }
            KeyCode::Char('c') => {
                self.session.queue_clear();
                self.selected_queue = 0;
                self.status = "Queue cleared".to_string();
            }
            KeyCode::Char('J') => self.reorder_selected(1),
            KeyCode::Char('K') => self.reorder_selected(-1),
            KeyCode::Char('f') => self.toggle_like_current(),
            KeyCode::Char('s') => self.save_current(),
            KeyCode::Char('L') => self.show_liked(),
            KeyCode::Char('o') => self.show_saved_playlist(),
            KeyCode::Char('v') => self.open_video(),
            KeyCode::Esc => self.close_video(),
            _ => {}
        }
    }

    /// Resolve the video rendition of the current track. The fetch is
    /// cancelable; closing the overlay mid-fetch (Esc) kills it, and a
    /// completion that slips through afterward is dropped quietly.
    fn open_video(&mut self) {
        let Some(track) = self.session.snapshot().now_playing else {
            return;
        };
        if self.video_fetch.is_some() {
            return;
        }
        self.status = format!("Loading video for {}...", track.title);
        let (fut, handle) = self.session.resolve_video(&track.id);
        self.video_fetch = Some(handle);
        let tx = self.messages_tx.clone();
        tokio::spawn(async move {
            match fut.await {
                Ok(url) => {
                    let _ = tx.send(UiMessage::VideoReady(url));
                }
                // Cancellation is the expected outcome of closing the
                // overlay, not a failure.
                Err(Error::Canceled) => {}
                Err(e) => {
                    let _ = tx.send(UiMessage::VideoFailed(e.to_string()));
                }
            }
        });
    }

    fn close_video(&mut self) {
        if let Some(handle) = self.video_fetch.take() {
            handle.cancel();
            self.status = "Video closed".to_string();
        }
    }

    fn start_search(&mut self, query: String) {
        if query.trim().is_empty() {
            return;
        }
        self.is_searching = true;
        self.status = format!("Searching for \"{query}\"...");
        let catalog = self.session.catalog();
        let region = self.session.region().to_string();
        let tx = self.messages_tx.clone();
        tokio::spawn(async move {
            let message = match catalog.search(&query, &region).await {
                Ok(results) => UiMessage::SearchDone(results),
                Err(e) => UiMessage::SearchFailed(e.to_string()),
            };
            let _ = tx.send(message);
        });
    }

    fn move_selection(&mut self, delta: i64) {
        let snapshot = self.session.snapshot();
        let (selected, len) = match self.focus {
            Pane::Results => (&mut self.selected_result, self.results.len()),
            Pane::Queue => (&mut self.selected_queue, snapshot.tracks.len()),
            Pane::UpNext => (&mut self.selected_up_next, snapshot.up_next.len()),
        };
        if len == 0 {
            return;
        }
        let next = (*selected as i64 + delta).rem_euclid(len as i64);
        *selected = next as usize;
    }

    fn activate_selection(&mut self) {
        match self.focus {
            Pane::Results => match self.results.get(self.selected_result) {
                Some(SearchEntry::Song(track)) => {
                    let track = track.clone();
                    let session = self.session.clone();
                    tokio::spawn(async move { session.play(track, None).await });
                }
                Some(SearchEntry::Collection(summary)) => {
                    self.status = format!("Loading {}...", summary.title);
                    let catalog = self.session.catalog();
                    let region = self.session.region().to_string();
                    let (id, kind) = (summary.id.clone(), summary.kind);
                    let tx = self.messages_tx.clone();
                    tokio::spawn(async move {
                        let message = match catalog.collection_details(&id, kind, &region).await {
                            Ok(details) => UiMessage::CollectionLoaded(details),
                            Err(e) => UiMessage::CollectionFailed(e.to_string()),
                        };
                        let _ = tx.send(message);
                    });
                }
                None => {}
            },
            Pane::Queue => {
                let snapshot = self.session.snapshot();
                if let Some(track) = snapshot.tracks.get(self.selected_queue).cloned() {
                    let session = self.session.clone();
                    tokio::spawn(async move { session.play(track, None).await });
                }
            }
            Pane::UpNext => {
                let snapshot = self.session.snapshot();
                if let Some(track) = snapshot.up_next.get(self.selected_up_next) {
                    let id = track.id.clone();
                    let session = self.session.clone();
                    tokio::spawn(async move { session.play_up_next(&id).await });
                }
            }
        }
    }

    fn append_selected(&mut self) {
        if let Some(SearchEntry::Song(track)) = self.results.get(self.selected_result) {
            let track = track.clone();
            self.status = format!("Queued: {}", track.title);
            let session = self.session.clone();
            tokio::spawn(async move { session.queue_append(track).await });
        }
    }

    fn insert_selected_next(&mut self) {
        if let Some(SearchEntry::Song(track)) = self.results.get(self.selected_result) {
            self.status = format!("Playing next: {}", track.title);
            self.session.queue_insert_next(track.clone());
        }
    }

    fn reorder_selected(&mut self, delta: i64) {
        if self.focus != Pane::Queue {
            return;
        }
        let len = self.session.snapshot().tracks.len();
        let target = self.selected_queue as i64 + delta;
        if target < 0 || target >= len as i64 {
            return;
        }
        self.session
            .queue_reorder(self.selected_queue, target as usize);
        self.selected_queue = target as usize;
    }

    fn change_volume(&mut self, delta: i64) {
        let volume = (self.session.snapshot().volume as i64 + delta).clamp(0, 100) as u32;
        self.session.set_volume(volume);
        self.store.set_volume(volume);
    }

    fn toggle_like_current(&mut self) {
        let Some(track) = self.session.snapshot().now_playing else {
            return;
        };
        let liked = self.store.toggle_liked(&track);
        self.status = if liked {
            format!("Liked {}", track.title)
        } else {
            format!("Unliked {}", track.title)
        };
    }

    fn save_current(&mut self) {
        let Some(track) = self.session.snapshot().now_playing else {
            return;
        };
        self.status = format!("Saved {} to \"{}\"", track.title, SAVED_PLAYLIST);
        self.store.add_to_playlist(SAVED_PLAYLIST, track);
    }

    fn show_liked(&mut self) {
        self.results = self
            .store
            .liked_songs()
            .map(|liked| SearchEntry::Song(liked.track.clone()))
            .collect();
        self.selected_result = 0;
        self.focus = Pane::Results;
        self.status = format!("{} liked songs", self.results.len());
    }

    fn show_saved_playlist(&mut self) {
        match self.store.playlist(SAVED_PLAYLIST) {
            Some(tracks) => {
                self.results = tracks.iter().cloned().map(SearchEntry::Song).collect();
                self.selected_result = 0;
                self.focus = Pane::Results;
                self.status = format!("Playlist \"{}\"", SAVED_PLAYLIST);
            }
            None => {
                let names: Vec<_> = self.store.playlist_names().collect();
                self.status = if names.is_empty() {
                    "No playlists yet".to_string()
                } else {
                    format!("Playlists: {}", names.join(", "))
                };
            }
        }
    }

    // ==========================================
    // DRAWING
    // ==========================================

    fn draw(&self, frame: &mut Frame, snapshot: &Snapshot) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(10),
                Constraint::Length(4),
            ])
            .split(frame.size());

        let header = if matches!(self.mode, Mode::Searching) {
            format!("Search: {}_", self.search_query)
        } else if self.is_searching {
            "Searching...".to_string()
        } else if self.is_loading {
            "Loading stream...".to_string()
        } else if !self.status.is_empty() {
            self.status.clone()
        } else {
            "[/]Search [Tab]Pane [Enter]Play [a]Queue [i]Next [d]Remove [J/K]Move \
             [Space]Pause [n/p]Skip [f]Like [L]Liked [s]Save [o]Playlist [q]Quit"
                .to_string()
        };
        frame.render_widget(
            Paragraph::new(header).block(Block::default().borders(Borders::ALL).title("Resonate")),
            chunks[0],
        );

        let panes = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(40),
                Constraint::Percentage(35),
                Constraint::Percentage(25),
            ])
            .split(chunks[1]);

        self.draw_results(frame, panes[0]);
        self.draw_queue(frame, panes[1], snapshot);
        self.draw_up_next(frame, panes[2], snapshot);
        self.draw_player_bar(frame, chunks[2], snapshot);
    }

    fn pane_style(&self, pane: Pane, index: usize, selected: usize) -> Style {
        if self.focus == pane && index == selected {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        }
    }

    fn draw_results(&self, frame: &mut Frame, area: ratatui::layout::Rect) {
        let items: Vec<ListItem> = self
            .results
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let content = match entry {
                    SearchEntry::Song(track) => format!(
                        "{} - {} [{}]",
                        track.title,
                        track.artist_line(),
                        format_time(track.duration as f64)
                    ),
                    SearchEntry::Collection(c) => {
                        format!("{} - {} ({})", c.title, c.artist, c.kind.as_str())
                    }
                };
                ListItem::new(content).style(self.pane_style(Pane::Results, i, self.selected_result))
            })
            .collect();
        frame.render_widget(
            List::new(items).block(Block::default().borders(Borders::ALL).title("Search Results")),
            area,
        );
    }

    fn draw_queue(&self, frame: &mut Frame, area: ratatui::layout::Rect, snapshot: &Snapshot) {
        let items: Vec<ListItem> = snapshot
            .tracks
            .iter()
            .enumerate()
            .map(|(i, track)| {
                let marker = if snapshot.cursor == Some(i) { "> " } else { "  " };
                let content = format!("{}{} - {}", marker, track.title, track.artist_line());
                let style = if snapshot.cursor == Some(i) {
                    Style::default().fg(Color::Green)
                } else {
                    self.pane_style(Pane::Queue, i, self.selected_queue)
                };
                ListItem::new(content).style(style)
            })
            .collect();
        frame.render_widget(
            List::new(items).block(Block::default().borders(Borders::ALL).title("Queue")),
            area,
        );
    }

    fn draw_up_next(&self, frame: &mut Frame, area: ratatui::layout::Rect, snapshot: &Snapshot) {
        let items: Vec<ListItem> = snapshot
            .up_next
            .iter()
            .enumerate()
            .map(|(i, track)| {
                ListItem::new(format!("{} - {}", track.title, track.artist_line()))
                    .style(self.pane_style(Pane::UpNext, i, self.selected_up_next))
            })
            .collect();
        frame.render_widget(
            List::new(items).block(Block::default().borders(Borders::ALL).title("Up Next")),
            area,
        );
    }

    fn draw_player_bar(&self, frame: &mut Frame, area: ratatui::layout::Rect, snapshot: &Snapshot) {
        let now_playing = match &snapshot.now_playing {
            Some(track) => {
                let liked = if self.store.is_liked(&track.id) { " ♥" } else { "" };
                format!("{} - {}{}", track.title, track.artist_line(), liked)
            }
            None => "Nothing playing".to_string(),
        };
        let state = match snapshot.sink_state {
            SinkState::Playing => "▶",
            SinkState::Paused => "⏸",
            SinkState::Stopped => "⏹",
        };
        let info = format!(
            "{}\n{} {} / {} | Volume {}% | {} queued, {} up next",
            now_playing,
            state,
            format_time(snapshot.position),
            format_time(snapshot.duration),
            snapshot.volume,
            snapshot.tracks.len(),
            snapshot.up_next.len(),
        );
        frame.render_widget(
            Paragraph::new(info).block(Block::default().borders(Borders::ALL).title("Player")),
            area,
        );
    }
}
