// ==========================================
// PLAYBACK ENGINE
// ==========================================
// Synchronous core of the player: the queue, the play history, the
// prefetch cache, and the request-token protocol that keeps rapid user
// actions from racing each other.
//
// Stream resolution is slow and completes in arbitrary order, so every
// play request captures a fresh token from a counter that only ever
// increments. A completion is applied only while its token is still the
// newest one; anything older is a superseded request and is dropped
// without touching playback state.
//
// The async half (resolver calls, recommendation fetches, the audio
// sink) lives in `session`, which locks this engine only to mutate and
// never across an await.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Error;
use crate::player::events::PlayerEvent;
use crate::player::history::History;
use crate::player::prefetch::PrefetchCache;
use crate::player::queue::{Queue, Removed};
use crate::track::Track;

/// A play request waiting on stream resolution. `cached_url` is set when
/// the prefetch cache held a URL for exactly this track; the caller can
/// then skip the resolver entirely.
#[derive(Debug)]
pub struct PendingPlay {
    pub token: u64,
    pub track: Track,
    pub cached_url: Option<String>,
}

/// What `request_previous` decided, given the current playback position.
#[derive(Debug)]
pub enum PreviousAction {
    /// More than a few seconds in: restart the current track instead of
    /// moving the cursor.
    Restart,
    /// Cursor moved back; resolve and play this.
    Play(PendingPlay),
    /// Already at the first entry.
    None,
}

/// A successfully applied play. The session starts audio for `url` and
/// kicks off prefetch of `prefetch_next` plus an up-next refresh for
/// `track`.
#[derive(Debug)]
pub struct Applied {
    pub track: Track,
    pub url: String,
    pub prefetch_next: Option<Track>,
}

/// Seconds into a track beyond which "previous" restarts it.
const RESTART_THRESHOLD_SECS: f64 = 3.0;

pub struct PlayerEngine {
    queue: Queue,
    history: History,
    prefetch: PrefetchCache,
    /// Monotonically increasing; the highest issued value is the only
    /// token whose completion may be applied.
    token: u64,
    /// True while the current token's resolution is still in flight.
    loading: bool,
    now_playing: Option<Track>,
    events: mpsc::UnboundedSender<PlayerEvent>,
}

impl PlayerEngine {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PlayerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let engine = PlayerEngine {
            queue: Queue::new(),
            history: History::new(),
            prefetch: PrefetchCache::new(),
            token: 0,
            loading: false,
            now_playing: None,
            events,
        };
        (engine, rx)
    }

    fn emit(&self, event: PlayerEvent) {
        // The receiver living in the UI may be gone during shutdown.
        let _ = self.events.send(event);
    }

    /// Issue a new request token and mark the loading state. The prefetch
    /// cache is consulted for `track` first, then cleared: whatever it
    /// held was predicted for the previous "next" and is now moot.
    fn issue(&mut self, track: Track) -> PendingPlay {
        self.token += 1;
        self.loading = true;
        let cached_url = self.prefetch.take(&track.id);
        self.prefetch.clear();
        self.emit(PlayerEvent::Loading(true));
        PendingPlay {
            token: self.token,
            track,
            cached_url,
        }
    }

    // ==========================================
    // PLAY REQUESTS
    // ==========================================

    /// Play `track`, optionally in the context of a source collection.
    pub fn request_play(&mut self, track: Track, source: Option<Vec<Track>>) -> PendingPlay {
        let target = self.queue.set_for_playback(track, source);
        self.emit(PlayerEvent::QueueChanged);
        self.issue(target)
    }

    /// Skip forward. `None` means the queue has truly ended (no sequence
    /// successor and an empty up-next buffer); a `QueueEnded` event is
    /// emitted so the UI can distinguish this from a pause.
    pub fn request_next(&mut self) -> Option<PendingPlay> {
        match self.queue.advance() {
            Some(track) => {
                self.emit(PlayerEvent::QueueChanged);
                Some(self.issue(track))
            }
            None => {
                self.now_playing = None;
                self.emit(PlayerEvent::TrackChanged(None));
                self.emit(PlayerEvent::QueueEnded);
                None
            }
        }
    }

    /// Skip backward. `position_secs` is how far into the current track
    /// playback is; past the threshold the track restarts instead.
    pub fn request_previous(&mut self, position_secs: f64) -> PreviousAction {
        if position_secs > RESTART_THRESHOLD_SECS && self.now_playing.is_some() {
            return PreviousAction::Restart;
        }
        match self.queue.retreat() {
            Some(track) => {
                self.emit(PlayerEvent::QueueChanged);
                PreviousAction::Play(self.issue(track))
            }
            None => PreviousAction::None,
        }
    }

    /// Play a track straight out of the up-next buffer: it leaves the
    /// buffer, is appended to the queue, and goes through the normal
    /// request path (which re-selects the appended occurrence).
    pub fn request_up_next(&mut self, id: &str) -> Option<PendingPlay> {
        let track = self.queue.take_up_next(id)?;
        self.queue.append(track.clone());
        self.emit(PlayerEvent::UpNextChanged);
        Some(self.request_play(track, None))
    }

    // ==========================================
    // QUEUE EDITING
    // ==========================================

    /// Append to the queue. When this was the first entry, playback of it
    /// starts and the returned request must be driven to completion.
    pub fn queue_append(&mut self, track: Track) -> Option<PendingPlay> {
        let play_now = self.queue.append(track.clone());
        self.emit(PlayerEvent::QueueChanged);
        play_now.then(|| self.request_play(track, None))
    }

    pub fn queue_insert_next(&mut self, track: Track) {
        self.queue.insert_next(track);
        self.emit(PlayerEvent::QueueChanged);
    }

    /// Remove a queue entry. Removing the active one hands back a request
    /// for its replacement; emptying the queue this way ends playback.
    pub fn queue_remove(&mut self, index: usize) -> Option<PendingPlay> {
        match self.queue.remove_at(index)? {
            Removed::Current(Some(next)) => {
                self.emit(PlayerEvent::QueueChanged);
                Some(self.issue(next))
            }
            Removed::Current(None) => {
                self.now_playing = None;
                self.emit(PlayerEvent::QueueChanged);
                self.emit(PlayerEvent::TrackChanged(None));
                self.emit(PlayerEvent::QueueEnded);
                None
            }
            Removed::Other => {
                self.emit(PlayerEvent::QueueChanged);
                None
            }
        }
    }

    pub fn queue_reorder(&mut self, old: usize, new: usize) {
        self.queue.reorder(old, new);
        self.emit(PlayerEvent::QueueChanged);
    }

    /// Drop every queue entry and stop tracking a current track. The
    /// up-next buffer is kept; it belongs to whatever played last.
    pub fn queue_clear(&mut self) {
        self.queue.clear();
        self.now_playing = None;
        self.emit(PlayerEvent::QueueChanged);
        self.emit(PlayerEvent::TrackChanged(None));
    }

    // ==========================================
    // COMPLETIONS
    // ==========================================

    /// Apply the outcome of a stream resolution.
    ///
    /// A stale token means a newer request superseded this one while it
    /// was in flight; both successes and failures are then dropped
    /// silently. A current-token failure is surfaced exactly once and
    /// leaves playback state untouched. Cancellation is never an error.
    pub fn complete(
        &mut self,
        pending_token: u64,
        track: &Track,
        result: Result<String, Error>,
    ) -> Option<Applied> {
        if pending_token != self.token {
            debug!(
                token = pending_token,
                current = self.token,
                id = %track.id,
                "discarding superseded resolution"
            );
            return None;
        }

        self.loading = false;
        self.emit(PlayerEvent::Loading(false));

        let url = match result {
            Ok(url) if !url.is_empty() => url,
            Ok(_) => {
                self.emit(PlayerEvent::PlayFailed {
                    title: track.title.clone(),
                    reason: "resolver returned no URL".into(),
                });
                return None;
            }
            Err(Error::Canceled) => {
                debug!(id = %track.id, "resolution canceled");
                return None;
            }
            Err(e) => {
                warn!(id = %track.id, error = %e, "stream resolution failed");
                self.emit(PlayerEvent::PlayFailed {
                    title: track.title.clone(),
                    reason: e.to_string(),
                });
                return None;
            }
        };

        self.history.record(&track.id);
        self.now_playing = Some(track.clone());
        self.emit(PlayerEvent::TrackChanged(Some(track.clone())));

        Some(Applied {
            track: track.clone(),
            url,
            prefetch_next: self.queue.peek_next().cloned(),
        })
    }

    /// Roll back an applied play whose audio could not actually start
    /// (download, decode, or device failure after resolution succeeded).
    /// Guarded by the same token rule as `complete`; by the time a stale
    /// audio failure lands, a newer request owns the playback state.
    pub fn audio_failed(&mut self, token: u64, track: &Track, reason: String) {
        if token != self.token {
            debug!(token, current = self.token, "discarding superseded audio failure");
            return;
        }
        self.now_playing = None;
        self.emit(PlayerEvent::TrackChanged(None));
        self.emit(PlayerEvent::PlayFailed {
            title: track.title.clone(),
            reason,
        });
    }

    /// Store a prefetched URL. The id-match check at consumption time
    /// makes a stale entry harmless, so no token is needed here.
    pub fn store_prefetch(&mut self, track_id: String, url: String) {
        self.prefetch.set(track_id, url);
    }

    /// Replace the up-next buffer with candidates fetched for
    /// `for_track`, dropping anything already queued or recently played.
    pub fn apply_up_next(&mut self, candidates: Vec<Track>) {
        let queued = self.queue.track_ids();
        let filtered = candidates
            .into_iter()
            .filter(|t| !queued.contains(&t.id) && !self.history.contains(&t.id))
            .collect();
        self.queue.replace_up_next(filtered);
        self.emit(PlayerEvent::UpNextChanged);
    }

    // ==========================================
    // INSPECTION
    // ==========================================

    pub fn now_playing(&self) -> Option<&Track> {
        self.now_playing.as_ref()
    }

    /// True while a resolution for the current token is in flight. Used
    /// to hold off automatic advance until the pending play settles.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn current_token(&self) -> u64 {
        self.token
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    #[cfg(test)]
    pub fn prefetch(&self) -> &PrefetchCache {
        &self.prefetch
    }
}
