// ==========================================
// PLAYER SESSION
// ==========================================
// Async half of the coordinator. The engine is a synchronous state
// machine behind a mutex; this wrapper performs the slow work (stream
// resolution, recommendation fetches, audio start) outside the lock and
// re-enters it only to apply completions. The engine's token check is
// what makes that safe under rapid, overlapping requests.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::player::audio::{AudioSink, SinkState};
use crate::player::engine::{Applied, PendingPlay, PlayerEngine, PreviousAction};
use crate::resolver::{CancelHandle, StreamResolver};
use crate::track::Track;

/// Read-only view of playback state for rendering.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub tracks: Vec<Track>,
    pub cursor: Option<usize>,
    pub up_next: Vec<Track>,
    pub now_playing: Option<Track>,
    pub sink_state: SinkState,
    pub position: f64,
    pub duration: f64,
    pub volume: u32,
}

#[derive(Clone)]
pub struct PlayerSession {
    engine: Arc<Mutex<PlayerEngine>>,
    sink: Arc<Mutex<Box<dyn AudioSink>>>,
    resolver: Arc<dyn StreamResolver>,
    catalog: Arc<dyn Catalog>,
    region: String,
}

impl PlayerSession {
    pub fn new(
        engine: PlayerEngine,
        sink: Box<dyn AudioSink>,
        resolver: Arc<dyn StreamResolver>,
        catalog: Arc<dyn Catalog>,
        region: String,
    ) -> Self {
        PlayerSession {
            engine: Arc::new(Mutex::new(engine)),
            sink: Arc::new(Mutex::new(sink)),
            resolver,
            catalog,
            region,
        }
    }

    // Lock helpers. Neither lock is ever held across an await.
    fn engine(&self) -> MutexGuard<'_, PlayerEngine> {
        self.engine.lock().expect("engine lock poisoned")
    }

    fn sink(&self) -> MutexGuard<'_, Box<dyn AudioSink>> {
        self.sink.lock().expect("sink lock poisoned")
    }

    // ==========================================
    // PLAY PATHS
    // ==========================================

    /// Play a track, optionally in the context of a source collection.
    /// Asking for the already-current, merely paused track resumes it in
    /// place instead of re-resolving a stream.
    pub async fn play(&self, track: Track, source: Option<Vec<Track>>) {
        if source.is_none() {
            let current = self.engine().now_playing().map(|t| t.id.clone());
            if current.as_deref() == Some(track.id.as_str()) {
                let mut sink = self.sink();
                if sink.state() == SinkState::Paused {
                    sink.resume();
                    return;
                }
            }
        }
        let pending = self.engine().request_play(track, source);
        self.drive(pending).await;
    }

    pub async fn play_next(&self) {
        let pending = self.engine().request_next();
        match pending {
            Some(pending) => self.drive(pending).await,
            None => self.sink().stop(),
        }
    }

    pub async fn play_previous(&self) {
        let position = self.sink().position();
        let action = self.engine().request_previous(position);
        match action {
            PreviousAction::Restart => {
                let sink = Arc::clone(&self.sink);
                let outcome = tokio::task::spawn_blocking(move || {
                    sink.lock().expect("sink lock poisoned").restart()
                })
                .await;
                if let Ok(Err(e)) = outcome {
                    warn!(error = %e, "restart failed");
                }
            }
            PreviousAction::Play(pending) => self.drive(pending).await,
            PreviousAction::None => {}
        }
    }

    pub async fn play_up_next(&self, id: &str) {
        let pending = self.engine().request_up_next(id);
        if let Some(pending) = pending {
            self.drive(pending).await;
        }
    }

    pub fn toggle_pause(&self) {
        let mut sink = self.sink();
        match sink.state() {
            SinkState::Playing => sink.pause(),
            SinkState::Paused => sink.resume(),
            SinkState::Stopped => {}
        }
    }

    /// Called from the UI tick: advance automatically when the loaded
    /// source has played out. A pending resolution holds this off, since
    /// the sink sits empty while a stream loads.
    pub async fn poll_finished(&self) {
        if self.engine().is_loading() {
            return;
        }
        let finished = self.sink().is_finished();
        if finished {
            self.play_next().await;
        }
    }

    // ==========================================
    // QUEUE EDITING
    // ==========================================

    pub async fn queue_append(&self, track: Track) {
        let pending = self.engine().queue_append(track);
        if let Some(pending) = pending {
            self.drive(pending).await;
        }
    }

    pub fn queue_insert_next(&self, track: Track) {
        self.engine().queue_insert_next(track);
    }

    pub async fn queue_remove(&self, index: usize) {
        let (pending, queue_ended) = {
            let mut engine = self.engine();
            let before = engine.now_playing().is_some();
            let pending = engine.queue_remove(index);
            (pending, before && engine.now_playing().is_none())
        };
        match pending {
            Some(pending) => self.drive(pending).await,
            None if queue_ended => self.sink().stop(),
            None => {}
        }
    }

    pub fn queue_reorder(&self, old: usize, new: usize) {
        self.engine().queue_reorder(old, new);
    }

    pub fn queue_clear(&self) {
        self.engine().queue_clear();
        self.sink().stop();
    }

    // ==========================================
    // RESOLUTION DRIVER
    // ==========================================

    /// Resolve a stream URL for `pending` and apply the completion. The
    /// engine decides whether the result still matters; a superseded
    /// token makes this whole call a silent no-op.
    async fn drive(&self, pending: PendingPlay) {
        let PendingPlay {
            token,
            track,
            cached_url,
        } = pending;

        let result = match cached_url {
            Some(url) => Ok(url),
            None => self.resolver.resolve_stream(&track.id).await,
        };

        let applied = self.engine().complete(token, &track, result);
        if let Some(applied) = applied {
            // The resolution was applied, but the sink can still fail on
            // the download or decode. Roll the applied state back so the
            // UI never claims a track is playing over silence.
            if let Err(e) = self.start_audio(&applied).await {
                warn!(error = %e, "audio start failed");
                self.engine().audio_failed(token, &applied.track, e.to_string());
                return;
            }
            self.spawn_prefetch(applied.prefetch_next);
            self.spawn_up_next_refresh(applied.track.clone());
        }
    }

    /// Start the sink on a blocking thread; it downloads the stream body
    /// before decoding.
    async fn start_audio(&self, applied: &Applied) -> Result<()> {
        let sink = Arc::clone(&self.sink);
        let url = applied.url.clone();
        let title = applied.track.title.clone();
        let duration = applied.track.duration as f64;
        match tokio::task::spawn_blocking(move || {
            sink.lock()
                .expect("sink lock poisoned")
                .play(&url, &title, duration)
        })
        .await
        {
            Ok(result) => result,
            Err(e) => Err(Error::Audio(format!("audio task failed: {e}"))),
        }
    }

    /// Eagerly resolve the next track's stream so the upcoming skip hides
    /// its network latency. Failures are logged and forgotten.
    fn spawn_prefetch(&self, next: Option<Track>) {
        let Some(next) = next else { return };
        let resolver = Arc::clone(&self.resolver);
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            match resolver.resolve_stream(&next.id).await {
                Ok(url) => engine
                    .lock()
                    .expect("engine lock poisoned")
                    .store_prefetch(next.id, url),
                Err(e) => warn!(id = %next.id, error = %e, "prefetch failed"),
            }
        });
    }

    /// Refresh the up-next buffer for the new current track. Fails open
    /// to an empty buffer; recommendations never block playback.
    fn spawn_up_next_refresh(&self, current: Track) {
        let catalog = Arc::clone(&self.catalog);
        let engine = Arc::clone(&self.engine);
        let region = self.region.clone();
        tokio::spawn(async move {
            let candidates = match catalog.related(&current.id, &region).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(id = %current.id, error = %e, "recommendation fetch failed");
                    Vec::new()
                }
            };
            engine
                .lock()
                .expect("engine lock poisoned")
                .apply_up_next(candidates);
        });
    }

    /// Kick off a cancelable video-stream resolution for the overlay
    /// path. The caller holds the handle and treats a late completion
    /// after cancel as ignorable, never as an error.
    pub fn resolve_video(
        &self,
        track_id: &str,
    ) -> (crate::resolver::BoxFuture<Result<String>>, CancelHandle) {
        self.resolver.resolve_video_stream(track_id)
    }

    // ==========================================
    // STATE FOR THE UI
    // ==========================================

    pub fn set_volume(&self, volume: u32) {
        self.sink().set_volume(volume);
    }

    pub fn snapshot(&self) -> Snapshot {
        let engine = self.engine();
        let sink = self.sink();
        Snapshot {
            tracks: engine.queue().tracks().to_vec(),
            cursor: engine.queue().cursor_index(),
            up_next: engine.queue().up_next().cloned().collect(),
            now_playing: engine.now_playing().cloned(),
            sink_state: sink.state(),
            position: sink.position(),
            duration: sink.duration(),
            volume: sink.volume(),
        }
    }

    pub fn catalog(&self) -> Arc<dyn Catalog> {
        Arc::clone(&self.catalog)
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CollectionDetails, CollectionKind, SearchResults};
    use crate::error::Error;
    use crate::player::events::PlayerEvent;
    use crate::resolver::BoxFuture;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{mpsc, oneshot};

    fn track(id: &str) -> Track {
        Track::new(id.into(), id.to_uppercase(), vec!["artist".into()], 180)
    }

    /// Sink that records every source it is asked to play.
    #[derive(Default)]
    struct RecordingSink {
        played: Vec<String>,
        state: Option<SinkState>,
        position: f64,
        finished: bool,
    }

    struct SharedSink(Arc<Mutex<RecordingSink>>);

    impl AudioSink for SharedSink {
        fn play(&mut self, url: &str, _title: &str, _duration: f64) -> Result<()> {
            let mut inner = self.0.lock().unwrap();
            inner.played.push(url.to_string());
            inner.state = Some(SinkState::Playing);
            Ok(())
        }
        fn pause(&mut self) {
            self.0.lock().unwrap().state = Some(SinkState::Paused);
        }
        fn resume(&mut self) {
            self.0.lock().unwrap().state = Some(SinkState::Playing);
        }
        fn stop(&mut self) {
            self.0.lock().unwrap().state = Some(SinkState::Stopped);
        }
        fn restart(&mut self) -> Result<()> {
            let mut inner = self.0.lock().unwrap();
            if let Some(last) = inner.played.last().cloned() {
                inner.played.push(last);
            }
            Ok(())
        }
        fn state(&self) -> SinkState {
            self.0.lock().unwrap().state.unwrap_or(SinkState::Stopped)
        }
        fn position(&self) -> f64 {
            self.0.lock().unwrap().position
        }
        fn duration(&self) -> f64 {
            0.0
        }
        fn set_volume(&mut self, _volume: u32) {}
        fn volume(&self) -> u32 {
            100
        }
        fn is_finished(&self) -> bool {
            self.0.lock().unwrap().finished
        }
    }

    /// Sink whose play call always fails, as with an expired stream URL.
    struct FailingSink;

    impl AudioSink for FailingSink {
        fn play(&mut self, _url: &str, _title: &str, _duration: f64) -> Result<()> {
            Err(Error::Audio("download failed".into()))
        }
        fn pause(&mut self) {}
        fn resume(&mut self) {}
        fn stop(&mut self) {}
        fn restart(&mut self) -> Result<()> {
            Ok(())
        }
        fn state(&self) -> SinkState {
            SinkState::Stopped
        }
        fn position(&self) -> f64 {
            0.0
        }
        fn duration(&self) -> f64 {
            0.0
        }
        fn set_volume(&mut self, _volume: u32) {}
        fn volume(&self) -> u32 {
            100
        }
        fn is_finished(&self) -> bool {
            false
        }
    }

    /// Resolver whose completions are released by the test, so completion
    /// order can be scripted.
    #[derive(Default)]
    struct ScriptedResolver {
        gates: Mutex<HashMap<String, oneshot::Receiver<Result<String>>>>,
        calls: AtomicUsize,
    }

    impl ScriptedResolver {
        fn gate(&self, id: &str) -> oneshot::Sender<Result<String>> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().insert(id.to_string(), rx);
            tx
        }
    }

    impl StreamResolver for ScriptedResolver {
        fn resolve_stream(&self, track_id: &str) -> BoxFuture<Result<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.gates.lock().unwrap().remove(track_id);
            let id = track_id.to_string();
            Box::pin(async move {
                match gate {
                    Some(rx) => rx.await.unwrap_or(Err(Error::Canceled)),
                    None => Ok(format!("http://stream/{id}")),
                }
            })
        }

        fn resolve_video_stream(
            &self,
            track_id: &str,
        ) -> (BoxFuture<Result<String>>, crate::resolver::CancelHandle) {
            let handle = crate::resolver::CancelHandle::new();
            let id = track_id.to_string();
            (Box::pin(async move { Ok(format!("http://video/{id}")) }), handle)
        }
    }

    struct EmptyCatalog;

    impl Catalog for EmptyCatalog {
        fn search(&self, _query: &str, _region: &str) -> BoxFuture<Result<SearchResults>> {
            Box::pin(async { Ok(SearchResults::default()) })
        }
        fn related(&self, _track_id: &str, _region: &str) -> BoxFuture<Result<Vec<Track>>> {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn collection_details(
            &self,
            _id: &str,
            _kind: CollectionKind,
            _region: &str,
        ) -> BoxFuture<Result<CollectionDetails>> {
            Box::pin(async {
                Err(Error::Catalog("not implemented".into()))
            })
        }
    }

    fn session_with(
        resolver: Arc<ScriptedResolver>,
    ) -> (
        PlayerSession,
        Arc<Mutex<RecordingSink>>,
        mpsc::UnboundedReceiver<PlayerEvent>,
    ) {
        let (engine, events) = PlayerEngine::new();
        let recording = Arc::new(Mutex::new(RecordingSink::default()));
        let sink = Box::new(SharedSink(Arc::clone(&recording)));
        let session = PlayerSession::new(
            engine,
            sink,
            resolver,
            Arc::new(EmptyCatalog),
            "US".into(),
        );
        (session, recording, events)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn later_request_wins_regardless_of_completion_order() {
        let resolver = Arc::new(ScriptedResolver::default());
        let release_s1 = resolver.gate("s1");
        let (session, sink, _events) = session_with(Arc::clone(&resolver));

        // s1 hangs in the resolver while s2 is requested and completes.
        let racing = {
            let session = session.clone();
            tokio::spawn(async move { session.play(track("s1"), None).await })
        };
        // Wait until s1's request reached the resolver so the token order
        // is fixed before s2 is issued.
        while resolver.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        session.play(track("s2"), None).await;

        // Now the stale s1 resolution lands.
        release_s1.send(Ok("http://stream/s1".into())).unwrap();
        racing.await.unwrap();

        let played = sink.lock().unwrap().played.clone();
        assert_eq!(played, vec!["http://stream/s2"]);
        assert_eq!(
            session.snapshot().now_playing.unwrap().id,
            "s2".to_string()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn paused_current_track_resumes_without_resolving() {
        let resolver = Arc::new(ScriptedResolver::default());
        let (session, sink, _events) = session_with(Arc::clone(&resolver));

        session.play(track("a"), None).await;
        let after_first = resolver.calls.load(Ordering::SeqCst);
        session.toggle_pause();
        assert_eq!(sink.lock().unwrap().state, Some(SinkState::Paused));

        session.play(track("a"), None).await;
        assert_eq!(sink.lock().unwrap().state, Some(SinkState::Playing));
        // No extra resolver round trip for the resume.
        assert_eq!(resolver.calls.load(Ordering::SeqCst), after_first);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_resolution_reports_and_keeps_silence() {
        let resolver = Arc::new(ScriptedResolver::default());
        let release = resolver.gate("bad");
        let (session, sink, mut events) = session_with(Arc::clone(&resolver));

        release
            .send(Err(Error::Resolve {
                id: "bad".into(),
                reason: "no formats".into(),
            }))
            .unwrap();
        session.play(track("bad"), None).await;

        assert!(sink.lock().unwrap().played.is_empty());
        let mut saw_failure = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, PlayerEvent::PlayFailed { .. }) {
                saw_failure = true;
            }
        }
        assert!(saw_failure);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn next_at_queue_end_stops_audio() {
        let resolver = Arc::new(ScriptedResolver::default());
        let (session, sink, _events) = session_with(resolver);

        session.play(track("only"), None).await;
        session.play_next().await;
        assert_eq!(sink.lock().unwrap().state, Some(SinkState::Stopped));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn audio_start_failure_rolls_back_and_reports() {
        let resolver = Arc::new(ScriptedResolver::default());
        let (engine, mut events) = PlayerEngine::new();
        let session = PlayerSession::new(
            engine,
            Box::new(FailingSink),
            resolver,
            Arc::new(EmptyCatalog),
            "US".into(),
        );

        session.play(track("a"), None).await;

        assert!(session.snapshot().now_playing.is_none());
        let mut saw_failure = false;
        let mut last_track_change = None;
        while let Ok(event) = events.try_recv() {
            match event {
                PlayerEvent::PlayFailed { .. } => saw_failure = true,
                PlayerEvent::TrackChanged(t) => last_track_change = Some(t),
                _ => {}
            }
        }
        assert!(saw_failure);
        // The applied track was rolled back, not left dangling.
        assert!(matches!(last_track_change, Some(None)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn auto_advance_holds_while_resolution_pending() {
        let resolver = Arc::new(ScriptedResolver::default());
        let release = resolver.gate("slow");
        let (session, sink, _events) = session_with(Arc::clone(&resolver));

        let driving = {
            let session = session.clone();
            tokio::spawn(async move { session.play(track("slow"), None).await })
        };
        while resolver.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        // The sink reads as finished while the stream loads; polling must
        // not skip ahead past the pending request.
        sink.lock().unwrap().finished = true;
        session.poll_finished().await;
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);

        release.send(Ok("http://stream/slow".into())).unwrap();
        driving.await.unwrap();
        assert_eq!(session.snapshot().now_playing.unwrap().id, "slow");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn previous_restarts_deep_into_track() {
        let resolver = Arc::new(ScriptedResolver::default());
        let (session, sink, _events) = session_with(resolver);

        session.play(track("a"), None).await;
        sink.lock().unwrap().position = 20.0;
        session.play_previous().await;

        let played = sink.lock().unwrap().played.clone();
        // Same source twice: restarted, not navigated.
        assert_eq!(played, vec!["http://stream/a", "http://stream/a"]);
    }
}
