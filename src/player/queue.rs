// ==========================================
// QUEUE MANAGEMENT MODULE
// ==========================================
// Ordered sequence of tracks plus a cursor marking the active one.
// The queue also owns the "up next" buffer of recommended tracks and
// falls back to it when the explicit queue runs out.
//
// All mutation goes through the methods here; the engine never touches
// the sequence directly.

use std::collections::VecDeque;

use crate::track::Track;

/// Outcome of removing a queue entry.
#[derive(Debug)]
pub enum Removed {
    /// The removed entry was the active track. Carries the replacement
    /// selected by advance semantics, or `None` when nothing is left.
    Current(Option<Track>),
    /// A non-active entry was removed; the active track is unchanged.
    Other,
}

pub struct Queue {
    tracks: Vec<Track>,
    /// Index of the active track, `None` when nothing is selected.
    cursor: Option<usize>,
    /// Recommended continuation tracks, replaced wholesale after each
    /// successful play. Consumed front-first when the queue is exhausted.
    up_next: VecDeque<Track>,
}

impl Queue {
    pub fn new() -> Self {
        Queue {
            tracks: Vec::new(),
            cursor: None,
            up_next: VecDeque::new(),
        }
    }

    // ==========================================
    // SELECTION
    // ==========================================

    /// Select `track` for playback.
    ///
    /// With a source collection (album/playlist), the whole sequence is
    /// replaced by the collection so next/previous follow its order, and
    /// the cursor lands on `track` (append-and-select if the collection
    /// does not actually contain it).
    ///
    /// Without one (e.g. a bare search result), an existing occurrence is
    /// re-selected rather than duplicated; otherwise the track slots in
    /// right after the cursor so the rest of the queue is undisturbed.
    pub fn set_for_playback(&mut self, track: Track, source: Option<Vec<Track>>) -> Track {
        match source {
            Some(collection) => {
                self.tracks = collection;
                match self.tracks.iter().position(|t| t.id == track.id) {
                    Some(pos) => self.cursor = Some(pos),
                    None => {
                        self.tracks.push(track);
                        self.cursor = Some(self.tracks.len() - 1);
                    }
                }
            }
            None => {
                if let Some(pos) = self.tracks.iter().position(|t| t.id == track.id) {
                    self.cursor = Some(pos);
                } else {
                    let at = self.cursor.map(|c| c + 1).unwrap_or(self.tracks.len());
                    self.tracks.insert(at, track);
                    self.cursor = Some(at);
                }
            }
        }
        // Cursor is valid by construction here.
        self.tracks[self.cursor.unwrap_or(0)].clone()
    }

    /// Push to the end of the queue. Returns true when this was the first
    /// entry of an empty queue, in which case the caller should start
    /// playback of it.
    pub fn append(&mut self, track: Track) -> bool {
        let was_empty = self.tracks.is_empty();
        self.tracks.push(track);
        was_empty
    }

    /// Insert immediately after the cursor without moving it. Does not
    /// auto-play.
    pub fn insert_next(&mut self, track: Track) {
        let at = match self.cursor {
            Some(c) => c + 1,
            None => 0,
        };
        self.tracks.insert(at, track);
    }

    // ==========================================
    // NAVIGATION
    // ==========================================

    /// Move the cursor forward and return the newly active track.
    ///
    /// Order of fallbacks:
    /// 1. next in-sequence entry,
    /// 2. first entry if nothing was selected yet,
    /// 3. head of the up-next buffer (appended to the sequence),
    /// 4. `None`: the queue has ended.
    pub fn advance(&mut self) -> Option<Track> {
        match self.cursor {
            Some(c) if c + 1 < self.tracks.len() => {
                self.cursor = Some(c + 1);
                return Some(self.tracks[c + 1].clone());
            }
            None if !self.tracks.is_empty() => {
                self.cursor = Some(0);
                return Some(self.tracks[0].clone());
            }
            _ => {}
        }

        // Queue exhausted: pull from recommendations.
        if let Some(next) = self.up_next.pop_front() {
            self.tracks.push(next.clone());
            self.cursor = Some(self.tracks.len() - 1);
            return Some(next);
        }

        None
    }

    /// Move the cursor back one and return the newly active track.
    /// No-op at the first entry. The "restart instead when more than three
    /// seconds in" policy lives in the engine, which checks the playback
    /// position before calling this.
    pub fn retreat(&mut self) -> Option<Track> {
        match self.cursor {
            Some(c) if c > 0 => {
                self.cursor = Some(c - 1);
                Some(self.tracks[c - 1].clone())
            }
            _ => None,
        }
    }

    // ==========================================
    // EDITING
    // ==========================================

    /// Remove the entry at `index`.
    ///
    /// Removing the active entry re-selects via `advance` semantics (the
    /// cursor steps back past the gap first, so the in-sequence successor
    /// wins when one exists, and the up-next buffer fills in otherwise).
    /// Removing an earlier entry shifts the cursor down so it keeps
    /// pointing at the same track.
    pub fn remove_at(&mut self, index: usize) -> Option<Removed> {
        if index >= self.tracks.len() {
            return None;
        }
        self.tracks.remove(index);

        match self.cursor {
            Some(c) if c == index => {
                self.cursor = if index == 0 { None } else { Some(index - 1) };
                Some(Removed::Current(self.advance()))
            }
            Some(c) if c > index => {
                self.cursor = Some(c - 1);
                Some(Removed::Other)
            }
            _ => Some(Removed::Other),
        }
    }

    /// Move a single entry from `old` to `new`. The cursor is recomputed
    /// by re-locating the active track's id after the move, so reordering
    /// never changes which track is playing.
    pub fn reorder(&mut self, old: usize, new: usize) {
        if old >= self.tracks.len() || new >= self.tracks.len() || old == new {
            return;
        }
        let current_id = self.current().map(|t| t.id.clone());
        let track = self.tracks.remove(old);
        self.tracks.insert(new, track);
        self.cursor = current_id.and_then(|id| self.tracks.iter().position(|t| t.id == id));
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.cursor = None;
    }

    // ==========================================
    // UP-NEXT BUFFER
    // ==========================================

    /// Replace the recommendation buffer wholesale.
    pub fn replace_up_next(&mut self, tracks: Vec<Track>) {
        self.up_next = tracks.into();
    }

    /// Pull a specific recommended track out of the buffer, for the
    /// "play this suggestion now" path.
    pub fn take_up_next(&mut self, id: &str) -> Option<Track> {
        let pos = self.up_next.iter().position(|t| t.id == id)?;
        self.up_next.remove(pos)
    }

    pub fn up_next(&self) -> impl Iterator<Item = &Track> {
        self.up_next.iter()
    }

    pub fn up_next_len(&self) -> usize {
        self.up_next.len()
    }

    // ==========================================
    // INSPECTION
    // ==========================================

    pub fn current(&self) -> Option<&Track> {
        self.cursor.and_then(|c| self.tracks.get(c))
    }

    /// The in-sequence track that would play after the current one.
    /// Used to decide what to prefetch.
    pub fn peek_next(&self) -> Option<&Track> {
        self.cursor.and_then(|c| self.tracks.get(c + 1))
    }

    pub fn cursor_index(&self) -> Option<usize> {
        self.cursor
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Set of queued track ids, used to filter recommendation candidates.
    pub fn track_ids(&self) -> std::collections::HashSet<String> {
        self.tracks.iter().map(|t| t.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str) -> Track {
        Track::new(id.into(), id.to_uppercase(), vec!["artist".into()], 200)
    }

    fn queue_of(ids: &[&str]) -> Queue {
        let mut q = Queue::new();
        for id in ids {
            q.append(track(id));
        }
        q
    }

    #[test]
    fn set_for_playback_with_collection_replaces_sequence() {
        let mut q = queue_of(&["x", "y"]);
        let album = vec![track("a"), track("b"), track("c")];
        let playing = q.set_for_playback(track("b"), Some(album));
        assert_eq!(playing.id, "b");
        assert_eq!(q.cursor_index(), Some(1));
        assert_eq!(q.len(), 3);
        assert_eq!(q.tracks()[0].id, "a");
    }

    #[test]
    fn set_for_playback_appends_when_collection_lacks_track() {
        let mut q = Queue::new();
        let playing = q.set_for_playback(track("z"), Some(vec![track("a"), track("b")]));
        assert_eq!(playing.id, "z");
        assert_eq!(q.cursor_index(), Some(2));
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn set_for_playback_reuses_existing_occurrence() {
        let mut q = queue_of(&["a", "b", "c"]);
        q.advance(); // cursor on "a"
        let playing = q.set_for_playback(track("c"), None);
        assert_eq!(playing.id, "c");
        assert_eq!(q.cursor_index(), Some(2));
        assert_eq!(q.len(), 3); // no duplicate
    }

    #[test]
    fn set_for_playback_slots_new_track_after_cursor() {
        let mut q = queue_of(&["a", "b"]);
        q.advance(); // cursor on "a"
        let playing = q.set_for_playback(track("s"), None);
        assert_eq!(playing.id, "s");
        assert_eq!(q.cursor_index(), Some(1));
        let ids: Vec<_> = q.tracks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "s", "b"]);
    }

    #[test]
    fn append_signals_play_only_for_first_entry() {
        let mut q = Queue::new();
        assert!(q.append(track("a")));
        assert!(!q.append(track("b")));
    }

    #[test]
    fn insert_next_does_not_move_cursor() {
        let mut q = queue_of(&["a", "b"]);
        q.advance();
        q.insert_next(track("n"));
        assert_eq!(q.cursor_index(), Some(0));
        assert_eq!(q.tracks()[1].id, "n");
    }

    #[test]
    fn advance_walks_sequence_then_up_next_then_ends() {
        let mut q = queue_of(&["a", "b"]);
        q.replace_up_next(vec![track("x"), track("y")]);
        assert_eq!(q.advance().unwrap().id, "a");
        assert_eq!(q.advance().unwrap().id, "b");
        // Exhausted: up-next head is appended and selected.
        assert_eq!(q.advance().unwrap().id, "x");
        assert_eq!(q.len(), 3);
        assert_eq!(q.up_next_len(), 1);
        assert_eq!(q.advance().unwrap().id, "y");
        assert!(q.advance().is_none());
    }

    #[test]
    fn advance_on_empty_queue_pulls_from_up_next() {
        let mut q = Queue::new();
        q.replace_up_next(vec![track("x"), track("y")]);
        let t = q.advance().unwrap();
        assert_eq!(t.id, "x");
        assert_eq!(q.cursor_index(), Some(0));
        assert_eq!(q.len(), 1);
        assert_eq!(q.up_next_len(), 1);
    }

    #[test]
    fn retreat_stops_at_first_entry() {
        let mut q = queue_of(&["a", "b"]);
        q.advance();
        q.advance(); // cursor on "b"
        assert_eq!(q.retreat().unwrap().id, "a");
        assert!(q.retreat().is_none());
        assert_eq!(q.cursor_index(), Some(0));
    }

    #[test]
    fn remove_current_selects_in_sequence_successor() {
        // Queue [a, b, c], cursor on b: removing b must land on c.
        let mut q = queue_of(&["a", "b", "c"]);
        q.advance();
        q.advance(); // cursor=1 (b)
        match q.remove_at(1) {
            Some(Removed::Current(Some(t))) => assert_eq!(t.id, "c"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(q.current().unwrap().id, "c");
        assert_eq!(q.cursor_index(), Some(1));
    }

    #[test]
    fn remove_current_first_entry_selects_new_first() {
        let mut q = queue_of(&["a", "b"]);
        q.advance(); // cursor=0 (a)
        match q.remove_at(0) {
            Some(Removed::Current(Some(t))) => assert_eq!(t.id, "b"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(q.cursor_index(), Some(0));
    }

    #[test]
    fn remove_last_current_pulls_from_up_next() {
        let mut q = queue_of(&["a"]);
        q.advance();
        q.replace_up_next(vec![track("x")]);
        match q.remove_at(0) {
            Some(Removed::Current(Some(t))) => assert_eq!(t.id, "x"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn remove_last_current_without_up_next_ends_queue() {
        let mut q = queue_of(&["a"]);
        q.advance();
        match q.remove_at(0) {
            Some(Removed::Current(None)) => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(q.current().is_none());
    }

    #[test]
    fn remove_before_cursor_keeps_current_track() {
        let mut q = queue_of(&["a", "b", "c"]);
        q.advance();
        q.advance(); // cursor on "b"
        assert!(matches!(q.remove_at(0), Some(Removed::Other)));
        assert_eq!(q.current().unwrap().id, "b");
        assert_eq!(q.cursor_index(), Some(0));
    }

    #[test]
    fn remove_after_cursor_keeps_cursor() {
        let mut q = queue_of(&["a", "b", "c"]);
        q.advance(); // cursor on "a"
        assert!(matches!(q.remove_at(2), Some(Removed::Other)));
        assert_eq!(q.cursor_index(), Some(0));
    }

    #[test]
    fn remove_out_of_bounds_is_rejected() {
        let mut q = queue_of(&["a"]);
        assert!(q.remove_at(5).is_none());
    }

    #[test]
    fn reorder_preserves_current_track_identity() {
        let mut q = queue_of(&["a", "b", "c"]);
        q.advance();
        q.advance(); // cursor on "b"
        q.reorder(1, 2);
        assert_eq!(q.current().unwrap().id, "b");
        assert_eq!(q.cursor_index(), Some(2));
        q.reorder(0, 2); // move "a" to the end
        assert_eq!(q.current().unwrap().id, "b");
        assert_eq!(q.cursor_index(), Some(1));
    }

    #[test]
    fn take_up_next_removes_only_that_entry() {
        let mut q = Queue::new();
        q.replace_up_next(vec![track("x"), track("y")]);
        assert_eq!(q.take_up_next("y").unwrap().id, "y");
        assert_eq!(q.up_next_len(), 1);
        assert!(q.take_up_next("y").is_none());
    }
}
