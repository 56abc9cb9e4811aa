// Single-slot cache for the stream URL of the predicted next track.
// Correctness rests on the id match at read time, not on eager
// invalidation: a stale entry is just a miss.

pub struct PrefetchCache {
    entry: Option<(String, String)>,
}

impl PrefetchCache {
    pub fn new() -> Self {
        PrefetchCache { entry: None }
    }

    /// Store a resolved URL for `track_id`, replacing any previous entry.
    pub fn set(&mut self, track_id: String, url: String) {
        self.entry = Some((track_id, url));
    }

    /// Consume the cached URL if it was resolved for exactly `track_id`.
    /// The cache is single-use: a hit empties it.
    pub fn take(&mut self, track_id: &str) -> Option<String> {
        let hit = matches!(&self.entry, Some((id, _)) if id == track_id);
        if hit {
            self.entry.take().map(|(_, url)| url)
        } else {
            None
        }
    }

    /// Non-consuming lookup, same id-match rule as `take`.
    pub fn get(&self, track_id: &str) -> Option<&str> {
        match &self.entry {
            Some((id, url)) if id == track_id => Some(url),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }
}

impl Default for PrefetchCache {
    fn default() -> Self {
        Self::new()
    }
}
