// Play history, most-recent-first, used to keep already-played tracks
// out of the up-next suggestions.

use std::collections::VecDeque;

/// Maximum number of remembered track ids.
const HISTORY_CAP: usize = 50;

pub struct History {
    ids: VecDeque<String>,
}

impl History {
    pub fn new() -> Self {
        History {
            ids: VecDeque::with_capacity(HISTORY_CAP),
        }
    }

    /// Record a play. Re-recording an id moves it to the front instead of
    /// duplicating it; the oldest entry falls off past the cap.
    pub fn record(&mut self, id: &str) {
        if let Some(pos) = self.ids.iter().position(|i| i == id) {
            self.ids.remove(pos);
        }
        self.ids.push_front(id.to_string());
        self.ids.truncate(HISTORY_CAP);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|i| i == id)
    }

    /// Ids most-recent-first.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_prepends_most_recent() {
        let mut h = History::new();
        h.record("a");
        h.record("b");
        let ids: Vec<_> = h.ids().collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn re_recording_moves_to_front_without_growing() {
        let mut h = History::new();
        h.record("a");
        h.record("b");
        h.record("a");
        let ids: Vec<_> = h.ids().collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn capped_at_fifty_dropping_oldest() {
        let mut h = History::new();
        for i in 0..60 {
            h.record(&format!("t{}", i));
        }
        assert_eq!(h.len(), 50);
        assert!(h.contains("t59"));
        assert!(!h.contains("t9"));
        assert!(h.contains("t10"));
    }

    #[test]
    fn full_history_re_record_keeps_length() {
        let mut h = History::new();
        for i in 0..50 {
            h.record(&format!("t{}", i));
        }
        h.record("t0");
        assert_eq!(h.len(), 50);
        assert_eq!(h.ids().next(), Some("t0"));
    }
}
