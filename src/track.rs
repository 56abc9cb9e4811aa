// Track model shared by the catalog, queue, and player.
// Catalog responses are normalized into this shape at the boundary;
// nothing past the catalog module ever sees a raw payload.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Song,
    Video,
}

/// A thumbnail descriptor. The catalog returns these smallest-first;
/// that ordering is preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// A playable unit with a stable, externally assigned identifier.
/// Immutable once obtained; the queue stores owned copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub duration: u64,
    pub thumbnails: Vec<Thumbnail>,
    pub kind: TrackKind,
}

impl Track {
    pub fn new(id: String, title: String, artists: Vec<String>, duration: u64) -> Self {
        Track {
            id,
            title,
            artists,
            album: None,
            duration,
            thumbnails: Vec::new(),
            kind: TrackKind::Song,
        }
    }

    /// "Artist A, Artist B" for display.
    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }
}

/// Format a position or duration as mm:ss for display.
pub fn format_time(seconds: f64) -> String {
    let mins = (seconds / 60.0) as u64;
    let secs = (seconds % 60.0) as u64;
    format!("{:02}:{:02}", mins, secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artist_line_joins_in_order() {
        let track = Track::new(
            "t1".into(),
            "Duet".into(),
            vec!["First".into(), "Second".into()],
            180,
        );
        assert_eq!(track.artist_line(), "First, Second");
    }

    #[test]
    fn format_time_pads_seconds() {
        assert_eq!(format_time(212.0), "03:32");
        assert_eq!(format_time(5.4), "00:05");
    }
}
