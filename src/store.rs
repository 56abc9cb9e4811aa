// ==========================================
// PREFERENCE STORE
// ==========================================
// JSON-file-backed persistence for things that outlive a session:
// region, volume, liked songs, playlists, and the recently-played list.
// The in-memory play history used for recommendation filtering is a
// separate, session-scoped thing (player::history).

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::track::Track;

const APP_DIR: &str = "resonate";
const STORE_FILE: &str = "preferences.json";
const RECENT_CAP: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikedSong {
    pub track: Track,
    pub liked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Preferences {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_volume")]
    pub volume: u32,
    #[serde(default)]
    pub liked: BTreeMap<String, LikedSong>,
    #[serde(default)]
    pub playlists: BTreeMap<String, Vec<Track>>,
    #[serde(default)]
    pub recently_played: Vec<Track>,
}

fn default_region() -> String {
    "US".to_string()
}

fn default_volume() -> u32 {
    100
}

pub struct Store {
    path: PathBuf,
    prefs: Preferences,
}

impl Store {
    /// Open (or create) the store under the user config directory.
    pub fn open() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Store("no config directory".into()))?
            .join(APP_DIR);
        fs::create_dir_all(&dir)?;
        Self::open_at(dir.join(STORE_FILE))
    }

    pub fn open_at(path: PathBuf) -> Result<Self> {
        let prefs = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(error = %e, "preferences unreadable, starting fresh");
                Preferences {
                    region: default_region(),
                    volume: default_volume(),
                    ..Preferences::default()
                }
            }),
            Err(_) => Preferences {
                region: default_region(),
                volume: default_volume(),
                ..Preferences::default()
            },
        };
        Ok(Store { path, prefs })
    }

    fn save(&self) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.prefs)?;
        fs::write(&self.path, text)?;
        Ok(())
    }

    /// Persist, logging instead of propagating: preference writes are
    /// best-effort and must never interrupt playback.
    fn save_quietly(&self) {
        if let Err(e) = self.save() {
            warn!(error = %e, "failed to save preferences");
        }
    }

    // ==========================================
    // LIKES
    // ==========================================

    pub fn is_liked(&self, id: &str) -> bool {
        self.prefs.liked.contains_key(id)
    }

    /// Toggle the liked state of a track. Returns the new state.
    pub fn toggle_liked(&mut self, track: &Track) -> bool {
        let liked = if self.prefs.liked.remove(&track.id).is_some() {
            false
        } else {
            self.prefs.liked.insert(
                track.id.clone(),
                LikedSong {
                    track: track.clone(),
                    liked_at: Utc::now(),
                },
            );
            true
        };
        self.save_quietly();
        liked
    }

    pub fn liked_songs(&self) -> impl Iterator<Item = &LikedSong> {
        self.prefs.liked.values()
    }

    // ==========================================
    // PLAYLISTS
    // ==========================================

    pub fn add_to_playlist(&mut self, name: &str, track: Track) {
        let tracks = self.prefs.playlists.entry(name.to_string()).or_default();
        if !tracks.iter().any(|t| t.id == track.id) {
            tracks.push(track);
        }
        self.save_quietly();
    }

    pub fn playlist(&self, name: &str) -> Option<&[Track]> {
        self.prefs.playlists.get(name).map(Vec::as_slice)
    }

    pub fn playlist_names(&self) -> impl Iterator<Item = &str> {
        self.prefs.playlists.keys().map(String::as_str)
    }

    // ==========================================
    // RECENTLY PLAYED / SETTINGS
    // ==========================================

    pub fn record_recent(&mut self, track: &Track) {
        self.prefs.recently_played.retain(|t| t.id != track.id);
        self.prefs.recently_played.insert(0, track.clone());
        self.prefs.recently_played.truncate(RECENT_CAP);
        self.save_quietly();
    }

    pub fn recently_played(&self) -> &[Track] {
        &self.prefs.recently_played
    }

    pub fn region(&self) -> &str {
        &self.prefs.region
    }

    pub fn volume(&self) -> u32 {
        self.prefs.volume
    }

    pub fn set_volume(&mut self, volume: u32) {
        self.prefs.volume = volume.min(100);
        self.save_quietly();
    }
}
