// ==========================================
// CATALOG SERVICE BOUNDARY
// ==========================================
// Search, browse, and "related tracks" come from a remote catalog that
// returns loosely shaped JSON (the artist field in particular is
// sometimes a bare string, sometimes a list). Everything is normalized
// into `Track` right here; the player core never sees a raw payload.

mod remote;

pub use remote::RemoteCatalog;

use serde_json::Value;

use crate::error::Result;
use crate::resolver::BoxFuture;
use crate::track::{Thumbnail, Track, TrackKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Album,
    Playlist,
}

impl CollectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Album => "album",
            CollectionKind::Playlist => "playlist",
        }
    }
}

/// An album or playlist as it appears in search results.
#[derive(Debug, Clone)]
pub struct CollectionSummary {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub kind: CollectionKind,
}

#[derive(Debug, Clone)]
pub struct CollectionDetails {
    pub title: String,
    pub artist: String,
    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub songs: Vec<Track>,
    pub collections: Vec<CollectionSummary>,
}

pub trait Catalog: Send + Sync {
    fn search(&self, query: &str, region: &str) -> BoxFuture<Result<SearchResults>>;
    /// "Play next" candidates for a track. Best-effort; callers fail
    /// open on error.
    fn related(&self, track_id: &str, region: &str) -> BoxFuture<Result<Vec<Track>>>;
    fn collection_details(
        &self,
        id: &str,
        kind: CollectionKind,
        region: &str,
    ) -> BoxFuture<Result<CollectionDetails>>;
}

// ==========================================
// PAYLOAD NORMALIZATION
// ==========================================

/// Artist fields arrive as a bare string, a list of strings, or a list
/// of `{ "name": ... }` objects. Always produce a list.
fn normalize_artists(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(_) => item["name"].as_str().map(str::to_string),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Durations arrive as integer seconds or as "m:ss" / "h:mm:ss" text.
fn normalize_duration(value: &Value) -> u64 {
    if let Some(n) = value.as_u64() {
        return n;
    }
    let Some(text) = value.as_str() else {
        return 0;
    };
    text.split(':')
        .filter_map(|part| part.trim().parse::<u64>().ok())
        .fold(0, |total, part| total * 60 + part)
}

fn normalize_thumbnails(value: &Value) -> Vec<Thumbnail> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            Some(Thumbnail {
                url: item["url"].as_str()?.to_string(),
                width: item["width"].as_u64().unwrap_or(0) as u32,
                height: item["height"].as_u64().unwrap_or(0) as u32,
            })
        })
        .collect()
}

/// Build a `Track` from one catalog entry. Entries without a usable id
/// or title are dropped.
pub(crate) fn normalize_track(value: &Value) -> Option<Track> {
    let id = value["videoId"]
        .as_str()
        .or_else(|| value["id"].as_str())?
        .to_string();
    let title = value["title"].as_str()?.to_string();

    let artists = if value["artists"].is_null() {
        normalize_artists(&value["artist"])
    } else {
        normalize_artists(&value["artists"])
    };

    let album = value["album"]
        .as_str()
        .map(str::to_string)
        .or_else(|| value["album"]["name"].as_str().map(str::to_string));

    let kind = match value["type"].as_str() {
        Some("video") => TrackKind::Video,
        _ => TrackKind::Song,
    };

    Some(Track {
        id,
        title,
        artists,
        album,
        duration: normalize_duration(&value["duration"]),
        thumbnails: normalize_thumbnails(&value["thumbnails"]),
        kind,
    })
}

pub(crate) fn normalize_tracks(value: &Value) -> Vec<Track> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(normalize_track).collect())
        .unwrap_or_default()
}
