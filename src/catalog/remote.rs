// HTTP catalog client. Thin request/response glue over reqwest; all
// shaping of the loose payloads happens in the parent module.

use serde_json::Value;

use super::{
    normalize_tracks, Catalog, CollectionDetails, CollectionKind, CollectionSummary,
    SearchResults,
};
use crate::error::{Error, Result};
use crate::resolver::BoxFuture;
use crate::track::Track;

const DEFAULT_BASE_URL: &str = "https://music-api.invidious.io/v1";

pub struct RemoteCatalog {
    base_url: String,
    http: reqwest::Client,
}

impl RemoteCatalog {
    pub fn new(base_url: Option<String>) -> Self {
        RemoteCatalog {
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            http: reqwest::Client::new(),
        }
    }

    async fn get_json(
        http: reqwest::Client,
        url: String,
        query: Vec<(&'static str, String)>,
    ) -> Result<Value> {
        let response = http.get(&url).query(&query).send().await?;
        if !response.status().is_success() {
            return Err(Error::Catalog(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    fn parse_search(payload: &Value) -> SearchResults {
        let songs = normalize_tracks(&payload["songs"]);
        let collections = payload["collections"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        Some(CollectionSummary {
                            id: item["id"].as_str()?.to_string(),
                            title: item["title"].as_str()?.to_string(),
                            artist: item["artist"].as_str().unwrap_or("").to_string(),
                            kind: match item["kind"].as_str() {
                                Some("playlist") => CollectionKind::Playlist,
                                _ => CollectionKind::Album,
                            },
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        SearchResults { songs, collections }
    }
}

impl Catalog for RemoteCatalog {
    fn search(&self, query: &str, region: &str) -> BoxFuture<Result<SearchResults>> {
        let url = format!("{}/search", self.base_url);
        let params = vec![("q", query.to_string()), ("region", region.to_string())];
        let http = self.http.clone();
        Box::pin(async move {
            let payload = Self::get_json(http, url, params).await?;
            Ok(Self::parse_search(&payload))
        })
    }

    fn related(&self, track_id: &str, region: &str) -> BoxFuture<Result<Vec<Track>>> {
        let url = format!("{}/related/{}", self.base_url, track_id);
        let params = vec![("region", region.to_string())];
        let http = self.http.clone();
        Box::pin(async move {
            let payload = Self::get_json(http, url, params).await?;
            Ok(normalize_tracks(&payload["tracks"]))
        })
    }

    fn collection_details(
        &self,
        id: &str,
        kind: CollectionKind,
        region: &str,
    ) -> BoxFuture<Result<CollectionDetails>> {
        let url = format!("{}/collection/{}", self.base_url, id);
        let params = vec![
            ("kind", kind.as_str().to_string()),
            ("region", region.to_string()),
        ];
        let http = self.http.clone();
        Box::pin(async move {
            let payload = Self::get_json(http, url, params).await?;
            Ok(CollectionDetails {
                title: payload["title"].as_str().unwrap_or("").to_string(),
                artist: payload["artist"].as_str().unwrap_or("").to_string(),
                tracks: normalize_tracks(&payload["tracks"]),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_payload_splits_songs_and_collections() {
        let results = RemoteCatalog::parse_search(&json!({
            "songs": [
                {"videoId": "s1", "title": "Song", "artist": "A", "duration": 100}
            ],
            "collections": [
                {"id": "c1", "title": "Album", "artist": "A", "kind": "album"},
                {"id": "c2", "title": "Mix", "kind": "playlist"}
            ]
        }));
        assert_eq!(results.songs.len(), 1);
        assert_eq!(results.collections.len(), 2);
        assert_eq!(results.collections[1].kind, CollectionKind::Playlist);
    }

    #[test]
    fn query_parameters_are_encoded_by_the_client() {
        let request = reqwest::Client::new()
            .get("http://catalog.test/v1/search")
            .query(&[("q", "a b&c"), ("region", "US")])
            .build()
            .unwrap();
        assert_eq!(request.url().query(), Some("q=a+b%26c&region=US"));
    }
}
