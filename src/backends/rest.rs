//! REST backend adapter implementation.
//!
//! Speaks the mini-app API: JSON over HTTP with an opaque identity token
//! forwarded verbatim on every request.

use std::time::Duration;

use serde_json::{json, Value};

use crate::backends::{MediaBackend, TrackResolver};
use crate::protocol::{
    FavoriteFlip, Playlist, PlaylistSummary, StatsSummary, StreamGrant, Track, TrackFilters,
    TrackPage,
};

/// Header carrying the opaque identity credential. The adapter never
/// inspects its contents.
const IDENTITY_HEADER: &str = "X-Identity-Token";

/// REST adapter backed by `ureq`.
pub struct RestBackendAdapter {
    http_client: ureq::Agent,
    endpoint: String,
    identity_token: String,
}

impl RestBackendAdapter {
    /// Creates an adapter for the API rooted at `endpoint`
    /// (e.g. `https://media.example.com/api`).
    pub fn new(endpoint: &str, identity_token: &str) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(15))
            .timeout_write(Duration::from_secs(15))
            .build();
        Self {
            http_client,
            endpoint: endpoint.trim().trim_end_matches('/').to_string(),
            identity_token: identity_token.to_string(),
        }
    }

    fn api_url(&self, path: &str, params: &[(String, String)]) -> String {
        let mut url = format!("{}{}", self.endpoint, path);
        if !params.is_empty() {
            let query: Vec<String> = params
                .iter()
                .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
                .collect();
            url.push('?');
            url.push_str(&query.join("&"));
        }
        url
    }

    fn get_json(&self, path: &str, params: &[(String, String)]) -> Result<Value, String> {
        let url = self.api_url(path, params);
        let response = self
            .http_client
            .get(&url)
            .set(IDENTITY_HEADER, &self.identity_token)
            .call()
            .map_err(|err| format!("backend request failed (GET {path}): {err}"))?;
        response
            .into_json()
            .map_err(|err| format!("backend response parse failed (GET {path}): {err}"))
    }

    fn send_json(&self, method: &str, path: &str, body: Option<Value>) -> Result<Value, String> {
        let url = self.api_url(path, &[]);
        let request = self
            .http_client
            .request(method, &url)
            .set(IDENTITY_HEADER, &self.identity_token);
        let response = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        }
        .map_err(|err| format!("backend request failed ({method} {path}): {err}"))?;
        response
            .into_json()
            .map_err(|err| format!("backend response parse failed ({method} {path}): {err}"))
    }

    fn delete(&self, path: &str) -> Result<(), String> {
        let url = self.api_url(path, &[]);
        self.http_client
            .delete(&url)
            .set(IDENTITY_HEADER, &self.identity_token)
            .call()
            .map_err(|err| format!("backend request failed (DELETE {path}): {err}"))?;
        Ok(())
    }

    fn filter_params(filters: &TrackFilters) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(limit) = filters.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = filters.offset {
            params.push(("offset".to_string(), offset.to_string()));
        }
        if let Some(search) = filters
            .search
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            params.push(("search".to_string(), search.to_string()));
        }
        params
    }

    // Track ids travel as integers on the wire where possible; ids from
    // other deployments stay strings.
    fn id_value(track_id: &str) -> Value {
        track_id
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(track_id))
    }

    fn string_field(value: &Value, key: &str) -> Option<String> {
        value.get(key).map(|field| {
            field
                .as_i64()
                .map(|number| number.to_string())
                .or_else(|| field.as_str().map(ToOwned::to_owned))
                .unwrap_or_default()
        })
    }

    fn parse_track(value: &Value) -> Option<Track> {
        let id = Self::string_field(value, "id").filter(|id| !id.is_empty())?;
        let title = value
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Unknown Title")
            .to_string();
        let artist = value
            .get("artist")
            .and_then(Value::as_str)
            .unwrap_or("Unknown Artist")
            .to_string();
        let album = value
            .get("album")
            .and_then(Value::as_str)
            .unwrap_or("Unknown Album")
            .to_string();
        let thumbnail_url = value
            .get("thumbnail_url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(ToOwned::to_owned);
        let duration_ms = value
            .get("duration")
            .and_then(Value::as_u64)
            .map(|seconds| seconds * 1000);
        Some(Track {
            id,
            title,
            artist,
            album,
            thumbnail_url,
            duration_ms,
        })
    }

    fn parse_track_page(payload: &Value) -> TrackPage {
        let items = payload
            .get("items")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Self::parse_track).collect())
            .unwrap_or_default();
        let total = payload.get("total").and_then(Value::as_u64).unwrap_or(0);
        TrackPage { items, total }
    }

    fn parse_favorite_page(payload: &Value) -> TrackPage {
        let items = payload
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|entry| entry.get("audio"))
                    .filter_map(Self::parse_track)
                    .collect()
            })
            .unwrap_or_default();
        let total = payload.get("total").and_then(Value::as_u64).unwrap_or(0);
        TrackPage { items, total }
    }

    fn parse_stream_grant(payload: &Value) -> Result<StreamGrant, String> {
        let url = payload
            .get("url")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or_else(|| "stream grant payload missing url".to_string())?;
        let expires_in_secs = payload
            .get("expires_in")
            .and_then(Value::as_u64)
            .unwrap_or(3600);
        Ok(StreamGrant {
            url,
            expires_in_secs,
        })
    }

    fn parse_playlist_summary(value: &Value) -> Option<PlaylistSummary> {
        let id = Self::string_field(value, "id").filter(|id| !id.is_empty())?;
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("Untitled Playlist")
            .to_string();
        let description = value
            .get("description")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned);
        let track_count = value
            .get("track_count")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Some(PlaylistSummary {
            id,
            name,
            description,
            track_count,
        })
    }
}

impl TrackResolver for RestBackendAdapter {
    fn resolve_stream_url(&self, track_id: &str) -> Result<StreamGrant, String> {
        let payload = self.get_json(&format!("/audio/{track_id}/stream-url"), &[])?;
        Self::parse_stream_grant(&payload)
    }

    fn refresh_stream_url(&self, track_id: &str) -> Result<StreamGrant, String> {
        let payload = self.send_json("POST", &format!("/audio/{track_id}/refresh-url"), None)?;
        Self::parse_stream_grant(&payload)
    }
}

impl MediaBackend for RestBackendAdapter {
    fn list_tracks(&self, filters: &TrackFilters) -> Result<TrackPage, String> {
        let payload = self.get_json("/audio", &Self::filter_params(filters))?;
        Ok(Self::parse_track_page(&payload))
    }

    fn get_track(&self, track_id: &str) -> Result<Track, String> {
        let payload = self.get_json(&format!("/audio/{track_id}"), &[])?;
        Self::parse_track(&payload)
            .ok_or_else(|| format!("track payload for {track_id} missing id"))
    }

    fn delete_track(&self, track_id: &str) -> Result<(), String> {
        self.delete(&format!("/audio/{track_id}"))
    }

    fn list_playlists(&self) -> Result<Vec<PlaylistSummary>, String> {
        let payload = self.get_json("/playlists", &[])?;
        Ok(payload
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Self::parse_playlist_summary)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get_playlist(&self, playlist_id: &str) -> Result<Playlist, String> {
        let payload = self.get_json(&format!("/playlists/{playlist_id}"), &[])?;
        let summary = Self::parse_playlist_summary(&payload)
            .ok_or_else(|| format!("playlist payload for {playlist_id} missing id"))?;
        let tracks = payload
            .get("tracks")
            .and_then(Value::as_array)
            .map(|tracks| tracks.iter().filter_map(Self::parse_track).collect())
            .unwrap_or_default();
        Ok(Playlist { summary, tracks })
    }

    fn create_playlist(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<PlaylistSummary, String> {
        let trimmed_name = name.trim();
        if trimmed_name.is_empty() {
            return Err("playlist name cannot be empty".to_string());
        }
        let mut body = json!({ "name": trimmed_name });
        if let Some(description) = description {
            body["description"] = Value::from(description);
        }
        let payload = self.send_json("POST", "/playlists", Some(body))?;
        Self::parse_playlist_summary(&payload)
            .ok_or_else(|| "createPlaylist response missing playlist id".to_string())
    }

    fn update_playlist(
        &self,
        playlist_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<PlaylistSummary, String> {
        let mut body = json!({});
        if let Some(name) = name {
            body["name"] = Value::from(name);
        }
        if let Some(description) = description {
            body["description"] = Value::from(description);
        }
        let payload =
            self.send_json("PATCH", &format!("/playlists/{playlist_id}"), Some(body))?;
        Self::parse_playlist_summary(&payload)
            .ok_or_else(|| "updatePlaylist response missing playlist id".to_string())
    }

    fn delete_playlist(&self, playlist_id: &str) -> Result<(), String> {
        self.delete(&format!("/playlists/{playlist_id}"))
    }

    fn add_track_to_playlist(&self, playlist_id: &str, track_id: &str) -> Result<(), String> {
        let body = json!({ "audio_id": Self::id_value(track_id) });
        let _ = self.send_json("POST", &format!("/playlists/{playlist_id}/tracks"), Some(body))?;
        Ok(())
    }

    fn remove_track_from_playlist(
        &self,
        playlist_id: &str,
        track_id: &str,
    ) -> Result<(), String> {
        self.delete(&format!("/playlists/{playlist_id}/tracks/{track_id}"))
    }

    fn list_favorites(&self, filters: &TrackFilters) -> Result<TrackPage, String> {
        let payload = self.get_json("/favorites", &Self::filter_params(filters))?;
        Ok(Self::parse_favorite_page(&payload))
    }

    fn toggle_favorite(&self, track_id: &str) -> Result<FavoriteFlip, String> {
        let body = json!({ "audio_id": Self::id_value(track_id) });
        let payload = self.send_json("POST", "/favorites/toggle", Some(body))?;
        let is_favorite = payload
            .get("is_favorite")
            .and_then(Value::as_bool)
            .ok_or_else(|| "toggleFavorite response missing is_favorite".to_string())?;
        let track_id = Self::string_field(&payload, "audio_id")
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| track_id.to_string());
        Ok(FavoriteFlip {
            track_id,
            is_favorite,
        })
    }

    fn stats(&self) -> Result<StatsSummary, String> {
        let payload = self.get_json("/stats", &[])?;
        Ok(StatsSummary {
            total_tracks: payload
                .get("total_tracks")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            total_playlists: payload
                .get("total_playlists")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            total_favorites: payload
                .get("total_favorites")
                .and_then(Value::as_u64)
                .unwrap_or(0),
        })
    }
}
