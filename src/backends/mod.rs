//! Backend adapter abstractions and concrete implementations.

pub mod rest;

use crate::protocol::{
    FavoriteFlip, Playlist, PlaylistSummary, StatsSummary, StreamGrant, Track, TrackFilters,
    TrackPage,
};

/// Resolves short-lived stream URLs for playable tracks.
pub trait TrackResolver: Send + Sync {
    fn resolve_stream_url(&self, track_id: &str) -> Result<StreamGrant, String>;
    /// Forces the backend to issue a freshly signed URL.
    fn refresh_stream_url(&self, track_id: &str) -> Result<StreamGrant, String>;
}

/// Interface to the library/playlist/favorite surface of the backend.
pub trait MediaBackend: Send + Sync {
    fn list_tracks(&self, filters: &TrackFilters) -> Result<TrackPage, String>;
    fn get_track(&self, track_id: &str) -> Result<Track, String>;
    fn delete_track(&self, track_id: &str) -> Result<(), String>;
    fn list_playlists(&self) -> Result<Vec<PlaylistSummary>, String>;
    fn get_playlist(&self, playlist_id: &str) -> Result<Playlist, String>;
    fn create_playlist(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<PlaylistSummary, String>;
    fn update_playlist(
        &self,
        playlist_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<PlaylistSummary, String>;
    fn delete_playlist(&self, playlist_id: &str) -> Result<(), String>;
    fn add_track_to_playlist(&self, playlist_id: &str, track_id: &str) -> Result<(), String>;
    fn remove_track_from_playlist(&self, playlist_id: &str, track_id: &str)
        -> Result<(), String>;
    fn list_favorites(&self, filters: &TrackFilters) -> Result<TrackPage, String>;
    fn toggle_favorite(&self, track_id: &str) -> Result<FavoriteFlip, String>;
    fn stats(&self) -> Result<StatsSummary, String>;
}
