//! Backend runtime coordinator.
//!
//! This manager is the bus-owned gateway to the REST backend: library and
//! favorite listings, playlist contents, favorite toggles, deletions, and
//! usage stats. Requests arrive as bus messages and results fan back out as
//! notifications, so no other component talks to the backend directly.

use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::broadcast::{Receiver, Sender};

use crate::backends::MediaBackend;
use crate::protocol::{BackendMessage, Message, TrackFilters};

/// Services backend requests arriving on the event bus.
pub struct BackendManager {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    backend: Arc<dyn MediaBackend>,
}

impl BackendManager {
    /// Creates a manager bound to bus channels and a backend adapter.
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        backend: Arc<dyn MediaBackend>,
    ) -> Self {
        Self {
            bus_consumer,
            bus_producer,
            backend,
        }
    }

    fn emit(&self, message: BackendMessage) {
        let _ = self.bus_producer.send(Message::Backend(message));
    }

    fn emit_operation_failed(&self, action: &str, error: String) {
        warn!("BackendManager: {} failed: {}", action, error);
        self.emit(BackendMessage::OperationFailed {
            action: action.to_string(),
            error,
        });
    }

    fn load_tracks(&self, filters: TrackFilters) {
        match self.backend.list_tracks(&filters) {
            Ok(page) => {
                debug!(
                    "BackendManager: loaded {} of {} tracks",
                    page.items.len(),
                    page.total
                );
                self.emit(BackendMessage::TracksLoaded(page));
            }
            Err(error) => self.emit_operation_failed("list_tracks", error),
        }
    }

    fn load_playlists(&self) {
        match self.backend.list_playlists() {
            Ok(playlists) => self.emit(BackendMessage::PlaylistsLoaded(playlists)),
            Err(error) => self.emit_operation_failed("list_playlists", error),
        }
    }

    fn load_playlist(&self, playlist_id: &str) {
        match self.backend.get_playlist(playlist_id) {
            Ok(playlist) => self.emit(BackendMessage::PlaylistLoaded(playlist)),
            Err(error) => self.emit_operation_failed("get_playlist", error),
        }
    }

    fn load_track(&self, track_id: &str) {
        match self.backend.get_track(track_id) {
            Ok(track) => self.emit(BackendMessage::TrackLoaded(track)),
            Err(error) => self.emit_operation_failed("get_track", error),
        }
    }

    fn create_playlist(&self, name: &str, description: Option<&str>) {
        match self.backend.create_playlist(name, description) {
            Ok(summary) => self.emit(BackendMessage::PlaylistCreated(summary)),
            Err(error) => self.emit_operation_failed("create_playlist", error),
        }
    }

    fn update_playlist(&self, playlist_id: &str, name: Option<&str>, description: Option<&str>) {
        match self.backend.update_playlist(playlist_id, name, description) {
            Ok(summary) => self.emit(BackendMessage::PlaylistUpdated(summary)),
            Err(error) => self.emit_operation_failed("update_playlist", error),
        }
    }

    fn delete_playlist(&self, playlist_id: &str) {
        match self.backend.delete_playlist(playlist_id) {
            Ok(()) => self.emit(BackendMessage::PlaylistDeleted(playlist_id.to_string())),
            Err(error) => self.emit_operation_failed("delete_playlist", error),
        }
    }

    fn add_track_to_playlist(&self, playlist_id: &str, track_id: &str) {
        match self.backend.add_track_to_playlist(playlist_id, track_id) {
            Ok(()) => self.emit(BackendMessage::PlaylistTracksChanged(
                playlist_id.to_string(),
            )),
            Err(error) => self.emit_operation_failed("add_track_to_playlist", error),
        }
    }

    fn remove_track_from_playlist(&self, playlist_id: &str, track_id: &str) {
        match self.backend.remove_track_from_playlist(playlist_id, track_id) {
            Ok(()) => self.emit(BackendMessage::PlaylistTracksChanged(
                playlist_id.to_string(),
            )),
            Err(error) => self.emit_operation_failed("remove_track_from_playlist", error),
        }
    }

    fn load_favorites(&self, filters: TrackFilters) {
        match self.backend.list_favorites(&filters) {
            Ok(page) => self.emit(BackendMessage::FavoritesLoaded(page)),
            Err(error) => self.emit_operation_failed("list_favorites", error),
        }
    }

    fn toggle_favorite(&self, track_id: &str) {
        match self.backend.toggle_favorite(track_id) {
            Ok(flip) => self.emit(BackendMessage::FavoriteToggled(flip)),
            Err(error) => self.emit_operation_failed("toggle_favorite", error),
        }
    }

    fn delete_track(&self, track_id: &str) {
        match self.backend.delete_track(track_id) {
            Ok(()) => self.emit(BackendMessage::TrackDeleted(track_id.to_string())),
            Err(error) => self.emit_operation_failed("delete_track", error),
        }
    }

    fn load_stats(&self) {
        match self.backend.stats() {
            Ok(stats) => self.emit(BackendMessage::StatsLoaded(stats)),
            Err(error) => self.emit_operation_failed("stats", error),
        }
    }

    fn handle_message(&mut self, message: Message) {
        let Message::Backend(request) = message else {
            return;
        };
        match request {
            BackendMessage::RequestTracks(filters) => self.load_tracks(filters),
            BackendMessage::RequestTrack(track_id) => self.load_track(&track_id),
            BackendMessage::RequestPlaylists => self.load_playlists(),
            BackendMessage::RequestPlaylist(playlist_id) => self.load_playlist(&playlist_id),
            BackendMessage::CreatePlaylist { name, description } => {
                self.create_playlist(&name, description.as_deref())
            }
            BackendMessage::UpdatePlaylist {
                playlist_id,
                name,
                description,
            } => self.update_playlist(&playlist_id, name.as_deref(), description.as_deref()),
            BackendMessage::DeletePlaylist(playlist_id) => self.delete_playlist(&playlist_id),
            BackendMessage::AddTrackToPlaylist {
                playlist_id,
                track_id,
            } => self.add_track_to_playlist(&playlist_id, &track_id),
            BackendMessage::RemoveTrackFromPlaylist {
                playlist_id,
                track_id,
            } => self.remove_track_from_playlist(&playlist_id, &track_id),
            BackendMessage::RequestFavorites(filters) => self.load_favorites(filters),
            BackendMessage::ToggleFavorite(track_id) => self.toggle_favorite(&track_id),
            BackendMessage::DeleteTrack(track_id) => self.delete_track(&track_id),
            BackendMessage::RequestStats => self.load_stats(),
            // Notifications emitted by this manager; nothing to do.
            BackendMessage::TracksLoaded(_)
            | BackendMessage::TrackLoaded(_)
            | BackendMessage::PlaylistsLoaded(_)
            | BackendMessage::PlaylistLoaded(_)
            | BackendMessage::PlaylistCreated(_)
            | BackendMessage::PlaylistUpdated(_)
            | BackendMessage::PlaylistDeleted(_)
            | BackendMessage::PlaylistTracksChanged(_)
            | BackendMessage::FavoritesLoaded(_)
            | BackendMessage::FavoriteToggled(_)
            | BackendMessage::TrackDeleted(_)
            | BackendMessage::StatsLoaded(_)
            | BackendMessage::OperationFailed { .. } => {}
        }
    }

    /// Starts the blocking manager loop.
    pub fn run(&mut self) {
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(message) => self.handle_message(message),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("BackendManager: bus lagged by {} messages", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::broadcast;

    use super::BackendManager;
    use crate::backends::MediaBackend;
    use crate::protocol::{
        BackendMessage, FavoriteFlip, Message, Playlist, PlaylistSummary, StatsSummary, Track,
        TrackFilters, TrackPage,
    };

    struct StubBackend {
        fail: bool,
    }

    fn sample_track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            title: format!("Title {id}"),
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            thumbnail_url: None,
            duration_ms: Some(120_000),
        }
    }

    impl MediaBackend for StubBackend {
        fn list_tracks(&self, filters: &TrackFilters) -> Result<TrackPage, String> {
            if self.fail {
                return Err("backend unreachable".to_string());
            }
            let limit = filters.limit.unwrap_or(50) as usize;
            Ok(TrackPage {
                items: (0..limit.min(2))
                    .map(|index| sample_track(&index.to_string()))
                    .collect(),
                total: 2,
            })
        }

        fn get_track(&self, track_id: &str) -> Result<Track, String> {
            Ok(sample_track(track_id))
        }

        fn delete_track(&self, _track_id: &str) -> Result<(), String> {
            if self.fail {
                return Err("backend unreachable".to_string());
            }
            Ok(())
        }

        fn list_playlists(&self) -> Result<Vec<PlaylistSummary>, String> {
            Ok(vec![PlaylistSummary {
                id: "p1".to_string(),
                name: "Morning".to_string(),
                description: None,
                track_count: 2,
            }])
        }

        fn get_playlist(&self, playlist_id: &str) -> Result<Playlist, String> {
            Ok(Playlist {
                summary: PlaylistSummary {
                    id: playlist_id.to_string(),
                    name: "Morning".to_string(),
                    description: None,
                    track_count: 1,
                },
                tracks: vec![sample_track("1")],
            })
        }

        fn create_playlist(
            &self,
            name: &str,
            _description: Option<&str>,
        ) -> Result<PlaylistSummary, String> {
            Ok(PlaylistSummary {
                id: "new".to_string(),
                name: name.to_string(),
                description: None,
                track_count: 0,
            })
        }

        fn update_playlist(
            &self,
            playlist_id: &str,
            name: Option<&str>,
            _description: Option<&str>,
        ) -> Result<PlaylistSummary, String> {
            Ok(PlaylistSummary {
                id: playlist_id.to_string(),
                name: name.unwrap_or("Morning").to_string(),
                description: None,
                track_count: 0,
            })
        }

        fn delete_playlist(&self, _playlist_id: &str) -> Result<(), String> {
            Ok(())
        }

        fn add_track_to_playlist(&self, _playlist_id: &str, _track_id: &str) -> Result<(), String> {
            Ok(())
        }

        fn remove_track_from_playlist(
            &self,
            _playlist_id: &str,
            _track_id: &str,
        ) -> Result<(), String> {
            Ok(())
        }

        fn list_favorites(&self, _filters: &TrackFilters) -> Result<TrackPage, String> {
            Ok(TrackPage {
                items: vec![sample_track("fav")],
                total: 1,
            })
        }

        fn toggle_favorite(&self, track_id: &str) -> Result<FavoriteFlip, String> {
            Ok(FavoriteFlip {
                track_id: track_id.to_string(),
                is_favorite: true,
            })
        }

        fn stats(&self) -> Result<StatsSummary, String> {
            Ok(StatsSummary {
                total_tracks: 12,
                total_playlists: 3,
                total_favorites: 5,
            })
        }
    }

    fn manager_with(
        fail: bool,
    ) -> (BackendManager, broadcast::Receiver<Message>) {
        let (bus_sender, _) = broadcast::channel(32);
        let observer = bus_sender.subscribe();
        let manager = BackendManager::new(
            bus_sender.subscribe(),
            bus_sender.clone(),
            Arc::new(StubBackend { fail }),
        );
        (manager, observer)
    }

    #[test]
    fn test_request_tracks_emits_loaded_page() {
        let (mut manager, mut observer) = manager_with(false);
        manager.handle_message(Message::Backend(BackendMessage::RequestTracks(
            TrackFilters::default(),
        )));

        let message = observer.try_recv().expect("result should be emitted");
        let Message::Backend(BackendMessage::TracksLoaded(page)) = message else {
            panic!("unexpected message emitted by backend manager");
        };
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 2);
    }

    #[test]
    fn test_failed_request_emits_operation_failed() {
        let (mut manager, mut observer) = manager_with(true);
        manager.handle_message(Message::Backend(BackendMessage::RequestTracks(
            TrackFilters::default(),
        )));

        let message = observer.try_recv().expect("failure should be emitted");
        let Message::Backend(BackendMessage::OperationFailed { action, error }) = message else {
            panic!("unexpected message emitted by backend manager");
        };
        assert_eq!(action, "list_tracks");
        assert!(error.contains("unreachable"));
    }

    #[test]
    fn test_toggle_favorite_reports_flip() {
        let (mut manager, mut observer) = manager_with(false);
        manager.handle_message(Message::Backend(BackendMessage::ToggleFavorite(
            "42".to_string(),
        )));

        let message = observer.try_recv().expect("flip should be emitted");
        let Message::Backend(BackendMessage::FavoriteToggled(flip)) = message else {
            panic!("unexpected message emitted by backend manager");
        };
        assert_eq!(flip.track_id, "42");
        assert!(flip.is_favorite);
    }

    #[test]
    fn test_playlist_request_round_trips() {
        let (mut manager, mut observer) = manager_with(false);
        manager.handle_message(Message::Backend(BackendMessage::RequestPlaylist(
            "p1".to_string(),
        )));

        let message = observer.try_recv().expect("playlist should be emitted");
        let Message::Backend(BackendMessage::PlaylistLoaded(playlist)) = message else {
            panic!("unexpected message emitted by backend manager");
        };
        assert_eq!(playlist.summary.id, "p1");
        assert_eq!(playlist.tracks.len(), 1);
    }

    #[test]
    fn test_create_playlist_reports_new_summary() {
        let (mut manager, mut observer) = manager_with(false);
        manager.handle_message(Message::Backend(BackendMessage::CreatePlaylist {
            name: "Evening".to_string(),
            description: None,
        }));

        let message = observer.try_recv().expect("summary should be emitted");
        let Message::Backend(BackendMessage::PlaylistCreated(summary)) = message else {
            panic!("unexpected message emitted by backend manager");
        };
        assert_eq!(summary.name, "Evening");
    }

    #[test]
    fn test_playlist_membership_change_notifies_playlist_id() {
        let (mut manager, mut observer) = manager_with(false);
        manager.handle_message(Message::Backend(BackendMessage::AddTrackToPlaylist {
            playlist_id: "p1".to_string(),
            track_id: "42".to_string(),
        }));
        manager.handle_message(Message::Backend(BackendMessage::RemoveTrackFromPlaylist {
            playlist_id: "p1".to_string(),
            track_id: "42".to_string(),
        }));

        for _ in 0..2 {
            let message = observer.try_recv().expect("change should be emitted");
            let Message::Backend(BackendMessage::PlaylistTracksChanged(playlist_id)) = message
            else {
                panic!("unexpected message emitted by backend manager");
            };
            assert_eq!(playlist_id, "p1");
        }
    }

    #[test]
    fn test_notifications_are_ignored() {
        let (mut manager, mut observer) = manager_with(false);
        manager.handle_message(Message::Backend(BackendMessage::StatsLoaded(
            StatsSummary {
                total_tracks: 0,
                total_playlists: 0,
                total_favorites: 0,
            },
        )));
        assert!(observer.try_recv().is_err());
    }
}
