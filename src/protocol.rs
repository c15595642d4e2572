//! Event-bus protocol shared by all runtime components.
//!
//! This module defines all message payloads exchanged between the player,
//! the backend coordinator, the media engine, and the OS media controls
//! bridge.

/// Repeat behavior applied when a track ends or navigation crosses the
/// queue boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    #[default]
    Off, // Stop after reaching the end of the queue
    All, // Wrap around to the other end of the queue
    One, // Restart the current track
}

impl RepeatMode {
    /// Returns the next mode in the `Off -> All -> One -> Off` cycle.
    pub fn next(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::All,
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::Off,
        }
    }
}

/// Direction for queue navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Playback lifecycle state owned by the player manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No track bound; queue empty or cleared.
    Idle,
    /// A stream URL is resolving or the engine is buffering.
    Loading,
    Playing,
    Paused,
    /// The queue ran out with repeat off.
    Ended,
    /// Resolution or engine failure that was not recovered.
    Errored,
}

/// Immutable track metadata as delivered by the backend.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Track {
    /// Stable track id; identity for all queue and cache operations.
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Cover image URL, when the backend has one.
    pub thumbnail_url: Option<String>,
    /// Advertised duration in milliseconds, when known up front.
    pub duration_ms: Option<u64>,
}

/// Short-lived stream credential issued by the track resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamGrant {
    /// Signed, directly playable URL.
    pub url: String,
    /// Advertised validity window in seconds.
    pub expires_in_secs: u64,
}

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Player(PlayerMessage),
    Engine(EngineMessage),
    Backend(BackendMessage),
    Config(ConfigMessage),
}

/// Player-domain commands and notifications.
#[derive(Debug, Clone)]
pub enum PlayerMessage {
    /// Play a track, optionally binding a new queue around it.
    PlayTrack {
        track: Track,
        queue: Option<Vec<Track>>,
    },
    /// Play the queue entry at the given index.
    PlayAt(usize),
    TogglePlay,
    Pause,
    Resume,
    /// Pause and reset position to zero (OS transport "stop").
    Stop,
    Next,
    Previous,
    /// Seek to a percentage of the known duration, `0.0..=100.0`.
    SeekToPercent(f32),
    /// Seek to an absolute position in milliseconds.
    SeekToMs(u64),
    SetVolume(f32),
    ToggleMute,
    CycleRepeatMode,
    ToggleShuffle,
    /// Append to the end of the queue unless the id is already queued.
    QueueTrack(Track),
    /// Insert immediately after the current track ("play next").
    QueueTrackNext(Track),
    RemoveAt(usize),
    MoveTrack {
        from: usize,
        to: usize,
    },
    ClearQueue,
    /// Off-thread resolution result re-entering the player loop. Stale
    /// generations are discarded without touching state.
    StreamResolved {
        generation: u64,
        track_id: String,
        result: Result<String, String>,
    },

    /// The bound track changed (or cleared).
    NowPlayingChanged(Option<Track>),
    /// The playback state machine moved.
    StateChanged(PlaybackState),
    /// Throttled progress broadcast for the OS bridge.
    PlaybackProgress {
        elapsed_ms: u64,
        total_ms: u64,
    },
    /// Queue contents, pointer, or policy changed.
    QueueChanged(QueueSnapshot),
    /// Last absorbed playback failure, for observers that surface errors.
    PlaybackFailed(String),
}

/// Queue state broadcast after every mutation.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub tracks: Vec<Track>,
    pub position: usize,
    pub shuffled: bool,
    pub repeat_mode: RepeatMode,
}

/// Events emitted by the media engine. The player manager is the only
/// consumer that mutates state in response to these.
#[derive(Debug, Clone)]
pub enum EngineMessage {
    /// Source metadata became available.
    MetadataReady { duration_ms: u64 },
    /// Periodic position report while playing.
    TimeProgress { position_ms: u64 },
    Playing,
    Paused,
    /// The engine stalled waiting for data.
    BufferWait,
    /// Enough data buffered to (re)start.
    ReadyToPlay,
    /// The current source played to completion.
    Ended,
    /// The engine failed mid-playback (expired URL, network drop).
    PlaybackError(String),
}

/// Backend-domain requests and notifications serviced by the backend
/// manager.
#[derive(Debug, Clone)]
pub enum BackendMessage {
    RequestTracks(TrackFilters),
    TracksLoaded(TrackPage),
    RequestTrack(String),
    TrackLoaded(Track),
    RequestPlaylists,
    PlaylistsLoaded(Vec<PlaylistSummary>),
    RequestPlaylist(String),
    PlaylistLoaded(Playlist),
    CreatePlaylist {
        name: String,
        description: Option<String>,
    },
    PlaylistCreated(PlaylistSummary),
    UpdatePlaylist {
        playlist_id: String,
        name: Option<String>,
        description: Option<String>,
    },
    PlaylistUpdated(PlaylistSummary),
    DeletePlaylist(String),
    PlaylistDeleted(String),
    AddTrackToPlaylist {
        playlist_id: String,
        track_id: String,
    },
    RemoveTrackFromPlaylist {
        playlist_id: String,
        track_id: String,
    },
    /// A playlist's membership changed on the backend; interested views
    /// re-request its contents.
    PlaylistTracksChanged(String),
    RequestFavorites(TrackFilters),
    FavoritesLoaded(TrackPage),
    ToggleFavorite(String),
    FavoriteToggled(FavoriteFlip),
    DeleteTrack(String),
    TrackDeleted(String),
    RequestStats,
    StatsLoaded(StatsSummary),
    /// Any backend operation that failed, tagged with the action name.
    OperationFailed { action: String, error: String },
}

/// Paging and search filters for track/favorite listings.
#[derive(Debug, Clone, Default)]
pub struct TrackFilters {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub search: Option<String>,
}

/// One page of a track listing.
#[derive(Debug, Clone)]
pub struct TrackPage {
    pub items: Vec<Track>,
    pub total: u64,
}

/// Playlist header without track contents.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub track_count: u64,
}

/// Playlist with resolved track contents.
#[derive(Debug, Clone)]
pub struct Playlist {
    pub summary: PlaylistSummary,
    pub tracks: Vec<Track>,
}

/// Result of flipping a track's favorite flag.
#[derive(Debug, Clone, PartialEq)]
pub struct FavoriteFlip {
    pub track_id: String,
    pub is_favorite: bool,
}

/// Per-user library totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSummary {
    pub total_tracks: u64,
    pub total_playlists: u64,
    pub total_favorites: u64,
}

/// Runtime configuration updates.
#[derive(Debug, Clone)]
pub enum ConfigMessage {
    ConfigChanged(crate::config::Config),
}
