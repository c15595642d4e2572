//! Persistent application configuration model and defaults.

use crate::protocol::RepeatMode;

/// Root configuration persisted to `tunelet.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Backend endpoint and identity.
    pub backend: BackendConfig,
    #[serde(default)]
    /// Playback preferences restored between sessions.
    pub playback: PlaybackConfig,
}

/// Connection settings for the mini-app backend.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct BackendConfig {
    /// API root, e.g. `https://media.example.com/api`.
    #[serde(default)]
    pub endpoint: String,
    /// Opaque identity credential forwarded on every request. Issued by
    /// the host platform; never interpreted locally.
    #[serde(default)]
    pub identity_token: String,
}

/// Playback preferences persisted between sessions.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub repeat_mode: RepeatMode,
    #[serde(default)]
    pub shuffle: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            repeat_mode: RepeatMode::default(),
            shuffle: false,
        }
    }
}

fn default_volume() -> f32 {
    1.0
}

/// Clamps out-of-range values from hand-edited config files.
pub fn sanitize_config(config: Config) -> Config {
    Config {
        backend: BackendConfig {
            endpoint: config.backend.endpoint.trim().trim_end_matches('/').to_string(),
            identity_token: config.backend.identity_token.trim().to_string(),
        },
        playback: PlaybackConfig {
            volume: config.playback.volume.clamp(0.0, 1.0),
            ..config.playback
        },
    }
}
