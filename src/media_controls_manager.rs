//! OS media controls bridge (MPRIS/SMTC/Now Playing).
//!
//! This manager connects the runtime event bus to platform media control
//! integrations via `souvlaki`: it mirrors now-playing metadata, playback
//! state, and position to the OS, and maps inbound transport commands onto
//! player commands.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, warn};
use souvlaki::{
    MediaControlEvent, MediaControls, MediaMetadata, MediaPlayback, MediaPosition, PlatformConfig,
    SeekDirection,
};
use tokio::sync::broadcast::{Receiver, Sender};

use crate::artwork;
use crate::protocol::{Message, PlaybackState, PlayerMessage, Track};

const MEDIA_CONTROLS_DISPLAY_NAME: &str = "Tunelet";
const MEDIA_CONTROLS_DBUS_NAME: &str = "tunelet";
const SEEK_STEP_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, Default)]
struct ControlState {
    is_playing: bool,
    elapsed_ms: u64,
    total_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaybackPublishState {
    Stopped,
    Paused,
    Playing,
}

/// Handles OS media control events and publishes app playback state.
/// Platforms without a usable backend degrade to an inert bridge.
pub struct MediaControlsManager {
    bus_consumer: Receiver<Message>,
    control_state: Arc<Mutex<ControlState>>,
    controls: Option<MediaControls>,
    current_track: Option<Track>,
    last_published_playback: Option<PlaybackPublishState>,
    last_published_metadata_track_id: Option<String>,
    last_published_metadata_total_ms: u64,
}

impl MediaControlsManager {
    /// Creates a manager and attempts to initialize platform media controls.
    pub fn new(bus_consumer: Receiver<Message>, bus_producer: Sender<Message>) -> Self {
        let control_state = Arc::new(Mutex::new(ControlState::default()));
        let controls = Self::create_controls(bus_producer.clone(), Arc::clone(&control_state));

        Self {
            bus_consumer,
            control_state,
            controls,
            current_track: None,
            last_published_playback: None,
            last_published_metadata_track_id: None,
            last_published_metadata_total_ms: 0,
        }
    }

    #[cfg(not(target_os = "windows"))]
    fn create_controls(
        bus_producer: Sender<Message>,
        control_state: Arc<Mutex<ControlState>>,
    ) -> Option<MediaControls> {
        let mut controls = match MediaControls::new(PlatformConfig {
            display_name: MEDIA_CONTROLS_DISPLAY_NAME,
            dbus_name: MEDIA_CONTROLS_DBUS_NAME,
            hwnd: None,
        }) {
            Ok(controls) => controls,
            Err(err) => {
                warn!(
                    "MediaControlsManager: failed to create media controls backend: {}",
                    err
                );
                return None;
            }
        };

        if let Err(err) = controls.attach(move |event| {
            let snapshot = match control_state.lock() {
                Ok(state) => *state,
                Err(poisoned) => *poisoned.into_inner(),
            };

            if let Some(player_message) = Self::map_control_event(event, snapshot) {
                let _ = bus_producer.send(Message::Player(player_message));
            }
        }) {
            warn!(
                "MediaControlsManager: failed to attach media controls handler: {}",
                err
            );
            return None;
        }

        Some(controls)
    }

    #[cfg(target_os = "windows")]
    fn create_controls(
        _bus_producer: Sender<Message>,
        _control_state: Arc<Mutex<ControlState>>,
    ) -> Option<MediaControls> {
        // Souvlaki requires an HWND on Windows, which the headless runtime
        // does not have to offer.
        warn!(
            "MediaControlsManager: Windows media controls are disabled because no HWND is available"
        );
        None
    }

    fn map_control_event(event: MediaControlEvent, state: ControlState) -> Option<PlayerMessage> {
        match event {
            MediaControlEvent::Play => Some(PlayerMessage::Resume),
            MediaControlEvent::Pause => Some(PlayerMessage::Pause),
            MediaControlEvent::Toggle => Some(PlayerMessage::TogglePlay),
            MediaControlEvent::Next => Some(PlayerMessage::Next),
            MediaControlEvent::Previous => Some(PlayerMessage::Previous),
            MediaControlEvent::Stop => Some(PlayerMessage::Stop),
            MediaControlEvent::SetPosition(position) => {
                Self::seek_message_from_target_ms(state, position.0.as_millis() as u64)
            }
            MediaControlEvent::SeekBy(direction, delta) => {
                let delta_ms = delta.as_millis() as u64;
                let target_ms = match direction {
                    SeekDirection::Forward => state.elapsed_ms.saturating_add(delta_ms),
                    SeekDirection::Backward => state.elapsed_ms.saturating_sub(delta_ms),
                };
                Self::seek_message_from_target_ms(state, target_ms)
            }
            MediaControlEvent::Seek(direction) => {
                let target_ms = match direction {
                    SeekDirection::Forward => state.elapsed_ms.saturating_add(SEEK_STEP_MS),
                    SeekDirection::Backward => state.elapsed_ms.saturating_sub(SEEK_STEP_MS),
                };
                Self::seek_message_from_target_ms(state, target_ms)
            }
            MediaControlEvent::SetVolume(_)
            | MediaControlEvent::OpenUri(_)
            | MediaControlEvent::Raise
            | MediaControlEvent::Quit => None,
        }
    }

    fn seek_message_from_target_ms(state: ControlState, target_ms: u64) -> Option<PlayerMessage> {
        if state.total_ms == 0 {
            return None;
        }
        Some(PlayerMessage::SeekToMs(target_ms.min(state.total_ms)))
    }

    fn update_control_state<F>(&self, update: F)
    where
        F: FnOnce(&mut ControlState),
    {
        match self.control_state.lock() {
            Ok(mut state) => update(&mut state),
            Err(poisoned) => {
                let mut state = poisoned.into_inner();
                update(&mut state);
            }
        }
    }

    fn control_state_snapshot(&self) -> ControlState {
        match self.control_state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn desired_playback_publish_state(&self) -> PlaybackPublishState {
        if self.current_track.is_none() {
            return PlaybackPublishState::Stopped;
        }

        if self.control_state_snapshot().is_playing {
            PlaybackPublishState::Playing
        } else {
            PlaybackPublishState::Paused
        }
    }

    fn playback_value(state: PlaybackPublishState, progress: Option<MediaPosition>) -> MediaPlayback {
        match state {
            PlaybackPublishState::Stopped => MediaPlayback::Stopped,
            PlaybackPublishState::Paused => MediaPlayback::Paused { progress },
            PlaybackPublishState::Playing => MediaPlayback::Playing { progress },
        }
    }

    fn publish_playback_if_needed(&mut self) {
        let desired_state = self.desired_playback_publish_state();
        if self.last_published_playback == Some(desired_state) {
            return;
        }

        let Some(controls) = self.controls.as_mut() else {
            return;
        };

        if let Err(err) = controls.set_playback(Self::playback_value(desired_state, None)) {
            warn!(
                "MediaControlsManager: failed to publish playback state {:?}: {}",
                desired_state, err
            );
            return;
        }

        self.last_published_playback = Some(desired_state);
    }

    // Position pushes are already throttled by the player; they bypass the
    // state dedup so the OS scrubber keeps moving.
    fn publish_position(&mut self) {
        let desired_state = self.desired_playback_publish_state();
        let elapsed_ms = self.control_state_snapshot().elapsed_ms;

        let Some(controls) = self.controls.as_mut() else {
            return;
        };

        let progress = Some(MediaPosition(Duration::from_millis(elapsed_ms)));
        if let Err(err) = controls.set_playback(Self::playback_value(desired_state, progress)) {
            warn!(
                "MediaControlsManager: failed to publish playback position: {}",
                err
            );
            return;
        }

        self.last_published_playback = Some(desired_state);
    }

    fn publish_metadata_if_needed(&mut self) {
        let snapshot = self.control_state_snapshot();
        let track = self.current_track.clone();
        let track_id = track.as_ref().map(|track| track.id.clone());
        let total_ms = if track.is_some() { snapshot.total_ms } else { 0 };

        if self.last_published_metadata_track_id == track_id
            && self.last_published_metadata_total_ms == total_ms
        {
            return;
        }

        let Some(controls) = self.controls.as_mut() else {
            return;
        };

        let publish_result = if let Some(track) = track.as_ref() {
            let cover_url = artwork::cover_url(track);
            let duration = (total_ms > 0).then(|| Duration::from_millis(total_ms));
            controls.set_metadata(MediaMetadata {
                title: Some(track.title.as_str()),
                artist: Some(track.artist.as_str()),
                album: Some(track.album.as_str()),
                cover_url: Some(cover_url.as_str()),
                duration,
            })
        } else {
            controls.set_metadata(MediaMetadata::default())
        };

        if let Err(err) = publish_result {
            warn!("MediaControlsManager: failed to publish metadata: {}", err);
            return;
        }

        self.last_published_metadata_track_id = track_id;
        self.last_published_metadata_total_ms = total_ms;
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::Player(PlayerMessage::NowPlayingChanged(track)) => {
                self.update_control_state(|state| {
                    if track.is_none() {
                        state.is_playing = false;
                    }
                    // Duration is unknown until the player reports progress
                    // for the newly bound source.
                    state.elapsed_ms = 0;
                    state.total_ms = 0;
                });
                self.current_track = track;
                self.publish_metadata_if_needed();
                self.publish_playback_if_needed();
            }
            Message::Player(PlayerMessage::StateChanged(playback_state)) => {
                self.update_control_state(|state| {
                    state.is_playing = playback_state == PlaybackState::Playing;
                });
                self.publish_playback_if_needed();
            }
            Message::Player(PlayerMessage::PlaybackProgress {
                elapsed_ms,
                total_ms,
            }) => {
                self.update_control_state(|state| {
                    state.elapsed_ms = elapsed_ms;
                    state.total_ms = total_ms;
                });
                self.publish_metadata_if_needed();
                self.publish_position();
            }
            _ => {}
        }
    }

    /// Starts the blocking manager loop.
    pub fn run(&mut self) {
        info!("MediaControlsManager: started");
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(message) => self.handle_message(message),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("MediaControlsManager: bus lagged by {} messages", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ControlState, MediaControlsManager};
    use crate::protocol::PlayerMessage;
    use souvlaki::{MediaControlEvent, MediaPosition, SeekDirection};
    use std::time::Duration;

    #[test]
    fn test_transport_events_map_to_player_commands() {
        let state = ControlState::default();
        assert!(matches!(
            MediaControlsManager::map_control_event(MediaControlEvent::Play, state),
            Some(PlayerMessage::Resume)
        ));
        assert!(matches!(
            MediaControlsManager::map_control_event(MediaControlEvent::Pause, state),
            Some(PlayerMessage::Pause)
        ));
        assert!(matches!(
            MediaControlsManager::map_control_event(MediaControlEvent::Toggle, state),
            Some(PlayerMessage::TogglePlay)
        ));
        assert!(matches!(
            MediaControlsManager::map_control_event(MediaControlEvent::Next, state),
            Some(PlayerMessage::Next)
        ));
        assert!(matches!(
            MediaControlsManager::map_control_event(MediaControlEvent::Previous, state),
            Some(PlayerMessage::Previous)
        ));
        assert!(matches!(
            MediaControlsManager::map_control_event(MediaControlEvent::Stop, state),
            Some(PlayerMessage::Stop)
        ));
    }

    #[test]
    fn test_set_position_event_maps_to_absolute_seek() {
        let state = ControlState {
            is_playing: true,
            elapsed_ms: 0,
            total_ms: 200_000,
        };
        let message = MediaControlsManager::map_control_event(
            MediaControlEvent::SetPosition(MediaPosition(Duration::from_millis(50_000))),
            state,
        );
        assert!(matches!(message, Some(PlayerMessage::SeekToMs(50_000))));
    }

    #[test]
    fn test_seek_by_forward_clamps_to_duration() {
        let state = ControlState {
            is_playing: true,
            elapsed_ms: 190_000,
            total_ms: 200_000,
        };
        let message = MediaControlsManager::map_control_event(
            MediaControlEvent::SeekBy(SeekDirection::Forward, Duration::from_millis(20_000)),
            state,
        );
        assert!(matches!(message, Some(PlayerMessage::SeekToMs(200_000))));
    }

    #[test]
    fn test_seek_step_backward_saturates_at_zero() {
        let state = ControlState {
            is_playing: true,
            elapsed_ms: 4_000,
            total_ms: 200_000,
        };
        let message =
            MediaControlsManager::map_control_event(MediaControlEvent::Seek(SeekDirection::Backward), state);
        assert!(matches!(message, Some(PlayerMessage::SeekToMs(0))));
    }

    #[test]
    fn test_seek_without_duration_is_ignored() {
        let state = ControlState {
            is_playing: true,
            elapsed_ms: 10_000,
            total_ms: 0,
        };
        let message = MediaControlsManager::map_control_event(
            MediaControlEvent::SeekBy(SeekDirection::Backward, Duration::from_millis(5_000)),
            state,
        );
        assert!(message.is_none());
    }

    #[test]
    fn test_unmapped_events_are_dropped() {
        let state = ControlState::default();
        assert!(
            MediaControlsManager::map_control_event(MediaControlEvent::SetVolume(0.5), state)
                .is_none()
        );
        assert!(MediaControlsManager::map_control_event(MediaControlEvent::Raise, state).is_none());
    }
}
