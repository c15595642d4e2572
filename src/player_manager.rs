//! Playback controller.
//!
//! This manager is the bus-owned state holder for playback: it multiplexes
//! user commands, media-engine events, and OS transport commands into one
//! state machine, owns the play queue and the stream-URL cache, and drives
//! the media engine.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use governor::state::NotKeyed;
use governor::{Quota, RateLimiter};
use log::{debug, info, warn};
use tokio::sync::broadcast::{Receiver, Sender};

use crate::backends::TrackResolver;
use crate::engine::MediaEngine;
use crate::protocol::{
    ConfigMessage, Direction, EngineMessage, Message, PlaybackState, PlayerMessage, QueueSnapshot,
    RepeatMode, Track,
};
use crate::queue::Queue;
use crate::stream_cache::StreamUrlCache;

/// Pressing previous after this much playback restarts the current track
/// instead of moving back through the queue.
const PREVIOUS_RESTARTS_AFTER_MS: u64 = 3_000;
/// Minimum spacing of position broadcasts to the OS bridge.
const PROGRESS_BROADCAST_PERIOD: Duration = Duration::from_secs(5);

/// Position and play state recorded before an error-recovery refresh.
struct PendingResume {
    position_ms: u64,
    resume_playing: bool,
}

/// Owns playback state for the lifetime of the session. All mutation
/// happens inside `handle_message`, one bus message at a time; the only
/// off-loop work is URL resolution, which re-enters the loop as a
/// generation-tagged `StreamResolved` message.
pub struct PlayerManager {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    engine: Box<dyn MediaEngine>,
    cache: Arc<Mutex<StreamUrlCache>>,
    queue: Queue,
    repeat_mode: RepeatMode,
    state: PlaybackState,
    current_track: Option<Track>,
    position_ms: u64,
    duration_ms: u64,
    volume: f32,
    muted: bool,
    /// Monotonic id attached to every resolution request so responses that
    /// arrive after the bound track changed are discarded.
    generation: u64,
    resume_after_error: Option<PendingResume>,
    error_refresh_attempted: bool,
    buffering: bool,
    was_playing_before_buffer: bool,
    last_error: Option<String>,
    progress_limiter:
        RateLimiter<NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>,
}

impl PlayerManager {
    /// Creates a manager bound to bus channels, a media engine, and the
    /// stream-URL resolver.
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        engine: Box<dyn MediaEngine>,
        resolver: Arc<dyn TrackResolver>,
    ) -> Self {
        Self {
            bus_consumer,
            bus_producer,
            engine,
            cache: Arc::new(Mutex::new(StreamUrlCache::new(resolver))),
            queue: Queue::new(),
            repeat_mode: RepeatMode::Off,
            state: PlaybackState::Idle,
            current_track: None,
            position_ms: 0,
            duration_ms: 0,
            volume: 1.0,
            muted: false,
            generation: 0,
            resume_after_error: None,
            error_refresh_attempted: false,
            buffering: false,
            was_playing_before_buffer: false,
            last_error: None,
            progress_limiter: RateLimiter::direct(
                Quota::with_period(PROGRESS_BROADCAST_PERIOD)
                    .expect("progress broadcast period is non-zero"),
            ),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current_track.as_ref()
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn set_state(&mut self, next: PlaybackState) {
        if self.state == next {
            return;
        }
        self.state = next;
        let _ = self
            .bus_producer
            .send(Message::Player(PlayerMessage::StateChanged(next)));
    }

    fn broadcast_queue(&self) {
        let _ = self
            .bus_producer
            .send(Message::Player(PlayerMessage::QueueChanged(QueueSnapshot {
                tracks: self.queue.tracks().to_vec(),
                position: self.queue.position(),
                shuffled: self.queue.is_shuffled(),
                repeat_mode: self.repeat_mode,
            })));
    }

    // High-frequency engine callbacks are squeezed down to one position
    // broadcast per period; `force` is for discrete moments (metadata,
    // seeks) that the bridge should see immediately.
    fn broadcast_progress(&self, force: bool) {
        if !force && self.progress_limiter.check().is_err() {
            return;
        }
        let _ = self
            .bus_producer
            .send(Message::Player(PlayerMessage::PlaybackProgress {
                elapsed_ms: self.position_ms,
                total_ms: self.duration_ms,
            }));
    }

    // The cache lock is only ever taken on resolution threads; a slow
    // network call must never stall the manager loop.
    fn spawn_resolution(&mut self, track_id: String, invalidate_first: bool, forced_refresh: bool) {
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let cache = Arc::clone(&self.cache);
        let producer = self.bus_producer.clone();
        thread::spawn(move || {
            let result = {
                let mut cache = match cache.lock() {
                    Ok(cache) => cache,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if invalidate_first {
                    cache.invalidate();
                }
                if forced_refresh {
                    cache.refresh(&track_id)
                } else {
                    cache.resolve(&track_id)
                }
            };
            let _ = producer.send(Message::Player(PlayerMessage::StreamResolved {
                generation,
                track_id,
                result,
            }));
        });
    }

    fn begin_track(&mut self, track: Track) {
        // The cached URL only survives replays of the same track.
        let track_changed = self
            .current_track
            .as_ref()
            .map_or(true, |current| current.id != track.id);

        info!(
            "PlayerManager: loading \"{}\" by {} ({})",
            track.title, track.artist, track.id
        );
        self.position_ms = 0;
        self.duration_ms = track.duration_ms.unwrap_or(0);
        self.buffering = false;
        self.error_refresh_attempted = false;
        self.resume_after_error = None;
        self.last_error = None;
        self.current_track = Some(track.clone());
        self.set_state(PlaybackState::Loading);
        let _ = self
            .bus_producer
            .send(Message::Player(PlayerMessage::NowPlayingChanged(Some(
                track.clone(),
            ))));
        self.spawn_resolution(track.id, track_changed, false);
    }

    fn on_stream_resolved(
        &mut self,
        generation: u64,
        track_id: &str,
        result: Result<String, String>,
    ) {
        if generation != self.generation {
            debug!(
                "PlayerManager: discarding stale resolution for track {} (generation {} != {})",
                track_id, generation, self.generation
            );
            return;
        }
        let Some(current) = self.current_track.as_ref() else {
            return;
        };
        if current.id != track_id {
            debug!(
                "PlayerManager: discarding resolution for unbound track {}",
                track_id
            );
            return;
        }

        match result {
            Ok(url) => {
                self.engine.set_source(&url);
                if let Some(resume) = self.resume_after_error.take() {
                    self.engine.seek_to_ms(resume.position_ms);
                    self.position_ms = resume.position_ms;
                    if resume.resume_playing {
                        self.engine.play();
                    } else {
                        self.set_state(PlaybackState::Paused);
                    }
                } else {
                    self.engine.play();
                }
            }
            Err(error) => {
                warn!(
                    "PlayerManager: stream resolution failed for track {}: {}",
                    track_id, error
                );
                self.last_error = Some(error.clone());
                let _ = self
                    .bus_producer
                    .send(Message::Player(PlayerMessage::PlaybackFailed(error)));
                self.set_state(PlaybackState::Errored);
            }
        }
    }

    fn handle_track_end(&mut self) {
        if self.repeat_mode == RepeatMode::One {
            self.position_ms = 0;
            self.engine.seek_to_ms(0);
            self.engine.play();
            return;
        }
        match self
            .queue
            .advance(Direction::Forward, self.repeat_mode)
            .cloned()
        {
            Some(next) => {
                self.begin_track(next);
                self.broadcast_queue();
            }
            None => {
                debug!("PlayerManager: queue exhausted, playback ended");
                self.set_state(PlaybackState::Ended);
            }
        }
    }

    fn play_previous(&mut self) {
        // Standard double-tap-back behavior: far enough into the track,
        // previous restarts it instead of navigating.
        if self.position_ms > PREVIOUS_RESTARTS_AFTER_MS {
            self.position_ms = 0;
            self.engine.seek_to_ms(0);
            self.broadcast_progress(true);
            return;
        }
        if let Some(previous) = self
            .queue
            .advance(Direction::Backward, self.repeat_mode)
            .cloned()
        {
            self.begin_track(previous);
            self.broadcast_queue();
        }
    }

    fn play_next(&mut self) {
        if let Some(next) = self
            .queue
            .advance(Direction::Forward, self.repeat_mode)
            .cloned()
        {
            self.begin_track(next);
            self.broadcast_queue();
        }
    }

    fn on_engine_error(&mut self, error: String) {
        let Some(track) = self.current_track.clone() else {
            warn!("PlayerManager: engine error with no track bound: {error}");
            self.last_error = Some(error.clone());
            let _ = self
                .bus_producer
                .send(Message::Player(PlayerMessage::PlaybackFailed(error)));
            self.set_state(PlaybackState::Errored);
            return;
        };
        if !self.error_refresh_attempted {
            // One automatic recovery: the signed URL most likely expired.
            self.error_refresh_attempted = true;
            warn!(
                "PlayerManager: engine error on track {} ({}), refreshing stream URL",
                track.id, error
            );
            self.resume_after_error = Some(PendingResume {
                position_ms: self.position_ms,
                resume_playing: matches!(
                    self.state,
                    PlaybackState::Playing | PlaybackState::Loading
                ),
            });
            self.set_state(PlaybackState::Loading);
            self.spawn_resolution(track.id, false, true);
            return;
        }
        warn!(
            "PlayerManager: engine error on track {} after refresh, giving up: {}",
            track.id, error
        );
        self.last_error = Some(error.clone());
        let _ = self
            .bus_producer
            .send(Message::Player(PlayerMessage::PlaybackFailed(error)));
        self.set_state(PlaybackState::Errored);
    }

    fn handle_engine_message(&mut self, event: EngineMessage) {
        match event {
            EngineMessage::MetadataReady { duration_ms } => {
                self.duration_ms = duration_ms;
                self.broadcast_progress(true);
            }
            EngineMessage::TimeProgress { position_ms } => {
                self.position_ms = position_ms;
                self.broadcast_progress(false);
            }
            EngineMessage::Playing => {
                self.buffering = false;
                self.error_refresh_attempted = false;
                self.set_state(PlaybackState::Playing);
            }
            EngineMessage::Paused => {
                self.set_state(PlaybackState::Paused);
            }
            EngineMessage::BufferWait => {
                if self.current_track.is_some() {
                    self.buffering = true;
                    self.was_playing_before_buffer = self.state == PlaybackState::Playing;
                    self.set_state(PlaybackState::Loading);
                }
            }
            EngineMessage::ReadyToPlay => {
                if self.buffering {
                    self.buffering = false;
                    self.set_state(if self.was_playing_before_buffer {
                        PlaybackState::Playing
                    } else {
                        PlaybackState::Paused
                    });
                }
            }
            EngineMessage::Ended => {
                self.handle_track_end();
            }
            EngineMessage::PlaybackError(error) => {
                self.on_engine_error(error);
            }
        }
    }

    fn handle_player_message(&mut self, command: PlayerMessage) {
        match command {
            PlayerMessage::PlayTrack { track, queue } => {
                if let Some(tracks) = queue {
                    self.queue.set_queue(tracks, &track.id);
                    self.broadcast_queue();
                }
                // A direct play request without a queue binds the track
                // only; the stored queue is deliberately untouched.
                self.begin_track(track);
            }
            PlayerMessage::PlayAt(index) => {
                if let Some(track) = self.queue.jump_to(index).cloned() {
                    self.begin_track(track);
                    self.broadcast_queue();
                }
            }
            PlayerMessage::TogglePlay => {
                if self.current_track.is_some() {
                    if self.state == PlaybackState::Playing {
                        self.engine.pause();
                    } else {
                        self.engine.play();
                    }
                }
            }
            PlayerMessage::Pause => {
                if self.current_track.is_some() {
                    self.engine.pause();
                }
            }
            PlayerMessage::Resume => {
                if self.current_track.is_some() {
                    self.engine.play();
                }
            }
            PlayerMessage::Stop => {
                if self.current_track.is_some() {
                    self.engine.pause();
                    self.engine.seek_to_ms(0);
                    self.position_ms = 0;
                    self.broadcast_progress(true);
                }
            }
            PlayerMessage::Next => self.play_next(),
            PlayerMessage::Previous => self.play_previous(),
            PlayerMessage::SeekToPercent(percent) => {
                if self.duration_ms > 0 {
                    let percent = percent.clamp(0.0, 100.0);
                    let target_ms =
                        ((f64::from(percent) / 100.0) * self.duration_ms as f64) as u64;
                    self.position_ms = target_ms;
                    self.engine.seek_to_ms(target_ms);
                    self.broadcast_progress(true);
                }
            }
            PlayerMessage::SeekToMs(position_ms) => {
                if self.current_track.is_some() {
                    let target_ms = if self.duration_ms > 0 {
                        position_ms.min(self.duration_ms)
                    } else {
                        position_ms
                    };
                    self.position_ms = target_ms;
                    self.engine.seek_to_ms(target_ms);
                    self.broadcast_progress(true);
                }
            }
            PlayerMessage::SetVolume(volume) => {
                self.apply_volume(volume);
            }
            PlayerMessage::ToggleMute => {
                self.muted = !self.muted;
                self.engine.set_muted(self.muted);
            }
            PlayerMessage::CycleRepeatMode => {
                self.repeat_mode = self.repeat_mode.next();
                debug!("PlayerManager: repeat mode is now {:?}", self.repeat_mode);
                self.broadcast_queue();
            }
            PlayerMessage::ToggleShuffle => {
                self.queue.toggle_shuffle();
                self.broadcast_queue();
            }
            PlayerMessage::QueueTrack(track) => {
                self.queue.append(track);
                self.broadcast_queue();
            }
            PlayerMessage::QueueTrackNext(track) => {
                self.queue.insert_after_current(track);
                self.broadcast_queue();
            }
            PlayerMessage::RemoveAt(index) => {
                self.queue.remove_at(index);
                self.broadcast_queue();
            }
            PlayerMessage::MoveTrack { from, to } => {
                self.queue.move_to(from, to);
                self.broadcast_queue();
            }
            PlayerMessage::ClearQueue => {
                self.queue.clear();
                if self.current_track.is_none() {
                    self.set_state(PlaybackState::Idle);
                }
                self.broadcast_queue();
            }
            PlayerMessage::StreamResolved {
                generation,
                track_id,
                result,
            } => {
                self.on_stream_resolved(generation, &track_id, result);
            }
            // Notifications published by this manager; nothing to do.
            PlayerMessage::NowPlayingChanged(_)
            | PlayerMessage::StateChanged(_)
            | PlayerMessage::PlaybackProgress { .. }
            | PlayerMessage::QueueChanged(_)
            | PlayerMessage::PlaybackFailed(_) => {}
        }
    }

    fn apply_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.engine.set_volume(self.volume);
        if self.volume > 0.0 && self.muted {
            self.muted = false;
            self.engine.set_muted(false);
        }
    }

    fn apply_config(&mut self, config: &crate::config::Config) {
        self.apply_volume(config.playback.volume);
        self.repeat_mode = config.playback.repeat_mode;
        if config.playback.shuffle && !self.queue.is_shuffled() {
            self.queue.toggle_shuffle();
        }
        self.broadcast_queue();
    }

    /// Single mutation entry point; also the test seam.
    pub fn handle_message(&mut self, message: Message) {
        match message {
            Message::Player(command) => self.handle_player_message(command),
            Message::Engine(event) => self.handle_engine_message(event),
            Message::Config(ConfigMessage::ConfigChanged(config)) => self.apply_config(&config),
            Message::Backend(_) => {}
        }
    }

    /// Starts the blocking manager loop.
    pub fn run(&mut self) {
        info!("PlayerManager: started");
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(message) => self.handle_message(message),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("PlayerManager: bus lagged by {} messages", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
