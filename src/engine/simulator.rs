//! Headless media engine that advances a playback clock in real time.
//!
//! Used for development runs and end-to-end exercises without an audio
//! device: it emits the same event sequence a real sink would
//! (metadata, progress ticks, ended) while producing no sound.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};
use tokio::sync::broadcast::Sender;

use crate::engine::MediaEngine;
use crate::protocol::{EngineMessage, Message};

/// Duration reported for sources whose length is not known up front.
const SIMULATED_TRACK_DURATION_MS: u64 = 180_000;
const TICK_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Default)]
struct SimState {
    source: Option<String>,
    playing: bool,
    position_ms: u64,
    duration_ms: u64,
}

/// Clock-driven `MediaEngine` implementation.
pub struct SimulatorEngine {
    shared: Arc<Mutex<SimState>>,
    bus_producer: Sender<Message>,
    stopped: Arc<AtomicBool>,
}

impl SimulatorEngine {
    /// Creates the engine and starts its clock thread.
    pub fn new(bus_producer: Sender<Message>) -> Self {
        let shared = Arc::new(Mutex::new(SimState::default()));
        let stopped = Arc::new(AtomicBool::new(false));

        let tick_state = Arc::clone(&shared);
        let tick_stopped = Arc::clone(&stopped);
        let tick_producer = bus_producer.clone();
        thread::spawn(move || {
            info!("SimulatorEngine: clock started");
            let mut last_tick = Instant::now();
            while !tick_stopped.load(Ordering::Relaxed) {
                thread::sleep(TICK_INTERVAL);
                let elapsed_ms = last_tick.elapsed().as_millis() as u64;
                last_tick = Instant::now();

                let mut events = Vec::new();
                {
                    let mut state = match tick_state.lock() {
                        Ok(state) => state,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    if state.playing {
                        state.position_ms =
                            (state.position_ms + elapsed_ms).min(state.duration_ms);
                        events.push(EngineMessage::TimeProgress {
                            position_ms: state.position_ms,
                        });
                        if state.position_ms >= state.duration_ms {
                            state.playing = false;
                            events.push(EngineMessage::Ended);
                        }
                    }
                }
                for event in events {
                    let _ = tick_producer.send(Message::Engine(event));
                }
            }
            debug!("SimulatorEngine: clock stopped");
        });

        Self {
            shared,
            bus_producer,
            stopped,
        }
    }

    fn with_state<F>(&self, update: F)
    where
        F: FnOnce(&mut SimState),
    {
        match self.shared.lock() {
            Ok(mut state) => update(&mut state),
            Err(poisoned) => update(&mut poisoned.into_inner()),
        }
    }

    fn emit(&self, event: EngineMessage) {
        let _ = self.bus_producer.send(Message::Engine(event));
    }
}

impl MediaEngine for SimulatorEngine {
    fn set_source(&mut self, url: &str) {
        debug!("SimulatorEngine: source set to {url}");
        let duration_ms = SIMULATED_TRACK_DURATION_MS;
        self.with_state(|state| {
            state.source = Some(url.to_string());
            state.playing = false;
            state.position_ms = 0;
            state.duration_ms = duration_ms;
        });
        self.emit(EngineMessage::MetadataReady { duration_ms });
        self.emit(EngineMessage::ReadyToPlay);
    }

    fn play(&mut self) {
        let mut started = false;
        self.with_state(|state| {
            if state.source.is_some() && !state.playing {
                state.playing = true;
                started = true;
            }
        });
        if started {
            self.emit(EngineMessage::Playing);
        }
    }

    fn pause(&mut self) {
        let mut paused = false;
        self.with_state(|state| {
            if state.playing {
                state.playing = false;
                paused = true;
            }
        });
        if paused {
            self.emit(EngineMessage::Paused);
        }
    }

    fn seek_to_ms(&mut self, position_ms: u64) {
        let mut clamped = 0;
        self.with_state(|state| {
            state.position_ms = position_ms.min(state.duration_ms);
            clamped = state.position_ms;
        });
        self.emit(EngineMessage::TimeProgress {
            position_ms: clamped,
        });
    }

    fn set_volume(&mut self, _volume: f32) {}

    fn set_muted(&mut self, _muted: bool) {}
}

impl Drop for SimulatorEngine {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast;

    use super::SimulatorEngine;
    use crate::engine::MediaEngine;
    use crate::protocol::{EngineMessage, Message};

    fn drain(observer: &mut broadcast::Receiver<Message>) -> Vec<EngineMessage> {
        let mut events = Vec::new();
        while let Ok(Message::Engine(event)) = observer.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_set_source_reports_metadata_and_readiness() {
        let (bus_sender, _keepalive) = broadcast::channel(64);
        let mut observer = bus_sender.subscribe();
        let mut engine = SimulatorEngine::new(bus_sender.clone());

        engine.set_source("https://cdn.example/a");

        let events = drain(&mut observer);
        assert!(matches!(
            events[0],
            EngineMessage::MetadataReady { duration_ms } if duration_ms > 0
        ));
        assert!(matches!(events[1], EngineMessage::ReadyToPlay));
    }

    #[test]
    fn test_play_without_source_is_silent() {
        let (bus_sender, _keepalive) = broadcast::channel(64);
        let mut observer = bus_sender.subscribe();
        let mut engine = SimulatorEngine::new(bus_sender.clone());

        engine.play();

        assert!(drain(&mut observer).is_empty());
    }

    #[test]
    fn test_play_pause_emit_state_events() {
        let (bus_sender, _keepalive) = broadcast::channel(64);
        let mut engine = SimulatorEngine::new(bus_sender.clone());
        engine.set_source("https://cdn.example/a");

        let mut observer = bus_sender.subscribe();
        engine.play();
        engine.pause();

        let events = drain(&mut observer);
        let playing_at = events
            .iter()
            .position(|event| matches!(event, EngineMessage::Playing))
            .expect("play should emit Playing");
        let paused_at = events
            .iter()
            .position(|event| matches!(event, EngineMessage::Paused))
            .expect("pause should emit Paused");
        assert!(playing_at < paused_at);
    }

    #[test]
    fn test_seek_clamps_to_duration() {
        let (bus_sender, _keepalive) = broadcast::channel(64);
        let mut engine = SimulatorEngine::new(bus_sender.clone());
        engine.set_source("https://cdn.example/a");

        let mut observer = bus_sender.subscribe();
        engine.seek_to_ms(u64::MAX);

        let events = drain(&mut observer);
        assert!(matches!(
            events[0],
            EngineMessage::TimeProgress { position_ms } if position_ms == 180_000
        ));
    }
}
