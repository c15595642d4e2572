mod artwork;
mod backend_manager;
mod backends;
mod config;
mod engine;
mod media_controls_manager;
mod player_manager;
mod protocol;
mod queue;
mod stream_cache;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use log::{error, info, warn};
use tokio::sync::broadcast;

use backend_manager::BackendManager;
use backends::rest::RestBackendAdapter;
use backends::{MediaBackend, TrackResolver};
use config::{sanitize_config, Config};
use engine::simulator::SimulatorEngine;
use media_controls_manager::MediaControlsManager;
use player_manager::PlayerManager;
use protocol::{
    BackendMessage, ConfigMessage, Message, PlaybackState, PlayerMessage, TrackFilters,
};

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}

fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tunelet.toml")
}

fn load_config(config_file: &PathBuf) -> Config {
    if !config_file.exists() {
        let default_config = Config::default();
        info!(
            "Config file not found. Creating default config. path={}",
            config_file.display()
        );
        match toml::to_string(&default_config) {
            Ok(config_text) => {
                if let Err(err) = std::fs::write(config_file, config_text) {
                    error!(
                        "Failed to write default config to {}: {}",
                        config_file.display(),
                        err
                    );
                }
            }
            Err(err) => error!("Failed to serialize default config: {}", err),
        }
        return default_config;
    }

    match std::fs::read_to_string(config_file) {
        Ok(content) => sanitize_config(toml::from_str::<Config>(&content).unwrap_or_default()),
        Err(err) => {
            error!("Failed to read config {}: {}", config_file.display(), err);
            Config::default()
        }
    }
}

fn main() {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Debug);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_file = config_file_path();
    let config = load_config(&config_file);

    // Bus for communication between components
    let (bus_sender, _) = broadcast::channel(1024);

    let adapter = Arc::new(RestBackendAdapter::new(
        &config.backend.endpoint,
        &config.backend.identity_token,
    ));
    let resolver: Arc<dyn TrackResolver> = adapter.clone();
    let backend: Arc<dyn MediaBackend> = adapter;

    // Setup player manager
    let player_bus_receiver = bus_sender.subscribe();
    let player_bus_sender = bus_sender.clone();
    let engine = SimulatorEngine::new(bus_sender.clone());
    thread::Builder::new()
        .name("player".to_string())
        .spawn(move || {
            let run_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let mut player_manager = PlayerManager::new(
                    player_bus_receiver,
                    player_bus_sender,
                    Box::new(engine),
                    resolver,
                );
                player_manager.run();
            }));
            if let Err(payload) = run_result {
                log::error!(
                    "PlayerManager thread terminated due to panic: {}",
                    panic_payload_to_string(payload.as_ref())
                );
            }
        })
        .expect("failed to spawn player thread");

    // Setup media controls bridge
    let controls_bus_receiver = bus_sender.subscribe();
    let controls_bus_sender = bus_sender.clone();
    thread::Builder::new()
        .name("media-controls".to_string())
        .spawn(move || {
            let mut media_controls_manager =
                MediaControlsManager::new(controls_bus_receiver, controls_bus_sender);
            media_controls_manager.run();
        })
        .expect("failed to spawn media controls thread");

    // Setup backend manager
    let backend_bus_receiver = bus_sender.subscribe();
    let backend_bus_sender = bus_sender.clone();
    thread::Builder::new()
        .name("backend".to_string())
        .spawn(move || {
            let mut backend_manager =
                BackendManager::new(backend_bus_receiver, backend_bus_sender, backend);
            backend_manager.run();
        })
        .expect("failed to spawn backend thread");

    let mut session_receiver = bus_sender.subscribe();

    let _ = bus_sender.send(Message::Config(ConfigMessage::ConfigChanged(config.clone())));

    if config.backend.endpoint.is_empty() {
        warn!("Backend endpoint is not configured; edit {} and restart", config_file.display());
    } else {
        let _ = bus_sender.send(Message::Backend(BackendMessage::RequestTracks(
            TrackFilters {
                limit: Some(50),
                ..TrackFilters::default()
            },
        )));
    }

    // The session loop stands in for the view layer: it starts playback
    // once the library arrives and logs what the player reports.
    let mut queue_bound = false;
    loop {
        match session_receiver.blocking_recv() {
            Ok(Message::Backend(BackendMessage::TracksLoaded(page))) => {
                info!("Loaded {} tracks ({} total)", page.items.len(), page.total);
                if !queue_bound {
                    if let Some(first) = page.items.first().cloned() {
                        queue_bound = true;
                        let _ = bus_sender.send(Message::Player(PlayerMessage::PlayTrack {
                            track: first,
                            queue: Some(page.items),
                        }));
                    }
                }
            }
            Ok(Message::Backend(BackendMessage::OperationFailed { action, error })) => {
                warn!("Backend operation {} failed: {}", action, error);
            }
            Ok(Message::Player(PlayerMessage::NowPlayingChanged(Some(track)))) => {
                info!("Now playing: {} - {}", track.artist, track.title);
            }
            Ok(Message::Player(PlayerMessage::StateChanged(state))) => {
                info!("Playback state: {:?}", state);
                if state == PlaybackState::Ended {
                    info!("Queue finished");
                }
            }
            Ok(Message::Player(PlayerMessage::PlaybackFailed(error))) => {
                warn!("Playback failed: {}", error);
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Session loop lagged by {} messages", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    info!("Application exiting");
}
