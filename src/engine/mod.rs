//! Media engine seam and concrete implementations.
//!
//! The player manager drives an engine through this trait and reacts to
//! the `EngineMessage` events the implementation publishes on the bus.
//! A real audio sink (platform media element, decoder pipeline) integrates
//! behind the same seam.

pub mod simulator;

/// Commands understood by the underlying media engine.
///
/// Implementations report back asynchronously via
/// `protocol::EngineMessage`; none of these calls block on I/O.
pub trait MediaEngine: Send {
    /// Binds a new source URL, replacing any current one. Playback does
    /// not start until `play` is called.
    fn set_source(&mut self, url: &str);
    fn play(&mut self);
    fn pause(&mut self);
    fn seek_to_ms(&mut self, position_ms: u64);
    /// Volume in `0.0..=1.0`; values outside the range are clamped by the
    /// caller.
    fn set_volume(&mut self, volume: f32);
    fn set_muted(&mut self, muted: bool);
}
