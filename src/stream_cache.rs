//! Single-slot TTL cache for resolver-issued stream URLs.
//!
//! Stream URLs are short-lived signed links. Caching the one for the
//! active track keeps play/pause toggles and seeks from re-fetching it,
//! while the safety margin forces a refresh before the link actually
//! expires.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;

use crate::backends::TrackResolver;

/// Subtracted from the advertised TTL so a refresh triggers before the
/// signed link stops working.
const TTL_SAFETY_MARGIN: Duration = Duration::from_secs(300);

struct CacheEntry {
    track_id: String,
    url: String,
    expires_at: Instant,
}

/// Caches the playable URL for the currently loaded track. Holds exactly
/// one entry; only one track is ever being prepared or played.
pub struct StreamUrlCache {
    resolver: Arc<dyn TrackResolver>,
    slot: Option<CacheEntry>,
}

impl StreamUrlCache {
    pub fn new(resolver: Arc<dyn TrackResolver>) -> Self {
        Self {
            resolver,
            slot: None,
        }
    }

    /// Returns a playable URL for `track_id`, reusing the cached one while
    /// it is still inside the margin-adjusted validity window.
    pub fn resolve(&mut self, track_id: &str) -> Result<String, String> {
        self.resolve_at(track_id, Instant::now())
    }

    fn resolve_at(&mut self, track_id: &str, now: Instant) -> Result<String, String> {
        if let Some(entry) = &self.slot {
            if entry.track_id == track_id && now < entry.expires_at {
                return Ok(entry.url.clone());
            }
        }
        let grant = self.resolver.resolve_stream_url(track_id)?;
        Ok(self.store(track_id, grant.url, grant.expires_in_secs, now))
    }

    /// Drops the cached entry unconditionally. Called whenever the bound
    /// track changes or a refresh is forced.
    pub fn invalidate(&mut self) {
        self.slot = None;
    }

    /// Invalidates and asks the backend for a freshly signed URL.
    pub fn refresh(&mut self, track_id: &str) -> Result<String, String> {
        self.refresh_at(track_id, Instant::now())
    }

    fn refresh_at(&mut self, track_id: &str, now: Instant) -> Result<String, String> {
        self.invalidate();
        let grant = self.resolver.refresh_stream_url(track_id)?;
        Ok(self.store(track_id, grant.url, grant.expires_in_secs, now))
    }

    fn store(&mut self, track_id: &str, url: String, expires_in_secs: u64, now: Instant) -> String {
        let window = Duration::from_secs(expires_in_secs).saturating_sub(TTL_SAFETY_MARGIN);
        debug!(
            "StreamUrlCache: cached URL for track {} (usable for {}s)",
            track_id,
            window.as_secs()
        );
        self.slot = Some(CacheEntry {
            track_id: track_id.to_string(),
            url: url.clone(),
            expires_at: now + window,
        });
        url
    }
}
