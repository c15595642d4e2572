//! Ordered play queue with a current-track pointer, repeat-aware
//! navigation, and a continuity-preserving shuffle.

use rand::{rngs::StdRng, RngExt, SeedableRng};

use crate::protocol::{Direction, RepeatMode, Track};

/// Ordered track list plus the pointer to the active entry.
///
/// Edits never change which track is current as a side effect: removing the
/// current entry is rejected, and removals/moves before the pointer shift
/// it so the referenced track keeps its identity.
pub struct Queue {
    tracks: Vec<Track>,
    position: usize,
    /// Pre-shuffle sequence, non-empty only while shuffle is active.
    saved_order: Vec<Track>,
    shuffled: bool,
    // Use StdRng instead of ThreadRng for thread safety
    rng_seed: [u8; 32],
}

impl Queue {
    pub fn new() -> Queue {
        // Generate a random seed
        let mut seed = [0u8; 32];
        getrandom::fill(&mut seed).expect("Failed to generate random seed");

        Queue {
            tracks: Vec::new(),
            position: 0,
            saved_order: Vec::new(),
            shuffled: false,
            rng_seed: seed,
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffled
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// The track under the pointer, if any.
    pub fn current(&self) -> Option<&Track> {
        self.tracks.get(self.position)
    }

    /// Replaces the queue contents and points at the entry with `start_id`,
    /// falling back to the first entry when the id is not present.
    pub fn set_queue(&mut self, tracks: Vec<Track>, start_id: &str) {
        self.tracks = tracks;
        self.position = self
            .tracks
            .iter()
            .position(|track| track.id == start_id)
            .unwrap_or(0);
        if self.shuffled {
            // Shuffle is a sticky preference: re-snapshot the new sequence
            // and randomize its unplayed tail.
            self.saved_order = self.tracks.clone();
            self.shuffle_tail();
        } else {
            self.saved_order.clear();
        }
    }

    /// Appends a track unless its id is already queued.
    pub fn append(&mut self, track: Track) {
        if self.tracks.iter().any(|queued| queued.id == track.id) {
            return;
        }
        if self.shuffled {
            self.saved_order.push(track.clone());
        }
        self.tracks.push(track);
    }

    /// Inserts a track immediately after the current one. An entry with the
    /// same id elsewhere in the queue is moved rather than duplicated;
    /// requesting the current track is a no-op.
    pub fn insert_after_current(&mut self, track: Track) {
        if self
            .current()
            .is_some_and(|current| current.id == track.id)
        {
            return;
        }

        if let Some(existing) = self
            .tracks
            .iter()
            .position(|queued| queued.id == track.id)
        {
            self.tracks.remove(existing);
            if existing < self.position {
                self.position -= 1;
            }
        } else if self.shuffled {
            self.saved_order.push(track.clone());
        }

        if self.tracks.is_empty() {
            self.tracks.push(track);
            self.position = 0;
        } else {
            let insert_at = (self.position + 1).min(self.tracks.len());
            self.tracks.insert(insert_at, track);
        }
    }

    /// Removes the entry at `index`. Out-of-range indices and the current
    /// entry are rejected silently.
    pub fn remove_at(&mut self, index: usize) {
        if index >= self.tracks.len() || index == self.position {
            return;
        }
        let removed = self.tracks.remove(index);
        if index < self.position {
            self.position -= 1;
        }
        if self.shuffled {
            self.saved_order.retain(|track| track.id != removed.id);
        }
    }

    /// Relocates the entry at `from` to `to`. Moves touching the current
    /// entry, identity moves, and out-of-range indices are rejected.
    pub fn move_to(&mut self, from: usize, to: usize) {
        if from == to || from == self.position || to == self.position {
            return;
        }
        if from >= self.tracks.len() || to >= self.tracks.len() {
            return;
        }
        let track = self.tracks.remove(from);
        self.tracks.insert(to, track);
        if from < self.position && to >= self.position {
            self.position -= 1;
        } else if from > self.position && to <= self.position {
            self.position += 1;
        }
    }

    /// Moves the pointer one step and returns the new current track, or
    /// `None` when the boundary is reached and `repeat_mode` does not wrap.
    /// Only `RepeatMode::All` wraps; `One` is handled by the caller on
    /// track end and behaves like `Off` here.
    pub fn advance(&mut self, direction: Direction, repeat_mode: RepeatMode) -> Option<&Track> {
        if self.tracks.is_empty() {
            return None;
        }
        match direction {
            Direction::Forward => {
                if self.position + 1 < self.tracks.len() {
                    self.position += 1;
                } else if repeat_mode == RepeatMode::All {
                    self.position = 0;
                } else {
                    return None;
                }
            }
            Direction::Backward => {
                if self.position > 0 {
                    self.position -= 1;
                } else if repeat_mode == RepeatMode::All {
                    self.position = self.tracks.len() - 1;
                } else {
                    return None;
                }
            }
        }
        self.tracks.get(self.position)
    }

    /// Points the queue at `index` without any other mutation. Out-of-range
    /// indices are rejected.
    pub fn jump_to(&mut self, index: usize) -> Option<&Track> {
        if index >= self.tracks.len() {
            return None;
        }
        self.position = index;
        self.tracks.get(self.position)
    }

    /// Toggles shuffle. Enabling snapshots the sequence and randomizes only
    /// the tail after the current entry, so the active track and the
    /// already-played history keep their places. Disabling restores the
    /// snapshot and relocates the pointer to the current track's id.
    pub fn toggle_shuffle(&mut self) {
        if self.shuffled {
            self.shuffled = false;
            if self.saved_order.is_empty() {
                return;
            }
            let current_id = self.current().map(|track| track.id.clone());
            self.tracks = std::mem::take(&mut self.saved_order);
            self.position = match current_id
                .and_then(|id| self.tracks.iter().position(|track| track.id == id))
            {
                Some(index) => index,
                // The current id can only be missing after snapshot
                // drift; stay near the old place instead of jumping to 0.
                None => self.position.min(self.tracks.len().saturating_sub(1)),
            };
        } else {
            self.shuffled = true;
            self.saved_order = self.tracks.clone();
            self.shuffle_tail();
        }
    }

    /// Empties the queue and resets the pointer.
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.saved_order.clear();
        self.position = 0;
    }

    // Fisher-Yates over the entries after the current one, in place.
    fn shuffle_tail(&mut self) {
        let start = self.position + 1;
        if start >= self.tracks.len() {
            return;
        }
        let tail = &mut self.tracks[start..];
        let mut rng = StdRng::from_seed(self.rng_seed);
        for i in (1..tail.len()).rev() {
            let j = rng.random_range(0..=i);
            tail.swap(i, j);
        }
        self.advance_seed();
    }

    fn advance_seed(&mut self) {
        let mut new_seed = [0u8; 32];
        for (i, val) in new_seed.iter_mut().enumerate() {
            *val = self.rng_seed[i].wrapping_add(1);
        }
        self.rng_seed = new_seed;
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}
