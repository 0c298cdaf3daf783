//! Per-player and per-item carry state: fixed-size byte mirrors of the last
//! one, two, three, and four values seen for each event kind's payload.
//!
//! The codec never needs more than four generations of history (cubic
//! extrapolation is the highest order used), so each slot keeps four raw
//! payload buffers in a small ring alongside the most recent RNG seed.

use crate::replay::PlayerSlot;
use std::collections::HashMap;

/// Ring of up to four previous raw payloads for one (event kind, slot) pair,
/// newest first.
#[derive(Debug, Clone, Default)]
pub struct History {
    pub gens: [Vec<u8>; 4],
    pub filled: usize,
}

impl History {
    pub fn push(&mut self, payload: &[u8]) {
        self.gens[3] = std::mem::take(&mut self.gens[2]);
        self.gens[2] = std::mem::take(&mut self.gens[1]);
        self.gens[1] = std::mem::take(&mut self.gens[0]);
        self.gens[0] = payload.to_vec();
        self.filled = (self.filled + 1).min(4);
    }

    pub fn latest(&self) -> Option<&[u8]> {
        (self.filled >= 1).then(|| self.gens[0].as_slice())
    }

    pub fn gen(&self, back: usize) -> Option<&[u8]> {
        (self.filled > back).then(|| self.gens[back].as_slice())
    }
}

/// All the carry state the codec threads through one event stream.
#[derive(Debug, Clone, Default)]
pub struct CarryState {
    pub pre_frame: HashMap<PlayerSlot, History>,
    pub post_frame: HashMap<PlayerSlot, History>,
    pub frame_start: History,
    pub bookend: History,
    pub item: HashMap<u32, History>,

    /// Last RNG seed observed anywhere in the stream, in event order. The
    /// game has exactly one RNG stream shared by every player's pre-frame
    /// and frame-start events, so this carry is a single scalar, not one per
    /// player -- otherwise a player's prediction would compare against its
    /// own stale seed from several rolls ago rather than the roll the
    /// engine actually produced in between.
    pub rng_seed: u32,
    /// The match's initial RNG seed (from GAME_START), used by the rollback formula.
    pub rng_seed0: u32,
    /// Last frame number seen overall, for predictive-delta frame numbers.
    pub last_frame: i32,
    /// Per spawn-id, the frame an item was last touched (for sub-shuffle wait counters).
    pub item_last_seen: HashMap<u32, i32>,
    /// Highest spawn id seen so far that was genuinely new this stream.
    pub last_new_item_id: u32,
}

impl CarryState {
    pub fn new(initial_seed: u32, first_frame: i32) -> Self {
        CarryState { rng_seed0: initial_seed, last_frame: first_frame - 1, ..Default::default() }
    }
}
