//! The encoder/decoder (C6): a reversible, byte-identical transform over the
//! game-loop event stream.
//!
//! [`Codec`] owns the carry state for one replay and exposes [`Codec::encode`]
//! / [`Codec::decode`], each of which walks an [`crate::stream::EventStream`]
//! event-by-event and rewrites its payload bytes in place. Everything here
//! operates purely on bytes; the parsed [`crate::replay::Replay`] model is a
//! separate, higher-level view built independently by [`crate::parser`].

mod carry;
pub mod decode;
pub mod encode;
pub mod float_pred;
pub mod rng;

use crate::error::{Result, SlippcError};
use crate::replay::PlayerSlot;
use crate::schema::Version;
use crate::stream::EventStream;
use carry::CarryState;

/// Byte offset of the "already encoded" flag within `GAME_START`'s payload
/// (one past the version triple + the generic-stream-encoding byte itself).
pub const O_ENCODED_FLAG: usize = crate::schema::O_SLP_ENC;

/// Version tag the encoder stamps into the encoded-flag byte. Any nonzero
/// value means "encoded"; the decoder treats the byte itself as opaque and
/// simply zeros it.
pub const ENCODER_VERSION_TAG: u8 = 2;

pub struct Codec {
    version: Version,
    seed0: u32,
}

impl Codec {
    pub fn new(version: Version, initial_rng_seed: u32) -> Self {
        Codec { version, seed0: initial_rng_seed }
    }

    /// Rewrites every event in `stream` from raw to encoded form, in place.
    ///
    /// Replays from 3.13.0 onward are refused outright: the codec's predictive
    /// transforms were never validated against that schema generation.
    pub fn encode(&self, stream: &mut EventStream) -> Result<()> {
        self.check_version_ceiling()?;
        let mut state = CarryState::new(self.seed0, 0);
        for event in &mut stream.events {
            encode::encode_event(event, self.version, &mut state);
        }
        Ok(())
    }

    /// Rewrites every event in `stream` from encoded back to raw form, in place.
    pub fn decode(&self, stream: &mut EventStream) -> Result<()> {
        self.check_version_ceiling()?;
        let mut state = CarryState::new(self.seed0, 0);
        for event in &mut stream.events {
            decode::decode_event(event, self.version, &mut state);
        }
        Ok(())
    }

    fn check_version_ceiling(&self) -> Result<()> {
        if self.version.at_least(3, 13, 0) {
            return Err(SlippcError::VersionTooNew {
                major: self.version.major,
                minor: self.version.minor,
                revision: self.version.revision,
            });
        }
        Ok(())
    }
}

/// Player slot this event belongs to, or `None` for stream-wide events
/// (`FRAME_START`, `BOOKEND`, `ITEM_UPDATE` which is keyed by spawn id instead).
pub fn event_player_slot(code: u8, payload: &[u8]) -> Option<PlayerSlot> {
    use crate::binary::read_u8;
    use crate::schema::{O_FOLLOWER, O_PLAYER};
    match code {
        0x37 | 0x38 => {
            let port = read_u8(payload, O_PLAYER) as usize;
            let follower = read_u8(payload, O_FOLLOWER) != 0;
            Some(port + if follower { 4 } else { 0 })
        }
        _ => None,
    }
}
