//! Error kinds shared by the parser, codec, and shuffler.
//!
//! Matches the split described for the format: a handful of kinds are fatal
//! (they abort the current file), the rest are recoverable and simply bump
//! an error counter on the in-progress [`crate::replay::Replay`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SlippcError {
    #[error("could not open file: {0}")]
    IoOpen(#[from] std::io::Error),

    #[error("file is too short to be a valid replay ({found} bytes, need at least {min})")]
    TooShort { found: usize, min: usize },

    #[error("file did not start with the expected Slippi header")]
    BadMagic,

    #[error("event of code {code:#x} was truncated at offset {offset}")]
    TruncatedEvent { code: u8, offset: usize },

    #[error("event code {code:#x} appeared twice in the event-payload-sizes table")]
    DuplicateSizeEntry { code: u8 },

    #[error("required event {code:#x} was never seen")]
    MissingRequiredEvent { code: u8 },

    #[error("frame index {frame} out of bounds (must be in [-123, {max_frames}))")]
    BadFrameIndex { frame: i32, max_frames: i32 },

    #[error("player index {index} out of bounds")]
    BadPlayerIndex { index: usize },

    #[error("stage or character id {id} is not recognized")]
    InvalidStageOrCharId { id: u32 },

    #[error("failed to parse metadata UBJSON tree: {0}")]
    MetadataParse(String),

    #[error("replay version {major}.{minor}.{revision} is newer than this codec supports")]
    VersionTooNew { major: u8, minor: u8, revision: u8 },

    #[error("decode(encode(replay)) did not reproduce the original bytes; first mismatch at offset {offset}")]
    ValidationMismatch { offset: usize },

    #[error("generic stream (de)compression failed: {0}")]
    Compression(String),

    #[error("replay is missing its GAME_END event")]
    NoGameEnd,

    #[error("got stuck while unshuffling item events; stream is internally inconsistent")]
    ShuffleStuck,

    #[error("output path '{0}' does not match the `.slp`/`.zlp` extension rule for this replay")]
    BadOutputExtension(String),

    #[error("refusing to overwrite existing file '{0}'")]
    OutputExists(String),
}

pub type Result<T> = std::result::Result<T, SlippcError>;

/// A non-fatal issue recorded while parsing or encoding a single replay. Replays keep
/// accumulating these on a running counter rather than aborting (see [`crate::replay::Replay::errors`]).
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Diagnostic { message: message.into() }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
