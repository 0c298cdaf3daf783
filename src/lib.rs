//! `slippc`: parses, analyzes, and losslessly re-encodes Slippi replay files.
//!
//! The pieces compose as a pipeline: [`compress`] strips the outer zstd
//! wrapper (if any), [`parser`] walks the resulting `.slp` bytes into a
//! [`replay::Replay`] plus a raw [`stream::EventStream`] for the game loop,
//! [`codec`] and [`shuffle`] reversibly transform that stream for storage,
//! and [`analyzer`] derives higher-level play-by-play structure from a
//! parsed `Replay`.

pub mod action_state;
pub mod analyzer;
pub mod binary;
pub mod codec;
pub mod compress;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod replay;
pub mod schema;
pub mod shuffle;
pub mod stream;
pub mod ubjson;
