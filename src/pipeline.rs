//! Glue between the individually-testable pieces: generic compression,
//! parsing, the predictive codec, and the column shuffler.
//!
//! [`encode`] takes a raw (or already-compressed) `.slp` buffer and produces
//! a compressed, shuffled `.zlp` buffer; [`decode`] reverses it. Both run a
//! round-trip validation pass by default, matching the safety rail described
//! for the CLI: if decoding what was just encoded doesn't reproduce the
//! input bytes exactly, the whole operation fails rather than writing out a
//! replay that silently doesn't match the source.

use crate::binary;
use crate::codec::Codec;
use crate::compress::{self, Compressor, Decompressor};
use crate::error::{Result, SlippcError};
use crate::parser::Parser;
use crate::replay::Replay;
use crate::schema::{ColumnWidths, Version, EventCode, SLP_HEADER, O_SLP_ENC, O_SLP_MAJ, O_SLP_MIN, O_SLP_REV, O_RNG_GAME_START};
use crate::shuffle;

/// Knobs a caller (chiefly the CLI) can set on an encode pass.
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    pub compression_level: i32,
    /// When true, decode the freshly encoded bytes back and compare against
    /// the input before returning. On by default; only the CLI's `-f` (force)
    /// path should ever turn this off.
    pub validate: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions { compression_level: 3, validate: true }
    }
}

/// Parses a raw `.slp` buffer (decompressing it first if it's already a
/// `.zlp`) into a [`Replay`], without touching the codec or shuffler. This is
/// what `-j`/`-a` dumping wants: the semantic model, not a re-encoded stream.
pub fn parse_for_inspection(bytes: &[u8]) -> Result<Replay> {
    let raw = ensure_decompressed(bytes)?;
    let parsed = Parser::new(0).parse(&raw)?;
    Ok(parsed.replay)
}

fn ensure_decompressed(bytes: &[u8]) -> Result<Vec<u8>> {
    if compress::is_compressed(bytes) {
        let mut d = Decompressor::new()?;
        compress::decompress(&mut d, bytes, bytes.len() * 8)
    } else {
        Ok(bytes.to_vec())
    }
}

/// Encodes a raw (decompressed) `.slp` buffer into a shuffled, compressed
/// `.zlp` buffer.
pub fn encode(raw: &[u8], opts: &EncodeOptions) -> Result<Vec<u8>> {
    let parser = Parser::new(0);
    let parsed = parser.parse(raw)?;
    if parsed.game_end_raw.is_empty() {
        return Err(SlippcError::NoGameEnd);
    }

    let version = parsed.replay.version;
    let seed0 = binary::read_u32(&parsed.game_start_raw, O_RNG_GAME_START);

    let mut game_loop = parsed.game_loop.clone();
    let codec = Codec::new(version, seed0);
    codec.encode(&mut game_loop)?;

    let mut widths = ColumnWidths::new();
    widths.truncate_to_version(version);
    let shuffled_body = shuffle::shuffle(&game_loop, &widths);

    let mut game_start_raw = parsed.game_start_raw.clone();
    binary::write_u8(&mut game_start_raw, O_SLP_ENC, crate::codec::ENCODER_VERSION_TAG);

    let raw_out = reassemble(&parsed.size_table, &game_start_raw, &shuffled_body, &parsed.game_end_raw, &parsed.metadata_raw);

    if opts.validate {
        let decoded_check = decode_raw(&raw_out)?;
        if let Some((offset, _, _)) = binary::diff(raw, &decoded_check, 1).into_iter().next() {
            return Err(SlippcError::ValidationMismatch { offset });
        }
    }

    let mut compressor = Compressor::new(opts.compression_level)?;
    compress::compress(&mut compressor, &raw_out)
}

/// Decodes a `.zlp` buffer (compressed, shuffled, codec-encoded) back into a
/// raw `.slp` buffer.
pub fn decode(bytes: &[u8]) -> Result<Vec<u8>> {
    let raw_in = ensure_decompressed(bytes)?;
    decode_raw(&raw_in)
}

/// Decodes an already-decompressed `.zlp` stream.
fn decode_raw(raw_in: &[u8]) -> Result<Vec<u8>> {
    let parser = Parser::new(0);
    let split = parser.split_header(raw_in)?;

    if binary::read_u8(&split.game_start_raw, O_SLP_ENC) == 0 {
        // Not actually encoded -- hand back the input untouched, the same
        // way the upstream tool treats re-running itself on a raw file.
        return Ok(raw_in.to_vec());
    }

    let version = Version::new(
        binary::read_u8(&split.game_start_raw, O_SLP_MAJ),
        binary::read_u8(&split.game_start_raw, O_SLP_MIN),
        binary::read_u8(&split.game_start_raw, O_SLP_REV),
    );
    let seed0 = binary::read_u32(&split.game_start_raw, O_RNG_GAME_START);

    let mut widths = ColumnWidths::new();
    widths.truncate_to_version(version);

    let (mut game_loop, consumed) = shuffle::unshuffle(&raw_in[split.body_start..], &widths);
    let codec = Codec::new(version, seed0);
    codec.decode(&mut game_loop)?;

    let game_end_start = split.body_start + consumed;
    let game_end_raw = raw_in[game_end_start..split.stream_end].to_vec();
    if game_end_raw.is_empty() || game_end_raw[0] != EventCode::GameEnd as u8 {
        return Err(SlippcError::NoGameEnd);
    }

    let mut decoded_start = split.game_start_raw.clone();
    binary::write_u8(&mut decoded_start, O_SLP_ENC, 0);

    let metadata_raw = raw_in[split.stream_end..].to_vec();
    Ok(reassemble(&split.size_table, &decoded_start, &game_loop.to_bytes(), &game_end_raw, &metadata_raw))
}

fn reassemble(
    size_table: &std::collections::HashMap<u8, u16>,
    game_start_raw: &[u8],
    body: &[u8],
    game_end_raw: &[u8],
    metadata_raw: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(15 + game_start_raw.len() + body.len() + game_end_raw.len() + metadata_raw.len());
    out.extend_from_slice(&SLP_HEADER);
    out.extend_from_slice(&[0u8; 4]);
    Parser::new(0).write_size_table_public(&mut out, size_table);
    out.extend_from_slice(game_start_raw);
    out.extend_from_slice(body);
    out.extend_from_slice(game_end_raw);
    let raw_len = (out.len() - 15) as u32;
    binary::write_u32(&mut out, 11, raw_len);
    out.extend_from_slice(metadata_raw);
    out
}

/// The `.slp`/`.zlp` extension rule the CLI enforces on output paths: decoded
/// output must end `.slp`, encoded output must end `.zlp`.
pub fn expected_extension(encoding: bool) -> &'static str {
    if encoding { "zlp" } else { "slp" }
}

pub fn check_output_extension(path: &str, encoding: bool) -> Result<()> {
    let want = expected_extension(encoding);
    if path.rsplit('.').next() == Some(want) {
        Ok(())
    } else {
        Err(SlippcError::BadOutputExtension(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_rule_matches_encoding_direction() {
        assert!(check_output_extension("game.zlp", true).is_ok());
        assert!(check_output_extension("game.slp", false).is_ok());
        assert!(check_output_extension("game.slp", true).is_err());
        assert!(check_output_extension("game.zlp", false).is_err());
    }
}
