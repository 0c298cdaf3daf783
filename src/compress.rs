//! Generic stream compression adapter.
//!
//! The codec treats compression as an opaque `compress(bytes) -> bytes` /
//! `decompress(bytes) -> bytes` pair; it never needs to know which algorithm backs it.
//! We use zstd, statically linked, the same way the upstream `.slpz` tooling does.

use crate::error::{Result, SlippcError};

/// Recognizable header written in front of a compressed (`.zlp`) replay so a reader can
/// sniff the format without touching zstd itself.
pub const COMPRESSED_MAGIC: [u8; 6] = *b"SLIPPC";

pub struct Compressor {
    ctx: zstd::bulk::Compressor<'static>,
}

pub struct Decompressor {
    ctx: zstd::bulk::Decompressor<'static>,
}

impl Compressor {
    /// `level` should be between 0..=19; the upstream default is 3.
    pub fn new(level: i32) -> Result<Compressor> {
        let ctx = zstd::bulk::Compressor::new(level)
            .map_err(|e| SlippcError::Compression(e.to_string()))?;
        Ok(Compressor { ctx })
    }
}

impl Decompressor {
    pub fn new() -> Result<Decompressor> {
        let ctx = zstd::bulk::Decompressor::new()
            .map_err(|e| SlippcError::Compression(e.to_string()))?;
        Ok(Decompressor { ctx })
    }
}

/// Returns true if `bytes` starts with the compressed-stream magic.
pub fn is_compressed(bytes: &[u8]) -> bool {
    bytes.len() >= COMPRESSED_MAGIC.len() && bytes[..COMPRESSED_MAGIC.len()] == COMPRESSED_MAGIC
}

/// Wraps `payload` in the magic header and compresses it as a single frame.
pub fn compress(compressor: &mut Compressor, payload: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(COMPRESSED_MAGIC.len() + payload.len() / 4);
    out.extend_from_slice(&COMPRESSED_MAGIC);
    let body = compressor
        .ctx
        .compress(payload)
        .map_err(|e| SlippcError::Compression(e.to_string()))?;
    out.extend_from_slice(&body);
    Ok(out)
}

/// Strips the magic header and inflates the remainder. `hint` is the expected
/// decompressed size (unknown inputs can pass `payload.len() * 32` as a starting guess).
pub fn decompress(decompressor: &mut Decompressor, bytes: &[u8], hint: usize) -> Result<Vec<u8>> {
    if !is_compressed(bytes) {
        return Err(SlippcError::Compression("missing compressed-stream magic".into()));
    }
    decompressor
        .ctx
        .decompress(&bytes[COMPRESSED_MAGIC.len()..], hint)
        .map_err(|e| SlippcError::Compression(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_bytes() {
        let payload: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let mut c = Compressor::new(3).unwrap();
        let compressed = compress(&mut c, &payload).unwrap();
        assert!(is_compressed(&compressed));

        let mut d = Decompressor::new().unwrap();
        let restored = decompress(&mut d, &compressed, payload.len()).unwrap();
        assert_eq!(restored, payload);
    }

    #[test]
    fn rejects_uncompressed_input() {
        let mut d = Decompressor::new().unwrap();
        assert!(decompress(&mut d, b"{U\x03raw", 16).is_err());
    }
}
