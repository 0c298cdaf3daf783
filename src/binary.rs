//! Big-endian primitive reads/writes, byte-span comparisons, and hex dumping.
//!
//! The replay's own bytes are stored little-endian on disk at the filesystem level
//! (it's just a byte stream) but every multi-byte field inside an event is big-endian,
//! matching the console's native byte order. [`byteorder`] does the swapping; this
//! module just fixes the endianness so call sites never have to say so again.

use byteorder::{BigEndian, ByteOrder};

#[inline]
pub fn read_u8(buf: &[u8], off: usize) -> u8 {
    buf[off]
}

#[inline]
pub fn read_i8(buf: &[u8], off: usize) -> i8 {
    buf[off] as i8
}

#[inline]
pub fn read_u16(buf: &[u8], off: usize) -> u16 {
    BigEndian::read_u16(&buf[off..off + 2])
}

#[inline]
pub fn read_i16(buf: &[u8], off: usize) -> i16 {
    BigEndian::read_i16(&buf[off..off + 2])
}

#[inline]
pub fn read_u32(buf: &[u8], off: usize) -> u32 {
    BigEndian::read_u32(&buf[off..off + 4])
}

#[inline]
pub fn read_i32(buf: &[u8], off: usize) -> i32 {
    BigEndian::read_i32(&buf[off..off + 4])
}

#[inline]
pub fn read_f32(buf: &[u8], off: usize) -> f32 {
    f32::from_bits(read_u32(buf, off))
}

#[inline]
pub fn write_u8(buf: &mut [u8], off: usize, v: u8) {
    buf[off] = v;
}

#[inline]
pub fn write_u16(buf: &mut [u8], off: usize, v: u16) {
    BigEndian::write_u16(&mut buf[off..off + 2], v);
}

#[inline]
pub fn write_i32(buf: &mut [u8], off: usize, v: i32) {
    BigEndian::write_i32(&mut buf[off..off + 4], v);
}

#[inline]
pub fn write_u32(buf: &mut [u8], off: usize, v: u32) {
    BigEndian::write_u32(&mut buf[off..off + 4], v);
}

#[inline]
pub fn write_f32(buf: &mut [u8], off: usize, v: f32) {
    write_u32(buf, off, v.to_bits());
}

/// XORs `dst[range]` with `key[range]` in place.
#[inline]
pub fn xor_span(dst: &mut [u8], key: &[u8], start: usize, stop: usize) {
    for i in start..stop {
        dst[i] ^= key[i];
    }
}

/// Renders a byte slice as a space-separated hex dump, e.g. `0x01 0x02 0xff`.
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:#04x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compares two buffers byte-for-byte, returning up to `max` `(offset, a, b)` mismatches.
/// Used by the codec's validation pass to report where a round-trip diverged.
pub fn diff(a: &[u8], b: &[u8], max: usize) -> Vec<(usize, u8, u8)> {
    let mut out = Vec::new();
    for i in 0..a.len().min(b.len()) {
        if a[i] != b[i] {
            out.push((i, a[i], b[i]));
            if out.len() >= max {
                break;
            }
        }
    }
    out
}
