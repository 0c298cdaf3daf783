//! Event and column shuffling (C7): reorders the rollback-aware interleaved
//! game-loop stream into grouped, transposed, bit-planed columns so the
//! generic compressor (C3) sees long runs instead of noisy interleaving.
//!
//! Two reversible passes:
//! - Pass A ([`group_events`] / [`ungroup_events`]) bins events by
//!   `(event code, player index)` and records, in reserved high bits of the
//!   action id / item type fields, how many times each frame repeated due to
//!   rollback so the original interleaving can be rebuilt exactly.
//! - Pass B ([`transpose_bin`] / [`untranspose_bin`]) transposes each bin's
//!   fixed-width row records into columns, with bit-plane transposition for
//!   columns the schema flags as sparse at the bit level.

use crate::binary::{read_i32, read_u16, write_u16};
use crate::schema::{ColumnWidths, O_FOLLOWER, O_FRAME, O_PLAYER};
use crate::stream::{EventStream, RawEvent};

/// Mask over the action-id / item-type field's top two bits: how many times
/// this player/item's frame has already repeated (rollback replay count) at
/// the point this event was recorded.
pub const DEFER_BITS_MASK: u16 = 0xC000;
pub const DEFER_BITS_SHIFT: u32 = 14;

const NUM_BINS: usize = 20;

fn bin_index(code: u8, slot: usize) -> usize {
    match code {
        0x3A => 0,              // frame_start
        0x37 => 1 + slot,       // pre_frame, slots 0..7
        0x3B => 9,              // item_update
        0x38 => 10 + slot,      // post_frame, slots 0..7
        0x3D => 18,             // bookend
        0x10 => 19,             // split_message
        _ => unreachable!("shuffle only runs over the closed game-loop event set"),
    }
}

fn bin_event_code(bin: usize) -> u8 {
    match bin {
        0 => 0x3A,
        1..=8 => 0x37,
        9 => 0x3B,
        10..=17 => 0x38,
        18 => 0x3D,
        19 => 0x10,
        _ => unreachable!(),
    }
}

fn player_slot(code: u8, payload: &[u8]) -> usize {
    if code == 0x37 || code == 0x38 {
        let port = payload[O_PLAYER] as usize;
        let follower = payload[O_FOLLOWER] != 0;
        port + if follower { 4 } else { 0 }
    } else {
        0
    }
}

/// Action-id-like field offset to stash defer bits in, per event code.
fn defer_field_offset(code: u8) -> Option<usize> {
    match code {
        0x37 => Some(crate::schema::O_ACTION_PRE),
        0x38 => Some(crate::schema::O_ACTION_POST),
        _ => None,
    }
}

/// Output of [`group_events`]: the 20 bins, plus a parallel "which tick" index
/// for each item/split-message event (the only bins whose per-tick count can
/// be anything other than 0 or 1), so [`ungroup_events`] can re-interleave them.
pub struct GroupedBins {
    pub bins: Vec<Vec<RawEvent>>,
    pub item_ticks: Vec<u32>,
    pub split_ticks: Vec<u32>,
}

/// Pass A: groups `stream`'s events into 20 contiguous bins, in bin order,
/// tagging each pre/post-frame event's defer bits with how many times this
/// exact frame number has already been seen for this player slot (rollback
/// repeat count).
///
/// A "tick" is one pass through the frame loop -- bounded by consecutive
/// `BOOKEND` events, the one event every supported version emits exactly once
/// per simulated frame (including rollback re-simulations), making it the
/// stable anchor frame_start itself can't always be (older replays predate it).
pub fn group_events(stream: &EventStream) -> GroupedBins {
    let mut bins: Vec<Vec<RawEvent>> = (0..NUM_BINS).map(|_| Vec::new()).collect();
    let mut dupe_count: std::collections::HashMap<(usize, i32), u16> = std::collections::HashMap::new();
    let mut item_ticks = Vec::new();
    let mut split_ticks = Vec::new();
    let mut tick: u32 = 0;

    for event in &stream.events {
        let mut ev = event.clone();
        let slot = player_slot(ev.code, &ev.payload);
        let bin = bin_index(ev.code, slot);

        if let Some(off) = defer_field_offset(ev.code) {
            let frame = read_i32(&ev.payload, O_FRAME);
            let key = (bin, frame);
            let count = dupe_count.entry(key).or_insert(0);
            let defer = *count;
            *count += 1;
            let raw = read_u16(&ev.payload, off);
            debug_assert_eq!(
                raw & DEFER_BITS_MASK,
                0,
                "action id already used its top bits; shuffler cannot overload them safely"
            );
            write_u16(&mut ev.payload, off, (raw & !DEFER_BITS_MASK) | ((defer << DEFER_BITS_SHIFT) & DEFER_BITS_MASK));
        }

        match bin {
            9 => item_ticks.push(tick),
            19 => split_ticks.push(tick),
            _ => {}
        }

        let is_bookend = ev.code == 0x3D;
        bins[bin].push(ev);
        if is_bookend {
            tick += 1;
        }
    }
    GroupedBins { bins, item_ticks, split_ticks }
}

/// Reverses [`group_events`]: replays one tick at a time (frame_start, one
/// event per populated pre-frame bin, every item/split event recorded for
/// this tick, one event per populated post-frame bin, then bookend), clearing
/// the defer bits [`group_events`] stashed along the way.
pub fn ungroup_events(grouped: &GroupedBins) -> EventStream {
    let GroupedBins { bins, item_ticks, split_ticks } = grouped;
    let mut cursors = vec![0usize; NUM_BINS];
    let mut out = EventStream::new();

    let total_ticks = bins[18].len().max(1);
    for tick in 0..total_ticks as u32 {
        for &bin in &[0usize] {
            pop_one(&mut out, bins, &mut cursors, bin);
        }
        for bin in 1..=8 {
            pop_one(&mut out, bins, &mut cursors, bin);
        }
        pop_while_tick_matches(&mut out, bins, &mut cursors, 9, item_ticks, tick);
        for bin in 10..=17 {
            pop_one(&mut out, bins, &mut cursors, bin);
        }
        pop_while_tick_matches(&mut out, bins, &mut cursors, 19, split_ticks, tick);
        pop_one(&mut out, bins, &mut cursors, 18);
    }
    // Anything left over (stream didn't end on a clean bookend) is flushed in bin order.
    for bin in 0..NUM_BINS {
        while cursors[bin] < bins[bin].len() {
            push_cleared(&mut out, &bins[bin][cursors[bin]]);
            cursors[bin] += 1;
        }
    }
    out
}

fn push_cleared(out: &mut EventStream, ev: &RawEvent) {
    let mut ev = ev.clone();
    if let Some(off) = defer_field_offset(ev.code) {
        let raw = read_u16(&ev.payload, off);
        write_u16(&mut ev.payload, off, raw & !DEFER_BITS_MASK);
    }
    out.events.push(ev);
}

fn pop_one(out: &mut EventStream, bins: &[Vec<RawEvent>], cursors: &mut [usize], bin: usize) {
    if cursors[bin] < bins[bin].len() {
        push_cleared(out, &bins[bin][cursors[bin]]);
        cursors[bin] += 1;
    }
}

fn pop_while_tick_matches(
    out: &mut EventStream,
    bins: &[Vec<RawEvent>],
    cursors: &mut [usize],
    bin: usize,
    ticks: &[u32],
    tick: u32,
) {
    while cursors[bin] < bins[bin].len() && ticks.get(cursors[bin]).copied() == Some(tick) {
        push_cleared(out, &bins[bin][cursors[bin]]);
        cursors[bin] += 1;
    }
}

/// Pass B: transposes `rows` (each exactly `widths.iter().map(i32::unsigned_abs).sum()`
/// bytes) into column-major order. A negative width column is transposed bit-plane
/// by bit-plane (MSB first across all rows, then next bit, ...) instead of byte by byte.
pub fn transpose_bin(rows: &[Vec<u8>], widths: &[i32]) -> Vec<u8> {
    let n = rows.len();
    let mut out = Vec::new();
    let mut col_off = 0usize;
    for &w in widths {
        if w == 0 {
            continue;
        }
        let width = w.unsigned_abs() as usize;
        if w > 0 {
            for b in 0..width {
                for row in rows {
                    out.push(row[col_off + b]);
                }
            }
        } else {
            // Bit-plane transpose: only single-byte negative-width columns are used.
            debug_assert_eq!(width, 1);
            for bit in (0..8).rev() {
                let mut acc = 0u8;
                let mut count = 0u8;
                for row in rows {
                    let b = (row[col_off] >> bit) & 1;
                    acc = (acc << 1) | b;
                    count += 1;
                    if count == 8 {
                        out.push(acc);
                        acc = 0;
                        count = 0;
                    }
                }
                if count > 0 {
                    out.push(acc << (8 - count));
                }
            }
        }
        col_off += width;
    }
    out
}

/// Reverses [`transpose_bin`] given the same `widths` and row count `n`.
pub fn untranspose_bin(columns: &[u8], widths: &[i32], n: usize) -> Vec<Vec<u8>> {
    let row_width: usize = widths.iter().map(|w| w.unsigned_abs() as usize).sum();
    let mut rows = vec![vec![0u8; row_width]; n];
    let mut pos = 0usize;
    let mut col_off = 0usize;
    for &w in widths {
        if w == 0 {
            continue;
        }
        let width = w.unsigned_abs() as usize;
        if w > 0 {
            for b in 0..width {
                for row in rows.iter_mut() {
                    row[col_off + b] = columns[pos];
                    pos += 1;
                }
            }
        } else {
            debug_assert_eq!(width, 1);
            let packed_bytes_per_bitplane = n.div_ceil(8);
            for bit in (0..8).rev() {
                let plane = &columns[pos..pos + packed_bytes_per_bitplane];
                pos += packed_bytes_per_bitplane;
                for (i, row) in rows.iter_mut().enumerate() {
                    let byte = plane[i / 8];
                    let shift = 7 - (i % 8);
                    let b = (byte >> shift) & 1;
                    row[col_off] |= b << bit;
                }
            }
        }
        col_off += width;
    }
    rows
}

/// Walks the game-loop span, running both shuffle passes in order with the
/// version-gated column widths already truncated.
pub fn shuffle(stream: &EventStream, widths: &ColumnWidths) -> Vec<u8> {
    let grouped = group_events(stream);
    let mut out = Vec::new();
    for (bin, events) in grouped.bins.iter().enumerate() {
        let widths = widths_for_bin(widths, bin);
        let rows: Vec<Vec<u8>> = events.iter().map(|e| e.payload.clone()).collect();
        out.extend_from_slice(&(rows.len() as u32).to_be_bytes());
        if bin == 9 {
            for &t in &grouped.item_ticks {
                out.extend_from_slice(&t.to_be_bytes());
            }
        } else if bin == 19 {
            for &t in &grouped.split_ticks {
                out.extend_from_slice(&t.to_be_bytes());
            }
        }
        out.extend(transpose_bin(&rows, widths));
    }
    out
}

/// Reverses [`shuffle`]. Returns the reconstructed stream alongside how many
/// bytes of `bytes` the shuffled blob actually occupied, since it's a
/// self-delimiting binary format embedded inside a larger replay buffer
/// rather than a whole file on its own.
pub fn unshuffle(bytes: &[u8], widths: &ColumnWidths) -> (EventStream, usize) {
    let mut bins: Vec<Vec<RawEvent>> = Vec::with_capacity(NUM_BINS);
    let mut item_ticks = Vec::new();
    let mut split_ticks = Vec::new();
    let mut pos = 0usize;
    for bin in 0..NUM_BINS {
        let w = widths_for_bin(widths, bin);
        let n = u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        if bin == 9 || bin == 19 {
            let ticks = (0..n)
                .map(|_| {
                    let t = u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap());
                    pos += 4;
                    t
                })
                .collect::<Vec<_>>();
            if bin == 9 {
                item_ticks = ticks;
            } else {
                split_ticks = ticks;
            }
        }
        let packed_len = w
            .iter()
            .map(|&c| {
                if c == 0 {
                    0
                } else if c > 0 {
                    c as usize * n
                } else {
                    8 * n.div_ceil(8)
                }
            })
            .sum::<usize>();
        let cols = &bytes[pos..pos + packed_len];
        pos += packed_len;
        let rows = untranspose_bin(cols, w, n);
        let code = bin_event_code(bin);
        bins.push(rows.into_iter().map(|payload| RawEvent { code, payload }).collect());
    }
    (ungroup_events(&GroupedBins { bins, item_ticks, split_ticks }), pos)
}

fn widths_for_bin(widths: &ColumnWidths, bin: usize) -> &[i32] {
    match bin {
        0 => &widths.frame_start,
        1..=8 => &widths.pre_frame,
        9 => &widths.item_update,
        10..=17 => &widths.post_frame,
        18 => &widths.bookend,
        19 => &widths.split_message,
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transpose_round_trips_byte_columns() {
        let widths = [2, 1];
        let rows = vec![vec![1, 2, 9], vec![3, 4, 8], vec![5, 6, 7]];
        let cols = transpose_bin(&rows, &widths);
        let back = untranspose_bin(&cols, &widths, rows.len());
        assert_eq!(back, rows);
    }

    #[test]
    fn transpose_round_trips_bitplane_column() {
        let widths = [-1i32];
        let rows = vec![vec![0b1010_0101], vec![0b1111_0000], vec![0b0000_1111]];
        let cols = transpose_bin(&rows, &widths);
        let back = untranspose_bin(&cols, &widths, rows.len());
        assert_eq!(back, rows);
    }
}
