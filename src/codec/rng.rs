//! RNG state prediction.
//!
//! Melee's RNG has gone through two eras. Legacy games (pre-rollback netcode)
//! advance a single LCG once per roll. Rollback-era games instead derive the
//! seed for frame `f` directly from `f` and the match's initial seed, which
//! means the encoder doesn't need to replay history at all -- it can just
//! check whether the *formula* already predicts the observed seed.

/// Number of forward iterations the encoder will try before giving up and
/// falling back to storing the seed verbatim.
pub const MAX_ROLLS: u32 = 128;

/// High bit of an encoded frame number: set when the RNG for this event
/// couldn't be predicted and the seed was stored raw instead of as a roll count.
pub const RAW_RNG_MASK: i32 = 0x4000_0000;

#[inline]
pub fn legacy_roll(seed: u32) -> u32 {
    seed.wrapping_mul(214013).wrapping_add(2531011)
}

#[inline]
pub fn rollback_seed(frame: i32, seed0: u32) -> u32 {
    ((frame as i64 + 123) * 65536) as u32 + seed0
}

/// Given the current frame's rollback-era RNG value, the next frame's.
#[inline]
pub fn rollback_roll(seed: u32) -> u32 {
    seed.wrapping_add(65536)
}

/// Counts how many legacy rolls separate `from` and `to`, if any exist within
/// `MAX_ROLLS` iterations.
pub fn legacy_roll_count(from: u32, to: u32) -> Option<u32> {
    let mut cur = from;
    for i in 0..MAX_ROLLS {
        if cur == to {
            return Some(i);
        }
        cur = legacy_roll(cur);
    }
    None
}

/// Counts how many `+65536` rollback rolls separate `from` and `to`, if any
/// exist within `MAX_ROLLS` iterations.
pub fn rollback_roll_count(from: u32, to: u32) -> Option<u32> {
    let mut cur = from;
    for i in 0..MAX_ROLLS {
        if cur == to {
            return Some(i);
        }
        cur = rollback_roll(cur);
    }
    None
}

/// Predicts the RNG roll count for an event on `frame`, given the carried
/// previous-seed and (for rollback replays) the match's initial seed.
///
/// Returns `Some(rolls)` when the seed can be reproduced by rolling the carry
/// forward, `None` when the caller must fall back to storing the raw seed and
/// setting [`RAW_RNG_MASK`] on the encoded frame number.
///
/// In the rollback era, the formula's seed for this frame is rolled forward
/// by 65536 up to `MAX_ROLLS` times first (values `0..MAX_ROLLS`); only if
/// none of those land on the observed seed does the legacy LCG get tried from
/// that same formula seed, stored as `MAX_ROLLS + count` (`MAX_ROLLS..2*MAX_ROLLS`)
/// so the decoder can tell which roll kind produced the stored count.
pub fn predict_rolls(observed: u32, prev: u32, frame: i32, seed0: u32, rollback_era: bool) -> Option<u32> {
    if rollback_era {
        let expected = rollback_seed(frame, seed0);
        if let Some(rolls) = rollback_roll_count(expected, observed) {
            return Some(rolls);
        }
        // The rollback formula is deterministic; if forward-rolling it never
        // lands on the observed seed, try the legacy LCG from that same
        // formula seed as a fallback (covers replays that mix regimes across
        // a version boundary frame).
        legacy_roll_count(expected, observed).map(|count| count + MAX_ROLLS)
    } else {
        legacy_roll_count(prev, observed)
    }
}

/// Reconstructs the seed a `rolls` count away from `prev` under the legacy LCG.
pub fn apply_rolls(prev: u32, rolls: u32) -> u32 {
    let mut cur = prev;
    for _ in 0..rolls {
        cur = legacy_roll(cur);
    }
    cur
}

/// Reconstructs the seed a `rolls` count away from `prev` under the
/// rollback-era `+65536` formula.
pub fn apply_rollback_rolls(prev: u32, rolls: u32) -> u32 {
    let mut cur = prev;
    for _ in 0..rolls {
        cur = rollback_roll(cur);
    }
    cur
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_roll_is_reversible_by_count() {
        let seed0 = 0xDEAD_BEEFu32;
        let seed3 = legacy_roll(legacy_roll(legacy_roll(seed0)));
        assert_eq!(legacy_roll_count(seed0, seed3), Some(3));
        assert_eq!(apply_rolls(seed0, 3), seed3);
    }

    #[test]
    fn rollback_formula_is_direct() {
        let seed0 = 777u32;
        let frame = 100;
        let expected = rollback_seed(frame, seed0);
        assert_eq!(predict_rolls(expected, 0, frame, seed0, true), Some(0));
    }

    #[test]
    fn rollback_search_finds_forward_rolls_before_legacy_fallback() {
        let seed0 = 777u32;
        let frame = 100;
        let expected = rollback_seed(frame, seed0);
        let observed = rollback_roll(rollback_roll(expected));
        assert_eq!(predict_rolls(observed, 0, frame, seed0, true), Some(2));
        assert_eq!(apply_rollback_rolls(expected, 2), observed);
    }

    #[test]
    fn rollback_falls_back_to_legacy_when_formula_never_catches_up() {
        let seed0 = 777u32;
        let frame = 100;
        let expected = rollback_seed(frame, seed0);
        let observed = legacy_roll(legacy_roll(legacy_roll(expected)));
        assert_eq!(predict_rolls(observed, 0, frame, seed0, true), Some(MAX_ROLLS + 3));
    }

    #[test]
    fn unreachable_seed_falls_back() {
        assert_eq!(legacy_roll_count(1, 2), None);
    }
}
