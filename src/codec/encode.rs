//! Raw -> encoded field transforms, one function per event kind.

use super::carry::CarryState;
use super::float_pred::{self, MAXDIFF_HIGHER_ORDER, MAXDIFF_VELOCITY};
use super::rng::{self, RAW_RNG_MASK};
use crate::binary::{read_f32, read_i32, read_u32, read_u8, write_i32, write_u32, write_u8, xor_span};
use crate::schema::*;
use crate::stream::RawEvent;

/// Encodes the frame number at `O_FRAME` as `actual - (prev + 1)`, returning
/// the actual (pre-encode) value so callers can key carry-state lookups and
/// RNG prediction by the real frame number.
fn encode_frame(payload: &mut [u8], state: &mut CarryState) -> i32 {
    let actual = read_i32(payload, O_FRAME);
    let predicted = state.last_frame + 1;
    write_i32(payload, O_FRAME, actual - predicted);
    state.last_frame = actual;
    actual
}

/// Writes either a roll count or the raw seed at `offset`, returning whether
/// prediction succeeded (the caller uses this to decide the raw-RNG fallback bit).
fn encode_rng(payload: &mut [u8], offset: usize, frame: i32, carry_prev: u32, seed0: u32, rollback_era: bool) -> bool {
    let observed = read_u32(payload, offset);
    match rng::predict_rolls(observed, carry_prev, frame, seed0, rollback_era) {
        Some(rolls) if rolls < 256 => {
            write_u32(payload, offset, rolls);
            true
        }
        _ => {
            write_u32(payload, offset, observed);
            false
        }
    }
}

/// XORs `payload[off..off+len]` against the same span of the previous
/// generation, when one exists (first occurrence is left untouched, matching
/// "xor against all-zero carry" for a fresh slot).
fn xor_against_carry(payload: &mut [u8], off: usize, len: usize, prev: Option<&[u8]>) {
    if let Some(prev) = prev {
        if prev.len() >= off + len {
            xor_span(payload, prev, off, off + len);
        }
    }
}

fn encode_float_field(payload: &mut [u8], off: usize, hist: &[Option<f32>]) {
    let actual = read_f32(payload, off);
    let (predicted, mask) = match hist {
        [Some(h1), Some(h2), Some(h3), Some(h4)] => {
            (float_pred::predict_cubic(*h1, *h2, *h3, *h4), MAXDIFF_HIGHER_ORDER)
        }
        [Some(h1), Some(h2), Some(h3), None] => {
            (float_pred::predict_quadratic(*h1, *h2, *h3), MAXDIFF_HIGHER_ORDER)
        }
        [Some(h1), Some(h2), ..] => (float_pred::predict_linear(*h1, *h2), MAXDIFF_VELOCITY),
        _ => return,
    };
    if let Some(bits) = float_pred::encode_predicted(actual, predicted, mask) {
        write_u32(payload, off, bits);
    }
}

fn encode_analog(payload: &mut [u8], off: usize, quantum: super::float_pred::AnalogQuantum) {
    let actual = read_f32(payload, off);
    if let Some(k) = quantum.quantize(actual) {
        // Exponent bits zero signals "compressed": store the quantized
        // integer in the top byte, zero the rest.
        write_u32(payload, off, (k as u32 & 0xFF) << 24);
    }
}

pub fn encode_event(event: &mut RawEvent, version: Version, state: &mut CarryState) {
    let code = event.code;
    let payload = &mut event.payload;
    match code {
        0x36 => encode_game_start(payload),
        0x3A => encode_frame_start(payload, state),
        0x37 => encode_pre_frame(payload, version, state),
        0x38 => encode_post_frame(payload, version, state),
        0x3B => encode_item_update(payload, version, state),
        0x3D => encode_bookend(payload, state),
        _ => {}
    }
}

fn encode_game_start(payload: &mut [u8]) {
    write_u8(payload, O_SLP_ENC, super::ENCODER_VERSION_TAG);
}

fn encode_frame_start(payload: &mut [u8], state: &mut CarryState) {
    let rollback_era = true; // frame_start only exists in rollback-era replays
    let frame = encode_frame(payload, state);
    let seed0 = state.rng_seed0;
    let prev_seed = state.rng_seed;
    let observed_seed = read_u32(payload, O_RNG_FS);
    let predicted = encode_rng(payload, O_RNG_FS, frame, prev_seed, seed0, rollback_era);
    state.rng_seed = observed_seed;
    if !predicted {
        let cur = read_i32(payload, O_FRAME);
        write_i32(payload, O_FRAME, cur | RAW_RNG_MASK);
    }
    let prev = state.frame_start.latest().map(<[u8]>::to_vec);
    xor_against_carry(payload, O_SCENE_COUNT, 4, prev.as_deref());
    state.frame_start.push(payload);
}

fn encode_pre_frame(payload: &mut [u8], version: Version, state: &mut CarryState) {
    let port = read_u8(payload, O_PLAYER) as usize;
    let follower = read_u8(payload, O_FOLLOWER) != 0;
    let slot = port + if follower { 4 } else { 0 };

    let frame = encode_frame(payload, state);

    let prev_seed = state.rng_seed;
    let seed0 = state.rng_seed0;
    let rollback_era = version.at_least(3, 6, 0);
    let observed_seed = read_u32(payload, O_RNG_PRE);
    let predicted = encode_rng(payload, O_RNG_PRE, frame, prev_seed, seed0, rollback_era);
    state.rng_seed = observed_seed;
    if !predicted {
        let cur = read_i32(payload, O_FRAME);
        write_i32(payload, O_FRAME, cur | RAW_RNG_MASK);
    }

    let hist = state.pre_frame.entry(slot).or_default();
    let prev = hist.latest().map(<[u8]>::to_vec);

    xor_against_carry(payload, O_ACTION_PRE, 2, prev.as_deref());
    xor_against_carry(payload, O_XPOS_PRE, 8, prev.as_deref()); // x/y position
    xor_against_carry(payload, O_FACING_PRE, 4, prev.as_deref());
    xor_against_carry(payload, O_PROCESSED, 4, prev.as_deref());
    xor_against_carry(payload, O_BUTTONS, 2, prev.as_deref());
    if version.at_least(1, 4, 0) {
        xor_against_carry(payload, O_DAMAGE_PRE, 4, prev.as_deref());
    }

    encode_analog(payload, O_JOY_X, super::float_pred::STICK_QUANTUM);
    encode_analog(payload, O_JOY_Y, super::float_pred::STICK_QUANTUM);
    encode_analog(payload, O_CX, super::float_pred::STICK_QUANTUM);
    encode_analog(payload, O_CY, super::float_pred::STICK_QUANTUM);
    encode_analog(payload, O_TRIGGER, super::float_pred::TRIGGER_QUANTUM);
    encode_analog(payload, O_PHYS_L, super::float_pred::TRIGGER_QUANTUM);
    encode_analog(payload, O_PHYS_R, super::float_pred::TRIGGER_QUANTUM);

    hist.push(payload);
}

fn encode_post_frame(payload: &mut [u8], version: Version, state: &mut CarryState) {
    let port = read_u8(payload, O_PLAYER) as usize;
    let follower = read_u8(payload, O_FOLLOWER) != 0;
    let slot = port + if follower { 4 } else { 0 };

    encode_frame(payload, state);

    let hist = state.post_frame.entry(slot).or_default();
    let prev = hist.latest().map(<[u8]>::to_vec);
    let f1 = |o: usize| prev.as_deref().map(|p| read_f32(p, o));
    let f2 = |o: usize| hist.gen(1).map(|p| read_f32(p, o));
    let f3 = |o: usize| hist.gen(2).map(|p| read_f32(p, o));

    // Position predicts from the last 3 frames' values (acceleration), not a
    // plain XOR against the previous frame.
    encode_float_field(payload, O_XPOS_POST, &[f1(O_XPOS_POST), f2(O_XPOS_POST), f3(O_XPOS_POST), None]);
    encode_float_field(payload, O_YPOS_POST, &[f1(O_YPOS_POST), f2(O_YPOS_POST), f3(O_YPOS_POST), None]);

    xor_against_carry(payload, O_INT_CHAR_ID, 1, prev.as_deref());
    xor_against_carry(payload, O_ACTION_POST, 2, prev.as_deref());
    xor_against_carry(payload, O_FACING_POST, 4, prev.as_deref());
    xor_against_carry(payload, O_DAMAGE_POST, 4, prev.as_deref());

    // Shield decay predicts like a velocity (last 2 frames), not XOR.
    encode_float_field(payload, O_SHIELD, &[f1(O_SHIELD), f2(O_SHIELD), None, None]);

    xor_against_carry(payload, O_LAST_HIT_ID, 1, prev.as_deref());
    xor_against_carry(payload, O_COMBO, 1, prev.as_deref());
    xor_against_carry(payload, O_LAST_HIT_BY, 1, prev.as_deref());
    xor_against_carry(payload, O_STOCKS, 1, prev.as_deref());

    if version.at_least(0, 2, 0) {
        encode_float_field(payload, O_ACTION_FRAMES, &[f1(O_ACTION_FRAMES), f2(O_ACTION_FRAMES), None, None]);
    }

    if version.at_least(2, 0, 0) {
        xor_against_carry(payload, O_STATE_BITS_1, 5, prev.as_deref());
        encode_float_field(payload, O_HITSTUN, &[f1(O_HITSTUN), f2(O_HITSTUN), None, None]);

        if version.at_least(3, 5, 0) {
            // velocity fields use predictive delta, not XOR
            encode_float_field(payload, O_SELF_AIR_Y, &[f1(O_SELF_AIR_Y), f2(O_SELF_AIR_Y), None, None]);
            encode_float_field(payload, O_ATTACK_X, &[f1(O_ATTACK_X), f2(O_ATTACK_X), None, None]);
            encode_float_field(payload, O_ATTACK_Y, &[f1(O_ATTACK_Y), f2(O_ATTACK_Y), None, None]);
            encode_float_field(payload, O_SELF_GROUND_X, &[f1(O_SELF_GROUND_X), f2(O_SELF_GROUND_X), None, None]);
            encode_float_field(payload, O_SELF_AIR_X, &[f1(O_SELF_AIR_X), f2(O_SELF_AIR_X), None, None]);

            if version.at_least(3, 8, 0) {
                encode_float_field(payload, O_HITLAG, &[f1(O_HITLAG), f2(O_HITLAG), None, None]);
            }
        }
    }
    if version.at_least(3, 11, 0) {
        xor_against_carry(payload, O_ANIM_INDEX, 4, prev.as_deref());
    }

    hist.push(payload);
}

fn encode_item_update(payload: &mut [u8], version: Version, state: &mut CarryState) {
    let spawn_id = read_u32(payload, O_ITEM_ID);
    let hist = state.item.entry(spawn_id).or_default();
    let prev = hist.latest().map(<[u8]>::to_vec);

    xor_against_carry(payload, O_ITEM_TYPE, 2, prev.as_deref());
    xor_against_carry(payload, O_ITEM_STATE, 1, prev.as_deref());
    xor_against_carry(payload, O_ITEM_FACING, 4, prev.as_deref());
    xor_against_carry(payload, O_ITEM_DAMAGE, 2, prev.as_deref());
    if version.at_least(3, 2, 0) {
        xor_against_carry(payload, O_ITEM_MISC, 4, prev.as_deref());
    }
    if version.at_least(3, 6, 0) {
        xor_against_carry(payload, O_ITEM_OWNER, 1, prev.as_deref());
    }

    hist.push(payload);
}

fn encode_bookend(payload: &mut [u8], state: &mut CarryState) {
    encode_frame(payload, state);
    let prev = state.bookend.latest().map(<[u8]>::to_vec);
    xor_against_carry(payload, O_ROLLBACK_FRAME, 4, prev.as_deref());
    state.bookend.push(payload);
}
