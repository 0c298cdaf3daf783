//! Encoded -> raw field transforms, mirroring [`super::encode`] exactly.

use super::carry::CarryState;
use super::rng::RAW_RNG_MASK;
use crate::binary::{read_f32, read_i32, read_u32, read_u8, write_f32, write_i32, write_u32, write_u8, xor_span};
use crate::schema::*;
use crate::stream::RawEvent;

fn decode_frame(payload: &mut [u8], state: &mut CarryState) -> i32 {
    let stored = read_i32(payload, O_FRAME) & !RAW_RNG_MASK;
    let predicted = state.last_frame + 1;
    let actual = stored + predicted;
    write_i32(payload, O_FRAME, actual);
    state.last_frame = actual;
    actual
}

fn decode_rng(payload: &mut [u8], offset: usize, frame: i32, carry_prev: u32, seed0: u32, rollback_era: bool, raw: bool) -> u32 {
    if raw {
        return read_u32(payload, offset);
    }
    let rolls = read_u32(payload, offset);
    let seed = if rollback_era {
        let expected = super::rng::rollback_seed(frame, seed0);
        if rolls < super::rng::MAX_ROLLS {
            super::rng::apply_rollback_rolls(expected, rolls)
        } else {
            // Legacy-fallback rolls are stored as `MAX_ROLLS + count`; see `predict_rolls`.
            super::rng::apply_rolls(expected, rolls - super::rng::MAX_ROLLS)
        }
    } else {
        super::rng::apply_rolls(carry_prev, rolls)
    };
    write_u32(payload, offset, seed);
    seed
}

fn xor_against_carry(payload: &mut [u8], off: usize, len: usize, prev: Option<&[u8]>) {
    if let Some(prev) = prev {
        if prev.len() >= off + len {
            xor_span(payload, prev, off, off + len);
        }
    }
}

fn decode_float_field(payload: &mut [u8], off: usize, hist: &[Option<f32>]) {
    let bits = read_u32(payload, off);
    if !super::float_pred::looks_compressed(bits) {
        return;
    }
    let predicted = match hist {
        [Some(h1), Some(h2), Some(h3), Some(h4)] => super::float_pred::predict_cubic(*h1, *h2, *h3, *h4),
        [Some(h1), Some(h2), Some(h3), None] => super::float_pred::predict_quadratic(*h1, *h2, *h3),
        [Some(h1), Some(h2), ..] => super::float_pred::predict_linear(*h1, *h2),
        _ => return,
    };
    let restored = super::float_pred::decode_predicted(bits, predicted);
    write_f32(payload, off, restored);
}

fn decode_analog(payload: &mut [u8], off: usize, quantum: super::float_pred::AnalogQuantum) {
    let bits = read_u32(payload, off);
    if bits & 0x00FF_FFFF == 0 {
        let top = (bits >> 24) as u8;
        let k = if quantum.signed { top as i8 as i16 } else { top as i16 };
        write_f32(payload, off, quantum.dequantize(k));
    }
}

pub fn decode_event(event: &mut RawEvent, version: Version, state: &mut CarryState) {
    let code = event.code;
    let payload = &mut event.payload;
    match code {
        0x36 => decode_game_start(payload),
        0x3A => decode_frame_start(payload, state),
        0x37 => decode_pre_frame(payload, version, state),
        0x38 => decode_post_frame(payload, version, state),
        0x3B => decode_item_update(payload, version, state),
        0x3D => decode_bookend(payload, state),
        _ => {}
    }
}

fn decode_game_start(payload: &mut [u8]) {
    write_u8(payload, O_SLP_ENC, 0);
}

fn decode_frame_start(payload: &mut [u8], state: &mut CarryState) {
    let raw = read_i32(payload, O_FRAME) & RAW_RNG_MASK != 0;
    let frame = decode_frame(payload, state);
    let seed0 = state.rng_seed0;
    let prev_seed = state.rng_seed;
    let seed = decode_rng(payload, O_RNG_FS, frame, prev_seed, seed0, true, raw);
    state.rng_seed = seed;
    let prev = state.frame_start.latest().map(<[u8]>::to_vec);
    xor_against_carry(payload, O_SCENE_COUNT, 4, prev.as_deref());
    state.frame_start.push(payload);
}

fn decode_pre_frame(payload: &mut [u8], version: Version, state: &mut CarryState) {
    let port = read_u8(payload, O_PLAYER) as usize;
    let follower = read_u8(payload, O_FOLLOWER) != 0;
    let slot = port + if follower { 4 } else { 0 };

    let raw = read_i32(payload, O_FRAME) & RAW_RNG_MASK != 0;
    let frame = decode_frame(payload, state);

    let prev_seed = state.rng_seed;
    let seed0 = state.rng_seed0;
    let rollback_era = version.at_least(3, 6, 0);
    let seed = decode_rng(payload, O_RNG_PRE, frame, prev_seed, seed0, rollback_era, raw);
    state.rng_seed = seed;

    let hist = state.pre_frame.entry(slot).or_default();
    let prev = hist.latest().map(<[u8]>::to_vec);

    xor_against_carry(payload, O_ACTION_PRE, 2, prev.as_deref());
    xor_against_carry(payload, O_XPOS_PRE, 8, prev.as_deref());
    xor_against_carry(payload, O_FACING_PRE, 4, prev.as_deref());
    xor_against_carry(payload, O_PROCESSED, 4, prev.as_deref());
    xor_against_carry(payload, O_BUTTONS, 2, prev.as_deref());
    if version.at_least(1, 4, 0) {
        xor_against_carry(payload, O_DAMAGE_PRE, 4, prev.as_deref());
    }

    decode_analog(payload, O_JOY_X, super::float_pred::STICK_QUANTUM);
    decode_analog(payload, O_JOY_Y, super::float_pred::STICK_QUANTUM);
    decode_analog(payload, O_CX, super::float_pred::STICK_QUANTUM);
    decode_analog(payload, O_CY, super::float_pred::STICK_QUANTUM);
    decode_analog(payload, O_TRIGGER, super::float_pred::TRIGGER_QUANTUM);
    decode_analog(payload, O_PHYS_L, super::float_pred::TRIGGER_QUANTUM);
    decode_analog(payload, O_PHYS_R, super::float_pred::TRIGGER_QUANTUM);

    hist.push(payload);
}

fn decode_post_frame(payload: &mut [u8], version: Version, state: &mut CarryState) {
    let port = read_u8(payload, O_PLAYER) as usize;
    let follower = read_u8(payload, O_FOLLOWER) != 0;
    let slot = port + if follower { 4 } else { 0 };

    decode_frame(payload, state);

    let hist = state.post_frame.entry(slot).or_default();
    let prev = hist.latest().map(<[u8]>::to_vec);
    let f1 = |o: usize| prev.as_deref().map(|p| read_f32(p, o));
    let f2 = |o: usize| hist.gen(1).map(|p| read_f32(p, o));
    let f3 = |o: usize| hist.gen(2).map(|p| read_f32(p, o));

    decode_float_field(payload, O_XPOS_POST, &[f1(O_XPOS_POST), f2(O_XPOS_POST), f3(O_XPOS_POST), None]);
    decode_float_field(payload, O_YPOS_POST, &[f1(O_YPOS_POST), f2(O_YPOS_POST), f3(O_YPOS_POST), None]);

    xor_against_carry(payload, O_INT_CHAR_ID, 1, prev.as_deref());
    xor_against_carry(payload, O_ACTION_POST, 2, prev.as_deref());
    xor_against_carry(payload, O_FACING_POST, 4, prev.as_deref());
    xor_against_carry(payload, O_DAMAGE_POST, 4, prev.as_deref());

    decode_float_field(payload, O_SHIELD, &[f1(O_SHIELD), f2(O_SHIELD), None, None]);

    xor_against_carry(payload, O_LAST_HIT_ID, 1, prev.as_deref());
    xor_against_carry(payload, O_COMBO, 1, prev.as_deref());
    xor_against_carry(payload, O_LAST_HIT_BY, 1, prev.as_deref());
    xor_against_carry(payload, O_STOCKS, 1, prev.as_deref());

    if version.at_least(0, 2, 0) {
        decode_float_field(payload, O_ACTION_FRAMES, &[f1(O_ACTION_FRAMES), f2(O_ACTION_FRAMES), None, None]);
    }

    if version.at_least(2, 0, 0) {
        xor_against_carry(payload, O_STATE_BITS_1, 5, prev.as_deref());
        decode_float_field(payload, O_HITSTUN, &[f1(O_HITSTUN), f2(O_HITSTUN), None, None]);

        if version.at_least(3, 5, 0) {
            decode_float_field(payload, O_SELF_AIR_Y, &[f1(O_SELF_AIR_Y), f2(O_SELF_AIR_Y), None, None]);
            decode_float_field(payload, O_ATTACK_X, &[f1(O_ATTACK_X), f2(O_ATTACK_X), None, None]);
            decode_float_field(payload, O_ATTACK_Y, &[f1(O_ATTACK_Y), f2(O_ATTACK_Y), None, None]);
            decode_float_field(payload, O_SELF_GROUND_X, &[f1(O_SELF_GROUND_X), f2(O_SELF_GROUND_X), None, None]);
            decode_float_field(payload, O_SELF_AIR_X, &[f1(O_SELF_AIR_X), f2(O_SELF_AIR_X), None, None]);

            if version.at_least(3, 8, 0) {
                decode_float_field(payload, O_HITLAG, &[f1(O_HITLAG), f2(O_HITLAG), None, None]);
            }
        }
    }
    if version.at_least(3, 11, 0) {
        xor_against_carry(payload, O_ANIM_INDEX, 4, prev.as_deref());
    }

    hist.push(payload);
}

fn decode_item_update(payload: &mut [u8], version: Version, state: &mut CarryState) {
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

fn decode_bookend(payload: &mut [u8], state: &mut CarryState) {
    decode_frame(payload, state);
    let prev = state.bookend.latest().map(<[u8]>::to_vec);
    xor_against_carry(payload, O_ROLLBACK_FRAME, 4, prev.as_deref());
    state.bookend.push(payload);
}
