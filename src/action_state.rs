//! Action-state id ranges and the frame-level predicates the analyzer runs
//! against them.
//!
//! Every predicate here is a closed-interval test on a 16-bit action id (or a
//! bit test against one of post-frame's five state-flag bytes), matching the
//! table-driven style the original analyzer uses -- `isAirdodging`,
//! `inTechState`, and friends are one-liners, not a state machine of their own.

/// A handful of named action ids the analyzer's range tests are built from.
/// Not every id the game uses has a name here -- only the ones a boundary
/// test needs as an endpoint.
pub mod action {
    pub const DEAD_DOWN: u16 = 0x0000;
    pub const DEAD_LEFT: u16 = 0x0001;
    pub const DEAD_RIGHT: u16 = 0x0002;
    pub const SLEEP: u16 = 0x000A;
    pub const WAIT: u16 = 0x000E;
    pub const WAIT_1: u16 = 0x00C1;
    pub const SQUAT_WAIT_ITEM: u16 = 0x00C4;
    pub const DASH: u16 = 0x0014;
    pub const TURN: u16 = 0x0012;
    pub const KNEE_BEND: u16 = 0x0018;
    pub const JUMP_F: u16 = 0x0019;
    pub const JUMP_AERIAL_B: u16 = 0x001C;
    pub const FALL: u16 = 0x001E;
    pub const FALL_B: u16 = 0x0021;
    pub const FALL_AERIAL_B: u16 = 0x0024;
    pub const LANDING: u16 = 0x002A;
    pub const LANDING_FALL_SPECIAL: u16 = 0x002B;
    pub const DAMAGE_HI_1: u16 = 0x004B;
    pub const DAMAGE_FLY_ROLL: u16 = 0x0059;
    pub const DAMAGE_FALL: u16 = 0x005B;
    pub const CAPTURE_PULLED_HI: u16 = 0x005C;
    pub const CAPTURE_FOOT: u16 = 0x0065;
    pub const CAPTURE_CAPTAIN: u16 = 0x0066;
    pub const THROWN_KIRBY: u16 = 0x0075;
    pub const THROWN_F: u16 = 0x00EB;
    pub const THROWN_LW_WOMEN: u16 = 0x00F8;
    pub const ATTACK_11: u16 = 0x00D0;
    pub const ATTACK_AIR_LW: u16 = 0x00E0;
    pub const THROW_F: u16 = 0x00E4;
    pub const THROW_LW: u16 = 0x00E7;
    pub const CATCH: u16 = 0x00E1;
    pub const CATCH_PULL: u16 = 0x00E2;
    pub const CATCH_ATTACK: u16 = 0x00E9;
    pub const CATCH_CUT: u16 = 0x00EA;
    pub const GUARD_ON: u16 = 0x00B2;
    pub const GUARD_OFF: u16 = 0x00B5;
    pub const GUARD_SET_OFF: u16 = 0x00B6;
    pub const GUARD_REFLECT: u16 = 0x00B8;
    pub const DOWN_BOUND_U: u16 = 0x00B9;
    pub const DOWN_SPOT_D: u16 = 0x00C6;
    pub const PASSIVE_STAND_B: u16 = 0x00C9;
    pub const PASSIVE_CEIL: u16 = 0x00CC;
    pub const DOWN_ATTACK_U: u16 = 0x00C7;
    pub const DOWN_ATTACK_D: u16 = 0x00C8;
    pub const ESCAPE_F: u16 = 0x00DD;
    pub const ESCAPE_B: u16 = 0x00DE;
    pub const ESCAPE: u16 = 0x00DF;
    pub const ESCAPE_AIR: u16 = 0x00E0;
    pub const APPEAL_L: u16 = 0x00E4;
    pub const APPEAL_R: u16 = 0x00E5;
    pub const CLIFF_CATCH: u16 = 0x00FC;
    pub const CLIFF_WAIT: u16 = 0x00FD;
    pub const CLIFF_ATTACK_SLOW: u16 = 0x00FF;
    pub const CLIFF_ATTACK_QUICK: u16 = 0x0100;
    pub const SHIELD_BREAK_FLY: u16 = 0x0108;
    pub const SHIELD_BREAK_FALL: u16 = 0x010B;
}

use action::*;

/// Approximate ledge x-coordinate for the legal stage ids, used only to decide
/// whether a player is "off stage" for edgeguard/recover classification -- not
/// precise enough to drive anything gameplay-critical.
fn stage_ledge_x(stage: u16) -> f32 {
    match stage {
        2 => 63.35,  // Fountain of Dreams
        3 => 87.75,  // Pokemon Stadium
        8 => 58.8,   // Yoshi's Story
        28 => 77.4,  // Dream Land N64
        31 => 68.4,  // Battlefield
        32 => 85.5,  // Final Destination
        _ => 70.0,
    }
}

/// Whether an airborne player is beyond the ledge (or has fallen below the
/// stage) on either axis. `pos_x`/`pos_y` are pre-frame positions, matching
/// where this is checked against hitstun/punish state each frame.
#[inline]
pub fn is_off_stage(pos_x: f32, pos_y: f32, airborne: bool, stage: u16) -> bool {
    airborne && (pos_x.abs() > stage_ledge_x(stage) || pos_y < -10.0)
}

/// Which direction a player went off the blast zone on a killing blow, read off
/// the death action state they land in. `Up` also covers the handful of
/// non-directional KO/star-KO states below `Sleep` in the action table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KillDir {
    Down,
    Left,
    Right,
    Up,
    #[default]
    Neut,
}

#[inline]
pub fn death_direction(action_post: u16) -> KillDir {
    if action_post == DEAD_DOWN {
        KillDir::Down
    } else if action_post == DEAD_LEFT {
        KillDir::Left
    } else if action_post == DEAD_RIGHT {
        KillDir::Right
    } else if action_post < SLEEP {
        KillDir::Up
    } else {
        KillDir::Neut
    }
}

#[inline]
pub fn is_dead(action_pre: u16, flags_5: u8) -> bool {
    (flags_5 & 0x10) != 0 || action_pre < SLEEP
}

#[inline]
pub fn is_airborne(airborne: bool) -> bool {
    airborne
}

#[inline]
pub fn is_in_hitlag(flags_2: u8) -> bool {
    flags_2 & 0x20 != 0
}

#[inline]
pub fn is_shielding(flags_3: u8) -> bool {
    flags_3 & 0x80 != 0
}

#[inline]
pub fn is_in_hitstun(flags_4: u8) -> bool {
    flags_4 & 0x02 != 0
}

#[inline]
pub fn is_grabbed(action_pre: u16) -> bool {
    (CAPTURE_PULLED_HI..=CAPTURE_FOOT).contains(&action_pre) || (CAPTURE_CAPTAIN..=THROWN_KIRBY).contains(&action_pre)
}

#[inline]
pub fn is_thrown(action_pre: u16) -> bool {
    (THROWN_F..=THROWN_LW_WOMEN).contains(&action_pre)
}

#[inline]
pub fn is_throwing(action_pre: u16) -> bool {
    (THROW_F..=THROW_LW).contains(&action_pre)
}

#[inline]
pub fn is_in_shield(action_pre: u16) -> bool {
    (GUARD_ON..=GUARD_REFLECT).contains(&action_pre)
}

#[inline]
pub fn is_in_shieldstun(action_pre: u16) -> bool {
    action_pre == GUARD_SET_OFF
}

#[inline]
pub fn is_on_ledge(action_pre: u16) -> bool {
    action_pre == CLIFF_WAIT
}

#[inline]
pub fn is_airdodging(action_pre: u16) -> bool {
    action_pre == ESCAPE_AIR
}

#[inline]
pub fn is_in_jumpsquat(action_pre: u16) -> bool {
    action_pre == KNEE_BEND
}

#[inline]
pub fn is_spotdodging(action_pre: u16) -> bool {
    action_pre == ESCAPE
}

#[inline]
pub fn is_rolling(action_pre: u16) -> bool {
    action_pre == ESCAPE_F || action_pre == ESCAPE_B
}

#[inline]
pub fn is_dodging(action_pre: u16) -> bool {
    (ESCAPE_F..=ESCAPE).contains(&action_pre)
}

/// Excludes wall techs, wall jumps, and ceiling techs.
#[inline]
pub fn in_floor_tech_state(action_pre: u16) -> bool {
    (DOWN_BOUND_U..=PASSIVE_STAND_B).contains(&action_pre)
}

/// Includes wall techs, wall jumps, and ceiling techs.
#[inline]
pub fn in_tech_state(action_pre: u16) -> bool {
    (DOWN_BOUND_U..=PASSIVE_CEIL).contains(&action_pre)
}

#[inline]
pub fn in_damaged_state(action_pre: u16) -> bool {
    (DAMAGE_HI_1..=DAMAGE_FLY_ROLL).contains(&action_pre)
}

#[inline]
pub fn in_tumble(action_pre: u16) -> bool {
    action_pre == DAMAGE_FALL
}

#[inline]
pub fn is_dashdancing(cur_pre: u16, prev_pre: u16, prev2_pre: u16) -> bool {
    cur_pre == DASH && prev_pre == TURN && prev2_pre == DASH
}

/// Fizzi's waveland/wavedash detection: `LandingFallSpecial` preceded (within
/// the last 8 frames) by `EscapeAir` or jumpsquat-through-aerial-fall states.
#[inline]
pub fn maybe_wavelanding(cur_pre: u16, prev_pre: u16) -> bool {
    cur_pre == LANDING_FALL_SPECIAL
        && (prev_pre == ESCAPE_AIR || (KNEE_BEND..=FALL_AERIAL_B).contains(&prev_pre))
}

pub fn stick_region(x: f32, y: f32, neutral: f32) -> u8 {
    match (x >= neutral, x <= -neutral, y >= neutral, y <= -neutral) {
        (true, _, true, _) => 1,  // NE
        (true, _, _, true) => 2,  // SE
        (_, true, _, true) => 3,  // SW
        (_, true, true, _) => 4,  // NW
        (_, _, true, _) => 5,     // N
        (true, _, _, _) => 6,     // E
        (_, _, _, true) => 7,     // S
        (_, true, _, _) => 8,     // W
        _ => 0,                   // DZ (dead zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dashdance_detection_matches_fizzis_rule() {
        assert!(is_dashdancing(DASH, TURN, DASH));
        assert!(!is_dashdancing(DASH, TURN, WAIT));
    }

    #[test]
    fn tech_state_ranges_nest_correctly() {
        assert!(in_floor_tech_state(DOWN_BOUND_U));
        assert!(in_tech_state(PASSIVE_CEIL));
        assert!(!in_floor_tech_state(PASSIVE_CEIL));
    }

    #[test]
    fn death_threshold_uses_sleep() {
        assert!(is_dead(DEAD_DOWN, 0));
        assert!(!is_dead(WAIT, 0));
    }

    #[test]
    fn death_direction_reads_the_landed_dead_state() {
        assert_eq!(death_direction(DEAD_DOWN), KillDir::Down);
        assert_eq!(death_direction(DEAD_LEFT), KillDir::Left);
        assert_eq!(death_direction(DEAD_RIGHT), KillDir::Right);
        assert_eq!(death_direction(WAIT), KillDir::Neut);
    }

    #[test]
    fn off_stage_uses_a_per_stage_ledge_estimate() {
        assert!(!is_off_stage(10.0, 0.0, true, 32));
        assert!(is_off_stage(120.0, 0.0, true, 32));
        assert!(!is_off_stage(120.0, 0.0, false, 32));
        assert!(is_off_stage(0.0, -20.0, true, 32));
    }
}
