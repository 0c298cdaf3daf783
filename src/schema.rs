//! Event codes, fixed field offsets within each event payload, and the version
//! gates that decide whether a given field exists in a given replay.
//!
//! Offsets are relative to the start of an event's payload, i.e. one byte past
//! the event's own command byte (which the [`crate::parser`] strips off before
//! dispatching). They mirror the Slippi wire spec field-for-field.

use strum::FromRepr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u8)]
pub enum EventCode {
    EventPayloads = 0x35,
    GameStart = 0x36,
    PreFrame = 0x37,
    PostFrame = 0x38,
    GameEnd = 0x39,
    FrameStart = 0x3A,
    ItemUpdate = 0x3B,
    Bookend = 0x3D,
    SplitMessage = 0x10,
}

impl EventCode {
    /// The five codes that must appear in every event-payload-sizes table.
    pub const REQUIRED: [u8; 5] = [0x35, 0x36, 0x37, 0x38, 0x39];
}

pub const SLP_HEADER: [u8; 11] = [
    0x7B, 0x55, 0x03, 0x72, 0x61, 0x77, 0x5B, 0x24, 0x55, 0x23, 0x6C,
]; // "{U\x03raw[$U#"

pub const LOAD_FRAME: i32 = -123;

// Common
pub const O_FRAME: usize = 0x01;
pub const O_PLAYER: usize = 0x05;
pub const O_FOLLOWER: usize = 0x06;

// Game start
pub const O_SLP_MAJ: usize = 0x01;
pub const O_SLP_MIN: usize = 0x02;
pub const O_SLP_REV: usize = 0x03;
pub const O_SLP_ENC: usize = 0x04;
pub const O_GAMEBITS_1: usize = 0x05;
pub const O_SUDDEN_DEATH: usize = 0x0B;
pub const O_IS_TEAMS: usize = 0x0D;
pub const O_ITEM_SPAWN: usize = 0x10;
pub const O_SD_SCORE: usize = 0x11;
pub const O_STAGE: usize = 0x13;
pub const O_TIMER: usize = 0x15;
pub const O_PLAYERDATA: usize = 0x65;
pub const O_DASHBACK: usize = 0x141; // also shield drop at +0x04, stride 0x8 * port
pub const O_RNG_GAME_START: usize = 0x13D;
pub const O_NAMETAG: usize = 0x161; // stride 0x10 * port
pub const O_IS_PAL: usize = 0x1A1;
pub const O_PS_FROZEN: usize = 0x1A2;
pub const O_SCENE_MIN: usize = 0x1A3;
pub const O_SCENE_MAJ: usize = 0x1A4;
pub const O_DISP_NAME: usize = 0x1A5; // stride 0x1F * port
pub const O_CONN_CODE: usize = 0x221; // stride 0x0A * port
pub const O_SLIPPI_UID: usize = 0x249; // stride 0x1D * port
pub const O_LANGUAGE: usize = 0x2BD;
pub const O_MATCH_ID: usize = 0x2BE;
pub const O_GAME_NUMBER: usize = 0x2F1;
pub const O_TIEBREAKER_NUMBER: usize = 0x2F5;

// Player data block (relative to O_PLAYERDATA + 0x24 * port)
pub const O_PLAYER_ID: usize = 0x00;
pub const O_PLAYER_TYPE: usize = 0x01;
pub const O_START_STOCKS: usize = 0x02;
pub const O_COLOR: usize = 0x03;
pub const O_TEAM_ID: usize = 0x09;
pub const O_PLAYER_BITS: usize = 0x0C;

// Frame start
pub const O_RNG_FS: usize = 0x05;
pub const O_SCENE_COUNT: usize = 0x09;

// Pre-frame
pub const O_RNG_PRE: usize = 0x07;
pub const O_ACTION_PRE: usize = 0x0B;
pub const O_XPOS_PRE: usize = 0x0D;
pub const O_YPOS_PRE: usize = 0x11;
pub const O_FACING_PRE: usize = 0x15;
pub const O_JOY_X: usize = 0x19;
pub const O_JOY_Y: usize = 0x1D;
pub const O_CX: usize = 0x21;
pub const O_CY: usize = 0x25;
pub const O_TRIGGER: usize = 0x29;
pub const O_PROCESSED: usize = 0x2D;
pub const O_BUTTONS: usize = 0x31;
pub const O_PHYS_L: usize = 0x33;
pub const O_PHYS_R: usize = 0x37;
pub const O_UCF_ANALOG: usize = 0x3B;
pub const O_DAMAGE_PRE: usize = 0x3C;

// Post-frame
pub const O_INT_CHAR_ID: usize = 0x07;
pub const O_ACTION_POST: usize = 0x08;
pub const O_XPOS_POST: usize = 0x0A;
pub const O_YPOS_POST: usize = 0x0E;
pub const O_FACING_POST: usize = 0x12;
pub const O_DAMAGE_POST: usize = 0x16;
pub const O_SHIELD: usize = 0x1A;
pub const O_LAST_HIT_ID: usize = 0x1E;
pub const O_COMBO: usize = 0x1F;
pub const O_LAST_HIT_BY: usize = 0x20;
pub const O_STOCKS: usize = 0x21;
pub const O_ACTION_FRAMES: usize = 0x22;
pub const O_STATE_BITS_1: usize = 0x26;
pub const O_STATE_BITS_2: usize = 0x27;
pub const O_STATE_BITS_3: usize = 0x28;
pub const O_STATE_BITS_4: usize = 0x29;
pub const O_STATE_BITS_5: usize = 0x2A;
pub const O_HITSTUN: usize = 0x2B;
pub const O_AIRBORNE: usize = 0x2F;
pub const O_GROUND_ID: usize = 0x30;
pub const O_JUMPS: usize = 0x32;
pub const O_LCANCEL: usize = 0x33;
pub const O_HURTBOX: usize = 0x34;
pub const O_SELF_AIR_X: usize = 0x35;
pub const O_SELF_AIR_Y: usize = 0x39;
pub const O_ATTACK_X: usize = 0x3D;
pub const O_ATTACK_Y: usize = 0x41;
pub const O_SELF_GROUND_X: usize = 0x45;
pub const O_HITLAG: usize = 0x49;
pub const O_ANIM_INDEX: usize = 0x4D;

// Item
pub const O_ITEM_TYPE: usize = 0x05;
pub const O_ITEM_STATE: usize = 0x07;
pub const O_ITEM_FACING: usize = 0x08;
pub const O_ITEM_XVEL: usize = 0x0C;
pub const O_ITEM_YVEL: usize = 0x10;
pub const O_ITEM_XPOS: usize = 0x14;
pub const O_ITEM_YPOS: usize = 0x18;
pub const O_ITEM_DAMAGE: usize = 0x1C;
pub const O_ITEM_EXPIRE: usize = 0x1E;
pub const O_ITEM_ID: usize = 0x22;
pub const O_ITEM_MISC: usize = 0x26;
pub const O_ITEM_OWNER: usize = 0x2A;

// Bookend
pub const O_BOOKEND_FRAME: usize = 0x01;
pub const O_ROLLBACK_FRAME: usize = 0x05;

// Game end
pub const O_END_METHOD: usize = 0x01;
pub const O_LRAS: usize = 0x02;

/// Monotonic `(major, minor, revision)` version triple, comparable the same way the
/// codec's version gates compare it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub revision: u8,
}

impl Version {
    pub const fn new(major: u8, minor: u8, revision: u8) -> Self {
        Version { major, minor, revision }
    }

    #[inline]
    pub fn at_least(&self, major: u8, minor: u8, revision: u8) -> bool {
        *self >= Version::new(major, minor, revision)
    }

    #[inline]
    pub fn at_most(&self, major: u8, minor: u8, revision: u8) -> bool {
        *self <= Version::new(major, minor, revision)
    }

    /// True when strictly below the given version -- the complement of
    /// [`Self::at_least`], used for "field exists iff version >= threshold" gates.
    #[inline]
    pub fn before(&self, major: u8, minor: u8, revision: u8) -> bool {
        !self.at_least(major, minor, revision)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.revision)
    }
}

/// Column byte widths for each event kind's per-record struct, used by the shuffler's
/// transpose pass. A negative width means "one byte, bit-plane shuffled" rather than
/// "byte shuffled"; a width of zero (after [`truncate_to_version`]) means the column
/// doesn't exist in this replay's version and should be skipped entirely.
#[derive(Debug, Clone)]
pub struct ColumnWidths {
    pub frame_start: Vec<i32>,
    pub pre_frame: Vec<i32>,
    pub item_update: Vec<i32>,
    pub post_frame: Vec<i32>,
    pub bookend: Vec<i32>,
    pub split_message: Vec<i32>,
}

impl ColumnWidths {
    pub fn new() -> Self {
        ColumnWidths {
            frame_start: vec![1, 4, 4, 4, 0],
            pre_frame: vec![1, 4, 1, 1, 4, 2, 4, 4, 4, 4, 4, 4, 4, 4, 4, 2, 4, 4, 1, 4, 0],
            item_update: vec![1, 4, 2, 1, 4, 4, 4, 4, 4, 2, 4, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0],
            post_frame: vec![
                1, 4, 1, 1, 1, 2, 4, 4, 4, 4, 4, 1, 1, 1, 1, 4, 1, 1, 1, 1, 1, 4, 1, 2, 1, 1, 1, 4,
                4, 4, 4, 4, 4, 4, 0,
            ],
            bookend: vec![1, 4, 4, 0],
            split_message: vec![1, 512, 2, 1, 1, 0],
        }
    }

    /// Zeros out columns that a field-gate excludes at `version`. Column indices below
    /// match the struct layouts documented on each `_cw_*`/`_dw_*` table in the codec.
    pub fn truncate_to_version(&mut self, version: Version) {
        if version.before(3, 11, 0) {
            self.post_frame[33] = 0; // animation index
        }
        if version.before(3, 10, 0) {
            self.frame_start[3] = 0; // scene frame counter
        }
        if version.before(3, 8, 0) {
            self.post_frame[32] = 0; // hitlag and onward
        }
        if version.before(3, 7, 0) {
            self.bookend[2] = 0; // rollback frame
        }
        if version.before(3, 6, 0) {
            self.item_update[19] = 0; // item owner
        }
        if version.before(3, 5, 0) {
            self.post_frame[27] = 0; // self-induced air x speed and onward
        }
        if version.before(3, 2, 0) {
            self.item_update[15] = 0; // item state bits
        }
        if version.before(2, 1, 0) {
            self.post_frame[26] = 0; // hurtbox collision state and onward
        }
        if version.before(2, 0, 0) {
            self.post_frame[16] = 0; // state bit flags 1 and onward
        }
        if version.before(1, 4, 0) {
            self.pre_frame[19] = 0; // pre-frame damage percent
        }
        if version.before(1, 2, 0) {
            self.pre_frame[18] = 0; // UCF x-analog
        }
    }
}

impl Default for ColumnWidths {
    fn default() -> Self {
        Self::new()
    }
}
