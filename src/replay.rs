//! In-memory replay model: players, per-frame pre/post state, items, and the
//! metadata block harvested from the UBJSON trailer.
//!
//! This is the model the [`crate::parser`] builds and the [`crate::analyzer`]
//! consumes. The codec (`crate::codec`) and shuffler (`crate::shuffle`) operate
//! directly on raw bytes instead -- they never go through this struct -- but they
//! share its offsets and version gates via [`crate::schema`].

use crate::error::Diagnostic;
use crate::schema::{Version, LOAD_FRAME};
use serde::Serialize;
use std::collections::BTreeMap;

/// A player slot index in `[0, 8)`: ports 0-3, plus the Ice Climbers' follower
/// twin at `port + 4`.
pub type PlayerSlot = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PlayerType {
    Human = 0,
    Cpu = 1,
    Demo = 2,
    #[default]
    Empty = 3,
}

impl PlayerType {
    pub fn from_byte(b: u8) -> PlayerType {
        match b {
            0 => PlayerType::Human,
            1 => PlayerType::Cpu,
            2 => PlayerType::Demo,
            _ => PlayerType::Empty,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PlayerTags {
    pub display_name: String,
    pub connect_code: String,
    pub slippi_uid: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Player {
    pub port: u8,
    pub is_follower: bool,
    pub player_type: PlayerType,
    pub ext_char_id: u8,
    pub start_stocks: u8,
    pub color: u8,
    pub team_id: u8,
    pub in_game_tag: String,
    pub tags: PlayerTags,
    pub ucf_dashback: u8,
    pub ucf_shield_drop: u8,
}

impl Player {
    /// `p + 4*follower`, as used throughout the codec's carry-state arrays.
    #[inline]
    pub fn slot(&self) -> PlayerSlot {
        self.port as usize + if self.is_follower { 4 } else { 0 }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PreFrame {
    pub frame: i32,
    pub random_seed: u32,
    pub action_state: u16,
    pub pos_x: f32,
    pub pos_y: f32,
    pub facing: f32,
    pub joystick_x: f32,
    pub joystick_y: f32,
    pub cstick_x: f32,
    pub cstick_y: f32,
    pub trigger: f32,
    pub processed_buttons: u32,
    pub buttons: u16,
    pub phys_l: f32,
    pub phys_r: f32,
    pub ucf_analog_x: Option<i8>,
    pub damage: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PostFrame {
    pub frame: i32,
    pub internal_char_id: u8,
    pub action_state: u16,
    pub pos_x: f32,
    pub pos_y: f32,
    pub facing: f32,
    pub damage: f32,
    pub shield: f32,
    pub last_hit_id: u8,
    pub combo_count: u8,
    pub last_hit_by: u8,
    pub stocks: u8,
    pub action_frame: Option<f32>,
    pub state_bits: Option<[u8; 5]>,
    pub hitstun: Option<f32>,
    pub airborne: Option<bool>,
    pub ground_id: Option<u16>,
    pub jumps: Option<u8>,
    pub l_cancel: Option<u8>,
    pub hurtbox: Option<u8>,
    pub self_air_x: Option<f32>,
    pub self_air_y: Option<f32>,
    pub attack_x: Option<f32>,
    pub attack_y: Option<f32>,
    pub self_ground_x: Option<f32>,
    pub hitlag: Option<f32>,
    pub animation_index: Option<u32>,
}

impl PostFrame {
    #[inline]
    pub fn flags_2(&self) -> u8 {
        self.state_bits.map(|b| b[1]).unwrap_or(0)
    }
    #[inline]
    pub fn flags_3(&self) -> u8 {
        self.state_bits.map(|b| b[2]).unwrap_or(0)
    }
    #[inline]
    pub fn flags_4(&self) -> u8 {
        self.state_bits.map(|b| b[3]).unwrap_or(0)
    }
    #[inline]
    pub fn flags_5(&self) -> u8 {
        self.state_bits.map(|b| b[4]).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ItemFrame {
    pub frame: i32,
    pub spawn_id: u32,
    pub item_type: u16,
    pub state: u8,
    pub facing: f32,
    pub x_vel: f32,
    pub y_vel: f32,
    pub x_pos: f32,
    pub y_pos: f32,
    pub damage: u16,
    pub expiration: f32,
    pub misc: [u8; 4],
    pub owner: Option<i8>,
}

/// A single player's pre/post frame history, indexed by signed frame number.
#[derive(Debug, Clone, Default)]
pub struct PlayerFrames {
    pub pre: BTreeMap<i32, PreFrame>,
    pub post: BTreeMap<i32, PostFrame>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Metadata {
    pub played_on: Option<String>,
    pub started_at: Option<String>,
    /// Keyed by port index, as harvested from the flattened `players.<port>.*` paths.
    pub netplay_names: BTreeMap<u8, String>,
    pub connect_codes: BTreeMap<u8, String>,
    /// The full UBJSON tree, preserved verbatim as JSON text so round-tripping
    /// doesn't lose any field the harvester above doesn't know about.
    pub raw_json: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct Replay {
    pub version: Version,
    pub encoded: bool,
    pub stage: u16,
    pub is_teams: bool,
    pub random_seed: u32,
    pub timer_minutes: u32,
    /// `None` below the version each was introduced at, matching the schema's gates.
    pub is_pal: Option<bool>,
    pub frozen_stadium: Option<bool>,
    pub scene_major: Option<u8>,
    pub scene_minor: Option<u8>,
    pub language: Option<u8>,
    pub match_id: Option<String>,
    pub game_number: Option<u32>,
    pub tiebreaker_number: Option<u32>,
    pub players: Vec<Player>,
    pub frames: BTreeMap<PlayerSlot, PlayerFrames>,
    pub items: Vec<ItemFrame>,
    pub frame_count: i32,
    pub end_method: Option<u8>,
    pub lras_initiator: Option<i8>,
    pub metadata: Metadata,
    pub errors: Vec<Diagnostic>,
}

impl Replay {
    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(Diagnostic::new(message));
    }

    pub fn active_players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.player_type != PlayerType::Empty)
    }

    /// Translates a signed frame number into the 0-based row a frame array would use,
    /// matching the `LOAD_FRAME` offset convention from the schema.
    #[inline]
    pub fn frame_row(frame: i32) -> usize {
        (frame - LOAD_FRAME) as usize
    }
}

/// Minimal JSON projection over the bits of metadata a caller usually wants --
/// mirrors the `startAt`/`playedOn`/`netplay`/`code` harvesting the format calls for.
pub fn metadata_summary_json(meta: &Metadata) -> serde_json::Value {
    serde_json::json!({
        "startAt": meta.started_at,
        "playedOn": meta.played_on,
        "netplay": meta.netplay_names,
        "code": meta.connect_codes,
    })
}
