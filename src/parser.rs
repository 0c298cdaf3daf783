//! The parser (C4): validates the header and event-size table, dispatches
//! per event kind, and builds the in-memory [`crate::replay::Replay`] model.
//!
//! Two outputs come out of a single walk over the buffer: the semantic
//! `Replay` this module owns, and the raw [`EventStream`] spanning the game
//! loop (every event strictly between `GAME_START` and `GAME_END`), which the
//! codec and shuffler need since their transforms are defined byte-for-byte
//! against the wire format rather than this parsed model.

use crate::binary::*;
use crate::error::{Result, SlippcError};
use crate::replay::*;
use crate::schema::*;
use crate::stream::EventStream;
use crate::ubjson;
use log::{debug, trace, warn};
use std::collections::HashMap;

/// Header (15 bytes: the fixed magic plus the raw-length `u32`) + a
/// minimal event-size table + the four required-but-`GAME_END` events at
/// their smallest possible size + a `GAME_END` event.
pub const MIN_REPLAY_LENGTH: usize = 15 + (1 + 1 + 3 * 5) + 3 * 4 + 2;

/// Output of a single parse pass: the semantic model plus everything needed
/// to losslessly reassemble the original byte stream.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub replay: Replay,
    pub size_table: HashMap<u8, u16>,
    /// `GAME_START`'s on-wire bytes, including its command byte.
    pub game_start_raw: Vec<u8>,
    /// Every event strictly between `GAME_START` and `GAME_END`.
    pub game_loop: EventStream,
    /// `GAME_END`'s on-wire bytes, including its command byte. Empty if the
    /// replay has no `GAME_END` -- see `Replay.errors` for the corresponding
    /// diagnostic, which callers that mean to encode should treat as fatal.
    pub game_end_raw: Vec<u8>,
    /// Everything from the `"U\x08metadata"` tag through the file's closing
    /// `}`, preserved verbatim so a caller can reassemble an identical file.
    pub metadata_raw: Vec<u8>,
}

/// A single raw event discovered while walking the size-table-delimited
/// stream, before any semantic interpretation.
struct RawSpan {
    code: u8,
    bytes: Vec<u8>,
}

pub struct Parser {
    debug_level: u8,
}

impl Default for Parser {
    fn default() -> Self {
        Parser::new(0)
    }
}

/// The fixed-layout prefix of a raw replay buffer: the size table and
/// `GAME_START` event, plus enough bookkeeping to locate everything after
/// them without re-walking from the start. Used by [`crate::pipeline`] to
/// read past `GAME_START` on a shuffled (column-transposed) stream, which
/// `Parser::parse`'s span walk can't do on its own since the shuffled game
/// loop doesn't look like a sequence of length-prefixed events.
pub struct HeaderSplit {
    pub size_table: HashMap<u8, u16>,
    pub game_start_raw: Vec<u8>,
    /// Byte offset where the game loop (or its shuffled blob) begins.
    pub body_start: usize,
    /// Byte offset one past `GAME_END`, i.e. where metadata begins.
    pub stream_end: usize,
}

impl Parser {
    pub fn new(debug_level: u8) -> Self {
        Parser { debug_level }
    }

    /// Reads the size table and `GAME_START` event off the front of a raw
    /// buffer, without assuming anything about what comes after.
    pub fn split_header(&self, buf: &[u8]) -> Result<HeaderSplit> {
        if buf.len() < MIN_REPLAY_LENGTH {
            return Err(SlippcError::TooShort { found: buf.len(), min: MIN_REPLAY_LENGTH });
        }
        if buf[0..SLP_HEADER.len()] != SLP_HEADER {
            return Err(SlippcError::BadMagic);
        }
        let mut raw_len = read_u32(buf, 11) as usize;
        if raw_len == 0 || 15 + raw_len > buf.len() {
            raw_len = buf.len() - 15;
        }
        let stream_end = 15 + raw_len;

        let mut pos = 15usize;
        let (size_table, _duplicates) = self.parse_event_sizes(buf, &mut pos)?;

        if buf[pos] != EventCode::GameStart as u8 {
            return Err(SlippcError::MissingRequiredEvent { code: EventCode::GameStart as u8 });
        }
        let size = *size_table
            .get(&(EventCode::GameStart as u8))
            .ok_or(SlippcError::MissingRequiredEvent { code: EventCode::GameStart as u8 })? as usize;
        if pos + 1 + size > buf.len() {
            return Err(SlippcError::TruncatedEvent { code: EventCode::GameStart as u8, offset: pos });
        }
        let game_start_raw = buf[pos..pos + 1 + size].to_vec();
        pos += 1 + size;

        Ok(HeaderSplit { size_table, game_start_raw, body_start: pos, stream_end })
    }

    /// Writes an event-payload-sizes table in the on-wire format -- exposed so
    /// callers that reassemble a stream from pieces (see [`crate::pipeline`])
    /// don't have to duplicate the encoding.
    pub fn write_size_table_public(&self, out: &mut Vec<u8>, sizes: &HashMap<u8, u16>) {
        self.write_size_table(out, sizes)
    }

    /// Parses a raw (already decompressed) replay buffer, handling the
    /// "already encoded" re-entry described for `GAME_START`: if the encoded
    /// flag is set, the caller is expected to have handed us bytes that are
    /// still the codec-only (`--raw-enc`) form -- plain per-event records
    /// with transformed field values, not shuffled columns. We decode them in
    /// place and parse again, once.
    pub fn parse(&self, buf: &[u8]) -> Result<ParsedFile> {
        let (header_raw_len, size_table, duplicates, spans) = self.walk_spans(buf)?;

        let game_start = spans
            .iter()
            .find(|s| s.code == EventCode::GameStart as u8)
            .ok_or(SlippcError::MissingRequiredEvent { code: EventCode::GameStart as u8 })?;

        if read_u8(&game_start.bytes, O_SLP_ENC) != 0 {
            debug!("game start flagged encoded, decoding in place and re-parsing");
            return self.decode_and_reparse(buf, header_raw_len, &size_table, &spans);
        }

        self.build(buf, header_raw_len, size_table, &duplicates, spans)
    }

    fn decode_and_reparse(
        &self,
        buf: &[u8],
        header_raw_len: usize,
        size_table: &HashMap<u8, u16>,
        spans: &[RawSpan],
    ) -> Result<ParsedFile> {
        let game_start = spans.iter().find(|s| s.code == EventCode::GameStart as u8).unwrap();
        let version = Version::new(
            read_u8(&game_start.bytes, O_SLP_MAJ),
            read_u8(&game_start.bytes, O_SLP_MIN),
            read_u8(&game_start.bytes, O_SLP_REV),
        );
        // GAME_START's own bytes aren't touched by the codec beyond the
        // encoded-flag byte, so the match's initial RNG seed is still sitting
        // at its raw offset even in encoded form.
        let seed0 = read_u32(&game_start.bytes, O_RNG_GAME_START);

        let mut loop_stream = EventStream::new();
        for span in spans {
            if span.code != EventCode::GameStart as u8 && span.code != EventCode::GameEnd as u8 {
                loop_stream.push(span.code, span.bytes.clone());
            }
        }

        let codec = crate::codec::Codec::new(version, seed0);
        codec.decode(&mut loop_stream)?;

        let mut decoded_start = game_start.bytes.clone();
        write_u8(&mut decoded_start, O_SLP_ENC, 0);
        let game_end = spans.iter().find(|s| s.code == EventCode::GameEnd as u8);

        let mut rebuilt = Vec::with_capacity(buf.len());
        rebuilt.extend_from_slice(&SLP_HEADER);
        rebuilt.extend_from_slice(&[0u8; 4]);
        self.write_size_table(&mut rebuilt, size_table);
        rebuilt.extend_from_slice(&decoded_start);
        rebuilt.extend_from_slice(&loop_stream.to_bytes());
        if let Some(ge) = game_end {
            rebuilt.extend_from_slice(&ge.bytes);
        }
        let new_raw_len = (rebuilt.len() - 15) as u32;
        write_u32(&mut rebuilt, 11, new_raw_len);
        rebuilt.extend_from_slice(&buf[(15 + header_raw_len).min(buf.len())..]);

        let (raw_len2, table2, duplicates2, spans2) = self.walk_spans(&rebuilt)?;
        self.build(&rebuilt, raw_len2, table2, &duplicates2, spans2)
    }

    fn write_size_table(&self, out: &mut Vec<u8>, sizes: &HashMap<u8, u16>) {
        out.push(EventCode::EventPayloads as u8);
        let table_len = 1 + 3 * sizes.len();
        out.push(table_len as u8);
        let mut codes: Vec<u8> = sizes.keys().copied().collect();
        codes.sort_unstable();
        for code in codes {
            out.push(code);
            out.extend_from_slice(&sizes[&code].to_be_bytes());
        }
    }

    /// Splits the buffer into its size table and event spans without doing
    /// any semantic interpretation, so the re-entry path can decode first.
    fn walk_spans(&self, buf: &[u8]) -> Result<(usize, HashMap<u8, u16>, Vec<u8>, Vec<RawSpan>)> {
        if buf.len() < MIN_REPLAY_LENGTH {
            return Err(SlippcError::TooShort { found: buf.len(), min: MIN_REPLAY_LENGTH });
        }
        if buf[0..SLP_HEADER.len()] != SLP_HEADER {
            return Err(SlippcError::BadMagic);
        }

        let mut raw_len = read_u32(buf, 11) as usize;
        if raw_len == 0 || 15 + raw_len > buf.len() {
            raw_len = buf.len() - 15;
        }
        let stream_end = 15 + raw_len;

        let mut pos = 15usize;
        let (size_table, duplicates) = self.parse_event_sizes(buf, &mut pos)?;

        let mut spans = Vec::new();
        while pos < stream_end {
            let code = buf[pos];
            let size = match size_table.get(&code) {
                Some(&s) => s as usize,
                None => break,
            };
            if pos + 1 + size > buf.len() {
                break;
            }
            spans.push(RawSpan { code, bytes: buf[pos..pos + 1 + size].to_vec() });
            let is_end = code == EventCode::GameEnd as u8;
            pos += 1 + size;
            if is_end {
                break;
            }
        }

        Ok((raw_len, size_table, duplicates, spans))
    }

    fn parse_event_sizes(&self, buf: &[u8], pos: &mut usize) -> Result<(HashMap<u8, u16>, Vec<u8>)> {
        if buf[*pos] != EventCode::EventPayloads as u8 {
            return Err(SlippcError::BadMagic);
        }
        let table_len = buf[*pos + 1] as usize;
        if table_len == 0 || (table_len - 1) % 3 != 0 {
            return Err(SlippcError::TruncatedEvent { code: EventCode::EventPayloads as u8, offset: *pos });
        }
        let count = (table_len - 1) / 3;

        let mut sizes = HashMap::new();
        let mut duplicates = Vec::new();
        for i in 0..count {
            let off = *pos + 2 + i * 3;
            let code = buf[off];
            let size = read_u16(buf, off + 1);
            if sizes.insert(code, size).is_some() {
                duplicates.push(code);
            }
        }
        for &required in &EventCode::REQUIRED {
            if !sizes.contains_key(&required) {
                return Err(SlippcError::MissingRequiredEvent { code: required });
            }
        }

        *pos += 1 + table_len;
        Ok((sizes, duplicates))
    }

    /// Builds the semantic `Replay` from already-decoded spans. `header_raw_len`
    /// is the validated raw-length field, used only to locate the metadata
    /// trailer.
    fn build(
        &self,
        buf: &[u8],
        header_raw_len: usize,
        size_table: HashMap<u8, u16>,
        duplicates: &[u8],
        spans: Vec<RawSpan>,
    ) -> Result<ParsedFile> {
        let mut replay = Replay::default();
        let mut game_start_raw = Vec::new();
        let mut game_end_raw = Vec::new();
        let mut game_loop = EventStream::new();
        let mut max_frames = i32::MAX;

        for &code in duplicates {
            replay.push_error(format!("event code {code:#x} appeared twice in the event-payload-sizes table"));
        }

        for span in &spans {
            match span.code {
                x if x == EventCode::GameStart as u8 => {
                    game_start_raw = span.bytes.clone();
                    self.parse_game_start(&span.bytes, &mut replay);
                    max_frames = self.max_frames(buf.len().saturating_sub(15), &size_table);
                }
                x if x == EventCode::GameEnd as u8 => {
                    game_end_raw = span.bytes.clone();
                    self.parse_game_end(&span.bytes, &mut replay);
                }
                x if x == EventCode::PreFrame as u8 => {
                    self.parse_pre_frame(&span.bytes, max_frames, &mut replay);
                    game_loop.push(span.code, span.bytes.clone());
                }
                x if x == EventCode::PostFrame as u8 => {
                    self.parse_post_frame(&span.bytes, max_frames, &mut replay);
                    game_loop.push(span.code, span.bytes.clone());
                }
                x if x == EventCode::ItemUpdate as u8 => {
                    self.parse_item_update(&span.bytes, &mut replay);
                    game_loop.push(span.code, span.bytes.clone());
                }
                _ => game_loop.push(span.code, span.bytes.clone()),
            }
        }

        if game_end_raw.is_empty() {
            replay.push_error("replay is missing its GAME_END event");
        }

        let metadata_raw = buf[(15 + header_raw_len).min(buf.len())..].to_vec();
        self.parse_metadata(&metadata_raw, &mut replay);

        Ok(ParsedFile { replay, size_table, game_start_raw, game_loop, game_end_raw, metadata_raw })
    }

    /// Rough upper bound on the frame count, used only to reject obviously
    /// corrupt frame indices early. Assumes two ports' worth of pre/post
    /// frame events dominate the stream, which holds for any singles replay
    /// and is a safe (if loose) overestimate for doubles and Ice Climbers.
    fn max_frames(&self, loop_region_len: usize, sizes: &HashMap<u8, u16>) -> i32 {
        let pre = *sizes.get(&(EventCode::PreFrame as u8)).unwrap_or(&0) as usize + 1;
        let post = *sizes.get(&(EventCode::PostFrame as u8)).unwrap_or(&0) as usize + 1;
        let per_frame = 2 * (pre + post);
        if per_frame == 0 {
            return i32::MAX;
        }
        (loop_region_len / per_frame + 1).min(i32::MAX as usize) as i32
    }

    fn parse_game_start(&self, payload: &[u8], replay: &mut Replay) {
        replay.version = Version::new(read_u8(payload, O_SLP_MAJ), read_u8(payload, O_SLP_MIN), read_u8(payload, O_SLP_REV));
        trace!("game start: version {}", replay.version);

        replay.is_teams = read_u8(payload, O_IS_TEAMS) != 0;
        replay.stage = read_u16(payload, O_STAGE);
        replay.timer_minutes = read_u32(payload, O_TIMER) / 60;
        replay.random_seed = read_u32(payload, O_RNG_GAME_START);

        if replay.version.at_least(1, 5, 0) {
            replay.is_pal = Some(read_u8(payload, O_IS_PAL) != 0);
        }
        if replay.version.at_least(2, 0, 0) {
            replay.frozen_stadium = Some(read_u8(payload, O_PS_FROZEN) != 0);
        }
        if replay.version.at_least(3, 7, 0) {
            replay.scene_minor = Some(read_u8(payload, O_SCENE_MIN));
            replay.scene_major = Some(read_u8(payload, O_SCENE_MAJ));
        }
        if replay.version.at_least(3, 12, 0) {
            replay.language = Some(read_u8(payload, O_LANGUAGE));
        }
        if replay.version.at_least(3, 14, 0) && payload.len() > O_TIEBREAKER_NUMBER + 4 {
            replay.match_id = Some(cstr_utf8(&payload[O_MATCH_ID..O_GAME_NUMBER]));
            replay.game_number = Some(read_u32(payload, O_GAME_NUMBER));
            replay.tiebreaker_number = Some(read_u32(payload, O_TIEBREAKER_NUMBER));
        }

        for port in 0..4usize {
            let base = O_PLAYERDATA + 0x24 * port;
            let player_type = PlayerType::from_byte(read_u8(payload, base + O_PLAYER_TYPE));

            let mut player = Player {
                port: port as u8,
                is_follower: false,
                player_type,
                ext_char_id: read_u8(payload, base + O_PLAYER_ID),
                start_stocks: read_u8(payload, base + O_START_STOCKS),
                color: read_u8(payload, base + O_COLOR),
                team_id: read_u8(payload, base + O_TEAM_ID),
                in_game_tag: String::new(),
                tags: PlayerTags::default(),
                ucf_dashback: 0,
                ucf_shield_drop: 0,
            };
            // Per-player gameplay-option flags (stamina/silent/low-gravity/...)
            // packed into `base + O_PLAYER_BITS` aren't surfaced individually.

            if replay.version.at_least(1, 0, 0) {
                let m = O_DASHBACK + 0x8 * port;
                if m + 8 <= payload.len() {
                    player.ucf_dashback = read_u8(payload, m + 3);
                    player.ucf_shield_drop = read_u8(payload, m + 7);
                }
            }
            if replay.version.at_least(1, 3, 0) {
                let k = O_NAMETAG + 0x10 * port;
                if k + 0x10 <= payload.len() {
                    player.in_game_tag = decode_shift_jis(&payload[k..k + 0x10]);
                }
            }
            if replay.version.at_least(3, 9, 0) {
                let k = O_DISP_NAME + 0x1F * port;
                if k + 0x1F <= payload.len() {
                    player.tags.display_name = decode_shift_jis(&payload[k..k + 0x1F]);
                }
                let c = O_CONN_CODE + 0x0A * port;
                if c + 0x0A <= payload.len() {
                    player.tags.connect_code = cstr_utf8(&payload[c..c + 0x0A]);
                }
            }
            if replay.version.at_least(3, 11, 0) {
                let u = O_SLIPPI_UID + 0x1D * port;
                if u + 0x1D <= payload.len() {
                    player.tags.slippi_uid = cstr_utf8(&payload[u..u + 0x1D]);
                }
            }

            replay.players.push(player);
        }
    }

    fn parse_pre_frame(&self, payload: &[u8], max_frames: i32, replay: &mut Replay) {
        let frame = read_i32(payload, O_FRAME);
        if frame < LOAD_FRAME || frame - LOAD_FRAME >= max_frames {
            replay.push_error(SlippcError::BadFrameIndex { frame, max_frames }.to_string());
            return;
        }
        let port = read_u8(payload, O_PLAYER) as usize;
        let follower = read_u8(payload, O_FOLLOWER) != 0;
        let slot = port + if follower { 4 } else { 0 };
        if slot > 7 {
            replay.push_error(SlippcError::BadPlayerIndex { index: slot }.to_string());
            return;
        }

        let mut pre = PreFrame {
            frame,
            random_seed: read_u32(payload, O_RNG_PRE),
            action_state: read_u16(payload, O_ACTION_PRE),
            pos_x: read_f32(payload, O_XPOS_PRE),
            pos_y: read_f32(payload, O_YPOS_PRE),
            facing: read_f32(payload, O_FACING_PRE),
            joystick_x: read_f32(payload, O_JOY_X),
            joystick_y: read_f32(payload, O_JOY_Y),
            cstick_x: read_f32(payload, O_CX),
            cstick_y: read_f32(payload, O_CY),
            trigger: read_f32(payload, O_TRIGGER),
            processed_buttons: read_u32(payload, O_PROCESSED),
            buttons: read_u16(payload, O_BUTTONS),
            phys_l: read_f32(payload, O_PHYS_L),
            phys_r: read_f32(payload, O_PHYS_R),
            ucf_analog_x: None,
            damage: None,
        };
        if replay.version.at_least(1, 2, 0) && payload.len() > O_UCF_ANALOG {
            pre.ucf_analog_x = Some(read_i8(payload, O_UCF_ANALOG));
        }
        if replay.version.at_least(1, 4, 0) && payload.len() > O_DAMAGE_PRE + 3 {
            pre.damage = Some(read_f32(payload, O_DAMAGE_PRE));
        }

        replay.frame_count = replay.frame_count.max(frame - LOAD_FRAME + 1);
        replay.frames.entry(slot).or_default().pre.insert(frame, pre);
    }

    fn parse_post_frame(&self, payload: &[u8], max_frames: i32, replay: &mut Replay) {
        let frame = read_i32(payload, O_FRAME);
        if frame < LOAD_FRAME || frame - LOAD_FRAME >= max_frames {
            replay.push_error(SlippcError::BadFrameIndex { frame, max_frames }.to_string());
            return;
        }
        let port = read_u8(payload, O_PLAYER) as usize;
        let follower = read_u8(payload, O_FOLLOWER) != 0;
        let slot = port + if follower { 4 } else { 0 };
        if slot > 7 {
            replay.push_error(SlippcError::BadPlayerIndex { index: slot }.to_string());
            return;
        }

        let mut post = PostFrame {
            frame,
            internal_char_id: read_u8(payload, O_INT_CHAR_ID),
            action_state: read_u16(payload, O_ACTION_POST),
            pos_x: read_f32(payload, O_XPOS_POST),
            pos_y: read_f32(payload, O_YPOS_POST),
            facing: read_f32(payload, O_FACING_POST),
            damage: read_f32(payload, O_DAMAGE_POST),
            shield: read_f32(payload, O_SHIELD),
            last_hit_id: read_u8(payload, O_LAST_HIT_ID),
            combo_count: read_u8(payload, O_COMBO),
            last_hit_by: read_u8(payload, O_LAST_HIT_BY),
            stocks: read_u8(payload, O_STOCKS),
            action_frame: None,
            state_bits: None,
            hitstun: None,
            airborne: None,
            ground_id: None,
            jumps: None,
            l_cancel: None,
            hurtbox: None,
            self_air_x: None,
            self_air_y: None,
            attack_x: None,
            attack_y: None,
            self_ground_x: None,
            hitlag: None,
            animation_index: None,
        };

        if replay.version.at_least(0, 2, 0) && payload.len() > O_ACTION_FRAMES + 3 {
            post.action_frame = Some(read_f32(payload, O_ACTION_FRAMES));
        }
        if replay.version.at_least(2, 0, 0) && payload.len() > O_LCANCEL {
            post.state_bits = Some([
                read_u8(payload, O_STATE_BITS_1),
                read_u8(payload, O_STATE_BITS_2),
                read_u8(payload, O_STATE_BITS_3),
                read_u8(payload, O_STATE_BITS_4),
                read_u8(payload, O_STATE_BITS_5),
            ]);
            post.hitstun = Some(read_f32(payload, O_HITSTUN));
            post.airborne = Some(read_u8(payload, O_AIRBORNE) != 0);
            post.ground_id = Some(read_u16(payload, O_GROUND_ID));
            post.jumps = Some(read_u8(payload, O_JUMPS));
            post.l_cancel = Some(read_u8(payload, O_LCANCEL));
        }
        if replay.version.at_least(2, 1, 0) && payload.len() > O_HURTBOX {
            post.hurtbox = Some(read_u8(payload, O_HURTBOX));
        }
        if replay.version.at_least(3, 5, 0) && payload.len() > O_SELF_GROUND_X + 3 {
            post.self_air_x = Some(read_f32(payload, O_SELF_AIR_X));
            post.self_air_y = Some(read_f32(payload, O_SELF_AIR_Y));
            post.attack_x = Some(read_f32(payload, O_ATTACK_X));
            post.attack_y = Some(read_f32(payload, O_ATTACK_Y));
            post.self_ground_x = Some(read_f32(payload, O_SELF_GROUND_X));
        }
        if replay.version.at_least(3, 8, 0) && payload.len() > O_HITLAG + 3 {
            post.hitlag = Some(read_f32(payload, O_HITLAG));
        }
        if replay.version.at_least(3, 11, 0) && payload.len() > O_ANIM_INDEX + 3 {
            post.animation_index = Some(read_u32(payload, O_ANIM_INDEX));
        }

        replay.frame_count = replay.frame_count.max(frame - LOAD_FRAME + 1);
        replay.frames.entry(slot).or_default().post.insert(frame, post);
    }

    fn parse_item_update(&self, payload: &[u8], replay: &mut Replay) {
        let frame = read_i32(payload, O_FRAME);
        let mut item = ItemFrame {
            frame,
            spawn_id: read_u32(payload, O_ITEM_ID),
            item_type: read_u16(payload, O_ITEM_TYPE),
            state: read_u8(payload, O_ITEM_STATE),
            facing: read_f32(payload, O_ITEM_FACING),
            x_vel: read_f32(payload, O_ITEM_XVEL),
            y_vel: read_f32(payload, O_ITEM_YVEL),
            x_pos: read_f32(payload, O_ITEM_XPOS),
            y_pos: read_f32(payload, O_ITEM_YPOS),
            damage: read_u16(payload, O_ITEM_DAMAGE),
            expiration: read_f32(payload, O_ITEM_EXPIRE),
            misc: [0; 4],
            owner: None,
        };
        if replay.version.at_least(3, 2, 0) && payload.len() > O_ITEM_MISC + 3 {
            item.misc = [
                read_u8(payload, O_ITEM_MISC),
                read_u8(payload, O_ITEM_MISC + 1),
                read_u8(payload, O_ITEM_MISC + 2),
                read_u8(payload, O_ITEM_MISC + 3),
            ];
        }
        if replay.version.at_least(3, 6, 0) && payload.len() > O_ITEM_OWNER {
            item.owner = Some(read_i8(payload, O_ITEM_OWNER));
        }
        replay.items.push(item);
    }

    fn parse_game_end(&self, payload: &[u8], replay: &mut Replay) {
        replay.end_method = Some(read_u8(payload, O_END_METHOD));
        if replay.version.at_least(2, 0, 0) && payload.len() > O_LRAS {
            replay.lras_initiator = Some(read_i8(payload, O_LRAS));
        }
    }

    fn parse_metadata(&self, raw: &[u8], replay: &mut Replay) {
        if raw.is_empty() {
            return;
        }
        let tag = b"U\x08metadata";
        let Some(body_start) = raw.windows(tag.len()).position(|w| w == tag).map(|p| p + tag.len()) else {
            if self.debug_level > 0 {
                warn!("metadata trailer did not contain the expected tag");
            }
            return;
        };
        match ubjson::parse(&raw[body_start..]) {
            Ok(tree) => {
                let (started_at, played_on, netplay, codes) = ubjson::harvest_summary(&tree);
                replay.metadata.started_at = started_at;
                replay.metadata.played_on = played_on;
                replay.metadata.netplay_names = netplay.into_iter().collect();
                replay.metadata.connect_codes = codes.into_iter().collect();
                replay.metadata.raw_json = tree;
            }
            Err(e) => replay.push_error(format!("metadata parse failed: {e}")),
        }
    }
}

/// Decodes a Shift-JIS byte run (trimmed at the first NUL) to UTF-8.
fn decode_shift_jis(bytes: &[u8]) -> String {
    let trimmed = bytes.split(|&b| b == 0).next().unwrap_or(bytes);
    let (cow, _, had_errors) = encoding_rs::SHIFT_JIS.decode(trimmed);
    if had_errors {
        trace!("shift-jis decode had replacement characters");
    }
    cow.into_owned()
}

/// Decodes a NUL-terminated ASCII/UTF-8 byte run.
fn cstr_utf8(bytes: &[u8]) -> String {
    let trimmed = bytes.split(|&b| b == 0).next().unwrap_or(bytes);
    String::from_utf8_lossy(trimmed).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size_table_bytes(entries: &[(u8, u16)]) -> Vec<u8> {
        let mut out = vec![EventCode::EventPayloads as u8];
        out.push((1 + 3 * entries.len()) as u8);
        for &(code, size) in entries {
            out.push(code);
            out.extend_from_slice(&size.to_be_bytes());
        }
        out
    }

    fn minimal_game_start(version: (u8, u8, u8)) -> Vec<u8> {
        let mut payload = vec![0u8; 0x65 + 0x24 * 4 + 4];
        payload[0] = EventCode::GameStart as u8;
        payload[O_SLP_MAJ] = version.0;
        payload[O_SLP_MIN] = version.1;
        payload[O_SLP_REV] = version.2;
        for p in 0..4 {
            payload[O_PLAYERDATA + 0x24 * p + O_PLAYER_TYPE] = 3; // empty
        }
        payload
    }

    fn minimal_game_end() -> Vec<u8> {
        vec![EventCode::GameEnd as u8, 0]
    }

    fn build_file(gs: &[u8], ge: &[u8]) -> Vec<u8> {
        let table = size_table_bytes(&[
            (EventCode::EventPayloads as u8, 0),
            (EventCode::GameStart as u8, (gs.len() - 1) as u16),
            (EventCode::PreFrame as u8, 0x3C),
            (EventCode::PostFrame as u8, 0x40),
            (EventCode::GameEnd as u8, (ge.len() - 1) as u16),
        ]);

        let mut buf = Vec::new();
        buf.extend_from_slice(&SLP_HEADER);
        buf.extend_from_slice(&[0u8; 4]);
        buf.extend_from_slice(&table);
        buf.extend_from_slice(gs);
        buf.extend_from_slice(ge);
        let raw_len = (buf.len() - 15) as u32;
        write_u32(&mut buf, 11, raw_len);
        buf.extend_from_slice(b"U\x08metadata{}");
        buf
    }

    #[test]
    fn parses_header_and_required_events_with_no_frames() {
        let gs = minimal_game_start((3, 9, 0));
        let ge = minimal_game_end();
        let buf = build_file(&gs, &ge);

        let parser = Parser::new(0);
        let parsed = parser.parse(&buf).unwrap();
        assert_eq!(parsed.replay.version, Version::new(3, 9, 0));
        assert!(parsed.replay.end_method.is_some());
        assert!(parsed.replay.errors.is_empty(), "{:?}", parsed.replay.errors);
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = vec![0u8; MIN_REPLAY_LENGTH];
        assert!(matches!(Parser::new(0).parse(&buf), Err(SlippcError::BadMagic)));
    }

    #[test]
    fn too_short_buffer_is_rejected() {
        let buf = vec![0u8; 4];
        assert!(matches!(Parser::new(0).parse(&buf), Err(SlippcError::TooShort { .. })));
    }

    #[test]
    fn missing_game_end_is_recorded_as_a_diagnostic() {
        let gs = minimal_game_start((3, 9, 0));
        let table = size_table_bytes(&[
            (EventCode::EventPayloads as u8, 0),
            (EventCode::GameStart as u8, (gs.len() - 1) as u16),
            (EventCode::PreFrame as u8, 0x3C),
            (EventCode::PostFrame as u8, 0x40),
            (EventCode::GameEnd as u8, 2),
        ]);
        let mut buf = Vec::new();
        buf.extend_from_slice(&SLP_HEADER);
        buf.extend_from_slice(&[0u8; 4]);
        buf.extend_from_slice(&table);
        buf.extend_from_slice(&gs);
        let raw_len = (buf.len() - 15) as u32;
        write_u32(&mut buf, 11, raw_len);
        buf.extend_from_slice(b"U\x08metadata{}");

        let parsed = Parser::new(0).parse(&buf).unwrap();
        assert!(parsed.replay.errors.iter().any(|d| d.message.contains("GAME_END")));
    }
}
