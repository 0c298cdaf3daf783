//! Frame-by-frame interaction analysis (C8): turns a parsed [`crate::replay::Replay`]
//! into a per-frame "dynamic" classification for each side of a 1v1, plus the
//! derived counters (dashdances, L-cancels, techs, wavedashes, punishes...) those
//! dynamics are built from.
//!
//! This never touches the codec or the shuffler -- it runs purely against the
//! decoded [`crate::replay::Replay`] tree, the same way a stats tool would run
//! against any other parsed replay.

use crate::action_state::{self, action, KillDir};
use crate::replay::{PlayerSlot, PostFrame, Replay};
use serde::Serialize;
use std::collections::BTreeMap;

/// Distance cutoff between `Footsies` and `Positioning` neutral dynamics.
const FOOTSIE_RANGE: f32 = 40.0;

/// A hit is still a "poke" (rather than a reset to neutral) if it landed this
/// many frames ago or less.
const POKE_THRES: i32 = 30;

/// A punish that's let its victim sit in hitstun this long without landing is
/// "sharking" (them airborne, us waiting) rather than an active punish.
const SHARK_THRES: i32 = 15;

/// A frame-level interaction state, from one player's perspective. The
/// defensive and offensive dynamics come in mirrored pairs; [`Dynamic::mirror`]
/// gives you the other player's label for the same frame without re-running
/// the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Dynamic {
    // Neutral: neither player has the advantage.
    Positioning,
    Footsies,
    Trading,
    Poking,
    // Defensive: this player is on the back foot.
    Recovering,
    Escaping,
    Pressured,
    Punished,
    Grounding,
    // Offensive: this player has the advantage. Mirrors of the defensive five.
    Edgeguarding,
    Techchasing,
    Pressuring,
    Punishing,
    Sharking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Neutral,
    Defensive,
    Offensive,
}

impl Dynamic {
    pub fn zone(self) -> Zone {
        use Dynamic::*;
        match self {
            Positioning | Footsies | Trading | Poking => Zone::Neutral,
            Recovering | Escaping | Pressured | Punished | Grounding => Zone::Defensive,
            Edgeguarding | Techchasing | Pressuring | Punishing | Sharking => Zone::Offensive,
        }
    }

    /// The label the *other* player gets for this same frame. Neutral dynamics
    /// are shared; defensive and offensive dynamics mirror onto each other
    /// pairwise (recovering from an edgeguard, escaping a techchase, and so on).
    pub fn mirror(self) -> Dynamic {
        use Dynamic::*;
        match self {
            Positioning | Footsies | Trading | Poking => self,
            Recovering => Edgeguarding,
            Escaping => Techchasing,
            Pressured => Pressuring,
            Punished => Punishing,
            Grounding => Sharking,
            Edgeguarding => Recovering,
            Techchasing => Escaping,
            Pressuring => Pressured,
            Punishing => Punished,
            Sharking => Grounding,
        }
    }
}

/// One continuous stretch of advantage: a string of moves landed on an
/// opponent between the first hit and the moment neutral resets.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Punish {
    pub start_frame: i32,
    pub end_frame: i32,
    pub start_pct: f32,
    pub end_pct: f32,
    pub num_moves: u32,
    pub last_move_id: u8,
    /// Direction the victim was sent off the blast zone on the killing blow,
    /// if this punish ended in a kill. Stays [`KillDir::Neut`] otherwise.
    pub kill_dir: KillDir,
}

impl Punish {
    pub fn did_kill(&self) -> bool {
        self.kill_dir != KillDir::Neut
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisPlayer {
    pub port: u8,
    pub char_id: u8,
    pub end_stocks: u8,
    pub end_pct: f32,
    pub air_frames: u32,
    pub dashdances: u32,
    pub spotdodges: u32,
    pub rolls: u32,
    pub airdodges: u32,
    pub wavedashes: u32,
    pub wavelands: u32,
    pub l_cancels_hit: u32,
    pub l_cancels_missed: u32,
    pub techs: u32,
    pub missed_techs: u32,
    pub walltechs: u32,
    pub walljumps: u32,
    pub ledge_grabs: u32,
    pub neutral_wins: u32,
    pub counters: u32,
    pub pokes: u32,
    pub dyn_counts: BTreeMap<&'static str, u32>,
    pub punishes: Vec<Punish>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Analysis {
    pub success: bool,
    pub game_time_seconds: u32,
    pub stage: u16,
    pub winner_port: Option<u8>,
    pub total_frames: u32,
    /// Indexed by frame row ([`Replay::frame_row`]); `ap[0]`'s perspective.
    pub dynamics: Vec<&'static str>,
    pub ap: [AnalysisPlayer; 2],
}

fn dyn_name(d: Dynamic) -> &'static str {
    use Dynamic::*;
    match d {
        Positioning => "positioning",
        Footsies => "footsies",
        Trading => "trading",
        Poking => "poking",
        Recovering => "recovering",
        Escaping => "escaping",
        Pressured => "pressured",
        Punished => "punished",
        Grounding => "grounding",
        Edgeguarding => "edgeguarding",
        Techchasing => "techchasing",
        Pressuring => "pressuring",
        Punishing => "punishing",
        Sharking => "sharking",
    }
}

/// Picks the two ports to analyze: the two with the most post-frames recorded,
/// excluding Ice Climbers follower slots (ports 4-7 are always follower twins).
fn get_1v1_ports(replay: &Replay) -> Option<[PlayerSlot; 2]> {
    let mut counts: Vec<(PlayerSlot, usize)> = replay
        .frames
        .iter()
        .filter(|(slot, _)| **slot < 4)
        .map(|(slot, pf)| (*slot, pf.post.len()))
        .filter(|(_, n)| *n > 0)
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    if counts.len() < 2 {
        return None;
    }
    Some([counts[0].0, counts[1].0])
}

fn post_at<'a>(replay: &'a Replay, slot: PlayerSlot, frame: i32) -> Option<&'a PostFrame> {
    replay.frames.get(&slot).and_then(|pf| pf.post.get(&frame))
}

fn pre_action_at(replay: &Replay, slot: PlayerSlot, frame: i32) -> u16 {
    replay
        .frames
        .get(&slot)
        .and_then(|pf| pf.pre.get(&frame))
        .map(|p| p.action_state)
        .unwrap_or(action::WAIT)
}

fn pre_pos_at(replay: &Replay, slot: PlayerSlot, frame: i32) -> (f32, f32) {
    replay
        .frames
        .get(&slot)
        .and_then(|pf| pf.pre.get(&frame))
        .map(|p| (p.pos_x, p.pos_y))
        .unwrap_or((0.0, 0.0))
}

fn compute_airtime(replay: &Replay, slot: PlayerSlot) -> u32 {
    replay
        .frames
        .get(&slot)
        .map(|pf| pf.post.values().filter(|f| f.airborne.unwrap_or(false)).count() as u32)
        .unwrap_or(0)
}

fn count_l_cancels(replay: &Replay, slot: PlayerSlot) -> (u32, u32) {
    let mut hit = 0;
    let mut missed = 0;
    if let Some(pf) = replay.frames.get(&slot) {
        for post in pf.post.values() {
            match post.l_cancel {
                Some(1) => hit += 1,
                Some(2) => missed += 1,
                _ => {}
            }
        }
    }
    (hit, missed)
}

/// Counts entries into a tech state (successful: any tech id; missed: landed
/// in `DamageFall`/tumble directly following a hitstun frame with no tech input).
fn count_techs(replay: &Replay, slot: PlayerSlot) -> (u32, u32) {
    let mut techs = 0;
    let mut missed = 0;
    let mut was_teching = false;
    let mut was_tumbling = false;
    if let Some(pf) = replay.frames.get(&slot) {
        for post in pf.post.values() {
            let teching = action_state::in_tech_state(post.action_state);
            let tumbling = action_state::in_tumble(post.action_state);
            if teching && !was_teching {
                techs += 1;
            }
            if was_tumbling && !tumbling && !teching && post.action_state == action::DOWN_BOUND_U {
                missed += 1;
            }
            was_teching = teching;
            was_tumbling = tumbling;
        }
    }
    (techs, missed)
}

fn count_ledge_grabs(replay: &Replay, slot: PlayerSlot) -> u32 {
    let mut grabs = 0;
    let mut was_on_ledge = false;
    if let Some(pf) = replay.frames.get(&slot) {
        for post in pf.post.values() {
            let on_ledge = post.action_state == action::CLIFF_CATCH;
            if on_ledge && !was_on_ledge {
                grabs += 1;
            }
            was_on_ledge = on_ledge;
        }
    }
    grabs
}

fn count_dodges(replay: &Replay, slot: PlayerSlot) -> (u32, u32, u32) {
    let (mut spotdodges, mut rolls, mut airdodges) = (0, 0, 0);
    let mut prev = action::WAIT;
    if let Some(pf) = replay.frames.get(&slot) {
        for pre in pf.pre.values() {
            let a = pre.action_state;
            if a != prev {
                if action_state::is_spotdodging(a) {
                    spotdodges += 1;
                } else if action_state::is_rolling(a) {
                    rolls += 1;
                } else if action_state::is_airdodging(a) {
                    airdodges += 1;
                }
            }
            prev = a;
        }
    }
    (spotdodges, rolls, airdodges)
}

fn count_dashdances(replay: &Replay, slot: PlayerSlot) -> u32 {
    let mut count = 0;
    let mut history = [action::WAIT; 3];
    if let Some(pf) = replay.frames.get(&slot) {
        for pre in pf.pre.values() {
            history[2] = history[1];
            history[1] = history[0];
            history[0] = pre.action_state;
            if action_state::is_dashdancing(history[0], history[1], history[2]) {
                count += 1;
            }
        }
    }
    count
}

/// A waveland that lands within a couple frames of a jumpsquat is a wavedash;
/// anything else that still matches the landing-after-airdodge shape is a
/// waveland off a platform or ledge.
fn count_airdodges_and_wavelands(replay: &Replay, slot: PlayerSlot) -> (u32, u32) {
    let mut wavedashes = 0;
    let mut wavelands = 0;
    let mut prev = action::WAIT;
    let mut frames_since_jumpsquat: Option<u32> = None;
    if let Some(pf) = replay.frames.get(&slot) {
        for pre in pf.pre.values() {
            let a = pre.action_state;
            if action_state::is_in_jumpsquat(a) {
                frames_since_jumpsquat = Some(0);
            } else if let Some(n) = frames_since_jumpsquat {
                frames_since_jumpsquat = Some(n + 1);
            }
            if action_state::maybe_wavelanding(a, prev) {
                match frames_since_jumpsquat {
                    Some(n) if n <= 8 => wavedashes += 1,
                    _ => wavelands += 1,
                }
            }
            prev = a;
        }
    }
    (wavedashes, wavelands)
}

/// One side's worth of per-frame state threaded across [`analyze_interactions`]:
/// the frames each side last spent in hitstun and on solid ground, used to
/// derive the "being punished"/"being sharked"/"poked" booleans below.
#[derive(Default)]
struct TrackState {
    last_hitstun: i32,
    last_grounded: i32,
}

/// Runs the stateful interaction classifier described at the top of this
/// module: `dynamics[i]` is a pure function of `dynamics[i-1]` and both
/// players' frame `i` data, not of frame `i` alone. Priority order (offstage
/// hitstun, grabs, shieldstun, floor tech, trade) is checked before falling
/// through to a switch on the *previous* dynamic.
fn analyze_interactions(replay: &Replay, a: PlayerSlot, b: PlayerSlot, frames: &[i32]) -> Vec<Dynamic> {
    let mut out = Vec::with_capacity(frames.len());
    let mut cur = Dynamic::Positioning;
    let mut ta = TrackState { last_hitstun: frames.first().copied().unwrap_or(0) - POKE_THRES - 1, last_grounded: frames.first().copied().unwrap_or(0) };
    let mut tb = TrackState { last_hitstun: frames.first().copied().unwrap_or(0) - POKE_THRES - 1, last_grounded: frames.first().copied().unwrap_or(0) };

    for &f in frames {
        let (Some(pa), Some(pb)) = (post_at(replay, a, f), post_at(replay, b, f)) else {
            out.push(cur);
            continue;
        };
        let pre_a = pre_action_at(replay, a, f);
        let pre_b = pre_action_at(replay, b, f);

        let a_hitstun = action_state::is_in_hitstun(pa.flags_4());
        let b_hitstun = action_state::is_in_hitstun(pb.flags_4());
        let a_hit_this_frame = a_hitstun && pa.damage > prev_damage(replay, a, f);
        let b_hit_this_frame = b_hitstun && pb.damage > prev_damage(replay, b, f);
        if a_hitstun {
            ta.last_hitstun = f;
        }
        if b_hitstun {
            tb.last_hitstun = f;
        }

        let a_airborne = pa.airborne.unwrap_or(false);
        let b_airborne = pb.airborne.unwrap_or(false);
        if !a_airborne {
            ta.last_grounded = f;
        }
        if !b_airborne {
            tb.last_grounded = f;
        }

        let a_grabbed = action_state::is_grabbed(pre_a);
        let b_grabbed = action_state::is_grabbed(pre_b);
        let a_on_ledge = action_state::is_on_ledge(pre_a);
        let b_on_ledge = action_state::is_on_ledge(pre_b);
        let a_shielding = action_state::is_shielding(pa.flags_3());
        let b_shielding = action_state::is_shielding(pb.flags_3());
        let a_shieldstun = action_state::is_in_shieldstun(pre_a);
        let b_shieldstun = action_state::is_in_shieldstun(pre_b);
        let a_teching = action_state::in_floor_tech_state(pre_a);
        let b_teching = action_state::in_floor_tech_state(pre_b);
        let a_thrown = action_state::is_thrown(pre_a);
        let b_thrown = action_state::is_thrown(pre_b);
        let (ax, ay) = pre_pos_at(replay, a, f);
        let (bx, by) = pre_pos_at(replay, b, f);
        let a_hit_offstage = action_state::is_off_stage(ax, ay, a_airborne, replay.stage) && a_hitstun;
        let b_hit_offstage = action_state::is_off_stage(bx, by, b_airborne, replay.stage) && b_hitstun;
        let a_poked = f - ta.last_hitstun < POKE_THRES;
        let b_poked = f - tb.last_hitstun < POKE_THRES;

        let a_being_punished = a_airborne && ta.last_grounded < ta.last_hitstun;
        let b_being_punished = b_airborne && tb.last_grounded < tb.last_hitstun;
        let a_being_sharked = a_being_punished && f - ta.last_hitstun > SHARK_THRES;
        let b_being_sharked = b_being_punished && f - tb.last_hitstun > SHARK_THRES;

        let dx = (pa.pos_x - pb.pos_x).abs();
        let neut_dyn = if dx > FOOTSIE_RANGE { Dynamic::Positioning } else { Dynamic::Footsies };

        let a_dead = action_state::is_dead(pa.action_state, pa.flags_5());
        let b_dead = action_state::is_dead(pb.action_state, pb.flags_5());

        cur = if a_dead || b_dead {
            Dynamic::Positioning
        } else if b_hit_offstage {
            Dynamic::Edgeguarding
        } else if a_hit_offstage {
            Dynamic::Recovering
        } else if b_grabbed {
            if cur != Dynamic::Pressuring {
                if cur.zone() == Zone::Offensive { Dynamic::Techchasing } else { Dynamic::Pressuring }
            } else {
                cur
            }
        } else if a_grabbed {
            if cur != Dynamic::Pressured {
                if cur.zone() != Zone::Offensive { Dynamic::Escaping } else { Dynamic::Pressured }
            } else {
                cur
            }
        } else if b_shieldstun {
            Dynamic::Pressuring
        } else if a_shieldstun {
            Dynamic::Pressured
        } else if b_teching {
            Dynamic::Techchasing
        } else if a_teching {
            Dynamic::Escaping
        } else if a_hitstun && b_hitstun {
            Dynamic::Trading
        } else {
            match cur {
                Dynamic::Pressuring => {
                    if b_thrown {
                        Dynamic::Techchasing
                    } else if !b_shielding && !b_on_ledge && !b_airborne {
                        neut_dyn
                    } else {
                        cur
                    }
                }
                Dynamic::Pressured => {
                    if a_thrown {
                        Dynamic::Escaping
                    } else if !a_shielding && !a_on_ledge && !a_airborne {
                        neut_dyn
                    } else {
                        cur
                    }
                }
                Dynamic::Edgeguarding => {
                    if b_on_ledge || !b_airborne {
                        neut_dyn
                    } else {
                        cur
                    }
                }
                Dynamic::Recovering => {
                    if a_on_ledge || !a_airborne {
                        neut_dyn
                    } else {
                        cur
                    }
                }
                Dynamic::Techchasing => {
                    if !b_hitstun && !b_grabbed && !b_thrown && !b_teching && !b_shielding {
                        neut_dyn
                    } else {
                        cur
                    }
                }
                Dynamic::Escaping => {
                    if !a_hitstun && !a_grabbed && !a_thrown && !a_teching && !a_shielding {
                        neut_dyn
                    } else {
                        cur
                    }
                }
                Dynamic::Punishing => {
                    if b_being_sharked {
                        Dynamic::Sharking
                    } else if !b_airborne {
                        neut_dyn
                    } else {
                        cur
                    }
                }
                Dynamic::Punished => {
                    if a_being_sharked {
                        Dynamic::Grounding
                    } else if !a_airborne {
                        neut_dyn
                    } else {
                        cur
                    }
                }
                Dynamic::Sharking => {
                    if !b_airborne {
                        neut_dyn
                    } else {
                        cur
                    }
                }
                Dynamic::Grounding => {
                    if !a_airborne {
                        neut_dyn
                    } else {
                        cur
                    }
                }
                Dynamic::Poking => {
                    if b_poked && b_airborne && b_hit_this_frame {
                        Dynamic::Punishing
                    } else if a_poked && a_airborne && a_hit_this_frame {
                        Dynamic::Punished
                    } else if b_being_sharked {
                        Dynamic::Sharking
                    } else if a_being_sharked {
                        Dynamic::Grounding
                    } else if a_poked || b_poked {
                        Dynamic::Poking
                    } else {
                        neut_dyn
                    }
                }
                Dynamic::Positioning | Dynamic::Footsies | Dynamic::Trading => {
                    if b_being_sharked {
                        Dynamic::Sharking
                    } else if a_being_sharked {
                        Dynamic::Grounding
                    } else if a_poked || b_poked {
                        Dynamic::Poking
                    } else {
                        neut_dyn
                    }
                }
            }
        };
        out.push(cur);
    }
    out
}

fn prev_damage(replay: &Replay, slot: PlayerSlot, frame: i32) -> f32 {
    replay
        .frames
        .get(&slot)
        .and_then(|pf| pf.post.range(..frame).next_back())
        .map(|(_, p)| p.damage)
        .unwrap_or(0.0)
}

/// Per-frame win/loss/poke bookkeeping from `dynamics` (already computed from
/// `a`'s perspective). Tracks whether a neutral exchange that just ended was
/// a "poke" so a later escape/punish doesn't get double counted as both a
/// poke and a full neutral win.
struct MoveCounts {
    neutral_wins: u32,
    counters: u32,
    pokes: u32,
}

fn summarize_interactions(replay: &Replay, a: PlayerSlot, b: PlayerSlot, frames: &[i32], dynamics: &[Dynamic]) -> (MoveCounts, MoveCounts) {
    let mut a_stats = MoveCounts { neutral_wins: 0, counters: 0, pokes: 0 };
    let mut b_stats = MoveCounts { neutral_wins: 0, counters: 0, pokes: 0 };
    let mut lastpoke: i32 = 0;
    let mut last_dyn = dynamics.first().copied().unwrap_or(Dynamic::Positioning);

    for (i, &cur_dyn) in dynamics.iter().enumerate() {
        let f = frames[i];
        if cur_dyn == Dynamic::Poking {
            if last_dyn != Dynamic::Poking {
                let b_hitstun = post_at(replay, b, f).map(|p| action_state::is_in_hitstun(p.flags_4())).unwrap_or(false);
                let a_hitstun = post_at(replay, a, f).map(|p| action_state::is_in_hitstun(p.flags_4())).unwrap_or(false);
                if b_hitstun {
                    a_stats.pokes += 1;
                    lastpoke = 1;
                } else if a_hitstun {
                    b_stats.pokes += 1;
                    lastpoke = -1;
                }
            }
            last_dyn = cur_dyn;
            continue;
        }
        if cur_dyn.zone() == Zone::Offensive {
            match last_dyn.zone() {
                Zone::Defensive => a_stats.counters += 1,
                Zone::Neutral => {
                    if lastpoke == 1 && matches!(cur_dyn, Dynamic::Techchasing | Dynamic::Punishing) {
                        a_stats.pokes = a_stats.pokes.saturating_sub(1);
                    }
                    a_stats.neutral_wins += 1;
                }
                Zone::Offensive => {}
            }
        } else if last_dyn.zone() == Zone::Offensive {
            b_stats.counters += 1;
        } else if cur_dyn.zone() == Zone::Neutral && last_dyn.zone() == Zone::Defensive {
            if lastpoke == -1 && matches!(cur_dyn, Dynamic::Escaping | Dynamic::Punished) {
                b_stats.pokes = b_stats.pokes.saturating_sub(1);
            }
            b_stats.neutral_wins += 1;
        }
        lastpoke = 0;
        last_dyn = cur_dyn;
    }
    (a_stats, b_stats)
}

/// Tracks one side's in-progress punish while [`analyze_punishes`] walks the
/// shared frame timeline.
#[derive(Default)]
struct OpenPunish {
    punish: Punish,
    open: bool,
}

/// Builds both sides' punish lists in a single pass over the shared timeline:
/// a punish is "open" once a side takes a hit and closes the instant the
/// zone-level dynamic says that side is no longer on offense (or the replay
/// ends).
fn analyze_punishes(replay: &Replay, a: PlayerSlot, b: PlayerSlot, frames: &[i32], dynamics: &[Dynamic]) -> (Vec<Punish>, Vec<Punish>) {
    let mut a_punishes = Vec::new();
    let mut b_punishes = Vec::new();
    let mut a_open = OpenPunish::default();
    let mut b_open = OpenPunish::default();

    for (i, &f) in frames.iter().enumerate() {
        let cur_dyn = dynamics[i];
        let (Some(pa), Some(pb)) = (post_at(replay, a, f), post_at(replay, b, f)) else { continue };
        let prev_a_stocks = i.checked_sub(1).and_then(|j| post_at(replay, a, frames[j])).map(|p| p.stocks);
        let prev_b_stocks = i.checked_sub(1).and_then(|j| post_at(replay, b, frames[j])).map(|p| p.stocks);

        if let Some(prev) = prev_a_stocks {
            if pa.stocks < prev {
                let dir = action_state::death_direction(pa.action_state);
                if b_open.open {
                    b_open.punish.kill_dir = dir;
                } else if let Some(last) = b_punishes.last_mut() {
                    last.kill_dir = dir;
                }
            }
        }
        if let Some(prev) = prev_b_stocks {
            if pb.stocks < prev {
                let dir = action_state::death_direction(pb.action_state);
                if a_open.open {
                    a_open.punish.kill_dir = dir;
                } else if let Some(last) = a_punishes.last_mut() {
                    last.kill_dir = dir;
                }
            }
        }

        let is_last = i == frames.len() - 1;
        let a_punish_end = is_last || (cur_dyn != Dynamic::Poking && cur_dyn.zone() != Zone::Offensive);
        let b_punish_end = is_last || (cur_dyn != Dynamic::Poking && cur_dyn.zone() == Zone::Offensive);

        if a_punish_end && a_open.open {
            a_open.punish.end_frame = f;
            a_open.punish.end_pct = pb.damage;
            a_open.punish.last_move_id = pa.last_hit_id;
            a_punishes.push(std::mem::take(&mut a_open.punish));
            a_open.open = false;
        }
        if b_punish_end && b_open.open {
            b_open.punish.end_frame = f;
            b_open.punish.end_pct = pa.damage;
            b_open.punish.last_move_id = pb.last_hit_id;
            b_punishes.push(std::mem::take(&mut b_open.punish));
            b_open.open = false;
        }

        let b_took_damage = pb.damage > prev_damage(replay, b, f);
        if b_took_damage {
            if !a_open.open {
                a_open.punish = Punish {
                    start_frame: f,
                    start_pct: prev_damage(replay, b, f),
                    kill_dir: KillDir::Neut,
                    ..Default::default()
                };
                a_open.open = true;
            }
            a_open.punish.end_frame = f;
            a_open.punish.end_pct = pb.damage;
            a_open.punish.last_move_id = pa.last_hit_id;
            a_open.punish.num_moves += 1;
        }
        let a_took_damage = pa.damage > prev_damage(replay, a, f);
        if a_took_damage {
            if !b_open.open {
                b_open.punish = Punish {
                    start_frame: f,
                    start_pct: prev_damage(replay, a, f),
                    kill_dir: KillDir::Neut,
                    ..Default::default()
                };
                b_open.open = true;
            }
            b_open.punish.end_frame = f;
            b_open.punish.end_pct = pa.damage;
            b_open.punish.last_move_id = pb.last_hit_id;
            b_open.punish.num_moves += 1;
        }
    }
    (a_punishes, b_punishes)
}

/// Runs the full analysis pipeline over a decoded replay. Returns
/// `Analysis { success: false, .. }` rather than an error when there aren't
/// two active ports to compare -- analysis is a best-effort report, not a
/// validity check on the replay itself.
pub fn analyze(replay: &Replay) -> Analysis {
    let Some([a, b]) = get_1v1_ports(replay) else {
        return Analysis { success: false, ..Default::default() };
    };

    let mut frames: Vec<i32> = replay
        .frames
        .get(&a)
        .map(|pf| pf.post.keys().copied().collect())
        .unwrap_or_default();
    frames.sort_unstable();

    let dynamics_a = analyze_interactions(replay, a, b, &frames);
    let (stats_a, stats_b) = summarize_interactions(replay, a, b, &frames, &dynamics_a);
    let (punishes_a, punishes_b) = analyze_punishes(replay, a, b, &frames, &dynamics_a);

    let mut dyn_counts_a: BTreeMap<&'static str, u32> = BTreeMap::new();
    for d in &dynamics_a {
        *dyn_counts_a.entry(dyn_name(*d)).or_insert(0) += 1;
    }
    let mut dyn_counts_b: BTreeMap<&'static str, u32> = BTreeMap::new();
    for d in &dynamics_a {
        *dyn_counts_b.entry(dyn_name(d.mirror())).or_insert(0) += 1;
    }

    let build_player = |slot: PlayerSlot, stats: MoveCounts, dyn_counts: BTreeMap<&'static str, u32>, punishes: Vec<Punish>| -> AnalysisPlayer {
        let (l_hit, l_missed) = count_l_cancels(replay, slot);
        let (techs, missed_techs) = count_techs(replay, slot);
        let (spotdodges, rolls, airdodges) = count_dodges(replay, slot);
        let (wavedashes, wavelands) = count_airdodges_and_wavelands(replay, slot);
        let player = replay.players.iter().find(|p| p.slot() == slot);
        let last_post = replay.frames.get(&slot).and_then(|pf| pf.post.values().last());
        AnalysisPlayer {
            port: player.map(|p| p.port).unwrap_or(slot as u8),
            char_id: player.map(|p| p.ext_char_id).unwrap_or(0),
            end_stocks: last_post.map(|p| p.stocks).unwrap_or(0),
            end_pct: last_post.map(|p| p.damage).unwrap_or(0.0),
            air_frames: compute_airtime(replay, slot),
            dashdances: count_dashdances(replay, slot),
            spotdodges,
            rolls,
            airdodges,
            wavedashes,
            wavelands,
            l_cancels_hit: l_hit,
            l_cancels_missed: l_missed,
            techs,
            missed_techs,
            walltechs: 0,
            walljumps: 0,
            ledge_grabs: count_ledge_grabs(replay, slot),
            neutral_wins: stats.neutral_wins,
            counters: stats.counters,
            pokes: stats.pokes,
            dyn_counts,
            punishes,
        }
    };

    let ap_a = build_player(a, stats_a, dyn_counts_a, punishes_a);
    let ap_b = build_player(b, stats_b, dyn_counts_b, punishes_b);

    let winner_port = match (ap_a.end_stocks, ap_b.end_stocks) {
        (sa, sb) if sa > sb => Some(ap_a.port),
        (sa, sb) if sb > sa => Some(ap_b.port),
        _ => None,
    };

    Analysis {
        success: true,
        game_time_seconds: frames.len() as u32 / 60,
        stage: replay.stage,
        winner_port,
        total_frames: frames.len() as u32,
        dynamics: dynamics_a.iter().map(|d| dyn_name(*d)).collect(),
        ap: [ap_a, ap_b],
    }
}

/// Serializes an [`Analysis`] the way the CLI's `-a` flag writes it out.
pub fn analysis_json(analysis: &Analysis) -> serde_json::Value {
    serde_json::to_value(analysis).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_mirror_is_involutive() {
        for d in [
            Dynamic::Positioning,
            Dynamic::Footsies,
            Dynamic::Trading,
            Dynamic::Poking,
            Dynamic::Recovering,
            Dynamic::Escaping,
            Dynamic::Pressured,
            Dynamic::Punished,
            Dynamic::Grounding,
            Dynamic::Edgeguarding,
            Dynamic::Techchasing,
            Dynamic::Pressuring,
            Dynamic::Punishing,
            Dynamic::Sharking,
        ] {
            assert_eq!(d.mirror().mirror(), d);
        }
    }

    #[test]
    fn neutral_dynamics_mirror_to_themselves() {
        assert_eq!(Dynamic::Footsies.mirror(), Dynamic::Footsies);
    }

    #[test]
    fn defensive_and_offensive_dynamics_mirror_across_zones() {
        assert_eq!(Dynamic::Recovering.zone(), Zone::Defensive);
        assert_eq!(Dynamic::Recovering.mirror().zone(), Zone::Offensive);
    }

    #[test]
    fn empty_replay_reports_unsuccessful_analysis() {
        let replay = Replay::default();
        let analysis = analyze(&replay);
        assert!(!analysis.success);
    }

    fn post(frame: i32, pos_x: f32, damage: f32, airborne: bool, in_hitstun: bool) -> PostFrame {
        PostFrame {
            frame,
            action_state: 0x0040,
            pos_x,
            damage,
            airborne: Some(airborne),
            state_bits: Some([0, 0, 0, if in_hitstun { 0x02 } else { 0 }, 0]),
            stocks: 4,
            ..Default::default()
        }
    }

    /// A second consecutive hit on an opponent already sitting in hitstun
    /// should escalate the dynamic from a single poke into an active punish,
    /// matching the priority-ordered state machine's `Poking -> Punishing` edge.
    #[test]
    fn a_second_hit_escalates_poking_into_punishing() {
        let mut replay = Replay { stage: 32, ..Default::default() };
        let mut a_frames = crate::replay::PlayerFrames::default();
        a_frames.post.insert(0, post(0, -5.0, 0.0, false, false));
        a_frames.post.insert(1, post(1, -5.0, 0.0, false, false));
        a_frames.post.insert(2, post(2, -5.0, 0.0, false, false));
        let mut b_frames = crate::replay::PlayerFrames::default();
        b_frames.post.insert(0, post(0, 5.0, 0.0, true, false));
        b_frames.post.insert(1, post(1, 5.0, 10.0, true, true));
        b_frames.post.insert(2, post(2, 5.0, 25.0, true, true));
        replay.frames.insert(0, a_frames);
        replay.frames.insert(1, b_frames);

        let dynamics = analyze_interactions(&replay, 0, 1, &[0, 1, 2]);
        assert_eq!(dynamics, vec![Dynamic::Footsies, Dynamic::Poking, Dynamic::Punishing]);
    }
}
