//! Replicated State Surface
//!
//! The snapshot types published to the replication layer. The room
//! declares *what* is replicated and *when* by writing a fresh snapshot
//! at the replication cadence; diffing and delivery are the transport's
//! job.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::room::core::{Outcome, Participant, ParticipantId, Phase, RoomCore};

/// Replicated view of one participant's generic fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParticipantView {
    /// Participant id.
    pub id: ParticipantId,
    /// Display name.
    pub name: String,
    /// Avatar identifier.
    pub avatar: String,
    /// Owner flag.
    pub is_owner: bool,
    /// Ready flag.
    pub is_ready: bool,
}

impl From<&Participant> for ParticipantView {
    fn from(p: &Participant) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            avatar: p.avatar.clone(),
            is_owner: p.is_owner,
            is_ready: p.is_ready,
        }
    }
}

/// Replicated board-mode fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BoardView {
    /// Turn holder, empty outside a match.
    pub current_turn: Option<ParticipantId>,
    /// Board width in cells.
    pub cols: u16,
    /// Board height in cells.
    pub rows: u16,
    /// Contiguous run required to win.
    pub run_length: u16,
    /// Row-major cell contents.
    pub cells: Vec<Option<ParticipantId>>,
    /// Slot symbol per participant.
    pub symbols: BTreeMap<ParticipantId, char>,
}

/// Replicated view of one arena participant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArenaPlayerView {
    /// Participant id.
    pub id: ParticipantId,
    /// Position.
    pub position: [f32; 2],
    /// Velocity.
    pub velocity: [f32; 2],
    /// Facing angle in radians.
    pub heading: f32,
    /// Current health.
    pub health: u32,
    /// Score this match.
    pub score: u32,
    /// Kills this match.
    pub kills: u32,
    /// Deaths this match.
    pub deaths: u32,
    /// Alive flag.
    pub alive: bool,
    /// Joined mid-match; not participating until the next start.
    pub spectator: bool,
}

/// Replicated view of one projectile.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectileView {
    /// Projectile id.
    pub id: u32,
    /// Position.
    pub position: [f32; 2],
    /// Velocity.
    pub velocity: [f32; 2],
    /// Heading in radians.
    pub heading: f32,
    /// Owning participant.
    pub owner: ParticipantId,
}

/// Replicated arena-mode fields and tunables.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArenaView {
    /// Whole seconds remaining, published at a throttled cadence.
    pub match_timer: u32,
    /// Score needed to win immediately.
    pub score_limit: u32,
    /// Arena width.
    pub arena_width: f32,
    /// Arena height.
    pub arena_height: f32,
    /// Movement speed (units/second).
    pub move_speed: f32,
    /// Projectile speed (units/second).
    pub projectile_speed: f32,
    /// Fire cooldown in seconds.
    pub fire_cooldown: f32,
    /// Respawn delay in seconds.
    pub respawn_delay: f32,
    /// Per-participant simulation state.
    pub players: Vec<ArenaPlayerView>,
    /// Live projectiles.
    pub projectiles: Vec<ProjectileView>,
}

/// Mode-specific replicated fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ModeSnapshot {
    /// Turn-based board game.
    Board(BoardView),
    /// Continuous arena game.
    Arena(ArenaView),
}

/// Complete replicated state of one room.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoomSnapshot {
    /// Room display name.
    pub room_name: String,
    /// Lifecycle phase.
    pub phase: Phase,
    /// Outcome of the last finished match.
    pub winner: Option<Outcome>,
    /// Current owner.
    pub room_owner: Option<ParticipantId>,
    /// Whether a password gates joins.
    pub is_locked: bool,
    /// Maximum participants admitted.
    pub max_participants: usize,
    /// Roster in join order.
    pub participants: Vec<ParticipantView>,
    /// Mode-specific fields.
    pub mode: ModeSnapshot,
}

impl RoomSnapshot {
    /// Assemble a snapshot from the lifecycle core and a mode view.
    pub fn assemble(core: &RoomCore, mode: ModeSnapshot) -> Self {
        Self {
            room_name: core.config().name.clone(),
            phase: core.phase(),
            winner: core.outcome(),
            room_owner: core.owner_id(),
            is_locked: core.is_locked(),
            max_participants: core.config().max_participants,
            participants: core.participants().values().map(ParticipantView::from).collect(),
            mode,
        }
    }
}
