//! Room Lifecycle
//!
//! The session state machine shared by every game mode: join/leave,
//! ownership, readiness, start gating, kicks, the password gate and
//! rematch voting. Mode-specific behavior hangs off the hook points in
//! [`crate::room::driver::GameMode`]; this module owns only the generic
//! transitions `Waiting -> Playing -> Finished -> Playing`.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::core::ordered::OrderedMap;

/// Unique participant identifier (stable for the session's lifetime).
///
/// Wraps a UUID; implements `Ord` so ordered containers iterate
/// deterministically.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ParticipantId(pub Uuid);

impl ParticipantId {
    /// Generate a fresh random id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a UUID string.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl fmt::Debug for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable
        let s = self.0.simple().to_string();
        write!(f, "{}", &s[..8])
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Room lifecycle phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for participants to ready up.
    #[default]
    Waiting,
    /// Match in progress.
    Playing,
    /// Match ended, rematch votes accepted.
    Finished,
}

/// How a finished match ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    /// A single participant won.
    Winner {
        /// The winner's id.
        id: ParticipantId,
    },
    /// No single winner.
    Draw,
}

impl Outcome {
    /// Winner id, if any.
    pub fn winner_id(&self) -> Option<ParticipantId> {
        match self {
            Outcome::Winner { id } => Some(*id),
            Outcome::Draw => None,
        }
    }
}

/// A connected identity inside a room.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Participant {
    /// Unique id.
    pub id: ParticipantId,
    /// Display name.
    pub name: String,
    /// Avatar identifier.
    pub avatar: String,
    /// Exactly one connected participant holds this while the room is
    /// non-empty.
    pub is_owner: bool,
    /// Readiness gate for starting a match.
    pub is_ready: bool,
}

/// Why a room action was rejected.
///
/// Every rejected command is answered with an explicit
/// [`crate::room::protocol::Notification::Rejected`] carrying one of
/// these; no category is fatal to the room.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ActionError {
    /// Action attempted outside its allowed phase.
    #[error("action not allowed in the current phase")]
    InvalidPhase,

    /// Caller lacks the privilege for this action (owner-only, or not the
    /// turn holder).
    #[error("caller is not permitted to perform this action")]
    Unauthorized,

    /// Malformed or out-of-range payload.
    #[error("invalid payload: {0}")]
    Validation(String),

    /// Room is full, or a start was requested below the minimum
    /// participant count.
    #[error("room capacity constraint violated")]
    Capacity,
}

/// Room creation options.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Display name advertised to the lobby directory.
    pub name: String,
    /// Join gate; `None` means the room is open.
    pub password: Option<String>,
    /// Minimum participants required to start a match.
    pub min_participants: usize,
    /// Maximum participants admitted.
    pub max_participants: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            name: "room".to_string(),
            password: None,
            min_participants: 2,
            max_participants: 8,
        }
    }
}

/// Join request payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JoinOptions {
    /// Session identifier of the joiner.
    pub id: ParticipantId,
    /// Display name.
    pub name: String,
    /// Avatar identifier.
    pub avatar: String,
    /// Password attempt, if the room is locked.
    pub password: Option<String>,
}

/// Result of a leave, for the caller to cascade cleanup.
#[derive(Clone, Copy, Debug)]
pub struct LeaveOutcome {
    /// The departed participant owned the room.
    pub was_owner: bool,
    /// New owner after deterministic reassignment (first remaining
    /// participant in join order), if any participant remains.
    pub new_owner: Option<ParticipantId>,
    /// The departure completed the rematch consensus: everyone still in
    /// the room had voted, so the room has transitioned back into
    /// `Playing`. The caller must run its match-start path.
    pub rematch_started: bool,
}

/// Generic lifecycle state for one room.
pub struct RoomCore {
    config: RoomConfig,
    participants: OrderedMap<ParticipantId, Participant>,
    phase: Phase,
    outcome: Option<Outcome>,
    rematch_votes: BTreeSet<ParticipantId>,
}

impl RoomCore {
    /// Create a new room in the waiting phase.
    pub fn new(config: RoomConfig) -> Self {
        Self {
            config,
            participants: OrderedMap::new(),
            phase: Phase::Waiting,
            outcome: None,
            rematch_votes: BTreeSet::new(),
        }
    }

    /// Admit a participant. The first joiner becomes owner. Any join
    /// invalidates the readiness consensus, so every ready flag is reset.
    pub fn join(&mut self, opts: JoinOptions) -> Result<(), ActionError> {
        if self.participants.contains_key(&opts.id) {
            return Err(ActionError::Validation("already in room".into()));
        }
        if self.participants.len() >= self.config.max_participants {
            return Err(ActionError::Capacity);
        }
        if let Some(expected) = &self.config.password {
            if opts.password.as_deref() != Some(expected.as_str()) {
                return Err(ActionError::Validation("incorrect password".into()));
            }
        }

        let is_owner = self.participants.is_empty();
        self.participants.insert(
            opts.id,
            Participant {
                id: opts.id,
                name: opts.name,
                avatar: opts.avatar,
                is_owner,
                is_ready: false,
            },
        );
        self.clear_ready_flags();

        info!(room = %self.config.name, participant = ?opts.id, owner = is_owner, "participant joined");
        Ok(())
    }

    /// Remove a participant, reassigning ownership deterministically and
    /// purging their rematch vote. A departure can complete the rematch
    /// consensus: if everyone remaining has voted, the room transitions
    /// back into `Playing` here. Returns `None` for an unknown id.
    pub fn leave(&mut self, id: ParticipantId) -> Option<LeaveOutcome> {
        let removed = self.participants.remove(&id)?;
        self.rematch_votes.remove(&id);

        let mut new_owner = None;
        if removed.is_owner {
            if let Some((&first, _)) = self.participants.first() {
                if let Some(p) = self.participants.get_mut(&first) {
                    p.is_owner = true;
                }
                new_owner = Some(first);
            }
        }

        let rematch_started = self.phase == Phase::Finished
            && !self.participants.is_empty()
            && self.rematch_votes.len() == self.participants.len();
        if rematch_started {
            self.begin_match();
        }

        info!(room = %self.config.name, participant = ?id, ?new_owner, rematch_started, "participant left");
        Some(LeaveOutcome {
            was_owner: removed.is_owner,
            new_owner,
            rematch_started,
        })
    }

    /// Set a participant's ready flag. Not accepted mid-match.
    pub fn set_ready(&mut self, id: ParticipantId, ready: bool) -> Result<(), ActionError> {
        if self.phase == Phase::Playing {
            return Err(ActionError::InvalidPhase);
        }
        let participant = self
            .participants
            .get_mut(&id)
            .ok_or_else(|| ActionError::Validation("unknown participant".into()))?;
        participant.is_ready = ready;
        Ok(())
    }

    /// Owner-only match start. Requires the minimum participant count and
    /// unanimous readiness, then transitions into `Playing`.
    pub fn request_start(&mut self, id: ParticipantId) -> Result<(), ActionError> {
        if !self.is_owner(id) {
            return Err(ActionError::Unauthorized);
        }
        if self.phase == Phase::Playing {
            return Err(ActionError::InvalidPhase);
        }
        if self.participants.len() < self.config.min_participants {
            return Err(ActionError::Capacity);
        }
        if !self.participants.values().all(|p| p.is_ready) {
            return Err(ActionError::Validation(
                "not all participants are ready".into(),
            ));
        }
        self.begin_match();
        Ok(())
    }

    /// Validate a kick without performing it; the driver disconnects the
    /// target and runs the leave cascade on success.
    pub fn check_kick(
        &self,
        owner: ParticipantId,
        target: ParticipantId,
    ) -> Result<(), ActionError> {
        if !self.is_owner(owner) {
            return Err(ActionError::Unauthorized);
        }
        if owner == target {
            return Err(ActionError::Validation("cannot kick yourself".into()));
        }
        if !self.participants.contains_key(&target) {
            return Err(ActionError::Validation("unknown participant".into()));
        }
        Ok(())
    }

    /// Owner-only password change. An empty string unlocks the room.
    /// Returns the new lock flag.
    pub fn change_password(
        &mut self,
        owner: ParticipantId,
        new_password: String,
    ) -> Result<bool, ActionError> {
        if !self.is_owner(owner) {
            return Err(ActionError::Unauthorized);
        }
        self.config.password = if new_password.is_empty() {
            None
        } else {
            Some(new_password)
        };
        Ok(self.is_locked())
    }

    /// Register a rematch vote; valid only once the match has finished.
    /// Returns `true` when every current participant has voted, in which
    /// case the room has already transitioned back into `Playing`.
    pub fn vote_rematch(&mut self, id: ParticipantId) -> Result<bool, ActionError> {
        if self.phase != Phase::Finished {
            return Err(ActionError::InvalidPhase);
        }
        if !self.participants.contains_key(&id) {
            return Err(ActionError::Validation("unknown participant".into()));
        }
        self.rematch_votes.insert(id);
        if self.rematch_votes.len() == self.participants.len() {
            self.begin_match();
            return Ok(true);
        }
        Ok(false)
    }

    /// Finish the current match with an outcome.
    pub fn finish(&mut self, outcome: Outcome) {
        self.phase = Phase::Finished;
        self.outcome = Some(outcome);
        info!(room = %self.config.name, ?outcome, "match finished");
    }

    /// Transition into `Playing`: clear the previous outcome, all rematch
    /// votes and every ready flag.
    fn begin_match(&mut self) {
        self.phase = Phase::Playing;
        self.outcome = None;
        self.rematch_votes.clear();
        self.clear_ready_flags();
        info!(room = %self.config.name, "match starting");
    }

    fn clear_ready_flags(&mut self) {
        for p in self.participants.values_mut() {
            p.is_ready = false;
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Outcome of the last finished match.
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Current owner, if the room is non-empty.
    pub fn owner_id(&self) -> Option<ParticipantId> {
        self.participants
            .values()
            .find(|p| p.is_owner)
            .map(|p| p.id)
    }

    /// True if `id` is the current owner.
    pub fn is_owner(&self, id: ParticipantId) -> bool {
        self.participants.get(&id).is_some_and(|p| p.is_owner)
    }

    /// Roster in join order.
    pub fn participants(&self) -> &OrderedMap<ParticipantId, Participant> {
        &self.participants
    }

    /// Look up a participant.
    pub fn get(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    /// Display name for a participant, if present.
    pub fn name_of(&self, id: ParticipantId) -> Option<String> {
        self.participants.get(&id).map(|p| p.name.clone())
    }

    /// Participant count.
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// True when no participants remain.
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Rematch votes cast so far.
    pub fn rematch_vote_count(&self) -> usize {
        self.rematch_votes.len()
    }

    /// Room configuration.
    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// True when a password gates joins.
    pub fn is_locked(&self) -> bool {
        self.config.password.is_some()
    }
}
