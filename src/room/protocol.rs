//! Room Messages
//!
//! Inbound client commands and outbound notifications. These are the
//! room's wire-facing surface; how bytes travel is the transport's
//! concern, this module only fixes the shapes.
//!
//! All messages serialize as tagged JSON objects.

use serde::{Deserialize, Serialize};

use crate::game::board::BoardSettings;
use crate::room::core::{ActionError, ParticipantId};

// =============================================================================
// CLIENT -> ROOM COMMANDS
// =============================================================================

/// Movement intent: a direction, an absolute target, or both cleared.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct MoveCommand {
    /// Direction vector; magnitude is ignored, only the heading is used.
    pub direction: Option<[f32; 2]>,
    /// Absolute target point. Board mode reads this as a cell coordinate.
    pub target: Option<[f32; 2]>,
    /// Facing angle in radians.
    pub heading: Option<f32>,
}

/// Commands sent from a client to its room.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Movement intent (continuous modes) or mark placement (board mode).
    Move(MoveCommand),

    /// Fire a projectile along a heading.
    Fire {
        /// Firing angle in radians.
        heading: f32,
    },

    /// Cancel any buffered movement intent.
    StopMove,

    /// Toggle the readiness gate.
    ToggleReady {
        /// New ready flag.
        ready: bool,
    },

    /// Owner-only: start the match.
    StartMatch,

    /// Owner-only: remove a participant.
    KickPlayer {
        /// Participant to remove.
        target_id: ParticipantId,
    },

    /// Owner-only: update the join gate. Empty string unlocks.
    ChangePassword {
        /// New password.
        new_password: String,
    },

    /// Vote to restart a finished match.
    Rematch,

    /// Owner-only, board mode: change board dimensions / run length.
    UpdateSettings {
        /// Requested settings.
        settings: BoardSettings,
    },
}

// =============================================================================
// ROOM -> CLIENT NOTIFICATIONS
// =============================================================================

/// Why a participant was forcibly disconnected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KickReason {
    /// The room owner removed this participant.
    RemovedByOwner,
}

impl KickReason {
    /// Close code the transport uses when disconnecting the target.
    /// `4001` is reserved for "removed by owner".
    pub fn close_code(self) -> u16 {
        match self {
            KickReason::RemovedByOwner => 4001,
        }
    }
}

/// One row of a final leaderboard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    /// Participant id.
    pub id: ParticipantId,
    /// Display name at match end.
    pub name: String,
    /// Final score.
    pub score: u32,
    /// Kills this match.
    pub kills: u32,
    /// Deaths this match.
    pub deaths: u32,
}

/// Notifications pushed from a room to its clients.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A turn-based match started.
    StartGame {
        /// Participant holding the first turn.
        starting_participant: Option<ParticipantId>,
    },

    /// A turn-based match ended. `None` winner means a draw.
    GameOver {
        /// Winner id, or `None` on a draw.
        winner: Option<ParticipantId>,
    },

    /// The active turn moved.
    TurnChanged {
        /// New turn holder.
        current_turn: ParticipantId,
    },

    /// A continuous match started.
    MatchStarted {
        /// Match duration in seconds.
        match_duration: u32,
        /// Score needed to win immediately.
        score_limit: u32,
    },

    /// A continuous match ended with a leaderboard.
    MatchEnded {
        /// Winner id, or `None` on a draw.
        winner: Option<ParticipantId>,
        /// Winner display name.
        winner_name: Option<String>,
        /// Winner's final score.
        winner_score: u32,
        /// Full leaderboard in join order.
        final_scores: Vec<ScoreEntry>,
    },

    /// A participant was killed.
    PlayerKilled {
        /// Victim id.
        victim: ParticipantId,
        /// Killer id, if the death had one.
        killer: Option<ParticipantId>,
        /// Victim display name.
        victim_name: String,
        /// Killer display name.
        killer_name: Option<String>,
    },

    /// A defeated participant re-entered play.
    PlayerRespawned {
        /// Respawned participant.
        player_id: ParticipantId,
        /// Display name.
        player_name: String,
    },

    /// Board settings were changed by the owner.
    SettingsUpdated {
        /// New settings.
        settings: BoardSettings,
        /// Who changed them.
        updated_by: ParticipantId,
    },

    /// A settings update was rejected with per-field messages.
    SettingsError {
        /// Validation messages.
        errors: Vec<String>,
    },

    /// The recipient was removed from the room.
    Kicked {
        /// Why.
        reason: KickReason,
        /// Human-readable message.
        message: String,
    },

    /// The join gate changed.
    PasswordChanged {
        /// Whether a password now gates joins.
        is_locked: bool,
    },

    /// A command was rejected. Sent only to the caller.
    Rejected {
        /// Rejection category and detail.
        reason: ActionError,
    },

    /// The room is shutting down and will accept no further commands.
    Shutdown {
        /// Human-readable reason.
        reason: String,
    },
}

/// Delivery scope for an outbound notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    /// Every connected participant.
    All,
    /// A single participant.
    One(ParticipantId),
}

/// A notification paired with its delivery scope. The transport routes
/// these to subscribers; the room never touches sockets.
#[derive(Clone, Debug)]
pub struct Outbound {
    /// Delivery scope.
    pub target: Target,
    /// The notification.
    pub notification: Notification,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_json_shape() {
        let cmd = ClientCommand::ToggleReady { ready: true };
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(json, r#"{"type":"toggle_ready","ready":true}"#);

        let back: ClientCommand = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, ClientCommand::ToggleReady { ready: true }));
    }

    #[test]
    fn test_move_command_partial_fields() {
        let json = r#"{"type":"move","direction":[1.0,0.0],"target":null,"heading":null}"#;
        let cmd: ClientCommand = serde_json::from_str(json).unwrap();
        match cmd {
            ClientCommand::Move(mv) => {
                assert_eq!(mv.direction, Some([1.0, 0.0]));
                assert_eq!(mv.target, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_notification_tags() {
        let note = Notification::PasswordChanged { is_locked: true };
        let json = serde_json::to_string(&note).unwrap();
        assert!(json.contains(r#""type":"password_changed""#));

        let note = Notification::Rejected {
            reason: ActionError::InvalidPhase,
        };
        let json = serde_json::to_string(&note).unwrap();
        assert!(json.contains(r#""type":"rejected""#));
        assert!(json.contains("invalid_phase"));
    }

    #[test]
    fn test_kick_close_code_reserved() {
        assert_eq!(KickReason::RemovedByOwner.close_code(), 4001);
    }
}
