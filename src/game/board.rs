//! Board Mode
//!
//! Turn-based N-in-a-row on a configurable grid. One placement per turn,
//! validated against the cyclic turn order; the first contiguous run of
//! the configured length wins, a full board with no run is a draw.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::room::core::{ActionError, Outcome, ParticipantId, Phase, RoomCore};
use crate::room::driver::{GameMode, Outbox};
use crate::room::protocol::{ClientCommand, Notification};
use crate::room::snapshot::{BoardView, ModeSnapshot};
use crate::room::turn::TurnOrder;

/// Slot symbols assigned by join order at match start.
const SYMBOLS: [char; 8] = ['X', 'O', '#', '@', '%', '&', '*', '+'];

const MIN_DIM: u16 = 5;
const MAX_DIM: u16 = 25;
const MIN_RUN: u16 = 3;
const MAX_RUN: u16 = 10;

/// Board dimensions and win condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSettings {
    /// Board width in cells.
    pub cols: u16,
    /// Board height in cells.
    pub rows: u16,
    /// Contiguous run required to win.
    pub run_length: u16,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            cols: 15,
            rows: 15,
            run_length: 5,
        }
    }
}

impl BoardSettings {
    /// Validate ranges and cross-field constraints. Returns one message
    /// per violation; empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !(MIN_DIM..=MAX_DIM).contains(&self.cols) {
            errors.push(format!("cols must be between {MIN_DIM} and {MAX_DIM}"));
        }
        if !(MIN_DIM..=MAX_DIM).contains(&self.rows) {
            errors.push(format!("rows must be between {MIN_DIM} and {MAX_DIM}"));
        }
        if !(MIN_RUN..=MAX_RUN).contains(&self.run_length) {
            errors.push(format!(
                "run length must be between {MIN_RUN} and {MAX_RUN}"
            ));
        }
        if self.run_length > self.cols.min(self.rows) {
            errors.push("run length cannot exceed the smaller board dimension".into());
        }
        errors
    }
}

/// The grid itself.
#[derive(Clone, Debug)]
pub struct Board {
    settings: BoardSettings,
    cells: Vec<Option<ParticipantId>>,
}

impl Board {
    /// Create an empty board.
    pub fn new(settings: BoardSettings) -> Self {
        Self {
            settings,
            cells: vec![None; settings.cols as usize * settings.rows as usize],
        }
    }

    /// Current settings.
    pub fn settings(&self) -> BoardSettings {
        self.settings
    }

    /// Row-major cell contents.
    pub fn cells(&self) -> &[Option<ParticipantId>] {
        &self.cells
    }

    /// Clear every cell.
    pub fn clear(&mut self) {
        self.cells.fill(None);
    }

    /// Apply new settings; a dimension change discards all marks.
    pub fn apply_settings(&mut self, settings: BoardSettings) {
        let resized =
            settings.cols != self.settings.cols || settings.rows != self.settings.rows;
        self.settings = settings;
        if resized {
            self.cells = vec![None; settings.cols as usize * settings.rows as usize];
        }
    }

    fn index(&self, col: u16, row: u16) -> usize {
        row as usize * self.settings.cols as usize + col as usize
    }

    /// Cell contents at a coordinate.
    pub fn at(&self, col: u16, row: u16) -> Option<ParticipantId> {
        self.cells[self.index(col, row)]
    }

    /// Place a mark. Rejects out-of-bounds and occupied cells.
    pub fn place(
        &mut self,
        col: u16,
        row: u16,
        id: ParticipantId,
    ) -> Result<(), ActionError> {
        if col >= self.settings.cols || row >= self.settings.rows {
            return Err(ActionError::Validation("cell out of bounds".into()));
        }
        let idx = self.index(col, row);
        if self.cells[idx].is_some() {
            return Err(ActionError::Validation("cell already occupied".into()));
        }
        self.cells[idx] = Some(id);
        Ok(())
    }

    /// True if the mark at `(col, row)` completes a winning run. Scans the
    /// four line directions outward from the placed cell.
    pub fn wins_at(&self, col: u16, row: u16, id: ParticipantId) -> bool {
        const DIRECTIONS: [(i32, i32); 4] = [(1, 0), (0, 1), (1, 1), (1, -1)];
        DIRECTIONS.iter().any(|&(dc, dr)| {
            let run = 1 + self.count_run(col, row, id, dc, dr)
                + self.count_run(col, row, id, -dc, -dr);
            run >= self.settings.run_length as u32
        })
    }

    fn count_run(&self, col: u16, row: u16, id: ParticipantId, dc: i32, dr: i32) -> u32 {
        let mut count = 0;
        let mut c = col as i32 + dc;
        let mut r = row as i32 + dr;
        while c >= 0
            && r >= 0
            && c < self.settings.cols as i32
            && r < self.settings.rows as i32
            && self.at(c as u16, r as u16) == Some(id)
        {
            count += 1;
            c += dc;
            r += dr;
        }
        count
    }

    /// True when no empty cell remains.
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|c| c.is_some())
    }
}

/// Turn-based board game mode.
pub struct BoardGame {
    board: Board,
    turn: TurnOrder,
    symbols: BTreeMap<ParticipantId, char>,
}

impl BoardGame {
    /// Create the mode with the given settings.
    pub fn new(settings: BoardSettings) -> Self {
        Self {
            board: Board::new(settings),
            turn: TurnOrder::new(),
            symbols: BTreeMap::new(),
        }
    }

    /// Board access for inspection.
    pub fn board(&self) -> &Board {
        &self.board
    }

    fn handle_move(
        &mut self,
        core: &mut RoomCore,
        from: ParticipantId,
        target: Option<[f32; 2]>,
        out: &mut Outbox,
    ) -> Result<(), ActionError> {
        if core.phase() != Phase::Playing {
            return Err(ActionError::InvalidPhase);
        }
        if self.turn.current() != Some(from) {
            return Err(ActionError::Unauthorized);
        }

        let [x, y] = target.ok_or_else(|| ActionError::Validation("missing target cell".into()))?;
        if !x.is_finite() || !y.is_finite() || x.fract() != 0.0 || y.fract() != 0.0 || x < 0.0 || y < 0.0
        {
            return Err(ActionError::Validation("target is not a cell coordinate".into()));
        }
        let (col, row) = (x as u16, y as u16);
        self.board.place(col, row, from)?;

        if self.board.wins_at(col, row, from) {
            info!(winner = ?from, "winning run placed");
            core.finish(Outcome::Winner { id: from });
            self.turn.clear();
            out.broadcast(Notification::GameOver { winner: Some(from) });
        } else if self.board.is_full() {
            core.finish(Outcome::Draw);
            self.turn.clear();
            out.broadcast(Notification::GameOver { winner: None });
        } else if let Some(next) = self.turn.advance() {
            out.broadcast(Notification::TurnChanged { current_turn: next });
        }
        Ok(())
    }

    fn handle_settings(
        &mut self,
        core: &mut RoomCore,
        from: ParticipantId,
        settings: BoardSettings,
        out: &mut Outbox,
    ) -> Result<(), ActionError> {
        if !core.is_owner(from) {
            return Err(ActionError::Unauthorized);
        }
        if core.phase() == Phase::Playing {
            return Err(ActionError::InvalidPhase);
        }
        let errors = settings.validate();
        if !errors.is_empty() {
            // Field-level feedback, not a command rejection
            out.to(from, Notification::SettingsError { errors });
            return Ok(());
        }
        self.board.apply_settings(settings);
        out.broadcast(Notification::SettingsUpdated {
            settings,
            updated_by: from,
        });
        Ok(())
    }
}

impl GameMode for BoardGame {
    fn on_start(&mut self, core: &mut RoomCore, _now: Instant, out: &mut Outbox) {
        self.board.clear();
        self.symbols = core
            .participants()
            .values()
            .zip(SYMBOLS)
            .map(|(p, symbol)| (p.id, symbol))
            .collect();
        self.turn.rebuild(core.participants().keys().copied());
        self.turn.reset();
        out.broadcast(Notification::StartGame {
            starting_participant: self.turn.current(),
        });
    }

    fn after_leave(&mut self, core: &mut RoomCore, _id: ParticipantId, out: &mut Outbox) {
        if core.phase() != Phase::Playing || self.turn.is_empty() {
            return;
        }
        let holder = self.turn.current();
        let remaining: Vec<ParticipantId> = self
            .turn
            .ids()
            .iter()
            .filter(|id| core.get(**id).is_some())
            .copied()
            .collect();

        if remaining.len() == 1 {
            // Last one standing takes the match
            let winner = remaining[0];
            core.finish(Outcome::Winner { id: winner });
            self.turn.clear();
            out.broadcast(Notification::GameOver {
                winner: Some(winner),
            });
            return;
        }

        self.turn.rebuild(remaining.into_iter());
        if let Some(current) = self.turn.current() {
            if holder != Some(current) {
                out.broadcast(Notification::TurnChanged {
                    current_turn: current,
                });
            }
        }
    }

    fn handle(
        &mut self,
        core: &mut RoomCore,
        from: ParticipantId,
        command: ClientCommand,
        _now: Instant,
        out: &mut Outbox,
    ) -> Result<(), ActionError> {
        match command {
            ClientCommand::Move(mv) => self.handle_move(core, from, mv.target, out),
            ClientCommand::UpdateSettings { settings } => {
                self.handle_settings(core, from, settings, out)
            }
            ClientCommand::Fire { .. } | ClientCommand::StopMove => Err(
                ActionError::Validation("not supported in this mode".into()),
            ),
            _ => Err(ActionError::Validation("unsupported command".into())),
        }
    }

    fn snapshot(&self, _core: &RoomCore) -> ModeSnapshot {
        let settings = self.board.settings();
        ModeSnapshot::Board(BoardView {
            current_turn: self.turn.current(),
            cols: settings.cols,
            rows: settings.rows,
            run_length: settings.run_length,
            cells: self.board.cells().to_vec(),
            symbols: self.symbols.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::core::{JoinOptions, RoomConfig};
    use crate::room::protocol::MoveCommand;

    fn now() -> Instant {
        Instant::now()
    }

    fn playing_room(n: usize) -> (RoomCore, BoardGame, Vec<ParticipantId>, Outbox) {
        let mut core = RoomCore::new(RoomConfig::default());
        let ids: Vec<ParticipantId> = (0..n).map(|_| ParticipantId::random()).collect();
        for (i, id) in ids.iter().enumerate() {
            core.join(JoinOptions {
                id: *id,
                name: format!("p{i}"),
                avatar: String::new(),
                password: None,
            })
            .unwrap();
        }
        for id in &ids {
            core.set_ready(*id, true).unwrap();
        }
        core.request_start(ids[0]).unwrap();

        let mut mode = BoardGame::new(BoardSettings::default());
        let mut out = Outbox::new();
        mode.on_start(&mut core, now(), &mut out);
        out.drain().for_each(drop);
        (core, mode, ids, out)
    }

    fn place(
        mode: &mut BoardGame,
        core: &mut RoomCore,
        id: ParticipantId,
        col: u16,
        row: u16,
        out: &mut Outbox,
    ) -> Result<(), ActionError> {
        mode.handle(
            core,
            id,
            ClientCommand::Move(MoveCommand {
                target: Some([col as f32, row as f32]),
                ..Default::default()
            }),
            now(),
            out,
        )
    }

    #[test]
    fn test_settings_validation() {
        assert!(BoardSettings::default().validate().is_empty());

        let errors = BoardSettings {
            cols: 4,
            rows: 30,
            run_length: 2,
        }
        .validate();
        assert_eq!(errors.len(), 3);

        // Run longer than the smaller dimension
        let errors = BoardSettings {
            cols: 5,
            rows: 25,
            run_length: 6,
        }
        .validate();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_only_turn_holder_may_place() {
        let (mut core, mut mode, ids, mut out) = playing_room(2);

        let err = place(&mut mode, &mut core, ids[1], 0, 0, &mut out).unwrap_err();
        assert_eq!(err, ActionError::Unauthorized);

        place(&mut mode, &mut core, ids[0], 0, 0, &mut out).unwrap();
        // Turn advanced
        let err = place(&mut mode, &mut core, ids[0], 1, 0, &mut out).unwrap_err();
        assert_eq!(err, ActionError::Unauthorized);
    }

    #[test]
    fn test_occupied_and_out_of_bounds_rejected() {
        let (mut core, mut mode, ids, mut out) = playing_room(2);

        place(&mut mode, &mut core, ids[0], 3, 3, &mut out).unwrap();
        let err = place(&mut mode, &mut core, ids[1], 3, 3, &mut out).unwrap_err();
        assert!(matches!(err, ActionError::Validation(_)));

        let err = place(&mut mode, &mut core, ids[1], 99, 0, &mut out).unwrap_err();
        assert!(matches!(err, ActionError::Validation(_)));

        // Fractional coordinates are not cells
        let err = mode
            .handle(
                &mut core,
                ids[1],
                ClientCommand::Move(MoveCommand {
                    target: Some([1.5, 2.0]),
                    ..Default::default()
                }),
                now(),
                &mut out,
            )
            .unwrap_err();
        assert!(matches!(err, ActionError::Validation(_)));
    }

    #[test]
    fn test_win_scan_requires_full_run() {
        let id = ParticipantId::random();
        let lines: [fn(u16) -> (u16, u16); 4] = [
            |i| (i, 2),     // row
            |i| (2, i),     // column
            |i| (i, i),     // diagonal
            |i| (i, 6 - i), // anti-diagonal
        ];

        for line in lines {
            let mut board = Board::new(BoardSettings::default());
            for i in 0..4u16 {
                let (c, r) = line(i);
                board.place(c, r, id).unwrap();
                assert!(!board.wins_at(c, r, id));
            }
            let (c, r) = line(4);
            board.place(c, r, id).unwrap();
            assert!(board.wins_at(c, r, id));
        }
    }

    #[test]
    fn test_horizontal_run_wins() {
        let (mut core, mut mode, ids, mut out) = playing_room(2);

        for i in 0..4u16 {
            place(&mut mode, &mut core, ids[0], i, 0, &mut out).unwrap();
            place(&mut mode, &mut core, ids[1], i, 5, &mut out).unwrap();
        }
        place(&mut mode, &mut core, ids[0], 4, 0, &mut out).unwrap();

        assert_eq!(core.phase(), Phase::Finished);
        assert_eq!(core.outcome(), Some(Outcome::Winner { id: ids[0] }));
        assert!(out
            .drain()
            .any(|o| matches!(o.notification, Notification::GameOver { winner } if winner == Some(ids[0]))));
    }

    #[test]
    fn test_diagonal_run_completed_mid_line_wins() {
        let (mut core, mut mode, ids, mut out) = playing_room(2);

        // ids[0] builds (0,0),(1,1),(3,3),(4,4) then fills (2,2)
        let marks = [(0u16, 0u16), (1, 1), (3, 3), (4, 4)];
        for (i, (c, r)) in marks.iter().enumerate() {
            place(&mut mode, &mut core, ids[0], *c, *r, &mut out).unwrap();
            place(&mut mode, &mut core, ids[1], i as u16, 10, &mut out).unwrap();
        }
        place(&mut mode, &mut core, ids[0], 2, 2, &mut out).unwrap();

        assert_eq!(core.outcome(), Some(Outcome::Winner { id: ids[0] }));
    }

    #[test]
    fn test_full_board_without_run_draws() {
        let mut core = RoomCore::new(RoomConfig::default());
        let ids: Vec<ParticipantId> = (0..2).map(|_| ParticipantId::random()).collect();
        for (i, id) in ids.iter().enumerate() {
            core.join(JoinOptions {
                id: *id,
                name: format!("p{i}"),
                avatar: String::new(),
                password: None,
            })
            .unwrap();
        }
        for id in &ids {
            core.set_ready(*id, true).unwrap();
        }
        core.request_start(ids[0]).unwrap();

        let mut mode = BoardGame::new(BoardSettings {
            cols: 5,
            rows: 5,
            run_length: 5,
        });
        let mut out = Outbox::new();
        mode.on_start(&mut core, now(), &mut out);
        out.drain().for_each(drop);

        // ((col / 2) + row) % 2 yields no 5-run in any direction, and it
        // splits 5x5 into 13 and 12 cells, matching strict alternation
        let owner_of = |col: u16, row: u16| ((col / 2 + row) % 2) as usize;
        let first = mode.turn.current().unwrap();
        let mut queues: [Vec<(u16, u16)>; 2] = [Vec::new(), Vec::new()];
        for row in 0..5u16 {
            for col in 0..5u16 {
                let slot = if ids[owner_of(col, row)] == first { 0 } else { 1 };
                queues[slot].push((col, row));
            }
        }

        let mut next = [0usize; 2];
        let mut mover = first;
        while core.phase() == Phase::Playing {
            let slot = usize::from(mover != first);
            let (col, row) = queues[slot][next[slot]];
            next[slot] += 1;
            place(&mut mode, &mut core, mover, col, row, &mut out).unwrap();
            if let Some(current) = mode.turn.current() {
                mover = current;
            }
        }

        assert_eq!(core.phase(), Phase::Finished);
        assert_eq!(core.outcome(), Some(Outcome::Draw));
        assert!(out
            .drain()
            .any(|o| matches!(o.notification, Notification::GameOver { winner: None })));
    }

    #[test]
    fn test_sole_remaining_player_wins_on_leave() {
        let (mut core, mut mode, ids, mut out) = playing_room(2);

        core.leave(ids[1]).unwrap();
        mode.after_leave(&mut core, ids[1], &mut out);

        assert_eq!(core.phase(), Phase::Finished);
        assert_eq!(core.outcome(), Some(Outcome::Winner { id: ids[0] }));
    }

    #[test]
    fn test_leaving_holder_passes_turn() {
        let (mut core, mut mode, ids, mut out) = playing_room(3);
        assert_eq!(mode.turn.current(), Some(ids[0]));

        core.leave(ids[0]).unwrap();
        mode.after_leave(&mut core, ids[0], &mut out);

        assert_eq!(mode.turn.current(), Some(ids[1]));
        assert!(out
            .drain()
            .any(|o| matches!(o.notification, Notification::TurnChanged { current_turn } if current_turn == ids[1])));
    }

    #[test]
    fn test_settings_update_gated_and_broadcast() {
        let mut core = RoomCore::new(RoomConfig::default());
        let ids: Vec<ParticipantId> = (0..2).map(|_| ParticipantId::random()).collect();
        for (i, id) in ids.iter().enumerate() {
            core.join(JoinOptions {
                id: *id,
                name: format!("p{i}"),
                avatar: String::new(),
                password: None,
            })
            .unwrap();
        }
        let mut mode = BoardGame::new(BoardSettings::default());
        let mut out = Outbox::new();

        let valid = BoardSettings {
            cols: 10,
            rows: 10,
            run_length: 4,
        };
        let err = mode
            .handle(
                &mut core,
                ids[1],
                ClientCommand::UpdateSettings { settings: valid },
                now(),
                &mut out,
            )
            .unwrap_err();
        assert_eq!(err, ActionError::Unauthorized);

        // Invalid settings answer the caller with field errors, not a
        // rejection
        mode.handle(
            &mut core,
            ids[0],
            ClientCommand::UpdateSettings {
                settings: BoardSettings {
                    cols: 1,
                    rows: 1,
                    run_length: 1,
                },
            },
            now(),
            &mut out,
        )
        .unwrap();
        assert!(out
            .drain()
            .any(|o| matches!(o.notification, Notification::SettingsError { .. })));

        mode.handle(
            &mut core,
            ids[0],
            ClientCommand::UpdateSettings { settings: valid },
            now(),
            &mut out,
        )
        .unwrap();
        assert_eq!(mode.board.settings(), valid);
        assert_eq!(mode.board.cells().len(), 100);
        assert!(out
            .drain()
            .any(|o| matches!(o.notification, Notification::SettingsUpdated { .. })));
    }

    #[test]
    fn test_symbols_assigned_in_join_order() {
        let (_core, mode, ids, _out) = playing_room(3);
        assert_eq!(mode.symbols[&ids[0]], 'X');
        assert_eq!(mode.symbols[&ids[1]], 'O');
        assert_eq!(mode.symbols[&ids[2]], '#');
    }
}
