//! Turn Ordering
//!
//! Deterministic alternating-turn sequence for slot-based games,
//! derived from join order. Rebuilt on every join and leave.

use crate::room::core::ParticipantId;

/// Cyclic turn sequence.
#[derive(Clone, Debug, Default)]
pub struct TurnOrder {
    order: Vec<ParticipantId>,
    current: usize,
}

impl TurnOrder {
    /// Create an empty order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the sequence from the given ids (join order). The current
    /// holder keeps the turn if still present; otherwise the first entry
    /// becomes active.
    pub fn rebuild(&mut self, ids: impl Iterator<Item = ParticipantId>) {
        let holder = self.current();
        self.order = ids.collect();
        self.current = holder
            .and_then(|h| self.order.iter().position(|id| *id == h))
            .unwrap_or(0);
    }

    /// Participant whose move is currently valid. Empty outside a match.
    pub fn current(&self) -> Option<ParticipantId> {
        self.order.get(self.current).copied()
    }

    /// Move to the next id cyclically and return it.
    pub fn advance(&mut self) -> Option<ParticipantId> {
        if self.order.is_empty() {
            return None;
        }
        self.current = (self.current + 1) % self.order.len();
        self.current()
    }

    /// Reset to the first entry.
    pub fn reset(&mut self) {
        self.current = 0;
    }

    /// Drop the sequence entirely (match over).
    pub fn clear(&mut self) {
        self.order.clear();
        self.current = 0;
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when no sequence is active.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids in turn order.
    pub fn ids(&self) -> &[ParticipantId] {
        &self.order
    }
}
