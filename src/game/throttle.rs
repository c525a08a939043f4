//! Input Throttling
//!
//! Per-participant rate limiting with latest-wins semantics: commands
//! arriving faster than the processing interval overwrite the buffered
//! slot, and each slot is consumed at most once per interval. Dropped
//! intents are fine because a newer intent supersedes an older one.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::room::core::ParticipantId;

/// Latest-wins input buffer with a per-participant processing interval.
#[derive(Clone, Debug)]
pub struct InputThrottle<P> {
    interval: Duration,
    slots: BTreeMap<ParticipantId, P>,
    last_processed: BTreeMap<ParticipantId, Instant>,
}

impl<P> InputThrottle<P> {
    /// Create a throttle consuming at most one input per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            slots: BTreeMap::new(),
            last_processed: BTreeMap::new(),
        }
    }

    /// Buffer an input, overwriting any unprocessed one.
    pub fn add_input(&mut self, id: ParticipantId, input: P) {
        self.slots.insert(id, input);
    }

    /// Drop a participant's buffered input and history.
    pub fn remove(&mut self, id: ParticipantId) {
        self.slots.remove(&id);
        self.last_processed.remove(&id);
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.last_processed.clear();
    }

    /// Consume each participant's buffered input whose interval has
    /// elapsed, in participant-id order.
    pub fn process_inputs(&mut self, now: Instant, mut visit: impl FnMut(ParticipantId, P)) {
        let due: Vec<ParticipantId> = self
            .slots
            .keys()
            .filter(|id| {
                self.last_processed
                    .get(id)
                    .is_none_or(|t| now.duration_since(*t) >= self.interval)
            })
            .copied()
            .collect();

        for id in due {
            if let Some(input) = self.slots.remove(&id) {
                self.last_processed.insert(id, now);
                visit(id, input);
            }
        }
    }

    /// Number of buffered inputs.
    pub fn pending(&self) -> usize {
        self.slots.len()
    }
}
