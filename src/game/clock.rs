//! Match Clock
//!
//! Wall-clock countdown for timed matches. The remaining time is derived
//! from elapsed wall time rather than accumulated per-tick deltas, so a
//! stalled or slowed tick loop cannot stretch the match. The whole-second
//! value is published at most once per second; replicating a fractional
//! timer every tick is wasted bandwidth.

use std::time::{Duration, Instant};

use tracing::warn;

/// Drift beyond this between wall time and tick count gets logged.
const DRIFT_WARN_SECS: f64 = 0.25;

/// Result of one clock step.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClockStep {
    /// Whole-second value to publish, when it changed since the last step.
    pub publish: Option<u32>,
    /// The countdown just reached zero on this step.
    pub expired: bool,
}

/// Countdown clock for one match.
#[derive(Clone, Debug)]
pub struct MatchClock {
    duration: Duration,
    tick_dt: f64,
    started_at: Option<Instant>,
    published: Option<u32>,
    ticks: u64,
    generation: u64,
    drift_warned: bool,
}

impl MatchClock {
    /// Create a stopped clock for matches of `duration`, ticked at
    /// `tick_dt`-second steps.
    pub fn new(duration: Duration, tick_dt: f64) -> Self {
        Self {
            duration,
            tick_dt,
            started_at: None,
            published: None,
            ticks: 0,
            generation: 0,
            drift_warned: false,
        }
    }

    /// Start (or restart) the countdown. Bumps the generation so timers
    /// scheduled against a previous match cannot fire into this one.
    pub fn start(&mut self, now: Instant) {
        self.started_at = Some(now);
        self.published = None;
        self.ticks = 0;
        self.generation += 1;
        self.drift_warned = false;
    }

    /// Stop the countdown.
    pub fn stop(&mut self) {
        self.started_at = None;
    }

    /// True while the countdown is running.
    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Match generation; bumped on every start.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wall-clock seconds since the current start.
    pub fn elapsed_secs(&self, now: Instant) -> f64 {
        self.started_at
            .map(|t| now.duration_since(t).as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Whole seconds remaining; the replicated value.
    pub fn remaining_secs(&self, now: Instant) -> u32 {
        let left = self.duration.as_secs_f64() - self.elapsed_secs(now);
        left.max(0.0).ceil() as u32
    }

    /// Advance one tick. Returns the throttled publish value and whether
    /// the countdown expired on this step.
    pub fn tick(&mut self, now: Instant) -> ClockStep {
        if self.started_at.is_none() {
            return ClockStep::default();
        }
        self.ticks += 1;

        let elapsed = self.elapsed_secs(now);
        let simulated = self.ticks as f64 * self.tick_dt;
        if !self.drift_warned && (elapsed - simulated).abs() > DRIFT_WARN_SECS {
            warn!(
                elapsed_secs = elapsed,
                simulated_secs = simulated,
                "tick loop drifting from wall clock"
            );
            self.drift_warned = true;
        }

        let remaining = self.remaining_secs(now);
        let publish = if self.published != Some(remaining) {
            self.published = Some(remaining);
            Some(remaining)
        } else {
            None
        };

        ClockStep {
            publish,
            expired: elapsed >= self.duration.as_secs_f64(),
        }
    }
}
