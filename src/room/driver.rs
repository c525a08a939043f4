//! Per-Room Sequencer
//!
//! One tokio task owns each room: every message handler and tick runs to
//! completion on that task, in enqueue order, so room state needs no
//! locking and no two mutations are ever in flight. Distinct rooms share
//! nothing.
//!
//! The simulation tick and the replication cadence are deliberately
//! separate intervals: replicating at the tick rate wastes bandwidth,
//! while deriving the simulation clock from the replication rate makes
//! timers drift when replication is slowed. Both timers are wall-clock
//! driven.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::room::core::{ActionError, JoinOptions, ParticipantId, RoomCore};
use crate::room::protocol::{
    ClientCommand, KickReason, Notification, Outbound, Target,
};
use crate::room::snapshot::{ModeSnapshot, RoomSnapshot};

/// Queue of notifications produced by one handler invocation.
#[derive(Debug, Default)]
pub struct Outbox {
    items: Vec<Outbound>,
}

impl Outbox {
    /// Create an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a notification for every participant.
    pub fn broadcast(&mut self, notification: Notification) {
        self.items.push(Outbound {
            target: Target::All,
            notification,
        });
    }

    /// Queue a notification for a single participant.
    pub fn to(&mut self, id: ParticipantId, notification: Notification) {
        self.items.push(Outbound {
            target: Target::One(id),
            notification,
        });
    }

    /// Drain queued notifications.
    pub fn drain(&mut self) -> impl Iterator<Item = Outbound> + '_ {
        self.items.drain(..)
    }

    /// Number of queued notifications.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Pluggable game behavior composed with [`RoomCore`].
///
/// Replaces a deep lifecycle/turn/simulation inheritance chain with one
/// capability trait: modes keep their own state and receive the generic
/// core at every hook point.
pub trait GameMode: Send + 'static {
    /// Fixed simulation tick interval; `None` for modes without a loop.
    fn tick_interval(&self) -> Option<Duration> {
        None
    }

    /// A match just transitioned into `Playing` (start, restart or
    /// rematch).
    fn on_start(&mut self, core: &mut RoomCore, now: Instant, out: &mut Outbox);

    /// A participant was admitted.
    fn after_join(&mut self, _core: &mut RoomCore, _id: ParticipantId, _out: &mut Outbox) {}

    /// A participant was removed (leave or kick).
    fn after_leave(&mut self, _core: &mut RoomCore, _id: ParticipantId, _out: &mut Outbox) {}

    /// Mode-specific command (move / fire / stop / settings).
    fn handle(
        &mut self,
        core: &mut RoomCore,
        from: ParticipantId,
        command: ClientCommand,
        now: Instant,
        out: &mut Outbox,
    ) -> Result<(), ActionError>;

    /// One fixed simulation step.
    fn on_tick(&mut self, _core: &mut RoomCore, _now: Instant, _out: &mut Outbox) {}

    /// Mode-specific replicated fields.
    fn snapshot(&self, core: &RoomCore) -> ModeSnapshot;
}

/// A command enqueued onto a room's sequencer.
#[derive(Clone, Debug)]
pub enum RoomCommand {
    /// Admit a participant.
    Join(JoinOptions),
    /// Remove a participant (disconnect).
    Leave(ParticipantId),
    /// A client command from a connected participant.
    Client {
        /// Sender.
        from: ParticipantId,
        /// The command.
        command: ClientCommand,
    },
}

/// A room: generic lifecycle core plus one game mode.
pub struct Room<M> {
    /// Lifecycle state machine.
    pub core: RoomCore,
    /// Mode state.
    pub mode: M,
}

impl<M: GameMode> Room<M> {
    /// Couple a core with a mode.
    pub fn new(core: RoomCore, mode: M) -> Self {
        Self { core, mode }
    }

    /// Execute one enqueued command to completion. Rejections are
    /// answered with an explicit notification to the caller; they never
    /// mutate state.
    pub fn apply(&mut self, command: RoomCommand, now: Instant, out: &mut Outbox) {
        match command {
            RoomCommand::Join(opts) => {
                let id = opts.id;
                match self.core.join(opts) {
                    Ok(()) => self.mode.after_join(&mut self.core, id, out),
                    Err(reason) => out.to(id, Notification::Rejected { reason }),
                }
            }
            RoomCommand::Leave(id) => self.remove(id, now, out),
            RoomCommand::Client { from, command } => {
                if !self.core.participants().contains_key(&from) {
                    out.to(
                        from,
                        Notification::Rejected {
                            reason: ActionError::Validation("not in this room".into()),
                        },
                    );
                    return;
                }
                if let Err(reason) = self.dispatch(from, command, now, out) {
                    out.to(from, Notification::Rejected { reason });
                }
            }
        }
    }

    fn dispatch(
        &mut self,
        from: ParticipantId,
        command: ClientCommand,
        now: Instant,
        out: &mut Outbox,
    ) -> Result<(), ActionError> {
        match command {
            ClientCommand::ToggleReady { ready } => self.core.set_ready(from, ready),
            ClientCommand::StartMatch => {
                self.core.request_start(from)?;
                self.mode.on_start(&mut self.core, now, out);
                Ok(())
            }
            ClientCommand::KickPlayer { target_id } => {
                self.core.check_kick(from, target_id)?;
                out.to(
                    target_id,
                    Notification::Kicked {
                        reason: KickReason::RemovedByOwner,
                        message: "removed by the room owner".into(),
                    },
                );
                self.remove(target_id, now, out);
                Ok(())
            }
            ClientCommand::ChangePassword { new_password } => {
                let is_locked = self.core.change_password(from, new_password)?;
                out.broadcast(Notification::PasswordChanged { is_locked });
                Ok(())
            }
            ClientCommand::Rematch => {
                if self.core.vote_rematch(from)? {
                    self.mode.on_start(&mut self.core, now, out);
                }
                Ok(())
            }
            other => self.mode.handle(&mut self.core, from, other, now, out),
        }
    }

    /// Remove a participant and run the mode's leave cascade. A
    /// departure can complete the rematch consensus, in which case the
    /// mode's start path runs here too.
    pub fn remove(&mut self, id: ParticipantId, now: Instant, out: &mut Outbox) {
        if let Some(leave) = self.core.leave(id) {
            self.mode.after_leave(&mut self.core, id, out);
            if leave.rematch_started {
                self.mode.on_start(&mut self.core, now, out);
            }
        }
    }

    /// Run one simulation tick.
    pub fn tick(&mut self, now: Instant, out: &mut Outbox) {
        self.mode.on_tick(&mut self.core, now, out);
    }

    /// Assemble the full replicated snapshot.
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot::assemble(&self.core, self.mode.snapshot(&self.core))
    }
}

/// Sequencer tuning.
#[derive(Clone, Debug)]
pub struct DriverConfig {
    /// Cadence at which the replicated snapshot is published.
    pub replication_interval: Duration,
    /// Inbound command queue depth.
    pub command_capacity: usize,
    /// Outbound notification fanout depth.
    pub notification_capacity: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            replication_interval: Duration::from_millis(50),
            command_capacity: 256,
            notification_capacity: 256,
        }
    }
}

/// Handle to a spawned room.
#[derive(Clone)]
pub struct RoomHandle {
    commands: mpsc::Sender<RoomCommand>,
    notifications: broadcast::Sender<Outbound>,
    snapshots: watch::Receiver<RoomSnapshot>,
}

impl RoomHandle {
    /// Enqueue a command. Returns `false` if the room has shut down.
    pub async fn send(&self, command: RoomCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Subscribe to outbound notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.notifications.subscribe()
    }

    /// Latest replicated snapshot.
    pub fn snapshot(&self) -> RoomSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Watch replicated snapshots as they are published.
    pub fn watch_snapshots(&self) -> watch::Receiver<RoomSnapshot> {
        self.snapshots.clone()
    }

    /// True once the room task has stopped accepting commands.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// Spawn a room's sequencer task and return its handle.
///
/// The task runs until the last participant leaves (after at least one
/// join) or a handler panics; a panic is caught per invocation, logged,
/// and the room is disposed with a `shutdown` notification rather than
/// left inconsistent.
pub fn spawn_room<M: GameMode>(core: RoomCore, mode: M, config: DriverConfig) -> RoomHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<RoomCommand>(config.command_capacity);
    let (note_tx, _) = broadcast::channel::<Outbound>(config.notification_capacity);
    let mut room = Room::new(core, mode);
    let (snap_tx, snap_rx) = watch::channel(room.snapshot());

    let handle = RoomHandle {
        commands: cmd_tx,
        notifications: note_tx.clone(),
        snapshots: snap_rx,
    };

    let tick_every = room.mode.tick_interval();
    let room_name = room.core.config().name.clone();

    tokio::spawn(async move {
        // The ticker exists even for tick-less modes so select! has a
        // branch to name; it is simply never enabled.
        let ticking = tick_every.is_some();
        let mut ticker =
            tokio::time::interval(tick_every.unwrap_or(Duration::from_secs(3600)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut replicator = tokio::time::interval(config.replication_interval);
        replicator.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut out = Outbox::new();
        let mut had_participant = false;

        loop {
            let crashed = tokio::select! {
                maybe = cmd_rx.recv() => match maybe {
                    Some(command) => {
                        let now = Instant::now();
                        catch_unwind(AssertUnwindSafe(|| {
                            room.apply(command, now, &mut out)
                        }))
                        .is_err()
                    }
                    // Every handle dropped; nobody can reach the room.
                    None => break,
                },
                _ = ticker.tick(), if ticking => {
                    let now = Instant::now();
                    catch_unwind(AssertUnwindSafe(|| room.tick(now, &mut out))).is_err()
                }
                _ = replicator.tick() => {
                    let _ = snap_tx.send(room.snapshot());
                    false
                }
            };

            for outbound in out.drain() {
                let _ = note_tx.send(outbound);
            }

            if crashed {
                // Everything queued before the panic has been flushed
                error!(room = %room_name, "handler panicked; disposing room");
                let _ = note_tx.send(Outbound {
                    target: Target::All,
                    notification: Notification::Shutdown {
                        reason: "internal error".into(),
                    },
                });
                break;
            }

            if !room.core.is_empty() {
                had_participant = true;
            } else if had_participant {
                info!(room = %room_name, "last participant left; closing room");
                break;
            }
        }
    });

    handle
}
