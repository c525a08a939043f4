//! Arena Mode
//!
//! Continuous top-down deathmatch simulated at a fixed tick rate:
//! throttled movement intents, projectiles with server-side hit
//! detection through the spatial broad phase, kills, timed respawns and
//! a wall-clock match countdown. Mid-match joiners spectate until the
//! next start.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, info};
use uuid::Uuid;

use crate::core::rng::SpawnRng;
use crate::core::vec2::Vec2;
use crate::game::clock::MatchClock;
use crate::game::spatial::{EntityTag, SpatialGrid};
use crate::game::throttle::InputThrottle;
use crate::room::core::{ActionError, Outcome, ParticipantId, Phase, RoomCore};
use crate::room::driver::{GameMode, Outbox};
use crate::room::protocol::{ClientCommand, MoveCommand, Notification, ScoreEntry};
use crate::room::snapshot::{ArenaPlayerView, ArenaView, ModeSnapshot, ProjectileView};

/// Simulation tick rate in Hz.
pub const TICK_RATE: u32 = 60;

/// Distance at which a steered player snaps onto their target point.
const TARGET_SNAP: f32 = 4.0;

/// Arena tunables.
#[derive(Clone, Debug)]
pub struct ArenaConfig {
    /// Arena width in world units.
    pub width: f32,
    /// Arena height in world units.
    pub height: f32,
    /// Player movement speed (units/second).
    pub move_speed: f32,
    /// Projectile speed (units/second).
    pub projectile_speed: f32,
    /// Damage per projectile hit.
    pub projectile_damage: u32,
    /// Projectile lifetime in seconds.
    pub projectile_lifetime: f64,
    /// Hit radius around a player.
    pub hit_radius: f32,
    /// Minimum time between shots.
    pub fire_cooldown: Duration,
    /// Delay before a defeated player re-enters play, in seconds.
    pub respawn_delay: f64,
    /// Match duration in seconds.
    pub match_duration: u32,
    /// Score that ends the match immediately.
    pub score_limit: u32,
    /// Health a player spawns with.
    pub max_health: u32,
    /// Movement input processing interval.
    pub input_interval: Duration,
    /// Broad-phase cell size.
    pub cell_size: f32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            width: 1600.0,
            height: 900.0,
            move_speed: 220.0,
            projectile_speed: 600.0,
            projectile_damage: 20,
            projectile_lifetime: 2.0,
            hit_radius: 24.0,
            fire_cooldown: Duration::from_millis(500),
            respawn_delay: 3.0,
            match_duration: 180,
            score_limit: 20,
            max_health: 100,
            input_interval: Duration::from_millis(50),
            cell_size: 64.0,
        }
    }
}

/// Buffered movement intent.
#[derive(Clone, Copy, Debug)]
enum ArenaInput {
    Move(MoveCommand),
    Stop,
}

/// One participant's simulation state.
#[derive(Clone, Debug)]
struct ArenaPlayer {
    position: Vec2,
    velocity: Vec2,
    move_target: Option<Vec2>,
    heading: f32,
    health: u32,
    score: u32,
    kills: u32,
    deaths: u32,
    alive: bool,
    spectator: bool,
    last_fire: Option<Instant>,
}

impl ArenaPlayer {
    fn spawned(position: Vec2, health: u32) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            move_target: None,
            heading: 0.0,
            health,
            score: 0,
            kills: 0,
            deaths: 0,
            alive: true,
            spectator: false,
            last_fire: None,
        }
    }
}

/// A live projectile.
#[derive(Clone, Debug)]
struct Projectile {
    position: Vec2,
    velocity: Vec2,
    heading: f32,
    owner: ParticipantId,
    spawned_at: f64,
}

/// A scheduled respawn. The generation guards against a timer from a
/// previous match firing into the next one.
#[derive(Clone, Copy, Debug)]
struct PendingRespawn {
    id: ParticipantId,
    due_at: f64,
    generation: u64,
}

/// Continuous deathmatch mode.
pub struct ArenaGame {
    config: ArenaConfig,
    players: BTreeMap<ParticipantId, ArenaPlayer>,
    projectiles: BTreeMap<u32, Projectile>,
    next_projectile_id: u32,
    inputs: InputThrottle<ArenaInput>,
    grid: SpatialGrid<ParticipantId>,
    clock: MatchClock,
    respawns: Vec<PendingRespawn>,
    rng: SpawnRng,
    running: bool,
    timer: u32,
}

impl ArenaGame {
    /// Create the mode with the given tunables.
    pub fn new(config: ArenaConfig) -> Self {
        Self {
            inputs: InputThrottle::new(config.input_interval),
            grid: SpatialGrid::new(config.width, config.height, config.cell_size),
            clock: MatchClock::new(
                Duration::from_secs(u64::from(config.match_duration)),
                1.0 / f64::from(TICK_RATE),
            ),
            players: BTreeMap::new(),
            projectiles: BTreeMap::new(),
            next_projectile_id: 0,
            respawns: Vec::new(),
            rng: SpawnRng::new(Uuid::new_v4().as_u64_pair().0),
            running: false,
            timer: config.match_duration,
            config,
        }
    }

    /// Seeded constructor for reproducible spawn sequences.
    pub fn with_seed(config: ArenaConfig, seed: u64) -> Self {
        let mut game = Self::new(config);
        game.rng = SpawnRng::new(seed);
        game
    }

    fn tick_dt(&self) -> f32 {
        1.0 / TICK_RATE as f32
    }

    fn spawn_point(&mut self) -> Vec2 {
        let margin = self.config.hit_radius * 2.0;
        self.rng.spawn_point(self.config.width, self.config.height, margin)
    }

    fn buffer_move(
        &mut self,
        from: ParticipantId,
        mv: MoveCommand,
    ) -> Result<(), ActionError> {
        let finite = |v: Option<[f32; 2]>| v.is_none_or(|[x, y]| x.is_finite() && y.is_finite());
        if !finite(mv.direction) || !finite(mv.target) || !mv.heading.is_none_or(f32::is_finite)
        {
            return Err(ActionError::Validation("non-finite movement input".into()));
        }
        self.inputs.add_input(from, ArenaInput::Move(mv));
        Ok(())
    }

    fn fire(
        &mut self,
        core: &RoomCore,
        from: ParticipantId,
        heading: f32,
        now: Instant,
    ) -> Result<(), ActionError> {
        if core.phase() != Phase::Playing || !self.running {
            return Err(ActionError::InvalidPhase);
        }
        if !heading.is_finite() {
            return Err(ActionError::Validation("non-finite heading".into()));
        }
        let speed = self.config.projectile_speed;
        let elapsed = self.clock.elapsed_secs(now);
        let cooldown = self.config.fire_cooldown;

        let Some(player) = self.players.get_mut(&from) else {
            return Err(ActionError::Validation("not in this match".into()));
        };
        if !player.alive || player.spectator {
            return Err(ActionError::InvalidPhase);
        }
        // Shots inside the cooldown window are dropped, not rejected;
        // punishing a fast trigger with an error message is just noise
        if player
            .last_fire
            .is_some_and(|t| now.duration_since(t) < cooldown)
        {
            return Ok(());
        }
        player.last_fire = Some(now);
        player.heading = heading;

        let position = player.position;
        let id = self.next_projectile_id;
        self.next_projectile_id = self.next_projectile_id.wrapping_add(1);
        self.projectiles.insert(
            id,
            Projectile {
                position,
                velocity: Vec2::from_heading(heading).scale(speed),
                heading,
                owner: from,
                spawned_at: elapsed,
            },
        );
        Ok(())
    }

    fn apply_input(&mut self, id: ParticipantId, input: ArenaInput) {
        let speed = self.config.move_speed;
        let Some(player) = self.players.get_mut(&id) else {
            return;
        };
        if !player.alive || player.spectator {
            return;
        }
        match input {
            ArenaInput::Move(mv) => {
                if let Some(heading) = mv.heading {
                    player.heading = heading;
                }
                if let Some(target) = mv.target {
                    player.move_target = Some(Vec2::from(target));
                    player.velocity = Vec2::ZERO;
                } else if let Some(direction) = mv.direction {
                    player.move_target = None;
                    player.velocity =
                        Vec2::from(direction).normalize_or_zero().scale(speed);
                }
            }
            ArenaInput::Stop => {
                player.move_target = None;
                player.velocity = Vec2::ZERO;
            }
        }
    }

    fn integrate_players(&mut self) {
        let dt = self.tick_dt();
        let speed = self.config.move_speed;
        let (width, height) = (self.config.width, self.config.height);

        for player in self.players.values_mut() {
            if !player.alive || player.spectator {
                continue;
            }
            if let Some(target) = player.move_target {
                let to_target = target - player.position;
                if to_target.length() <= TARGET_SNAP {
                    player.position = target;
                    player.move_target = None;
                    player.velocity = Vec2::ZERO;
                } else {
                    player.velocity = to_target.normalize_or_zero().scale(speed);
                }
            }
            player.position = (player.position + player.velocity.scale(dt))
                .clamp_to_bounds(width, height);
        }
    }

    fn process_respawns(&mut self, now: Instant, core: &RoomCore, out: &mut Outbox) {
        let elapsed = self.clock.elapsed_secs(now);
        let generation = self.clock.generation();
        let due: Vec<PendingRespawn> = {
            let (due, pending): (Vec<_>, Vec<_>) = self
                .respawns
                .drain(..)
                .partition(|r| r.generation == generation && r.due_at <= elapsed);
            self.respawns = pending
                .into_iter()
                .filter(|r| r.generation == generation)
                .collect();
            due
        };

        for respawn in due {
            let position = self.spawn_point();
            let Some(player) = self.players.get_mut(&respawn.id) else {
                continue;
            };
            player.alive = true;
            player.health = self.config.max_health;
            player.position = position;
            player.velocity = Vec2::ZERO;
            player.move_target = None;
            if let Some(name) = core.name_of(respawn.id) {
                out.broadcast(Notification::PlayerRespawned {
                    player_id: respawn.id,
                    player_name: name,
                });
            }
        }
    }

    fn step_projectiles(&mut self, now: Instant, core: &mut RoomCore, out: &mut Outbox) {
        let dt = self.tick_dt();
        let elapsed = self.clock.elapsed_secs(now);
        let hit_radius = self.config.hit_radius;
        let (width, height) = (self.config.width, self.config.height);

        // Broad phase rebuilt from live players only
        self.grid.clear();
        for (id, player) in &self.players {
            if player.alive && !player.spectator {
                self.grid
                    .insert(*id, EntityTag::Player, player.position, hit_radius);
            }
        }

        let mut removed: Vec<u32> = Vec::new();
        let mut hits: Vec<(ParticipantId, ParticipantId)> = Vec::new();

        for (id, projectile) in &mut self.projectiles {
            projectile.position = projectile.position + projectile.velocity.scale(dt);
            let p = projectile.position;

            let expired = elapsed - projectile.spawned_at >= self.config.projectile_lifetime;
            let out_of_bounds = p.x < 0.0 || p.y < 0.0 || p.x > width || p.y > height;
            if expired || out_of_bounds {
                removed.push(*id);
                continue;
            }

            let victim = self
                .grid
                .query(p, 0.0, Some(EntityTag::Player))
                .into_iter()
                .find(|candidate| *candidate != projectile.owner);
            if let Some(victim) = victim {
                hits.push((victim, projectile.owner));
                removed.push(*id);
            }
        }
        for id in removed {
            self.projectiles.remove(&id);
        }

        for (victim, shooter) in hits {
            self.apply_hit(victim, shooter, now, core, out);
            if core.phase() != Phase::Playing {
                break;
            }
        }
    }

    fn apply_hit(
        &mut self,
        victim: ParticipantId,
        shooter: ParticipantId,
        now: Instant,
        core: &mut RoomCore,
        out: &mut Outbox,
    ) {
        let damage = self.config.projectile_damage;
        let Some(player) = self.players.get_mut(&victim) else {
            return;
        };
        if !player.alive {
            return;
        }
        player.health = player.health.saturating_sub(damage);
        if player.health > 0 {
            return;
        }

        player.alive = false;
        player.velocity = Vec2::ZERO;
        player.move_target = None;
        player.deaths += 1;
        self.inputs.remove(victim);
        self.respawns.push(PendingRespawn {
            id: victim,
            due_at: self.clock.elapsed_secs(now) + self.config.respawn_delay,
            generation: self.clock.generation(),
        });

        let mut shooter_score = None;
        if let Some(killer) = self.players.get_mut(&shooter) {
            killer.kills += 1;
            killer.score += 1;
            shooter_score = Some(killer.score);
        }

        debug!(victim = ?victim, killer = ?shooter, "player killed");
        out.broadcast(Notification::PlayerKilled {
            victim,
            killer: Some(shooter),
            victim_name: core.name_of(victim).unwrap_or_default(),
            killer_name: core.name_of(shooter),
        });

        if shooter_score.is_some_and(|s| s >= self.config.score_limit) {
            self.end_match(core, out);
        }
    }

    /// Pick the winner and close the match: strictly highest score wins,
    /// ties break to the fewest deaths, a remaining tie is a draw.
    fn end_match(&mut self, core: &mut RoomCore, out: &mut Outbox) {
        if !self.running {
            return;
        }
        self.running = false;
        self.clock.stop();
        self.projectiles.clear();
        self.respawns.clear();
        self.inputs.clear();

        let mut ranked: Vec<(&ParticipantId, &ArenaPlayer)> = self
            .players
            .iter()
            .filter(|(_, p)| !p.spectator)
            .collect();
        ranked.sort_by(|a, b| {
            b.1.score
                .cmp(&a.1.score)
                .then(a.1.deaths.cmp(&b.1.deaths))
        });

        let winner = match ranked.as_slice() {
            [] => None,
            [only] => Some(*only.0),
            [first, second, ..] => {
                let tied = first.1.score == second.1.score
                    && first.1.deaths == second.1.deaths;
                (!tied).then_some(*first.0)
            }
        };

        let outcome = match winner {
            Some(id) => Outcome::Winner { id },
            None => Outcome::Draw,
        };
        core.finish(outcome);

        let final_scores: Vec<ScoreEntry> = core
            .participants()
            .values()
            .filter_map(|p| {
                let state = self.players.get(&p.id)?;
                (!state.spectator).then(|| ScoreEntry {
                    id: p.id,
                    name: p.name.clone(),
                    score: state.score,
                    kills: state.kills,
                    deaths: state.deaths,
                })
            })
            .collect();
        let winner_score = winner
            .and_then(|id| self.players.get(&id))
            .map(|p| p.score)
            .unwrap_or(0);

        info!(?winner, "match over");
        out.broadcast(Notification::MatchEnded {
            winner,
            winner_name: winner.and_then(|id| core.name_of(id)),
            winner_score,
            final_scores,
        });
    }
}

impl GameMode for ArenaGame {
    fn tick_interval(&self) -> Option<Duration> {
        Some(Duration::from_secs(1) / TICK_RATE)
    }

    fn on_start(&mut self, core: &mut RoomCore, now: Instant, out: &mut Outbox) {
        self.projectiles.clear();
        self.respawns.clear();
        self.inputs.clear();
        self.next_projectile_id = 0;

        let ids: Vec<ParticipantId> = core.participants().keys().copied().collect();
        self.players.clear();
        for id in ids {
            let position = self.spawn_point();
            self.players
                .insert(id, ArenaPlayer::spawned(position, self.config.max_health));
        }

        self.clock.start(now);
        self.running = true;
        self.timer = self.config.match_duration;
        out.broadcast(Notification::MatchStarted {
            match_duration: self.config.match_duration,
            score_limit: self.config.score_limit,
        });
    }

    fn after_join(&mut self, core: &mut RoomCore, id: ParticipantId, _out: &mut Outbox) {
        if core.phase() == Phase::Playing && self.running {
            // Mid-match joiners watch until the next start
            let position = self.spawn_point();
            let mut player = ArenaPlayer::spawned(position, self.config.max_health);
            player.spectator = true;
            player.alive = false;
            self.players.insert(id, player);
        }
    }

    fn after_leave(&mut self, core: &mut RoomCore, id: ParticipantId, out: &mut Outbox) {
        self.players.remove(&id);
        self.inputs.remove(id);
        self.respawns.retain(|r| r.id != id);

        if self.running
            && core.phase() == Phase::Playing
            && core.len() < core.config().min_participants
        {
            // Not enough players left to contest the match
            self.end_match(core, out);
        }
    }

    fn handle(
        &mut self,
        core: &mut RoomCore,
        from: ParticipantId,
        command: ClientCommand,
        now: Instant,
        _out: &mut Outbox,
    ) -> Result<(), ActionError> {
        match command {
            ClientCommand::Move(mv) => {
                if core.phase() != Phase::Playing {
                    return Err(ActionError::InvalidPhase);
                }
                self.buffer_move(from, mv)
            }
            ClientCommand::StopMove => {
                if core.phase() != Phase::Playing {
                    return Err(ActionError::InvalidPhase);
                }
                self.inputs.add_input(from, ArenaInput::Stop);
                Ok(())
            }
            ClientCommand::Fire { heading } => self.fire(core, from, heading, now),
            ClientCommand::UpdateSettings { .. } => Err(ActionError::Validation(
                "not supported in this mode".into(),
            )),
            _ => Err(ActionError::Validation("unsupported command".into())),
        }
    }

    fn on_tick(&mut self, core: &mut RoomCore, now: Instant, out: &mut Outbox) {
        if !self.running || core.phase() != Phase::Playing {
            return;
        }

        // Fixed pipeline order: inputs, clock, movement, respawns,
        // projectiles
        let mut buffered: Vec<(ParticipantId, ArenaInput)> = Vec::new();
        self.inputs
            .process_inputs(now, |id, input| buffered.push((id, input)));
        for (id, input) in buffered {
            self.apply_input(id, input);
        }

        let step = self.clock.tick(now);
        if let Some(timer) = step.publish {
            self.timer = timer;
        }
        if step.expired {
            self.end_match(core, out);
            return;
        }

        self.integrate_players();
        self.process_respawns(now, core, out);
        self.step_projectiles(now, core, out);
    }

    fn snapshot(&self, _core: &RoomCore) -> ModeSnapshot {
        let players = self
            .players
            .iter()
            .map(|(id, p)| ArenaPlayerView {
                id: *id,
                position: p.position.into(),
                velocity: p.velocity.into(),
                heading: p.heading,
                health: p.health,
                score: p.score,
                kills: p.kills,
                deaths: p.deaths,
                alive: p.alive,
                spectator: p.spectator,
            })
            .collect();
        let projectiles = self
            .projectiles
            .iter()
            .map(|(id, p)| ProjectileView {
                id: *id,
                position: p.position.into(),
                velocity: p.velocity.into(),
                heading: p.heading,
                owner: p.owner,
            })
            .collect();

        ModeSnapshot::Arena(ArenaView {
            match_timer: if self.running { self.timer } else { 0 },
            score_limit: self.config.score_limit,
            arena_width: self.config.width,
            arena_height: self.config.height,
            move_speed: self.config.move_speed,
            projectile_speed: self.config.projectile_speed,
            fire_cooldown: self.config.fire_cooldown.as_secs_f32(),
            respawn_delay: self.config.respawn_delay as f32,
            players,
            projectiles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::core::{JoinOptions, RoomConfig};

    const DT: Duration = Duration::from_micros(1_000_000 / 60);

    fn config() -> ArenaConfig {
        ArenaConfig {
            match_duration: 60,
            score_limit: 3,
            ..Default::default()
        }
    }

    fn playing_room(n: usize) -> (RoomCore, ArenaGame, Vec<ParticipantId>, Instant) {
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

        let mut mode = ArenaGame::with_seed(config(), 0x5eed);
        let mut out = Outbox::new();
        let t0 = Instant::now();
        mode.on_start(&mut core, t0, &mut out);
        (core, mode, ids, t0)
    }

    fn run_ticks(
        mode: &mut ArenaGame,
        core: &mut RoomCore,
        t0: Instant,
        from_tick: u32,
        count: u32,
        out: &mut Outbox,
    ) -> u32 {
        for i in 0..count {
            let now = t0 + DT * (from_tick + i + 1);
            mode.on_tick(core, now, out);
            if core.phase() != Phase::Playing {
                return from_tick + i + 1;
            }
        }
        from_tick + count
    }

    /// Park everyone far from the firing line so stray projectiles cannot
    /// land accidental hits.
    fn place_players(mode: &mut ArenaGame, at: &[(ParticipantId, Vec2)]) {
        for (id, position) in at {
            let player = mode.players.get_mut(id).unwrap();
            player.position = *position;
            player.velocity = Vec2::ZERO;
            player.move_target = None;
        }
    }

    #[test]
    fn test_start_spawns_everyone_in_bounds() {
        let (_core, mode, ids, _t0) = playing_room(4);
        assert_eq!(mode.players.len(), 4);
        for id in &ids {
            let p = &mode.players[id];
            assert!(p.alive);
            assert!(!p.spectator);
            assert!(p.position.x >= 0.0 && p.position.x <= mode.config.width);
            assert!(p.position.y >= 0.0 && p.position.y <= mode.config.height);
        }
    }

    #[test]
    fn test_movement_is_throttled_and_clamped() {
        let (mut core, mut mode, ids, t0) = playing_room(2);
        place_players(
            &mut mode,
            &[(ids[0], Vec2::new(10.0, 10.0)), (ids[1], Vec2::new(800.0, 450.0))],
        );

        mode.handle(
            &mut core,
            ids[0],
            ClientCommand::Move(MoveCommand {
                direction: Some([-1.0, 0.0]),
                ..Default::default()
            }),
            t0,
            &mut Outbox::new(),
        )
        .unwrap();

        let mut out = Outbox::new();
        run_ticks(&mut mode, &mut core, t0, 0, 30, &mut out);

        // Pushing into the wall keeps the player on the boundary
        let p = &mode.players[&ids[0]];
        assert_eq!(p.position.x, 0.0);
        assert!(p.position.y >= 0.0);
    }

    #[test]
    fn test_target_steering_snaps_and_stops() {
        let (mut core, mut mode, ids, t0) = playing_room(2);
        place_players(
            &mut mode,
            &[(ids[0], Vec2::new(100.0, 100.0)), (ids[1], Vec2::new(1500.0, 800.0))],
        );

        mode.handle(
            &mut core,
            ids[0],
            ClientCommand::Move(MoveCommand {
                target: Some([150.0, 100.0]),
                ..Default::default()
            }),
            t0,
            &mut Outbox::new(),
        )
        .unwrap();

        let mut out = Outbox::new();
        // 50 units at 220 u/s is under 0.25s; give it a full second
        run_ticks(&mut mode, &mut core, t0, 0, 60, &mut out);

        let p = &mode.players[&ids[0]];
        assert_eq!(p.position, Vec2::new(150.0, 100.0));
        assert_eq!(p.velocity, Vec2::ZERO);
        assert_eq!(p.move_target, None);
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let (mut core, mut mode, ids, t0) = playing_room(2);
        let err = mode
            .handle(
                &mut core,
                ids[0],
                ClientCommand::Move(MoveCommand {
                    direction: Some([f32::NAN, 0.0]),
                    ..Default::default()
                }),
                t0,
                &mut Outbox::new(),
            )
            .unwrap_err();
        assert!(matches!(err, ActionError::Validation(_)));

        let err = mode
            .handle(
                &mut core,
                ids[0],
                ClientCommand::Fire {
                    heading: f32::INFINITY,
                },
                t0,
                &mut Outbox::new(),
            )
            .unwrap_err();
        assert!(matches!(err, ActionError::Validation(_)));
    }

    #[test]
    fn test_fire_cooldown_drops_silently() {
        let (mut core, mut mode, ids, t0) = playing_room(2);
        place_players(
            &mut mode,
            &[(ids[0], Vec2::new(100.0, 100.0)), (ids[1], Vec2::new(1500.0, 800.0))],
        );

        mode.handle(&mut core, ids[0], ClientCommand::Fire { heading: 0.0 }, t0, &mut Outbox::new())
            .unwrap();
        assert_eq!(mode.projectiles.len(), 1);

        // Second shot inside the cooldown: accepted, no projectile
        mode.handle(
            &mut core,
            ids[0],
            ClientCommand::Fire { heading: 0.0 },
            t0 + Duration::from_millis(100),
            &mut Outbox::new(),
        )
        .unwrap();
        assert_eq!(mode.projectiles.len(), 1);

        mode.handle(
            &mut core,
            ids[0],
            ClientCommand::Fire { heading: 0.0 },
            t0 + Duration::from_millis(600),
            &mut Outbox::new(),
        )
        .unwrap();
        assert_eq!(mode.projectiles.len(), 2);
    }

    #[test]
    fn test_projectile_hit_kill_and_respawn() {
        let (mut core, mut mode, ids, t0) = playing_room(2);
        let (shooter, victim) = (ids[0], ids[1]);
        place_players(
            &mut mode,
            &[(shooter, Vec2::new(100.0, 100.0)), (victim, Vec2::new(250.0, 100.0))],
        );

        // 100 damage needs 5 hits at 20 per projectile
        let mut out = Outbox::new();
        let mut tick = 0;
        for shot in 0..5u32 {
            let fire_at = t0 + Duration::from_millis(u64::from(shot) * 600);
            mode.fire(&core, shooter, 0.0, fire_at).unwrap();
            // Re-pin positions; the victim must stay on the firing line
            if mode.players[&victim].alive {
                place_players(&mut mode, &[(victim, Vec2::new(250.0, 100.0))]);
            }
            tick = run_ticks(&mut mode, &mut core, t0, tick, 40, &mut out);
        }

        let v = &mode.players[&victim];
        let s = &mode.players[&shooter];
        assert_eq!(v.deaths, 1);
        assert_eq!(s.kills, 1);
        assert_eq!(s.score, 1);
        assert!(out.drain().any(|o| matches!(
            o.notification,
            Notification::PlayerKilled { victim: v, killer: Some(k), .. } if v == victim && k == shooter
        )));

        // Respawn comes due after the delay
        let mut out = Outbox::new();
        run_ticks(&mut mode, &mut core, t0, tick, 60 * 4, &mut out);
        assert!(mode.players[&victim].alive);
        assert_eq!(mode.players[&victim].health, mode.config.max_health);
        assert!(out.drain().any(|o| matches!(
            o.notification,
            Notification::PlayerRespawned { player_id, .. } if player_id == victim
        )));
    }

    #[test]
    fn test_projectile_expires_after_lifetime() {
        let (mut core, mut mode, ids, t0) = playing_room(2);
        // Slow, long-lived projectile that stays in bounds for the whole
        // lifetime window
        mode.config.projectile_speed = 10.0;
        place_players(
            &mut mode,
            &[(ids[0], Vec2::new(100.0, 450.0)), (ids[1], Vec2::new(1500.0, 100.0))],
        );

        mode.fire(&core, ids[0], 0.0, t0).unwrap();
        let mut out = Outbox::new();

        // Alive just before the lifetime elapses
        let tick = run_ticks(&mut mode, &mut core, t0, 0, 110, &mut out);
        assert_eq!(mode.projectiles.len(), 1);

        run_ticks(&mut mode, &mut core, t0, tick, 20, &mut out);
        assert!(mode.projectiles.is_empty());
    }

    #[test]
    fn test_own_projectile_never_hits_shooter() {
        let (mut core, mut mode, ids, t0) = playing_room(2);
        place_players(
            &mut mode,
            &[(ids[0], Vec2::new(100.0, 100.0)), (ids[1], Vec2::new(1500.0, 800.0))],
        );

        // Fire straight at a wall; the projectile passes over the shooter's
        // own hit circle on frame one
        mode.fire(&core, ids[0], std::f32::consts::PI, t0).unwrap();
        let mut out = Outbox::new();
        run_ticks(&mut mode, &mut core, t0, 0, 30, &mut out);

        assert_eq!(mode.players[&ids[0]].health, mode.config.max_health);
    }

    #[test]
    fn test_score_limit_ends_match() {
        let (mut core, mut mode, ids, t0) = playing_room(2);
        let (shooter, victim) = (ids[0], ids[1]);

        // Jump straight to the brink, then land one more kill
        mode.players.get_mut(&shooter).unwrap().score = 2;
        mode.players.get_mut(&shooter).unwrap().kills = 2;
        place_players(
            &mut mode,
            &[(shooter, Vec2::new(100.0, 100.0)), (victim, Vec2::new(250.0, 100.0))],
        );
        mode.players.get_mut(&victim).unwrap().health = mode.config.projectile_damage;

        let mut out = Outbox::new();
        mode.fire(&core, shooter, 0.0, t0).unwrap();
        run_ticks(&mut mode, &mut core, t0, 0, 40, &mut out);

        assert_eq!(core.phase(), Phase::Finished);
        assert_eq!(core.outcome(), Some(Outcome::Winner { id: shooter }));
        let ended = out
            .drain()
            .find(|o| matches!(o.notification, Notification::MatchEnded { .. }))
            .expect("match_ended notification");
        match ended.notification {
            Notification::MatchEnded {
                winner,
                winner_score,
                final_scores,
                ..
            } => {
                assert_eq!(winner, Some(shooter));
                assert_eq!(winner_score, 3);
                assert_eq!(final_scores.len(), 2);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_timer_expiry_applies_tiebreaks() {
        let (mut core, mut mode, ids, t0) = playing_room(3);
        place_players(
            &mut mode,
            &[
                (ids[0], Vec2::new(100.0, 100.0)),
                (ids[1], Vec2::new(800.0, 450.0)),
                (ids[2], Vec2::new(1500.0, 800.0)),
            ],
        );

        // Equal scores; fewest deaths takes it
        for (i, id) in ids.iter().enumerate() {
            let p = mode.players.get_mut(id).unwrap();
            p.score = 5;
            p.deaths = i as u32;
        }

        let mut out = Outbox::new();
        let after_end = t0 + Duration::from_secs(61);
        mode.on_tick(&mut core, after_end, &mut out);

        assert_eq!(core.phase(), Phase::Finished);
        assert_eq!(core.outcome(), Some(Outcome::Winner { id: ids[0] }));
    }

    #[test]
    fn test_identical_records_draw() {
        let (mut core, mut mode, _ids, t0) = playing_room(2);

        let mut out = Outbox::new();
        mode.on_tick(&mut core, t0 + Duration::from_secs(61), &mut out);

        assert_eq!(core.phase(), Phase::Finished);
        assert_eq!(core.outcome(), Some(Outcome::Draw));
    }

    #[test]
    fn test_mid_match_joiner_spectates() {
        let (mut core, mut mode, _ids, t0) = playing_room(2);

        let late = ParticipantId::random();
        core.join(JoinOptions {
            id: late,
            name: "late".into(),
            avatar: String::new(),
            password: None,
        })
        .unwrap();
        let mut out = Outbox::new();
        mode.after_join(&mut core, late, &mut out);

        let p = &mode.players[&late];
        assert!(p.spectator);
        assert!(!p.alive);

        // Spectators cannot fire
        let err = mode
            .fire(&core, late, 0.0, t0 + Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(err, ActionError::InvalidPhase);

        // A spectator's record is excluded from the leaderboard
        mode.on_tick(&mut core, t0 + Duration::from_secs(61), &mut out);
        let ended = out
            .drain()
            .find(|o| matches!(o.notification, Notification::MatchEnded { .. }))
            .expect("match_ended notification");
        if let Notification::MatchEnded { final_scores, .. } = ended.notification {
            assert!(final_scores.iter().all(|s| s.id != late));
        }
    }

    #[test]
    fn test_leave_below_minimum_ends_match() {
        let (mut core, mut mode, ids, _t0) = playing_room(2);

        core.leave(ids[1]).unwrap();
        let mut out = Outbox::new();
        mode.after_leave(&mut core, ids[1], &mut out);

        assert_eq!(core.phase(), Phase::Finished);
        // Sole remaining player takes the match
        assert_eq!(core.outcome(), Some(Outcome::Winner { id: ids[0] }));
        assert!(!mode.running);
    }

    #[test]
    fn test_stale_generation_respawn_never_fires() {
        let (mut core, mut mode, ids, t0) = playing_room(2);

        // A deadline left over from a previous match generation
        mode.players.get_mut(&ids[1]).unwrap().alive = false;
        mode.respawns.push(PendingRespawn {
            id: ids[1],
            due_at: 0.0,
            generation: mode.clock.generation() - 1,
        });

        let mut out = Outbox::new();
        run_ticks(&mut mode, &mut core, t0, 0, 10, &mut out);

        assert!(!mode.players[&ids[1]].alive);
        assert!(mode.respawns.is_empty());
        assert!(!out
            .drain()
            .any(|o| matches!(o.notification, Notification::PlayerRespawned { .. })));
    }

    #[test]
    fn test_restart_clears_previous_match_state() {
        let (mut core, mut mode, ids, t0) = playing_room(2);
        mode.fire(&core, ids[0], 0.0, t0).unwrap();
        mode.players.get_mut(&ids[0]).unwrap().score = 7;

        core.finish(Outcome::Draw);
        core.vote_rematch(ids[0]).unwrap();
        core.vote_rematch(ids[1]).unwrap();

        let mut out = Outbox::new();
        let t1 = t0 + Duration::from_secs(120);
        mode.on_start(&mut core, t1, &mut out);

        assert!(mode.projectiles.is_empty());
        assert!(mode.respawns.is_empty());
        assert_eq!(mode.players[&ids[0]].score, 0);
        assert!(mode.players.values().all(|p| p.alive && !p.spectator));
        assert_eq!(mode.clock.remaining_secs(t1), 60);
    }
}
