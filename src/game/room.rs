//! Room server: one isolated match with its own physics world and connections
//!
//! `Room` is the synchronous core (handlers + tick). `RoomTask` is the actor
//! that owns a `Room` and serialises ticks and inbound commands on one tokio
//! task, so the world and match state need no locks. `RoomRegistry` maps room
//! names to actor handles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::util::time::{tick_interval, unix_millis, Timer, SNAPSHOT_INTERVAL_MICROS};
use crate::ws::protocol::{
    BodyState, ClientMsg, Keys, MatchPhase, Score, SimConfig, Snapshot, Team,
};

use super::kick::{dribble, kick_impulse, KickParams};
use super::physics::{BodyHandle, BodyKind, PhysicsWorld};
use super::r#match::{MatchRules, MatchState};
use super::snapshot::SnapshotBuilder;

/// Where a body waits before its connection has joined a team, in pixels
const IDLE_SPAWN_X_PX: f32 = 200.0;

/// Per-connection bookkeeping
#[derive(Debug, Default)]
struct Connection {
    /// Kick control state from the last accepted input (edge detection)
    kick_held: bool,
    spectating: bool,
}

/// The authoritative state of one room
pub struct Room {
    id: String,
    config: Arc<SimConfig>,
    kick: KickParams,
    world: PhysicsWorld,
    ball: BodyHandle,
    state: MatchState,
    connections: HashMap<Uuid, Connection>,
    bodies: HashMap<Uuid, BodyHandle>,
    snapshot_builder: SnapshotBuilder,
}

impl Room {
    pub fn new(id: impl Into<String>, config: Arc<SimConfig>, rules: MatchRules) -> Self {
        let mut world = PhysicsWorld::arena(&config);
        let (cx, cy) = config.centre();
        let ball = world.create_body(BodyKind::Ball, config.ball_radius, cx, cy);

        Self {
            id: id.into(),
            kick: KickParams::from_config(&config),
            config,
            world,
            ball,
            state: MatchState::new(rules),
            connections: HashMap::new(),
            bodies: HashMap::new(),
            snapshot_builder: SnapshotBuilder::new(SNAPSHOT_INTERVAL_MICROS),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn phase(&self) -> MatchPhase {
        self.state.phase()
    }

    pub fn score(&self) -> Score {
        self.state.score()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn body_state(&self, conn_id: &Uuid) -> Option<BodyState> {
        self.bodies
            .get(conn_id)
            .and_then(|handle| self.world.body_state(*handle))
    }

    pub fn ball_state(&self) -> BodyState {
        self.world.body_state(self.ball).unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// A connection opened: give it a body and maybe the tentative host seat
    pub fn on_connect(&mut self, conn_id: Uuid) {
        if self.connections.contains_key(&conn_id) {
            return;
        }
        self.connections.insert(conn_id, Connection::default());
        self.spawn_body(conn_id);
        self.state.on_connect(conn_id);

        info!(
            room_id = %self.id,
            conn_id = %conn_id,
            connections = self.connections.len(),
            "Connection opened"
        );
    }

    /// A connection closed: its body leaves the world immediately
    pub fn on_close(&mut self, conn_id: Uuid) {
        if self.connections.remove(&conn_id).is_none() {
            return;
        }
        self.despawn_body(&conn_id);
        self.state
            .on_disconnect(&conn_id, self.connections.keys().copied());

        info!(
            room_id = %self.id,
            conn_id = %conn_id,
            connections = self.connections.len(),
            "Connection closed"
        );
    }

    /// Dispatch one decoded client message. Returns a snapshot to broadcast
    /// immediately when the message changed the match phase.
    pub fn on_message(&mut self, conn_id: Uuid, msg: ClientMsg, now: u64) -> Option<Arc<Snapshot>> {
        if !self.connections.contains_key(&conn_id) {
            debug!(room_id = %self.id, conn_id = %conn_id, "Message from unknown connection");
            return None;
        }

        let kick = msg.kick_held();
        match msg {
            ClientMsg::Join {
                team,
                team_size,
                player_key,
                wallet,
                ..
            } => {
                let key = player_key
                    .or(wallet)
                    .unwrap_or_else(|| conn_id.to_string());
                self.handle_join(conn_id, &key, team, team_size);
                None
            }
            ClientMsg::ClaimHost { wallet } => {
                self.state.claim_host(wallet.as_deref());
                None
            }
            ClientMsg::Start {
                duration_min,
                wallet,
            } => self.handle_start(conn_id, wallet.as_deref(), duration_min, now),
            ClientMsg::Inputs { keys, .. } => {
                self.handle_inputs(conn_id, keys, kick);
                None
            }
            ClientMsg::Spectate => {
                self.handle_spectate(conn_id);
                None
            }
        }
    }

    /// Seat a connection under `player_key`. A connection already playing
    /// under the same key is a stale session: it loses its body and watches.
    fn handle_join(
        &mut self,
        conn_id: Uuid,
        player_key: &str,
        preferred: Option<Team>,
        team_size: Option<u32>,
    ) {
        self.state.apply_join_capacity(team_size);

        if let Some(stale) = self.state.bind_player(conn_id, player_key) {
            self.despawn_body(&stale);
            if let Some(conn) = self.connections.get_mut(&stale) {
                conn.spectating = true;
                conn.kick_held = false;
            }
            info!(room_id = %self.id, conn_id = %conn_id, stale = %stale, "Player reconnected");
        }

        if let Some(conn) = self.connections.get_mut(&conn_id) {
            conn.spectating = false;
        }
        if !self.bodies.contains_key(&conn_id) {
            self.spawn_body(conn_id);
        }

        let team = self.state.assign_team(conn_id, preferred);
        self.place_at_spawn(&conn_id);

        info!(
            room_id = %self.id,
            conn_id = %conn_id,
            team = ?team,
            red = self.state.team_count(Team::Red),
            blue = self.state.team_count(Team::Blue),
            "Player joined"
        );
    }

    fn handle_spectate(&mut self, conn_id: Uuid) {
        if let Some(conn) = self.connections.get_mut(&conn_id) {
            conn.spectating = true;
            conn.kick_held = false;
        }
        self.despawn_body(&conn_id);
        self.state.leave_team(&conn_id);
        debug!(room_id = %self.id, conn_id = %conn_id, "Connection is spectating");
    }

    fn handle_start(
        &mut self,
        conn_id: Uuid,
        wallet: Option<&str>,
        duration_min: Option<u32>,
        now: u64,
    ) -> Option<Arc<Snapshot>> {
        if !self.state.request_start(&conn_id, wallet, duration_min, now) {
            return None;
        }

        self.reset_positions();
        for conn in self.connections.values_mut() {
            conn.kick_held = false;
        }
        self.snapshot_builder.reset();

        info!(room_id = %self.id, conn_id = %conn_id, "Kickoff");
        Some(Arc::new(self.snapshot(now)))
    }

    /// Direct actuation: velocity is set from the key flags, not blended.
    /// Kicks fire on the rising edge of the kick control.
    fn handle_inputs(&mut self, conn_id: Uuid, keys: Keys, kick: bool) {
        if !self.state.is_playing() {
            trace!(room_id = %self.id, conn_id = %conn_id, "Inputs outside play ignored");
            return;
        }
        if self
            .connections
            .get(&conn_id)
            .map_or(true, |conn| conn.spectating)
        {
            return;
        }
        let Some(&body) = self.bodies.get(&conn_id) else {
            return;
        };

        let mut dx: f32 = 0.0;
        let mut dy: f32 = 0.0;
        if keys.w {
            dy -= 1.0;
        }
        if keys.s {
            dy += 1.0;
        }
        if keys.a {
            dx -= 1.0;
        }
        if keys.d {
            dx += 1.0;
        }
        let len = dx.hypot(dy);
        if len > 0.0 {
            let speed = self.config.move_speed;
            self.world
                .set_velocity(body, dx / len * speed, dy / len * speed);
        }

        let pressed = match self.connections.get_mut(&conn_id) {
            Some(conn) => {
                let pressed = kick && !conn.kick_held;
                conn.kick_held = kick;
                pressed
            }
            None => false,
        };
        if pressed {
            self.try_kick(body);
        }
    }

    fn try_kick(&mut self, player: BodyHandle) {
        let (Some(player_pos), Some(ball_pos)) =
            (self.world.position(player), self.world.position(self.ball))
        else {
            return;
        };

        if let Some((ix, iy)) = kick_impulse(player_pos, ball_pos, &self.kick) {
            self.world.apply_impulse(self.ball, ix, iy);
            trace!(room_id = %self.id, ix, iy, "Kick");
        }
    }

    /// Players running into the ball carry it instead of bouncing it away
    fn apply_dribble(&mut self) {
        let (Some(ball), Some(ball_velocity)) =
            (self.world.position(self.ball), self.world.velocity(self.ball))
        else {
            return;
        };
        let players: Vec<_> = self
            .bodies
            .values()
            .filter_map(|&body| Some((self.world.position(body)?, self.world.velocity(body)?)))
            .collect();

        let touch = dribble(ball, ball_velocity, players, &self.kick);
        if let Some((x, y)) = touch.position {
            self.world.set_position(self.ball, x, y);
        }
        if let Some((vx, vy)) = touch.velocity {
            self.world.set_velocity(self.ball, vx, vy);
        }
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// One fixed-rate tick. Returns the snapshot to broadcast, if one is due.
    pub fn tick(&mut self, now: u64, elapsed_micros: u64) -> Option<Arc<Snapshot>> {
        if self.state.is_playing() {
            self.world.step();
            self.apply_dribble();

            if let Some(side) = self.detect_goal() {
                self.state.record_goal(side);
                self.reset_positions();
            }

            if self.state.check_deadline(now) {
                info!(room_id = %self.id, winner = ?self.state.winner(), "Final whistle");
            }
        }

        self.snapshot_builder
            .should_send(elapsed_micros)
            .then(|| Arc::new(self.snapshot(now)))
    }

    /// The side credited when the whole ball is past a goal line inside the
    /// goal band: the left line counts for red, the right line for blue.
    fn detect_goal(&self) -> Option<Team> {
        let (x, y) = self.world.position(self.ball)?;
        let (top, bottom) = self.config.goal_band();
        if y <= top || y >= bottom {
            return None;
        }

        let r = self.config.ball_radius;
        if x + r < 0.0 {
            Some(Team::Red)
        } else if x - r > self.config.width {
            Some(Team::Blue)
        } else {
            None
        }
    }

    /// Ball to the centre spot, every body to its kickoff slot
    fn reset_positions(&mut self) {
        let (cx, cy) = self.config.centre();
        self.world.reset_body(self.ball, cx, cy);

        let ids: Vec<Uuid> = self.bodies.keys().copied().collect();
        for id in ids {
            self.place_at_spawn(&id);
        }
    }

    fn place_at_spawn(&mut self, conn_id: &Uuid) {
        let Some(&body) = self.bodies.get(conn_id) else {
            return;
        };
        let (x, y) = self
            .state
            .spawn_position(conn_id, &self.config)
            .unwrap_or_else(|| self.idle_spawn());
        self.world.reset_body(body, x, y);
    }

    fn idle_spawn(&self) -> (f32, f32) {
        (self.config.from_pixels(IDLE_SPAWN_X_PX), self.config.height / 2.0)
    }

    fn spawn_body(&mut self, conn_id: Uuid) {
        let (x, y) = self.idle_spawn();
        let body = self
            .world
            .create_body(BodyKind::Player, self.config.player_radius, x, y);
        self.bodies.insert(conn_id, body);
    }

    fn despawn_body(&mut self, conn_id: &Uuid) {
        if let Some(body) = self.bodies.remove(conn_id) {
            self.world.remove_body(body);
        }
    }

    /// Current state as a snapshot (recipient left unset)
    pub fn snapshot(&self, now: u64) -> Snapshot {
        self.snapshot_builder
            .build(now, &self.state, &self.world, &self.bodies, self.ball)
    }
}

// ============================================================================
// Actor
// ============================================================================

/// Commands delivered to a room's task
#[derive(Debug)]
pub enum RoomCommand {
    Connect { conn_id: Uuid },
    Message { conn_id: Uuid, msg: ClientMsg },
    Close { conn_id: Uuid },
}

/// Cloneable handle to a running room
#[derive(Clone)]
pub struct RoomHandle {
    pub id: String,
    pub config: Arc<SimConfig>,
    commands: mpsc::Sender<RoomCommand>,
    snapshots: broadcast::Sender<Arc<Snapshot>>,
    connections: Arc<AtomicUsize>,
}

impl RoomHandle {
    /// Register a connection; the receiver yields every broadcast snapshot
    pub async fn connect(&self, conn_id: Uuid) -> Option<broadcast::Receiver<Arc<Snapshot>>> {
        let rx = self.snapshots.subscribe();
        self.commands
            .send(RoomCommand::Connect { conn_id })
            .await
            .ok()?;
        Some(rx)
    }

    /// Forward a decoded message. Returns false if the room task is gone.
    pub async fn send(&self, conn_id: Uuid, msg: ClientMsg) -> bool {
        self.commands
            .send(RoomCommand::Message { conn_id, msg })
            .await
            .is_ok()
    }

    pub async fn close(&self, conn_id: Uuid) {
        let _ = self.commands.send(RoomCommand::Close { conn_id }).await;
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }
}

/// The task that owns a `Room`
pub struct RoomTask {
    room: Room,
    commands: mpsc::Receiver<RoomCommand>,
    snapshots: broadcast::Sender<Arc<Snapshot>>,
    connections: Arc<AtomicUsize>,
}

impl RoomTask {
    pub fn new(id: &str, config: Arc<SimConfig>, rules: MatchRules) -> (Self, RoomHandle) {
        let (command_tx, command_rx) = mpsc::channel(256);
        let (snapshot_tx, _) = broadcast::channel(64);
        let connections = Arc::new(AtomicUsize::new(0));

        let handle = RoomHandle {
            id: id.to_string(),
            config: config.clone(),
            commands: command_tx,
            snapshots: snapshot_tx.clone(),
            connections: connections.clone(),
        };

        let task = Self {
            room: Room::new(id, config, rules),
            commands: command_rx,
            snapshots: snapshot_tx,
            connections,
        };

        (task, handle)
    }

    /// Create a room and start its loop on the current runtime
    pub fn spawn(id: &str, config: Arc<SimConfig>, rules: MatchRules) -> RoomHandle {
        let (task, handle) = Self::new(id, config, rules);
        tokio::spawn(task.run());
        handle
    }

    /// Tick at a fixed interval and apply commands in between, one at a time.
    /// Late ticks are skipped rather than replayed; the timestep stays fixed.
    pub async fn run(mut self) {
        info!(room_id = %self.room.id(), "Room loop started");

        let mut ticker = interval(tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut timer = Timer::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let elapsed = timer.lap_micros();
                    if let Some(snapshot) = self.room.tick(unix_millis(), elapsed) {
                        self.broadcast(snapshot);
                    }
                }
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle(command),
                        None => break,
                    }
                }
            }
        }

        info!(room_id = %self.room.id(), "Room loop stopped");
    }

    fn handle(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Connect { conn_id } => self.room.on_connect(conn_id),
            RoomCommand::Message { conn_id, msg } => {
                if let Some(snapshot) = self.room.on_message(conn_id, msg, unix_millis()) {
                    self.broadcast(snapshot);
                }
            }
            RoomCommand::Close { conn_id } => self.room.on_close(conn_id),
        }
        self.connections
            .store(self.room.connection_count(), Ordering::Relaxed);
    }

    /// Fire-and-forget fan-out; no receivers is not an error
    fn broadcast(&self, snapshot: Arc<Snapshot>) {
        let _ = self.snapshots.send(snapshot);
    }
}

// ============================================================================
// Registry
// ============================================================================

/// All rooms of this process, by name.
///
/// Rooms are never evicted: each distinct name spawns a task that lives until
/// shutdown, so the registry grows with the number of names ever requested.
/// Deployments that accept arbitrary room names should bound them upstream.
pub struct RoomRegistry {
    rooms: DashMap<String, RoomHandle>,
    config: Arc<SimConfig>,
    rules: MatchRules,
}

impl RoomRegistry {
    pub fn new(config: SimConfig, rules: MatchRules) -> Self {
        Self {
            rooms: DashMap::new(),
            config: Arc::new(config),
            rules,
        }
    }

    pub fn get(&self, id: &str) -> Option<RoomHandle> {
        self.rooms.get(id).map(|r| r.value().clone())
    }

    /// The room named `id`, spawning it on first use
    pub fn get_or_create(&self, id: &str) -> RoomHandle {
        self.rooms
            .entry(id.to_string())
            .or_insert_with(|| {
                info!(room_id = %id, "Creating room");
                RoomTask::spawn(id, self.config.clone(), self.rules)
            })
            .value()
            .clone()
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_connections(&self) -> usize {
        self.rooms
            .iter()
            .map(|r| r.value().connection_count())
            .sum()
    }
}
