//! Match state machine: phase, score, deadline, host arbitration and rosters
//!
//! Pure bookkeeping for one room. Bodies live in the physics world and are
//! moved by the room; this module only decides *where* they go and *whether*
//! a command is allowed.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};
use uuid::Uuid;

use crate::ws::protocol::{MatchPhase, Score, SimConfig, Team, Winner};

pub const DEFAULT_TEAM_CAPACITY: usize = 3;
pub const DEFAULT_MATCH_MINUTES: u32 = 3;

/// Spawn grid layout, in pixels
const SPAWN_MARGIN_PX: f32 = 80.0;
const SPAWN_SPACING_PX: f32 = 40.0;
const SPAWN_ROW_GAP_PX: f32 = 60.0;

/// Per-room defaults, overridable by the first join / the start command
#[derive(Debug, Clone, Copy)]
pub struct MatchRules {
    pub team_capacity: usize,
    pub duration_min: u32,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            team_capacity: DEFAULT_TEAM_CAPACITY,
            duration_min: DEFAULT_MATCH_MINUTES,
        }
    }
}

/// Match state (owned by the room)
#[derive(Debug)]
pub struct MatchState {
    phase: MatchPhase,
    score: Score,
    /// Unix millis at which a running match ends
    deadline: Option<u64>,
    host_wallet: Option<String>,
    tentative_host: Option<Uuid>,
    team_capacity: usize,
    capacity_locked: bool,
    /// Player key each seated connection plays under
    players: HashMap<Uuid, String>,
    /// Team by player key; outlives the connection so a rejoin keeps its side
    team_by_player: HashMap<String, Team>,
    last_goal: Option<Team>,
    default_duration_min: u32,
}

impl MatchState {
    pub fn new(rules: MatchRules) -> Self {
        Self {
            phase: MatchPhase::Waiting,
            score: Score::default(),
            deadline: None,
            host_wallet: None,
            tentative_host: None,
            team_capacity: rules.team_capacity.max(1),
            capacity_locked: false,
            players: HashMap::new(),
            team_by_player: HashMap::new(),
            last_goal: None,
            default_duration_min: rules.duration_min.max(1),
        }
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn is_playing(&self) -> bool {
        self.phase == MatchPhase::Playing
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    pub fn team_capacity(&self) -> usize {
        self.team_capacity
    }

    pub fn host_wallet(&self) -> Option<&str> {
        self.host_wallet.as_deref()
    }

    pub fn tentative_host(&self) -> Option<Uuid> {
        self.tentative_host
    }

    pub fn last_goal(&self) -> Option<Team> {
        self.last_goal
    }

    pub fn team_of(&self, conn_id: &Uuid) -> Option<Team> {
        let key = self.players.get(conn_id)?;
        self.team_by_player.get(key).copied()
    }

    pub fn player_key(&self, conn_id: &Uuid) -> Option<&str> {
        self.players.get(conn_id).map(String::as_str)
    }

    /// Player keys on `team` that currently have a live connection
    pub fn team_count(&self, team: Team) -> usize {
        let active: HashSet<&String> = self.players.values().collect();
        active
            .into_iter()
            .filter(|key| self.team_by_player.get(*key) == Some(&team))
            .count()
    }

    // ------------------------------------------------------------------
    // Connections & host
    // ------------------------------------------------------------------

    /// A connection opened; the first one becomes tentative host
    pub fn on_connect(&mut self, conn_id: Uuid) {
        if self.tentative_host.is_none() {
            self.tentative_host = Some(conn_id);
            debug!(conn_id = %conn_id, "Tentative host elected");
        }
    }

    /// A connection closed. `remaining` are the connections still open.
    ///
    /// While no wallet has claimed the room, the tentative host seat moves to
    /// another live connection so the room can still be started.
    pub fn on_disconnect(&mut self, conn_id: &Uuid, remaining: impl IntoIterator<Item = Uuid>) {
        self.players.remove(conn_id);

        if self.host_wallet.is_none() && self.tentative_host == Some(*conn_id) {
            self.tentative_host = remaining.into_iter().filter(|id| id != conn_id).min();
            debug!(next = ?self.tentative_host, "Tentative host handed over");
        }
    }

    /// Unbind a connection from its player (spectating). The player's team
    /// is remembered for a later join.
    pub fn leave_team(&mut self, conn_id: &Uuid) {
        self.players.remove(conn_id);
    }

    /// First non-empty wallet wins; returns whether this claim took the seat
    pub fn claim_host(&mut self, wallet: Option<&str>) -> bool {
        if self.host_wallet.is_some() {
            return false;
        }
        match wallet {
            Some(w) if !w.is_empty() => {
                self.host_wallet = Some(w.to_string());
                info!(wallet = %w, "Host claimed");
                true
            }
            _ => false,
        }
    }

    /// A claimed wallet must match; absent a claim the tentative host decides
    pub fn is_host(&self, conn_id: &Uuid, wallet: Option<&str>) -> bool {
        match &self.host_wallet {
            Some(host) => wallet == Some(host.as_str()),
            None => self.tentative_host == Some(*conn_id),
        }
    }

    // ------------------------------------------------------------------
    // Phase transitions
    // ------------------------------------------------------------------

    /// Handle a `start` command. Returns true when a match was started; the
    /// caller is then responsible for re-spawning every body.
    pub fn request_start(
        &mut self,
        conn_id: &Uuid,
        wallet: Option<&str>,
        duration_min: Option<u32>,
        now: u64,
    ) -> bool {
        if !self.is_host(conn_id, wallet) {
            debug!(conn_id = %conn_id, "Start from non-host ignored");
            return false;
        }
        if self.phase == MatchPhase::Playing {
            debug!(conn_id = %conn_id, "Start while playing ignored");
            return false;
        }

        let minutes = duration_min.unwrap_or(self.default_duration_min).max(1);
        self.score = Score::default();
        self.last_goal = None;
        self.phase = MatchPhase::Playing;
        self.deadline = Some(now + u64::from(minutes) * 60_000);

        info!(duration_min = minutes, "Match started");
        true
    }

    /// Playing -> Ended once the deadline has passed. Returns true on the
    /// transition.
    pub fn check_deadline(&mut self, now: u64) -> bool {
        match (self.phase, self.deadline) {
            (MatchPhase::Playing, Some(deadline)) if now >= deadline => {
                self.phase = MatchPhase::Ended;
                self.deadline = None;
                info!(
                    red = self.score.red,
                    blue = self.score.blue,
                    winner = ?self.score.winner(),
                    "Match ended"
                );
                true
            }
            _ => false,
        }
    }

    /// Credit a goal to `side`
    pub fn record_goal(&mut self, side: Team) {
        match side {
            Team::Red => self.score.red += 1,
            Team::Blue => self.score.blue += 1,
        }
        self.last_goal = Some(side);
        info!(side = ?side, red = self.score.red, blue = self.score.blue, "Goal");
    }

    /// Result, only once the match has ended
    pub fn winner(&self) -> Option<Winner> {
        (self.phase == MatchPhase::Ended).then(|| self.score.winner())
    }

    pub fn time_left_ms(&self, now: u64) -> u64 {
        self.deadline
            .map(|deadline| deadline.saturating_sub(now))
            .unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Teams
    // ------------------------------------------------------------------

    /// The first join the room receives may set the team capacity; later
    /// joins (or a join arriving mid-match) cannot change it.
    pub fn apply_join_capacity(&mut self, team_size: Option<u32>) {
        if self.capacity_locked {
            return;
        }
        self.capacity_locked = true;

        if let Some(size) = team_size.filter(|n| *n > 0) {
            if self.phase != MatchPhase::Playing {
                self.team_capacity = size as usize;
                debug!(team_capacity = self.team_capacity, "Team capacity set");
            }
        }
    }

    /// Bind a connection to a player key. Returns the connection that held
    /// the key before, which loses its binding (a reconnect took over).
    ///
    /// A connection switching keys carries its team to the new key when the
    /// new key has none yet.
    pub fn bind_player(&mut self, conn_id: Uuid, key: &str) -> Option<Uuid> {
        let stale = self
            .players
            .iter()
            .find(|(id, k)| **id != conn_id && k.as_str() == key)
            .map(|(id, _)| *id);
        if let Some(stale) = stale {
            self.players.remove(&stale);
            debug!(conn_id = %conn_id, stale = %stale, "Player key taken over");
        }

        if let Some(previous) = self.players.get(&conn_id).cloned() {
            if previous != key {
                if let Some(team) = self.team_by_player.remove(&previous) {
                    self.team_by_player.entry(key.to_string()).or_insert(team);
                }
            }
        }
        self.players.insert(conn_id, key.to_string());
        stale
    }

    /// Seat a connection on a team. A player's existing team is never
    /// reassigned. Unbound connections play under their own id.
    pub fn assign_team(&mut self, conn_id: Uuid, preferred: Option<Team>) -> Team {
        if !self.players.contains_key(&conn_id) {
            self.players.insert(conn_id, conn_id.to_string());
        }
        if let Some(team) = self.team_of(&conn_id) {
            return team;
        }

        let team = pick_team(
            self.team_count(Team::Red),
            self.team_count(Team::Blue),
            self.team_capacity,
            preferred,
        );
        if let Some(key) = self.players.get(&conn_id) {
            self.team_by_player.insert(key.clone(), team);
        }
        team
    }

    /// Kickoff position for a seated connection. Slots follow the order of
    /// (player key, connection id) among teammates.
    pub fn spawn_position(&self, conn_id: &Uuid, config: &SimConfig) -> Option<(f32, f32)> {
        let team = self.team_of(conn_id)?;

        let mut mates: Vec<(&str, &Uuid)> = self
            .players
            .iter()
            .filter(|(_, key)| self.team_by_player.get(*key) == Some(&team))
            .map(|(id, key)| (key.as_str(), id))
            .collect();
        mates.sort();
        let index = mates.iter().position(|(_, id)| *id == conn_id).unwrap_or(0);

        Some(spawn_slot(team, index, self.team_capacity, config))
    }
}

/// Team choice for a new player given current counts
pub fn pick_team(red: usize, blue: usize, capacity: usize, preferred: Option<Team>) -> Team {
    let red_full = red >= capacity;
    let blue_full = blue >= capacity;

    match preferred {
        Some(Team::Red) if !red_full => return Team::Red,
        Some(Team::Blue) if !blue_full => return Team::Blue,
        _ => {}
    }

    match (red_full, blue_full) {
        (true, false) => Team::Blue,
        (false, true) => Team::Red,
        _ if red <= blue => Team::Red,
        _ => Team::Blue,
    }
}

/// Grid slot `index` of a team: two rows around the centre line, columns
/// growing from the team's baseline toward midfield.
pub fn spawn_slot(team: Team, index: usize, capacity: usize, config: &SimConfig) -> (f32, f32) {
    let cols = capacity.div_ceil(2).max(1);
    let row = index / cols;
    let col = index % cols;

    let margin = config.from_pixels(SPAWN_MARGIN_PX);
    let spacing = config.from_pixels(SPAWN_SPACING_PX);
    let row_gap = config.from_pixels(SPAWN_ROW_GAP_PX);

    let x = match team {
        Team::Red => margin + col as f32 * spacing,
        Team::Blue => config.width - margin - col as f32 * spacing,
    };
    let y = if row % 2 == 0 {
        config.height / 2.0 - row_gap
    } else {
        config.height / 2.0 + row_gap
    };

    (x, y)
}
