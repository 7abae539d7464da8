//! Client-side snapshot buffer and interpolation
//!
//! Snapshots are buffered in server time and rendered `INTERPOLATION_DELAY_MS`
//! behind the newest, so that two bracketing samples are usually available
//! despite network jitter.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::ws::protocol::{BodyState, MatchPhase, PlayerSnapshot, Score, Snapshot, Team, Winner};

/// How far behind the estimated server clock rendering runs
pub const INTERPOLATION_DELAY_MS: i64 = 120;
/// Snapshots older than this (server time) are dropped, keeping at least two
pub const BUFFER_WINDOW_MS: i64 = 2_000;
const MIN_RETAINED: usize = 2;

/// What the renderer should draw this frame
#[derive(Debug, Clone, PartialEq)]
pub enum RenderFrame {
    /// Nothing received yet
    Connecting,
    Interpolated(RenderState),
}

/// Interpolated view of the match
#[derive(Debug, Clone, PartialEq)]
pub struct RenderState {
    pub me: Uuid,
    pub score: Score,
    pub phase: MatchPhase,
    pub time_left_ms: u64,
    pub winner: Option<Winner>,
    pub last_goal: Option<Team>,
    pub ball: BodyState,
    pub players: BTreeMap<Uuid, PlayerSnapshot>,
}

/// Ordered buffer of received snapshots plus the frozen clock offset
#[derive(Debug, Default)]
pub struct SyncBuffer {
    snapshots: VecDeque<Snapshot>,
    /// `local - server` in millis, fixed by the first snapshot
    clock_offset: Option<i64>,
}

/// Shared between the network reader and the render loop
pub type SharedSyncBuffer = Arc<Mutex<SyncBuffer>>;

impl SyncBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedSyncBuffer {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clock_offset(&self) -> Option<i64> {
        self.clock_offset
    }

    /// Add a snapshot received at `local_now` (local unix millis)
    pub fn ingest(&mut self, snapshot: Snapshot, local_now: u64) {
        let offset = *self
            .clock_offset
            .get_or_insert(local_now as i64 - snapshot.t as i64);

        // Keep time order even if frames arrive out of order
        let idx = self.snapshots.partition_point(|s| s.t <= snapshot.t);
        self.snapshots.insert(idx, snapshot);

        let cutoff = local_now as i64 - offset - BUFFER_WINDOW_MS;
        while self.snapshots.len() > MIN_RETAINED
            && self
                .snapshots
                .front()
                .is_some_and(|s| (s.t as i64) < cutoff)
        {
            self.snapshots.pop_front();
        }
    }

    /// The state to draw at `local_now`
    pub fn frame(&self, local_now: u64) -> RenderFrame {
        let Some(offset) = self.clock_offset else {
            return RenderFrame::Connecting;
        };
        if self.snapshots.is_empty() {
            return RenderFrame::Connecting;
        }

        let target = local_now as i64 - offset - INTERPOLATION_DELAY_MS;

        // B: first snapshot at or after the target, A: the one before it
        let last = self.snapshots.len() - 1;
        let b_idx = self
            .snapshots
            .iter()
            .position(|s| s.t as i64 >= target)
            .unwrap_or(last);
        let a_idx = b_idx.saturating_sub(1);
        let (a, b) = (&self.snapshots[a_idx], &self.snapshots[b_idx]);

        let span = (b.t as i64 - a.t as i64).max(1);
        let f = ((target - a.t as i64) as f32 / span as f32).clamp(0.0, 1.0);

        RenderFrame::Interpolated(interpolate(a, b, f))
    }
}

fn lerp(a: f32, b: f32, f: f32) -> f32 {
    a + (b - a) * f
}

fn lerp_body(a: &BodyState, b: &BodyState, f: f32) -> BodyState {
    BodyState {
        x: lerp(a.x, b.x, f),
        y: lerp(a.y, b.y, f),
        vx: lerp(a.vx, b.vx, f),
        vy: lerp(a.vy, b.vy, f),
    }
}

fn lerp_player(a: &PlayerSnapshot, b: &PlayerSnapshot, f: f32) -> PlayerSnapshot {
    PlayerSnapshot {
        x: lerp(a.x, b.x, f),
        y: lerp(a.y, b.y, f),
        vx: lerp(a.vx, b.vx, f),
        vy: lerp(a.vy, b.vy, f),
        team: b.team,
        num: b.num,
    }
}

/// Blend two snapshots. Match metadata comes from `b`; a player present in
/// only one of them is held at that position.
fn interpolate(a: &Snapshot, b: &Snapshot, f: f32) -> RenderState {
    let mut players = BTreeMap::new();
    for id in a.players.keys().chain(b.players.keys()) {
        if players.contains_key(id) {
            continue;
        }
        let (pa, pb) = match (a.players.get(id), b.players.get(id)) {
            (Some(pa), Some(pb)) => (pa, pb),
            (Some(p), None) | (None, Some(p)) => (p, p),
            (None, None) => continue,
        };
        players.insert(*id, lerp_player(pa, pb, f));
    }

    RenderState {
        me: b.me,
        score: b.score,
        phase: b.phase,
        time_left_ms: b.time_left_ms,
        winner: b.winner,
        last_goal: b.last_goal,
        ball: lerp_body(&a.ball, &b.ball, f),
        players,
    }
}
