//! Snapshot throttling and building

use std::collections::{BTreeMap, HashMap};

use uuid::Uuid;

use crate::ws::protocol::{PlayerSnapshot, Snapshot};

use super::physics::{BodyHandle, PhysicsWorld};
use super::MatchState;

/// Decides when a snapshot is due and builds it.
///
/// Physics runs every tick; fan-out happens whenever the accumulated tick
/// time reaches the snapshot interval, after which the accumulator resets.
pub struct SnapshotBuilder {
    accumulated_micros: u64,
    interval_micros: u64,
}

impl SnapshotBuilder {
    pub fn new(interval_micros: u64) -> Self {
        Self {
            accumulated_micros: 0,
            interval_micros,
        }
    }

    /// Add elapsed tick time; true when a snapshot should go out now
    pub fn should_send(&mut self, elapsed_micros: u64) -> bool {
        self.accumulated_micros += elapsed_micros;
        if self.accumulated_micros >= self.interval_micros {
            self.accumulated_micros = 0;
            true
        } else {
            false
        }
    }

    /// Restart the accumulator after an out-of-band snapshot
    pub fn reset(&mut self) {
        self.accumulated_micros = 0;
    }

    /// Build a snapshot. `me` is left nil and filled in per recipient.
    pub fn build(
        &self,
        now: u64,
        state: &MatchState,
        world: &PhysicsWorld,
        players: &HashMap<Uuid, BodyHandle>,
        ball: BodyHandle,
    ) -> Snapshot {
        let players: BTreeMap<Uuid, PlayerSnapshot> = players
            .iter()
            .filter_map(|(id, handle)| {
                let body = world.body_state(*handle)?;
                Some((
                    *id,
                    PlayerSnapshot {
                        x: body.x,
                        y: body.y,
                        vx: body.vx,
                        vy: body.vy,
                        team: state.team_of(id),
                        num: jersey_number(id),
                    },
                ))
            })
            .collect();

        Snapshot {
            t: now,
            me: Uuid::nil(),
            score: state.score(),
            phase: state.phase(),
            players,
            ball: world.body_state(ball).unwrap_or_default(),
            time_left_ms: state.time_left_ms(now),
            winner: state.winner(),
            last_goal: state.last_goal(),
        }
    }
}

/// Stable jersey number (1-9) derived from a connection id
pub fn jersey_number(conn_id: &Uuid) -> u8 {
    let sum: u32 = conn_id
        .hyphenated()
        .to_string()
        .bytes()
        .map(u32::from)
        .sum();
    (sum % 9) as u8 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttles_to_interval_and_resets() {
        let mut builder = SnapshotBuilder::new(33_000);
        assert!(!builder.should_send(16_667));
        assert!(builder.should_send(16_667));
        assert!(!builder.should_send(16_667));
        assert!(builder.should_send(16_667));
    }

    #[test]
    fn reset_restarts_accumulation() {
        let mut builder = SnapshotBuilder::new(33_000);
        assert!(!builder.should_send(20_000));
        builder.reset();
        assert!(!builder.should_send(20_000));
        assert!(builder.should_send(20_000));
    }

    #[test]
    fn jersey_numbers_are_stable_and_in_range() {
        for _ in 0..50 {
            let id = Uuid::new_v4();
            let n = jersey_number(&id);
            assert!((1..=9).contains(&n));
            assert_eq!(n, jersey_number(&id));
        }
    }
}
