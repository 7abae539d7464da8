//! Ball contact resolution: kicks and dribble touches

use crate::ws::protocol::SimConfig;

/// Geometry and strength of a kick
#[derive(Debug, Clone, Copy)]
pub struct KickParams {
    pub player_radius: f32,
    pub ball_radius: f32,
    /// Reach beyond the player's radius
    pub extra_reach: f32,
    /// Impulse magnitude
    pub magnitude: f32,
}

impl KickParams {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            player_radius: config.player_radius,
            ball_radius: config.ball_radius,
            extra_reach: config.kick_extra_reach,
            magnitude: config.kick_impulse,
        }
    }

    /// Maximum gap between the player's centre and the ball's edge
    pub fn reach(&self) -> f32 {
        self.player_radius + self.extra_reach
    }
}

/// Impulse to apply to the ball, or `None` when the kick misses.
///
/// Connects iff `0 < d - ball_radius <= player_radius + extra_reach` where `d`
/// is the centre distance; the impulse points from player to ball.
pub fn kick_impulse(player: (f32, f32), ball: (f32, f32), params: &KickParams) -> Option<(f32, f32)> {
    let dx = ball.0 - player.0;
    let dy = ball.1 - player.1;
    let dist = dx.hypot(dy);
    let gap = dist - params.ball_radius;

    if dist <= 0.0 || gap <= 0.0 || gap > params.reach() {
        return None;
    }

    Some((
        dx / dist * params.magnitude,
        dy / dist * params.magnitude,
    ))
}

/// Gap kept between player and ball after a touch
const DRIBBLE_SEPARATION: f32 = 0.01;
/// Slack on the contact test
const DRIBBLE_CONTACT_SLOP: f32 = 0.01;
/// Share of the normal speed difference handed to the ball per step
const DRIBBLE_MIX: f32 = 0.35;
const DRIBBLE_TANGENT_DAMP: f32 = 0.98;

/// Corrections to the ball after every player in contact has pushed it
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Dribble {
    /// Ball moved out of an overlapping player
    pub position: Option<(f32, f32)>,
    /// Ball velocity after the pushes; set whenever any player touched
    pub velocity: Option<(f32, f32)>,
}

/// Players pushing into the ball carry it along their contact normal.
///
/// `players` yields `(position, velocity)` pairs. A player touches when the
/// centre distance is within `player_radius + ball_radius` plus a small slop.
/// Only a player moving into the ball faster than the ball moves away changes
/// its velocity. Contacts are evaluated against the ball position at entry.
pub fn dribble(
    ball: (f32, f32),
    ball_velocity: (f32, f32),
    players: impl IntoIterator<Item = ((f32, f32), (f32, f32))>,
    params: &KickParams,
) -> Dribble {
    let sum_r = params.player_radius + params.ball_radius;
    let target = sum_r + DRIBBLE_SEPARATION;
    let (mut vx, mut vy) = ball_velocity;
    let mut out = Dribble::default();

    for (pos, vel) in players {
        let dx = ball.0 - pos.0;
        let dy = ball.1 - pos.1;
        let dist = dx.hypot(dy);
        if dist > sum_r + DRIBBLE_CONTACT_SLOP {
            continue;
        }

        let (nx, ny) = if dist > 0.0 {
            (dx / dist, dy / dist)
        } else {
            (1.0, 0.0)
        };
        if dist < target {
            out.position = Some((pos.0 + nx * target, pos.1 + ny * target));
        }

        let ball_n = vx * nx + vy * ny;
        let player_n = vel.0 * nx + vel.1 * ny;
        if player_n > ball_n {
            let tx = vx - ball_n * nx;
            let ty = vy - ball_n * ny;
            let new_n = ball_n + (player_n - ball_n) * DRIBBLE_MIX;
            vx = tx * DRIBBLE_TANGENT_DAMP + new_n * nx;
            vy = ty * DRIBBLE_TANGENT_DAMP + new_n * ny;
        }
        out.velocity = Some((vx, vy));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    // Values chosen to be exact in binary floating point
    fn params() -> KickParams {
        KickParams {
            player_radius: 0.5,
            ball_radius: 0.25,
            extra_reach: 0.5,
            magnitude: 0.5,
        }
    }

    #[test]
    fn applies_at_exact_threshold() {
        // d - ball_radius == reach
        let impulse = kick_impulse((0.0, 0.0), (1.25, 0.0), &params());
        assert_eq!(impulse, Some((0.5, 0.0)));
    }

    #[test]
    fn misses_just_beyond_threshold() {
        let beyond = 1.25_f32 + 1e-4;
        assert_eq!(kick_impulse((0.0, 0.0), (beyond, 0.0), &params()), None);
    }

    #[test]
    fn misses_when_ball_on_player_centre() {
        assert_eq!(kick_impulse((3.0, 3.0), (3.0, 3.0), &params()), None);
    }

    #[test]
    fn misses_when_centre_inside_ball_radius() {
        // d - ball_radius <= 0
        assert_eq!(kick_impulse((0.0, 0.0), (0.25, 0.0), &params()), None);
        assert_eq!(kick_impulse((0.0, 0.0), (0.1, 0.0), &params()), None);
    }

    #[test]
    fn direction_is_normalized_player_to_ball() {
        let (ix, iy) = kick_impulse((1.0, 1.0), (1.6, 1.8), &params()).unwrap();
        assert_approx_eq!(ix, 0.3, 1e-6);
        assert_approx_eq!(iy, 0.4, 1e-6);
        assert_approx_eq!(ix.hypot(iy), 0.5, 1e-6);
    }

    #[test]
    fn dribble_ignores_distant_players() {
        let out = dribble((5.0, 0.0), (0.0, 0.0), [((0.0, 0.0), (4.0, 0.0))], &params());
        assert_eq!(out, Dribble::default());
    }

    #[test]
    fn dribble_carries_ball_along_the_push() {
        // Touching: centres 0.75 apart, player running into the ball
        let out = dribble((0.75, 0.0), (0.0, 1.0), [((0.0, 0.0), (4.0, 0.0))], &params());

        let (x, y) = out.position.unwrap();
        assert_approx_eq!(x, 0.76, 1e-6);
        assert_approx_eq!(y, 0.0, 1e-6);

        let (vx, vy) = out.velocity.unwrap();
        assert_approx_eq!(vx, 4.0 * 0.35, 1e-6);
        assert_approx_eq!(vy, 0.98, 1e-6);
    }

    #[test]
    fn dribble_leaves_a_faster_ball_alone() {
        // In contact but the ball already outruns the player
        let out = dribble((0.755, 0.0), (6.0, 0.0), [((0.0, 0.0), (4.0, 0.0))], &params());
        assert_eq!(out.velocity, Some((6.0, 0.0)));
    }

    #[test]
    fn dribble_on_coincident_centres_pushes_along_x() {
        let out = dribble((2.0, 2.0), (0.0, 0.0), [((2.0, 2.0), (0.0, 0.0))], &params());
        let (x, y) = out.position.unwrap();
        assert_approx_eq!(x, 2.76, 1e-6);
        assert_approx_eq!(y, 2.0, 1e-6);
    }

    #[test]
    fn default_config_reach() {
        let p = KickParams::from_config(&SimConfig::default());
        assert_approx_eq!(p.reach(), 0.6 + 0.5, 1e-6);
    }
}
