//! Physics world adapter
//!
//! Thin facade over `rapier2d`: a gravity-free arena bounded by walls with a
//! goal mouth cut into each short side, plus circular dynamic bodies for
//! players and the ball. The rest of the server only sees positions,
//! velocities, impulses and a fixed-step `step()`.

use rapier2d::prelude::*;

use crate::ws::protocol::{BodyState, SimConfig};

/// Wall thickness in metres
const WALL_THICKNESS: f32 = 0.5;

/// Which preset a body is created with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Player,
    Ball,
}

/// Material and damping presets per body kind
#[derive(Debug, Clone, Copy)]
pub struct BodyPreset {
    pub linear_damping: f32,
    pub restitution: f32,
    pub friction: f32,
    pub density: f32,
}

impl BodyPreset {
    pub fn for_kind(kind: BodyKind) -> Self {
        match kind {
            // Lively: bounces well, light, rolls to a stop fairly quickly
            BodyKind::Ball => Self {
                linear_damping: 0.9,
                restitution: 0.9,
                friction: 0.12,
                density: 0.5,
            },
            // Players decelerate fast once input stops
            BodyKind::Player => Self {
                linear_damping: 3.0,
                restitution: 0.3,
                friction: 0.2,
                density: 1.0,
            },
        }
    }
}

/// Handle to a body owned by a `PhysicsWorld`
pub type BodyHandle = RigidBodyHandle;

/// The rigid-body world of a single room
pub struct PhysicsWorld {
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
}

impl PhysicsWorld {
    /// Create an empty, gravity-free world stepping at `time_step` seconds
    pub fn new(time_step: f32) -> Self {
        let integration_parameters = IntegrationParameters {
            dt: time_step,
            ..IntegrationParameters::default()
        };

        Self {
            gravity: vector![0.0, 0.0],
            integration_parameters,
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
        }
    }

    /// Build the full arena for a simulation config
    pub fn arena(config: &SimConfig) -> Self {
        let mut world = Self::new(config.time_step);
        world.create_walls(config.width, config.height, config.goal_height);
        world.create_goal_nets(config.width, config.height, config.goal_height, config.goal_depth);
        world
    }

    /// Four wall segments per long side pair: full-width top and bottom, and
    /// left/right walls split around a centered gap of `goal_gap` metres.
    pub fn create_walls(&mut self, width: f32, height: f32, goal_gap: f32) {
        let t = WALL_THICKNESS;
        let half_gap = goal_gap / 2.0;
        let segment = height / 2.0 - half_gap;

        // Top & bottom
        self.add_wall(width / 2.0, -t / 2.0, width / 2.0, t / 2.0);
        self.add_wall(width / 2.0, height + t / 2.0, width / 2.0, t / 2.0);

        // Left & right, above and below the goal mouth
        for x in [-t / 2.0, width + t / 2.0] {
            self.add_wall(x, segment / 2.0, t / 2.0, segment / 2.0);
            self.add_wall(x, height - segment / 2.0, t / 2.0, segment / 2.0);
        }
    }

    /// Back and side walls behind each goal mouth so the ball stays in play
    pub fn create_goal_nets(&mut self, width: f32, height: f32, goal_gap: f32, depth: f32) {
        let t = WALL_THICKNESS;
        let mid = height / 2.0;
        let half_gap = goal_gap / 2.0;

        for (mouth, outward) in [(0.0, -1.0), (width, 1.0)] {
            let back_x = mouth + outward * (depth + t / 2.0);
            let side_x = mouth + outward * depth / 2.0;
            self.add_wall(back_x, mid, t / 2.0, half_gap + t);
            self.add_wall(side_x, mid - half_gap - t / 2.0, depth / 2.0, t / 2.0);
            self.add_wall(side_x, mid + half_gap + t / 2.0, depth / 2.0, t / 2.0);
        }
    }

    fn add_wall(&mut self, x: f32, y: f32, half_w: f32, half_h: f32) {
        let collider = ColliderBuilder::cuboid(half_w, half_h)
            .translation(vector![x, y])
            .restitution(1.0)
            .build();
        self.colliders.insert(collider);
    }

    /// Create a circular dynamic body with the preset for `kind`
    pub fn create_body(&mut self, kind: BodyKind, radius: f32, x: f32, y: f32) -> BodyHandle {
        let preset = BodyPreset::for_kind(kind);
        let body = RigidBodyBuilder::dynamic()
            .translation(vector![x, y])
            .linear_damping(preset.linear_damping)
            .ccd_enabled(kind == BodyKind::Ball)
            .build();
        let handle = self.bodies.insert(body);

        let collider = ColliderBuilder::ball(radius)
            .density(preset.density)
            .restitution(preset.restitution)
            .friction(preset.friction)
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);

        handle
    }

    /// Destroy a body and its collider
    pub fn remove_body(&mut self, handle: BodyHandle) {
        self.bodies.remove(
            handle,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    pub fn position(&self, handle: BodyHandle) -> Option<(f32, f32)> {
        self.bodies.get(handle).map(|b| {
            let p = b.translation();
            (p.x, p.y)
        })
    }

    pub fn velocity(&self, handle: BodyHandle) -> Option<(f32, f32)> {
        self.bodies.get(handle).map(|b| {
            let v = b.linvel();
            (v.x, v.y)
        })
    }

    /// Position and velocity in wire form
    pub fn body_state(&self, handle: BodyHandle) -> Option<BodyState> {
        self.bodies.get(handle).map(|b| {
            let p = b.translation();
            let v = b.linvel();
            BodyState {
                x: p.x,
                y: p.y,
                vx: v.x,
                vy: v.y,
            }
        })
    }

    pub fn set_position(&mut self, handle: BodyHandle, x: f32, y: f32) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_translation(vector![x, y], true);
        }
    }

    pub fn set_velocity(&mut self, handle: BodyHandle, vx: f32, vy: f32) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_linvel(vector![vx, vy], true);
        }
    }

    /// Teleport a body and bring it to rest
    pub fn reset_body(&mut self, handle: BodyHandle, x: f32, y: f32) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_translation(vector![x, y], true);
            body.set_linvel(vector![0.0, 0.0], true);
            body.set_angvel(0.0, true);
        }
    }

    /// Instantaneous impulse through the body's centre of mass
    pub fn apply_impulse(&mut self, handle: BodyHandle, ix: f32, iy: f32) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.apply_impulse(vector![ix, iy], true);
        }
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Advance the simulation by one fixed step
    pub fn step(&mut self) {
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena() -> (PhysicsWorld, SimConfig) {
        let config = SimConfig::default();
        (PhysicsWorld::arena(&config), config)
    }

    #[test]
    fn bodies_are_created_and_removed() {
        let (mut world, config) = arena();
        let handle = world.create_body(BodyKind::Player, config.player_radius, 5.0, 5.0);
        assert_eq!(world.body_count(), 1);
        assert_eq!(world.position(handle), Some((5.0, 5.0)));

        world.remove_body(handle);
        assert_eq!(world.body_count(), 0);
        assert!(world.position(handle).is_none());
    }

    #[test]
    fn no_gravity() {
        let (mut world, config) = arena();
        let (cx, cy) = config.centre();
        let ball = world.create_body(BodyKind::Ball, config.ball_radius, cx, cy);
        for _ in 0..60 {
            world.step();
        }
        assert_eq!(world.position(ball), Some((cx, cy)));
    }

    #[test]
    fn velocity_moves_body_and_damping_slows_it() {
        let (mut world, config) = arena();
        let (cx, cy) = config.centre();
        let player = world.create_body(BodyKind::Player, config.player_radius, cx, cy);
        world.set_velocity(player, 4.5, 0.0);
        world.step();

        let (x, _) = world.position(player).unwrap();
        let (vx, _) = world.velocity(player).unwrap();
        assert!(x > cx);
        assert!(vx < 4.5);
    }

    #[test]
    fn player_damps_faster_than_ball() {
        let (mut world, config) = arena();
        let (cx, cy) = config.centre();
        let player = world.create_body(BodyKind::Player, config.player_radius, cx, cy - 3.0);
        let ball = world.create_body(BodyKind::Ball, config.ball_radius, cx, cy + 3.0);
        world.set_velocity(player, 3.0, 0.0);
        world.set_velocity(ball, 3.0, 0.0);
        for _ in 0..30 {
            world.step();
        }
        assert!(world.velocity(player).unwrap().0 < world.velocity(ball).unwrap().0);
    }

    #[test]
    fn walls_contain_ball_outside_goal_band() {
        let (mut world, config) = arena();
        // Aim at the left wall well above the goal mouth
        let ball = world.create_body(BodyKind::Ball, config.ball_radius, 2.0, 1.5);
        world.set_velocity(ball, -10.0, 0.0);
        for _ in 0..120 {
            world.step();
        }
        let (x, _) = world.position(ball).unwrap();
        assert!(x > 0.0, "ball escaped through the wall: x = {x}");
    }

    #[test]
    fn reset_body_stops_motion() {
        let (mut world, config) = arena();
        let ball = world.create_body(BodyKind::Ball, config.ball_radius, 3.0, 3.0);
        world.set_velocity(ball, 5.0, 5.0);
        world.reset_body(ball, 10.0, 8.0);
        assert_eq!(world.position(ball), Some((10.0, 8.0)));
        assert_eq!(world.velocity(ball), Some((0.0, 0.0)));
    }

    #[test]
    fn impulse_changes_velocity_in_its_direction() {
        let (mut world, config) = arena();
        let (cx, cy) = config.centre();
        let ball = world.create_body(BodyKind::Ball, config.ball_radius, cx, cy);
        world.step();
        world.apply_impulse(ball, 0.5, 0.0);
        let (vx, vy) = world.velocity(ball).unwrap();
        assert!(vx > 0.0);
        assert_eq!(vy, 0.0);
    }
}
