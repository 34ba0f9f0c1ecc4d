#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Frame-stepped agent motion controller with knockback and deflection sliding.
//!
//! Each frame an agent is in exactly one [`MotionPhase`]. While a knockback
//! impulse is active it is displaced by the impulse alone; otherwise it
//! re-plans periodically, follows its smoothed waypoints, and slides around
//! obstacles by trying angled deflections before falling back to per-axis
//! clamping.

use std::collections::VecDeque;

use glam::DVec2;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use thicket_core::{
    Aabb, AgentId, CellCoord, ColliderKind, Event, KnockbackImpulse, MotionPhase, TileMetrics,
};
use thicket_world::{query, CollisionProvider, Pathfinder, WalkabilityGrid, World};

/// Tunables for path following and obstacle sliding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Frames between forced re-plans.
    pub replan_interval: u32,
    /// Distance in pixels at which a waypoint counts as reached.
    pub waypoint_radius: f64,
    /// Deflection angles in degrees, tried in order when the direct move collides.
    pub deflection_degrees: Vec<f64>,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            replan_interval: 60,
            waypoint_radius: 10.0,
            deflection_degrees: vec![30.0, -30.0, 60.0, -60.0],
        }
    }
}

/// Moving entity driven by the controller.
#[derive(Clone, Debug, PartialEq)]
pub struct Agent {
    id: AgentId,
    hitbox: Aabb,
    direction: DVec2,
    speed: f64,
    path: VecDeque<CellCoord>,
    replan_cooldown: u32,
    knockback: KnockbackImpulse,
    collider: ColliderKind,
}

impl Agent {
    /// Creates an idle agent moving `speed` pixels per frame.
    #[must_use]
    pub fn new(id: AgentId, hitbox: Aabb, speed: f64, collider: ColliderKind) -> Self {
        Self {
            id,
            hitbox,
            direction: DVec2::ZERO,
            speed,
            path: VecDeque::new(),
            replan_cooldown: 0,
            knockback: KnockbackImpulse::default(),
            collider,
        }
    }

    /// Replaces the per-frame knockback decay.
    #[must_use]
    pub fn with_knockback_decay(mut self, decay: f64) -> Self {
        self.knockback = KnockbackImpulse::new(self.knockback.velocity(), decay);
        self
    }

    /// Identifier of the agent.
    #[must_use]
    pub const fn id(&self) -> AgentId {
        self.id
    }

    /// Current collision box.
    #[must_use]
    pub const fn hitbox(&self) -> Aabb {
        self.hitbox
    }

    /// Center of the collision box.
    #[must_use]
    pub fn center(&self) -> DVec2 {
        self.hitbox.center()
    }

    /// Last committed movement direction.
    #[must_use]
    pub const fn direction(&self) -> DVec2 {
        self.direction
    }

    /// Voluntary speed in pixels per frame.
    #[must_use]
    pub const fn speed(&self) -> f64 {
        self.speed
    }

    /// Remaining waypoints, nearest first.
    #[must_use]
    pub fn path(&self) -> &VecDeque<CellCoord> {
        &self.path
    }

    /// Frames elapsed since the last re-plan.
    #[must_use]
    pub const fn replan_cooldown(&self) -> u32 {
        self.replan_cooldown
    }

    /// Current knockback impulse.
    #[must_use]
    pub const fn knockback(&self) -> KnockbackImpulse {
        self.knockback
    }

    /// Collision provider strategy chosen at construction.
    #[must_use]
    pub const fn collider(&self) -> ColliderKind {
        self.collider
    }

    /// Pushes the agent away from `source` with the provided speed.
    ///
    /// Ignored when `source` coincides with the hitbox center.
    pub fn apply_knockback(&mut self, source: DVec2, strength: f64) {
        let away = self.center() - source;
        if away.length_squared() == 0.0 {
            return;
        }
        self.knockback.strike(away.normalize() * strength);
    }
}

/// Read-only inputs shared by every agent update within a frame.
#[derive(Debug)]
pub struct MotionContext<'a, P: ?Sized> {
    /// Walkability grid used for planning and path validation.
    pub grid: &'a WalkabilityGrid,
    /// Pixel and cell conversion of the level.
    pub metrics: TileMetrics,
    /// Source of obstacle hitboxes for collision tests.
    pub collider: &'a P,
}

/// Outcome of advancing one agent by one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgentMotion {
    /// Phase that drove the frame.
    pub phase: MotionPhase,
    /// Committed hitbox.
    pub hitbox: Aabb,
    /// Committed direction.
    pub direction: DVec2,
    /// Whether a path search ran this frame.
    pub replanned: bool,
    /// Whether the stored path crossed a blocked cell and was dropped before re-planning.
    pub path_discarded: bool,
    /// Whether the knockback impulse ran out during this frame.
    pub knockback_expired: bool,
}

/// System that advances agents toward a target while resolving collisions.
#[derive(Debug, Default)]
pub struct Movement {
    config: MotionConfig,
    pathfinder: Pathfinder,
    candidates: Vec<Aabb>,
}

impl Movement {
    /// Creates a controller with the provided tunables.
    #[must_use]
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Tunables in effect.
    #[must_use]
    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Consumes world events and advances every agent once per started frame.
    ///
    /// Agents are processed in id order and each uses the collision provider
    /// matching its collider kind.
    pub fn handle(
        &mut self,
        events: &[Event],
        agents: &mut [Agent],
        target: DVec2,
        world: &World,
        out: &mut Vec<Event>,
    ) {
        let frames = events
            .iter()
            .filter(|event| matches!(event, Event::TimeAdvanced { .. }))
            .count();
        if frames == 0 {
            return;
        }

        let mut order: Vec<usize> = (0..agents.len()).collect();
        order.sort_by_key(|index| agents[*index].id());

        for _ in 0..frames {
            for &index in &order {
                let agent = &mut agents[index];
                let collider = query::collider(world, agent.collider());
                let ctx = MotionContext {
                    grid: query::grid(world),
                    metrics: query::metrics(world),
                    collider: &collider,
                };
                let from = agent.center();
                let motion = self.advance_agent(agent, target, &ctx);
                let id = agent.id();

                if motion.path_discarded {
                    out.push(Event::PathDiscarded { agent: id });
                }
                if motion.replanned {
                    out.push(Event::PathPlanned {
                        agent: id,
                        waypoints: agent.path().len(),
                    });
                }
                out.push(Event::AgentAdvanced {
                    agent: id,
                    phase: motion.phase,
                    from,
                    to: motion.hitbox.center(),
                });
                if motion.knockback_expired {
                    out.push(Event::KnockbackExpired { agent: id });
                }
            }
        }
    }

    /// Advances a single agent by one frame toward `target`.
    pub fn advance_agent<P>(
        &mut self,
        agent: &mut Agent,
        target: DVec2,
        ctx: &MotionContext<'_, P>,
    ) -> AgentMotion
    where
        P: CollisionProvider + ?Sized,
    {
        agent.knockback.settle();
        if agent.knockback.is_active() {
            return self.knockback_step(agent, ctx);
        }

        let (replanned, path_discarded) = self.update_path(agent, target, ctx);
        steer(agent, target, ctx.metrics, self.config.waypoint_radius);
        agent.hitbox = self.displace(agent.hitbox, &mut agent.direction, agent.speed, ctx);
        trace!(
            "{:?} voluntary step to {:?} heading {:?}",
            agent.id,
            agent.hitbox.center(),
            agent.direction
        );

        AgentMotion {
            phase: MotionPhase::Voluntary,
            hitbox: agent.hitbox,
            direction: agent.direction,
            replanned,
            path_discarded,
            knockback_expired: false,
        }
    }

    fn knockback_step<P>(&mut self, agent: &mut Agent, ctx: &MotionContext<'_, P>) -> AgentMotion
    where
        P: CollisionProvider + ?Sized,
    {
        let velocity = agent.knockback.velocity();
        let mut hitbox = agent.hitbox;
        let scratch = &mut self.candidates;
        if velocity.x != 0.0 {
            hitbox = shift_axis(hitbox, Axis::Horizontal, velocity.x, ctx.collider, scratch);
        }
        if velocity.y != 0.0 {
            hitbox = shift_axis(hitbox, Axis::Vertical, velocity.y, ctx.collider, scratch);
        }
        agent.hitbox = hitbox;
        agent.knockback.decay_step();

        let knockback_expired = !agent.knockback.is_active();
        trace!(
            "{:?} knocked to {:?}, remaining {:?}",
            agent.id,
            hitbox.center(),
            agent.knockback.velocity()
        );

        AgentMotion {
            phase: MotionPhase::Knockback,
            hitbox,
            direction: agent.direction,
            replanned: false,
            path_discarded: false,
            knockback_expired,
        }
    }

    fn update_path<P: ?Sized>(
        &mut self,
        agent: &mut Agent,
        target: DVec2,
        ctx: &MotionContext<'_, P>,
    ) -> (bool, bool) {
        let path_discarded = agent.path.iter().any(|cell| !ctx.grid.is_walkable(*cell));
        if path_discarded {
            debug!(
                "{:?} discarded a {}-waypoint path crossing blocked cells",
                agent.id,
                agent.path.len()
            );
            agent.path.clear();
        }

        agent.replan_cooldown = agent.replan_cooldown.saturating_add(1);
        if !agent.path.is_empty() && agent.replan_cooldown < self.config.replan_interval {
            return (false, false);
        }
        agent.replan_cooldown = 0;

        let start = ctx
            .metrics
            .cell_at(agent.center())
            .filter(|cell| ctx.grid.contains(*cell));
        let goal = ctx
            .metrics
            .cell_at(target)
            .filter(|cell| ctx.grid.contains(*cell));
        let (Some(start), Some(goal)) = (start, goal) else {
            return (false, path_discarded);
        };

        agent.path = self.pathfinder.plan_path(ctx.grid, start, goal).into();
        (true, path_discarded)
    }

    fn displace<P>(
        &mut self,
        hitbox: Aabb,
        direction: &mut DVec2,
        speed: f64,
        ctx: &MotionContext<'_, P>,
    ) -> Aabb
    where
        P: CollisionProvider + ?Sized,
    {
        *direction = direction.normalize_or_zero();
        let displacement = *direction * speed;

        if !blocked(&hitbox.translated(displacement), ctx.collider, &mut self.candidates) {
            return shift_axes(hitbox, displacement, ctx.collider, &mut self.candidates);
        }

        for degrees in &self.config.deflection_degrees {
            let deflected = DVec2::from_angle(degrees.to_radians()).rotate(*direction);
            let trial = hitbox.translated(deflected * speed);
            if !blocked(&trial, ctx.collider, &mut self.candidates) {
                *direction = deflected;
                return trial;
            }
        }

        shift_axes(hitbox, displacement, ctx.collider, &mut self.candidates)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Axis {
    Horizontal,
    Vertical,
}

fn steer(agent: &mut Agent, target: DVec2, metrics: TileMetrics, waypoint_radius: f64) {
    let center = agent.center();
    let direct = (target - center).normalize_or_zero();

    let Some(&next) = agent.path.front() else {
        agent.direction = direct;
        return;
    };

    let to_waypoint = metrics.cell_center(next) - center;
    if to_waypoint.length() < waypoint_radius {
        let _ = agent.path.pop_front();
        if agent.path.is_empty() {
            agent.direction = direct;
        }
    } else {
        agent.direction = to_waypoint.normalize_or_zero();
    }
}

fn blocked<P>(area: &Aabb, collider: &P, scratch: &mut Vec<Aabb>) -> bool
where
    P: CollisionProvider + ?Sized,
{
    scratch.clear();
    collider.candidates(area, scratch);
    scratch.iter().any(|obstacle| obstacle.overlaps(area))
}

fn shift_axes<P>(hitbox: Aabb, displacement: DVec2, collider: &P, scratch: &mut Vec<Aabb>) -> Aabb
where
    P: CollisionProvider + ?Sized,
{
    let hitbox = shift_axis(hitbox, Axis::Horizontal, displacement.x, collider, scratch);
    shift_axis(hitbox, Axis::Vertical, displacement.y, collider, scratch)
}

/// Moves along one axis and clamps the leading face against overlapping obstacles.
fn shift_axis<P>(
    hitbox: Aabb,
    axis: Axis,
    delta: f64,
    collider: &P,
    scratch: &mut Vec<Aabb>,
) -> Aabb
where
    P: CollisionProvider + ?Sized,
{
    let offset = match axis {
        Axis::Horizontal => DVec2::new(delta, 0.0),
        Axis::Vertical => DVec2::new(0.0, delta),
    };
    let mut moved = hitbox.translated(offset);
    if delta == 0.0 {
        return moved;
    }

    scratch.clear();
    collider.candidates(&moved, scratch);
    for obstacle in scratch.iter() {
        if !obstacle.overlaps(&moved) {
            continue;
        }
        match (axis, delta > 0.0) {
            (Axis::Horizontal, true) => moved.set_right(obstacle.left()),
            (Axis::Horizontal, false) => moved.set_left(obstacle.right()),
            (Axis::Vertical, true) => moved.set_bottom(obstacle.top()),
            (Axis::Vertical, false) => moved.set_top(obstacle.bottom()),
        }
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context<'a>(grid: &'a WalkabilityGrid, obstacles: &'a [Aabb]) -> MotionContext<'a, [Aabb]> {
        MotionContext {
            grid,
            metrics: TileMetrics::new(64.0),
            collider: obstacles,
        }
    }

    fn agent_at(center: DVec2, speed: f64) -> Agent {
        Agent::new(
            AgentId::new(1),
            Aabb::from_center(center, 20.0, 20.0),
            speed,
            ColliderKind::LinearScan,
        )
    }

    #[test]
    fn horizontal_clamp_sets_right_face_to_obstacle_left() {
        let obstacles = [Aabb::new(30.0, -50.0, 10.0, 100.0)];
        let mut scratch = Vec::new();

        let moved = shift_axis(
            Aabb::new(0.0, 0.0, 20.0, 20.0),
            Axis::Horizontal,
            15.0,
            &obstacles[..],
            &mut scratch,
        );

        assert_eq!(moved.right(), 30.0);
        assert_eq!(moved.top(), 0.0);
    }

    #[test]
    fn vertical_clamp_sets_top_face_to_obstacle_bottom() {
        let obstacles = [Aabb::new(-50.0, -20.0, 100.0, 15.0)];
        let mut scratch = Vec::new();

        let moved = shift_axis(
            Aabb::new(0.0, 0.0, 20.0, 20.0),
            Axis::Vertical,
            -8.0,
            &obstacles[..],
            &mut scratch,
        );

        assert_eq!(moved.top(), -5.0);
    }

    #[test]
    fn deflection_slides_along_a_wall() {
        let grid = WalkabilityGrid::new_open(8, 8);
        // Corner ahead of the agent clipping its top edge by one pixel.
        let obstacles = [Aabb::new(121.0, 80.0, 40.0, 21.0)];
        let start = Aabb::from_center(DVec2::new(110.0, 110.0), 20.0, 20.0);
        let mut movement = Movement::default();
        let mut direction = DVec2::X;

        let hitbox = movement.displace(start, &mut direction, 4.0, &context(&grid, &obstacles));

        let expected = DVec2::from_angle(30_f64.to_radians()).rotate(DVec2::X);
        assert!((direction - expected).length() < 1e-12);
        assert!(!hitbox.overlaps(&obstacles[0]));
    }

    #[test]
    fn negative_thirty_degrees_is_tried_before_sixty() {
        let grid = WalkabilityGrid::new_open(8, 8);
        // Blocks the direct move and +30 degrees; -30 and +60 are both free.
        let obstacles = [Aabb::new(122.5, 119.0, 8.0, 6.0)];
        let start = Aabb::from_center(DVec2::new(110.0, 110.0), 20.0, 20.0);
        let mut movement = Movement::default();
        let mut direction = DVec2::X;

        let hitbox = movement.displace(start, &mut direction, 4.0, &context(&grid, &obstacles));

        let expected = DVec2::from_angle((-30_f64).to_radians()).rotate(DVec2::X);
        assert!((direction - expected).length() < 1e-12);
        assert!((hitbox.center() - (start.center() + expected * 4.0)).length() < 1e-12);
    }

    #[test]
    fn sixty_degree_deflection_commits_once_both_thirties_are_blocked() {
        let grid = WalkabilityGrid::new_open(8, 8);
        let obstacles = [
            // Wall ahead blocks the direct move and both 30 degree trials.
            Aabb::new(122.5, 0.0, 80.0, 400.0),
            // Floor below blocks +60 degrees.
            Aabb::new(0.0, 121.0, 122.0, 80.0),
        ];
        let start = Aabb::from_center(DVec2::new(110.0, 110.0), 20.0, 20.0);
        let mut movement = Movement::default();
        let mut direction = DVec2::X;

        let hitbox = movement.displace(start, &mut direction, 4.0, &context(&grid, &obstacles));

        let expected = DVec2::from_angle((-60_f64).to_radians()).rotate(DVec2::X);
        assert!((direction - expected).length() < 1e-12);
        assert!((hitbox.center() - (start.center() + expected * 4.0)).length() < 1e-12);
        assert!(obstacles.iter().all(|obstacle| !obstacle.overlaps(&hitbox)));
    }

    #[test]
    fn stored_path_is_discarded_when_a_waypoint_becomes_blocked() {
        let mut grid = WalkabilityGrid::new_open(8, 8);
        for row in 0..6 {
            assert!(grid.set_walkable(CellCoord::new(4, row), false));
        }
        let target = DVec2::new(6.5 * 64.0, 1.5 * 64.0);
        let mut agent = agent_at(DVec2::new(1.5 * 64.0, 1.5 * 64.0), 2.0);
        let mut movement = Movement::default();

        let planned = movement.advance_agent(&mut agent, target, &context(&grid, &[]));
        assert!(planned.replanned);
        assert!(!planned.path_discarded);
        assert!(agent.path().len() >= 2, "path {:?}", agent.path());

        let blocked = agent.path()[0];
        assert!(grid.set_walkable(blocked, false));
        let motion = movement.advance_agent(&mut agent, target, &context(&grid, &[]));

        assert!(motion.path_discarded);
        assert!(motion.replanned);
        assert!(!agent.path().contains(&blocked));
    }

    #[test]
    fn fully_blocked_moves_fall_back_to_axis_clamping() {
        let grid = WalkabilityGrid::new_open(8, 8);
        let obstacles = [Aabb::new(121.0, 0.0, 40.0, 400.0)];
        let mut movement = Movement::new(MotionConfig {
            deflection_degrees: vec![10.0, -10.0],
            ..MotionConfig::default()
        });
        let mut direction = DVec2::X;
        let start = Aabb::from_center(DVec2::new(110.0, 110.0), 20.0, 20.0);

        let hitbox = movement.displace(start, &mut direction, 4.0, &context(&grid, &obstacles));

        assert_eq!(direction, DVec2::X);
        assert_eq!(hitbox.right(), 121.0);
        assert_eq!(hitbox.top(), start.top());
    }

    #[test]
    fn knockback_overrides_voluntary_motion_and_expires() {
        let grid = WalkabilityGrid::new_open(8, 8);
        let mut agent = agent_at(DVec2::new(200.0, 200.0), 3.0).with_knockback_decay(0.5);
        agent.apply_knockback(DVec2::new(190.0, 200.0), 2.0);
        let mut movement = Movement::default();
        let ctx = context(&grid, &[]);

        let first = movement.advance_agent(&mut agent, DVec2::new(0.0, 200.0), &ctx);
        assert_eq!(first.phase, MotionPhase::Knockback);
        assert_eq!(first.hitbox.center(), DVec2::new(202.0, 200.0));
        assert!(agent.path().is_empty());

        let mut expired_after = None;
        for frame in 1..16 {
            let motion = movement.advance_agent(&mut agent, DVec2::new(0.0, 200.0), &ctx);
            if motion.knockback_expired {
                expired_after = Some(frame);
            }
            if motion.phase == MotionPhase::Voluntary {
                break;
            }
        }
        assert!(expired_after.is_some());
        assert_eq!(agent.knockback().velocity(), DVec2::ZERO);
    }

    #[test]
    fn knockback_from_the_center_is_ignored() {
        let mut agent = agent_at(DVec2::new(50.0, 50.0), 1.0);
        agent.apply_knockback(DVec2::new(50.0, 50.0), 12.0);

        assert!(!agent.knockback().is_active());
    }

    #[test]
    fn waypoints_are_popped_within_the_radius() {
        let metrics = TileMetrics::new(64.0);
        let mut agent = agent_at(DVec2::new(100.0, 96.0), 1.0);
        agent.path = VecDeque::from(vec![CellCoord::new(1, 1), CellCoord::new(3, 1)]);

        steer(&mut agent, DVec2::new(500.0, 96.0), metrics, 10.0);

        assert_eq!(agent.path().len(), 1);
        // The popped waypoint leaves the previous direction untouched.
        assert_eq!(agent.direction(), DVec2::ZERO);

        steer(&mut agent, DVec2::new(500.0, 96.0), metrics, 10.0);
        assert_eq!(agent.direction(), DVec2::X);
    }

    #[test]
    fn out_of_grid_agents_fall_back_to_direct_steering() {
        let grid = WalkabilityGrid::new_open(2, 2);
        let mut agent = agent_at(DVec2::new(-40.0, 20.0), 2.0);
        let mut movement = Movement::default();

        let ctx = context(&grid, &[]);

        let motion = movement.advance_agent(&mut agent, DVec2::new(60.0, 20.0), &ctx);

        assert!(!motion.replanned);
        assert_eq!(motion.direction, DVec2::X);
        assert_eq!(motion.hitbox.center(), DVec2::new(-38.0, 20.0));
    }
}
