#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Thicket navigation engine.
//!
//! This crate defines the geometry and message surface that connects the
//! level adapter, the authoritative world, and the movement system. Adapters
//! submit [`Command`] values describing terrain mutations and frame ticks, the
//! world executes them via its `apply` entry point and broadcasts [`Event`]
//! values. The movement system consumes those events together with immutable
//! world views and mutates only the agents it was handed.

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// Squared knockback speed at or below which an impulse is considered spent.
pub const KNOCKBACK_EPSILON_SQ: f64 = 0.05;

/// Multiplicative per-frame decay applied to knockback impulses by default.
pub const DEFAULT_KNOCKBACK_DECAY: f64 = 0.85;

/// Edge length of a map tile in world pixels used by the stock level art.
pub const DEFAULT_TILE_SIZE: f64 = 64.0;

/// Commands that express all permissible world mutations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Removes destructible terrain occupying the cell and marks it walkable.
    ClearTerrain {
        /// Grid cell whose vegetation should be destroyed.
        cell: CellCoord,
    },
    /// Starts a new frame, rebuilding the spatial index from current obstacles.
    Tick,
}

/// Events broadcast by the world and by systems after processing a frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Indicates that a new frame started.
    TimeAdvanced {
        /// Monotonic index of the frame that just began.
        frame: u64,
    },
    /// Confirms that the spatial index was rebuilt for the current frame.
    SpatialIndexRebuilt {
        /// Number of obstacles inserted into the index.
        entries: usize,
    },
    /// Confirms that destructible terrain was removed from the level.
    TerrainCleared {
        /// Cell that became walkable.
        cell: CellCoord,
        /// Obstacle that was removed from the level.
        obstacle: EntityId,
    },
    /// Reports that an agent ran a path search during the frame.
    PathPlanned {
        /// Agent that re-planned.
        agent: AgentId,
        /// Waypoints left on the agent's path once the frame completed.
        waypoints: usize,
    },
    /// Reports that a planned path crossed blocked cells and was thrown away.
    PathDiscarded {
        /// Agent whose path was discarded.
        agent: AgentId,
    },
    /// Reports the displacement an agent committed during the frame.
    AgentAdvanced {
        /// Agent that moved.
        agent: AgentId,
        /// Motion phase that drove the displacement.
        phase: MotionPhase,
        /// Hitbox center before the update.
        from: DVec2,
        /// Hitbox center after the update.
        to: DVec2,
    },
    /// Announces that an agent's knockback impulse decayed away.
    KnockbackExpired {
        /// Agent that returned to voluntary movement.
        agent: AgentId,
    },
}

/// Mutually exclusive motion states an agent can be in during one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MotionPhase {
    /// Physics-driven displacement from a decaying knockback impulse.
    Knockback,
    /// Path-following or direct movement toward the target.
    Voluntary,
}

/// Strategy used to gather obstacle candidates for an agent's collision tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColliderKind {
    /// Tests every obstacle in the level.
    LinearScan,
    /// Narrows candidates through the per-frame spatial hash grid.
    #[default]
    SpatialHash,
}

/// Unique identifier assigned to a static or destructible obstacle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u32);

impl EntityId {
    /// Creates a new obstacle identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Unique identifier assigned to a moving agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(u32);

impl AgentId {
    /// Creates a new agent identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Location of a single walkability cell expressed as column and row coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    column: u32,
    row: u32,
}

impl CellCoord {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }

    /// Zero-based row index of the cell.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }

    /// Returns the cell displaced by the signed offsets, if it stays non-negative.
    #[must_use]
    pub fn offset(self, columns: i32, rows: i32) -> Option<CellCoord> {
        let column = self.column.checked_add_signed(columns)?;
        let row = self.row.checked_add_signed(rows)?;
        Some(CellCoord::new(column, row))
    }

    /// Straight-line distance between two cells measured in cells.
    #[must_use]
    pub fn euclidean_distance(self, other: CellCoord) -> f64 {
        let dx = f64::from(self.column) - f64::from(other.column);
        let dy = f64::from(self.row) - f64::from(other.row);
        dx.hypot(dy)
    }
}

/// Bucket coordinate of the spatial hash grid; may be negative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpatialCell {
    /// Horizontal bucket index.
    pub x: i64,
    /// Vertical bucket index.
    pub y: i64,
}

impl SpatialCell {
    /// Creates a new bucket coordinate.
    #[must_use]
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box in world pixels anchored at its top-left corner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
}

impl Aabb {
    /// Creates a box from its top-left corner and dimensions.
    ///
    /// Negative dimensions are clamped to zero.
    #[must_use]
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    /// Creates a box of the provided size centered on `center`.
    #[must_use]
    pub fn from_center(center: DVec2, width: f64, height: f64) -> Self {
        Self::new(
            center.x - width * 0.5,
            center.y - height * 0.5,
            width,
            height,
        )
    }

    /// Left face coordinate.
    #[must_use]
    pub const fn left(&self) -> f64 {
        self.left
    }

    /// Top face coordinate.
    #[must_use]
    pub const fn top(&self) -> f64 {
        self.top
    }

    /// Horizontal extent of the box.
    #[must_use]
    pub const fn width(&self) -> f64 {
        self.width
    }

    /// Vertical extent of the box.
    #[must_use]
    pub const fn height(&self) -> f64 {
        self.height
    }

    /// Right face coordinate.
    #[must_use]
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    /// Bottom face coordinate.
    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Geometric center of the box.
    #[must_use]
    pub fn center(&self) -> DVec2 {
        DVec2::new(
            self.left + self.width * 0.5,
            self.top + self.height * 0.5,
        )
    }

    /// Reports whether the interiors of both boxes intersect.
    ///
    /// Boxes that merely share an edge do not overlap, so an agent clamped
    /// flush against an obstacle is not considered colliding with it.
    #[must_use]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.left < other.right()
            && other.left < self.right()
            && self.top < other.bottom()
            && other.top < self.bottom()
    }

    /// Returns a copy moved by the provided displacement.
    #[must_use]
    pub fn translated(&self, offset: DVec2) -> Aabb {
        Aabb {
            left: self.left + offset.x,
            top: self.top + offset.y,
            ..*self
        }
    }

    /// Returns a copy grown (or shrunk for negative deltas) about its center.
    #[must_use]
    pub fn inflated(&self, width_delta: f64, height_delta: f64) -> Aabb {
        Aabb::from_center(
            self.center(),
            (self.width + width_delta).max(0.0),
            (self.height + height_delta).max(0.0),
        )
    }

    /// Moves the box horizontally so its left face sits at `left`.
    pub fn set_left(&mut self, left: f64) {
        self.left = left;
    }

    /// Moves the box horizontally so its right face sits at `right`.
    pub fn set_right(&mut self, right: f64) {
        self.left = right - self.width;
    }

    /// Moves the box vertically so its top face sits at `top`.
    pub fn set_top(&mut self, top: f64) {
        self.top = top;
    }

    /// Moves the box vertically so its bottom face sits at `bottom`.
    pub fn set_bottom(&mut self, bottom: f64) {
        self.top = bottom - self.height;
    }
}

/// Conversion between world pixels and walkability cells.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileMetrics {
    tile_size: f64,
}

impl TileMetrics {
    /// Creates metrics for square tiles of the provided edge length.
    #[must_use]
    pub const fn new(tile_size: f64) -> Self {
        Self { tile_size }
    }

    /// Edge length of a single tile in world pixels.
    #[must_use]
    pub const fn tile_size(&self) -> f64 {
        self.tile_size
    }

    /// Cell containing the provided world position.
    ///
    /// Positions left of or above the origin and degenerate tile sizes yield
    /// `None`; upper bounds are checked by the grid.
    #[must_use]
    pub fn cell_at(&self, point: DVec2) -> Option<CellCoord> {
        if !(self.tile_size > 0.0) || !(point.x >= 0.0) || !(point.y >= 0.0) {
            return None;
        }

        let column = (point.x / self.tile_size).floor();
        let row = (point.y / self.tile_size).floor();
        if column > f64::from(u32::MAX) || row > f64::from(u32::MAX) {
            return None;
        }

        Some(CellCoord::new(column as u32, row as u32))
    }

    /// World-space center of the provided cell.
    #[must_use]
    pub fn cell_center(&self, cell: CellCoord) -> DVec2 {
        DVec2::new(
            (f64::from(cell.column()) + 0.5) * self.tile_size,
            (f64::from(cell.row()) + 0.5) * self.tile_size,
        )
    }

    /// World-space box covering the provided cell.
    #[must_use]
    pub fn cell_bounds(&self, cell: CellCoord) -> Aabb {
        Aabb::new(
            f64::from(cell.column()) * self.tile_size,
            f64::from(cell.row()) * self.tile_size,
            self.tile_size,
            self.tile_size,
        )
    }
}

impl Default for TileMetrics {
    fn default() -> Self {
        Self::new(DEFAULT_TILE_SIZE)
    }
}

/// Transient velocity applied after a hit, overriding voluntary movement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KnockbackImpulse {
    velocity: DVec2,
    decay: f64,
}

impl KnockbackImpulse {
    /// Creates an impulse with the provided velocity and per-frame decay.
    ///
    /// The decay factor is clamped into `0.0..1.0` so every impulse dies out.
    #[must_use]
    pub fn new(velocity: DVec2, decay: f64) -> Self {
        Self {
            velocity,
            decay: decay.clamp(0.0, 0.999),
        }
    }

    /// Creates a spent impulse that keeps the provided decay for future hits.
    #[must_use]
    pub fn resting(decay: f64) -> Self {
        Self::new(DVec2::ZERO, decay)
    }

    /// Current knockback velocity in pixels per frame.
    #[must_use]
    pub const fn velocity(&self) -> DVec2 {
        self.velocity
    }

    /// Multiplicative decay applied after each knockback frame.
    #[must_use]
    pub const fn decay(&self) -> f64 {
        self.decay
    }

    /// Reports whether the impulse is strong enough to drive motion.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.velocity.length_squared() > KNOCKBACK_EPSILON_SQ
    }

    /// Replaces the velocity, typically when the agent takes a new hit.
    pub fn strike(&mut self, velocity: DVec2) {
        self.velocity = velocity;
    }

    /// Zeroes a residual velocity that fell below the activity threshold.
    pub fn settle(&mut self) {
        if !self.is_active() {
            self.velocity = DVec2::ZERO;
        }
    }

    /// Applies one frame of decay, zeroing the velocity once it is spent.
    pub fn decay_step(&mut self) {
        self.velocity *= self.decay;
        self.settle();
    }
}

impl Default for KnockbackImpulse {
    fn default() -> Self {
        Self::resting(DEFAULT_KNOCKBACK_DECAY)
    }
}
