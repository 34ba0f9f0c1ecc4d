#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative level state for the Thicket navigation engine.
//!
//! The world owns the walkability grid, the obstacle registry, and the
//! per-frame spatial index. It mutates only in response to [`Command`] values
//! passed through [`apply`] and exposes read-only views through [`query`].

mod collision;
mod grid;
mod layout;
mod navigation;
mod spatial;

pub use collision::{Collider, CollisionProvider, LinearScan, SpatialIndex};
pub use grid::{set_cell_walkable, GridError, WalkabilityGrid};
pub use layout::{
    build_grid, LayerKind, LayoutError, LayoutLayer, LevelLayout, ObstacleKind, ObstacleSeed,
    SpawnKind, SpawnPoint, EMPTY_TILE, PLAYER_SPAWN_CODE,
};
pub use navigation::{find_path, has_line_of_sight, plan_path, smooth_path, Pathfinder};
pub use spatial::{SpatialConfigError, SpatialHashGrid, SpatialStats};

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use thicket_core::{Aabb, CellCoord, Command, EntityId, Event, TileMetrics, DEFAULT_TILE_SIZE};
use thiserror::Error;

/// Spatial bucket edge expressed in tiles when no explicit size is configured.
const DEFAULT_SPATIAL_CELL_TILES: f64 = 2.0;

/// Tunables applied when a world is assembled.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Edge length of a map tile in world pixels.
    pub tile_size: f64,
    /// Edge length of a spatial hash bucket; defaults to two tiles.
    pub spatial_cell_size: Option<f64>,
}

impl WorldConfig {
    /// Bucket edge length that the spatial index will use.
    #[must_use]
    pub fn resolved_cell_size(&self) -> f64 {
        self.spatial_cell_size
            .unwrap_or(self.tile_size * DEFAULT_SPATIAL_CELL_TILES)
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            spatial_cell_size: None,
        }
    }
}

/// Errors raised while assembling a world.
#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum WorldError {
    /// The tile size must be finite and strictly positive.
    #[error("tile size must be finite and positive, got {0}")]
    InvalidTileSize(f64),
    /// The spatial index could not be configured.
    #[error(transparent)]
    Spatial(#[from] SpatialConfigError),
}

/// Collision geometry registered with the world.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Obstacle {
    /// Identifier allocated in layout order.
    pub id: EntityId,
    /// Kind of obstacle.
    pub kind: ObstacleKind,
    /// Cell the obstacle occupies.
    pub cell: CellCoord,
    /// Collision hitbox in world pixels.
    pub hitbox: Aabb,
}

/// Represents the authoritative level state.
#[derive(Debug)]
pub struct World {
    metrics: TileMetrics,
    grid: WalkabilityGrid,
    obstacles: Vec<Obstacle>,
    spatial: SpatialHashGrid<EntityId>,
    spawn_points: Vec<SpawnPoint>,
    frame: u64,
}

impl World {
    /// Builds a world from a parsed level layout.
    ///
    /// The spatial index starts empty and is populated by the first
    /// [`Command::Tick`].
    pub fn from_layout(layout: &LevelLayout, config: WorldConfig) -> Result<Self, WorldError> {
        let metrics = validated_metrics(config)?;
        Self::assemble(
            build_grid(layout),
            layout.obstacles(metrics),
            layout.spawn_points(),
            metrics,
            config,
        )
    }

    /// Builds a world from a bare grid, placing a boundary obstacle on every blocked cell.
    pub fn from_grid(grid: WalkabilityGrid, config: WorldConfig) -> Result<Self, WorldError> {
        let metrics = validated_metrics(config)?;
        let kind = ObstacleKind::Boundary;
        let mut seeds = Vec::new();
        for row in 0..grid.rows() {
            for column in 0..grid.columns() {
                let cell = CellCoord::new(column, row);
                if grid.is_walkable(cell) {
                    continue;
                }
                seeds.push(ObstacleSeed {
                    kind,
                    cell,
                    hitbox: kind.hitbox_for(metrics.cell_bounds(cell), metrics.tile_size()),
                });
            }
        }
        Self::assemble(grid, seeds, Vec::new(), metrics, config)
    }

    fn assemble(
        grid: WalkabilityGrid,
        seeds: Vec<ObstacleSeed>,
        spawn_points: Vec<SpawnPoint>,
        metrics: TileMetrics,
        config: WorldConfig,
    ) -> Result<Self, WorldError> {
        let spatial = SpatialHashGrid::new(config.resolved_cell_size())?;
        let obstacles = seeds
            .into_iter()
            .zip(0_u32..)
            .map(|(seed, id)| Obstacle {
                id: EntityId::new(id),
                kind: seed.kind,
                cell: seed.cell,
                hitbox: seed.hitbox,
            })
            .collect();

        Ok(Self {
            metrics,
            grid,
            obstacles,
            spatial,
            spawn_points,
            frame: 0,
        })
    }

    fn clear_terrain(&mut self, cell: CellCoord, out_events: &mut Vec<Event>) {
        let Some(position) = self
            .obstacles
            .iter()
            .position(|obstacle| obstacle.cell == cell && obstacle.kind.is_destructible())
        else {
            return;
        };

        let removed = self.obstacles.remove(position);
        let still_blocked = self.obstacles.iter().any(|obstacle| obstacle.cell == cell);
        if !still_blocked {
            let _ = self.grid.set_walkable(cell, true);
        }

        debug!(
            "cleared {:?} at {cell:?}, cell walkable: {}",
            removed.id,
            !still_blocked
        );
        out_events.push(Event::TerrainCleared {
            cell,
            obstacle: removed.id,
        });
    }

    fn rebuild_spatial_index(&mut self) -> usize {
        self.spatial.clear();
        for obstacle in &self.obstacles {
            self.spatial.insert(obstacle.id, obstacle.hitbox);
        }
        self.spatial.len()
    }
}

fn validated_metrics(config: WorldConfig) -> Result<TileMetrics, WorldError> {
    if !config.tile_size.is_finite() || config.tile_size <= 0.0 {
        return Err(WorldError::InvalidTileSize(config.tile_size));
    }
    Ok(TileMetrics::new(config.tile_size))
}

/// Applies the provided command to the world, mutating state deterministically.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::ClearTerrain { cell } => world.clear_terrain(cell, out_events),
        Command::Tick => {
            world.frame = world.frame.saturating_add(1);
            let entries = world.rebuild_spatial_index();
            trace!(
                "frame {} rebuilt spatial index: {:?}",
                world.frame,
                world.spatial.stats()
            );
            out_events.push(Event::TimeAdvanced { frame: world.frame });
            out_events.push(Event::SpatialIndexRebuilt { entries });
        }
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use thicket_core::{ColliderKind, EntityId, TileMetrics};

    use super::{
        Collider, LinearScan, Obstacle, SpatialHashGrid, SpatialIndex, SpawnPoint,
        WalkabilityGrid, World,
    };

    /// Walkability grid reflecting all terrain cleared so far.
    #[must_use]
    pub fn grid(world: &World) -> &WalkabilityGrid {
        &world.grid
    }

    /// Pixel and cell conversion used by the level.
    #[must_use]
    pub fn metrics(world: &World) -> TileMetrics {
        world.metrics
    }

    /// Obstacles currently present in the level, in id order.
    #[must_use]
    pub fn obstacles(world: &World) -> &[Obstacle] {
        &world.obstacles
    }

    /// Spatial index as rebuilt by the most recent tick.
    #[must_use]
    pub fn spatial_index(world: &World) -> &SpatialHashGrid<EntityId> {
        &world.spatial
    }

    /// Collision provider matching an agent's collider choice.
    #[must_use]
    pub fn collider(world: &World, kind: ColliderKind) -> Collider<'_> {
        match kind {
            ColliderKind::LinearScan => Collider::LinearScan(LinearScan::new(&world.obstacles)),
            ColliderKind::SpatialHash => Collider::SpatialHash(SpatialIndex::new(&world.spatial)),
        }
    }

    /// Spawn markers read from the level's entities layer.
    #[must_use]
    pub fn spawn_points(world: &World) -> &[SpawnPoint] {
        &world.spawn_points
    }

    /// Index of the most recently started frame; zero before the first tick.
    #[must_use]
    pub fn frame(world: &World) -> u64 {
        world.frame
    }
}
