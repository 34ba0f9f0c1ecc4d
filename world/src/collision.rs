//! Providers feeding obstacle hitboxes into agent collision tests.

use thicket_core::{Aabb, EntityId};

use crate::{spatial::SpatialHashGrid, Obstacle};

/// Source of obstacle hitboxes that may overlap a queried area.
///
/// Implementations may return boxes that do not actually overlap `area`;
/// callers always perform the exact overlap test themselves.
pub trait CollisionProvider {
    /// Appends candidate obstacle hitboxes near `area` to `out`.
    fn candidates(&self, area: &Aabb, out: &mut Vec<Aabb>);
}

impl CollisionProvider for [Aabb] {
    fn candidates(&self, _area: &Aabb, out: &mut Vec<Aabb>) {
        out.extend_from_slice(self);
    }
}

/// Provider that reports every obstacle in the level.
#[derive(Clone, Copy, Debug)]
pub struct LinearScan<'a> {
    obstacles: &'a [Obstacle],
}

impl<'a> LinearScan<'a> {
    /// Wraps the full obstacle registry.
    #[must_use]
    pub const fn new(obstacles: &'a [Obstacle]) -> Self {
        Self { obstacles }
    }
}

impl CollisionProvider for LinearScan<'_> {
    fn candidates(&self, _area: &Aabb, out: &mut Vec<Aabb>) {
        out.extend(self.obstacles.iter().map(|obstacle| obstacle.hitbox));
    }
}

/// Provider narrowing candidates through the per-frame spatial hash grid.
#[derive(Clone, Copy, Debug)]
pub struct SpatialIndex<'a> {
    grid: &'a SpatialHashGrid<EntityId>,
}

impl<'a> SpatialIndex<'a> {
    /// Wraps a grid that was rebuilt for the current frame.
    #[must_use]
    pub const fn new(grid: &'a SpatialHashGrid<EntityId>) -> Self {
        Self { grid }
    }
}

impl CollisionProvider for SpatialIndex<'_> {
    fn candidates(&self, area: &Aabb, out: &mut Vec<Aabb>) {
        out.extend(self.grid.query_entries(area).into_iter().map(|(_, aabb)| *aabb));
    }
}

/// Provider selected by an agent's construction-time collider choice.
#[derive(Clone, Copy, Debug)]
pub enum Collider<'a> {
    /// Every obstacle is a candidate.
    LinearScan(LinearScan<'a>),
    /// Candidates come from the spatial hash grid.
    SpatialHash(SpatialIndex<'a>),
}

impl CollisionProvider for Collider<'_> {
    fn candidates(&self, area: &Aabb, out: &mut Vec<Aabb>) {
        match self {
            Self::LinearScan(provider) => provider.candidates(area, out),
            Self::SpatialHash(provider) => provider.candidates(area, out),
        }
    }
}
