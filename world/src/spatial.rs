//! Uniform spatial hash grid for broad-phase obstacle queries.

use std::collections::HashMap;

use glam::DVec2;
use thicket_core::{Aabb, SpatialCell};
use thiserror::Error;

/// Inset applied to the max corner so boxes ending on a cell edge stay out of the next cell.
const EDGE_EPSILON: f64 = 1e-9;

/// Errors raised while configuring a spatial hash grid.
#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum SpatialConfigError {
    /// The bucket edge length must be finite and strictly positive.
    #[error("spatial cell size must be finite and positive, got {0}")]
    InvalidCellSize(f64),
}

/// Occupancy counters describing the current contents of a grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SpatialStats {
    /// Number of inserted entries.
    pub entries: usize,
    /// Number of buckets holding at least one entry.
    pub occupied_cells: usize,
    /// Largest number of entries sharing a single bucket.
    pub max_bucket_len: usize,
}

/// Buckets lightweight handles by the square cells their boxes cover.
///
/// The grid records each entry's box at insertion time and never updates it;
/// callers rebuild the whole grid with [`SpatialHashGrid::clear`] followed by
/// [`SpatialHashGrid::insert`] whenever the underlying geometry changes.
/// Queries return candidates only and never miss an entry whose box touches
/// the queried area.
#[derive(Clone, Debug)]
pub struct SpatialHashGrid<H> {
    cell_size: f64,
    entries: Vec<(H, Aabb)>,
    buckets: HashMap<SpatialCell, Vec<usize>>,
}

impl<H: Copy> SpatialHashGrid<H> {
    /// Creates an empty grid with square buckets of the provided edge length.
    pub fn new(cell_size: f64) -> Result<Self, SpatialConfigError> {
        if !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(SpatialConfigError::InvalidCellSize(cell_size));
        }

        Ok(Self {
            cell_size,
            entries: Vec::new(),
            buckets: HashMap::new(),
        })
    }

    /// Edge length of a bucket in world pixels.
    #[must_use]
    pub const fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Number of inserted entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Reports whether the grid holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry and bucket.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.buckets.clear();
    }

    /// Bucket containing the provided world position.
    #[must_use]
    pub fn cell_for(&self, x: f64, y: f64) -> SpatialCell {
        SpatialCell::new(
            (x / self.cell_size).floor() as i64,
            (y / self.cell_size).floor() as i64,
        )
    }

    /// Records the handle in every bucket its box covers.
    pub fn insert(&mut self, handle: H, aabb: Aabb) {
        let index = self.entries.len();
        self.entries.push((handle, aabb));

        let (min, max) = self.covered_range(&aabb);
        for y in min.y..=max.y {
            for x in min.x..=max.x {
                self.buckets
                    .entry(SpatialCell::new(x, y))
                    .or_default()
                    .push(index);
            }
        }
    }

    /// Handles whose buckets intersect the area, deduplicated, in insertion order.
    #[must_use]
    pub fn query(&self, area: &Aabb) -> Vec<H> {
        self.candidate_indices(area)
            .into_iter()
            .filter_map(|index| self.entries.get(index).map(|(handle, _)| *handle))
            .collect()
    }

    /// Same as [`SpatialHashGrid::query`] but also yields the recorded boxes.
    #[must_use]
    pub fn query_entries(&self, area: &Aabb) -> Vec<(H, &Aabb)> {
        self.candidate_indices(area)
            .into_iter()
            .filter_map(|index| self.entries.get(index).map(|(handle, aabb)| (*handle, aabb)))
            .collect()
    }

    /// Handles stored in the single bucket containing the point.
    #[must_use]
    pub fn query_point(&self, x: f64, y: f64) -> Vec<H> {
        self.buckets
            .get(&self.cell_for(x, y))
            .map(|bucket| {
                bucket
                    .iter()
                    .filter_map(|index| self.entries.get(*index).map(|(handle, _)| *handle))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Handles whose box center lies within `radius` of `center`.
    #[must_use]
    pub fn query_radius(&self, center: DVec2, radius: f64) -> Vec<H> {
        let radius = radius.max(0.0);
        let bounds = Aabb::from_center(center, radius * 2.0, radius * 2.0);
        self.query_entries(&bounds)
            .into_iter()
            .filter(|(_, aabb)| aabb.center().distance(center) <= radius)
            .map(|(handle, _)| handle)
            .collect()
    }

    /// Occupancy counters for the current contents.
    #[must_use]
    pub fn stats(&self) -> SpatialStats {
        SpatialStats {
            entries: self.entries.len(),
            occupied_cells: self.buckets.values().filter(|bucket| !bucket.is_empty()).count(),
            max_bucket_len: self.buckets.values().map(Vec::len).max().unwrap_or(0),
        }
    }

    fn covered_range(&self, aabb: &Aabb) -> (SpatialCell, SpatialCell) {
        let min = self.cell_for(aabb.left(), aabb.top());
        let max = self.cell_for(aabb.right() - EDGE_EPSILON, aabb.bottom() - EDGE_EPSILON);
        (min, SpatialCell::new(max.x.max(min.x), max.y.max(min.y)))
    }

    fn candidate_indices(&self, area: &Aabb) -> Vec<usize> {
        let (min, max) = self.covered_range(area);
        let mut indices = Vec::new();

        let span_x = u128::from(max.x.abs_diff(min.x)) + 1;
        let span_y = u128::from(max.y.abs_diff(min.y)) + 1;
        if span_x * span_y > self.buckets.len() as u128 {
            for (cell, bucket) in &self.buckets {
                if (min.x..=max.x).contains(&cell.x) && (min.y..=max.y).contains(&cell.y) {
                    indices.extend_from_slice(bucket);
                }
            }
        } else {
            for y in min.y..=max.y {
                for x in min.x..=max.x {
                    if let Some(bucket) = self.buckets.get(&SpatialCell::new(x, y)) {
                        indices.extend_from_slice(bucket);
                    }
                }
            }
        }

        indices.sort_unstable();
        indices.dedup();
        indices
    }
}
