//! Grid A* search and line-of-sight path smoothing.

use std::{cmp::Ordering, collections::BinaryHeap, f64::consts::SQRT_2};

use log::debug;
use thicket_core::CellCoord;

use crate::grid::WalkabilityGrid;

/// Neighbor offsets as `(columns, rows)`; expansion order is significant for ties.
const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (0, 1),
    (1, 0),
    (0, -1),
    (-1, 0),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// Reusable A* search state sized to the most recently searched grid.
///
/// Nodes live in an arena and link to their parents by index, so every search
/// allocates nothing once the scratch buffers reached the grid size. Diagonal
/// steps are allowed even when both orthogonal flanks are blocked.
#[derive(Clone, Debug, Default)]
pub struct Pathfinder {
    expansion_limit: Option<usize>,
    nodes: Vec<PathNode>,
    open: BinaryHeap<OpenEntry>,
    best_f: Vec<f64>,
    closed: Vec<bool>,
    sequence: u64,
}

#[derive(Clone, Copy, Debug)]
struct PathNode {
    position: CellCoord,
    parent: Option<usize>,
    g: f64,
}

#[derive(Clone, Copy, Debug)]
struct OpenEntry {
    f: f64,
    sequence: u64,
    node: usize,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    // Reversed so the max-heap pops the lowest `f`, oldest first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl Pathfinder {
    /// Creates a pathfinder without an expansion budget.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pathfinder that gives up after `limit` node expansions.
    #[must_use]
    pub fn with_expansion_limit(limit: usize) -> Self {
        Self {
            expansion_limit: Some(limit),
            ..Self::default()
        }
    }

    /// Expansion budget applied to each search, if any.
    #[must_use]
    pub const fn expansion_limit(&self) -> Option<usize> {
        self.expansion_limit
    }

    /// Finds the raw 8-connected route from `start` to `goal`.
    ///
    /// The returned cells begin with `start`, end with `goal`, and consecutive
    /// entries are grid neighbors. An empty vector means the endpoints are
    /// blocked, outside the grid, disconnected, or the expansion budget ran out.
    pub fn find_path(
        &mut self,
        grid: &WalkabilityGrid,
        start: CellCoord,
        goal: CellCoord,
    ) -> Vec<CellCoord> {
        if !grid.is_walkable(start) || !grid.is_walkable(goal) {
            return Vec::new();
        }
        if start == goal {
            return vec![start];
        }

        self.reset(grid.cell_count());
        let Some(start_index) = grid.index(start) else {
            return Vec::new();
        };
        let start_f = start.euclidean_distance(goal);
        self.best_f[start_index] = start_f;
        self.push(start, None, 0.0, start_f);

        let mut expansions = 0usize;
        while let Some(entry) = self.open.pop() {
            let Some(node) = self.nodes.get(entry.node).copied() else {
                continue;
            };
            let Some(index) = grid.index(node.position) else {
                continue;
            };
            if self.closed[index] {
                continue;
            }
            if node.position == goal {
                return self.reconstruct(entry.node);
            }

            self.closed[index] = true;
            expansions += 1;
            if let Some(limit) = self.expansion_limit {
                if expansions > limit {
                    debug!(
                        "search from {start:?} to {goal:?} abandoned after {limit} expansions"
                    );
                    return Vec::new();
                }
            }

            for (columns, rows) in NEIGHBOR_OFFSETS {
                let Some(neighbor) = node.position.offset(columns, rows) else {
                    continue;
                };
                if !grid.is_walkable(neighbor) {
                    continue;
                }
                let Some(neighbor_index) = grid.index(neighbor) else {
                    continue;
                };
                if self.closed[neighbor_index] {
                    continue;
                }

                let step = if columns != 0 && rows != 0 { SQRT_2 } else { 1.0 };
                let g = node.g + step;
                let f = g + neighbor.euclidean_distance(goal);
                if f >= self.best_f[neighbor_index] {
                    continue;
                }

                self.best_f[neighbor_index] = f;
                self.push(neighbor, Some(entry.node), g, f);
            }
        }

        Vec::new()
    }

    /// Finds a route and removes intermediate points that have line of sight.
    pub fn plan_path(
        &mut self,
        grid: &WalkabilityGrid,
        start: CellCoord,
        goal: CellCoord,
    ) -> Vec<CellCoord> {
        let path = self.find_path(grid, start, goal);
        smooth_path(grid, &path)
    }

    fn reset(&mut self, cell_count: usize) {
        self.nodes.clear();
        self.open.clear();
        self.sequence = 0;
        if self.best_f.len() != cell_count {
            self.best_f = vec![f64::INFINITY; cell_count];
            self.closed = vec![false; cell_count];
        } else {
            self.best_f.fill(f64::INFINITY);
            self.closed.fill(false);
        }
    }

    fn push(&mut self, position: CellCoord, parent: Option<usize>, g: f64, f: f64) {
        let node = self.nodes.len();
        self.nodes.push(PathNode {
            position,
            parent,
            g,
        });
        self.open.push(OpenEntry {
            f,
            sequence: self.sequence,
            node,
        });
        self.sequence += 1;
    }

    fn reconstruct(&self, mut node: usize) -> Vec<CellCoord> {
        let mut path = Vec::new();
        while let Some(current) = self.nodes.get(node) {
            path.push(current.position);
            match current.parent {
                Some(parent) => node = parent,
                None => break,
            }
        }
        path.reverse();
        path
    }
}

/// Finds the raw route using a throwaway [`Pathfinder`].
#[must_use]
pub fn find_path(grid: &WalkabilityGrid, start: CellCoord, goal: CellCoord) -> Vec<CellCoord> {
    Pathfinder::new().find_path(grid, start, goal)
}

/// Finds and smooths a route using a throwaway [`Pathfinder`].
#[must_use]
pub fn plan_path(grid: &WalkabilityGrid, start: CellCoord, goal: CellCoord) -> Vec<CellCoord> {
    Pathfinder::new().plan_path(grid, start, goal)
}

/// Reports whether a Bresenham line from `from` reaches `to` through walkable cells.
///
/// Every rasterized cell before `to` must lie inside the grid and be walkable;
/// the destination itself is not inspected.
#[must_use]
pub fn has_line_of_sight(grid: &WalkabilityGrid, from: CellCoord, to: CellCoord) -> bool {
    let (mut x, mut y) = (i64::from(from.column()), i64::from(from.row()));
    let (end_x, end_y) = (i64::from(to.column()), i64::from(to.row()));
    let dx = (end_x - x).abs();
    let dy = (end_y - y).abs();
    let step_x = if x < end_x { 1 } else { -1 };
    let step_y = if y < end_y { 1 } else { -1 };
    let mut error = dx - dy;

    while x != end_x || y != end_y {
        let walkable = u32::try_from(x)
            .ok()
            .zip(u32::try_from(y).ok())
            .is_some_and(|(column, row)| grid.is_walkable(CellCoord::new(column, row)));
        if !walkable {
            return false;
        }

        let doubled = 2 * error;
        if doubled > -dy {
            error -= dy;
            x += step_x;
        }
        if doubled < dx {
            error += dx;
            y += step_y;
        }
    }

    true
}

/// Drops intermediate waypoints that can be skipped along a clear line.
///
/// From each anchor the farthest later point with line of sight becomes the
/// next anchor; when none is visible the very next point is kept, never the
/// final one, so no emitted leg skips cells without line of sight. Paths with
/// fewer than three entries are returned unchanged, endpoints always survive,
/// and the result is never longer than the input.
#[must_use]
pub fn smooth_path(grid: &WalkabilityGrid, path: &[CellCoord]) -> Vec<CellCoord> {
    if path.len() < 3 {
        return path.to_vec();
    }

    let last = path.len() - 1;
    let mut smoothed = vec![path[0]];
    let mut anchor = 0;
    while anchor < last {
        let mut next = anchor + 1;
        for candidate in anchor + 2..=last {
            if has_line_of_sight(grid, path[anchor], path[candidate]) {
                next = candidate;
            }
        }
        smoothed.push(path[next]);
        anchor = next;
    }

    smoothed
}
