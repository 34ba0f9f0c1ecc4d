//! Dense walkability grid shared by the pathfinder and the level loader.

use thicket_core::CellCoord;
use thiserror::Error;

/// Errors raised while assembling a walkability grid from raw rows.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GridError {
    /// A row does not match the width established by the first row.
    #[error("row {row} has {found} cells but the first row has {expected}")]
    Ragged {
        /// Zero-based index of the offending row.
        row: usize,
        /// Width of the first row.
        expected: usize,
        /// Width of the offending row.
        found: usize,
    },
    /// The requested dimensions cannot be addressed with `u32` coordinates.
    #[error("grid of {columns}x{rows} cells exceeds the addressable range")]
    TooLarge {
        /// Requested column count.
        columns: usize,
        /// Requested row count.
        rows: usize,
    },
}

/// Rectangular map of passable cells where `true` means walkable.
///
/// Cells are stored in row-major order. The grid is never resized after
/// construction; destructible terrain only flips individual cells. Reads
/// outside the grid report blocked cells and writes outside it are ignored,
/// so callers never index out of range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalkabilityGrid {
    columns: u32,
    rows: u32,
    cells: Vec<bool>,
}

impl WalkabilityGrid {
    /// Creates a grid where every cell is walkable.
    #[must_use]
    pub fn new_open(columns: u32, rows: u32) -> Self {
        let count = u64::from(columns) * u64::from(rows);
        let count = usize::try_from(count).unwrap_or(0);
        Self {
            columns,
            rows,
            cells: vec![true; count],
        }
    }

    /// Builds a grid from explicit rows of walkability flags.
    pub fn from_rows(rows: Vec<Vec<bool>>) -> Result<Self, GridError> {
        let expected = rows.first().map_or(0, Vec::len);
        let too_large = GridError::TooLarge {
            columns: expected,
            rows: rows.len(),
        };
        let columns = u32::try_from(expected).map_err(|_| too_large.clone())?;
        let row_count = u32::try_from(rows.len()).map_err(|_| too_large)?;

        let mut cells = Vec::with_capacity(expected * rows.len());
        for (index, row) in rows.into_iter().enumerate() {
            if row.len() != expected {
                return Err(GridError::Ragged {
                    row: index,
                    expected,
                    found: row.len(),
                });
            }
            cells.extend(row);
        }

        Ok(Self {
            columns,
            rows: row_count,
            cells,
        })
    }

    /// Number of columns in the grid.
    #[must_use]
    pub const fn columns(&self) -> u32 {
        self.columns
    }

    /// Number of rows in the grid.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Total number of cells stored by the grid.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Reports whether the cell lies inside the grid.
    #[must_use]
    pub const fn contains(&self, cell: CellCoord) -> bool {
        cell.column() < self.columns && cell.row() < self.rows
    }

    /// Reports whether the cell lies inside the grid and is passable.
    #[must_use]
    pub fn is_walkable(&self, cell: CellCoord) -> bool {
        self.index(cell)
            .and_then(|index| self.cells.get(index).copied())
            .unwrap_or(false)
    }

    /// Updates the walkability of a cell, returning whether anything changed.
    pub fn set_walkable(&mut self, cell: CellCoord, walkable: bool) -> bool {
        let Some(slot) = self.index(cell).and_then(|index| self.cells.get_mut(index)) else {
            return false;
        };
        let changed = *slot != walkable;
        *slot = walkable;
        changed
    }

    /// Number of walkable cells in the grid.
    #[must_use]
    pub fn walkable_count(&self) -> usize {
        self.cells.iter().filter(|walkable| **walkable).count()
    }

    pub(crate) fn index(&self, cell: CellCoord) -> Option<usize> {
        if !self.contains(cell) {
            return None;
        }
        let row = usize::try_from(cell.row()).ok()?;
        let column = usize::try_from(cell.column()).ok()?;
        let width = usize::try_from(self.columns).ok()?;
        row.checked_mul(width)?.checked_add(column)
    }
}

/// Flips a single cell, typically after destructible terrain was removed.
///
/// Out-of-bounds coordinates are ignored. Returns whether the cell changed.
pub fn set_cell_walkable(grid: &mut WalkabilityGrid, column: u32, row: u32, walkable: bool) -> bool {
    grid.set_walkable(CellCoord::new(column, row), walkable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rows_rejects_ragged_input() {
        let result = WalkabilityGrid::from_rows(vec![vec![true, true], vec![true]]);
        assert_eq!(
            result,
            Err(GridError::Ragged {
                row: 1,
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn out_of_bounds_cells_read_as_blocked() {
        let grid = WalkabilityGrid::new_open(2, 2);
        assert!(grid.is_walkable(CellCoord::new(1, 1)));
        assert!(!grid.is_walkable(CellCoord::new(2, 0)));
        assert!(!grid.is_walkable(CellCoord::new(0, 2)));
    }

    #[test]
    fn set_cell_walkable_reports_changes_and_ignores_out_of_bounds() {
        let mut grid = WalkabilityGrid::new_open(3, 2);

        assert!(set_cell_walkable(&mut grid, 2, 1, false));
        assert!(!set_cell_walkable(&mut grid, 2, 1, false));
        assert!(!grid.is_walkable(CellCoord::new(2, 1)));
        assert!(!set_cell_walkable(&mut grid, 5, 5, false));
        assert_eq!(grid.walkable_count(), 5);
    }
}
