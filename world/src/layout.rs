//! Level layers exported as tile-code CSV files and the grid derived from them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thicket_core::{Aabb, CellCoord, TileMetrics};
use thiserror::Error;

use crate::grid::WalkabilityGrid;

/// Tile code marking an empty cell in every layer.
pub const EMPTY_TILE: i32 = -1;

/// Entities-layer code that marks the player spawn.
pub const PLAYER_SPAWN_CODE: i32 = 394;

/// Tile edge, in pixels, that the per-kind hitbox offsets were authored for.
const REFERENCE_TILE_SIZE: f64 = 64.0;

/// Role a layer plays when the level is assembled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    /// Invisible map boundary blocks.
    Boundary,
    /// Destructible vegetation.
    Vegetation,
    /// Static props such as rocks and trees.
    Object,
    /// Spawn markers for the player and enemies.
    Entities,
}

impl LayerKind {
    /// Obstacle kind produced by non-empty cells of the layer, if any.
    #[must_use]
    pub const fn obstacle_kind(self) -> Option<ObstacleKind> {
        match self {
            Self::Boundary => Some(ObstacleKind::Boundary),
            Self::Vegetation => Some(ObstacleKind::Vegetation),
            Self::Object => Some(ObstacleKind::Object),
            Self::Entities => None,
        }
    }
}

/// Kinds of collision geometry placed by the level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObstacleKind {
    /// Map boundary; keeps the full tile as its hitbox.
    Boundary,
    /// Static prop with a shallow hitbox so agents can walk behind it.
    Object,
    /// Destructible vegetation that can be cleared at runtime.
    Vegetation,
}

impl ObstacleKind {
    /// Vertical hitbox adjustment in pixels for a 64 pixel tile.
    #[must_use]
    pub const fn hitbox_height_offset(self) -> f64 {
        match self {
            Self::Boundary => 0.0,
            Self::Object => -40.0,
            Self::Vegetation => -10.0,
        }
    }

    /// Whether obstacles of this kind can be removed by `ClearTerrain`.
    #[must_use]
    pub const fn is_destructible(self) -> bool {
        matches!(self, Self::Vegetation)
    }

    /// Hitbox for an obstacle of this kind occupying the provided tile.
    #[must_use]
    pub fn hitbox_for(self, tile: Aabb, tile_size: f64) -> Aabb {
        let scale = tile_size / REFERENCE_TILE_SIZE;
        tile.inflated(0.0, self.hitbox_height_offset() * scale)
    }
}

/// Obstacle description produced from a layout before the world assigns ids.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObstacleSeed {
    /// Kind of obstacle.
    pub kind: ObstacleKind,
    /// Cell the obstacle occupies.
    pub cell: CellCoord,
    /// Collision hitbox in world pixels.
    pub hitbox: Aabb,
}

/// Who spawns at an entities-layer marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpawnKind {
    /// The player character.
    Player,
    /// An enemy, carrying the raw monster code from the layer.
    Enemy(i32),
}

/// Spawn marker read from the entities layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SpawnPoint {
    /// Cell holding the marker.
    pub cell: CellCoord,
    /// Entity that spawns at the marker.
    pub kind: SpawnKind,
}

/// Errors raised while parsing or assembling level layers.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// The CSV reader failed to produce a record.
    #[error("failed to read the {kind:?} layer")]
    Csv {
        /// Layer being parsed.
        kind: LayerKind,
        /// Underlying reader error.
        #[source]
        source: csv::Error,
    },
    /// The layer contained no rows.
    #[error("the {kind:?} layer is empty")]
    EmptyLayer {
        /// Layer being parsed.
        kind: LayerKind,
    },
    /// A row does not match the width of the first row.
    #[error("the {kind:?} layer row {row} has {found} cells, expected {expected}")]
    RaggedLayer {
        /// Layer being parsed.
        kind: LayerKind,
        /// Zero-based offending row.
        row: usize,
        /// Width of the first row.
        expected: usize,
        /// Width of the offending row.
        found: usize,
    },
    /// A cell did not hold an integer tile code.
    #[error("the {kind:?} layer cell ({column}, {row}) holds `{value}`, expected a tile code")]
    InvalidCell {
        /// Layer being parsed.
        kind: LayerKind,
        /// Zero-based column of the cell.
        column: usize,
        /// Zero-based row of the cell.
        row: usize,
        /// Raw cell contents.
        value: String,
    },
    /// The layer exceeds the addressable grid range.
    #[error("the {kind:?} layer is too large to address")]
    TooLarge {
        /// Layer being parsed.
        kind: LayerKind,
    },
    /// Two layers of a level disagree on their dimensions.
    #[error("the {kind:?} layer is {columns}x{rows} but the level is {expected_columns}x{expected_rows}")]
    DimensionMismatch {
        /// Layer that disagrees with the first one.
        kind: LayerKind,
        /// Column count of the offending layer.
        columns: u32,
        /// Row count of the offending layer.
        rows: u32,
        /// Column count of the level.
        expected_columns: u32,
        /// Row count of the level.
        expected_rows: u32,
    },
    /// The same layer kind was supplied more than once.
    #[error("the {kind:?} layer was supplied more than once")]
    DuplicateLayer {
        /// Repeated layer kind.
        kind: LayerKind,
    },
    /// No layers were supplied at all.
    #[error("a level needs at least one layer")]
    NoLayers,
}

/// Single rectangular layer of tile codes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutLayer {
    kind: LayerKind,
    columns: u32,
    rows: u32,
    codes: Vec<i32>,
}

impl LayoutLayer {
    /// Parses a header-less CSV export where each value is a tile code.
    pub fn from_csv_str(kind: LayerKind, contents: &str) -> Result<Self, LayoutError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(contents.as_bytes());

        let mut rows = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|source| LayoutError::Csv { kind, source })?;
            let mut codes = Vec::with_capacity(record.len());
            for (column, value) in record.iter().enumerate() {
                let code = value
                    .trim()
                    .parse::<i32>()
                    .map_err(|_| LayoutError::InvalidCell {
                        kind,
                        column,
                        row,
                        value: value.to_owned(),
                    })?;
                codes.push(code);
            }
            rows.push(codes);
        }

        Self::from_rows(kind, rows)
    }

    /// Builds a layer from explicit rows of tile codes.
    pub fn from_rows(kind: LayerKind, rows: Vec<Vec<i32>>) -> Result<Self, LayoutError> {
        let Some(expected) = rows.first().map(Vec::len) else {
            return Err(LayoutError::EmptyLayer { kind });
        };
        if expected == 0 {
            return Err(LayoutError::EmptyLayer { kind });
        }

        let columns = u32::try_from(expected).map_err(|_| LayoutError::TooLarge { kind })?;
        let row_count = u32::try_from(rows.len()).map_err(|_| LayoutError::TooLarge { kind })?;

        let mut codes = Vec::with_capacity(expected * rows.len());
        for (row, values) in rows.into_iter().enumerate() {
            if values.len() != expected {
                return Err(LayoutError::RaggedLayer {
                    kind,
                    row,
                    expected,
                    found: values.len(),
                });
            }
            codes.extend(values);
        }

        Ok(Self {
            kind,
            columns,
            rows: row_count,
            codes,
        })
    }

    /// Role of the layer.
    #[must_use]
    pub const fn kind(&self) -> LayerKind {
        self.kind
    }

    /// Number of columns in the layer.
    #[must_use]
    pub const fn columns(&self) -> u32 {
        self.columns
    }

    /// Number of rows in the layer.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Tile code stored at the cell, if the cell lies inside the layer.
    #[must_use]
    pub fn code(&self, cell: CellCoord) -> Option<i32> {
        if cell.column() >= self.columns || cell.row() >= self.rows {
            return None;
        }
        let width = usize::try_from(self.columns).ok()?;
        let row = usize::try_from(cell.row()).ok()?;
        let column = usize::try_from(cell.column()).ok()?;
        self.codes.get(row * width + column).copied()
    }

    /// Iterates non-empty cells in row-major order.
    pub fn occupied(&self) -> impl Iterator<Item = (CellCoord, i32)> + '_ {
        let columns = self.columns;
        self.codes
            .iter()
            .enumerate()
            .filter(|(_, code)| **code != EMPTY_TILE)
            .filter_map(move |(index, code)| {
                let index = u32::try_from(index).ok()?;
                Some((
                    CellCoord::new(index % columns, index / columns),
                    *code,
                ))
            })
    }
}

/// Complete set of layers describing one level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelLayout {
    columns: u32,
    rows: u32,
    layers: BTreeMap<LayerKind, LayoutLayer>,
}

impl LevelLayout {
    /// Assembles a level from layers that must share the same dimensions.
    pub fn new(layers: Vec<LayoutLayer>) -> Result<Self, LayoutError> {
        let Some(first) = layers.first() else {
            return Err(LayoutError::NoLayers);
        };
        let columns = first.columns();
        let rows = first.rows();

        let mut by_kind = BTreeMap::new();
        for layer in layers {
            if layer.columns() != columns || layer.rows() != rows {
                return Err(LayoutError::DimensionMismatch {
                    kind: layer.kind(),
                    columns: layer.columns(),
                    rows: layer.rows(),
                    expected_columns: columns,
                    expected_rows: rows,
                });
            }
            let kind = layer.kind();
            if by_kind.insert(kind, layer).is_some() {
                return Err(LayoutError::DuplicateLayer { kind });
            }
        }

        Ok(Self {
            columns,
            rows,
            layers: by_kind,
        })
    }

    /// Number of columns shared by every layer.
    #[must_use]
    pub const fn columns(&self) -> u32 {
        self.columns
    }

    /// Number of rows shared by every layer.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Layer of the requested kind, if the level defines it.
    #[must_use]
    pub fn layer(&self, kind: LayerKind) -> Option<&LayoutLayer> {
        self.layers.get(&kind)
    }

    /// Obstacles placed by blocking layers in boundary, vegetation, object order.
    #[must_use]
    pub fn obstacles(&self, metrics: TileMetrics) -> Vec<ObstacleSeed> {
        let mut seeds = Vec::new();
        for layer in self.layers.values() {
            let Some(kind) = layer.kind().obstacle_kind() else {
                continue;
            };
            for (cell, _) in layer.occupied() {
                let tile = metrics.cell_bounds(cell);
                seeds.push(ObstacleSeed {
                    kind,
                    cell,
                    hitbox: kind.hitbox_for(tile, metrics.tile_size()),
                });
            }
        }
        seeds
    }

    /// Spawn markers from the entities layer in row-major order.
    #[must_use]
    pub fn spawn_points(&self) -> Vec<SpawnPoint> {
        let Some(layer) = self.layer(LayerKind::Entities) else {
            return Vec::new();
        };
        layer
            .occupied()
            .map(|(cell, code)| SpawnPoint {
                cell,
                kind: if code == PLAYER_SPAWN_CODE {
                    SpawnKind::Player
                } else {
                    SpawnKind::Enemy(code)
                },
            })
            .collect()
    }
}

/// Derives the walkability grid of a level.
///
/// Any non-empty cell of the boundary, object, or vegetation layer blocks
/// movement; spawn markers never do.
#[must_use]
pub fn build_grid(layout: &LevelLayout) -> WalkabilityGrid {
    let mut grid = WalkabilityGrid::new_open(layout.columns(), layout.rows());
    for layer in layout.layers.values() {
        if layer.kind().obstacle_kind().is_none() {
            continue;
        }
        for (cell, _) in layer.occupied() {
            let _ = grid.set_walkable(cell, false);
        }
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_layers_parse_codes_and_empty_cells() {
        let layer = LayoutLayer::from_csv_str(LayerKind::Object, "-1,3,-1\n7, -1 ,-1\n")
            .expect("layer parses");

        assert_eq!(layer.columns(), 3);
        assert_eq!(layer.rows(), 2);
        assert_eq!(layer.code(CellCoord::new(1, 0)), Some(3));
        assert_eq!(layer.code(CellCoord::new(1, 1)), Some(EMPTY_TILE));
        let occupied: Vec<_> = layer.occupied().collect();
        assert_eq!(
            occupied,
            vec![(CellCoord::new(1, 0), 3), (CellCoord::new(0, 1), 7)]
        );
    }

    #[test]
    fn csv_layers_reject_ragged_rows_and_garbage() {
        assert!(matches!(
            LayoutLayer::from_csv_str(LayerKind::Boundary, "-1,-1\n-1\n"),
            Err(LayoutError::RaggedLayer { row: 1, .. })
        ));
        assert!(matches!(
            LayoutLayer::from_csv_str(LayerKind::Boundary, "-1,x\n"),
            Err(LayoutError::InvalidCell { column: 1, row: 0, .. })
        ));
        assert!(matches!(
            LayoutLayer::from_csv_str(LayerKind::Boundary, ""),
            Err(LayoutError::EmptyLayer { .. })
        ));
    }

    #[test]
    fn level_rejects_mismatched_and_duplicate_layers() {
        let small = LayoutLayer::from_rows(LayerKind::Boundary, vec![vec![-1]]).expect("layer");
        let wide = LayoutLayer::from_rows(LayerKind::Object, vec![vec![-1, -1]]).expect("layer");

        assert!(matches!(
            LevelLayout::new(vec![small.clone(), wide]),
            Err(LayoutError::DimensionMismatch { kind: LayerKind::Object, .. })
        ));
        assert!(matches!(
            LevelLayout::new(vec![small.clone(), small]),
            Err(LayoutError::DuplicateLayer { kind: LayerKind::Boundary })
        ));
        assert!(matches!(LevelLayout::new(Vec::new()), Err(LayoutError::NoLayers)));
    }

    #[test]
    fn build_grid_blocks_obstacle_layers_but_not_spawns() {
        let layout = LevelLayout::new(vec![
            LayoutLayer::from_rows(LayerKind::Boundary, vec![vec![0, -1, -1]]).expect("layer"),
            LayoutLayer::from_rows(LayerKind::Vegetation, vec![vec![-1, 8, -1]]).expect("layer"),
            LayoutLayer::from_rows(LayerKind::Entities, vec![vec![-1, -1, 394]]).expect("layer"),
        ])
        .expect("layout");

        let grid = build_grid(&layout);

        assert!(!grid.is_walkable(CellCoord::new(0, 0)));
        assert!(!grid.is_walkable(CellCoord::new(1, 0)));
        assert!(grid.is_walkable(CellCoord::new(2, 0)));
        assert_eq!(
            layout.spawn_points(),
            vec![SpawnPoint {
                cell: CellCoord::new(2, 0),
                kind: SpawnKind::Player
            }]
        );
    }

    #[test]
    fn obstacle_hitboxes_follow_kind_offsets() {
        let layout = LevelLayout::new(vec![
            LayoutLayer::from_rows(LayerKind::Object, vec![vec![-1, 2]]).expect("layer"),
        ])
        .expect("layout");

        let seeds = layout.obstacles(TileMetrics::new(32.0));

        assert_eq!(seeds.len(), 1);
        let seed = seeds[0];
        assert_eq!(seed.kind, ObstacleKind::Object);
        assert_eq!(seed.cell, CellCoord::new(1, 0));
        assert_eq!(seed.hitbox.left(), 32.0);
        assert_eq!(seed.hitbox.width(), 32.0);
        assert_eq!(seed.hitbox.height(), 12.0);
        assert_eq!(seed.hitbox.center().y, 16.0);
    }
}
