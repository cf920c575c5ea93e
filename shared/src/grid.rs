use serde::{Deserialize, Serialize};

pub const GRID_COLS: u32 = 1250;
pub const GRID_ROWS: u32 = 800;
pub const TOTAL_CELLS: u32 = GRID_COLS * GRID_ROWS;

/// Tile footprint in world units. The gap is split evenly around each tile.
pub const TILE_WIDTH: f64 = 56.0;
pub const TILE_HEIGHT: f64 = 100.0;
pub const TILE_GAP: f64 = 1.0;

/// Flat cell identity: `row * cols + col`. Always recomputable from the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u32);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPos {
    pub col: i32,
    pub row: i32,
}

impl GridPos {
    pub const fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }

    /// Chebyshev distance, i.e. which concentric square ring the cell sits on.
    pub fn ring_distance(self, other: GridPos) -> i32 {
        (self.col - other.col).abs().max((self.row - other.row).abs())
    }
}

/// Grid dimensions. Production uses [`GridDims::DEFAULT`]; tests shrink it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDims {
    pub cols: u32,
    pub rows: u32,
}

impl Default for GridDims {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl GridDims {
    pub const DEFAULT: GridDims = GridDims {
        cols: GRID_COLS,
        rows: GRID_ROWS,
    };

    pub const fn new(cols: u32, rows: u32) -> Self {
        Self { cols, rows }
    }

    pub fn cell_count(&self) -> u32 {
        self.cols * self.rows
    }

    pub fn center(&self) -> GridPos {
        GridPos::new((self.cols / 2) as i32, (self.rows / 2) as i32)
    }

    /// Ring distance from the center to the farthest edge cell.
    pub fn max_ring_distance(&self) -> i32 {
        let center = self.center();
        center
            .col
            .max(center.row)
            .max(self.cols as i32 - 1 - center.col)
            .max(self.rows as i32 - 1 - center.row)
    }

    pub fn contains(&self, pos: GridPos) -> bool {
        pos.col >= 0 && pos.row >= 0 && (pos.col as u32) < self.cols && (pos.row as u32) < self.rows
    }

    /// Position to id, or `None` when the position is outside the grid.
    pub fn grid_to_id(&self, pos: GridPos) -> Option<BlockId> {
        if !self.contains(pos) {
            return None;
        }
        Some(BlockId(pos.row as u32 * self.cols + pos.col as u32))
    }

    /// Id to position, or `None` for ids past the last cell.
    pub fn id_to_grid(&self, id: BlockId) -> Option<GridPos> {
        if id.0 >= self.cell_count() {
            return None;
        }
        Some(GridPos::new(
            (id.0 % self.cols) as i32,
            (id.0 / self.cols) as i32,
        ))
    }

    /// World-space extent of the whole grid.
    pub fn world_size(&self) -> (f64, f64) {
        (
            self.cols as f64 * TILE_WIDTH,
            self.rows as f64 * TILE_HEIGHT,
        )
    }

    /// Cell containing a world point. Never clamps: outside points yield `None`.
    pub fn world_to_grid(&self, wx: f64, wy: f64) -> Option<GridPos> {
        if !wx.is_finite() || !wy.is_finite() {
            return None;
        }
        let col = (wx / TILE_WIDTH).floor();
        let row = (wy / TILE_HEIGHT).floor();
        if col < 0.0 || row < 0.0 || col >= self.cols as f64 || row >= self.rows as f64 {
            return None;
        }
        Some(GridPos::new(col as i32, row as i32))
    }
}

/// World-space center of a cell.
pub fn cell_center(pos: GridPos) -> (f64, f64) {
    (
        pos.col as f64 * TILE_WIDTH + TILE_WIDTH / 2.0,
        pos.row as f64 * TILE_HEIGHT + TILE_HEIGHT / 2.0,
    )
}

/// World-space top-left of the drawn (gap-inset) tile quad.
pub fn tile_origin(pos: GridPos) -> (f64, f64) {
    (
        pos.col as f64 * TILE_WIDTH + TILE_GAP * 0.5,
        pos.row as f64 * TILE_HEIGHT + TILE_GAP * 0.5,
    )
}

/// Drawn tile size (footprint minus gap) and its aspect ratio.
pub const INNER_TILE_WIDTH: f64 = TILE_WIDTH - TILE_GAP;
pub const INNER_TILE_HEIGHT: f64 = TILE_HEIGHT - TILE_GAP;
pub const TILE_ASPECT: f64 = INNER_TILE_WIDTH / INNER_TILE_HEIGHT;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_grid_has_one_million_cells() {
        assert_eq!(GridDims::DEFAULT.cell_count(), 1_000_000);
        assert_eq!(GridDims::DEFAULT.center(), GridPos::new(625, 400));
        assert_eq!(GridDims::DEFAULT.max_ring_distance(), 625);
    }

    #[test]
    fn id_round_trips_for_every_cell_of_a_small_grid() {
        let dims = GridDims::new(7, 5);
        for row in 0..5 {
            for col in 0..7 {
                let pos = GridPos::new(col, row);
                let id = dims.grid_to_id(pos).expect("in bounds");
                assert_eq!(dims.id_to_grid(id), Some(pos));
            }
        }
    }

    #[test]
    fn id_round_trips_at_default_grid_corners() {
        let dims = GridDims::DEFAULT;
        for pos in [
            GridPos::new(0, 0),
            GridPos::new(1249, 0),
            GridPos::new(0, 799),
            GridPos::new(1249, 799),
            dims.center(),
        ] {
            let id = dims.grid_to_id(pos).expect("in bounds");
            assert_eq!(dims.id_to_grid(id), Some(pos));
        }
        assert_eq!(dims.grid_to_id(GridPos::new(1249, 799)), Some(BlockId(999_999)));
    }

    #[test]
    fn out_of_bounds_positions_have_no_id() {
        let dims = GridDims::DEFAULT;
        assert_eq!(dims.grid_to_id(GridPos::new(-1, 0)), None);
        assert_eq!(dims.grid_to_id(GridPos::new(0, -1)), None);
        assert_eq!(dims.grid_to_id(GridPos::new(1250, 0)), None);
        assert_eq!(dims.grid_to_id(GridPos::new(0, 800)), None);
        assert_eq!(dims.id_to_grid(BlockId(1_000_000)), None);
    }

    #[test]
    fn world_to_grid_rejects_points_outside_the_grid() {
        let dims = GridDims::new(10, 10);
        assert_eq!(dims.world_to_grid(-0.5, 10.0), None);
        assert_eq!(dims.world_to_grid(10.0 * TILE_WIDTH, 0.0), None);
        assert_eq!(dims.world_to_grid(f64::NAN, 0.0), None);
        assert_eq!(
            dims.world_to_grid(TILE_WIDTH * 2.5, TILE_HEIGHT * 3.1),
            Some(GridPos::new(2, 3))
        );
    }
}
