//! Outward square spiral over the grid, centered on `GridDims::center`.
//!
//! The walk starts at the center, steps right, then turns clockwise (in
//! screen space, rows grow downward) after each leg. Leg lengths run
//! 1, 1, 2, 2, 3, 3, ... Content ranks count only cells that are inside the
//! grid and not reserved for ads.

use crate::ads::AdLayout;
use crate::grid::{GridDims, GridPos};

/// Raw walker. Visits every offset exactly once, ads and bounds ignored.
#[derive(Debug, Clone)]
pub struct SpiralWalker {
    center: GridPos,
    rx: i32,
    ry: i32,
    dx: i32,
    dy: i32,
    leg_len: u32,
    leg_passed: u32,
    turns: u32,
}

impl SpiralWalker {
    pub fn new(center: GridPos) -> Self {
        Self {
            center,
            rx: 0,
            ry: 0,
            dx: 1,
            dy: 0,
            leg_len: 1,
            leg_passed: 0,
            turns: 0,
        }
    }

    pub fn position(&self) -> GridPos {
        GridPos::new(self.center.col + self.rx, self.center.row + self.ry)
    }

    pub fn advance(&mut self) {
        self.rx += self.dx;
        self.ry += self.dy;
        self.leg_passed += 1;
        if self.leg_passed == self.leg_len {
            self.leg_passed = 0;
            (self.dx, self.dy) = (-self.dy, self.dx);
            self.turns += 1;
            if self.turns % 2 == 0 {
                self.leg_len += 1;
            }
        }
    }
}

/// Number of raw steps that covers every cell of `dims`.
pub fn walk_bound(dims: &GridDims) -> usize {
    let side = 2 * dims.max_ring_distance().max(0) as usize + 1;
    side * side
}

/// Position of `pos` in the raw walk around `center`, computed directly.
/// Orders cells the same way the walker visits them.
pub fn raw_spiral_index(center: GridPos, pos: GridPos) -> u64 {
    let x = (pos.col - center.col) as i64;
    let y = (pos.row - center.row) as i64;
    let k = x.abs().max(y.abs());
    if k == 0 {
        return 0;
    }
    let base = (2 * k - 1) * (2 * k - 1);
    let index = if x == k && y > -k {
        base + (y + k - 1)
    } else if y == k && x < k {
        base + (2 * k - 1) + (k - x)
    } else if x == -k && y < k {
        base + (4 * k - 1) + (k - y)
    } else {
        base + (6 * k - 1) + (x + k)
    };
    index as u64
}

/// Valid content cells in spiral order. Ends once the walk has left the
/// grid on every side.
#[derive(Debug, Clone)]
pub struct SpiralCells<'a> {
    walker: SpiralWalker,
    ads: &'a AdLayout,
    dims: GridDims,
    steps_left: usize,
    started: bool,
}

impl Iterator for SpiralCells<'_> {
    type Item = GridPos;

    fn next(&mut self) -> Option<GridPos> {
        loop {
            if self.started {
                if self.steps_left == 0 {
                    return None;
                }
                self.walker.advance();
            }
            self.started = true;
            self.steps_left = self.steps_left.saturating_sub(1);

            let pos = self.walker.position();
            if self.dims.contains(pos) && !self.ads.is_ad_slot(pos) {
                return Some(pos);
            }
        }
    }
}

pub fn spiral_cells(ads: &AdLayout) -> SpiralCells<'_> {
    let dims = ads.dims();
    SpiralCells {
        walker: SpiralWalker::new(dims.center()),
        ads,
        dims,
        steps_left: walk_bound(&dims),
        started: false,
    }
}

/// The `index`-th content cell, or `None` once the grid is exhausted.
pub fn spiral_coordinate(ads: &AdLayout, index: usize) -> Option<GridPos> {
    spiral_cells(ads).nth(index)
}

/// Like [`spiral_coordinate`], collapsing exhaustion onto the center cell.
/// Breaks uniqueness when hit, so it is logged.
pub fn spiral_coordinate_or_center(ads: &AdLayout, index: usize) -> GridPos {
    spiral_coordinate(ads, index).unwrap_or_else(|| {
        let center = ads.dims().center();
        tracing::warn!(index, ?center, "spiral exhausted, falling back to center");
        center
    })
}

/// First `count` content cells from a single walk. Shorter than `count`
/// only when the grid runs out of cells.
pub fn batch_spiral_coordinates(ads: &AdLayout, count: usize) -> Vec<GridPos> {
    let mut cells = Vec::with_capacity(count.min(ads.dims().cell_count() as usize));
    cells.extend(spiral_cells(ads).take(count));
    if cells.len() < count {
        tracing::warn!(
            requested = count,
            placed = cells.len(),
            "spiral exhausted before all ranks were placed"
        );
    }
    cells
}
