//! Visible-range planning with level-of-detail degradation.

use tilewall_shared::grid::{GridDims, GridPos};

use crate::config::CanvasConfig;
use crate::viewport::{CellRange, Viewport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lod {
    pub load_images: bool,
    pub draw_empty: bool,
}

impl Lod {
    pub fn for_tile_height(tile_px_h: f64, config: &CanvasConfig) -> Self {
        Self {
            load_images: tile_px_h >= config.lod_load_images_px,
            draw_empty: tile_px_h >= config.lod_draw_empty_px,
        }
    }
}

/// Cells the frame will consider: a clipped range sampled every `stride`
/// cells on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisiblePlan {
    pub range: CellRange,
    pub stride: usize,
    pub lod: Lod,
}

impl VisiblePlan {
    pub fn considered_count(&self) -> usize {
        self.range.width().div_ceil(self.stride) * self.range.height().div_ceil(self.stride)
    }

    pub fn cells(&self) -> impl Iterator<Item = GridPos> + '_ {
        let range = self.range;
        let stride = self.stride;
        (range.row_min..=range.row_max)
            .step_by(stride)
            .flat_map(move |row| {
                (range.col_min..=range.col_max)
                    .step_by(stride)
                    .map(move |col| GridPos::new(col, row))
            })
    }
}

/// Smallest integer stride `s` with `ceil(w/s) * ceil(h/s) <= cap`.
pub fn subsample_stride(width: usize, height: usize, cap: usize) -> usize {
    let cap = cap.max(1);
    let total = width * height;
    if total <= cap {
        return 1;
    }
    // ceil(w/s) * ceil(h/s) >= w*h / s^2, so nothing below this can fit.
    let mut stride = ((total as f64 / cap as f64).sqrt().ceil() as usize).max(1);
    while width.div_ceil(stride) * height.div_ceil(stride) > cap {
        stride += 1;
    }
    stride
}

pub fn plan_visible(vp: &Viewport, dims: &GridDims, config: &CanvasConfig) -> Option<VisiblePlan> {
    let range = vp.visible_range(dims)?;
    let stride = subsample_stride(range.width(), range.height(), config.max_visible_tiles);
    let (_, tile_px_h) = vp.tile_px();
    Some(VisiblePlan {
        range,
        stride,
        lod: Lod::for_tile_height(tile_px_h, config),
    })
}
