use tilewall_shared::grid::{GridDims, GridPos, TILE_HEIGHT, TILE_WIDTH, cell_center};

pub const MIN_ZOOM: f64 = 0.05;
pub const MAX_ZOOM: f64 = 3.0;
pub const DEFAULT_ZOOM: f64 = 0.6;
/// Wheel delta to zoom fraction.
pub const WHEEL_ZOOM_SPEED: f64 = 0.001;
/// Change in finger distance (px) to zoom fraction.
pub const PINCH_ZOOM_SPEED: f64 = 0.005;

/// Pan/zoom transform from world coordinates to screen pixels:
/// `screen = world * zoom + pan`.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    pub pan_x: f64,
    pub pan_y: f64,
    pub zoom: f64,
    pub screen_w: f64,
    pub screen_h: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            pan_x: 0.0,
            pan_y: 0.0,
            zoom: DEFAULT_ZOOM,
            screen_w: 0.0,
            screen_h: 0.0,
            min_zoom: MIN_ZOOM,
            max_zoom: MAX_ZOOM,
        }
    }
}

/// Inclusive cell rectangle, already clipped to the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub col_min: i32,
    pub row_min: i32,
    pub col_max: i32,
    pub row_max: i32,
}

impl CellRange {
    pub fn width(&self) -> usize {
        (self.col_max - self.col_min + 1).max(0) as usize
    }

    pub fn height(&self) -> usize {
        (self.row_max - self.row_min + 1).max(0) as usize
    }

    pub fn cell_count(&self) -> usize {
        self.width() * self.height()
    }

    pub fn is_empty(&self) -> bool {
        self.cell_count() == 0
    }

    pub fn contains(&self, pos: GridPos) -> bool {
        pos.col >= self.col_min
            && pos.col <= self.col_max
            && pos.row >= self.row_min
            && pos.row <= self.row_max
    }
}

impl Viewport {
    pub fn new(screen_w: f64, screen_h: f64) -> Self {
        Self {
            screen_w,
            screen_h,
            ..Self::default()
        }
    }

    pub fn with_zoom_limits(mut self, min_zoom: f64, max_zoom: f64) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self.zoom = self.zoom.clamp(min_zoom, max_zoom);
        self
    }

    pub fn set_screen_size(&mut self, w: f64, h: f64) {
        self.screen_w = w.max(0.0);
        self.screen_h = h.max(0.0);
    }

    pub fn world_to_screen(&self, wx: f64, wy: f64) -> (f64, f64) {
        (wx * self.zoom + self.pan_x, wy * self.zoom + self.pan_y)
    }

    pub fn screen_to_world(&self, sx: f64, sy: f64) -> (f64, f64) {
        ((sx - self.pan_x) / self.zoom, (sy - self.pan_y) / self.zoom)
    }

    /// Cell under a screen point, `None` outside the grid.
    pub fn screen_to_grid(&self, dims: &GridDims, sx: f64, sy: f64) -> Option<GridPos> {
        let (wx, wy) = self.screen_to_world(sx, sy);
        dims.world_to_grid(wx, wy)
    }

    /// Pan by screen-space delta.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.pan_x += dx;
        self.pan_y += dy;
    }

    /// Set zoom (clamped), keeping the world point under the pivot fixed.
    pub fn zoom_to(&mut self, zoom: f64, pivot_x: f64, pivot_y: f64) {
        let new_zoom = zoom.clamp(self.min_zoom, self.max_zoom);
        let (wx, wy) = self.screen_to_world(pivot_x, pivot_y);
        self.zoom = new_zoom;
        self.pan_x = pivot_x - wx * new_zoom;
        self.pan_y = pivot_y - wy * new_zoom;
    }

    /// Multiply zoom by `1 + delta` around a pivot.
    pub fn zoom_by(&mut self, delta: f64, pivot_x: f64, pivot_y: f64) {
        self.zoom_to(self.zoom * (1.0 + delta), pivot_x, pivot_y);
    }

    pub fn center_on(&mut self, wx: f64, wy: f64) {
        self.pan_x = self.screen_w / 2.0 - wx * self.zoom;
        self.pan_y = self.screen_h / 2.0 - wy * self.zoom;
    }

    pub fn center_on_cell(&mut self, pos: GridPos) {
        let (wx, wy) = cell_center(pos);
        self.center_on(wx, wy);
    }

    /// On-screen tile size in pixels.
    pub fn tile_px(&self) -> (f64, f64) {
        (TILE_WIDTH * self.zoom, TILE_HEIGHT * self.zoom)
    }

    /// World rectangle covered by the screen: `(x, y, w, h)`.
    pub fn world_rect(&self) -> (f64, f64, f64, f64) {
        let (x, y) = self.screen_to_world(0.0, 0.0);
        (x, y, self.screen_w / self.zoom, self.screen_h / self.zoom)
    }

    /// Cells touched by the screen plus a one-cell margin, clipped to the grid.
    /// `None` when the screen does not overlap the grid at all.
    pub fn visible_range(&self, dims: &GridDims) -> Option<CellRange> {
        if self.screen_w <= 0.0 || self.screen_h <= 0.0 || self.zoom <= 0.0 {
            return None;
        }
        let (wx, wy, ww, wh) = self.world_rect();
        let col_min = ((wx / TILE_WIDTH).floor() as i64 - 1).max(0);
        let row_min = ((wy / TILE_HEIGHT).floor() as i64 - 1).max(0);
        let col_max = (((wx + ww) / TILE_WIDTH).ceil() as i64 + 1).min(dims.cols as i64 - 1);
        let row_max = (((wy + wh) / TILE_HEIGHT).ceil() as i64 + 1).min(dims.rows as i64 - 1);
        if col_min > col_max || row_min > row_max {
            return None;
        }
        Some(CellRange {
            col_min: col_min as i32,
            row_min: row_min as i32,
            col_max: col_max as i32,
            row_max: row_max as i32,
        })
    }

    /// Fit the viewport to show the given world bounds with padding.
    pub fn fit_bounds(&mut self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) {
        let world_w = max_x - min_x;
        let world_h = max_y - min_y;
        if world_w <= 0.0 || world_h <= 0.0 || self.screen_w <= 0.0 || self.screen_h <= 0.0 {
            return;
        }

        let padding = 0.05;
        let zoom_x = self.screen_w / (world_w * (1.0 + padding * 2.0));
        let zoom_y = self.screen_h / (world_h * (1.0 + padding * 2.0));
        self.zoom = zoom_x.min(zoom_y).clamp(self.min_zoom, self.max_zoom);
        self.center_on((min_x + max_x) / 2.0, (min_y + max_y) / 2.0);
    }
}
