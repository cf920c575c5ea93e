//! Viewport and interaction state for the grid canvas.

use tilewall_shared::grid::{GridDims, GridPos};
use tilewall_shared::{Block, ClaimIntent};
use tilewall_shared::gravity::GravityMove;

use crate::animation::HoverFeedback;
use crate::config::CanvasConfig;
use crate::culling::{VisiblePlan, plan_visible};
use crate::frame::{Frame, Highlight, build_tiles};
use crate::image_cache::{ImageCache, ImageSource};
use crate::interaction::{GestureAction, GestureTracker};
use crate::store::{BlockStore, ClaimError};
use crate::viewport::{PINCH_ZOOM_SPEED, Viewport, WHEEL_ZOOM_SPEED};

/// Pan/zoom, gestures, hover animation, selection and the claim dialog
/// target. Input handlers mutate it; the frame loop reads it.
pub struct CanvasController {
    dims: GridDims,
    config: CanvasConfig,
    viewport: Viewport,
    gesture: GestureTracker,
    hover: HoverFeedback,
    selected: Option<GridPos>,
    claim_target: Option<GridPos>,
}

impl CanvasController {
    pub fn new(dims: GridDims, config: CanvasConfig) -> Self {
        let viewport = Viewport::default().with_zoom_limits(config.min_zoom, config.max_zoom);
        let gesture = GestureTracker::new(config.click_threshold_px, PINCH_ZOOM_SPEED);
        Self {
            dims,
            config,
            viewport,
            gesture,
            hover: HoverFeedback::default(),
            selected: None,
            claim_target: None,
        }
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn is_dragging(&self) -> bool {
        self.gesture.is_dragging()
    }

    /// A primary pointer is down, whether or not it has started dragging.
    pub fn is_pointer_down(&self) -> bool {
        self.gesture.is_active()
    }

    pub fn resize(&mut self, w: f64, h: f64) {
        let first = self.viewport.screen_w <= 0.0 || self.viewport.screen_h <= 0.0;
        self.viewport.set_screen_size(w, h);
        if first {
            self.center_on_cell(self.dims.center());
        }
    }

    pub fn screen_to_cell(&self, sx: f64, sy: f64) -> Option<GridPos> {
        self.viewport.screen_to_grid(&self.dims, sx, sy)
    }

    pub fn block_at<'a>(&self, store: &'a BlockStore, pos: GridPos) -> Option<&'a Block> {
        store.block_at(pos)
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.viewport.pan(dx, dy);
    }

    pub fn zoom_by(&mut self, delta: f64, pivot_x: f64, pivot_y: f64) {
        self.viewport.zoom_by(delta, pivot_x, pivot_y);
    }

    /// Wheel up zooms in.
    pub fn wheel(&mut self, delta_y: f64, x: f64, y: f64) {
        self.zoom_by(-delta_y * WHEEL_ZOOM_SPEED, x, y);
    }

    pub fn center_on_cell(&mut self, pos: GridPos) {
        if self.dims.contains(pos) {
            self.viewport.center_on_cell(pos);
        }
    }

    /// Show the whole grid.
    pub fn fit_grid(&mut self) {
        let (w, h) = self.dims.world_size();
        self.viewport.fit_bounds(0.0, 0.0, w, h);
    }

    pub fn selected(&self) -> Option<GridPos> {
        self.selected
    }

    pub fn select(&mut self, pos: GridPos) {
        if self.dims.contains(pos) {
            self.selected = Some(pos);
        }
    }

    pub fn deselect(&mut self) {
        self.selected = None;
    }

    pub fn claim_target(&self) -> Option<GridPos> {
        self.claim_target
    }

    pub fn open_claim(&mut self, pos: GridPos) {
        if self.dims.contains(pos) {
            self.claim_target = Some(pos);
        }
    }

    pub fn close_claim(&mut self) {
        self.claim_target = None;
    }

    /// Build the intent for the open claim dialog.
    pub fn submit_claim(&self, store: &BlockStore, video_url: &str) -> Result<ClaimIntent, ClaimError> {
        let pos = self.claim_target.ok_or(ClaimError::OutOfBounds)?;
        store.prepare_claim(pos, video_url)
    }

    /// Keep the selection on the block it pointed at after a rebalance.
    pub fn follow_moves(&mut self, moves: &[GravityMove]) {
        if let Some(selected) = self.selected
            && let Some(mv) = moves.iter().find(|m| m.from == selected)
        {
            self.selected = Some(mv.to);
        }
    }

    pub fn pointer_down(&mut self, x: f64, y: f64) {
        self.gesture.pointer_down(x, y);
        self.hover.set_pressed(true);
    }

    /// Returns `true` when the view needs a redraw.
    pub fn pointer_move(&mut self, x: f64, y: f64) -> bool {
        match self.gesture.pointer_move(x, y) {
            GestureAction::Pan { dx, dy } => {
                self.viewport.pan(dx, dy);
                if self.gesture.is_dragging() {
                    self.hover.hover(None);
                }
                true
            }
            _ if !self.gesture.is_active() => {
                let cell = self.screen_to_cell(x, y);
                let changed = cell != self.hover.hovered();
                if changed {
                    self.hover.hover(cell);
                }
                changed
            }
            _ => false,
        }
    }

    /// Returns the clicked cell, which becomes the selection. A click off
    /// the grid clears the selection.
    pub fn pointer_up(&mut self, x: f64, y: f64) -> Option<GridPos> {
        self.hover.set_pressed(false);
        match self.gesture.pointer_up(x, y) {
            GestureAction::Click { x, y } => {
                let cell = self.screen_to_cell(x, y);
                match cell {
                    Some(pos) => self.select(pos),
                    None => self.deselect(),
                }
                cell
            }
            _ => None,
        }
    }

    pub fn pointer_leave(&mut self) {
        self.gesture.cancel();
        self.hover.hover(None);
    }

    pub fn pinch_start(&mut self, a: (f64, f64), b: (f64, f64)) {
        self.hover.hover(None);
        self.gesture.pinch_start(a, b);
    }

    pub fn pinch_move(&mut self, a: (f64, f64), b: (f64, f64)) -> bool {
        match self.gesture.pinch_move(a, b) {
            GestureAction::Zoom { delta, pivot_x, pivot_y } => {
                self.zoom_by(delta, pivot_x, pivot_y);
                true
            }
            _ => false,
        }
    }

    pub fn pinch_end(&mut self) {
        self.gesture.pinch_end();
    }

    /// Advance the hover animation. Returns `true` while it is moving.
    pub fn animate(&mut self, dt_secs: f64) -> bool {
        self.hover.step(dt_secs)
    }

    pub fn visible_plan(&self) -> Option<VisiblePlan> {
        plan_visible(&self.viewport, &self.dims, &self.config)
    }

    /// Everything the renderer needs for one frame.
    pub fn build_frame<S: ImageSource>(&self, store: &BlockStore, images: &mut ImageCache<S>) -> Frame<S::Image> {
        let mut frame = match self.visible_plan() {
            Some(plan) => build_tiles(&plan, store, images, self.config.max_loads_per_frame),
            None => Frame::empty(),
        };
        frame.hover = self.hover.shown().filter(|_| self.hover.alpha > 0.0).map(|pos| Highlight {
            pos,
            scale: self.hover.scale as f32,
            alpha: self.hover.alpha as f32,
        });
        frame.selected = self.selected;
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilewall_shared::grid::cell_center;

    fn controller() -> CanvasController {
        let mut c = CanvasController::new(GridDims::DEFAULT, CanvasConfig::default());
        c.resize(1200.0, 800.0);
        c
    }

    fn screen_of(c: &CanvasController, pos: GridPos) -> (f64, f64) {
        let (wx, wy) = cell_center(pos);
        c.viewport().world_to_screen(wx, wy)
    }

    #[test]
    fn starts_centred_on_the_grid() {
        let c = controller();
        assert_eq!(c.screen_to_cell(600.0, 400.0), Some(GridDims::DEFAULT.center()));
    }

    #[test]
    fn short_click_selects_cell() {
        let mut c = controller();
        let target = GridPos::new(630, 402);
        let (x, y) = screen_of(&c, target);
        c.pointer_down(x, y);
        c.pointer_move(x + 2.0, y + 1.0);
        let clicked = c.pointer_up(x + 2.0, y + 1.0);
        // The tiny pan moved the grid along with the pointer.
        assert_eq!(clicked, Some(target));
        assert_eq!(c.selected(), Some(target));
    }

    #[test]
    fn drag_does_not_select() {
        let mut c = controller();
        let (x, y) = screen_of(&c, GridPos::new(630, 402));
        c.pointer_down(x, y);
        c.pointer_move(x + 4.0, y);
        c.pointer_move(x + 8.0, y + 3.0);
        assert!(c.is_dragging());
        assert_eq!(c.pointer_up(x + 8.0, y + 3.0), None);
        assert_eq!(c.selected(), None);
    }

    #[test]
    fn click_off_the_grid_clears_selection() {
        let mut c = controller();
        c.select(GridPos::new(1, 1));
        c.center_on_cell(GridPos::new(0, 0));
        c.pointer_down(5.0, 5.0);
        assert_eq!(c.pointer_up(5.0, 5.0), None);
        assert_eq!(c.selected(), None);
    }

    #[test]
    fn hover_follows_pointer_and_fades() {
        let mut c = controller();
        let (x, y) = screen_of(&c, GridPos::new(620, 395));
        assert!(c.pointer_move(x, y));
        assert!(!c.pointer_move(x + 0.5, y));
        assert!(c.animate(1.0 / 60.0));
        c.pointer_leave();
        while c.animate(1.0 / 60.0) {}
        let store = BlockStore::new(GridDims::DEFAULT, 32, 200);
        let mut images = ImageCache::new(NoImages, 4, 1);
        assert!(c.build_frame(&store, &mut images).hover.is_none());
    }

    #[test]
    fn selection_follows_rebalance_moves() {
        let mut c = controller();
        c.select(GridPos::new(3, 3));
        c.follow_moves(&[GravityMove {
            id: tilewall_shared::BlockId(3 * 1250 + 3),
            from: GridPos::new(3, 3),
            to: GridPos::new(625, 400),
        }]);
        assert_eq!(c.selected(), Some(GridPos::new(625, 400)));
    }

    #[test]
    fn claim_dialog_round_trip() {
        let mut c = controller();
        let store = BlockStore::new(GridDims::DEFAULT, 32, 200);
        assert!(c.submit_claim(&store, "https://youtu.be/aaaaaaaaaaa").is_err());
        c.open_claim(GridPos::new(10, 10));
        let intent = c.submit_claim(&store, "https://youtu.be/aaaaaaaaaaa").unwrap();
        assert_eq!(intent.block_id, GridDims::DEFAULT.grid_to_id(GridPos::new(10, 10)).unwrap());
        c.close_claim();
        assert_eq!(c.claim_target(), None);
    }

    struct NoImages;

    impl ImageSource for NoImages {
        type Image = Blank;

        fn fetch(
            &self,
            _url: &str,
        ) -> futures::future::LocalBoxFuture<'static, Result<Blank, crate::image_cache::LoadError>> {
            Box::pin(futures::future::pending())
        }
    }

    struct Blank;

    impl crate::image_cache::DecodedImage for Blank {
        fn width(&self) -> u32 {
            1
        }
        fn height(&self) -> u32 {
            1
        }
        fn release(&self) {}
    }
}
