use std::cell::{Cell, RefCell};
use std::rc::Rc;

use leptos::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, MouseEvent};

use tilewall_shared::BlockStatus;
use tilewall_shared::grid::{GridDims, GridPos, TILE_HEIGHT, TILE_WIDTH};

use crate::canvas::render_scale;
use crate::controller::CanvasController;
use crate::render_loop::RenderScheduler;
use crate::store::BlockStore;
use crate::viewport::Viewport;

const MINIMAP_W: f64 = 180.0;
const MINIMAP_BG: &str = "#0d0d10";
const CLAIMED_DOT: &str = "rgba(196, 181, 253, 0.85)";
const AD_DOT: &str = "rgba(126, 34, 206, 0.9)";

/// Minimap height for a grid, keeping its world aspect ratio.
fn minimap_height(dims: &GridDims) -> f64 {
    let (world_w, world_h) = dims.world_size();
    if world_w <= 0.0 {
        return MINIMAP_W;
    }
    (MINIMAP_W * world_h / world_w).round().max(1.0)
}

/// World-to-minimap scale.
fn minimap_scale(dims: &GridDims) -> f64 {
    let (world_w, _) = dims.world_size();
    if world_w <= 0.0 { 1.0 } else { MINIMAP_W / world_w }
}

/// Cell under a minimap click, `None` off the grid.
fn minimap_to_cell(dims: &GridDims, mx: f64, my: f64) -> Option<GridPos> {
    let scale = minimap_scale(dims);
    dims.world_to_grid(mx / scale, my / scale)
}

/// The viewport rectangle in minimap pixels: `(x, y, w, h)`.
fn viewport_rect(dims: &GridDims, vp: &Viewport) -> (f64, f64, f64, f64) {
    let scale = minimap_scale(dims);
    let (x, y, w, h) = vp.world_rect();
    (x * scale, y * scale, w * scale, h * scale)
}

/// Offscreen layer of content dots. Only redrawn when the store changes,
/// not on every pan/zoom.
struct OffscreenCache {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
    height: f64,
}

impl OffscreenCache {
    fn new(height: f64) -> Option<Self> {
        let document = web_sys::window()?.document()?;
        let canvas = document
            .create_element("canvas")
            .ok()?
            .dyn_into::<HtmlCanvasElement>()
            .ok()?;
        let scale = render_scale();
        canvas.set_width((MINIMAP_W * scale) as u32);
        canvas.set_height((height * scale) as u32);
        let ctx = canvas
            .get_context("2d")
            .ok()??
            .dyn_into::<CanvasRenderingContext2d>()
            .ok()?;
        ctx.scale(scale, scale).ok();
        Some(Self { canvas, ctx, height })
    }

    fn redraw(&self, store: &BlockStore) {
        let dims = store.dims();
        let scale = minimap_scale(&dims);
        let ctx = &self.ctx;

        ctx.set_fill_style_str(MINIMAP_BG);
        ctx.fill_rect(0.0, 0.0, MINIMAP_W, self.height);

        // Cells are far below a pixel here; each block gets a one-pixel dot.
        let dot = (TILE_WIDTH * scale).max(1.0);
        let dot_h = (TILE_HEIGHT * scale).max(1.0);
        let last_col = dims.cols as i32 - 1;
        let last_row = dims.rows as i32 - 1;
        for id in store.spatial().query_range(0, 0, last_col, last_row) {
            let Some(block) = store.get(id) else {
                continue;
            };
            let style = match block.status() {
                BlockStatus::Claimed => CLAIMED_DOT,
                BlockStatus::Ad => AD_DOT,
                BlockStatus::Empty => continue,
            };
            ctx.set_fill_style_str(style);
            ctx.fill_rect(
                block.pos.col as f64 * TILE_WIDTH * scale,
                block.pos.row as f64 * TILE_HEIGHT * scale,
                dot,
                dot_h,
            );
        }
    }
}

#[component]
pub fn Minimap() -> impl IntoView {
    let store: RwSignal<BlockStore> = expect_context();
    let controller: RwSignal<CanvasController> = expect_context();

    let dims = controller.with_untracked(|c| c.dims());
    let height = minimap_height(&dims);
    let canvas_ref = NodeRef::<leptos::html::Canvas>::new();

    // Cached Canvas 2D context for minimap
    let cached_ctx: Rc<RefCell<Option<CanvasRenderingContext2d>>> = Rc::new(RefCell::new(None));

    let offscreen: Rc<RefCell<Option<OffscreenCache>>> = Rc::new(RefCell::new(None));
    let offscreen_dirty: Rc<Cell<bool>> = Rc::new(Cell::new(true));
    let offscreen_render = offscreen.clone();
    let offscreen_dirty_render = offscreen_dirty.clone();

    let scheduler = RenderScheduler::new(move |_timestamp_ms: f64| {
        let Some(canvas) = canvas_ref.get_untracked() else {
            return false;
        };
        let canvas: &HtmlCanvasElement = &canvas;

        let scale = render_scale();
        let expected_w = (MINIMAP_W * scale) as u32;
        let expected_h = (height * scale) as u32;
        if canvas.width() != expected_w || canvas.height() != expected_h {
            canvas.set_width(expected_w);
            canvas.set_height(expected_h);
            *cached_ctx.borrow_mut() = None;
        }

        let ctx = {
            let mut ctx_cache = cached_ctx.borrow_mut();
            if ctx_cache.is_none() {
                let Some(ctx) = canvas
                    .get_context("2d")
                    .ok()
                    .flatten()
                    .and_then(|ctx| ctx.dyn_into::<CanvasRenderingContext2d>().ok())
                else {
                    return false;
                };
                ctx.scale(scale, scale).ok();
                *ctx_cache = Some(ctx);
            }
            let Some(ctx) = ctx_cache.clone() else {
                return false;
            };
            ctx
        };

        let mut offscreen_ref = offscreen_render.borrow_mut();
        if offscreen_ref.is_none() {
            *offscreen_ref = OffscreenCache::new(height);
            offscreen_dirty_render.set(true);
        }
        let Some(ref cache) = *offscreen_ref else {
            return false;
        };

        if offscreen_dirty_render.get() {
            offscreen_dirty_render.set(false);
            store.with_untracked(|s| cache.redraw(s));
        }

        // Explicit size so ctx.scale doesn't double it
        ctx.draw_image_with_html_canvas_element_and_dw_and_dh(
            &cache.canvas,
            0.0,
            0.0,
            MINIMAP_W,
            height,
        )
        .ok();

        controller.with_untracked(|c| render_viewport_indicator(&ctx, &c.dims(), c.viewport()));
        false
    });
    let scheduler = Rc::new(scheduler);

    // Content changes invalidate the offscreen layer
    let sched_state = scheduler.clone();
    let offscreen_dirty_state = offscreen_dirty.clone();
    Effect::new(move || {
        store.with(|s| s.revision());
        offscreen_dirty_state.set(true);
        sched_state.mark_dirty();
    });

    let sched_vp = scheduler.clone();
    Effect::new(move || {
        controller.track();
        sched_vp.mark_dirty();
    });

    let on_click = move |e: MouseEvent| {
        let x = e.offset_x() as f64;
        let y = e.offset_y() as f64;
        if let Some(pos) = minimap_to_cell(&dims, x, y) {
            controller.update(|c| c.center_on_cell(pos));
        }
    };

    let canvas_style = format!("cursor: pointer; display: block; width: {MINIMAP_W}px; height: {height}px;");

    view! {
        <div style="position: absolute; left: 16px; bottom: 16px; z-index: 5; background: #0d0d10; border: 1px solid #2a2a33; border-radius: 4px; box-shadow: 0 4px 20px rgba(0,0,0,0.6); overflow: hidden;">
            <canvas node_ref=canvas_ref on:click=on_click style=canvas_style />
        </div>
    }
}

/// Draw only the viewport indicator rectangle (called every frame).
fn render_viewport_indicator(ctx: &CanvasRenderingContext2d, dims: &GridDims, viewport: &Viewport) {
    let (x, y, w, h) = viewport_rect(dims, viewport);
    ctx.set_stroke_style_str("rgba(139, 92, 246, 0.9)");
    ctx.set_line_width(1.5);
    ctx.stroke_rect(x, y, w.max(2.0), h.max(2.0));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimap_keeps_the_grid_aspect() {
        let dims = GridDims::DEFAULT;
        let (world_w, world_h) = dims.world_size();
        let h = minimap_height(&dims);
        assert!((h / MINIMAP_W - world_h / world_w).abs() < 0.01);
    }

    #[test]
    fn clicks_map_back_to_cells() {
        let dims = GridDims::new(100, 50);
        assert_eq!(minimap_to_cell(&dims, 0.5, 0.5), Some(GridPos::new(0, 0)));
        let center = minimap_to_cell(&dims, MINIMAP_W / 2.0, minimap_height(&dims) / 2.0);
        assert_eq!(center.map(|p| p.col), Some(50));
        assert_eq!(minimap_to_cell(&dims, -1.0, 4.0), None);
        assert_eq!(minimap_to_cell(&dims, MINIMAP_W + 1.0, 4.0), None);
    }

    #[test]
    fn viewport_rect_scales_the_visible_world() {
        let dims = GridDims::new(100, 50);
        let mut vp = Viewport::new(800.0, 600.0);
        vp.zoom = 1.0;
        vp.pan_x = -(10.0 * TILE_WIDTH);
        vp.pan_y = 0.0;
        let (x, y, w, _) = viewport_rect(&dims, &vp);
        let scale = minimap_scale(&dims);
        assert!((x - 10.0 * TILE_WIDTH * scale).abs() < 1e-9);
        assert_eq!(y, 0.0);
        assert!((w - 800.0 * scale).abs() < 1e-9);
    }
}
