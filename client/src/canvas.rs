use std::cell::{Cell, RefCell};
use std::rc::Rc;

use leptos::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, PointerEvent, TouchEvent, WheelEvent};

use tilewall_shared::grid::{INNER_TILE_HEIGHT, INNER_TILE_WIDTH, tile_origin};

use crate::app::SharedImages;
use crate::batching::crop_uv;
use crate::colors::unit_rgb_css;
use crate::controller::CanvasController;
use crate::frame::{CLEAR_COLOR, Frame, TileFill};
use crate::gpu::{GpuRenderer, RenderFrameInput};
use crate::image_cache::{DecodedImage, PumpReport};
use crate::render_loop::RenderScheduler;
use crate::store::BlockStore;
use crate::viewport::Viewport;
use crate::web_image::WebImage;

const GPU_PIXEL_BUDGET: f64 = 4_000_000.0;
/// Longest step fed to the hover animation after an idle gap.
const MAX_FRAME_DT_SECS: f64 = 1.0 / 30.0;
const WHEEL_LINE_PX: f64 = 16.0;
const WHEEL_PAGE_PX: f64 = 800.0;

fn clamp_scale_for_pixel_budget(
    css_width: u32,
    css_height: u32,
    desired_scale: f64,
    min_scale: f64,
    pixel_budget: f64,
) -> f64 {
    let mut scale = desired_scale.max(min_scale);
    if css_width == 0 || css_height == 0 {
        return scale;
    }
    let total_pixels = css_width as f64 * css_height as f64 * scale * scale;
    if total_pixels > pixel_budget {
        scale *= (pixel_budget / total_pixels).sqrt();
    }
    scale.max(min_scale)
}

pub fn gpu_render_scale(css_width: u32, css_height: u32, pixel_budget: f64) -> f64 {
    let dpr = web_sys::window()
        .map(|w| w.device_pixel_ratio())
        .unwrap_or(1.0);
    clamp_scale_for_pixel_budget(css_width, css_height, dpr, 1.0, pixel_budget)
}

/// Supersampling factor for small 2D canvases.
pub fn render_scale() -> f64 {
    web_sys::window()
        .map(|w| w.device_pixel_ratio())
        .unwrap_or(1.0)
        .max(2.0)
}

/// Wheel delta in pixels whatever unit the browser reported it in.
fn wheel_delta_px(delta: f64, delta_mode: u32) -> f64 {
    match delta_mode {
        WheelEvent::DOM_DELTA_LINE => delta * WHEEL_LINE_PX,
        WheelEvent::DOM_DELTA_PAGE => delta * WHEEL_PAGE_PX,
        _ => delta,
    }
}

fn frame_dt_secs(last_ms: f64, now_ms: f64) -> f64 {
    if last_ms <= 0.0 {
        return 0.0;
    }
    ((now_ms - last_ms) / 1000.0).clamp(0.0, MAX_FRAME_DT_SECS)
}

/// Pointer position relative to the canvas, in CSS pixels.
fn local_point(canvas_ref: NodeRef<leptos::html::Canvas>, client_x: i32, client_y: i32) -> (f64, f64) {
    match canvas_ref.get_untracked() {
        Some(el) => {
            let rect = el.get_bounding_client_rect();
            (client_x as f64 - rect.left(), client_y as f64 - rect.top())
        }
        None => (client_x as f64, client_y as f64),
    }
}

/// The grid canvas: wgpu for tiles and overlays, with a Canvas 2D pass
/// standing in until (or instead of, if init fails) the GPU path is ready.
#[component]
pub fn GridCanvas() -> impl IntoView {
    let store: RwSignal<BlockStore> = expect_context();
    let controller: RwSignal<CanvasController> = expect_context();
    let SharedImages(images) = expect_context();

    let gpu_canvas_ref = NodeRef::<leptos::html::Canvas>::new();
    let fallback_canvas_ref = NodeRef::<leptos::html::Canvas>::new();
    let gpu_ready = RwSignal::new(false);

    // GPU renderer (initialized async, None until ready)
    let gpu: Rc<RefCell<Option<GpuRenderer>>> = Rc::new(RefCell::new(None));
    let gpu_render = gpu.clone();
    let gpu_init_started = Rc::new(Cell::new(false));

    let last_ts: Rc<Cell<f64>> = Rc::new(Cell::new(0.0));
    let last_css_size: Rc<Cell<(u32, u32)>> = Rc::new(Cell::new((0, 0)));
    let cached_fallback_ctx: Rc<RefCell<Option<CanvasRenderingContext2d>>> =
        Rc::new(RefCell::new(None));

    let scheduler = RenderScheduler::new(move |timestamp_ms: f64| {
        let Some(gpu_canvas) = gpu_canvas_ref.get_untracked() else {
            return false;
        };
        let gpu_canvas: &HtmlCanvasElement = &gpu_canvas;
        let Some(parent) = gpu_canvas.parent_element() else {
            return false;
        };
        let w = parent.client_width() as u32;
        let h = parent.client_height() as u32;
        if w == 0 || h == 0 {
            return false;
        }

        if last_css_size.get() != (w, h) {
            last_css_size.set((w, h));
            controller.update(|c| c.resize(w as f64, h as f64));
        }
        let scale = gpu_render_scale(w, h, GPU_PIXEL_BUDGET);
        let gw = (w as f64 * scale).round().max(1.0) as u32;
        let gh = (h as f64 * scale).round().max(1.0) as u32;
        if gpu_canvas.width() != gw || gpu_canvas.height() != gh {
            gpu_canvas.set_width(gw);
            gpu_canvas.set_height(gh);
            if let Some(ref mut renderer) = *gpu_render.borrow_mut() {
                renderer.resize(gw, gh, scale as f32);
            }
        }

        let dt = frame_dt_secs(last_ts.replace(timestamp_ms), timestamp_ms);

        let mut report = PumpReport::default();
        let mut in_flight = 0;
        images.update_value(|cache| {
            report = cache.pump(timestamp_ms);
            in_flight = cache.in_flight_count();
        });

        if store.with_untracked(|s| s.is_rebalance_due(timestamp_ms)) {
            let mut flushed = None;
            store.update(|s| flushed = s.flush_if_due(timestamp_ms));
            if let Some(flush) = flushed
                && !flush.moves.is_empty()
            {
                controller.update(|c| c.follow_moves(&flush.moves));
            }
        }
        let rebalance_pending = store.with_untracked(|s| s.is_rebalance_pending());

        let mut animating = false;
        controller.update_untracked(|c| animating = c.animate(dt));

        let mut frame: Frame<WebImage> = Frame::empty();
        let vp = controller.with_untracked(|c| {
            store.with_untracked(|s| {
                images.update_value(|cache| frame = c.build_frame(s, cache));
            });
            c.viewport().clone()
        });

        let mut gpu_ref = gpu_render.borrow_mut();
        let starved = match gpu_ref.as_mut() {
            Some(renderer) => {
                renderer.forget_images(&report.evicted);
                renderer.render(RenderFrameInput {
                    vp: &vp,
                    frame: &frame,
                    now: timestamp_ms,
                })
            }
            None => {
                if let Some(fallback) = fallback_canvas_ref.get_untracked() {
                    let fallback: &HtmlCanvasElement = &fallback;
                    if fallback.width() != gw || fallback.height() != gh {
                        fallback.set_width(gw);
                        fallback.set_height(gh);
                        *cached_fallback_ctx.borrow_mut() = None;
                    }
                    let mut ctx_cache = cached_fallback_ctx.borrow_mut();
                    if ctx_cache.is_none() {
                        *ctx_cache = fallback
                            .get_context("2d")
                            .ok()
                            .flatten()
                            .and_then(|ctx| ctx.dyn_into::<CanvasRenderingContext2d>().ok());
                    }
                    if let Some(ctx) = ctx_cache.as_ref() {
                        ctx.set_transform(scale, 0.0, 0.0, scale, 0.0, 0.0).ok();
                        render_canvas2d_fallback(ctx, &vp, &frame);
                    }
                }
                false
            }
        };

        animating || starved || frame.waiting_on_images || in_flight > 0 || rebalance_pending
    });
    let scheduler = Rc::new(scheduler);

    // Initialize GPU renderer asynchronously
    let sched_for_init = scheduler.clone();
    Effect::new({
        let gpu = gpu.clone();
        let gpu_init_started = gpu_init_started.clone();
        move || {
            if gpu_init_started.get() {
                return;
            }
            let Some(canvas_el) = gpu_canvas_ref.get() else {
                return;
            };
            gpu_init_started.set(true);

            let canvas: &HtmlCanvasElement = &canvas_el;
            let canvas: HtmlCanvasElement = canvas.clone();
            let config = controller.with_untracked(|c| c.config().clone());
            let gpu = gpu.clone();
            let sched = sched_for_init.clone();

            wasm_bindgen_futures::spawn_local(async move {
                match GpuRenderer::init(canvas, &config).await {
                    Ok(renderer) => {
                        *gpu.borrow_mut() = Some(renderer);
                        gpu_ready.set(true);
                        sched.mark_dirty();
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "wgpu init failed, using Canvas 2D fallback");
                    }
                }
            });
        }
    });

    // Feed events and rebalances
    let sched_store = scheduler.clone();
    Effect::new(move || {
        store.track();
        sched_store.mark_dirty();
    });

    // Pan/zoom, selection, resize
    let sched_controller = scheduler.clone();
    Effect::new(move || {
        controller.track();
        sched_controller.mark_dirty();
    });

    // Window resizes do not touch any signal; poke the loop directly.
    {
        use wasm_bindgen::prelude::*;
        let sched_resize = scheduler.clone();
        let on_resize = Closure::<dyn Fn()>::new(move || sched_resize.mark_dirty());
        if let Some(window) = web_sys::window() {
            let _ = window
                .add_event_listener_with_callback("resize", on_resize.as_ref().unchecked_ref());
        }
        on_resize.forget();
    }

    // --- Input handlers ---

    let on_wheel = move |e: WheelEvent| {
        e.prevent_default();
        let delta = wheel_delta_px(e.delta_y(), e.delta_mode());
        let (x, y) = local_point(gpu_canvas_ref, e.client_x(), e.client_y());
        controller.update(|c| c.wheel(delta, x, y));
    };

    let on_pointer_down = move |e: PointerEvent| {
        if !e.is_primary() || e.button() != 0 {
            return;
        }
        let (x, y) = local_point(gpu_canvas_ref, e.client_x(), e.client_y());
        controller.update_untracked(|c| c.pointer_down(x, y));

        if let Some(target) = e.target()
            && let Ok(el) = target.dyn_into::<web_sys::HtmlElement>()
        {
            el.set_pointer_capture(e.pointer_id()).ok();
            el.style().set_property("cursor", "grabbing").ok();
        }
    };

    let on_pointer_move = {
        let sched = scheduler.clone();
        move |e: PointerEvent| {
            if !e.is_primary() {
                return;
            }
            let (x, y) = local_point(gpu_canvas_ref, e.client_x(), e.client_y());
            if controller.with_untracked(|c| c.is_pointer_down()) {
                controller.update(|c| {
                    c.pointer_move(x, y);
                });
            } else {
                // Hover only feeds the overlay animation; nothing else observes it.
                let mut changed = false;
                controller.update_untracked(|c| changed = c.pointer_move(x, y));
                if changed {
                    sched.mark_dirty();
                }
            }
        }
    };

    let on_pointer_up = move |e: PointerEvent| {
        if !e.is_primary() {
            return;
        }
        let (x, y) = local_point(gpu_canvas_ref, e.client_x(), e.client_y());
        controller.update(|c| {
            if let Some(pos) = c.pointer_up(x, y) {
                tracing::debug!(col = pos.col, row = pos.row, "cell selected");
            }
        });

        if let Some(target) = e.target()
            && let Ok(el) = target.dyn_into::<web_sys::HtmlElement>()
        {
            el.style().set_property("cursor", "grab").ok();
        }
    };

    let on_pointer_leave = {
        let sched = scheduler.clone();
        move |_: PointerEvent| {
            controller.update_untracked(|c| c.pointer_leave());
            sched.mark_dirty();
        }
    };

    let touch_pair = move |e: &TouchEvent| {
        let touches = e.touches();
        if touches.length() != 2 {
            return None;
        }
        let (Some(t0), Some(t1)) = (touches.get(0), touches.get(1)) else {
            return None;
        };
        Some((
            local_point(gpu_canvas_ref, t0.client_x(), t0.client_y()),
            local_point(gpu_canvas_ref, t1.client_x(), t1.client_y()),
        ))
    };

    let on_touch_start = move |e: TouchEvent| {
        if let Some((a, b)) = touch_pair(&e) {
            e.prevent_default();
            controller.update(|c| c.pinch_start(a, b));
        }
    };

    let on_touch_move = move |e: TouchEvent| {
        if let Some((a, b)) = touch_pair(&e) {
            e.prevent_default();
            controller.update(|c| {
                c.pinch_move(a, b);
            });
        }
    };

    let on_touch_end = move |e: TouchEvent| {
        if e.touches().length() < 2 {
            controller.update_untracked(|c| c.pinch_end());
        }
    };

    view! {
        <div
            style="position: relative; width: 100%; height: 100%; overflow: hidden;"
            on:wheel=on_wheel
            on:pointerdown=on_pointer_down
            on:pointermove=on_pointer_move
            on:pointerup=on_pointer_up
            on:pointerleave=on_pointer_leave
            on:touchstart=on_touch_start
            on:touchmove=on_touch_move
            on:touchend=on_touch_end
            on:touchcancel=on_touch_end
        >
            <canvas
                node_ref=gpu_canvas_ref
                style="position: absolute; inset: 0; width: 100%; height: 100%; touch-action: none; cursor: grab;"
            />
            <canvas
                node_ref=fallback_canvas_ref
                style:display=move || if gpu_ready.get() { "none" } else { "block" }
                style="position: absolute; inset: 0; width: 100%; height: 100%; pointer-events: none;"
            />
        </div>
    }
}

fn render_canvas2d_fallback(ctx: &CanvasRenderingContext2d, vp: &Viewport, frame: &Frame<WebImage>) {
    ctx.set_fill_style_str(&unit_rgb_css(CLEAR_COLOR.map(|c| c as f32), 1.0));
    ctx.fill_rect(0.0, 0.0, vp.screen_w, vp.screen_h);

    let tw = INNER_TILE_WIDTH * vp.zoom;
    let th = INNER_TILE_HEIGHT * vp.zoom;
    for tile in &frame.tiles {
        let (wx, wy) = tile_origin(tile.pos);
        let (sx, sy) = vp.world_to_screen(wx, wy);
        match &tile.fill {
            TileFill::Image(cached) => {
                let image = &cached.image;
                let (iw, ih) = (image.width() as f64, image.height() as f64);
                let [u0, v0, u1, v1] = crop_uv(image.width(), image.height()).map(f64::from);
                ctx.draw_image_with_image_bitmap_and_sw_and_sh_and_dx_and_dy_and_dw_and_dh(
                    image.bitmap(),
                    u0 * iw,
                    v0 * ih,
                    (u1 - u0) * iw,
                    (v1 - v0) * ih,
                    sx,
                    sy,
                    tw,
                    th,
                )
                .ok();
            }
            TileFill::Color(rgb) => {
                ctx.set_fill_style_str(&unit_rgb_css(*rgb, tile.alpha as f64));
                ctx.fill_rect(sx, sy, tw, th);
            }
        }
    }

    if let Some(pos) = frame.selected {
        let (wx, wy) = tile_origin(pos);
        let (sx, sy) = vp.world_to_screen(wx, wy);
        ctx.set_stroke_style_str("rgba(245, 245, 250, 0.95)");
        ctx.set_line_width(2.0);
        ctx.stroke_rect(sx, sy, tw, th);
    }
    if let Some(hover) = frame.hover.filter(|h| Some(h.pos) != frame.selected) {
        let (wx, wy) = tile_origin(hover.pos);
        let (sx, sy) = vp.world_to_screen(wx, wy);
        ctx.set_stroke_style_str(&format!("rgba(139, 92, 246, {})", hover.alpha));
        ctx.set_line_width(1.5);
        ctx.stroke_rect(sx, sy, tw, th);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_budget_caps_the_render_scale() {
        assert_eq!(clamp_scale_for_pixel_budget(1000, 1000, 2.0, 1.0, 8_000_000.0), 2.0);
        let capped = clamp_scale_for_pixel_budget(2000, 2000, 2.0, 1.0, 4_000_000.0);
        assert!((capped - 1.0).abs() < 1e-9);
        assert_eq!(clamp_scale_for_pixel_budget(0, 0, 0.5, 1.0, 1.0), 1.0);
    }

    #[test]
    fn wheel_deltas_normalise_to_pixels() {
        assert_eq!(wheel_delta_px(3.0, WheelEvent::DOM_DELTA_LINE), 48.0);
        assert_eq!(wheel_delta_px(1.0, WheelEvent::DOM_DELTA_PAGE), WHEEL_PAGE_PX);
        assert_eq!(wheel_delta_px(-120.0, WheelEvent::DOM_DELTA_PIXEL), -120.0);
    }

    #[test]
    fn frame_steps_are_clamped_after_idle() {
        assert_eq!(frame_dt_secs(0.0, 500.0), 0.0);
        assert!((frame_dt_secs(1000.0, 1016.0) - 0.016).abs() < 1e-9);
        assert_eq!(frame_dt_secs(1000.0, 9000.0), MAX_FRAME_DT_SECS);
        assert_eq!(frame_dt_secs(1000.0, 900.0), 0.0);
    }
}
