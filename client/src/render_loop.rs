use std::cell::{Cell, RefCell};
use std::rc::Rc;

use wasm_bindgen::prelude::*;

/// Drives the canvas from `requestAnimationFrame`.
///
/// `mark_dirty()` requests a frame; any number of marks before the next
/// vsync collapse into one call of the frame function, which receives the
/// rAF timestamp in milliseconds. While it returns `true` (hover easing,
/// thumbnails still loading) the next frame is requested automatically.
pub struct RenderScheduler {
    inner: Rc<Inner>,
}

struct Inner {
    window: Option<web_sys::Window>,
    dirty: Cell<bool>,
    scheduled: Cell<bool>,
    raf_id: Cell<Option<i32>>,
    callback: RefCell<Option<Closure<dyn FnMut(f64)>>>,
}

impl Inner {
    fn request_frame(&self) {
        if self.scheduled.get() {
            return;
        }
        let callback = self.callback.borrow();
        let (Some(cb), Some(window)) = (callback.as_ref(), self.window.as_ref()) else {
            return;
        };
        self.scheduled.set(true);
        match window.request_animation_frame(cb.as_ref().unchecked_ref()) {
            Ok(id) => self.raf_id.set(Some(id)),
            Err(_) => self.scheduled.set(false),
        }
    }
}

impl RenderScheduler {
    pub fn new(mut frame_fn: impl FnMut(f64) -> bool + 'static) -> Self {
        let inner = Rc::new(Inner {
            window: web_sys::window(),
            dirty: Cell::new(false),
            scheduled: Cell::new(false),
            raf_id: Cell::new(None),
            callback: RefCell::new(None),
        });

        let inner_cb = inner.clone();
        let cb = Closure::<dyn FnMut(f64)>::new(move |timestamp_ms: f64| {
            inner_cb.scheduled.set(false);
            inner_cb.raf_id.set(None);
            if !inner_cb.dirty.replace(false) {
                return;
            }
            if frame_fn(timestamp_ms) {
                inner_cb.dirty.set(true);
                inner_cb.request_frame();
            }
        });
        *inner.callback.borrow_mut() = Some(cb);

        Self { inner }
    }

    pub fn mark_dirty(&self) {
        self.inner.dirty.set(true);
        self.inner.request_frame();
    }
}

impl Drop for RenderScheduler {
    fn drop(&mut self) {
        if let Some(raf_id) = self.inner.raf_id.replace(None)
            && let Some(window) = self.inner.window.as_ref()
        {
            let _ = window.cancel_animation_frame(raf_id);
        }
        self.inner.scheduled.set(false);
        self.inner.dirty.set(false);
        // The closure holds an Rc to `inner`.
        self.inner.callback.borrow_mut().take();
    }
}

/// Milliseconds on the `performance.now()` clock, the same clock as the
/// rAF timestamp.
pub fn now_ms() -> f64 {
    web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
        .unwrap_or_else(js_sys::Date::now)
}
