mod animation;
mod app;
mod batching;
mod canvas;
mod colors;
mod config;
mod controller;
mod culling;
mod feed;
mod frame;
#[cfg(target_arch = "wasm32")]
mod gpu;
mod image_cache;
mod intents;
mod interaction;
mod logging;
mod minimap;
mod preview;
mod render_loop;
mod sidebar;
mod spatial;
mod store;
mod texture_cache;
mod viewport;
mod web_image;

#[cfg(not(target_arch = "wasm32"))]
mod gpu {
    use crate::config::CanvasConfig;
    use crate::frame::Frame;
    use crate::image_cache::ImageId;
    use crate::viewport::Viewport;
    use crate::web_image::WebImage;

    pub struct RenderFrameInput<'a> {
        pub vp: &'a Viewport,
        pub frame: &'a Frame<WebImage>,
        pub now: f64,
    }

    pub struct GpuRenderer;

    impl GpuRenderer {
        pub async fn init(
            _canvas: web_sys::HtmlCanvasElement,
            _config: &CanvasConfig,
        ) -> Result<Self, String> {
            Err("not wasm".into())
        }
        pub fn resize(&mut self, _w: u32, _h: u32, _dpr: f32) {}
        pub fn forget_images(&mut self, _evicted: &[ImageId]) {}
        pub fn render(&mut self, input: RenderFrameInput<'_>) -> bool {
            let _ = (input.vp, input.frame, input.now);
            false
        }
    }
}

use leptos::mount::mount_to;
use std::any::Any;
use std::cell::RefCell;
use wasm_bindgen::JsCast;

thread_local! {
    static APP_MOUNT_HANDLE: RefCell<Option<Box<dyn Any>>> = RefCell::new(None);
}

fn main() {
    console_error_panic_hook::set_once();
    let Some(window) = web_sys::window() else {
        return;
    };
    let Some(document) = window.document() else {
        return;
    };
    let mount_target = document
        .get_element_by_id("app")
        .and_then(|node| node.dyn_into::<web_sys::HtmlElement>().ok())
        .or_else(|| document.body());
    let Some(target) = mount_target else {
        return;
    };

    APP_MOUNT_HANDLE.with(move |slot| {
        // If main() is re-entered (e.g. dev/hot-reload runtime quirks), drop the old mount
        // so stale effects/signals can't keep mutating app state.
        let _old = slot.borrow_mut().take();
        let handle = mount_to(target, app::App);
        *slot.borrow_mut() = Some(Box::new(handle));
    });
}
