use std::cell::RefCell;
use std::rc::Rc;

use leptos::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

use tilewall_shared::GridDims;

use crate::canvas::GridCanvas;
use crate::config::CanvasConfig;
use crate::controller::CanvasController;
use crate::feed::{self, ConnectionStatus};
use crate::image_cache::ImageCache;
use crate::logging;
use crate::minimap::Minimap;
use crate::preview::BlockPreview;
use crate::render_loop::now_ms;
use crate::sidebar::Sidebar;
use crate::store::BlockStore;
use crate::web_image::WebImageSource;

/// Decoded thumbnails shared by the canvas and the preview panel.
/// Image handles are not `Send`, so the cache lives in local storage.
#[derive(Clone, Copy)]
pub struct SharedImages(pub StoredValue<ImageCache<WebImageSource>, LocalStorage>);

struct KeydownBinding {
    window: web_sys::Window,
    _handler: Closure<dyn Fn(web_sys::KeyboardEvent)>,
}

thread_local! {
    static KEYDOWN_BINDING: RefCell<Option<KeydownBinding>> = const { RefCell::new(None) };
}

/// What a key press does to the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shortcut {
    Dismiss,
    FitGrid,
    CenterGrid,
}

fn shortcut_for(key: &str) -> Option<Shortcut> {
    match key {
        "Escape" => Some(Shortcut::Dismiss),
        "f" | "F" => Some(Shortcut::FitGrid),
        "c" | "C" => Some(Shortcut::CenterGrid),
        _ => None,
    }
}

fn apply_shortcut(controller: &mut CanvasController, shortcut: Shortcut) {
    match shortcut {
        // Closing an open claim form takes priority over clearing the selection.
        Shortcut::Dismiss => {
            if controller.claim_target().is_some() {
                controller.close_claim();
            } else {
                controller.deselect();
            }
        }
        Shortcut::FitGrid => controller.fit_grid(),
        Shortcut::CenterGrid => {
            let center = controller.dims().center();
            controller.center_on_cell(center);
        }
    }
}

fn bind_shortcuts(controller: RwSignal<CanvasController>) {
    let Some(window) = web_sys::window() else {
        return;
    };

    KEYDOWN_BINDING.with(|slot| {
        if let Some(old) = slot.borrow_mut().take() {
            let _ = old.window.remove_event_listener_with_callback(
                "keydown",
                old._handler.as_ref().unchecked_ref(),
            );
        }
    });

    let handler = Closure::<dyn Fn(web_sys::KeyboardEvent)>::new(move |e: web_sys::KeyboardEvent| {
        let key = e.key();
        let target = e
            .target()
            .and_then(|t| t.dyn_into::<web_sys::HtmlElement>().ok());
        let target_tag = target.as_ref().map(|el| el.tag_name()).unwrap_or_default();

        // Don't intercept when typing in an input
        if target_tag == "INPUT" || target_tag == "TEXTAREA" {
            if key == "Escape"
                && let Some(el) = target
            {
                el.blur().ok();
            }
            return;
        }

        let Some(shortcut) = shortcut_for(&key) else {
            return;
        };
        e.prevent_default();
        controller.update(|c| apply_shortcut(c, shortcut));
    });

    if window
        .add_event_listener_with_callback("keydown", handler.as_ref().unchecked_ref())
        .is_ok()
    {
        KEYDOWN_BINDING.with(|slot| {
            *slot.borrow_mut() = Some(KeydownBinding {
                window: window.clone(),
                _handler: handler,
            });
        });
    }
}

fn remove_loading_shell() {
    let Some(window) = web_sys::window() else {
        return;
    };
    let Some(document) = window.document() else {
        return;
    };
    if let Some(shell) = document.get_element_by_id("app-loading-shell") {
        shell.remove();
    }
}

#[component]
pub fn App() -> impl IntoView {
    let config = CanvasConfig::load();
    logging::init(&config.log_filter);
    tracing::info!(
        cells = GridDims::DEFAULT.cell_count(),
        image_cache = config.image_cache_capacity,
        textures = config.texture_capacity,
        "starting tilewall client"
    );

    let dims = GridDims::DEFAULT;
    let store = RwSignal::new(BlockStore::new(
        dims,
        config.spatial_bucket,
        config.rebalance_debounce_ms,
    ));
    let images = SharedImages(StoredValue::new_local(ImageCache::new(
        WebImageSource,
        config.image_cache_capacity,
        config.image_evict_batch,
    )));
    let connection = RwSignal::new(ConnectionStatus::Connecting);
    let feed_url = config.feed_url.clone();
    let controller = RwSignal::new(CanvasController::new(dims, config));

    provide_context(store);
    provide_context(controller);
    provide_context(images);
    provide_context(connection);

    Effect::new(move || {
        let sink: feed::EventSink = Rc::new(move |event| {
            store.update(|s| {
                s.apply_event(event, now_ms());
            });
        });
        feed::connect(&feed_url, connection, sink);
    });
    on_cleanup(feed::disconnect);

    Effect::new(move || bind_shortcuts(controller));
    Effect::new(move || remove_loading_shell());

    view! {
        <div style="width: 100%; height: 100%; position: relative; overflow: hidden; background: #0d0d10;">
            <GridCanvas />
            <Sidebar />
            <Minimap />
            <BlockPreview />
        </div>
    }
}
