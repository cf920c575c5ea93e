use futures::FutureExt;
use futures::future::LocalBoxFuture;
use gloo_net::http::Request;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Blob, ImageBitmap};

use crate::image_cache::{DecodedImage, ImageSource, LoadError};

/// A decoded thumbnail living in the browser's image decoder.
pub struct WebImage {
    bitmap: ImageBitmap,
}

impl WebImage {
    pub fn bitmap(&self) -> &ImageBitmap {
        &self.bitmap
    }
}

impl DecodedImage for WebImage {
    fn width(&self) -> u32 {
        self.bitmap.width()
    }

    fn height(&self) -> u32 {
        self.bitmap.height()
    }

    fn release(&self) {
        self.bitmap.close();
    }
}

/// Fetches thumbnails with `fetch` and decodes them off the main thread
/// with `createImageBitmap`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebImageSource;

impl ImageSource for WebImageSource {
    type Image = WebImage;

    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<WebImage, LoadError>> {
        let url = url.to_string();
        async move { fetch_bitmap(&url).await }.boxed_local()
    }
}

fn js_message(err: JsValue) -> String {
    err.as_string()
        .or_else(|| err.dyn_ref::<js_sys::Error>().map(|e| String::from(e.message())))
        .unwrap_or_else(|| format!("{err:?}"))
}

async fn fetch_bitmap(url: &str) -> Result<WebImage, LoadError> {
    let response = Request::get(url)
        .send()
        .await
        .map_err(|e| LoadError::Network(e.to_string()))?;
    if !response.ok() {
        return Err(LoadError::Status(response.status()));
    }

    let blob_promise = web_sys::Response::from(response)
        .blob()
        .map_err(|e| LoadError::Network(js_message(e)))?;
    let blob: Blob = JsFuture::from(blob_promise)
        .await
        .map_err(|e| LoadError::Network(js_message(e)))?
        .dyn_into()
        .map_err(|_| LoadError::Decode("response body is not a blob".to_string()))?;

    let window = web_sys::window().ok_or_else(|| LoadError::Decode("no window".to_string()))?;
    let decode = window
        .create_image_bitmap_with_blob(&blob)
        .map_err(|e| LoadError::Decode(js_message(e)))?;
    let bitmap: ImageBitmap = JsFuture::from(decode)
        .await
        .map_err(|e| LoadError::Decode(js_message(e)))?
        .dyn_into()
        .map_err(|_| LoadError::Decode("decoder returned no ImageBitmap".to_string()))?;

    Ok(WebImage { bitmap })
}
