use gloo_storage::Storage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::viewport::{MAX_ZOOM, MIN_ZOOM};

pub const STORAGE_KEY: &str = "tilewall.config";

pub const DEFAULT_IMAGE_CACHE_CAPACITY: usize = 2000;
pub const DEFAULT_IMAGE_EVICT_BATCH: usize = 400;
pub const DEFAULT_TEXTURE_CAPACITY: usize = 512;
pub const DEFAULT_TEXTURE_EVICT_BATCH: usize = 128;
pub const DEFAULT_MAX_LOADS_PER_FRAME: usize = 8;
pub const DEFAULT_MAX_VISIBLE_TILES: usize = 8000;
pub const DEFAULT_LOD_LOAD_IMAGES_PX: f64 = 6.0;
pub const DEFAULT_LOD_DRAW_EMPTY_PX: f64 = 2.0;
pub const DEFAULT_TEXTURE_SLOTS: usize = 8;
pub const DEFAULT_MAX_INSTANCES: usize = 4096;
pub const DEFAULT_DRAW_CALL_BUDGET: usize = 64;
pub const DEFAULT_REBALANCE_DEBOUNCE_MS: u32 = 200;
pub const DEFAULT_CLICK_THRESHOLD_PX: f64 = 5.0;
pub const DEFAULT_SPATIAL_BUCKET: u32 = 32;
pub const DEFAULT_FEED_URL: &str = "/api/blocks/stream";
pub const DEFAULT_INTENTS_URL: &str = "/api/intents";
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Texture slots the tile shader declares. Configs cannot exceed it.
pub const MAX_TEXTURE_SLOTS: usize = 8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config json: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Client tunables. Every field falls back to its default when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub image_cache_capacity: usize,
    pub image_evict_batch: usize,
    pub texture_capacity: usize,
    pub texture_evict_batch: usize,
    pub max_loads_per_frame: usize,
    pub max_visible_tiles: usize,
    /// On-screen tile height (px) at which thumbnails start loading.
    pub lod_load_images_px: f64,
    /// On-screen tile height (px) below which empty cells are not drawn.
    pub lod_draw_empty_px: f64,
    pub texture_slots: usize,
    pub max_instances: usize,
    pub draw_call_budget: usize,
    pub rebalance_debounce_ms: u32,
    pub click_threshold_px: f64,
    pub spatial_bucket: u32,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub feed_url: String,
    pub intents_url: String,
    pub log_filter: String,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            image_cache_capacity: DEFAULT_IMAGE_CACHE_CAPACITY,
            image_evict_batch: DEFAULT_IMAGE_EVICT_BATCH,
            texture_capacity: DEFAULT_TEXTURE_CAPACITY,
            texture_evict_batch: DEFAULT_TEXTURE_EVICT_BATCH,
            max_loads_per_frame: DEFAULT_MAX_LOADS_PER_FRAME,
            max_visible_tiles: DEFAULT_MAX_VISIBLE_TILES,
            lod_load_images_px: DEFAULT_LOD_LOAD_IMAGES_PX,
            lod_draw_empty_px: DEFAULT_LOD_DRAW_EMPTY_PX,
            texture_slots: DEFAULT_TEXTURE_SLOTS,
            max_instances: DEFAULT_MAX_INSTANCES,
            draw_call_budget: DEFAULT_DRAW_CALL_BUDGET,
            rebalance_debounce_ms: DEFAULT_REBALANCE_DEBOUNCE_MS,
            click_threshold_px: DEFAULT_CLICK_THRESHOLD_PX,
            spatial_bucket: DEFAULT_SPATIAL_BUCKET,
            min_zoom: MIN_ZOOM,
            max_zoom: MAX_ZOOM,
            feed_url: DEFAULT_FEED_URL.to_string(),
            intents_url: DEFAULT_INTENTS_URL.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

fn positive_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}

impl CanvasConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: CanvasConfig = serde_json::from_str(json)?;
        Ok(config.sanitized())
    }

    /// Override from local storage, or defaults.
    pub fn load() -> Self {
        match gloo_storage::LocalStorage::get::<CanvasConfig>(STORAGE_KEY) {
            Ok(config) => config.sanitized(),
            Err(gloo_storage::errors::StorageError::KeyNotFound(_)) => Self::default(),
            Err(err) => {
                tracing::warn!(key = STORAGE_KEY, error = %err, "ignoring stored config");
                Self::default()
            }
        }
    }

    /// Clamp values into ranges the renderer and caches can work with.
    pub fn sanitized(mut self) -> Self {
        self.image_cache_capacity = self.image_cache_capacity.max(1);
        self.image_evict_batch = self.image_evict_batch.clamp(1, self.image_cache_capacity);
        self.texture_capacity = self.texture_capacity.max(1);
        self.texture_evict_batch = self.texture_evict_batch.clamp(1, self.texture_capacity);
        self.max_visible_tiles = self.max_visible_tiles.max(1);
        self.texture_slots = self.texture_slots.clamp(1, MAX_TEXTURE_SLOTS);
        self.max_instances = self.max_instances.max(1);
        self.draw_call_budget = self.draw_call_budget.max(1);
        self.spatial_bucket = self.spatial_bucket.max(1);
        self.lod_load_images_px = positive_or(self.lod_load_images_px, DEFAULT_LOD_LOAD_IMAGES_PX);
        self.lod_draw_empty_px = positive_or(self.lod_draw_empty_px, DEFAULT_LOD_DRAW_EMPTY_PX);
        self.click_threshold_px = positive_or(self.click_threshold_px, DEFAULT_CLICK_THRESHOLD_PX);
        self.min_zoom = positive_or(self.min_zoom, MIN_ZOOM);
        self.max_zoom = positive_or(self.max_zoom, MAX_ZOOM);
        if self.min_zoom > self.max_zoom {
            std::mem::swap(&mut self.min_zoom, &mut self.max_zoom);
        }
        if self.log_filter.trim().is_empty() {
            self.log_filter = DEFAULT_LOG_FILTER.to_string();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = CanvasConfig::from_json(r#"{"max_visible_tiles": 100}"#).unwrap();
        assert_eq!(config.max_visible_tiles, 100);
        assert_eq!(config.image_cache_capacity, DEFAULT_IMAGE_CACHE_CAPACITY);
        assert_eq!(config.feed_url, DEFAULT_FEED_URL);
    }

    #[test]
    fn sanitize_repairs_unusable_values() {
        let config = CanvasConfig::from_json(
            r#"{
                "image_cache_capacity": 0,
                "image_evict_batch": 50,
                "texture_slots": 32,
                "min_zoom": 4.0,
                "max_zoom": 0.5,
                "lod_load_images_px": -1.0,
                "log_filter": " "
            }"#,
        )
        .unwrap();
        assert_eq!(config.image_cache_capacity, 1);
        assert_eq!(config.image_evict_batch, 1);
        assert_eq!(config.texture_slots, MAX_TEXTURE_SLOTS);
        assert_eq!((config.min_zoom, config.max_zoom), (0.5, 4.0));
        assert_eq!(config.lod_load_images_px, DEFAULT_LOD_LOAD_IMAGES_PX);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            CanvasConfig::from_json("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
