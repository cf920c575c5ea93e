//! GPU-resident textures keyed by the bitmap they were uploaded from.

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::image_cache::ImageId;

/// A GPU object that must be destroyed explicitly.
pub trait GpuResource {
    fn destroy(&self);
}

struct Resident<T> {
    texture: T,
    last_frame: u64,
}

/// Same batch-eviction discipline as the bitmap cache, with a smaller
/// capacity. Textures drawn in the current frame are never evicted, and
/// evicted ones are only destroyed after the frame's commands are submitted.
pub struct TextureCache<T: GpuResource> {
    entries: LruCache<ImageId, Resident<T>>,
    retired: Vec<T>,
    capacity: usize,
    evict_batch: usize,
    frame: u64,
}

impl<T: GpuResource + Clone> TextureCache<T> {
    pub fn new(capacity: usize, evict_batch: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            retired: Vec::new(),
            capacity,
            evict_batch: evict_batch.clamp(1, capacity),
            frame: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn begin_frame(&mut self) {
        self.frame += 1;
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Resident texture for an image, marked as used this frame.
    pub fn get(&mut self, image: ImageId) -> Option<T> {
        let frame = self.frame;
        let resident = self.entries.get_mut(&image)?;
        resident.last_frame = frame;
        Some(resident.texture.clone())
    }

    pub fn contains(&self, image: ImageId) -> bool {
        self.entries.contains(&image)
    }

    /// Returns `true` if there is room for another texture without
    /// evicting anything drawn this frame.
    pub fn has_room(&self) -> bool {
        self.entries.len() < self.capacity
            || self
                .entries
                .peek_lru()
                .is_some_and(|(_, r)| r.last_frame != self.frame)
    }

    /// Store a freshly uploaded texture. When full, a batch of the coldest
    /// textures not used this frame is retired first.
    pub fn insert(&mut self, image: ImageId, texture: T) {
        if !self.entries.contains(&image) && self.entries.len() >= self.capacity {
            self.evict_cold();
        }
        let replaced = self.entries.push(
            image,
            Resident {
                texture,
                last_frame: self.frame,
            },
        );
        if let Some((_, old)) = replaced {
            self.retired.push(old.texture);
        }
    }

    /// Retire up to one batch of textures, coldest first, skipping any
    /// drawn in the current frame.
    fn evict_cold(&mut self) {
        let frame = self.frame;
        let cold: Vec<ImageId> = self
            .entries
            .iter()
            .rev()
            .filter(|(_, r)| r.last_frame != frame)
            .map(|(id, _)| *id)
            .take(self.evict_batch)
            .collect();
        if !cold.is_empty() {
            tracing::debug!(count = cold.len(), "retiring textures");
        }
        for id in cold {
            if let Some(resident) = self.entries.pop(&id) {
                self.retired.push(resident.texture);
            }
        }
    }

    /// Retire the texture of a bitmap that left the image cache.
    pub fn forget(&mut self, image: ImageId) {
        if let Some(resident) = self.entries.pop(&image) {
            self.retired.push(resident.texture);
        }
    }

    /// Destroy everything retired so far. Call after queue submit.
    pub fn release_retired(&mut self) -> usize {
        let count = self.retired.len();
        for texture in self.retired.drain(..) {
            texture.destroy();
        }
        count
    }

    pub fn clear(&mut self) {
        while let Some((_, resident)) = self.entries.pop_lru() {
            self.retired.push(resident.texture);
        }
        self.release_retired();
    }
}
