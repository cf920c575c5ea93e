//! Per-instance data and draw-call planning for the tile pass.

use std::collections::HashMap;
use std::hash::Hash;

use bytemuck::{Pod, Zeroable};
use tilewall_shared::grid::{GridPos, TILE_ASPECT, tile_origin};

/// Instance slot value for tiles drawn as a flat color.
pub const SOLID_SLOT: i32 = -1;

/// One tile instance, laid out for the vertex buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TileInstance {
    /// World-space top-left of the inset tile.
    pub offset: [f32; 2],
    /// Texture slot within the batch, or `SOLID_SLOT`.
    pub slot: f32,
    pub scale: f32,
    /// RGB plus alpha. Alpha also multiplies sampled texels.
    pub color: [f32; 4],
    /// `u0, v0, u1, v1`.
    pub uv: [f32; 4],
}

impl TileInstance {
    pub fn solid(pos: GridPos, color: [f32; 3], alpha: f32, scale: f32) -> Self {
        let (x, y) = tile_origin(pos);
        Self {
            offset: [x as f32, y as f32],
            slot: SOLID_SLOT as f32,
            scale,
            color: [color[0], color[1], color[2], alpha],
            uv: [0.0, 0.0, 1.0, 1.0],
        }
    }

    pub fn textured(pos: GridPos, slot: u32, uv: [f32; 4], alpha: f32, scale: f32) -> Self {
        let (x, y) = tile_origin(pos);
        Self {
            offset: [x as f32, y as f32],
            slot: slot as f32,
            scale,
            color: [1.0, 1.0, 1.0, alpha],
            uv,
        }
    }
}

/// UV sub-rectangle that center-crops a `src_w x src_h` image to the tile
/// aspect ratio.
pub fn crop_uv(src_w: u32, src_h: u32) -> [f32; 4] {
    if src_w == 0 || src_h == 0 {
        return [0.0, 0.0, 1.0, 1.0];
    }
    let src_aspect = src_w as f64 / src_h as f64;
    if src_aspect > TILE_ASPECT {
        // Too wide: trim the sides.
        let keep = TILE_ASPECT / src_aspect;
        let u0 = ((1.0 - keep) / 2.0) as f32;
        [u0, 0.0, 1.0 - u0, 1.0]
    } else {
        let keep = src_aspect / TILE_ASPECT;
        let v0 = ((1.0 - keep) / 2.0) as f32;
        [0.0, v0, 1.0, 1.0 - v0]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub texture_slots: usize,
    pub max_instances: usize,
    pub draw_call_budget: usize,
}

/// One draw call: the textures bound to its slots and the tiles it draws.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<K> {
    pub textures: Vec<K>,
    /// `(tile index, slot)`; slot is `SOLID_SLOT` for untextured tiles.
    pub tiles: Vec<(usize, i32)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan<K> {
    pub batches: Vec<Batch<K>>,
    /// Tiles left over when the draw-call budget ran out.
    pub dropped: usize,
}

/// Split tiles into draw calls with at most `texture_slots` distinct
/// textures each. Tiles sharing a texture share its slot. A tile whose
/// texture does not fit is deferred to the next batch.
pub fn plan_batches<K: Copy + Eq + Hash>(keys: &[Option<K>], limits: BatchLimits) -> BatchPlan<K> {
    let slots = limits.texture_slots.max(1);
    let max_instances = limits.max_instances.max(1);
    let mut pending: Vec<usize> = (0..keys.len()).collect();
    let mut batches = Vec::new();

    while !pending.is_empty() && batches.len() < limits.draw_call_budget {
        let mut batch = Batch {
            textures: Vec::new(),
            tiles: Vec::with_capacity(pending.len().min(max_instances)),
        };
        let mut slot_of: HashMap<K, i32> = HashMap::new();
        let mut deferred = Vec::new();

        for index in pending {
            if batch.tiles.len() >= max_instances {
                deferred.push(index);
                continue;
            }
            match keys[index] {
                None => batch.tiles.push((index, SOLID_SLOT)),
                Some(key) => {
                    if let Some(&slot) = slot_of.get(&key) {
                        batch.tiles.push((index, slot));
                    } else if batch.textures.len() < slots {
                        let slot = batch.textures.len() as i32;
                        batch.textures.push(key);
                        slot_of.insert(key, slot);
                        batch.tiles.push((index, slot));
                    } else {
                        deferred.push(index);
                    }
                }
            }
        }

        batches.push(batch);
        pending = deferred;
    }

    BatchPlan {
        batches,
        dropped: pending.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilewall_shared::grid::{INNER_TILE_HEIGHT, INNER_TILE_WIDTH};

    fn limits(slots: usize, max_instances: usize, budget: usize) -> BatchLimits {
        BatchLimits {
            texture_slots: slots,
            max_instances,
            draw_call_budget: budget,
        }
    }

    #[test]
    fn wide_images_lose_their_sides() {
        // 16:9 thumbnail into a tall tile.
        let [u0, v0, u1, v1] = crop_uv(320, 180);
        assert_eq!((v0, v1), (0.0, 1.0));
        let visible = (u1 - u0) as f64 * 320.0 / 180.0;
        assert!((visible - TILE_ASPECT).abs() < 1e-5);
        assert!((u0 - (1.0 - u1)).abs() < 1e-6);
    }

    #[test]
    fn tall_images_lose_top_and_bottom() {
        let [u0, v0, u1, v1] = crop_uv(100, 1000);
        assert_eq!((u0, u1), (0.0, 1.0));
        let visible_h = (v1 - v0) as f64 * 1000.0;
        assert!((100.0 / visible_h - TILE_ASPECT).abs() < 1e-4);
    }

    #[test]
    fn matching_aspect_and_degenerate_sizes_use_full_image() {
        let w = (INNER_TILE_WIDTH * 10.0) as u32;
        let h = (INNER_TILE_HEIGHT * 10.0) as u32;
        let uv = crop_uv(w, h);
        assert!(uv.iter().zip([0.0, 0.0, 1.0, 1.0]).all(|(a, b)| (a - b).abs() < 1e-6));
        assert_eq!(crop_uv(0, 10), [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn repeated_textures_share_a_slot() {
        let keys = [Some(7), Some(7), None, Some(3), Some(7)];
        let plan = plan_batches(&keys, limits(8, 100, 10));
        assert_eq!(plan.batches.len(), 1);
        let batch = &plan.batches[0];
        assert_eq!(batch.textures, vec![7, 3]);
        assert_eq!(batch.tiles, vec![(0, 0), (1, 0), (2, SOLID_SLOT), (3, 1), (4, 0)]);
    }

    #[test]
    fn overflowing_textures_are_deferred() {
        let keys: Vec<Option<u32>> = vec![Some(1), Some(2), Some(3), None, Some(1), Some(4)];
        let plan = plan_batches(&keys, limits(2, 100, 10));
        assert_eq!(plan.dropped, 0);
        assert_eq!(plan.batches.len(), 2);
        assert_eq!(plan.batches[0].textures, vec![1, 2]);
        assert_eq!(plan.batches[0].tiles, vec![(0, 0), (1, 1), (3, SOLID_SLOT), (4, 0)]);
        assert_eq!(plan.batches[1].textures, vec![3, 4]);
        assert_eq!(plan.batches[1].tiles, vec![(2, 0), (5, 1)]);
    }

    #[test]
    fn every_tile_is_drawn_exactly_once() {
        let keys: Vec<Option<u32>> = (0..500).map(|i| (i % 3 != 0).then_some(i % 37)).collect();
        let plan = plan_batches(&keys, limits(8, 64, 1000));
        assert_eq!(plan.dropped, 0);
        let mut seen: Vec<usize> = plan.batches.iter().flat_map(|b| b.tiles.iter().map(|t| t.0)).collect();
        seen.sort();
        assert_eq!(seen, (0..500).collect::<Vec<_>>());
        assert!(plan.batches.iter().all(|b| b.textures.len() <= 8 && b.tiles.len() <= 64));
    }

    #[test]
    fn draw_call_budget_caps_batches() {
        let keys: Vec<Option<u32>> = (0..40).map(Some).collect();
        let plan = plan_batches(&keys, limits(8, 100, 3));
        assert_eq!(plan.batches.len(), 3);
        assert_eq!(plan.dropped, 16);
    }

    #[test]
    fn instances_place_tiles_at_their_cells() {
        let solid = TileInstance::solid(GridPos::new(2, 3), [0.1, 0.2, 0.3], 1.0, 1.0);
        assert_eq!(solid.offset, [112.5, 300.5]);
        assert_eq!(solid.slot, -1.0);
        let textured = TileInstance::textured(GridPos::new(0, 0), 5, [0.1, 0.0, 0.9, 1.0], 0.5, 1.0);
        assert_eq!(textured.slot, 5.0);
        assert_eq!(textured.color[3], 0.5);
        assert_eq!(std::mem::size_of::<TileInstance>(), 48);
    }
}
