//! Builds the per-frame visible tile list from the store and image cache.

use tilewall_shared::grid::GridPos;
use tilewall_shared::{Block, BlockStatus};

use crate::culling::VisiblePlan;
use crate::image_cache::{CachedImage, ImageCache, ImageSource};
use crate::store::BlockStore;

pub const CLEAR_COLOR: [f64; 3] = [0.039, 0.039, 0.039];
pub const LOADING_COLOR: [f32; 3] = [0.12, 0.10, 0.14];
pub const AD_PENDING_COLOR: [f32; 3] = [0.27, 0.10, 0.42];
pub const CLAIMED_NO_IMAGE_COLOR: [f32; 3] = [0.10, 0.10, 0.12];
pub const AD_SLOT_COLOR: [f32; 3] = [0.20, 0.06, 0.32];
pub const EMPTY_COLOR: [f32; 3] = [0.067, 0.067, 0.067];

pub enum TileFill<I> {
    Image(CachedImage<I>),
    Color([f32; 3]),
}

pub struct FrameTile<I> {
    pub pos: GridPos,
    pub fill: TileFill<I>,
    pub alpha: f32,
}

/// Border overlay drawn on top of the tile pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Highlight {
    pub pos: GridPos,
    pub scale: f32,
    pub alpha: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub considered: usize,
    pub drawn: usize,
    pub images: usize,
    pub loads_started: usize,
    pub stride: usize,
}

pub struct Frame<I> {
    pub tiles: Vec<FrameTile<I>>,
    pub hover: Option<Highlight>,
    pub selected: Option<GridPos>,
    pub stats: FrameStats,
    /// Some thumbnail is still on its way.
    pub waiting_on_images: bool,
}

impl<I> Frame<I> {
    pub fn empty() -> Self {
        Self {
            tiles: Vec::new(),
            hover: None,
            selected: None,
            stats: FrameStats::default(),
            waiting_on_images: false,
        }
    }
}

/// Per-frame allowance of new image loads.
struct LoadBudget {
    remaining: usize,
    started: usize,
}

fn fill_for_block<S: ImageSource>(
    block: &Block,
    url: Option<&str>,
    load_images: bool,
    images: &mut ImageCache<S>,
    budget: &mut LoadBudget,
    waiting: &mut bool,
) -> TileFill<S::Image> {
    let no_image = match block.status() {
        BlockStatus::Ad => AD_PENDING_COLOR,
        _ => CLAIMED_NO_IMAGE_COLOR,
    };
    let Some(url) = url.filter(|_| load_images) else {
        return TileFill::Color(no_image);
    };
    if let Some(hit) = images.get(url) {
        return TileFill::Image(hit);
    }
    if images.is_failed(url) {
        return TileFill::Color(no_image);
    }
    *waiting = true;
    if !images.is_pending(url) && budget.remaining > 0 {
        // Completion is collected by `ImageCache::pump`.
        let _ = images.load(url);
        budget.remaining -= 1;
        budget.started += 1;
    }
    TileFill::Color(LOADING_COLOR)
}

/// Resolve every considered cell into something drawable. Empty cells are
/// only emitted when the LOD allows it; otherwise only stored blocks are
/// visited, through the spatial index.
pub fn build_tiles<S: ImageSource>(
    plan: &VisiblePlan,
    store: &BlockStore,
    images: &mut ImageCache<S>,
    max_loads: usize,
) -> Frame<S::Image> {
    let mut frame = Frame::empty();
    let mut budget = LoadBudget {
        remaining: max_loads,
        started: 0,
    };
    let mut waiting = false;
    let load_images = plan.lod.load_images;

    if plan.lod.draw_empty {
        for pos in plan.cells() {
            let fill = match store.block_at(pos) {
                Some(block) => {
                    let url = store.thumbnail_url(block.id);
                    fill_for_block(block, url, load_images, images, &mut budget, &mut waiting)
                }
                None if store.ads().is_ad_slot(pos) => TileFill::Color(AD_SLOT_COLOR),
                None => TileFill::Color(EMPTY_COLOR),
            };
            frame.tiles.push(FrameTile { pos, fill, alpha: 1.0 });
        }
    } else {
        let range = plan.range;
        let stride = plan.stride as i32;
        for block in store.blocks_in(range) {
            let on_stride = (block.pos.col - range.col_min) % stride == 0
                && (block.pos.row - range.row_min) % stride == 0;
            if !on_stride {
                continue;
            }
            let url = store.thumbnail_url(block.id);
            let fill = fill_for_block(block, url, load_images, images, &mut budget, &mut waiting);
            frame.tiles.push(FrameTile {
                pos: block.pos,
                fill,
                alpha: 1.0,
            });
        }
    }

    frame.stats = FrameStats {
        considered: plan.considered_count(),
        drawn: frame.tiles.len(),
        images: frame
            .tiles
            .iter()
            .filter(|t| matches!(t.fill, TileFill::Image(_)))
            .count(),
        loads_started: budget.started,
        stride: plan.stride,
    };
    frame.waiting_on_images = waiting;
    frame
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use futures::future::{FutureExt, LocalBoxFuture};
    use tilewall_shared::{BlockEvent, BlockRow, GridDims};

    use super::*;
    use crate::culling::Lod;
    use crate::image_cache::{DecodedImage, LoadError};
    use crate::viewport::CellRange;

    struct Thumb;

    impl DecodedImage for Thumb {
        fn width(&self) -> u32 {
            320
        }
        fn height(&self) -> u32 {
            180
        }
        fn release(&self) {}
    }

    #[derive(Clone, Default)]
    struct CountingSource {
        fetches: Rc<Cell<usize>>,
    }

    impl ImageSource for CountingSource {
        type Image = Thumb;

        fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Thumb, LoadError>> {
            self.fetches.set(self.fetches.get() + 1);
            let result = if url.contains("broken") {
                Err(LoadError::Decode("bad jpeg".to_string()))
            } else {
                Ok(Thumb)
            };
            futures::future::ready(result).boxed_local()
        }
    }

    fn row(dims: &GridDims, col: i32, row: i32, video: &str) -> BlockRow {
        BlockRow {
            id: dims.grid_to_id(GridPos::new(col, row)).unwrap().0,
            x: col,
            y: row,
            video_id: video.to_string(),
            platform: if video.starts_with("tt") { "tiktok" } else { "youtube" }.to_string(),
            status: "claimed".to_string(),
            ..BlockRow::default()
        }
    }

    fn store_with(rows: Vec<BlockRow>) -> BlockStore {
        let mut store = BlockStore::new(GridDims::DEFAULT, 32, 200);
        store.apply_event(BlockEvent::Snapshot { seq: 1, blocks: rows }, 0.0);
        store
    }

    fn plan(range: CellRange, stride: usize, load_images: bool, draw_empty: bool) -> VisiblePlan {
        VisiblePlan {
            range,
            stride,
            lod: Lod { load_images, draw_empty },
        }
    }

    const CORNER: CellRange = CellRange { col_min: 0, row_min: 0, col_max: 9, row_max: 9 };

    #[test]
    fn loads_are_capped_per_frame_and_picked_up_later() {
        let dims = GridDims::DEFAULT;
        let rows = (0..10).map(|i| row(&dims, i, 0, &format!("video{i:06}"))).collect();
        let store = store_with(rows);
        let source = CountingSource::default();
        let mut images = ImageCache::new(source.clone(), 100, 10);

        let frame = build_tiles(&plan(CORNER, 1, true, true), &store, &mut images, 4);
        assert_eq!(frame.stats.drawn, 100);
        assert_eq!(frame.stats.loads_started, 4);
        assert_eq!(source.fetches.get(), 4);
        assert!(frame.waiting_on_images);

        images.pump(16.0);
        let frame = build_tiles(&plan(CORNER, 1, true, true), &store, &mut images, 4);
        assert_eq!(frame.stats.images, 4);
        assert_eq!(frame.stats.loads_started, 4);
    }

    #[test]
    fn placeholders_follow_block_state() {
        let dims = GridDims::DEFAULT;
        let store = store_with(vec![row(&dims, 0, 0, "tt123"), row(&dims, 1, 0, "broken00000")]);
        let mut images = ImageCache::new(CountingSource::default(), 100, 10);
        build_tiles(&plan(CORNER, 1, true, true), &store, &mut images, 8);
        images.pump(0.0);
        let frame = build_tiles(&plan(CORNER, 1, true, true), &store, &mut images, 8);

        let color_at = |pos: GridPos| match frame.tiles.iter().find(|t| t.pos == pos).map(|t| &t.fill) {
            Some(TileFill::Color(c)) => *c,
            _ => panic!("no color tile at {pos:?}"),
        };
        assert_eq!(color_at(GridPos::new(0, 0)), CLAIMED_NO_IMAGE_COLOR);
        assert_eq!(color_at(GridPos::new(1, 0)), CLAIMED_NO_IMAGE_COLOR);
        assert_eq!(color_at(GridPos::new(5, 5)), EMPTY_COLOR);
        assert!(!frame.waiting_on_images);
    }

    #[test]
    fn far_zoom_draws_only_blocks_without_loading() {
        let dims = GridDims::DEFAULT;
        let store = store_with(vec![row(&dims, 2, 2, "aaaaaaaaaaa"), row(&dims, 3, 3, "bbbbbbbbbbb")]);
        let source = CountingSource::default();
        let mut images = ImageCache::new(source.clone(), 100, 10);
        let frame = build_tiles(&plan(CORNER, 1, false, false), &store, &mut images, 8);
        assert_eq!(frame.tiles.len(), 2);
        assert_eq!(source.fetches.get(), 0);

        // Stride 2 from the range origin keeps (2, 2) and skips (3, 3).
        let frame = build_tiles(&plan(CORNER, 2, false, false), &store, &mut images, 8);
        assert_eq!(frame.tiles.len(), 1);
        assert_eq!(frame.tiles[0].pos, GridPos::new(2, 2));
    }

    #[test]
    fn ad_slots_get_their_own_placeholder() {
        let store = store_with(Vec::new());
        let c = GridDims::DEFAULT.center();
        let d = store.ads().outer_extent();
        let range = CellRange {
            col_min: c.col - d,
            row_min: c.row - d,
            col_max: c.col - d,
            row_max: c.row - d,
        };
        let mut images = ImageCache::new(CountingSource::default(), 10, 1);
        let frame = build_tiles(&plan(range, 1, true, true), &store, &mut images, 8);
        assert!(matches!(frame.tiles[0].fill, TileFill::Color(c) if c == AD_SLOT_COLOR));
    }
}
