//! In-memory view of the grid as pushed by the backend feed.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tilewall_shared::gravity::{GravityMove, RebalanceEntry, compute_gravity_delta};
use tilewall_shared::spiral::raw_spiral_index;
use tilewall_shared::{
    AdLayout, Block, BlockContent, BlockEvent, BlockId, BlockRow, BlockStatus, ClaimIntent,
    GridDims, GridPos, VideoRef, VideoRefError,
};

use crate::spatial::SpatialIndex;
use crate::viewport::CellRange;

pub const TOP_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    #[error(transparent)]
    Video(#[from] VideoRefError),
    #[error("cell is outside the grid")]
    OutOfBounds,
    #[error("cell is reserved for ads")]
    AdSlot,
    #[error("cell already holds block {0}")]
    Occupied(BlockId),
    #[error("video already placed at block {0}")]
    Duplicate(BlockId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub claimed: usize,
    pub ads: usize,
    pub total_likes: u64,
    pub total_dislikes: u64,
    /// Highest net score first: `(id, net score)`.
    pub top: Vec<(BlockId, i64)>,
}

/// Result of a debounced flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub moves: Vec<GravityMove>,
    pub conflicts: usize,
}

/// Non-empty blocks plus everything derived from them: the spatial index,
/// the ad layout, a video index and statistics.
///
/// Score and claim changes do not rebalance immediately. They set a
/// deadline, and [`BlockStore::flush_if_due`] runs one rebalance for every
/// change that arrived before it.
pub struct BlockStore {
    dims: GridDims,
    blocks: HashMap<BlockId, Block>,
    spatial: SpatialIndex,
    ads: AdLayout,
    by_video: HashMap<String, BlockId>,
    thumbnails: HashMap<BlockId, String>,
    claimed: usize,
    ad_cells: HashSet<GridPos>,
    ad_cells_dirty: bool,
    stats: StoreStats,
    last_seq: u64,
    debounce_ms: f64,
    due_at: Option<f64>,
    revision: u64,
}

impl BlockStore {
    pub fn new(dims: GridDims, spatial_bucket: u32, debounce_ms: u32) -> Self {
        Self {
            dims,
            blocks: HashMap::new(),
            spatial: SpatialIndex::new(dims, spatial_bucket),
            ads: AdLayout::for_claimed(dims, 0),
            by_video: HashMap::new(),
            thumbnails: HashMap::new(),
            claimed: 0,
            ad_cells: HashSet::new(),
            ad_cells_dirty: false,
            stats: StoreStats::default(),
            last_seq: 0,
            debounce_ms: debounce_ms as f64,
            due_at: None,
            revision: 0,
        }
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Bumped on every visible change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    pub fn ads(&self) -> &AdLayout {
        &self.ads
    }

    pub fn spatial(&self) -> &SpatialIndex {
        &self.spatial
    }

    pub fn claimed_count(&self) -> usize {
        self.claimed
    }

    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(&id)
    }

    pub fn block_at(&self, pos: GridPos) -> Option<&Block> {
        self.dims.grid_to_id(pos).and_then(|id| self.blocks.get(&id))
    }

    /// Image URL drawn on a stored block, derived once when the block arrives.
    pub fn thumbnail_url(&self, id: BlockId) -> Option<&str> {
        self.thumbnails.get(&id).map(String::as_str)
    }

    pub fn find_video(&self, video: &VideoRef) -> Option<BlockId> {
        self.by_video.get(&video.watch_url()).copied()
    }

    /// Blocks inside the range, exact bounds.
    pub fn blocks_in(&self, range: CellRange) -> impl Iterator<Item = &Block> + '_ {
        self.spatial
            .query_range(range.col_min, range.row_min, range.col_max, range.row_max)
            .into_iter()
            .filter_map(|id| self.blocks.get(&id))
            .filter(move |b| range.contains(b.pos))
    }

    pub fn is_rebalance_pending(&self) -> bool {
        self.due_at.is_some()
    }

    pub fn is_rebalance_due(&self, now_ms: f64) -> bool {
        self.due_at.is_some_and(|due| now_ms >= due)
    }

    /// Ask for a rebalance. The first request opens the debounce window and
    /// later ones join it.
    pub fn schedule_rebalance(&mut self, now_ms: f64) {
        if self.due_at.is_none() {
            self.due_at = Some(now_ms + self.debounce_ms);
        }
    }

    /// Apply one feed message. Returns `false` when nothing changed.
    pub fn apply_event(&mut self, event: BlockEvent, now_ms: f64) -> bool {
        let seq = event.seq();
        let snapshot = matches!(event, BlockEvent::Snapshot { .. });
        if !snapshot && seq != 0 && seq <= self.last_seq {
            tracing::debug!(seq, last = self.last_seq, "skipping stale event");
            return false;
        }
        self.last_seq = if snapshot { seq } else { self.last_seq.max(seq) };

        let changed = match event {
            BlockEvent::Snapshot { blocks, .. } => {
                self.load_snapshot(blocks);
                true
            }
            BlockEvent::Insert { block, .. } => self.apply_row(block),
            BlockEvent::Update { old, new, .. } => {
                let mut changed = false;
                if let Some(old) = old
                    && (old.x, old.y) != (new.x, new.y)
                {
                    changed |= self.remove_if_same(old, &new);
                }
                changed | self.apply_row(new)
            }
            BlockEvent::Delete { block, .. } => match block.into_block(&self.dims) {
                Ok(block) => self.remove(block.id).is_some(),
                Err(err) => {
                    tracing::warn!(error = %err, "ignoring invalid delete");
                    false
                }
            },
        };

        if changed {
            self.revision += 1;
            self.after_change(now_ms);
        }
        changed
    }

    fn load_snapshot(&mut self, rows: Vec<BlockRow>) {
        self.blocks.clear();
        self.by_video.clear();
        self.thumbnails.clear();
        self.ad_cells.clear();
        self.ad_cells_dirty = true;
        self.claimed = 0;
        let mut rejected = 0usize;
        for row in rows {
            match row.into_block(&self.dims) {
                Ok(block) if block.status() != BlockStatus::Empty => {
                    if let Some(duplicate) = self.blocks.remove(&block.id) {
                        self.untrack(&duplicate);
                    }
                    self.track(&block);
                    self.blocks.insert(block.id, block);
                }
                Ok(_) => {}
                Err(err) => {
                    rejected += 1;
                    tracing::debug!(error = %err, "rejected snapshot row");
                }
            }
        }
        if rejected > 0 {
            tracing::warn!(rejected, "snapshot contained invalid rows");
        }
        self.spatial
            .rebuild(self.blocks.values().map(|b| (b.id, b.pos)));
        tracing::info!(blocks = self.blocks.len(), "loaded snapshot");
    }

    fn apply_row(&mut self, row: BlockRow) -> bool {
        match row.into_block(&self.dims) {
            Ok(block) if block.status() == BlockStatus::Empty => self.remove(block.id).is_some(),
            Ok(block) => {
                let unchanged = self.blocks.get(&block.id) == Some(&block);
                if !unchanged {
                    self.upsert(block);
                }
                !unchanged
            }
            Err(err) => {
                tracing::warn!(error = %err, "ignoring invalid block row");
                false
            }
        }
    }

    /// Remove the cell an update moved away from, unless something else has
    /// taken it since.
    fn remove_if_same(&mut self, old: BlockRow, new: &BlockRow) -> bool {
        let Ok(old) = old.into_block(&self.dims) else {
            return false;
        };
        let same = self.blocks.get(&old.id).is_some_and(|stored| match (&stored.content, new.status.as_str()) {
            (BlockContent::Claimed(c), "claimed") => c.video.video_id == new.video_id,
            (BlockContent::Ad(_), "ad") => true,
            _ => false,
        });
        same && self.remove(old.id).is_some()
    }

    /// Count a block that is entering the map.
    fn track(&mut self, block: &Block) {
        if let Some(url) = block.thumbnail_url() {
            self.thumbnails.insert(block.id, url);
        }
        match &block.content {
            BlockContent::Claimed(c) => {
                self.claimed += 1;
                self.by_video.insert(c.video.watch_url(), block.id);
            }
            BlockContent::Ad(_) => {
                self.ad_cells.insert(block.pos);
                self.ad_cells_dirty = true;
            }
            BlockContent::Empty => {}
        }
    }

    /// Undo [`Self::track`] for a block leaving the map.
    fn untrack(&mut self, block: &Block) {
        self.thumbnails.remove(&block.id);
        match &block.content {
            BlockContent::Claimed(c) => {
                self.claimed = self.claimed.saturating_sub(1);
                let url = c.video.watch_url();
                if self.by_video.get(&url) == Some(&block.id) {
                    self.by_video.remove(&url);
                }
            }
            BlockContent::Ad(_) => {
                self.ad_cells.remove(&block.pos);
                self.ad_cells_dirty = true;
            }
            BlockContent::Empty => {}
        }
    }

    fn upsert(&mut self, block: Block) {
        if let Some(previous) = self.blocks.remove(&block.id) {
            self.untrack(&previous);
        }
        self.track(&block);
        self.spatial.insert(block.id, block.pos);
        self.blocks.insert(block.id, block);
    }

    fn remove(&mut self, id: BlockId) -> Option<Block> {
        let block = self.blocks.remove(&id)?;
        self.untrack(&block);
        self.spatial.remove(id);
        Some(block)
    }

    /// Ad layout upkeep and rebalance scheduling after any change.
    fn after_change(&mut self, now_ms: f64) {
        if self.ad_cells_dirty {
            self.ads.set_reserved(self.ad_cells.iter().copied());
            self.ad_cells_dirty = false;
        }
        if self.ads.rebuild(self.claimed) {
            let conflicts = self.ads.conflicts(self.claimed_positions());
            if !conflicts.is_empty() {
                tracing::warn!(count = conflicts.len(), "claimed blocks inside new ad rings");
            }
        }
        self.schedule_rebalance(now_ms);
    }

    fn claimed_positions(&self) -> Vec<GridPos> {
        self.blocks
            .values()
            .filter(|b| b.status() == BlockStatus::Claimed)
            .map(|b| b.pos)
            .collect()
    }

    /// Run the pending rebalance once its debounce window has passed.
    pub fn flush_if_due(&mut self, now_ms: f64) -> Option<FlushReport> {
        let due = self.due_at?;
        if now_ms < due {
            return None;
        }
        self.due_at = None;
        Some(self.flush())
    }

    /// Recompute statistics and rebalance now.
    pub fn flush(&mut self) -> FlushReport {
        self.due_at = None;
        let conflicts = self.ads.conflicts(self.claimed_positions()).len();
        let moves = self.rebalance();
        self.recompute_stats();
        if !moves.is_empty() {
            self.revision += 1;
        }
        FlushReport { moves, conflicts }
    }

    /// Claimed blocks in a deterministic order: where they sit on the spiral
    /// now, then claim time, then id. Ties in score keep this order.
    fn rebalance_entries(&self) -> Vec<RebalanceEntry> {
        let center = self.dims.center();
        let mut claimed: Vec<&Block> = self
            .blocks
            .values()
            .filter(|b| b.status() == BlockStatus::Claimed)
            .collect();
        claimed.sort_by_key(|b| {
            let claimed_at = b
                .claimed()
                .and_then(|c| c.claimed_at)
                .map_or(i64::MAX, |t| t.timestamp_micros());
            (raw_spiral_index(center, b.pos), claimed_at, b.id)
        });
        claimed
            .into_iter()
            .map(|b| RebalanceEntry {
                id: b.id,
                likes: b.likes(),
                dislikes: b.dislikes(),
                current: b.pos,
            })
            .collect()
    }

    /// Move claimed blocks to their gravity positions. Returns the moves
    /// that were applied.
    pub fn rebalance(&mut self) -> Vec<GravityMove> {
        let entries = self.rebalance_entries();
        let planned = compute_gravity_delta(&entries, &self.ads);
        if planned.is_empty() {
            return planned;
        }

        let moves = self.plan_moves(planned);
        for (mv, _) in &moves {
            self.remove(mv.id);
        }
        let mut applied = Vec::with_capacity(moves.len());
        for (mv, moved) in moves {
            self.upsert(moved);
            applied.push(mv);
        }
        tracing::info!(moved = applied.len(), claimed = entries.len(), "rebalanced");
        applied
    }

    /// Resolve planned moves against the grid before anything is touched.
    /// A move survives only if its target is free or being vacated by
    /// another surviving move, and no earlier move claims the same target.
    /// Dropping a move pins its block, which can block others in turn.
    fn plan_moves(&self, planned: Vec<GravityMove>) -> Vec<(GravityMove, Block)> {
        let mut moves: Vec<(GravityMove, Block)> = planned
            .into_iter()
            .filter_map(|mv| {
                let moved = self.blocks.get(&mv.id)?.moved_to(&self.dims, mv.to).ok()?;
                Some((mv, moved))
            })
            .collect();
        loop {
            let leaving: HashSet<BlockId> = moves.iter().map(|(mv, _)| mv.id).collect();
            let mut targets = HashSet::new();
            let before = moves.len();
            moves.retain(|(_, moved)| {
                let free = !self.blocks.contains_key(&moved.id) || leaving.contains(&moved.id);
                free && targets.insert(moved.id)
            });
            if moves.len() == before {
                return moves;
            }
            tracing::warn!(dropped = before - moves.len(), "rebalance target occupied, keeping blocks in place");
        }
    }

    fn recompute_stats(&mut self) {
        let mut stats = StoreStats::default();
        let mut scored = Vec::new();
        for block in self.blocks.values() {
            match block.status() {
                BlockStatus::Claimed => {
                    stats.claimed += 1;
                    stats.total_likes += block.likes();
                    stats.total_dislikes += block.dislikes();
                    scored.push((block.id, block.net_score()));
                }
                BlockStatus::Ad => stats.ads += 1,
                BlockStatus::Empty => {}
            }
        }
        scored.sort_by_key(|&(id, score)| (std::cmp::Reverse(score), id));
        scored.truncate(TOP_LIMIT);
        stats.top = scored;
        self.stats = stats;
    }

    /// Validate a claim locally before it is sent. The backend decides.
    pub fn prepare_claim(&self, pos: GridPos, video_url: &str) -> Result<ClaimIntent, ClaimError> {
        let id = self.dims.grid_to_id(pos).ok_or(ClaimError::OutOfBounds)?;
        if self.ads.is_ad_slot(pos) {
            return Err(ClaimError::AdSlot);
        }
        if self.blocks.contains_key(&id) {
            return Err(ClaimError::Occupied(id));
        }
        let video = VideoRef::parse(video_url)?;
        if let Some(existing) = self.find_video(&video) {
            return Err(ClaimError::Duplicate(existing));
        }
        Ok(ClaimIntent {
            block_id: id,
            video_id: video.video_id,
            platform: video.platform,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilewall_shared::spiral::spiral_coordinate;

    const DIMS: GridDims = GridDims::DEFAULT;

    fn claimed(col: i32, row: i32, video: &str, likes: u64, dislikes: u64) -> BlockRow {
        BlockRow {
            id: DIMS.grid_to_id(GridPos::new(col, row)).unwrap().0,
            x: col,
            y: row,
            video_id: video.to_string(),
            platform: "youtube".to_string(),
            likes,
            dislikes,
            status: "claimed".to_string(),
            ..BlockRow::default()
        }
    }

    fn ad(col: i32, row: i32) -> BlockRow {
        BlockRow {
            id: DIMS.grid_to_id(GridPos::new(col, row)).unwrap().0,
            x: col,
            y: row,
            status: "ad".to_string(),
            ad_image_url: "https://ads.example/creative.png".to_string(),
            ..BlockRow::default()
        }
    }

    fn store() -> BlockStore {
        BlockStore::new(DIMS, 32, 200)
    }

    #[test]
    fn snapshot_populates_index_and_skips_bad_rows() {
        let mut store = store();
        let mut bad = claimed(10, 10, "aaaaaaaaaaa", 0, 0);
        bad.id += 1;
        let rows = vec![claimed(1, 1, "aaaaaaaaaaa", 3, 0), ad(5, 5), bad];
        assert!(store.apply_event(BlockEvent::Snapshot { seq: 1, blocks: rows }, 0.0));
        assert_eq!(store.len(), 2);
        let range = CellRange { col_min: 0, row_min: 0, col_max: 6, row_max: 6 };
        assert_eq!(store.blocks_in(range).count(), 2);
        assert!(store.block_at(GridPos::new(5, 5)).is_some());
        assert!(store.is_rebalance_pending());
    }

    #[test]
    fn update_moves_block_between_cells() {
        let mut store = store();
        let old = claimed(1, 1, "aaaaaaaaaaa", 0, 0);
        store.apply_event(BlockEvent::Insert { seq: 1, block: old.clone() }, 0.0);
        let new = claimed(2, 1, "aaaaaaaaaaa", 1, 0);
        store.apply_event(BlockEvent::Update { seq: 2, old: Some(old), new }, 0.0);
        assert!(store.block_at(GridPos::new(1, 1)).is_none());
        assert_eq!(store.block_at(GridPos::new(2, 1)).unwrap().likes(), 1);
        assert_eq!(store.len(), 1);
        let video = VideoRef::parse("https://youtu.be/aaaaaaaaaaa").unwrap();
        assert_eq!(store.find_video(&video), DIMS.grid_to_id(GridPos::new(2, 1)));
    }

    #[test]
    fn thumbnail_urls_follow_block_lifecycle() {
        let mut store = store();
        let old = claimed(1, 1, "aaaaaaaaaaa", 0, 0);
        store.apply_event(BlockEvent::Insert { seq: 1, block: old.clone() }, 0.0);
        store.apply_event(BlockEvent::Insert { seq: 2, block: ad(5, 5) }, 0.0);
        let at = |pos| DIMS.grid_to_id(pos).unwrap();
        assert_eq!(
            store.thumbnail_url(at(GridPos::new(1, 1))),
            Some("https://img.youtube.com/vi/aaaaaaaaaaa/mqdefault.jpg")
        );
        assert_eq!(
            store.thumbnail_url(at(GridPos::new(5, 5))),
            Some("https://ads.example/creative.png")
        );

        let new = claimed(2, 1, "aaaaaaaaaaa", 4, 0);
        store.apply_event(BlockEvent::Update { seq: 3, old: Some(old), new }, 0.0);
        assert_eq!(store.thumbnail_url(at(GridPos::new(1, 1))), None);
        assert_eq!(
            store.thumbnail_url(at(GridPos::new(2, 1))),
            Some("https://img.youtube.com/vi/aaaaaaaaaaa/mqdefault.jpg")
        );

        store.apply_event(BlockEvent::Snapshot { seq: 4, blocks: Vec::new() }, 0.0);
        assert_eq!(store.thumbnail_url(at(GridPos::new(2, 1))), None);
        assert_eq!(store.thumbnail_url(at(GridPos::new(5, 5))), None);
    }

    #[test]
    fn stale_and_empty_rows() {
        let mut store = store();
        store.apply_event(BlockEvent::Insert { seq: 5, block: claimed(1, 1, "aaaaaaaaaaa", 0, 0) }, 0.0);
        assert!(!store.apply_event(BlockEvent::Insert { seq: 4, block: claimed(2, 2, "bbbbbbbbbbb", 0, 0) }, 0.0));
        let mut vacated = claimed(1, 1, "", 0, 0);
        vacated.status = "empty".to_string();
        vacated.platform.clear();
        assert!(store.apply_event(BlockEvent::Update { seq: 6, old: None, new: vacated }, 0.0));
        assert!(store.is_empty());
    }

    #[test]
    fn rebalance_is_debounced_and_orders_by_score() {
        let mut store = store();
        // Submitted in order 10, 5, 20 on arbitrary cells.
        for (i, (col, likes)) in [(3, 10), (9, 5), (20, 20)].into_iter().enumerate() {
            let video = format!("video{i:06}");
            store.apply_event(BlockEvent::Insert { seq: 0, block: claimed(col, 0, &video, likes, 0) }, 0.0);
        }
        assert!(store.flush_if_due(100.0).is_none());
        assert!(!store.is_rebalance_due(199.0));
        assert!(store.is_rebalance_due(200.0));
        let report = store.flush_if_due(200.0).unwrap();
        assert_eq!(report.moves.len(), 3);
        assert!(!store.is_rebalance_pending());

        for (rank, likes) in [(0, 20), (1, 10), (2, 5)] {
            let pos = spiral_coordinate(store.ads(), rank).unwrap();
            assert_eq!(store.block_at(pos).unwrap().likes(), likes);
        }
        assert_eq!(store.stats().claimed, 3);
        assert_eq!(store.stats().top[0].1, 20);

        // Nothing changed, nothing moves.
        store.schedule_rebalance(300.0);
        assert!(store.flush_if_due(600.0).unwrap().moves.is_empty());
    }

    #[test]
    fn rebalance_skips_materialized_ads() {
        let mut store = store();
        let c = DIMS.center();
        let east = GridPos::new(c.col + 1, c.row);
        store.apply_event(BlockEvent::Insert { seq: 0, block: ad(east.col, east.row) }, 0.0);
        store.apply_event(BlockEvent::Insert { seq: 0, block: claimed(0, 0, "aaaaaaaaaaa", 9, 0) }, 0.0);
        store.apply_event(BlockEvent::Insert { seq: 0, block: claimed(1, 0, "bbbbbbbbbbb", 1, 0) }, 0.0);
        store.flush();
        assert_eq!(store.block_at(c).unwrap().likes(), 9);
        assert_eq!(store.block_at(east).unwrap().status(), BlockStatus::Ad);
        let second = spiral_coordinate(store.ads(), 1).unwrap();
        assert_ne!(second, east);
        assert_eq!(store.block_at(second).unwrap().likes(), 1);
    }

    fn claimed_in(dims: &GridDims, pos: GridPos, video: &str, likes: u64) -> BlockRow {
        BlockRow {
            id: dims.grid_to_id(pos).unwrap().0,
            x: pos.col,
            y: pos.row,
            video_id: video.to_string(),
            platform: "youtube".to_string(),
            likes,
            status: "claimed".to_string(),
            ..BlockRow::default()
        }
    }

    #[test]
    fn rebalancing_a_full_grid_keeps_every_block() {
        let dims = GridDims::new(9, 9);
        let mut store = BlockStore::new(dims, 4, 0);
        let center = dims.center();
        let rows: Vec<_> = (0..dims.cell_count())
            .map(|i| {
                let pos = dims.id_to_grid(BlockId(i)).unwrap();
                let likes = raw_spiral_index(center, pos);
                claimed_in(&dims, pos, &format!("v{i:010}"), likes)
            })
            .collect();
        store.apply_event(BlockEvent::Snapshot { seq: 1, blocks: rows }, 0.0);
        assert_eq!(store.len(), 81);

        let report = store.flush();
        assert!(!report.moves.is_empty());
        assert_eq!(store.len(), 81);
        assert_eq!(store.claimed_count(), 81);
        assert_eq!(store.spatial().len(), 81);
        for i in 0..dims.cell_count() {
            let video = VideoRef::parse(&format!("https://youtu.be/v{i:010}")).unwrap();
            assert!(store.find_video(&video).is_some(), "lost v{i:010}");
        }
    }

    #[test]
    fn growing_rings_push_claimed_blocks_onto_content_cells() {
        let mut store = store();
        let c = DIMS.center();
        let ring_for_one = AdLayout::for_claimed(DIMS, 1).outer_extent();
        let ring_for_four = AdLayout::for_claimed(DIMS, 4).outer_extent();
        assert!(ring_for_four > ring_for_one);
        // A corner of the four-claim ring, outside the one-claim ring.
        let doomed = GridPos::new(c.col + ring_for_four, c.row + ring_for_four);
        store.apply_event(BlockEvent::Insert { seq: 0, block: claimed(doomed.col, doomed.row, "aaaaaaaaaaa", 50, 0) }, 0.0);
        assert!(!store.ads().is_ad_slot(doomed));

        // More claims widen the content radius and the ring moves out.
        for (i, col) in [0, 1, 2].into_iter().enumerate() {
            let video = format!("video{i:06}");
            store.apply_event(BlockEvent::Insert { seq: 0, block: claimed(col, 0, &video, 1, 0) }, 0.0);
        }
        assert!(store.ads().is_ring_slot(doomed));
        assert_eq!(store.block_at(doomed).unwrap().likes(), 50);

        let report = store.flush();
        assert_eq!(report.conflicts, 1);
        assert!(store.block_at(doomed).is_none());
        let top = spiral_coordinate(store.ads(), 0).unwrap();
        assert_eq!(store.block_at(top).unwrap().likes(), 50);
        assert!(store.ads().conflicts(store.claimed_positions()).is_empty());
        assert_eq!(store.claimed_count(), 4);
    }

    #[test]
    fn claims_are_checked_locally() {
        let mut store = store();
        store.apply_event(BlockEvent::Insert { seq: 0, block: claimed(0, 0, "aaaaaaaaaaa", 0, 0) }, 0.0);
        let c = DIMS.center();
        let d = store.ads().outer_extent();
        let corner = GridPos::new(c.col + d, c.row + d);
        let url = "https://www.youtube.com/watch?v=bbbbbbbbbbb";

        assert_eq!(store.prepare_claim(corner, url), Err(ClaimError::AdSlot));
        assert_eq!(store.prepare_claim(GridPos::new(-1, 0), url), Err(ClaimError::OutOfBounds));
        assert!(matches!(store.prepare_claim(GridPos::new(0, 0), url), Err(ClaimError::Occupied(_))));
        assert!(matches!(
            store.prepare_claim(GridPos::new(5, 5), "https://youtu.be/aaaaaaaaaaa"),
            Err(ClaimError::Duplicate(_))
        ));
        assert!(matches!(store.prepare_claim(GridPos::new(5, 5), "https://vimeo.com/1"), Err(ClaimError::Video(_))));
        let intent = store.prepare_claim(GridPos::new(5, 5), url).unwrap();
        assert_eq!(intent.video_id, "bbbbbbbbbbb");
    }
}
