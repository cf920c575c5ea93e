use std::collections::HashMap;

use tilewall_shared::grid::{BlockId, GridDims, GridPos};

/// Bucketed index over placed blocks for range queries.
///
/// Each block sits in exactly one square bucket, chosen by
/// `(col / bucket, row / bucket)`. Queries return every member of the
/// buckets that touch the range, so callers re-check exact bounds.
pub struct SpatialIndex {
    bucket: u32,
    buckets_x: u32,
    buckets_y: u32,
    buckets: Vec<Vec<BlockId>>,
    /// Block -> (bucket index, position inside the bucket).
    slots: HashMap<BlockId, (usize, usize)>,
}

impl SpatialIndex {
    pub fn new(dims: GridDims, bucket: u32) -> Self {
        let bucket = bucket.max(1);
        let buckets_x = dims.cols.div_ceil(bucket).max(1);
        let buckets_y = dims.rows.div_ceil(bucket).max(1);
        Self {
            bucket,
            buckets_x,
            buckets_y,
            buckets: vec![Vec::new(); (buckets_x * buckets_y) as usize],
            slots: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn bucket_of(&self, pos: GridPos) -> Option<usize> {
        if pos.col < 0 || pos.row < 0 {
            return None;
        }
        let bx = pos.col as u32 / self.bucket;
        let by = pos.row as u32 / self.bucket;
        if bx >= self.buckets_x || by >= self.buckets_y {
            return None;
        }
        Some((by * self.buckets_x + bx) as usize)
    }

    /// Add a block at `pos`, moving it if it was already indexed.
    pub fn insert(&mut self, id: BlockId, pos: GridPos) -> bool {
        let Some(bucket) = self.bucket_of(pos) else {
            return false;
        };
        self.remove(id);
        let members = &mut self.buckets[bucket];
        members.push(id);
        self.slots.insert(id, (bucket, members.len() - 1));
        true
    }

    /// Swap-remove from the owning bucket.
    pub fn remove(&mut self, id: BlockId) -> bool {
        let Some((bucket, at)) = self.slots.remove(&id) else {
            return false;
        };
        let members = &mut self.buckets[bucket];
        members.swap_remove(at);
        if let Some(&moved) = members.get(at) {
            self.slots.insert(moved, (bucket, at));
        }
        true
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn clear(&mut self) {
        for members in &mut self.buckets {
            members.clear();
        }
        self.slots.clear();
    }

    pub fn rebuild(&mut self, entries: impl IntoIterator<Item = (BlockId, GridPos)>) {
        self.clear();
        for (id, pos) in entries {
            self.insert(id, pos);
        }
    }

    /// Ids in every bucket intersecting the inclusive cell rectangle.
    pub fn query_range(&self, col_min: i32, row_min: i32, col_max: i32, row_max: i32) -> Vec<BlockId> {
        let mut out = Vec::new();
        self.query_range_into(col_min, row_min, col_max, row_max, &mut out);
        out
    }

    pub fn query_range_into(
        &self,
        col_min: i32,
        row_min: i32,
        col_max: i32,
        row_max: i32,
        out: &mut Vec<BlockId>,
    ) {
        if col_max < 0 || row_max < 0 || col_min > col_max || row_min > row_max {
            return;
        }
        let bx0 = col_min.max(0) as u32 / self.bucket;
        let by0 = row_min.max(0) as u32 / self.bucket;
        let bx1 = (col_max as u32 / self.bucket).min(self.buckets_x - 1);
        let by1 = (row_max as u32 / self.bucket).min(self.buckets_y - 1);
        for by in by0..=by1 {
            for bx in bx0..=bx1 {
                out.extend_from_slice(&self.buckets[(by * self.buckets_x + bx) as usize]);
            }
        }
    }
}
