use std::collections::HashSet;

use crate::grid::{GridDims, GridPos};

/// Claimed blocks per additional ring.
pub const CLAIMS_PER_RING: usize = 1000;
pub const MAX_RINGS: usize = 48;
/// Distance of the innermost ring from the center.
pub const INNER_RING_RADIUS: i32 = 4;
const BASE_EDGE_SPACING: i32 = 3;

/// Derived ring geometry. Two claimed counts with equal geometry produce the
/// same slot set, so callers compare these before rebuilding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingGeometry {
    pub rings: usize,
    pub content_radius: i32,
}

impl RingGeometry {
    pub fn for_claimed(claimed_count: usize) -> Self {
        let rings = (claimed_count / CLAIMS_PER_RING).clamp(1, MAX_RINGS);
        let content_radius = (claimed_count as f64 / std::f64::consts::PI).sqrt().ceil() as i32;
        Self {
            rings,
            content_radius,
        }
    }

    /// Ring distances spread evenly from the inner radius out to
    /// `inner + content_radius`. A lone ring sits at the outer edge.
    /// Ascending, no duplicates.
    pub fn distances(&self, max_distance: i32) -> Vec<i32> {
        let outer = (INNER_RING_RADIUS + self.content_radius).min(max_distance);
        if outer < INNER_RING_RADIUS {
            return Vec::new();
        }
        let span = (outer - INNER_RING_RADIUS) as f64;
        let mut distances: Vec<i32> = if self.rings == 1 {
            vec![outer]
        } else {
            (0..self.rings)
                .map(|k| {
                    let t = k as f64 / (self.rings - 1) as f64;
                    INNER_RING_RADIUS + (span * t).round() as i32
                })
                .collect()
        };
        distances.dedup();
        distances
    }
}

pub fn edge_spacing(distance: i32) -> i32 {
    BASE_EDGE_SPACING + distance / 16
}

/// Cells reserved for ads: concentric square rings around the grid center.
#[derive(Debug, Clone)]
pub struct AdLayout {
    dims: GridDims,
    geometry: Option<RingGeometry>,
    distances: Vec<i32>,
    slots: HashSet<GridPos>,
    /// Cells held by materialized ad blocks, kept across rebuilds.
    reserved: HashSet<GridPos>,
}

impl AdLayout {
    /// A layout with no reserved cells.
    pub fn empty(dims: GridDims) -> Self {
        Self {
            dims,
            geometry: None,
            distances: Vec::new(),
            slots: HashSet::new(),
            reserved: HashSet::new(),
        }
    }

    pub fn for_claimed(dims: GridDims, claimed_count: usize) -> Self {
        let mut layout = Self::empty(dims);
        layout.rebuild(claimed_count);
        layout
    }

    /// Replace the slot set for a new claimed count. Returns `false` when the
    /// derived geometry is unchanged and the set was kept as is.
    pub fn rebuild(&mut self, claimed_count: usize) -> bool {
        let geometry = RingGeometry::for_claimed(claimed_count);
        if self.geometry == Some(geometry) {
            return false;
        }

        let center = self.dims.center();
        let distances = geometry.distances(self.dims.max_ring_distance());
        let mut slots = HashSet::new();
        for &d in &distances {
            self.add_ring(&mut slots, center, d);
        }

        tracing::debug!(
            claimed_count,
            rings = distances.len(),
            slots = slots.len(),
            "rebuilt ad layout"
        );
        self.geometry = Some(geometry);
        self.distances = distances;
        self.slots = slots;
        true
    }

    fn add_ring(&self, slots: &mut HashSet<GridPos>, center: GridPos, d: i32) {
        let mut push = |col: i32, row: i32| {
            let pos = GridPos::new(col, row);
            if self.dims.contains(pos) {
                slots.insert(pos);
            }
        };

        push(center.col - d, center.row - d);
        push(center.col + d, center.row - d);
        push(center.col - d, center.row + d);
        push(center.col + d, center.row + d);

        let spacing = edge_spacing(d);
        let mut offset = -d + spacing;
        while offset <= d - spacing {
            push(center.col + offset, center.row - d);
            push(center.col + offset, center.row + d);
            push(center.col - d, center.row + offset);
            push(center.col + d, center.row + offset);
            offset += spacing;
        }
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    pub fn geometry(&self) -> Option<RingGeometry> {
        self.geometry
    }

    /// Replace the cells held by ad blocks that already exist. They are
    /// skipped by the spiral like ring slots.
    pub fn set_reserved(&mut self, cells: impl IntoIterator<Item = GridPos>) {
        self.reserved = cells.into_iter().filter(|p| self.dims.contains(*p)).collect();
    }

    pub fn is_ring_slot(&self, pos: GridPos) -> bool {
        self.slots.contains(&pos)
    }

    pub fn is_ad_slot(&self, pos: GridPos) -> bool {
        self.slots.contains(&pos) || self.reserved.contains(&pos)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> impl Iterator<Item = GridPos> + '_ {
        self.slots.iter().copied()
    }

    pub fn ring_distances(&self) -> &[i32] {
        &self.distances
    }

    /// Chebyshev distance of the outermost ring, 0 when there are none.
    pub fn outer_extent(&self) -> i32 {
        self.distances.last().copied().unwrap_or(0)
    }

    /// Positions in `occupied` that now fall on a ring slot.
    pub fn conflicts(&self, occupied: impl IntoIterator<Item = GridPos>) -> Vec<GridPos> {
        occupied
            .into_iter()
            .filter(|pos| self.is_ring_slot(*pos))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebuild_is_idempotent() {
        let dims = GridDims::DEFAULT;
        let a = AdLayout::for_claimed(dims, 12_345);
        let mut b = AdLayout::for_claimed(dims, 12_345);
        assert_eq!(a.slots, b.slots);
        assert!(!b.rebuild(12_345));
        assert_eq!(a.slots, b.slots);
    }

    #[test]
    fn outer_extent_never_shrinks_with_more_content() {
        let dims = GridDims::DEFAULT;
        let mut previous = 0;
        for claimed in [0, 1, 10, 500, 999, 1000, 5_000, 40_000, 250_000, 1_000_000] {
            let extent = AdLayout::for_claimed(dims, claimed).outer_extent();
            assert!(extent >= previous, "{claimed} claimed: {extent} < {previous}");
            previous = extent;
        }
    }

    #[test]
    fn smallest_layout_is_a_single_inner_ring() {
        let dims = GridDims::DEFAULT;
        let layout = AdLayout::for_claimed(dims, 0);
        assert_eq!(layout.ring_distances(), &[INNER_RING_RADIUS]);
        let c = dims.center();
        assert!(layout.is_ad_slot(GridPos::new(c.col - 4, c.row - 4)));
        assert!(layout.is_ad_slot(GridPos::new(c.col + 4, c.row + 4)));
        assert!(layout.is_ad_slot(GridPos::new(c.col - 1, c.row - 4)));
        assert!(layout.is_ad_slot(GridPos::new(c.col + 4, c.row - 1)));
        assert!(!layout.is_ad_slot(GridPos::new(c.col + 2, c.row - 4)));
        assert!(!layout.is_ad_slot(c));
        // 4 corners + 1 point on each edge
        assert_eq!(layout.len(), 8);
    }

    #[test]
    fn ring_count_grows_per_thousand_claims() {
        assert_eq!(RingGeometry::for_claimed(0).rings, 1);
        assert_eq!(RingGeometry::for_claimed(2_999).rings, 2);
        assert_eq!(RingGeometry::for_claimed(10_000_000).rings, MAX_RINGS);
        assert_eq!(RingGeometry::for_claimed(10_000).content_radius, 57);
    }

    #[test]
    fn slots_stay_inside_small_grids() {
        let dims = GridDims::new(9, 9);
        let layout = AdLayout::for_claimed(dims, 5_000);
        assert!(layout.outer_extent() <= 4);
        assert!(layout.slots().all(|p| dims.contains(p)));
    }

    #[test]
    fn conflicts_report_occupied_ad_cells() {
        let dims = GridDims::DEFAULT;
        let layout = AdLayout::for_claimed(dims, 0);
        let c = dims.center();
        let corner = GridPos::new(c.col + 4, c.row - 4);
        let conflicts = layout.conflicts([c, corner, GridPos::new(0, 0)]);
        assert_eq!(conflicts, vec![corner]);
    }

    #[test]
    fn reserved_cells_survive_rebuilds() {
        let dims = GridDims::DEFAULT;
        let mut layout = AdLayout::for_claimed(dims, 0);
        let held = GridPos::new(3, 3);
        layout.set_reserved([held, GridPos::new(-1, 0)]);
        assert!(layout.is_ad_slot(held));
        assert!(!layout.is_ring_slot(held));
        assert!(layout.rebuild(50_000));
        assert!(layout.is_ad_slot(held));
        assert!(layout.conflicts([held]).is_empty());
    }
}
