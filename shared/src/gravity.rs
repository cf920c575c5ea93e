use std::collections::{HashMap, HashSet};

use crate::ads::AdLayout;
use crate::grid::{BlockId, GridPos};
use crate::spiral::batch_spiral_coordinates;

/// One claimed block as seen by the rebalance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebalanceEntry {
    pub id: BlockId,
    pub likes: u64,
    pub dislikes: u64,
    pub current: GridPos,
}

impl RebalanceEntry {
    pub fn net_score(&self) -> i64 {
        self.likes as i64 - self.dislikes as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GravityMove {
    pub id: BlockId,
    pub from: GridPos,
    pub to: GridPos,
}

/// Entry indices by net score, highest first. Ties keep input order.
pub fn rank_order(entries: &[RebalanceEntry]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..entries.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(entries[i].net_score()));
    order
}

/// New position for every entry, keyed by the entry's current id.
///
/// Rank `r` goes to the `r`-th content cell of the spiral. If the grid runs
/// out of cells, entries that sit off the content cells (ring slots, outside
/// the grid) are left out of the map, lowest rank first, and keep their
/// position. They hold no content cell, so the layout stays one entry per
/// cell.
pub fn compute_gravity_layout(
    entries: &[RebalanceEntry],
    ads: &AdLayout,
) -> HashMap<BlockId, GridPos> {
    let order = rank_order(entries);
    let cells = batch_spiral_coordinates(ads, order.len());
    let missing = order.len() - cells.len();

    let dims = ads.dims();
    let on_content = |pos: GridPos| dims.contains(pos) && !ads.is_ad_slot(pos);
    let left_out: HashSet<usize> = order
        .iter()
        .rev()
        .copied()
        .filter(|&i| !on_content(entries[i].current))
        .take(missing)
        .collect();
    if left_out.len() < missing {
        // Only possible when entries already share cells.
        tracing::warn!(
            entries = entries.len(),
            cells = cells.len(),
            "entries overlap on a full grid, leaving the layout as is"
        );
        return HashMap::new();
    }

    order
        .iter()
        .filter(|&&i| !left_out.contains(&i))
        .zip(cells)
        .map(|(&i, pos)| (entries[i].id, pos))
        .collect()
}

/// Only the entries whose position changes, in input order.
pub fn compute_gravity_delta(entries: &[RebalanceEntry], ads: &AdLayout) -> Vec<GravityMove> {
    let layout = compute_gravity_layout(entries, ads);
    entries
        .iter()
        .filter_map(|entry| {
            let to = *layout.get(&entry.id)?;
            (to != entry.current).then_some(GravityMove {
                id: entry.id,
                from: entry.current,
                to,
            })
        })
        .collect()
}
