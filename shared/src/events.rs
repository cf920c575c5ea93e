use serde::{Deserialize, Serialize};

use crate::block::BlockRow;
use crate::grid::BlockId;
use crate::video::Platform;

/// Messages pushed by the backend feed. Rows are validated on apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BlockEvent {
    Snapshot {
        #[serde(default)]
        seq: u64,
        blocks: Vec<BlockRow>,
    },
    Insert {
        #[serde(default)]
        seq: u64,
        block: BlockRow,
    },
    Update {
        #[serde(default)]
        seq: u64,
        old: Option<BlockRow>,
        new: BlockRow,
    },
    Delete {
        #[serde(default)]
        seq: u64,
        block: BlockRow,
    },
}

impl BlockEvent {
    pub fn seq(&self) -> u64 {
        match self {
            BlockEvent::Snapshot { seq, .. }
            | BlockEvent::Insert { seq, .. }
            | BlockEvent::Update { seq, .. }
            | BlockEvent::Delete { seq, .. } => *seq,
        }
    }
}

/// Request to place a video on a cell. The backend accepts or rejects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimIntent {
    pub block_id: BlockId,
    pub video_id: String,
    pub platform: Platform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreDelta {
    Like,
    Unlike,
    Dislike,
    Undislike,
}

impl ScoreDelta {
    /// Change applied to `(likes, dislikes)`.
    pub fn votes(self) -> (i64, i64) {
        match self {
            ScoreDelta::Like => (1, 0),
            ScoreDelta::Unlike => (-1, 0),
            ScoreDelta::Dislike => (0, 1),
            ScoreDelta::Undislike => (0, -1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreIntent {
    pub block_id: BlockId,
    pub delta: ScoreDelta,
}
