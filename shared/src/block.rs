use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::{BlockId, GridDims, GridPos};
use crate::video::{Platform, VideoRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockStatus {
    Empty,
    Claimed,
    Ad,
}

impl BlockStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "empty" => Some(BlockStatus::Empty),
            "claimed" => Some(BlockStatus::Claimed),
            "ad" => Some(BlockStatus::Ad),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub identity: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimedContent {
    pub video: VideoRef,
    #[serde(default)]
    pub owner: Option<Owner>,
    pub likes: u64,
    pub dislikes: u64,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AdContent {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub link_url: Option<String>,
}

/// What a cell holds. Status and content cannot disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BlockContent {
    Empty,
    Claimed(ClaimedContent),
    Ad(AdContent),
}

/// A validated grid cell. `id` always equals `dims.grid_to_id(pos)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub pos: GridPos,
    pub content: BlockContent,
}

impl Block {
    pub fn new(dims: &GridDims, pos: GridPos, content: BlockContent) -> Result<Self, BlockError> {
        let id = dims
            .grid_to_id(pos)
            .ok_or(BlockError::OutOfBounds { col: pos.col, row: pos.row })?;
        Ok(Self { id, pos, content })
    }

    pub fn status(&self) -> BlockStatus {
        match self.content {
            BlockContent::Empty => BlockStatus::Empty,
            BlockContent::Claimed(_) => BlockStatus::Claimed,
            BlockContent::Ad(_) => BlockStatus::Ad,
        }
    }

    pub fn claimed(&self) -> Option<&ClaimedContent> {
        match &self.content {
            BlockContent::Claimed(claimed) => Some(claimed),
            _ => None,
        }
    }

    pub fn video(&self) -> Option<&VideoRef> {
        self.claimed().map(|c| &c.video)
    }

    pub fn likes(&self) -> u64 {
        self.claimed().map_or(0, |c| c.likes)
    }

    pub fn dislikes(&self) -> u64 {
        self.claimed().map_or(0, |c| c.dislikes)
    }

    /// Likes minus dislikes. Zero for anything that is not claimed.
    pub fn net_score(&self) -> i64 {
        self.likes() as i64 - self.dislikes() as i64
    }

    /// Image drawn on the tile: the video thumbnail, or the ad creative.
    pub fn thumbnail_url(&self) -> Option<String> {
        match &self.content {
            BlockContent::Empty => None,
            BlockContent::Claimed(c) => c.video.thumbnail_url(),
            BlockContent::Ad(ad) => ad.image_url.clone(),
        }
    }

    /// Same content at another cell. The id follows the position.
    pub fn moved_to(&self, dims: &GridDims, pos: GridPos) -> Result<Block, BlockError> {
        Block::new(dims, pos, self.content.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("cell ({col}, {row}) is outside the grid")]
    OutOfBounds { col: i32, row: i32 },
    #[error("block id {id} does not match cell ({col}, {row})")]
    IdMismatch { id: u32, col: i32, row: i32 },
    #[error("unknown block status {0:?}")]
    UnknownStatus(String),
    #[error("unknown platform {0:?}")]
    UnknownPlatform(String),
    #[error("claimed block {0} has no video")]
    MissingVideo(u32),
    #[error("{status} block {id} carries {field}")]
    UnexpectedContent {
        id: u32,
        status: &'static str,
        field: &'static str,
    },
}

/// Row shape as the backend sends it: flat, with empty strings and zeroes
/// standing in for absent values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockRow {
    pub id: u32,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub video_id: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub owner_identity: String,
    #[serde(default)]
    pub owner_name: String,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub dislikes: u64,
    pub status: String,
    #[serde(default)]
    pub ad_image_url: String,
    #[serde(default)]
    pub ad_link_url: String,
    /// Microseconds since the Unix epoch; zero when unset.
    #[serde(default)]
    pub claimed_at: u64,
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == value.len() {
        Some(value)
    } else {
        Some(trimmed.to_string())
    }
}

impl BlockRow {
    /// Validate against explicit grid dimensions.
    pub fn into_block(self, dims: &GridDims) -> Result<Block, BlockError> {
        let pos = GridPos::new(self.x, self.y);
        let expected = dims.grid_to_id(pos).ok_or(BlockError::OutOfBounds {
            col: self.x,
            row: self.y,
        })?;
        if expected.0 != self.id {
            return Err(BlockError::IdMismatch {
                id: self.id,
                col: self.x,
                row: self.y,
            });
        }
        let status =
            BlockStatus::parse(&self.status).ok_or_else(|| BlockError::UnknownStatus(self.status.clone()))?;
        let id = self.id;

        let content = match status {
            BlockStatus::Empty => {
                if !self.video_id.is_empty() {
                    return Err(BlockError::UnexpectedContent { id, status: "empty", field: "a video" });
                }
                if self.likes > 0 || self.dislikes > 0 {
                    return Err(BlockError::UnexpectedContent { id, status: "empty", field: "votes" });
                }
                BlockContent::Empty
            }
            BlockStatus::Ad => {
                if !self.video_id.is_empty() {
                    return Err(BlockError::UnexpectedContent { id, status: "ad", field: "a video" });
                }
                if self.likes > 0 || self.dislikes > 0 {
                    return Err(BlockError::UnexpectedContent { id, status: "ad", field: "votes" });
                }
                BlockContent::Ad(AdContent {
                    image_url: non_empty(self.ad_image_url),
                    link_url: non_empty(self.ad_link_url),
                })
            }
            BlockStatus::Claimed => {
                let video_id = non_empty(self.video_id).ok_or(BlockError::MissingVideo(id))?;
                let platform = Platform::parse(&self.platform)
                    .ok_or_else(|| BlockError::UnknownPlatform(self.platform.clone()))?;
                let owner = non_empty(self.owner_identity).map(|identity| Owner {
                    identity,
                    name: non_empty(self.owner_name),
                });
                let claimed_at = if self.claimed_at == 0 {
                    None
                } else {
                    DateTime::from_timestamp_micros(self.claimed_at as i64)
                };
                BlockContent::Claimed(ClaimedContent {
                    video: VideoRef::new(platform, video_id),
                    owner,
                    likes: self.likes,
                    dislikes: self.dislikes,
                    claimed_at,
                })
            }
        };
        Ok(Block { id: expected, pos, content })
    }
}

impl TryFrom<BlockRow> for Block {
    type Error = BlockError;

    fn try_from(row: BlockRow) -> Result<Self, Self::Error> {
        row.into_block(&GridDims::DEFAULT)
    }
}

impl From<&Block> for BlockRow {
    fn from(block: &Block) -> Self {
        let mut row = BlockRow {
            id: block.id.0,
            x: block.pos.col,
            y: block.pos.row,
            ..BlockRow::default()
        };
        match &block.content {
            BlockContent::Empty => row.status = "empty".into(),
            BlockContent::Ad(ad) => {
                row.status = "ad".into();
                row.ad_image_url = ad.image_url.clone().unwrap_or_default();
                row.ad_link_url = ad.link_url.clone().unwrap_or_default();
            }
            BlockContent::Claimed(c) => {
                row.status = "claimed".into();
                row.video_id = c.video.video_id.clone();
                row.platform = c.video.platform.as_str().into();
                if let Some(owner) = &c.owner {
                    row.owner_identity = owner.identity.clone();
                    row.owner_name = owner.name.clone().unwrap_or_default();
                }
                row.likes = c.likes;
                row.dislikes = c.dislikes;
                row.claimed_at = c
                    .claimed_at
                    .map_or(0, |t| t.timestamp_micros().max(0) as u64);
            }
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claimed_row(col: i32, row: i32) -> BlockRow {
        BlockRow {
            id: (row as u32) * 1250 + col as u32,
            x: col,
            y: row,
            video_id: "dQw4w9WgXcQ".into(),
            platform: "youtube".into(),
            owner_identity: "c200abc".into(),
            owner_name: "  ".into(),
            likes: 7,
            dislikes: 9,
            status: "claimed".into(),
            claimed_at: 1_700_000_000_000_000,
            ..BlockRow::default()
        }
    }

    #[test]
    fn claimed_row_becomes_strict_block() {
        let block = Block::try_from(claimed_row(625, 400)).unwrap();
        assert_eq!(block.id, BlockId(500_625));
        assert_eq!(block.status(), BlockStatus::Claimed);
        assert_eq!(block.net_score(), -2);
        let claimed = block.claimed().unwrap();
        assert_eq!(claimed.owner.as_ref().unwrap().name, None);
        assert_eq!(claimed.claimed_at.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(
            block.thumbnail_url().as_deref(),
            Some("https://img.youtube.com/vi/dQw4w9WgXcQ/mqdefault.jpg")
        );
    }

    #[test]
    fn id_must_match_position() {
        let mut row = claimed_row(3, 4);
        row.id += 1;
        assert!(matches!(
            Block::try_from(row),
            Err(BlockError::IdMismatch { .. })
        ));

        let mut row = claimed_row(3, 4);
        row.x = 1250;
        assert!(matches!(
            Block::try_from(row),
            Err(BlockError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn inconsistent_status_and_content_is_rejected() {
        let mut row = claimed_row(0, 0);
        row.status = "ad".into();
        assert!(matches!(
            Block::try_from(row),
            Err(BlockError::UnexpectedContent { status: "ad", .. })
        ));

        let mut row = claimed_row(0, 0);
        row.video_id.clear();
        assert_eq!(Block::try_from(row), Err(BlockError::MissingVideo(0)));

        let mut row = claimed_row(0, 0);
        row.status = "reserved".into();
        assert!(matches!(Block::try_from(row), Err(BlockError::UnknownStatus(_))));
    }

    #[test]
    fn ad_row_keeps_creative_urls() {
        let row = BlockRow {
            id: 2,
            x: 2,
            y: 0,
            status: "ad".into(),
            ad_image_url: "https://ads.example/a.png".into(),
            ..BlockRow::default()
        };
        let block = Block::try_from(row).unwrap();
        assert_eq!(block.status(), BlockStatus::Ad);
        assert_eq!(block.net_score(), 0);
        assert_eq!(block.thumbnail_url().as_deref(), Some("https://ads.example/a.png"));
    }

    #[test]
    fn moving_a_block_recomputes_its_id() {
        let dims = GridDims::new(10, 10);
        let block = claimed_row(1, 1).into_block(&GridDims::DEFAULT).unwrap();
        let moved = block.moved_to(&dims, GridPos::new(4, 2)).unwrap();
        assert_eq!(moved.id, BlockId(24));
        assert_eq!(moved.content, block.content);
        assert!(block.moved_to(&dims, GridPos::new(10, 0)).is_err());
    }

    #[test]
    fn strict_block_converts_back_to_a_row() {
        let original = claimed_row(10, 20);
        let block = Block::try_from(original.clone()).unwrap();
        let row = BlockRow::from(&block);
        assert_eq!(row.id, original.id);
        assert_eq!(row.claimed_at, original.claimed_at);
        assert_eq!(row.owner_name, "");
        assert_eq!(Block::try_from(row).unwrap(), block);
    }
}
