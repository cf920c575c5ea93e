pub mod ads;
pub mod block;
pub mod events;
pub mod gravity;
pub mod grid;
pub mod spiral;
pub mod video;

pub use ads::AdLayout;
pub use block::{Block, BlockContent, BlockError, BlockRow, BlockStatus};
pub use events::*;
pub use grid::*;
pub use video::{Platform, VideoRef, VideoRefError};
