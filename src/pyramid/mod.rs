//! The quad tree of tile nodes and the per-frame resolution pass

pub mod node;
pub mod patch;
pub mod resolve;
pub mod state;

pub use node::{NodeGeometry, NodeId, NodeTable, QuadTileNode, Quadrant};
pub use patch::{CompositingSupport, FrameStats, QuadTilePyramid};
pub use state::ResolutionState;
