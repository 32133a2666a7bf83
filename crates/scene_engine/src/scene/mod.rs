//! Scene graph
//!
//! Containers, cells and cell portals arranged in a tree below the `Root`
//! container. Every container owns a spatial [`Hierarchy`](crate::spatial::Hierarchy)
//! over its direct children which the queries in [`crate::query`] walk.
//!
//! ## Architecture
//!
//! ```text
//! Scene (arena of SceneNode)
//!   ├─ Root container ── Hierarchy ── HierarchyNode ── items ─┐
//!   │    ├─ Cell A ───── Hierarchy                            │
//!   │    │    └─ CellPortal ──warp──> Cell B                  │
//!   │    └─ Cell B ───── Hierarchy                            │
//!   └─ SceneNodeId handles <──────────────────────────────────┘
//! ```

mod graph;
mod node;
mod portal;

use crate::spatial::HierarchyError;

pub use graph::{Scene, PARENT_KEYWORD, ROOT_KEYWORD, THIS_KEYWORD};
pub use node::{
    CellPortal, ContainerData, SceneNode, SceneNodeFlags, SceneNodeKind, CELL_CLASS, CELL_PORTAL_CLASS,
    CONTAINER_CLASS, NODE_CLASS,
};

/// Scene graph errors
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    /// Stale or foreign node handle
    #[error("unknown scene node")]
    UnknownNode,

    /// Operation needs a container
    #[error("scene node is not a container")]
    NotAContainer,

    /// Operation needs a cell portal
    #[error("scene node is not a cell portal")]
    NotACellPortal,

    /// The root container cannot be removed or moved
    #[error("the root container cannot be removed or moved")]
    RootRemoval,

    /// Moving a container below itself
    #[error("a container cannot be moved into itself or its descendants")]
    CycleDetected,

    /// Name contains a path separator or is a path keyword
    #[error("invalid scene node name: '{0}'")]
    InvalidName(String),

    /// Hierarchy bookkeeping failed
    #[error("hierarchy error: {0}")]
    Hierarchy(#[from] HierarchyError),
}
