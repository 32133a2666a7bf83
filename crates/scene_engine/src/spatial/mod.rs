//! Spatial hierarchies
//!
//! Every scene container owns one [`Hierarchy`] that partitions the space of
//! its direct children. Two partitioning schemes exist: a flat list (a single
//! root node holding everything) and a kd-tree that splits and merges lazily
//! as it is touched by queries.

mod hierarchy;
mod item;
mod kd_tree;
mod node;

use serde::{Deserialize, Serialize};

pub use hierarchy::{BoundsLookup, Hierarchy, HierarchyStats};
pub use item::{AttachedItems, HierarchyNodeItem, LinkedItems};
pub use node::{Axis, HierarchyNode, KdSplit};

/// Partitioning scheme of a hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HierarchyKind {
    /// Single node holding every item
    List,
    /// Binary space partition with axis aligned split planes
    KdTree,
}

/// Hierarchy item and node errors
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyError {
    /// Item is already linked to a scene node
    #[error("hierarchy item is already linked to a scene node")]
    AlreadyLinked,

    /// Item or scene node is not linked
    #[error("hierarchy item is not linked to a scene node")]
    NotLinked,

    /// Item is already attached to a hierarchy node
    #[error("hierarchy item is already attached to a hierarchy node")]
    AlreadyAttached,

    /// Item is not attached to a hierarchy node
    #[error("hierarchy item is not attached to a hierarchy node")]
    NotAttached,

    /// Stale or foreign item key
    #[error("unknown hierarchy item")]
    UnknownItem,

    /// Stale, pooled or foreign node key
    #[error("unknown hierarchy node")]
    UnknownNode,
}
