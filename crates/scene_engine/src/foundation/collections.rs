//! Handle types for the arenas the scene is built from
//!
//! Every cross reference between scene nodes, hierarchy nodes, hierarchy node
//! items and queries is a generational [`slotmap`] key rather than a pointer.
//! A stale key simply fails to resolve.

pub use slotmap::{SecondaryMap, SlotMap};

slotmap::new_key_type! {
    /// Handle of a scene node (plain node, container, cell or portal)
    pub struct SceneNodeId;

    /// Handle of a node inside one spatial hierarchy
    pub struct HierarchyNodeKey;

    /// Handle of a hierarchy node item (scene node to hierarchy node link)
    pub struct ItemKey;

    /// Handle of a query owned by a container's query manager
    pub struct QueryId;
}
