//! Spatial hierarchy of one scene container
//!
//! Owns the hierarchy nodes (pooled), the hierarchy node items and the map from
//! scene node to its item list. The tree shape is maintained lazily: adding,
//! removing and refreshing a scene node only touch the item lists, and the
//! kd-tree restructures itself when a node is [touched](Hierarchy::touch),
//! which queries do as they walk the tree.

use std::collections::HashMap;

use crate::config::HierarchyConfig;
use crate::foundation::collections::{HierarchyNodeKey, ItemKey, SceneNodeId, SlotMap};
use crate::foundation::geometry::AABB;

use super::item::HierarchyNodeItem;
use super::node::HierarchyNode;
use super::{HierarchyError, HierarchyKind};

/// Source of the container-space bounds of scene nodes
pub trait BoundsLookup {
    /// Container-space AABB of `node`, `None` if unknown
    fn container_aabb(&self, node: SceneNodeId) -> Option<AABB>;
}

impl BoundsLookup for HashMap<SceneNodeId, AABB> {
    fn container_aabb(&self, node: SceneNodeId) -> Option<AABB> {
        self.get(&node).copied()
    }
}

/// Counters of the structural work a hierarchy has done
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HierarchyStats {
    /// Calls to [`Hierarchy::touch`]
    pub touches: u64,
    /// Kd-tree leaf splits
    pub splits: u64,
    /// Kd-tree subtree merges
    pub merges: u64,
    /// Items moved up the tree by [`Hierarchy::refresh_scene_node`]
    pub refresh_moves: u64,
}

/// Spatial hierarchy
pub struct Hierarchy {
    pub(super) config: HierarchyConfig,
    pub(super) nodes: SlotMap<HierarchyNodeKey, HierarchyNode>,
    pub(super) free_nodes: Vec<HierarchyNodeKey>,
    pub(super) root: HierarchyNodeKey,
    next_node_id: u32,
    pub(super) items: SlotMap<ItemKey, HierarchyNodeItem>,
    pub(super) scene_items: HashMap<SceneNodeId, ItemKey>,
    pub(super) stats: HierarchyStats,
}

impl Hierarchy {
    /// Create a hierarchy whose root covers `bounds`
    pub fn new(config: HierarchyConfig, bounds: AABB) -> Self {
        let mut hierarchy = Self {
            config,
            nodes: SlotMap::with_key(),
            free_nodes: Vec::new(),
            root: HierarchyNodeKey::default(),
            next_node_id: 0,
            items: SlotMap::with_key(),
            scene_items: HashMap::new(),
            stats: HierarchyStats::default(),
        };
        hierarchy.root = hierarchy.get_free_node(None, 0, bounds);
        hierarchy
    }

    /// Reset the root to `bounds`
    ///
    /// Collapses the tree into the root; all items end up attached there. The
    /// root box is grown past `bounds` where registered scene nodes stick out.
    pub fn init(&mut self, bounds: AABB, lookup: &dyn BoundsLookup) {
        let root = self.root;
        self.merge(root);
        if let Some(node) = self.nodes.get_mut(root) {
            node.aabb = bounds;
        }
        let outliers: Vec<AABB> = self
            .scene_items
            .keys()
            .filter_map(|&scene_node| lookup.container_aabb(scene_node))
            .collect();
        for aabb in &outliers {
            self.grow_root(aabb);
        }
    }

    /// Partitioning scheme
    pub fn kind(&self) -> HierarchyKind {
        self.config.kind
    }

    /// Configuration
    pub fn config(&self) -> &HierarchyConfig {
        &self.config
    }

    /// Root node
    pub fn root(&self) -> HierarchyNodeKey {
        self.root
    }

    /// Node by key
    pub fn node(&self, key: HierarchyNodeKey) -> Option<&HierarchyNode> {
        self.nodes.get(key).filter(|node| node.in_use)
    }

    /// Number of nodes currently in the tree
    pub fn num_nodes(&self) -> usize {
        self.nodes.len() - self.free_nodes.len()
    }

    /// Number of pooled nodes waiting for reuse
    pub fn num_free_nodes(&self) -> usize {
        self.free_nodes.len()
    }

    /// Number of live items
    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    /// Structural work counters
    pub fn stats(&self) -> HierarchyStats {
        self.stats
    }

    /// True if `scene_node` has at least one item in this hierarchy
    pub fn contains_scene_node(&self, scene_node: SceneNodeId) -> bool {
        self.scene_items.contains_key(&scene_node)
    }

    /// Scene nodes currently registered
    pub fn scene_nodes(&self) -> impl Iterator<Item = SceneNodeId> + '_ {
        self.scene_items.keys().copied()
    }

    /// Hierarchy nodes `scene_node` is attached to
    pub fn scene_node_locations(&self, scene_node: SceneNodeId) -> Vec<HierarchyNodeKey> {
        self.scene_node_items(scene_node)
            .filter_map(|item| self.items.get(item).and_then(|entry| entry.hierarchy_node))
            .collect()
    }

    /// Scene nodes attached directly to hierarchy node `node`
    pub fn node_scene_nodes(&self, node: HierarchyNodeKey) -> Vec<SceneNodeId> {
        self.node_items(node)
            .filter_map(|(_, item)| item.scene_node)
            .collect()
    }

    /// Register `scene_node`, attaching it to the root
    ///
    /// The root grows to contain the node's bounds so it always contains every
    /// item of the hierarchy.
    pub fn add_scene_node(
        &mut self,
        scene_node: SceneNodeId,
        bounds: &dyn BoundsLookup,
    ) -> Result<(), HierarchyError> {
        if self.contains_scene_node(scene_node) {
            return Err(HierarchyError::AlreadyLinked);
        }
        if let Some(aabb) = bounds.container_aabb(scene_node) {
            self.grow_root(&aabb);
        }

        let item = self.create_item();
        self.link_item(item, scene_node)?;
        self.attach_item(item, self.root)?;
        Ok(())
    }

    /// Unregister `scene_node`, destroying all of its items
    pub fn remove_scene_node(&mut self, scene_node: SceneNodeId) -> Result<(), HierarchyError> {
        let items: Vec<ItemKey> = self.scene_node_items(scene_node).collect();
        if items.is_empty() {
            return Err(HierarchyError::NotLinked);
        }
        for item in items {
            self.destroy_item(item)?;
        }
        Ok(())
    }

    /// Re-home `scene_node` after its bounds changed
    ///
    /// An item whose node still contains the new bounds stays put. Otherwise it
    /// moves up to the nearest ancestor that does, or the root. Moving items
    /// back down is left to the next [`touch`](Self::touch).
    pub fn refresh_scene_node(
        &mut self,
        scene_node: SceneNodeId,
        bounds: &dyn BoundsLookup,
    ) -> Result<(), HierarchyError> {
        let items: Vec<ItemKey> = self.scene_node_items(scene_node).collect();
        if items.is_empty() {
            return Err(HierarchyError::NotLinked);
        }
        let Some(aabb) = bounds.container_aabb(scene_node) else {
            return Ok(());
        };
        self.grow_root(&aabb);

        for item in items {
            let Some(current) = self.items.get(item).and_then(|entry| entry.hierarchy_node) else {
                continue;
            };
            let mut target = current;
            while let Some(node) = self.nodes.get(target) {
                if node.aabb.contains_aabb(&aabb) {
                    break;
                }
                match node.parent {
                    Some(parent) => target = parent,
                    None => break,
                }
            }
            if target != current {
                self.reattach_item(item, target);
                self.stats.refresh_moves += 1;
            }
        }
        Ok(())
    }

    /// Let `node` restructure itself, and its subtree if `recursive`
    ///
    /// A no-op for list hierarchies.
    pub fn touch(&mut self, node: HierarchyNodeKey, recursive: bool, bounds: &dyn BoundsLookup) {
        self.stats.touches += 1;
        match self.config.kind {
            HierarchyKind::List => {}
            HierarchyKind::KdTree => self.touch_kd(node, recursive, bounds),
        }
    }

    /// Take a node from the free list, or allocate a new one
    pub(super) fn get_free_node(
        &mut self,
        parent: Option<HierarchyNodeKey>,
        level: u32,
        aabb: AABB,
    ) -> HierarchyNodeKey {
        if let Some(key) = self.free_nodes.pop() {
            if let Some(node) = self.nodes.get_mut(key) {
                node.init(parent, level, aabb);
                return key;
            }
        }
        let mut node = self.create_node();
        node.init(parent, level, aabb);
        self.nodes.insert(node)
    }

    /// Return an emptied node to the free list
    pub(super) fn free_node(&mut self, key: HierarchyNodeKey) {
        let Some(node) = self.nodes.get_mut(key) else {
            return;
        };
        debug_assert_eq!(node.num_items, 0, "freed hierarchy node still holds items");
        debug_assert!(node.split.is_none(), "freed hierarchy node still has children");
        node.in_use = false;
        node.parent = None;
        node.first_item = None;
        self.free_nodes.push(key);
    }

    fn create_node(&mut self) -> HierarchyNode {
        let id = self.next_node_id;
        self.next_node_id += 1;
        HierarchyNode::new(id)
    }

    fn grow_root(&mut self, aabb: &AABB) {
        if let Some(root) = self.nodes.get_mut(self.root) {
            if !root.aabb.contains_aabb(aabb) {
                root.aabb = root.aabb.combine(aabb);
            }
        }
    }
}
