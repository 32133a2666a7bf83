//! Hierarchy node items
//!
//! An item is the link between one scene node and one hierarchy node. Each
//! item sits in two intrusive doubly-linked lists at once: the list of all
//! items of its scene node (a scene node may straddle several hierarchy
//! nodes) and the list of all items attached to its hierarchy node. Both
//! lists are threaded through [`ItemKey`] handles so every link and unlink is
//! constant time.

use crate::foundation::collections::{HierarchyNodeKey, ItemKey, SceneNodeId};

use super::{Hierarchy, HierarchyError};

/// Scene node to hierarchy node link
#[derive(Debug, Clone, Default)]
pub struct HierarchyNodeItem {
    pub(super) scene_node: Option<SceneNodeId>,
    pub(super) hierarchy_node: Option<HierarchyNodeKey>,
    pub(super) prev_linked: Option<ItemKey>,
    pub(super) next_linked: Option<ItemKey>,
    pub(super) prev_attached: Option<ItemKey>,
    pub(super) next_attached: Option<ItemKey>,
}

impl HierarchyNodeItem {
    /// Scene node this item is linked to
    pub fn scene_node(&self) -> Option<SceneNodeId> {
        self.scene_node
    }

    /// Hierarchy node this item is attached to
    pub fn hierarchy_node(&self) -> Option<HierarchyNodeKey> {
        self.hierarchy_node
    }
}

impl Hierarchy {
    /// Allocate an unlinked, detached item
    pub fn create_item(&mut self) -> ItemKey {
        self.items.insert(HierarchyNodeItem::default())
    }

    /// Item by key
    pub fn item(&self, item: ItemKey) -> Option<&HierarchyNodeItem> {
        self.items.get(item)
    }

    /// Link `item` to `scene_node`, prepending it to that node's item list
    pub fn link_item(&mut self, item: ItemKey, scene_node: SceneNodeId) -> Result<(), HierarchyError> {
        let entry = self.items.get(item).ok_or(HierarchyError::UnknownItem)?;
        if entry.scene_node.is_some() {
            return Err(HierarchyError::AlreadyLinked);
        }

        let head = self.scene_items.insert(scene_node, item);
        if let Some(head) = head {
            if let Some(head_item) = self.items.get_mut(head) {
                head_item.prev_linked = Some(item);
            }
        }

        let entry = &mut self.items[item];
        entry.scene_node = Some(scene_node);
        entry.prev_linked = None;
        entry.next_linked = head;
        Ok(())
    }

    /// Remove `item` from its scene node's item list
    pub fn unlink_item(&mut self, item: ItemKey) -> Result<(), HierarchyError> {
        let entry = self.items.get_mut(item).ok_or(HierarchyError::UnknownItem)?;
        let scene_node = entry.scene_node.take().ok_or(HierarchyError::NotLinked)?;
        let prev = entry.prev_linked.take();
        let next = entry.next_linked.take();

        match prev {
            Some(prev) => self.items[prev].next_linked = next,
            None => match next {
                Some(next) => {
                    self.scene_items.insert(scene_node, next);
                }
                None => {
                    self.scene_items.remove(&scene_node);
                }
            },
        }
        if let Some(next) = next {
            self.items[next].prev_linked = prev;
        }
        Ok(())
    }

    /// Attach `item` to hierarchy node `node`, prepending it to the node's list
    pub fn attach_item(&mut self, item: ItemKey, node: HierarchyNodeKey) -> Result<(), HierarchyError> {
        let entry = self.items.get(item).ok_or(HierarchyError::UnknownItem)?;
        if entry.hierarchy_node.is_some() {
            return Err(HierarchyError::AlreadyAttached);
        }
        let target = self
            .nodes
            .get_mut(node)
            .filter(|n| n.in_use)
            .ok_or(HierarchyError::UnknownNode)?;

        let head = target.first_item.replace(item);
        target.num_items += 1;
        if let Some(head) = head {
            self.items[head].prev_attached = Some(item);
        }

        let entry = &mut self.items[item];
        entry.hierarchy_node = Some(node);
        entry.prev_attached = None;
        entry.next_attached = head;
        Ok(())
    }

    /// Remove `item` from its hierarchy node's item list
    pub fn detach_item(&mut self, item: ItemKey) -> Result<(), HierarchyError> {
        let entry = self.items.get_mut(item).ok_or(HierarchyError::UnknownItem)?;
        let node = entry.hierarchy_node.take().ok_or(HierarchyError::NotAttached)?;
        let prev = entry.prev_attached.take();
        let next = entry.next_attached.take();

        if let Some(owner) = self.nodes.get_mut(node) {
            owner.num_items = owner.num_items.saturating_sub(1);
            if prev.is_none() {
                owner.first_item = next;
            }
        }
        if let Some(prev) = prev {
            self.items[prev].next_attached = next;
        }
        if let Some(next) = next {
            self.items[next].prev_attached = prev;
        }
        Ok(())
    }

    /// New item linked to the same scene node as `item`
    ///
    /// The clone starts detached; the caller attaches it where it belongs.
    pub fn clone_item(&mut self, item: ItemKey) -> Result<ItemKey, HierarchyError> {
        let scene_node = self.items.get(item).ok_or(HierarchyError::UnknownItem)?.scene_node;

        let clone = self.create_item();
        if let Some(scene_node) = scene_node {
            self.link_item(clone, scene_node)?;
        }
        Ok(clone)
    }

    /// Detach, unlink and free `item`
    pub fn destroy_item(&mut self, item: ItemKey) -> Result<(), HierarchyError> {
        if !self.items.contains_key(item) {
            return Err(HierarchyError::UnknownItem);
        }
        if self.items[item].hierarchy_node.is_some() {
            self.detach_item(item)?;
        }
        if self.items[item].scene_node.is_some() {
            self.unlink_item(item)?;
        }
        self.items.remove(item);
        Ok(())
    }

    /// Move an attached item to another hierarchy node
    pub(super) fn reattach_item(&mut self, item: ItemKey, node: HierarchyNodeKey) {
        let current = self.items.get(item).and_then(|entry| entry.hierarchy_node);
        if current == Some(node) {
            return;
        }
        if current.is_some() {
            if let Err(err) = self.detach_item(item) {
                log::warn!("Failed to detach hierarchy item: {}", err);
            }
        }
        if let Err(err) = self.attach_item(item, node) {
            log::warn!("Failed to attach hierarchy item: {}", err);
        }
    }

    /// Items of `scene_node`, newest first
    pub fn scene_node_items(&self, scene_node: SceneNodeId) -> LinkedItems<'_> {
        LinkedItems {
            hierarchy: self,
            next: self.scene_items.get(&scene_node).copied(),
        }
    }

    /// Items attached to hierarchy node `node`, newest first
    pub fn node_items(&self, node: HierarchyNodeKey) -> AttachedItems<'_> {
        AttachedItems {
            hierarchy: self,
            next: self.nodes.get(node).and_then(|n| n.first_item),
        }
    }
}

/// Iterator over the items linked to one scene node
pub struct LinkedItems<'a> {
    hierarchy: &'a Hierarchy,
    next: Option<ItemKey>,
}

impl Iterator for LinkedItems<'_> {
    type Item = ItemKey;

    fn next(&mut self) -> Option<ItemKey> {
        let current = self.next?;
        self.next = self.hierarchy.items.get(current).and_then(|item| item.next_linked);
        Some(current)
    }
}

/// Iterator over the items attached to one hierarchy node
pub struct AttachedItems<'a> {
    hierarchy: &'a Hierarchy,
    next: Option<ItemKey>,
}

impl<'a> Iterator for AttachedItems<'a> {
    type Item = (ItemKey, &'a HierarchyNodeItem);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        let item = self.hierarchy.items.get(current)?;
        self.next = item.next_attached;
        Some((current, item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HierarchyConfig;
    use crate::foundation::geometry::AABB;
    use crate::foundation::math::Vec3;
    use slotmap::SlotMap;

    fn setup() -> (Hierarchy, SlotMap<SceneNodeId, ()>) {
        let bounds = AABB::new(Vec3::new(-10.0, -10.0, -10.0), Vec3::new(10.0, 10.0, 10.0));
        (Hierarchy::new(HierarchyConfig::default(), bounds), SlotMap::with_key())
    }

    #[test]
    fn test_link_and_unlink_middle_item() {
        let (mut hierarchy, mut ids) = setup();
        let scene_node = ids.insert(());

        let items: Vec<_> = (0..3).map(|_| hierarchy.create_item()).collect();
        for &item in &items {
            hierarchy.link_item(item, scene_node).unwrap();
        }
        assert_eq!(hierarchy.scene_node_items(scene_node).collect::<Vec<_>>(), vec![items[2], items[1], items[0]]);

        hierarchy.unlink_item(items[1]).unwrap();
        assert_eq!(hierarchy.scene_node_items(scene_node).collect::<Vec<_>>(), vec![items[2], items[0]]);

        hierarchy.unlink_item(items[2]).unwrap();
        hierarchy.unlink_item(items[0]).unwrap();
        assert_eq!(hierarchy.scene_node_items(scene_node).count(), 0);
        assert_eq!(hierarchy.unlink_item(items[0]), Err(HierarchyError::NotLinked));
    }

    #[test]
    fn test_double_link_and_attach_rejected() {
        let (mut hierarchy, mut ids) = setup();
        let scene_node = ids.insert(());
        let root = hierarchy.root();

        let item = hierarchy.create_item();
        hierarchy.link_item(item, scene_node).unwrap();
        hierarchy.attach_item(item, root).unwrap();

        assert_eq!(hierarchy.link_item(item, scene_node), Err(HierarchyError::AlreadyLinked));
        assert_eq!(hierarchy.attach_item(item, root), Err(HierarchyError::AlreadyAttached));
        assert_eq!(hierarchy.node(root).unwrap().num_items(), 1);
    }

    #[test]
    fn test_detach_keeps_count_consistent() {
        let (mut hierarchy, mut ids) = setup();
        let root = hierarchy.root();

        let items: Vec<_> = (0..4)
            .map(|_| {
                let item = hierarchy.create_item();
                hierarchy.link_item(item, ids.insert(())).unwrap();
                hierarchy.attach_item(item, root).unwrap();
                item
            })
            .collect();

        hierarchy.detach_item(items[3]).unwrap();
        hierarchy.detach_item(items[0]).unwrap();

        let attached: Vec<_> = hierarchy.node_items(root).map(|(key, _)| key).collect();
        assert_eq!(attached, vec![items[2], items[1]]);
        assert_eq!(hierarchy.node(root).unwrap().num_items(), 2);
    }

    #[test]
    fn test_clone_and_destroy() {
        let (mut hierarchy, mut ids) = setup();
        let scene_node = ids.insert(());
        let root = hierarchy.root();

        let item = hierarchy.create_item();
        hierarchy.link_item(item, scene_node).unwrap();
        hierarchy.attach_item(item, root).unwrap();

        let clone = hierarchy.clone_item(item).unwrap();
        assert_eq!(hierarchy.item(clone).unwrap().scene_node(), Some(scene_node));
        assert_eq!(hierarchy.item(clone).unwrap().hierarchy_node(), None);
        assert_eq!(hierarchy.node(root).unwrap().num_items(), 1);

        hierarchy.attach_item(clone, root).unwrap();
        assert_eq!(hierarchy.item(clone).unwrap().hierarchy_node(), Some(root));
        assert_eq!(hierarchy.node(root).unwrap().num_items(), 2);

        hierarchy.destroy_item(item).unwrap();
        assert!(hierarchy.item(item).is_none());
        assert_eq!(hierarchy.scene_node_items(scene_node).collect::<Vec<_>>(), vec![clone]);
        assert_eq!(hierarchy.node(root).unwrap().num_items(), 1);
    }
}
