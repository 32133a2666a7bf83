//! Kd-tree restructuring
//!
//! Split, merge and push-down of kd-tree nodes, driven by [`Hierarchy::touch`].
//! A leaf holding more than `max_items_per_node` items splits at the spatial
//! median of its longest axis; an interior node whose whole subtree holds at
//! most `merge_threshold` items collapses back into a leaf. Items straddling a
//! split plane stay on the interior node.

use crate::foundation::collections::{HierarchyNodeKey, ItemKey};
use crate::foundation::geometry::AABB;

use super::hierarchy::BoundsLookup;
use super::node::{Axis, KdSplit};
use super::Hierarchy;

impl Hierarchy {
    pub(super) fn touch_kd(&mut self, key: HierarchyNodeKey, recursive: bool, bounds: &dyn BoundsLookup) {
        let Some(node) = self.nodes.get(key).filter(|node| node.in_use) else {
            return;
        };

        if node.split.is_some() {
            if self.subtree_items_at_most(key, self.config.merge_threshold()) {
                self.merge(key);
            } else {
                self.push_down(key, bounds);
            }
        }

        let Some(node) = self.nodes.get(key) else {
            return;
        };
        if node.split.is_none()
            && node.num_items > self.config.max_items_per_node
            && node.level < self.config.max_level
        {
            self.split(key, bounds);
        }

        if recursive {
            if let Some(split) = self.nodes.get(key).and_then(|node| node.split) {
                for child in split.children {
                    self.touch(child, true, bounds);
                }
            }
        }
    }

    /// Split leaf `key` at the median of its longest axis
    fn split(&mut self, key: HierarchyNodeKey, bounds: &dyn BoundsLookup) {
        let Some(node) = self.nodes.get(key) else {
            return;
        };
        let aabb = node.aabb;
        let level = node.level;
        let axis = Axis::longest(&aabb.size());
        let value = aabb.center()[axis.index()];

        let mut left_box = aabb;
        left_box.max[axis.index()] = value;
        let mut right_box = aabb;
        right_box.min[axis.index()] = value;

        let left = self.get_free_node(Some(key), level + 1, left_box);
        let right = self.get_free_node(Some(key), level + 1, right_box);
        if let Some(node) = self.nodes.get_mut(key) {
            node.split = Some(KdSplit { axis, value, children: [left, right] });
        }

        let moved = self.push_down(key, bounds);
        self.stats.splits += 1;
        log::trace!(
            "Split hierarchy node at level {} on {:?} = {} ({} items moved down)",
            level,
            axis,
            value,
            moved
        );
    }

    /// Collapse the subtree below `key` into `key`
    pub(super) fn merge(&mut self, key: HierarchyNodeKey) {
        let Some(split) = self.nodes.get_mut(key).and_then(|node| node.split.take()) else {
            return;
        };
        for child in split.children {
            self.merge(child);
            let items: Vec<ItemKey> = self.node_items(child).map(|(item, _)| item).collect();
            for item in items {
                self.reattach_item(item, key);
            }
            self.free_node(child);
        }
        self.stats.merges += 1;
        log::trace!("Merged hierarchy node {:?}", key);
    }

    /// Move the items of interior node `key` into a child that fully contains
    /// them; returns the number of moved items
    fn push_down(&mut self, key: HierarchyNodeKey, bounds: &dyn BoundsLookup) -> usize {
        let Some(split) = self.nodes.get(key).and_then(|node| node.split) else {
            return 0;
        };
        let child_boxes: Vec<(HierarchyNodeKey, AABB)> = split
            .children
            .iter()
            .filter_map(|&child| self.nodes.get(child).map(|node| (child, node.aabb)))
            .collect();

        let candidates: Vec<(ItemKey, AABB)> = self
            .node_items(key)
            .filter_map(|(item, entry)| {
                let aabb = bounds.container_aabb(entry.scene_node?)?;
                Some((item, aabb))
            })
            .collect();

        let mut moved = 0;
        for (item, aabb) in candidates {
            if let Some((child, _)) = child_boxes.iter().find(|(_, child_box)| child_box.contains_aabb(&aabb)) {
                self.reattach_item(item, *child);
                moved += 1;
            }
        }
        moved
    }

    /// True if the subtree below `key` holds at most `limit` items
    fn subtree_items_at_most(&self, key: HierarchyNodeKey, limit: usize) -> bool {
        let mut count = 0;
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            count += node.num_items;
            if count > limit {
                return false;
            }
            if let Some(split) = node.split {
                stack.extend(split.children);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::HierarchyConfig;
    use crate::foundation::collections::{SceneNodeId, SlotMap};
    use crate::foundation::math::Vec3;
    use crate::spatial::hierarchy::tests::{assert_consistent, unit_box};

    struct Fixture {
        ids: SlotMap<SceneNodeId, ()>,
        bounds: HashMap<SceneNodeId, AABB>,
        hierarchy: Hierarchy,
    }

    impl Fixture {
        fn new(max_level: u32, max_items: usize) -> Self {
            Self {
                ids: SlotMap::with_key(),
                bounds: HashMap::new(),
                hierarchy: Hierarchy::new(
                    HierarchyConfig::kd_tree(max_level, max_items),
                    AABB::new(Vec3::new(-16.0, -4.0, -4.0), Vec3::new(16.0, 4.0, 4.0)),
                ),
            }
        }

        fn add(&mut self, aabb: AABB) -> SceneNodeId {
            let id = self.ids.insert(());
            self.bounds.insert(id, aabb);
            self.hierarchy.add_scene_node(id, &self.bounds).unwrap();
            id
        }

        fn touch_all(&mut self) {
            let root = self.hierarchy.root();
            self.hierarchy.touch(root, true, &self.bounds);
        }
    }

    #[test]
    fn test_split_on_longest_axis() {
        let mut fixture = Fixture::new(4, 2);
        fixture.add(unit_box(Vec3::new(-10.0, 0.0, 0.0)));
        fixture.add(unit_box(Vec3::new(-6.0, 0.0, 0.0)));
        fixture.add(unit_box(Vec3::new(10.0, 0.0, 0.0)));

        let root = fixture.hierarchy.root();
        fixture.hierarchy.touch(root, false, &fixture.bounds);

        let split = *fixture.hierarchy.node(root).unwrap().split().unwrap();
        assert_eq!(split.axis, Axis::X);
        assert_eq!(split.value, 0.0);
        assert_eq!(fixture.hierarchy.node(root).unwrap().num_items(), 0);
        assert_eq!(fixture.hierarchy.node(split.children[0]).unwrap().num_items(), 2);
        assert_eq!(fixture.hierarchy.node(split.children[1]).unwrap().num_items(), 1);
        assert_eq!(fixture.hierarchy.stats().splits, 1);
        assert_consistent(&fixture.hierarchy, &fixture.bounds);
    }

    #[test]
    fn test_straddling_item_stays_on_interior_node() {
        let mut fixture = Fixture::new(4, 1);
        let straddler = fixture.add(unit_box(Vec3::new(0.0, 0.0, 0.0)));
        fixture.add(unit_box(Vec3::new(8.0, 0.0, 0.0)));

        fixture.touch_all();

        let root = fixture.hierarchy.root();
        assert_eq!(fixture.hierarchy.scene_node_locations(straddler), vec![root]);
        assert_consistent(&fixture.hierarchy, &fixture.bounds);
    }

    #[test]
    fn test_recursive_touch_respects_max_level() {
        let mut fixture = Fixture::new(2, 1);
        for i in 0..8 {
            fixture.add(unit_box(Vec3::new(-14.0 + i as f32 * 4.0, 0.0, 0.0)));
        }
        fixture.touch_all();

        let max_level = fixture
            .hierarchy
            .nodes
            .values()
            .filter(|node| node.is_in_use())
            .map(|node| node.level())
            .max()
            .unwrap();
        assert_eq!(max_level, 2);
        assert_eq!(fixture.hierarchy.num_nodes(), 7);
        assert_consistent(&fixture.hierarchy, &fixture.bounds);
    }

    #[test]
    fn test_merge_returns_nodes_to_pool_and_ids_are_reused() {
        let mut fixture = Fixture::new(4, 2);
        let ids: Vec<_> = (0..3)
            .map(|i| fixture.add(unit_box(Vec3::new(-12.0 + i as f32 * 12.0, 0.0, 0.0))))
            .collect();
        fixture.touch_all();
        assert_eq!(fixture.hierarchy.num_nodes(), 3);

        let root = fixture.hierarchy.root();
        let children = fixture.hierarchy.node(root).unwrap().split().unwrap().children;
        let child_ids: Vec<u32> = children.iter().map(|&c| fixture.hierarchy.node(c).unwrap().id()).collect();

        for id in &ids[1..] {
            fixture.hierarchy.remove_scene_node(*id).unwrap();
            fixture.bounds.remove(id);
        }
        fixture.touch_all();

        assert!(fixture.hierarchy.node(root).unwrap().is_leaf());
        assert_eq!(fixture.hierarchy.node(root).unwrap().num_items(), 1);
        assert_eq!(fixture.hierarchy.num_free_nodes(), 2);
        assert_eq!(fixture.hierarchy.stats().merges, 1);

        for i in 0..2 {
            fixture.add(unit_box(Vec3::new(6.0 + i as f32 * 4.0, 0.0, 0.0)));
        }
        fixture.touch_all();

        let mut reused: Vec<u32> = fixture
            .hierarchy
            .node(root)
            .unwrap()
            .split()
            .unwrap()
            .children
            .iter()
            .map(|&c| fixture.hierarchy.node(c).unwrap().id())
            .collect();
        let mut expected = child_ids;
        reused.sort();
        expected.sort();
        assert_eq!(reused, expected);
        assert_eq!(fixture.hierarchy.num_free_nodes(), 0);
        assert_consistent(&fixture.hierarchy, &fixture.bounds);
    }

    #[test]
    fn test_refresh_moves_item_up_only_when_needed() {
        let mut fixture = Fixture::new(4, 1);
        let mover = fixture.add(unit_box(Vec3::new(-10.0, 0.0, 0.0)));
        fixture.add(unit_box(Vec3::new(10.0, 0.0, 0.0)));
        fixture.touch_all();

        let start = fixture.hierarchy.scene_node_locations(mover)[0];
        assert_ne!(start, fixture.hierarchy.root());

        fixture.bounds.insert(mover, unit_box(Vec3::new(-9.0, 0.0, 0.0)));
        fixture.hierarchy.refresh_scene_node(mover, &fixture.bounds).unwrap();
        assert_eq!(fixture.hierarchy.scene_node_locations(mover), vec![start]);
        assert_eq!(fixture.hierarchy.stats().refresh_moves, 0);

        fixture.bounds.insert(mover, unit_box(Vec3::new(12.0, 0.0, 0.0)));
        fixture.hierarchy.refresh_scene_node(mover, &fixture.bounds).unwrap();
        assert_eq!(fixture.hierarchy.scene_node_locations(mover), vec![fixture.hierarchy.root()]);
        assert_eq!(fixture.hierarchy.stats().refresh_moves, 1);
        assert_consistent(&fixture.hierarchy, &fixture.bounds);

        fixture.touch_all();
        assert_ne!(fixture.hierarchy.scene_node_locations(mover), vec![fixture.hierarchy.root()]);
        assert_consistent(&fixture.hierarchy, &fixture.bounds);
    }

    #[test]
    fn test_init_collapses_tree() {
        let mut fixture = Fixture::new(4, 1);
        fixture.add(unit_box(Vec3::new(-10.0, 0.0, 0.0)));
        fixture.add(unit_box(Vec3::new(10.0, 0.0, 0.0)));
        fixture.touch_all();
        assert!(fixture.hierarchy.num_nodes() > 1);

        fixture
            .hierarchy
            .init(AABB::new(Vec3::new(-20.0, -20.0, -20.0), Vec3::new(20.0, 20.0, 20.0)), &fixture.bounds);
        let root = fixture.hierarchy.root();
        assert_eq!(fixture.hierarchy.num_nodes(), 1);
        assert_eq!(fixture.hierarchy.node(root).unwrap().num_items(), 2);
        assert_consistent(&fixture.hierarchy, &fixture.bounds);
    }

    #[test]
    fn test_shrinking_init_keeps_items_inside_root() {
        let mut fixture = Fixture::new(4, 1);
        let far = fixture.add(unit_box(Vec3::new(14.0, 0.0, 0.0)));
        fixture.add(unit_box(Vec3::new(-2.0, 0.0, 0.0)));
        fixture.touch_all();

        fixture
            .hierarchy
            .init(AABB::new(Vec3::new(-5.0, -5.0, -5.0), Vec3::new(5.0, 5.0, 5.0)), &fixture.bounds);

        let root = fixture.hierarchy.node(fixture.hierarchy.root()).unwrap();
        assert!(root.aabb().contains_aabb(&fixture.bounds[&far]));
        assert_eq!(root.aabb().min, Vec3::new(-5.0, -5.0, -5.0));
        assert_consistent(&fixture.hierarchy, &fixture.bounds);
    }

    #[test]
    fn test_repeated_touches_do_not_churn() {
        let mut fixture = Fixture::new(8, 2);
        fixture.hierarchy.config.merge_threshold = Some(5);
        for x in [-10.0, -6.0, 10.0] {
            fixture.add(unit_box(Vec3::new(x, 0.0, 0.0)));
        }
        fixture.touch_all();
        let after_first = fixture.hierarchy.stats();
        let nodes = fixture.hierarchy.num_nodes();

        for _ in 0..5 {
            fixture.touch_all();
        }

        let stats = fixture.hierarchy.stats();
        assert_eq!(stats.splits, after_first.splits);
        assert_eq!(stats.merges, after_first.merges);
        assert_eq!(fixture.hierarchy.num_nodes(), nodes);
        assert_consistent(&fixture.hierarchy, &fixture.bounds);
    }

    #[test]
    fn test_refresh_inside_node_does_no_structural_work() {
        let mut fixture = Fixture::new(4, 1);
        let mover = fixture.add(unit_box(Vec3::new(-10.0, 0.0, 0.0)));
        fixture.add(unit_box(Vec3::new(10.0, 0.0, 0.0)));
        fixture.touch_all();
        let before = fixture.hierarchy.stats();
        let nodes = fixture.hierarchy.num_nodes();

        fixture.bounds.insert(mover, unit_box(Vec3::new(-11.0, 1.0, 0.0)));
        fixture.hierarchy.refresh_scene_node(mover, &fixture.bounds).unwrap();

        assert_eq!(fixture.hierarchy.stats(), before);
        assert_eq!(fixture.hierarchy.num_nodes(), nodes);
        assert_consistent(&fixture.hierarchy, &fixture.bounds);
    }
}
