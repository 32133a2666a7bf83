//! Hierarchy nodes
//!
//! One spatial partition inside a [`Hierarchy`](super::Hierarchy). Nodes are
//! pooled by their hierarchy: a node that is merged away goes on the free list
//! and keeps its [`id`](HierarchyNode::id) when it is handed out again, so
//! per-node caches keyed by ID (for instance frame-coherent visibility state)
//! stay addressable. The [`generation`](HierarchyNode::generation) changes on
//! every reuse and tells such caches whether they still look at the same
//! logical node.

use crate::foundation::collections::{HierarchyNodeKey, ItemKey};
use crate::foundation::geometry::{Line, Plane, PlaneSet, PlaneSetClip, PlaneSide, AABB};
use crate::foundation::math::Vec3;

/// Split axis of a kd-tree interior node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// X axis
    X,
    /// Y axis
    Y,
    /// Z axis
    Z,
}

impl Axis {
    /// Component index of the axis
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// Axis along which `extent` is largest
    pub fn longest(extent: &Vec3) -> Self {
        if extent.x >= extent.y && extent.x >= extent.z {
            Axis::X
        } else if extent.y >= extent.z {
            Axis::Y
        } else {
            Axis::Z
        }
    }
}

/// Split of a kd-tree interior node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KdSplit {
    /// Split axis
    pub axis: Axis,
    /// Position of the split plane along the axis
    pub value: f32,
    /// Left (below `value`) and right (above `value`) child
    pub children: [HierarchyNodeKey; 2],
}

/// Single node in a spatial hierarchy
#[derive(Debug, Clone)]
pub struct HierarchyNode {
    pub(super) id: u32,
    pub(super) generation: u32,
    pub(super) in_use: bool,
    pub(super) parent: Option<HierarchyNodeKey>,
    pub(super) level: u32,
    pub(super) aabb: AABB,
    pub(super) num_items: usize,
    pub(super) first_item: Option<ItemKey>,
    pub(super) split: Option<KdSplit>,
}

impl HierarchyNode {
    pub(super) fn new(id: u32) -> Self {
        Self {
            id,
            generation: 0,
            in_use: false,
            parent: None,
            level: 0,
            aabb: AABB::default(),
            num_items: 0,
            first_item: None,
            split: None,
        }
    }

    /// Reset the variable state for a fresh use; ID survives
    pub(super) fn init(&mut self, parent: Option<HierarchyNodeKey>, level: u32, aabb: AABB) {
        self.generation = self.generation.wrapping_add(1);
        self.in_use = true;
        self.parent = parent;
        self.level = level;
        self.aabb = aabb;
        self.num_items = 0;
        self.first_item = None;
        self.split = None;
    }

    /// Unique ID, stable across pool reuse
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Reuse counter
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// False while the node sits on the free list
    pub fn is_in_use(&self) -> bool {
        self.in_use
    }

    /// Parent node, `None` for the root
    pub fn parent(&self) -> Option<HierarchyNodeKey> {
        self.parent
    }

    /// Tree level (0 = root)
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Spatial extent in container space
    pub fn aabb(&self) -> &AABB {
        &self.aabb
    }

    /// Number of items attached directly to this node
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// Split of an interior kd-tree node
    pub fn split(&self) -> Option<&KdSplit> {
        self.split.as_ref()
    }

    /// True when the node has no child nodes
    pub fn is_leaf(&self) -> bool {
        self.split.is_none()
    }

    /// Number of child nodes (0 or 2)
    pub fn num_of_nodes(&self) -> usize {
        if self.split.is_some() { 2 } else { 0 }
    }

    /// Child node `index` (0 = left, 1 = right)
    pub fn node(&self, index: usize) -> Option<HierarchyNodeKey> {
        self.split.and_then(|split| split.children.get(index).copied())
    }

    /// Check whether a segment touches the node box
    pub fn check_line(&self, line: &Line) -> bool {
        self.aabb.intersects_line(line)
    }

    /// Classify the node box against a plane set
    pub fn check_plane_set(&self, plane_set: &PlaneSet) -> PlaneSetClip {
        plane_set.clip_aabb(&self.aabb)
    }

    /// Side of `plane` the node box lies on
    pub fn plane_side(&self, plane: &Plane) -> PlaneSide {
        plane.aabb_side(&self.aabb)
    }

    /// Distance from `point` to the node box (0 inside)
    pub fn shortest_distance(&self, point: Vec3) -> f32 {
        self.aabb.squared_distance_to_point(point).sqrt()
    }
}
