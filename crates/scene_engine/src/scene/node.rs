//! Scene nodes
//!
//! A scene node is a plain node, a container (optionally acting as a cell) or
//! a cell portal. Every node stores its transform relative to the container it
//! lives in, the cached matrices derived from it and its bounding box in both
//! local and container space.

use std::collections::HashMap;

use crate::config::HierarchyConfig;
use crate::foundation::collections::SceneNodeId;
use crate::foundation::geometry::{Polygon, AABB};
use crate::foundation::math::{Mat4, Transform};

bitflags::bitflags! {
    /// Scene node flags
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct SceneNodeFlags: u32 {
        /// Node is switched off; culling skips it and portals stop working
        const INACTIVE        = 1 << 0;
        /// Node is never reported as visible
        const INVISIBLE       = 1 << 1;
        /// Visible without a frustum test
        const NO_CULLING      = 1 << 2;
        /// Queries do not descend into this container
        const NO_RECURSION    = 1 << 3;
        /// Queries and movement do not pass through this portal
        const NO_PASS_THROUGH = 1 << 4;
    }
}

/// Default class name of plain nodes
pub const NODE_CLASS: &str = "SceneNode";
/// Class name of containers
pub const CONTAINER_CLASS: &str = "SceneContainer";
/// Class name of cells
pub const CELL_CLASS: &str = "SceneCell";
/// Class name of cell portals
pub const CELL_PORTAL_CLASS: &str = "CellPortal";

/// Container state
#[derive(Debug, Clone)]
pub struct ContainerData {
    pub(crate) children: Vec<SceneNodeId>,
    pub(crate) names: HashMap<String, SceneNodeId>,
    pub(crate) is_cell: bool,
    pub(crate) hierarchy_config: Option<HierarchyConfig>,
    pub(crate) bounds: Option<AABB>,
    pub(crate) pending_refresh: Vec<SceneNodeId>,
}

impl ContainerData {
    fn new(is_cell: bool) -> Self {
        Self {
            children: Vec::new(),
            names: HashMap::new(),
            is_cell,
            hierarchy_config: None,
            bounds: None,
            pending_refresh: Vec::new(),
        }
    }

    /// Direct children in insertion order
    pub fn children(&self) -> &[SceneNodeId] {
        &self.children
    }

    /// Child by name
    pub fn child(&self, name: &str) -> Option<SceneNodeId> {
        self.names.get(name).copied()
    }

    /// True if the container acts as a cell
    pub fn is_cell(&self) -> bool {
        self.is_cell
    }

    /// Hierarchy settings of this container
    pub fn hierarchy_config(&self) -> Option<&HierarchyConfig> {
        self.hierarchy_config.as_ref()
    }

    /// Bounds of the container's hierarchy (container space of its children)
    pub fn bounds(&self) -> Option<&AABB> {
        self.bounds.as_ref()
    }

    /// Nodes waiting for a hierarchy refresh
    pub fn num_pending_refreshes(&self) -> usize {
        self.pending_refresh.len()
    }
}

/// Cell portal state
///
/// The portal opening is a convex polygon in the portal's local space whose
/// front side faces the target cell.
#[derive(Debug, Clone)]
pub struct CellPortal {
    pub(crate) target: String,
    pub(crate) polygon: Polygon,
    pub(crate) cached_target: Option<(Option<SceneNodeId>, u64)>,
    pub(crate) cached_warp: Option<WarpCache>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct WarpCache {
    pub(crate) target: SceneNodeId,
    pub(crate) stamp: u64,
    pub(crate) matrix: Mat4,
}

impl CellPortal {
    /// Name path of the target cell, relative to the portal's container
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Opening polygon in portal space
    pub fn polygon(&self) -> &Polygon {
        &self.polygon
    }
}

/// Node specific data
#[derive(Debug, Clone)]
pub enum SceneNodeKind {
    /// Plain node
    Node,
    /// Container or cell
    Container(Box<ContainerData>),
    /// Cell portal
    CellPortal(Box<CellPortal>),
}

/// # Scene Node
///
/// Built with one of the constructors and handed to
/// [`Scene::insert`](super::Scene::insert), which assigns the handle and makes
/// the name unique within the target container.
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub(crate) name: String,
    pub(crate) class_name: String,
    pub(crate) kind: SceneNodeKind,
    pub(crate) flags: SceneNodeFlags,
    pub(crate) container: Option<SceneNodeId>,
    pub(crate) transform: Transform,
    pub(crate) matrix: Mat4,
    pub(crate) inverse_matrix: Mat4,
    pub(crate) local_aabb: AABB,
    pub(crate) container_aabb: AABB,
    pub(crate) version: u64,
    pub(crate) refresh_queued: bool,
    pub(crate) max_draw_distance: f32,
}

impl SceneNode {
    fn with_kind(name: &str, class_name: &str, kind: SceneNodeKind) -> Self {
        Self {
            name: name.to_string(),
            class_name: class_name.to_string(),
            kind,
            flags: SceneNodeFlags::empty(),
            container: None,
            transform: Transform::identity(),
            matrix: Mat4::identity(),
            inverse_matrix: Mat4::identity(),
            local_aabb: AABB::default(),
            container_aabb: AABB::default(),
            version: 0,
            refresh_queued: false,
            max_draw_distance: 0.0,
        }
    }

    /// Plain node of the given class
    pub fn new(name: &str, class_name: &str) -> Self {
        Self::with_kind(name, class_name, SceneNodeKind::Node)
    }

    /// Container
    pub fn container(name: &str) -> Self {
        Self::with_kind(name, CONTAINER_CLASS, SceneNodeKind::Container(Box::new(ContainerData::new(false))))
    }

    /// Container acting as a cell
    pub fn cell(name: &str) -> Self {
        Self::with_kind(name, CELL_CLASS, SceneNodeKind::Container(Box::new(ContainerData::new(true))))
    }

    /// Cell portal leading to the cell `target`
    ///
    /// `target` is a name path relative to the portal's container, for
    /// instance `Parent.Kitchen` for a sibling cell.
    pub fn cell_portal(name: &str, target: &str, polygon: Polygon) -> Self {
        let local_aabb = polygon.aabb().unwrap_or_default();
        let portal = CellPortal {
            target: target.to_string(),
            polygon,
            cached_target: None,
            cached_warp: None,
        };
        let mut node = Self::with_kind(name, CELL_PORTAL_CLASS, SceneNodeKind::CellPortal(Box::new(portal)));
        node.local_aabb = local_aabb;
        node
    }

    /// Set the transform relative to the container
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Set the bounding box in node space
    pub fn with_local_aabb(mut self, aabb: AABB) -> Self {
        self.local_aabb = aabb;
        self
    }

    /// Set flags
    pub fn with_flags(mut self, flags: SceneNodeFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the maximum draw distance (0 = unlimited)
    pub fn with_max_draw_distance(mut self, distance: f32) -> Self {
        self.max_draw_distance = distance;
        self
    }

    /// Use `config` for this container's hierarchy instead of the scene default
    pub fn with_hierarchy_config(mut self, config: HierarchyConfig) -> Self {
        if let SceneNodeKind::Container(data) = &mut self.kind {
            data.hierarchy_config = Some(config);
        }
        self
    }

    /// Set the hierarchy bounds of a container
    pub fn with_bounds(mut self, bounds: AABB) -> Self {
        if let SceneNodeKind::Container(data) = &mut self.kind {
            data.bounds = Some(bounds);
        }
        self
    }

    /// Name, unique within the container
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Class name
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Node specific data
    pub fn kind(&self) -> &SceneNodeKind {
        &self.kind
    }

    /// Flags
    pub fn flags(&self) -> SceneNodeFlags {
        self.flags
    }

    /// True unless [`SceneNodeFlags::INACTIVE`] is set
    pub fn is_active(&self) -> bool {
        !self.flags.contains(SceneNodeFlags::INACTIVE)
    }

    /// True unless [`SceneNodeFlags::INVISIBLE`] is set
    pub fn is_visible(&self) -> bool {
        !self.flags.contains(SceneNodeFlags::INVISIBLE)
    }

    /// True for containers and cells
    pub fn is_container(&self) -> bool {
        matches!(self.kind, SceneNodeKind::Container(_))
    }

    /// True for cells
    pub fn is_cell(&self) -> bool {
        matches!(&self.kind, SceneNodeKind::Container(data) if data.is_cell)
    }

    /// True for cell portals
    pub fn is_cell_portal(&self) -> bool {
        matches!(self.kind, SceneNodeKind::CellPortal(_))
    }

    /// Container state
    pub fn as_container(&self) -> Option<&ContainerData> {
        match &self.kind {
            SceneNodeKind::Container(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn as_container_mut(&mut self) -> Option<&mut ContainerData> {
        match &mut self.kind {
            SceneNodeKind::Container(data) => Some(data),
            _ => None,
        }
    }

    /// Cell portal state
    pub fn as_cell_portal(&self) -> Option<&CellPortal> {
        match &self.kind {
            SceneNodeKind::CellPortal(portal) => Some(portal),
            _ => None,
        }
    }

    pub(crate) fn as_cell_portal_mut(&mut self) -> Option<&mut CellPortal> {
        match &mut self.kind {
            SceneNodeKind::CellPortal(portal) => Some(portal),
            _ => None,
        }
    }

    /// Container holding this node, `None` for the root
    pub fn container_id(&self) -> Option<SceneNodeId> {
        self.container
    }

    /// Transform relative to the container
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Node space to container space
    pub fn matrix(&self) -> &Mat4 {
        &self.matrix
    }

    /// Container space to node space
    pub fn inverse_matrix(&self) -> &Mat4 {
        &self.inverse_matrix
    }

    /// Bounding box in node space
    pub fn local_aabb(&self) -> &AABB {
        &self.local_aabb
    }

    /// Bounding box in container space
    pub fn container_aabb(&self) -> &AABB {
        &self.container_aabb
    }

    /// Maximum draw distance (0 = unlimited)
    pub fn max_draw_distance(&self) -> f32 {
        self.max_draw_distance
    }

    /// Transform change stamp
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Recompute the cached matrices and the container-space box
    pub(crate) fn update_cached_transform(&mut self) {
        self.matrix = self.transform.to_matrix();
        self.inverse_matrix = self
            .matrix
            .try_inverse()
            .unwrap_or_else(|| self.transform.to_inverse_matrix());
        self.container_aabb = self.local_aabb.transformed(&self.matrix);
    }
}
