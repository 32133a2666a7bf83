//! Scene graph
//!
//! Arena of scene nodes rooted in the `Root` container. Each container owns
//! the spatial hierarchy over its direct children. Transform and bounding box
//! changes do not touch the hierarchy right away: the node is queued on its
//! container and the queue is drained the next time the container's hierarchy
//! is requested, which every query does.

use crate::config::{Config, HierarchyConfig, SceneConfig};
use crate::foundation::collections::{SceneNodeId, SecondaryMap, SlotMap};
use crate::foundation::geometry::AABB;
use crate::foundation::math::{Mat4, Quat, Transform, Vec3};
use crate::query::QueryManager;
use crate::spatial::{BoundsLookup, Hierarchy, HierarchyKind};

use super::node::{ContainerData, SceneNode, SceneNodeFlags};
use super::SceneError;

/// Name of the root container and path keyword addressing it
pub const ROOT_KEYWORD: &str = "Root";
/// Path keyword addressing the container of the current node
pub const PARENT_KEYWORD: &str = "Parent";
/// Path keyword addressing the current node
pub const THIS_KEYWORD: &str = "This";

impl BoundsLookup for SlotMap<SceneNodeId, SceneNode> {
    fn container_aabb(&self, node: SceneNodeId) -> Option<AABB> {
        self.get(node).map(|node| node.container_aabb)
    }
}

/// # Scene
///
/// Owns every scene node, the hierarchy of each container and the queries
/// created on containers.
pub struct Scene {
    pub(crate) config: SceneConfig,
    pub(crate) nodes: SlotMap<SceneNodeId, SceneNode>,
    pub(crate) hierarchies: SecondaryMap<SceneNodeId, Hierarchy>,
    pub(crate) query_managers: SecondaryMap<SceneNodeId, QueryManager>,
    root: SceneNodeId,
    clock: u64,
    pub(crate) names_epoch: u64,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Create a scene with default configuration
    pub fn new() -> Self {
        Self::with_config(SceneConfig::default())
    }

    /// Create a scene with custom configuration
    ///
    /// Inconsistent values are logged; kd-tree merge thresholds are clamped
    /// below the split limit.
    pub fn with_config(config: SceneConfig) -> Self {
        if let Err(err) = config.validate() {
            log::warn!("Scene configuration: {}", err);
        }
        let mut root_node = SceneNode::container(ROOT_KEYWORD)
            .with_hierarchy_config(config.root_hierarchy.clone())
            .with_bounds(config.container_bounds)
            .with_local_aabb(config.container_bounds);
        root_node.update_cached_transform();

        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(root_node);

        let mut scene = Self {
            config,
            nodes,
            hierarchies: SecondaryMap::new(),
            query_managers: SecondaryMap::new(),
            root,
            clock: 0,
            names_epoch: 0,
        };
        if let Err(err) = scene.build_hierarchy(root) {
            log::warn!("Failed to create the root hierarchy: {}", err);
        }
        scene
    }

    /// Configuration
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Root container
    pub fn root(&self) -> SceneNodeId {
        self.root
    }

    /// Node by handle
    pub fn node(&self, id: SceneNodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    /// True if `id` refers to a live node
    pub fn contains(&self, id: SceneNodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of nodes including the root
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Direct children of `container`
    pub fn children(&self, container: SceneNodeId) -> &[SceneNodeId] {
        self.nodes
            .get(container)
            .and_then(SceneNode::as_container)
            .map(ContainerData::children)
            .unwrap_or(&[])
    }

    fn container_data(&self, id: SceneNodeId) -> Result<&ContainerData, SceneError> {
        self.nodes
            .get(id)
            .ok_or(SceneError::UnknownNode)?
            .as_container()
            .ok_or(SceneError::NotAContainer)
    }

    fn container_data_mut(&mut self, id: SceneNodeId) -> Result<&mut ContainerData, SceneError> {
        self.nodes
            .get_mut(id)
            .ok_or(SceneError::UnknownNode)?
            .as_container_mut()
            .ok_or(SceneError::NotAContainer)
    }

    /// Insert `node` into `container`
    ///
    /// A name already taken in the container gets the first free numeric
    /// suffix; an empty name becomes the class name plus such a suffix.
    pub fn insert(&mut self, container: SceneNodeId, mut node: SceneNode) -> Result<SceneNodeId, SceneError> {
        validate_name(&node.name)?;
        let name = unique_name(self.container_data(container)?, &node.name, &node.class_name);

        if let Some(data) = node.as_container_mut() {
            let bounds = *data.bounds.get_or_insert(self.config.container_bounds);
            if node.local_aabb == AABB::default() {
                node.local_aabb = bounds;
            }
        }
        self.clock += 1;
        node.name = name.clone();
        node.container = Some(container);
        node.version = self.clock;
        node.refresh_queued = false;
        node.update_cached_transform();

        let id = self.nodes.insert(node);
        let data = self.container_data_mut(container)?;
        data.children.push(id);
        data.names.insert(name, id);
        self.names_epoch += 1;

        if let Some(hierarchy) = self.hierarchies.get_mut(container) {
            hierarchy.add_scene_node(id, &self.nodes)?;
        }
        log::trace!("Inserted scene node {:?} into {:?}", id, container);
        Ok(id)
    }

    /// Remove a node; containers are removed with everything inside
    pub fn remove(&mut self, id: SceneNodeId) -> Result<(), SceneError> {
        if id == self.root {
            return Err(SceneError::RootRemoval);
        }
        let node = self.nodes.get(id).ok_or(SceneError::UnknownNode)?;
        let children = node.as_container().map(|data| data.children.clone()).unwrap_or_default();
        for child in children {
            self.remove(child)?;
        }

        self.detach_from_container(id)?;
        self.hierarchies.remove(id);
        self.query_managers.remove(id);
        self.nodes.remove(id);
        self.names_epoch += 1;
        Ok(())
    }

    fn detach_from_container(&mut self, id: SceneNodeId) -> Result<(), SceneError> {
        let node = self.nodes.get_mut(id).ok_or(SceneError::UnknownNode)?;
        let Some(container) = node.container.take() else {
            return Ok(());
        };
        node.refresh_queued = false;
        let name = node.name.clone();

        let data = self.container_data_mut(container)?;
        data.children.retain(|&child| child != id);
        data.names.remove(&name);
        data.pending_refresh.retain(|&pending| pending != id);

        if let Some(hierarchy) = self.hierarchies.get_mut(container) {
            if hierarchy.contains_scene_node(id) {
                hierarchy.remove_scene_node(id)?;
            }
        }
        Ok(())
    }

    /// Rename a node; returns the name actually given
    pub fn rename(&mut self, id: SceneNodeId, name: &str) -> Result<String, SceneError> {
        validate_name(name)?;
        let node = self.nodes.get(id).ok_or(SceneError::UnknownNode)?;
        if node.name == name {
            return Ok(name.to_string());
        }
        let old_name = node.name.clone();
        let class_name = node.class_name.clone();
        let container = node.container;

        let new_name = match container {
            Some(container) => {
                let data = self.container_data_mut(container)?;
                data.names.remove(&old_name);
                let new_name = unique_name(data, name, &class_name);
                data.names.insert(new_name.clone(), id);
                new_name
            }
            None => name.to_string(),
        };
        if let Some(node) = self.nodes.get_mut(id) {
            node.name = new_name.clone();
        }
        self.names_epoch += 1;
        Ok(new_name)
    }

    /// Move a node into another container, keeping its local transform
    pub fn set_container(&mut self, id: SceneNodeId, container: SceneNodeId) -> Result<(), SceneError> {
        if id == self.root {
            return Err(SceneError::RootRemoval);
        }
        let node = self.nodes.get(id).ok_or(SceneError::UnknownNode)?;
        if node.container == Some(container) {
            return Ok(());
        }
        self.container_data(container)?;

        let mut ancestor = Some(container);
        while let Some(current) = ancestor {
            if current == id {
                return Err(SceneError::CycleDetected);
            }
            ancestor = self.nodes.get(current).and_then(|node| node.container);
        }

        self.detach_from_container(id)?;

        let node = self.nodes.get(id).ok_or(SceneError::UnknownNode)?;
        let name = unique_name(self.container_data(container)?, &node.name, &node.class_name);
        let data = self.container_data_mut(container)?;
        data.children.push(id);
        data.names.insert(name.clone(), id);

        self.clock += 1;
        if let Some(node) = self.nodes.get_mut(id) {
            node.name = name;
            node.container = Some(container);
            node.version = self.clock;
        }
        self.names_epoch += 1;

        if let Some(hierarchy) = self.hierarchies.get_mut(container) {
            hierarchy.add_scene_node(id, &self.nodes)?;
        }
        Ok(())
    }

    /// Resolve a dotted name path relative to `from`
    ///
    /// Each segment is a child name or one of the keywords `Root`, `Parent`
    /// and `This`. `Parent.Kitchen.Lamp` seen from a node addresses the lamp in
    /// the kitchen next to it.
    pub fn get_by_name(&self, from: SceneNodeId, path: &str) -> Option<SceneNodeId> {
        if path.is_empty() || !self.nodes.contains_key(from) {
            return None;
        }
        path.split('.').try_fold(from, |current, segment| match segment {
            ROOT_KEYWORD => Some(self.root),
            PARENT_KEYWORD => self.nodes.get(current)?.container,
            THIS_KEYWORD => Some(current),
            name => self.nodes.get(current)?.as_container()?.child(name),
        })
    }

    /// Set the transform of a node relative to its container
    pub fn set_transform(&mut self, id: SceneNodeId, transform: Transform) -> Result<(), SceneError> {
        let node = self.nodes.get_mut(id).ok_or(SceneError::UnknownNode)?;
        node.transform = transform;
        self.transform_changed(id)
    }

    /// Set the position of a node
    pub fn set_position(&mut self, id: SceneNodeId, position: Vec3) -> Result<(), SceneError> {
        let node = self.nodes.get_mut(id).ok_or(SceneError::UnknownNode)?;
        node.transform.position = position;
        self.transform_changed(id)
    }

    /// Set the rotation of a node
    pub fn set_rotation(&mut self, id: SceneNodeId, rotation: Quat) -> Result<(), SceneError> {
        let node = self.nodes.get_mut(id).ok_or(SceneError::UnknownNode)?;
        node.transform.rotation = rotation;
        self.transform_changed(id)
    }

    /// Set the scale of a node
    pub fn set_scale(&mut self, id: SceneNodeId, scale: Vec3) -> Result<(), SceneError> {
        let node = self.nodes.get_mut(id).ok_or(SceneError::UnknownNode)?;
        node.transform.scale = scale;
        self.transform_changed(id)
    }

    /// Set the bounding box of a node in node space
    pub fn set_local_aabb(&mut self, id: SceneNodeId, aabb: AABB) -> Result<(), SceneError> {
        let node = self.nodes.get_mut(id).ok_or(SceneError::UnknownNode)?;
        node.local_aabb = aabb;
        self.transform_changed(id)
    }

    /// Set the flags of a node
    pub fn set_flags(&mut self, id: SceneNodeId, flags: SceneNodeFlags) -> Result<(), SceneError> {
        self.nodes.get_mut(id).ok_or(SceneError::UnknownNode)?.flags = flags;
        Ok(())
    }

    /// Set the maximum draw distance of a node (0 = unlimited)
    pub fn set_max_draw_distance(&mut self, id: SceneNodeId, distance: f32) -> Result<(), SceneError> {
        self.nodes.get_mut(id).ok_or(SceneError::UnknownNode)?.max_draw_distance = distance;
        Ok(())
    }

    /// Set the hierarchy bounds of a container
    ///
    /// The hierarchy, if present, collapses into its root with the new box.
    pub fn set_container_bounds(&mut self, container: SceneNodeId, bounds: AABB) -> Result<(), SceneError> {
        self.container_data_mut(container)?.bounds = Some(bounds);
        if let Some(hierarchy) = self.hierarchies.get_mut(container) {
            hierarchy.init(bounds, &self.nodes);
        }
        self.set_local_aabb(container, bounds)
    }

    /// Union of the container-space boxes of the children of `container`
    ///
    /// `None` for an empty container.
    pub fn calculate_container_aabb(&self, container: SceneNodeId) -> Result<Option<AABB>, SceneError> {
        let data = self.container_data(container)?;
        Ok(data
            .children
            .iter()
            .filter_map(|&child| self.nodes.get(child))
            .map(|child| child.container_aabb)
            .reduce(|acc, aabb| acc.combine(&aabb)))
    }

    fn transform_changed(&mut self, id: SceneNodeId) -> Result<(), SceneError> {
        self.clock += 1;
        let node = self.nodes.get_mut(id).ok_or(SceneError::UnknownNode)?;
        node.update_cached_transform();
        node.version = self.clock;

        let container = match node.container {
            Some(container) if !node.refresh_queued => container,
            _ => return Ok(()),
        };
        node.refresh_queued = true;
        self.container_data_mut(container)?.pending_refresh.push(id);
        Ok(())
    }

    /// Node space to world (root container) space
    pub fn world_matrix(&self, id: SceneNodeId) -> Option<Mat4> {
        let mut node = self.nodes.get(id)?;
        let mut matrix = node.matrix;
        while let Some(container) = node.container {
            node = self.nodes.get(container)?;
            matrix = node.matrix * matrix;
        }
        Some(matrix)
    }

    /// Newest transform stamp along the container chain of `id`, inclusive
    pub(crate) fn chain_stamp(&self, id: SceneNodeId) -> u64 {
        let mut stamp = 0;
        let mut current = Some(id);
        while let Some(node) = current.and_then(|current| self.nodes.get(current)) {
            stamp = stamp.max(node.version);
            current = node.container;
        }
        stamp
    }

    /// Create (or rebuild) the hierarchy of `container` with the given kind
    ///
    /// All current children are inserted and the tree is touched recursively.
    pub fn create_hierarchy(&mut self, container: SceneNodeId, kind: HierarchyKind) -> Result<(), SceneError> {
        let default_config = self.config.container_hierarchy.clone();
        let data = self.container_data_mut(container)?;
        let config = data.hierarchy_config.get_or_insert(default_config);
        config.kind = kind;
        self.build_hierarchy(container)
    }

    fn build_hierarchy(&mut self, container: SceneNodeId) -> Result<(), SceneError> {
        let default_config = self.config.container_hierarchy.clone();
        let default_bounds = self.config.container_bounds;
        let data = self.container_data_mut(container)?;
        let config: HierarchyConfig = data.hierarchy_config.clone().unwrap_or(default_config);
        let bounds = data.bounds.unwrap_or(default_bounds);
        let children = data.children.clone();
        let pending = std::mem::take(&mut data.pending_refresh);
        for id in pending {
            if let Some(node) = self.nodes.get_mut(id) {
                node.refresh_queued = false;
            }
        }

        let kind = config.kind;
        let mut hierarchy = Hierarchy::new(config, bounds);
        for child in &children {
            hierarchy.add_scene_node(*child, &self.nodes)?;
        }
        let root = hierarchy.root();
        hierarchy.touch(root, true, &self.nodes);
        log::debug!(
            "Created {:?} hierarchy for container {:?} with {} nodes ({} scene nodes)",
            kind,
            container,
            hierarchy.num_nodes(),
            children.len()
        );
        self.hierarchies.insert(container, hierarchy);
        Ok(())
    }

    /// Hierarchy of `container`, without creating it or draining its queue
    pub fn hierarchy(&self, container: SceneNodeId) -> Option<&Hierarchy> {
        self.hierarchies.get(container)
    }

    /// Up-to-date hierarchy of `container`
    ///
    /// Creates the hierarchy first if the scene is configured to do so, then
    /// refreshes every node queued since the last request. `None` when the
    /// container has no hierarchy.
    pub fn hierarchy_instance(&mut self, container: SceneNodeId) -> Option<&mut Hierarchy> {
        self.prepare_hierarchy(container)?;
        self.hierarchies.get_mut(container)
    }

    /// Up-to-date hierarchy of `container` together with the node storage
    pub(crate) fn hierarchy_with_nodes(
        &mut self,
        container: SceneNodeId,
    ) -> Option<(&mut Hierarchy, &SlotMap<SceneNodeId, SceneNode>)> {
        self.prepare_hierarchy(container)?;
        let Self { hierarchies, nodes, .. } = self;
        hierarchies.get_mut(container).map(|hierarchy| (hierarchy, &*nodes))
    }

    /// Existing hierarchy of `container` together with the node storage
    ///
    /// Skips creation and queued refreshes; used while a query walks a
    /// hierarchy it already prepared.
    pub(crate) fn hierarchy_parts(
        &mut self,
        container: SceneNodeId,
    ) -> Option<(&mut Hierarchy, &SlotMap<SceneNodeId, SceneNode>)> {
        let Self { hierarchies, nodes, .. } = self;
        hierarchies.get_mut(container).map(|hierarchy| (hierarchy, &*nodes))
    }

    fn prepare_hierarchy(&mut self, container: SceneNodeId) -> Option<()> {
        self.nodes.get(container)?.as_container()?;
        if !self.hierarchies.contains_key(container) {
            if !self.config.create_hierarchies_on_demand {
                return None;
            }
            if let Err(err) = self.build_hierarchy(container) {
                log::warn!("Failed to create hierarchy for {:?}: {}", container, err);
                return None;
            }
        }
        self.flush_refreshes(container);
        Some(())
    }

    fn flush_refreshes(&mut self, container: SceneNodeId) {
        let Ok(data) = self.container_data_mut(container) else {
            return;
        };
        let pending = std::mem::take(&mut data.pending_refresh);
        for id in pending {
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };
            node.refresh_queued = false;
            if node.container != Some(container) {
                continue;
            }
            if let Some(hierarchy) = self.hierarchies.get_mut(container) {
                if let Err(err) = hierarchy.refresh_scene_node(id, &self.nodes) {
                    log::warn!("Failed to refresh {:?} in its hierarchy: {}", id, err);
                }
            }
        }
    }
}

fn validate_name(name: &str) -> Result<(), SceneError> {
    if name.contains('.') || [ROOT_KEYWORD, PARENT_KEYWORD, THIS_KEYWORD].contains(&name) {
        return Err(SceneError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn unique_name(data: &ContainerData, name: &str, class_name: &str) -> String {
    if !name.is_empty() && !data.names.contains_key(name) {
        return name.to_string();
    }
    let base = if name.is_empty() { class_name } else { name };
    let mut index = 0_usize;
    loop {
        let candidate = format!("{}{}", base, index);
        if !data.names.contains_key(&candidate) {
            return candidate;
        }
        index += 1;
    }
}
