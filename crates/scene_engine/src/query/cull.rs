//! Frustum cull query
//!
//! Collects the scene nodes inside a view frustum. Hierarchy nodes are visited
//! nearest first, and so are the scene nodes attached to each of them. A
//! hierarchy node found completely inside the frustum lets
//! its children skip the frustum test. Cell portals are looked through when
//! the camera is on their back side: the frustum is narrowed to the view
//! planes through the portal opening, warped into the target cell, and the
//! traversal continues there.

use std::any::Any;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use crate::foundation::collections::{HierarchyNodeKey, SceneNodeId};
use crate::foundation::geometry::{PlaneSet, PlaneSetClip, PlaneSide};
use crate::foundation::math::{Mat4, Point3, Vec3};
use crate::scene::{Scene, SceneNodeFlags};

use super::{check_container, QueryCallback, QueryError, QueryFlags, QueryStatus, SceneQuery};

/// Counters of one cull query run
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CullStatistics {
    /// Hierarchy nodes popped from the traversal queue
    pub traversed_nodes: u32,
    /// Hierarchy and scene nodes rejected by the frustum test
    pub frustum_culled_nodes: u32,
    /// Frustum tests skipped because the parent was completely inside
    pub skipped_frustum_tests: u32,
    /// Scene nodes reported as visible
    pub visible_scene_nodes: u32,
    /// Containers entered, including through portals
    pub visited_containers: u32,
    /// Cell portals looked through
    pub visited_portals: u32,
    /// Wall time of the run
    pub duration: Duration,
}

/// Scene node found visible by a [`CullQuery`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleNode {
    /// Visible scene node
    pub scene_node: SceneNodeId,
    /// Container the node was found in
    pub container: SceneNodeId,
    /// Node space to the space of the queried container
    pub matrix: Mat4,
    /// Squared distance from the camera to the node box (container space)
    pub squared_distance: f32,
}

/// Pending hierarchy node, ordered nearest first
struct QueueEntry {
    squared_distance: f32,
    key: HierarchyNodeKey,
    parent_id: Option<u32>,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.squared_distance.total_cmp(&self.squared_distance)
    }
}

/// View of one container during the traversal
#[derive(Clone)]
struct CullView {
    container: SceneNodeId,
    frustum: PlaneSet,
    camera: Vec3,
    to_query: Mat4,
}

/// Frustum cull query
pub struct CullQuery {
    frustum: PlaneSet,
    camera_position: Vec3,
    flags: QueryFlags,
    touched: HashSet<SceneNodeId>,
    visible: Vec<VisibleNode>,
    statistics: CullStatistics,
}

impl CullQuery {
    /// Cull against `frustum` seen from `camera_position`, both in the space
    /// of the container the query runs on
    pub fn new(frustum: PlaneSet, camera_position: Vec3) -> Self {
        Self {
            frustum,
            camera_position,
            flags: QueryFlags::default(),
            touched: HashSet::new(),
            visible: Vec::new(),
            statistics: CullStatistics::default(),
        }
    }

    /// Cull query for a camera given by its view and projection matrices
    pub fn from_camera(view: &Mat4, projection: &Mat4) -> Self {
        let camera_position = view
            .try_inverse()
            .map(|inverse| inverse.transform_point(&Point3::origin()).coords)
            .unwrap_or_else(Vec3::zeros);
        Self::new(PlaneSet::from_view_projection(&(projection * view)), camera_position)
    }

    /// Replace the frustum and camera position
    pub fn set_view(&mut self, frustum: PlaneSet, camera_position: Vec3) {
        self.frustum = frustum;
        self.camera_position = camera_position;
    }

    /// Frustum in the space of the queried container
    pub fn frustum(&self) -> &PlaneSet {
        &self.frustum
    }

    /// Camera position in the space of the queried container
    pub fn camera_position(&self) -> Vec3 {
        self.camera_position
    }

    /// Visible scene nodes of the last run, in visiting order
    pub fn visible_nodes(&self) -> &[VisibleNode] {
        &self.visible
    }

    /// Counters of the last run
    pub fn statistics(&self) -> &CullStatistics {
        &self.statistics
    }

    fn cull_container(
        &mut self,
        scene: &mut Scene,
        view: CullView,
        callback: &mut QueryCallback<'_>,
    ) -> ControlFlow<()> {
        let Some(root) = scene.hierarchy_instance(view.container).map(|hierarchy| hierarchy.root()) else {
            return ControlFlow::Continue(());
        };
        self.statistics.visited_containers += 1;

        let mut fully_visible: HashSet<u32> = HashSet::new();
        let mut queue = BinaryHeap::new();
        queue.push(QueueEntry { squared_distance: 0.0, key: root, parent_id: None });

        while let Some(entry) = queue.pop() {
            let Some((hierarchy, nodes)) = scene.hierarchy_parts(view.container) else {
                break;
            };
            let Some(node) = hierarchy.node(entry.key) else {
                continue;
            };
            self.statistics.traversed_nodes += 1;
            let node_id = node.id();

            let inside = if entry.parent_id.map_or(false, |parent| fully_visible.contains(&parent)) {
                self.statistics.skipped_frustum_tests += 1;
                true
            } else {
                match view.frustum.clip_aabb(node.aabb()) {
                    PlaneSetClip::Outside => {
                        self.statistics.frustum_culled_nodes += 1;
                        continue;
                    }
                    PlaneSetClip::Inside => true,
                    PlaneSetClip::Intersecting(_) => false,
                }
            };
            if inside {
                fully_visible.insert(node_id);
            }

            hierarchy.touch(entry.key, false, nodes);
            let distance = |id: &SceneNodeId| {
                nodes
                    .get(*id)
                    .map_or(f32::INFINITY, |node| node.container_aabb().squared_distance_to_point(view.camera))
            };
            let mut items = hierarchy.node_scene_nodes(entry.key);
            items.sort_by(|a, b| distance(a).total_cmp(&distance(b)));
            if let Some(split) = hierarchy.node(entry.key).and_then(|node| node.split()) {
                for child in split.children {
                    if let Some(child_node) = hierarchy.node(child) {
                        queue.push(QueueEntry {
                            squared_distance: child_node.aabb().squared_distance_to_point(view.camera),
                            key: child,
                            parent_id: Some(node_id),
                        });
                    }
                }
            }

            for id in items {
                if self.cull_scene_node(scene, &view, id, inside, callback).is_break() {
                    return ControlFlow::Break(());
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn cull_scene_node(
        &mut self,
        scene: &mut Scene,
        view: &CullView,
        id: SceneNodeId,
        parent_inside: bool,
        callback: &mut QueryCallback<'_>,
    ) -> ControlFlow<()> {
        if self.touched.contains(&id) {
            return ControlFlow::Continue(());
        }
        let Some(node) = scene.node(id) else {
            return ControlFlow::Continue(());
        };
        if !node.is_active() {
            return ControlFlow::Continue(());
        }

        let aabb = *node.container_aabb();
        let squared_distance = aabb.squared_distance_to_point(view.camera);
        let max_distance = node.max_draw_distance();
        if max_distance > 0.0 && squared_distance > max_distance * max_distance {
            return ControlFlow::Continue(());
        }
        let skip_test = parent_inside || node.flags().contains(SceneNodeFlags::NO_CULLING);
        if !skip_test && !view.frustum.intersects_aabb(&aabb) {
            self.statistics.frustum_culled_nodes += 1;
            return ControlFlow::Continue(());
        }
        self.touched.insert(id);

        let matrix = *node.matrix();
        let inverse = *node.inverse_matrix();
        let descend = self.flags.contains(QueryFlags::RECURSIVE)
            && node.is_container()
            && !node.flags().contains(SceneNodeFlags::NO_RECURSION);
        let portal = node
            .as_cell_portal()
            .filter(|_| {
                self.flags.contains(QueryFlags::PORTALS) && !node.flags().contains(SceneNodeFlags::NO_PASS_THROUGH)
            })
            .map(|portal| portal.polygon().transformed(&matrix));

        if node.is_visible() {
            self.visible.push(VisibleNode {
                scene_node: id,
                container: view.container,
                matrix: view.to_query * matrix,
                squared_distance,
            });
            self.statistics.visible_scene_nodes += 1;
            if callback(id).is_break() {
                return ControlFlow::Break(());
            }
        }

        if descend {
            let inner = CullView {
                container: id,
                frustum: view.frustum.transformed(&inverse),
                camera: inverse.transform_point(&Point3::from(view.camera)).coords,
                to_query: view.to_query * matrix,
            };
            if self.cull_container(scene, inner, callback).is_break() {
                return ControlFlow::Break(());
            }
        }

        if let Some(polygon) = portal {
            let Some(target) = scene.target_cell_instance(id).filter(|&target| target != view.container) else {
                return ControlFlow::Continue(());
            };
            let Some(plane) = polygon.plane() else {
                return ControlFlow::Continue(());
            };
            if plane.side(view.camera) == PlaneSide::InFront {
                return ControlFlow::Continue(());
            }
            let Some(warp) = scene.warp_matrix(id) else {
                return ControlFlow::Continue(());
            };
            let Some(unwarp) = warp.try_inverse() else {
                return ControlFlow::Continue(());
            };

            let mut narrowed = view.frustum.clone();
            if let Some(view_planes) = PlaneSet::create_view_planes(&polygon.vertices, view.camera) {
                for plane in view_planes.planes() {
                    narrowed.push(*plane);
                }
            }
            self.statistics.visited_portals += 1;
            let target_view = CullView {
                container: target,
                frustum: narrowed.transformed(&warp),
                camera: warp.transform_point(&Point3::from(view.camera)).coords,
                to_query: view.to_query * unwarp,
            };
            if self.cull_container(scene, target_view, callback).is_break() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }
}

impl SceneQuery for CullQuery {
    fn perform_query(
        &mut self,
        scene: &mut Scene,
        container: SceneNodeId,
        callback: &mut QueryCallback<'_>,
    ) -> Result<QueryStatus, QueryError> {
        check_container(scene, container)?;
        let start = Instant::now();
        self.touched.clear();
        self.visible.clear();
        self.statistics = CullStatistics::default();

        let view = CullView {
            container,
            frustum: self.frustum.clone(),
            camera: self.camera_position,
            to_query: Mat4::identity(),
        };
        let status = QueryStatus::from(self.cull_container(scene, view, callback));
        self.statistics.duration = start.elapsed();
        log::debug!("Cull query on {:?}: {:?}, {:?}", container, status, self.statistics);
        Ok(status)
    }

    fn flags(&self) -> QueryFlags {
        self.flags
    }

    fn set_flags(&mut self, flags: QueryFlags) {
        self.flags = flags;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_pops_nearest_first() {
        let mut keys = slotmap::SlotMap::<HierarchyNodeKey, ()>::with_key();
        let mut queue = BinaryHeap::new();
        for distance in [9.0, 1.0, 4.0] {
            queue.push(QueueEntry { squared_distance: distance, key: keys.insert(()), parent_id: None });
        }
        let order: Vec<f32> = std::iter::from_fn(|| queue.pop().map(|entry| entry.squared_distance)).collect();
        assert_eq!(order, vec![1.0, 4.0, 9.0]);
    }
}
