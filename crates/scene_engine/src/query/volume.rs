//! Volume queries
//!
//! Point, line, sphere, box and plane set queries share one traversal: prune
//! hierarchy nodes by their box, touch what survives, test the scene nodes
//! attached there against the volume and recurse into child containers and
//! through cell portals with the volume moved into the new space. The volume
//! is passed by value into every recursion level.

use std::any::Any;
use std::collections::HashSet;
use std::ops::ControlFlow;

use crate::foundation::collections::{HierarchyNodeKey, SceneNodeId};
use crate::foundation::geometry::{Line, PlaneSet, Sphere, AABB};
use crate::foundation::math::{Mat4, Point3, Vec3};
use crate::scene::{Scene, SceneNodeFlags};

use super::{check_container, QueryCallback, QueryError, QueryFlags, QueryStatus, SceneQuery};

/// Query volume
#[derive(Debug, Clone, PartialEq)]
pub enum QueryVolume {
    /// Scene nodes whose box contains the point
    Point(Vec3),
    /// Scene nodes whose box the segment touches
    Line(Line),
    /// Scene nodes whose box the sphere touches
    Sphere(Sphere),
    /// Scene nodes whose box overlaps the box
    Aabb(AABB),
    /// Scene nodes whose box is not completely outside the plane set
    PlaneSet(PlaneSet),
}

impl QueryVolume {
    /// Check a box against the volume
    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        match self {
            QueryVolume::Point(point) => aabb.contains_point(*point),
            QueryVolume::Line(line) => aabb.intersects_line(line),
            QueryVolume::Sphere(sphere) => sphere.intersects_aabb(aabb),
            QueryVolume::Aabb(volume) => volume.intersects(aabb),
            QueryVolume::PlaneSet(plane_set) => plane_set.intersects_aabb(aabb),
        }
    }

    /// Volume moved by the point transform `matrix`
    ///
    /// Points and lines map exactly, spheres and boxes are enclosed
    /// conservatively.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        match self {
            QueryVolume::Point(point) => QueryVolume::Point(matrix.transform_point(&Point3::from(*point)).coords),
            QueryVolume::Line(line) => QueryVolume::Line(line.transformed(matrix)),
            QueryVolume::Sphere(sphere) => QueryVolume::Sphere(sphere.transformed(matrix)),
            QueryVolume::Aabb(aabb) => QueryVolume::Aabb(aabb.transformed(matrix)),
            QueryVolume::PlaneSet(plane_set) => QueryVolume::PlaneSet(plane_set.transformed(matrix)),
        }
    }
}

/// Point, line, sphere, box or plane set query
pub struct VolumeQuery {
    volume: QueryVolume,
    flags: QueryFlags,
    touched: HashSet<SceneNodeId>,
}

impl VolumeQuery {
    /// Query with an arbitrary volume
    pub fn new(volume: QueryVolume) -> Self {
        Self {
            volume,
            flags: QueryFlags::default(),
            touched: HashSet::new(),
        }
    }

    /// Point query
    pub fn point(point: Vec3) -> Self {
        Self::new(QueryVolume::Point(point))
    }

    /// Line query
    pub fn line(start: Vec3, end: Vec3) -> Self {
        Self::new(QueryVolume::Line(Line::new(start, end)))
    }

    /// Sphere query
    pub fn sphere(center: Vec3, radius: f32) -> Self {
        Self::new(QueryVolume::Sphere(Sphere::new(center, radius)))
    }

    /// Box query
    pub fn aabb(aabb: AABB) -> Self {
        Self::new(QueryVolume::Aabb(aabb))
    }

    /// Plane set query
    pub fn plane_set(plane_set: PlaneSet) -> Self {
        Self::new(QueryVolume::PlaneSet(plane_set))
    }

    /// Set traversal flags, builder style
    pub fn with_flags(mut self, flags: QueryFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Volume in the space of the queried container
    pub fn volume(&self) -> &QueryVolume {
        &self.volume
    }

    /// Replace the volume
    pub fn set_volume(&mut self, volume: QueryVolume) {
        self.volume = volume;
    }

    fn query_container(
        &mut self,
        scene: &mut Scene,
        container: SceneNodeId,
        volume: QueryVolume,
        callback: &mut QueryCallback<'_>,
    ) -> ControlFlow<()> {
        let Some(root) = scene.hierarchy_instance(container).map(|hierarchy| hierarchy.root()) else {
            return ControlFlow::Continue(());
        };
        self.query_node(scene, container, root, &volume, callback)
    }

    fn query_node(
        &mut self,
        scene: &mut Scene,
        container: SceneNodeId,
        key: HierarchyNodeKey,
        volume: &QueryVolume,
        callback: &mut QueryCallback<'_>,
    ) -> ControlFlow<()> {
        let Some((hierarchy, nodes)) = scene.hierarchy_parts(container) else {
            return ControlFlow::Continue(());
        };
        match hierarchy.node(key) {
            Some(node) if volume.intersects_aabb(node.aabb()) => {}
            _ => return ControlFlow::Continue(()),
        }
        hierarchy.touch(key, false, nodes);
        let items = hierarchy.node_scene_nodes(key);
        let children = hierarchy
            .node(key)
            .and_then(|node| node.split())
            .map(|split| split.children);

        for id in items {
            if self.touched.contains(&id) {
                continue;
            }
            let Some(node) = scene.node(id) else {
                continue;
            };
            if !volume.intersects_aabb(node.container_aabb()) {
                continue;
            }
            self.touched.insert(id);
            let descend = self.flags.contains(QueryFlags::RECURSIVE)
                && node.is_container()
                && !node.flags().contains(SceneNodeFlags::NO_RECURSION);
            let pass_through = self.flags.contains(QueryFlags::PORTALS)
                && node.is_cell_portal()
                && !node.flags().contains(SceneNodeFlags::NO_PASS_THROUGH);
            let inverse = *node.inverse_matrix();

            if callback(id).is_break() {
                return ControlFlow::Break(());
            }

            if descend && self.query_container(scene, id, volume.transformed(&inverse), callback).is_break() {
                return ControlFlow::Break(());
            }

            if pass_through {
                if let Some(target) = scene.target_cell_instance(id).filter(|&target| target != container) {
                    if let Some(warp) = scene.warp_matrix(id) {
                        if self.query_container(scene, target, volume.transformed(&warp), callback).is_break() {
                            return ControlFlow::Break(());
                        }
                    }
                }
            }
        }

        for child in children.into_iter().flatten() {
            if self.query_node(scene, container, child, volume, callback).is_break() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }
}

impl SceneQuery for VolumeQuery {
    fn perform_query(
        &mut self,
        scene: &mut Scene,
        container: SceneNodeId,
        callback: &mut QueryCallback<'_>,
    ) -> Result<QueryStatus, QueryError> {
        check_container(scene, container)?;
        self.touched.clear();
        let volume = self.volume.clone();
        let status = QueryStatus::from(self.query_container(scene, container, volume, callback));
        log::debug!(
            "Volume query on {:?} {:?} after {} scene nodes",
            container,
            status,
            self.touched.len()
        );
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
    use crate::foundation::geometry::Plane;
    use approx::assert_relative_eq;

    fn unit_box() -> AABB {
        AABB::new(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn test_volume_box_tests() {
        assert!(QueryVolume::Point(Vec3::new(0.5, 0.5, 0.5)).intersects_aabb(&unit_box()));
        assert!(!QueryVolume::Point(Vec3::new(1.5, 0.5, 0.5)).intersects_aabb(&unit_box()));
        assert!(QueryVolume::Sphere(Sphere::new(Vec3::new(2.0, 0.5, 0.5), 1.01)).intersects_aabb(&unit_box()));
        assert!(!QueryVolume::Sphere(Sphere::new(Vec3::new(2.5, 0.5, 0.5), 1.0)).intersects_aabb(&unit_box()));

        let half_space = PlaneSet::new(vec![Plane::new(Vec3::new(1.0, 0.0, 0.0), -2.0)]);
        assert!(!QueryVolume::PlaneSet(half_space.clone()).intersects_aabb(&unit_box()));
        let shifted = AABB::new(Vec3::new(1.5, 0.0, 0.0), Vec3::new(2.5, 1.0, 1.0));
        assert!(QueryVolume::PlaneSet(half_space).intersects_aabb(&shifted));
    }

    #[test]
    fn test_sphere_through_non_uniform_scale() {
        let scale = Mat4::new_nonuniform_scaling(&Vec3::new(2.0, 1.0, 1.0));
        let QueryVolume::Sphere(sphere) = QueryVolume::Sphere(Sphere::new(Vec3::new(1.0, 0.0, 0.0), 1.0)).transformed(&scale) else {
            panic!("sphere stays a sphere");
        };
        assert_relative_eq!(sphere.center, Vec3::new(2.0, 0.0, 0.0), epsilon = 1e-5);
        assert!(sphere.radius >= 2.0 - 1e-5);
    }

    #[test]
    fn test_point_and_line_map_exactly() {
        let translation = Mat4::new_translation(&Vec3::new(-10.0, 0.0, 0.0));
        assert_eq!(
            QueryVolume::Point(Vec3::new(1.0, 0.0, 0.0)).transformed(&translation),
            QueryVolume::Point(Vec3::new(-9.0, 0.0, 0.0))
        );
        let QueryVolume::Line(line) = QueryVolume::Line(Line::new(Vec3::zeros(), Vec3::new(1.0, 2.0, 3.0))).transformed(&translation) else {
            panic!("line stays a line");
        };
        assert_eq!(line.start, Vec3::new(-10.0, 0.0, 0.0));
        assert_eq!(line.end, Vec3::new(-9.0, 2.0, 3.0));
    }
}
