//! Cell portals
//!
//! A cell portal connects the container it lives in with a target cell. The
//! warp matrix maps positions from the portal's container into the target
//! cell: `inverse(world(target)) * world(container)`. Both the resolved target
//! and the warp matrix are cached on the portal; the target is re-resolved
//! after any name or structure change and the warp matrix is rebuilt when a
//! transform along either container chain changed since it was computed.

use crate::foundation::collections::SceneNodeId;
use crate::foundation::geometry::{Line, PlaneSide};
use crate::foundation::math::{Mat4, Transform, Vec3};

use super::node::{SceneNodeFlags, WarpCache};
use super::{Scene, SceneError};

/// Distance a node is pushed past the portal plane when moving through it
const PORTAL_EXIT_OFFSET: f32 = 0.001;

impl Scene {
    /// Resolved target cell of a cell portal
    ///
    /// `None` if `portal` is not a cell portal or its target does not name a
    /// container.
    pub fn target_cell_instance(&mut self, portal: SceneNodeId) -> Option<SceneNodeId> {
        let node = self.nodes.get(portal)?;
        let cell_portal = node.as_cell_portal()?;
        if let Some((target, epoch)) = cell_portal.cached_target {
            if epoch == self.names_epoch {
                return target;
            }
        }

        let target = node
            .container
            .and_then(|container| self.get_by_name(container, &cell_portal.target))
            .filter(|&target| self.nodes.get(target).map_or(false, |node| node.is_container()));
        if target.is_none() {
            log::warn!(
                "Cell portal '{}' has no valid target cell '{}'",
                node.name,
                cell_portal.target
            );
        }

        let epoch = self.names_epoch;
        if let Some(cell_portal) = self.nodes.get_mut(portal).and_then(|node| node.as_cell_portal_mut()) {
            cell_portal.cached_target = Some((target, epoch));
        }
        target
    }

    /// Matrix from the portal's container space into its target cell's space
    pub fn warp_matrix(&mut self, portal: SceneNodeId) -> Option<Mat4> {
        let target = self.target_cell_instance(portal)?;
        let container = self.nodes.get(portal)?.container?;
        let stamp = self.chain_stamp(container).max(self.chain_stamp(target));

        if let Some(cache) = self.nodes.get(portal)?.as_cell_portal()?.cached_warp {
            if cache.target == target && cache.stamp == stamp {
                return Some(cache.matrix);
            }
        }

        let Some(target_inverse) = self.world_matrix(target)?.try_inverse() else {
            log::warn!("Target cell of portal {:?} has a singular transform", portal);
            return None;
        };
        let matrix = target_inverse * self.world_matrix(container)?;

        if let Some(cell_portal) = self.nodes.get_mut(portal).and_then(|node| node.as_cell_portal_mut()) {
            cell_portal.cached_warp = Some(WarpCache { target, stamp, matrix });
        }
        Some(matrix)
    }

    /// Point a cell portal at another target cell
    pub fn set_portal_target(&mut self, portal: SceneNodeId, target: &str) -> Result<(), SceneError> {
        let cell_portal = self
            .nodes
            .get_mut(portal)
            .ok_or(SceneError::UnknownNode)?
            .as_cell_portal_mut()
            .ok_or(SceneError::NotACellPortal)?;
        cell_portal.target = target.to_string();
        cell_portal.cached_target = None;
        cell_portal.cached_warp = None;
        Ok(())
    }

    /// Move a node to `position`, passing through cell portals on the way
    ///
    /// Outside of cells this just sets the position. Inside a cell, crossing an
    /// active portal plane from behind to the front moves the node into the
    /// portal's target cell, warping its transform. Returns the cell entered
    /// that way, if any.
    pub fn move_to(&mut self, id: SceneNodeId, position: Vec3) -> Result<Option<SceneNodeId>, SceneError> {
        let node = self.nodes.get(id).ok_or(SceneError::UnknownNode)?;
        let in_cell = node
            .container
            .and_then(|container| self.nodes.get(container))
            .map_or(false, |container| container.is_cell());
        let Some(container) = node.container.filter(|_| in_cell) else {
            self.set_position(id, position)?;
            return Ok(None);
        };

        let start = node.transform.position;
        let line = Line::new(start, position);
        let portals: Vec<SceneNodeId> = self
            .children(container)
            .iter()
            .copied()
            .filter(|&portal| portal != id)
            .filter(|&portal| {
                self.nodes.get(portal).map_or(false, |node| {
                    node.is_cell_portal()
                        && node.is_active()
                        && !node.flags.contains(SceneNodeFlags::NO_PASS_THROUGH)
                        && node.container_aabb.intersects_line(&line)
                })
            })
            .collect();

        for portal in portals {
            let Some(target) = self.target_cell_instance(portal) else {
                continue;
            };
            let Some(warp) = self.warp_matrix(portal) else {
                continue;
            };
            let Some(portal_node) = self.nodes.get(portal) else {
                continue;
            };
            let Some(plane) = portal_node.as_cell_portal().and_then(|p| p.polygon.plane()) else {
                continue;
            };
            let local = line.transformed(&portal_node.inverse_matrix);
            if plane.side(local.start) != PlaneSide::Behind || plane.side(local.end) == PlaneSide::Behind {
                continue;
            }

            let direction = (position - start).try_normalize(f32::EPSILON).unwrap_or_else(Vec3::zeros);
            let mut transform = self.nodes.get(id).ok_or(SceneError::UnknownNode)?.transform.clone();
            transform.position = position + direction * PORTAL_EXIT_OFFSET;
            let warped = Transform::from_matrix(&(warp * transform.to_matrix()));

            self.set_container(id, target)?;
            self.set_transform(id, warped)?;
            log::debug!("Scene node {:?} moved through portal {:?} into {:?}", id, portal, target);
            return Ok(Some(target));
        }

        self.set_position(id, position)?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::geometry::{Polygon, AABB};
    use crate::foundation::math::{constants, Point3, Quat};
    use crate::scene::node::{SceneNode, NODE_CLASS};
    use approx::assert_relative_eq;

    /// Two cells A at the origin and B at (10, 0, 0), with a portal in A at
    /// x = 5 facing +X that leads to B
    fn two_cells() -> (Scene, SceneNodeId, SceneNodeId, SceneNodeId) {
        let mut scene = Scene::new();
        let root = scene.root();
        let a = scene.insert(root, SceneNode::cell("A")).unwrap();
        let b = scene
            .insert(root, SceneNode::cell("B").with_transform(Transform::from_position(Vec3::new(10.0, 0.0, 0.0))))
            .unwrap();
        let portal = scene
            .insert(
                a,
                SceneNode::cell_portal("ToB", "Parent.B", Polygon::rectangle(4.0, 4.0)).with_transform(
                    Transform::from_position_rotation(
                        Vec3::new(5.0, 0.0, 0.0),
                        Quat::from_axis_angle(&Vec3::y_axis(), constants::HALF_PI),
                    ),
                ),
            )
            .unwrap();
        (scene, a, b, portal)
    }

    #[test]
    fn test_warp_matrix_maps_into_target() {
        let (mut scene, _, b, portal) = two_cells();
        assert_eq!(scene.target_cell_instance(portal), Some(b));

        let warp = scene.warp_matrix(portal).unwrap();
        let warped = warp.transform_point(&Point3::from(Vec3::new(1.0, 0.0, 0.0)));
        assert_relative_eq!(warped.coords, Vec3::new(-9.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_warp_matrix_follows_target_transform() {
        let (mut scene, _, b, portal) = two_cells();
        scene.warp_matrix(portal).unwrap();

        scene.set_position(b, Vec3::new(20.0, 0.0, 0.0)).unwrap();
        let warp = scene.warp_matrix(portal).unwrap();
        let warped = warp.transform_point(&Point3::from(Vec3::new(1.0, 0.0, 0.0)));
        assert_relative_eq!(warped.coords, Vec3::new(-19.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_unresolvable_target() {
        let (mut scene, _, _, portal) = two_cells();
        scene.set_portal_target(portal, "Parent.Nowhere").unwrap();
        assert_eq!(scene.target_cell_instance(portal), None);
        assert!(scene.warp_matrix(portal).is_none());

        let root = scene.root();
        scene.insert(root, SceneNode::cell("Nowhere")).unwrap();
        assert!(scene.target_cell_instance(portal).is_some());
    }

    #[test]
    fn test_move_through_portal() {
        let (mut scene, a, b, _) = two_cells();
        let walker = scene
            .insert(
                a,
                SceneNode::new("Walker", NODE_CLASS)
                    .with_local_aabb(AABB::new(Vec3::new(-0.1, -0.1, -0.1), Vec3::new(0.1, 0.1, 0.1)))
                    .with_transform(Transform::from_position(Vec3::new(4.0, 0.0, 0.0))),
            )
            .unwrap();

        assert_eq!(scene.move_to(walker, Vec3::new(4.5, 0.0, 0.0)).unwrap(), None);
        assert_eq!(scene.move_to(walker, Vec3::new(6.0, 0.0, 0.0)).unwrap(), Some(b));

        let node = scene.node(walker).unwrap();
        assert_eq!(node.container_id(), Some(b));
        assert_relative_eq!(node.transform().position, Vec3::new(-3.999, 0.0, 0.0), epsilon = 1e-4);
        assert!(scene.children(b).contains(&walker));
        assert!(!scene.children(a).contains(&walker));
    }

    #[test]
    fn test_no_pass_through_blocks_movement() {
        let (mut scene, a, _, portal) = two_cells();
        scene.set_flags(portal, SceneNodeFlags::NO_PASS_THROUGH).unwrap();
        let walker = scene
            .insert(a, SceneNode::new("Walker", NODE_CLASS).with_transform(Transform::from_position(Vec3::new(4.0, 0.0, 0.0))))
            .unwrap();

        assert_eq!(scene.move_to(walker, Vec3::new(6.0, 0.0, 0.0)).unwrap(), None);
        assert_eq!(scene.node(walker).unwrap().container_id(), Some(a));
        assert_relative_eq!(scene.node(walker).unwrap().transform().position, Vec3::new(6.0, 0.0, 0.0));
    }
}
