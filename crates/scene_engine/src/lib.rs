//! # Scene Engine
//!
//! Scene graph with spatial hierarchies and scene queries.
//!
//! ## Features
//!
//! - **Scene Graph**: Containers, cells and cell portals addressed by dotted name paths
//! - **Spatial Hierarchies**: Per container list or lazily restructured kd-tree
//! - **Cell Portals**: Warp matrices between cells, moving nodes through portals
//! - **Scene Queries**: Point, line, sphere, box, plane set, name, class and frustum cull queries
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_engine::prelude::*;
//! use std::ops::ControlFlow;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut scene = Scene::new();
//!     let root = scene.root();
//!     let kitchen = scene.insert(root, SceneNode::cell("Kitchen"))?;
//!     scene.insert(
//!         kitchen,
//!         SceneNode::new("Lamp", NODE_CLASS)
//!             .with_local_aabb(AABB::from_center_extents(Vec3::zeros(), Vec3::new(0.5, 0.5, 0.5))),
//!     )?;
//!
//!     let mut query = VolumeQuery::sphere(Vec3::zeros(), 1.0);
//!     query.perform_query(&mut scene, kitchen, &mut |id| {
//!         println!("found {:?}", id);
//!         ControlFlow::Continue(())
//!     })?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod spatial;
pub mod scene;
pub mod query;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, HierarchyConfig, SceneConfig},
        foundation::{
            collections::{QueryId, SceneNodeId},
            geometry::{Line, Plane, PlaneSet, Polygon, Sphere, AABB},
            math::{Mat4, Quat, Transform, Vec3},
        },
        query::{
            ClassNameQuery, CullQuery, EnumerateQuery, NameQuery, QueryError, QueryFlags, QueryStatus, SceneQuery,
            VolumeQuery,
        },
        scene::{Scene, SceneError, SceneNode, SceneNodeFlags, CELL_CLASS, CELL_PORTAL_CLASS, NODE_CLASS},
        spatial::{Hierarchy, HierarchyKind},
    };
}
