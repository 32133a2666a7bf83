//! Scene queries
//!
//! Queries run against one scene container and report matching scene nodes
//! through a callback. The callback returns [`ControlFlow::Break`] to stop the
//! whole query early.
//!
//! - [`VolumeQuery`] walks the spatial hierarchies with a point, line,
//!   sphere, box or plane set, descending into child containers and through
//!   cell portals. Each scene node is reported at most once per run.
//! - [`NameQuery`], [`ClassNameQuery`] and [`EnumerateQuery`] walk the
//!   container tree directly.
//! - [`CullQuery`] collects the scene nodes visible in a view frustum,
//!   nearest first, looking through cell portals.
//!
//! Queries are reusable. They can be used directly or handed to the scene,
//! which keeps them per container (see [`QueryManager`]).

mod cull;
mod graph;
mod manager;
mod volume;

use std::any::Any;
use std::ops::ControlFlow;

use crate::foundation::collections::SceneNodeId;
use crate::scene::Scene;

pub use cull::{CullQuery, CullStatistics, VisibleNode};
pub use graph::{wildcard_match, ClassNameQuery, EnumerateQuery, NameQuery};
pub use manager::QueryManager;
pub use volume::{QueryVolume, VolumeQuery};

/// Callback receiving each matching scene node
pub type QueryCallback<'a> = dyn FnMut(SceneNodeId) -> ControlFlow<()> + 'a;

/// Outcome of a query run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Every match was reported
    Completed,
    /// The callback stopped the query
    Stopped,
}

impl From<ControlFlow<()>> for QueryStatus {
    fn from(flow: ControlFlow<()>) -> Self {
        match flow {
            ControlFlow::Continue(()) => QueryStatus::Completed,
            ControlFlow::Break(()) => QueryStatus::Stopped,
        }
    }
}

bitflags::bitflags! {
    /// Query traversal flags
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct QueryFlags: u32 {
        /// Descend into child containers
        const RECURSIVE = 1 << 0;
        /// Pass through cell portals
        const PORTALS   = 1 << 1;
    }
}

impl Default for QueryFlags {
    fn default() -> Self {
        QueryFlags::RECURSIVE | QueryFlags::PORTALS
    }
}

/// Query errors
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryError {
    /// Stale or foreign query handle
    #[error("unknown query")]
    UnknownQuery,

    /// The container does not exist or is not a container
    #[error("unknown query container")]
    UnknownContainer,

    /// The query is already running
    #[error("query is already running")]
    QueryBusy,
}

/// Common interface of all scene queries
pub trait SceneQuery: Any {
    /// Run the query on `container`, reporting matches to `callback`
    fn perform_query(
        &mut self,
        scene: &mut Scene,
        container: SceneNodeId,
        callback: &mut QueryCallback<'_>,
    ) -> Result<QueryStatus, QueryError>;

    /// Traversal flags
    fn flags(&self) -> QueryFlags;

    /// Replace the traversal flags
    fn set_flags(&mut self, flags: QueryFlags);

    /// Downcast to Any for type-specific access
    fn as_any(&self) -> &dyn Any;

    /// Downcast to Any for mutable type-specific access
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Fail with [`QueryError::UnknownContainer`] unless `container` is a container
pub(crate) fn check_container(scene: &Scene, container: SceneNodeId) -> Result<(), QueryError> {
    match scene.node(container) {
        Some(node) if node.is_container() => Ok(()),
        _ => Err(QueryError::UnknownContainer),
    }
}
