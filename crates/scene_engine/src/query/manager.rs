//! Query Manager - per container query ownership
//!
//! Each container with queries gets one manager. Queries are stored behind a
//! [`QueryId`] and run through [`Scene::perform_query`]. The manager is
//! dropped together with its last query or with its container.

use std::ops::ControlFlow;

use crate::foundation::collections::{QueryId, SceneNodeId, SlotMap};
use crate::scene::Scene;

use super::{check_container, QueryError, QueryStatus, SceneQuery};

/// Queries created on one container
///
/// A slot holds `None` while its query is running.
#[derive(Default)]
pub struct QueryManager {
    queries: SlotMap<QueryId, Option<Box<dyn SceneQuery>>>,
}

impl QueryManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queries
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// True if no queries are registered
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Query handles
    pub fn ids(&self) -> impl Iterator<Item = QueryId> + '_ {
        self.queries.keys()
    }

    fn insert(&mut self, query: Box<dyn SceneQuery>) -> QueryId {
        self.queries.insert(Some(query))
    }

    fn remove(&mut self, id: QueryId) -> Result<Box<dyn SceneQuery>, QueryError> {
        match self.queries.get(id) {
            None => Err(QueryError::UnknownQuery),
            Some(None) => Err(QueryError::QueryBusy),
            Some(Some(_)) => self.queries.remove(id).flatten().ok_or(QueryError::UnknownQuery),
        }
    }

    fn get(&self, id: QueryId) -> Option<&dyn SceneQuery> {
        self.queries.get(id)?.as_deref()
    }

    fn get_mut(&mut self, id: QueryId) -> Option<&mut (dyn SceneQuery + 'static)> {
        self.queries.get_mut(id)?.as_deref_mut()
    }

    fn take(&mut self, id: QueryId) -> Result<Box<dyn SceneQuery>, QueryError> {
        self.queries
            .get_mut(id)
            .ok_or(QueryError::UnknownQuery)?
            .take()
            .ok_or(QueryError::QueryBusy)
    }

    fn restore(&mut self, id: QueryId, query: Box<dyn SceneQuery>) {
        if let Some(slot) = self.queries.get_mut(id) {
            *slot = Some(query);
        }
    }
}

impl Scene {
    /// Hand `query` to `container` and get its handle back
    pub fn create_query(
        &mut self,
        container: SceneNodeId,
        query: Box<dyn SceneQuery>,
    ) -> Result<QueryId, QueryError> {
        check_container(self, container)?;
        if !self.query_managers.contains_key(container) {
            self.query_managers.insert(container, QueryManager::new());
        }
        let manager = self
            .query_managers
            .get_mut(container)
            .ok_or(QueryError::UnknownContainer)?;
        let id = manager.insert(query);
        log::debug!("Created query {:?} on {:?}", id, container);
        Ok(id)
    }

    /// Remove a query from `container` and hand it back
    ///
    /// The container's manager goes away with its last query.
    pub fn destroy_query(&mut self, container: SceneNodeId, id: QueryId) -> Result<Box<dyn SceneQuery>, QueryError> {
        let manager = self
            .query_managers
            .get_mut(container)
            .ok_or(QueryError::UnknownQuery)?;
        let query = manager.remove(id)?;
        if manager.is_empty() {
            self.query_managers.remove(container);
        }
        log::debug!("Destroyed query {:?} on {:?}", id, container);
        Ok(query)
    }

    /// Query manager of `container`, if it has queries
    pub fn query_manager(&self, container: SceneNodeId) -> Option<&QueryManager> {
        self.query_managers.get(container)
    }

    /// Query by handle
    pub fn query(&self, container: SceneNodeId, id: QueryId) -> Option<&dyn SceneQuery> {
        self.query_managers.get(container)?.get(id)
    }

    /// Mutable query by handle
    pub fn query_mut(&mut self, container: SceneNodeId, id: QueryId) -> Option<&mut (dyn SceneQuery + 'static)> {
        self.query_managers.get_mut(container)?.get_mut(id)
    }

    /// Typed query by handle
    pub fn query_as<T: SceneQuery>(&self, container: SceneNodeId, id: QueryId) -> Option<&T> {
        self.query(container, id)?.as_any().downcast_ref::<T>()
    }

    /// Run a query owned by `container`
    ///
    /// The query is taken out of its slot for the duration of the run, so a
    /// callback asking for the same query sees [`QueryError::QueryBusy`].
    pub fn perform_query(
        &mut self,
        container: SceneNodeId,
        id: QueryId,
        callback: &mut dyn FnMut(SceneNodeId) -> ControlFlow<()>,
    ) -> Result<QueryStatus, QueryError> {
        let mut query = self
            .query_managers
            .get_mut(container)
            .ok_or(QueryError::UnknownQuery)?
            .take(id)?;
        let result = query.perform_query(self, container, callback);
        match self.query_managers.get_mut(container) {
            Some(manager) => manager.restore(id, query),
            None => log::warn!("Query container {:?} vanished while query {:?} was running", container, id),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::EnumerateQuery;

    #[test]
    fn test_take_marks_slot_busy() {
        let mut manager = QueryManager::new();
        let id = manager.insert(Box::new(EnumerateQuery::new()));
        let query = manager.take(id).expect("first take succeeds");
        assert_eq!(manager.take(id).err(), Some(QueryError::QueryBusy));
        assert_eq!(manager.remove(id).err(), Some(QueryError::QueryBusy));
        assert!(manager.get(id).is_none());

        manager.restore(id, query);
        assert!(manager.get(id).is_some());
        assert!(manager.remove(id).is_ok());
        assert!(manager.is_empty());
        assert_eq!(manager.take(id).err(), Some(QueryError::UnknownQuery));
    }
}
