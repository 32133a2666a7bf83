//! Scene graph queries
//!
//! Queries that walk the container tree directly instead of the spatial
//! hierarchies: by name, by class name, and plain enumeration.

use std::any::Any;
use std::ops::ControlFlow;

use crate::foundation::collections::SceneNodeId;
use crate::scene::{Scene, SceneNode, SceneNodeFlags};

use super::{check_container, QueryCallback, QueryError, QueryFlags, QueryStatus, SceneQuery};

/// Match `text` against a pattern with `*` (any run) and `?` (any character)
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

/// Walk the children of `container`, descending into child containers when
/// `flags` asks for it, and report every node accepted by `filter`
fn walk_container(
    scene: &Scene,
    container: SceneNodeId,
    flags: QueryFlags,
    filter: &dyn Fn(&SceneNode) -> bool,
    callback: &mut QueryCallback<'_>,
) -> ControlFlow<()> {
    for &id in scene.children(container) {
        let Some(node) = scene.node(id) else {
            continue;
        };
        if filter(node) && callback(id).is_break() {
            return ControlFlow::Break(());
        }
        if flags.contains(QueryFlags::RECURSIVE)
            && node.is_container()
            && !node.flags().contains(SceneNodeFlags::NO_RECURSION)
            && walk_container(scene, id, flags, filter, callback).is_break()
        {
            return ControlFlow::Break(());
        }
    }
    ControlFlow::Continue(())
}

macro_rules! impl_graph_query {
    ($query:ty, $label:literal) => {
        impl SceneQuery for $query {
            fn perform_query(
                &mut self,
                scene: &mut Scene,
                container: SceneNodeId,
                callback: &mut QueryCallback<'_>,
            ) -> Result<QueryStatus, QueryError> {
                check_container(scene, container)?;
                let filter = |node: &SceneNode| self.accepts(node);
                let status = QueryStatus::from(walk_container(scene, container, self.flags, &filter, callback));
                log::debug!(concat!($label, " query on {:?}: {:?}"), container, status);
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
    };
}

/// Scene nodes whose name matches a wildcard pattern
pub struct NameQuery {
    pattern: String,
    flags: QueryFlags,
}

impl NameQuery {
    /// Query for `pattern`, see [`wildcard_match`]
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            flags: QueryFlags::default(),
        }
    }

    /// Pattern
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Replace the pattern
    pub fn set_pattern(&mut self, pattern: &str) {
        self.pattern = pattern.to_string();
    }

    fn accepts(&self, node: &SceneNode) -> bool {
        wildcard_match(&self.pattern, node.name())
    }
}

impl_graph_query!(NameQuery, "Name");

/// Scene nodes of one class
pub struct ClassNameQuery {
    class_name: String,
    flags: QueryFlags,
}

impl ClassNameQuery {
    /// Query for nodes of class `class_name`
    pub fn new(class_name: &str) -> Self {
        Self {
            class_name: class_name.to_string(),
            flags: QueryFlags::default(),
        }
    }

    /// Class name
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    fn accepts(&self, node: &SceneNode) -> bool {
        node.class_name() == self.class_name
    }
}

impl_graph_query!(ClassNameQuery, "Class name");

/// Every scene node
pub struct EnumerateQuery {
    flags: QueryFlags,
}

impl Default for EnumerateQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl EnumerateQuery {
    /// Enumerate with default flags
    pub fn new() -> Self {
        Self {
            flags: QueryFlags::default(),
        }
    }

    fn accepts(&self, _node: &SceneNode) -> bool {
        true
    }
}

impl_graph_query!(EnumerateQuery, "Enumerate");
