//! Configuration system
//!
//! Serializable settings for spatial hierarchies and scenes. Any type
//! implementing [`Config`] can be loaded from and saved to `.toml` or `.ron`
//! files.

use std::path::Path;

pub use serde::{Serialize, Deserialize};

use crate::foundation::geometry::AABB;
use crate::foundation::math::Vec3;
use crate::spatial::HierarchyKind;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    ///
    /// The loaded values are [validated](Config::validate) before they are
    /// returned.
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = Format::of(path)?;
        let contents = std::fs::read_to_string(path)?;

        let config: Self = match format {
            Format::Toml => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?,
            Format::Ron => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the values for consistency
    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Save configuration to file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match Format::of(path)? {
            Format::Toml => toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?,
            Format::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

enum Format {
    Toml,
    Ron,
}

impl Format {
    fn of(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Invalid value
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// # Hierarchy Configuration
///
/// Per-container settings of the spatial hierarchy: which partitioning to use
/// and when a kd-tree node splits or merges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyConfig {
    /// Partitioning scheme
    pub kind: HierarchyKind,
    /// Maximum tree level; nodes on this level never split
    pub max_level: u32,
    /// A leaf with more items than this splits on its next touch
    pub max_items_per_node: usize,
    /// An interior node whose subtree holds at most this many items merges
    ///
    /// Defaults to `max_items_per_node - 1` when unset, which keeps one item of
    /// hysteresis between splitting and merging.
    pub merge_threshold: Option<usize>,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            kind: HierarchyKind::List,
            max_level: 16,
            max_items_per_node: 8,
            merge_threshold: None,
        }
    }
}

impl HierarchyConfig {
    /// Kd-tree configuration with the given limits
    pub fn kd_tree(max_level: u32, max_items_per_node: usize) -> Self {
        Self {
            kind: HierarchyKind::KdTree,
            max_level,
            max_items_per_node,
            merge_threshold: None,
        }
    }

    /// Effective merge threshold
    ///
    /// Never reaches `max_items_per_node`, so a freshly split node does not
    /// merge again on its next touch.
    pub fn merge_threshold(&self) -> usize {
        let limit = self.max_items_per_node.saturating_sub(1);
        self.merge_threshold.map_or(limit, |threshold| threshold.min(limit))
    }
}

impl Config for HierarchyConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_items_per_node == 0 {
            return Err(ConfigError::Invalid("max_items_per_node must be at least 1".to_string()));
        }
        if let Some(threshold) = self.merge_threshold.filter(|&t| t >= self.max_items_per_node) {
            return Err(ConfigError::Invalid(format!(
                "merge_threshold ({}) must be below max_items_per_node ({})",
                threshold, self.max_items_per_node
            )));
        }
        Ok(())
    }
}

/// # Scene Configuration
///
/// Defaults applied when the scene creates containers and their hierarchies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Hierarchy of the root container
    pub root_hierarchy: HierarchyConfig,
    /// Hierarchy given to newly created containers and cells
    pub container_hierarchy: HierarchyConfig,
    /// Bounds given to newly created containers (container space)
    pub container_bounds: AABB,
    /// Create a container's hierarchy the first time it is requested
    ///
    /// When disabled, only containers that had `create_hierarchy` called on
    /// them have a hierarchy, and queries on the others succeed with no
    /// results.
    pub create_hierarchies_on_demand: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            root_hierarchy: HierarchyConfig::default(),
            container_hierarchy: HierarchyConfig::default(),
            container_bounds: AABB::new(
                Vec3::new(-10000.0, -10000.0, -10000.0),
                Vec3::new(10000.0, 10000.0, 10000.0),
            ),
            create_hierarchies_on_demand: true,
        }
    }
}

impl Config for SceneConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.root_hierarchy.validate()?;
        self.container_hierarchy.validate()?;
        let size = self.container_bounds.size();
        if size.x < 0.0 || size.y < 0.0 || size.z < 0.0 {
            return Err(ConfigError::Invalid("container_bounds min exceeds max".to_string()));
        }
        Ok(())
    }
}
