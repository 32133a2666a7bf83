//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Math types and the node [`math::Transform`]
//! - Geometric primitives and intersection tests
//! - Generational handle types for the scene and hierarchy arenas
//! - Logging utilities

pub mod math;
pub mod geometry;
pub mod collections;
pub mod logging;
