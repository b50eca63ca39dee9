//! amsha-core: Core types and utilities for the amsha crew toolkit
//!
//! Provides:
//! - The workspace-wide `Error`/`Result` pair
//! - Environment configuration loading
//! - Shared JSON map helpers

pub mod config;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{merge_map, object_to_map, map_to_object, JsonMap};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::JsonMap;
}
