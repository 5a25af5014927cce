//! Type definitions for column values
//!
//! This module contains the dynamically typed value carried by tuples and
//! keys, and the codec contract dialects use to override value storage.

/// Column value types
pub mod value;
/// Value codecs
pub mod grid_type;

// Re-export commonly used types for convenience
pub use value::{Value, ValueKind};
pub use grid_type::{Base64BytesType, GridType};
