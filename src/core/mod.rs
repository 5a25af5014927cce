//! Core foundations
//!
//! This module contains the ambient building blocks of the grid bridge:
//! error handling, configuration and logging setup.

pub mod error;
pub mod config;
pub mod logging;

// Re-export commonly used items
pub use error::{Error, GridDialectError, NativeCause, Result, TupleAlreadyExists};
pub use config::Config;
pub use logging::init_logging;
