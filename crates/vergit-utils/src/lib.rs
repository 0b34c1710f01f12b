//! Foundation utilities for the vergit object-database reader.

pub mod date;
mod error;

pub use error::UtilError;

/// Convenience result type for utility operations.
pub type Result<T> = std::result::Result<T, UtilError>;
