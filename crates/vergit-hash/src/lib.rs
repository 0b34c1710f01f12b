//! Object identity for the vergit object-database reader.
//!
//! This crate provides the 20-byte `ObjectId` type, its hex codec, and the
//! fan-out table math used by pack index lookups.

mod error;
pub mod fanout;
pub mod hex;
mod oid;

pub use error::HashError;
pub use fanout::FanoutTable;
pub use oid::ObjectId;
