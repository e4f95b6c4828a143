//! Database module for mirrorwatch.
//!
//! Provides SQLite storage with automatic migrations.

mod store;

pub use store::*;
