//! Bookmark persistence for the tursotap engine.
//!
//! Provides the [`StateBackend`] trait with a [`SqliteStateBackend`] and a
//! Singer-style [`FileStateBackend`] implementation.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod file;
pub mod sqlite;

pub use backend::StateBackend;
pub use error::StateError;
pub use file::FileStateBackend;
pub use sqlite::SqliteStateBackend;
