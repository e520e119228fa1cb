//! `SQLite` persistence for seriesdl.
//!
//! Implements the `JobStorePort` from `seriesdl-core` on top of sqlx,
//! plus database setup helpers.

pub mod repositories;
pub mod setup;

pub use repositories::SqliteJobStore;
pub use setup::setup_database;
#[cfg(any(test, feature = "test-utils"))]
pub use setup::setup_test_database;
