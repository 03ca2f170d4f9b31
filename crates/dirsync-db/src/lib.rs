//! # dirsync-db
//!
//! Relational mirror of the synchronized directory.
//!
//! - [`PgStore`]: PostgreSQL via sqlx, schema managed by the embedded
//!   migrations
//! - [`MemoryStore`]: an in-process store with the same uniqueness and
//!   foreign-key rules, used by tests and local runs
//!
//! Both implement [`dirsync_core::RelationalStore`].

pub mod error;
pub mod memory;
pub mod pg;

pub use error::DbError;
pub use memory::MemoryStore;
pub use pg::PgStore;
