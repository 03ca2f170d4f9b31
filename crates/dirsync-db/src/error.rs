//! Setup errors for the relational store.
//!
//! Query failures are reported as `dirsync_core::StoreError` through the
//! `RelationalStore` trait. This type only covers opening the pool and
//! applying the schema.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("cannot open PostgreSQL pool: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("schema migration failed: {0}")]
    Migrate(#[source] sqlx::migrate::MigrateError),
}
