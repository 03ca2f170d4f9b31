//! # dirsync-sync
//!
//! The engine proper. Everything here talks to the outside world only
//! through the `dirsync-core` traits, so it runs unchanged against LDAP and
//! PostgreSQL in production and against the in-memory stores in tests.
//!
//! - [`SyncEngine`]: pulls departments and users from the remote directory
//!   and creates whatever is missing, parents before children
//! - [`DualStoreWriter`]: the only code that writes to both stores, with a
//!   fixed write order per operation
//! - [`Deprovisioner`]: the deletion action behind the webhook and bus paths
//! - [`ConsistencyAuditor`]: reports entries present in one store only

pub mod audit;
pub mod deprovision;
pub mod engine;
pub mod writer;

pub use audit::{AuditReport, ConsistencyAuditor};
pub use deprovision::Deprovisioner;
pub use engine::{DepartmentSyncReport, FullSyncReport, SyncEngine, UserFailure, UserSyncReport};
pub use writer::DualStoreWriter;
