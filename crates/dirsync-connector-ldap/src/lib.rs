//! # dirsync-connector-ldap
//!
//! Directory store implementations for dirsync.
//!
//! [`LdapDirectory`] talks to an LDAP server through `ldap3`, keeping one
//! bound connection cached. [`MemoryDirectory`] keeps a DN-keyed tree in
//! memory with the same result semantics and is used by tests.

pub mod config;
pub mod connector;
pub mod memory;

pub use config::{LdapConfig, LdapConfigError};
pub use connector::LdapDirectory;
pub use memory::MemoryDirectory;
