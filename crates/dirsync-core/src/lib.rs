//! # dirsync-core
//!
//! Shared building blocks for the dirsync engine.
//!
//! - **Model**: remote records, mapped records and the persisted `Group`,
//!   `User` and `Role` entities
//! - **Tree Builder**: turns a flat department listing into a rooted hierarchy
//! - **Data Mapper**: source-scopes remote records so several external
//!   systems can share the same stores
//! - **Contracts**: `RemoteDirectory`, `DirectoryStore` and `RelationalStore`
//!   traits implemented by the connector and database crates
//! - **Errors**: the `SyncError` taxonomy used by every other crate
//!
//! ## Example
//!
//! ```
//! use dirsync_core::tree::{build_tree, TreeRecord};
//!
//! struct Dept(&'static str, &'static str);
//!
//! impl TreeRecord for Dept {
//!     fn record_id(&self) -> &str { self.0 }
//!     fn parent_record_id(&self) -> &str { self.1 }
//! }
//!
//! let tree = build_tree("root", vec![Dept("b", "a"), Dept("a", "root")]).unwrap();
//! assert_eq!(tree.children().len(), 1);
//! assert_eq!(tree.children()[0].children[0].record.0, "b");
//! ```

pub mod config;
pub mod dn;
pub mod error;
pub mod mapper;
pub mod model;
pub mod traits;
pub mod tree;

pub use config::{ConfigError, SyncConfig, SyncConfigBuilder};
pub use error::{
    LookupError, LookupKind, MappingError, OperationError, RemoteError, StoreError, StoreKind,
    SyncError, SyncPhase, SyncResult, TreeError,
};
pub use mapper::DataMapper;
pub use model::{
    DepartmentRecord, Group, NewGroup, NewUser, RemoteDepartment, RemoteUser, Role, User,
    UserRecord,
};
pub use traits::{DirectoryStore, EntryAttributes, RelationalStore, RemoteDirectory};
pub use tree::{build_tree, Tree, TreeNode, TreeRecord};
