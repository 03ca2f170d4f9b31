//! Error taxonomy for the sync engine.
//!
//! - `MappingError`: a remote record is malformed
//! - `LookupError`: an expected parent, department or role is missing locally
//! - `StoreError`: a directory- or relational-store failure, tagged by store
//! - `OperationError`: any failure during a create/delete sequence, annotated
//!   with the phase and entity it happened on
//!
//! `SyncError` is the umbrella type returned by the engine entry points.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Boxed error used as a `#[source]` for foreign client errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// A remote record is missing a required field.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed {record} record{}: missing required field `{field}`", id.as_ref().map(|i| format!(" '{i}'")).unwrap_or_default())]
pub struct MappingError {
    /// Record kind (`department` or `user`).
    pub record: &'static str,
    /// Name of the offending field.
    pub field: &'static str,
    /// External id of the record, when it could be read.
    pub id: Option<String>,
}

impl MappingError {
    #[must_use]
    pub fn new(record: &'static str, field: &'static str, id: Option<&str>) -> Self {
        Self {
            record,
            field,
            id: id.filter(|i| !i.trim().is_empty()).map(str::to_string),
        }
    }
}

/// What kind of local entity a lookup expected to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    ParentGroup,
    Department,
    Role,
    User,
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ParentGroup => "parent group",
            Self::Department => "department",
            Self::Role => "role",
            Self::User => "user",
        };
        f.write_str(s)
    }
}

/// An entity the sync expected to exist in the relational store is missing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} not found: {key}")]
pub struct LookupError {
    pub kind: LookupKind,
    pub key: String,
}

impl LookupError {
    pub fn new(kind: LookupKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
        }
    }
}

/// Which of the two stores an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Directory,
    Relational,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory => f.write_str("directory"),
            Self::Relational => f.write_str("relational"),
        }
    }
}

/// A store-specific failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Directory (LDAP) operation failed.
    #[error("directory store error: {message}")]
    Directory {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Relational (SQL) operation failed.
    #[error("relational store error: {message}")]
    Relational {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The entry or row being created already exists.
    #[error("{store} entry already exists: {key}")]
    AlreadyExists { store: StoreKind, key: String },

    /// The entry or row being modified does not exist.
    #[error("{store} entry not found: {key}")]
    NotFound { store: StoreKind, key: String },
}

impl StoreError {
    pub fn directory(message: impl Into<String>) -> Self {
        Self::Directory {
            message: message.into(),
            source: None,
        }
    }

    pub fn directory_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Directory {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn relational(message: impl Into<String>) -> Self {
        Self::Relational {
            message: message.into(),
            source: None,
        }
    }

    pub fn relational_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Relational {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The store this error belongs to.
    #[must_use]
    pub fn store(&self) -> StoreKind {
        match self {
            Self::Directory { .. } => StoreKind::Directory,
            Self::Relational { .. } => StoreKind::Relational,
            Self::AlreadyExists { store, .. } | Self::NotFound { store, .. } => *store,
        }
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Structural problems in the remote department listing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    /// The record's parent is neither a known record nor the root.
    #[error("record '{id}' references unknown parent '{parent_id}'")]
    OrphanRecord { id: String, parent_id: String },

    /// Two records share an id, or a record reuses the root id.
    #[error("duplicate record id '{id}'")]
    DuplicateId { id: String },

    /// Following parents from this record never reaches the root.
    #[error("parent chain of record '{id}' contains a cycle")]
    Cycle { id: String },
}

/// Failure talking to the external identity source.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote request failed: {0}")]
    Request(String),

    #[error("remote authentication failed: {0}")]
    Auth(String),

    #[error("remote API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("invalid remote payload: {0}")]
    Payload(String),
}

/// The engine phase an operation belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Departments,
    Users,
    Deletion,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Departments => f.write_str("departments"),
            Self::Users => f.write_str("users"),
            Self::Deletion => f.write_str("deletion"),
        }
    }
}

/// A create/delete sequence failed for a named entity.
#[derive(Debug, Error)]
#[error("{phase} phase failed at '{entity}': {source}")]
pub struct OperationError {
    pub phase: SyncPhase,
    pub entity: String,
    pub source: Box<SyncError>,
}

/// Umbrella error for the sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Operation(#[from] OperationError),
}

impl SyncError {
    /// Annotate this error with the phase and entity it happened on.
    ///
    /// Already-annotated errors are returned unchanged so the innermost
    /// entity stays visible.
    #[must_use]
    pub fn in_phase(self, phase: SyncPhase, entity: impl Into<String>) -> Self {
        match self {
            Self::Operation(_) => self,
            other => Self::Operation(OperationError {
                phase,
                entity: entity.into(),
                source: Box::new(other),
            }),
        }
    }

    /// Phase and entity, when the error carries them.
    #[must_use]
    pub fn context(&self) -> Option<(SyncPhase, &str)> {
        match self {
            Self::Operation(op) => Some((op.phase, op.entity.as_str())),
            _ => None,
        }
    }

    /// Short machine-readable kind, used in API responses.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Mapping(_) => "mapping_error",
            Self::Lookup(_) => "lookup_error",
            Self::Store(e) => match e.store() {
                StoreKind::Directory => "directory_store_error",
                StoreKind::Relational => "relational_store_error",
            },
            Self::Tree(_) => "tree_error",
            Self::Remote(_) => "remote_error",
            Self::Operation(_) => "operation_error",
        }
    }

    /// Returns true if re-running the same operation later may succeed.
    ///
    /// The engine never retries by itself; this only informs the caller.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(StoreError::Directory { .. } | StoreError::Relational { .. })
            | Self::Remote(RemoteError::Request(_)) => true,
            Self::Operation(op) => op.source.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_error_names_field() {
        let err = MappingError::new("user", "username", Some("u1"));
        assert_eq!(
            err.to_string(),
            "malformed user record 'u1': missing required field `username`"
        );

        let err = MappingError::new("department", "id", Some("  "));
        assert_eq!(
            err.to_string(),
            "malformed department record: missing required field `id`"
        );
    }

    #[test]
    fn test_store_error_kind() {
        let err = StoreError::directory("bind failed");
        assert_eq!(err.store(), StoreKind::Directory);

        let err = StoreError::NotFound {
            store: StoreKind::Relational,
            key: "42".into(),
        };
        assert_eq!(err.store(), StoreKind::Relational);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "relational entry not found: 42");
    }

    #[test]
    fn test_in_phase_keeps_innermost_entity() {
        let err = SyncError::from(LookupError::new(LookupKind::ParentGroup, "feishu_d1"))
            .in_phase(SyncPhase::Departments, "Engineering")
            .in_phase(SyncPhase::Departments, "Outer");

        let (phase, entity) = err.context().unwrap();
        assert_eq!(phase, SyncPhase::Departments);
        assert_eq!(entity, "Engineering");
        assert_eq!(
            err.to_string(),
            "departments phase failed at 'Engineering': parent group not found: feishu_d1"
        );
    }

    #[test]
    fn test_is_transient() {
        let transient = SyncError::from(StoreError::relational("connection reset"))
            .in_phase(SyncPhase::Users, "alice");
        assert!(transient.is_transient());

        let permanent = SyncError::from(MappingError::new("user", "union_id", None));
        assert!(!permanent.is_transient());
    }

    #[test]
    fn test_kind_distinguishes_stores() {
        assert_eq!(
            SyncError::from(StoreError::directory("x")).kind(),
            "directory_store_error"
        );
        assert_eq!(
            SyncError::from(StoreError::relational("x")).kind(),
            "relational_store_error"
        );
    }
}
