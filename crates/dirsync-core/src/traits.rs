//! Contracts for the collaborators the engine talks to.
//!
//! The engine only ever sees these traits, so the LDAP, SQL and HTTP
//! implementations can be swapped for in-memory ones in tests.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::{RemoteError, StoreError};
use crate::model::{Group, NewGroup, NewUser, RemoteDepartment, RemoteUser, Role, User};

/// The external identity source (HR / organization API).
#[async_trait]
pub trait RemoteDirectory: Send + Sync {
    /// All departments, flat, in any order.
    async fn get_all_departments(&self) -> Result<Vec<RemoteDepartment>, RemoteError>;

    /// All users, each with the departments they belong to.
    async fn get_all_users(&self) -> Result<Vec<RemoteUser>, RemoteError>;
}

/// Attributes of a directory entry. Attribute names keep their case; values
/// are kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryAttributes {
    attrs: BTreeMap<String, Vec<String>>,
}

impl EntryAttributes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value; empty values are dropped.
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    /// Add several values.
    pub fn with_values<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for value in values {
            self.push(name, value);
        }
        self
    }

    pub fn push(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            return;
        }
        self.attrs.entry(name.to_string()).or_default().push(value);
    }

    /// Values of an attribute, matched case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// First value of an attribute.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

/// The hierarchical directory store (LDAP), addressed by DN.
///
/// `create_entry` reports an existing DN as `StoreError::AlreadyExists`;
/// `delete_entry` reports a missing DN as `StoreError::NotFound`. Callers
/// decide whether those are failures.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn create_entry(&self, dn: &str, attrs: &EntryAttributes) -> Result<(), StoreError>;

    async fn delete_entry(&self, dn: &str) -> Result<(), StoreError>;

    /// Add `member_dn` to the group's `uniqueMember` values.
    async fn add_member(&self, group_dn: &str, member_dn: &str) -> Result<(), StoreError>;

    /// Remove `member_dn` from the group's `uniqueMember` values.
    async fn remove_member(&self, group_dn: &str, member_dn: &str) -> Result<(), StoreError>;

    async fn entry_exists(&self, dn: &str) -> Result<bool, StoreError>;

    /// DNs of all entries of `object_class` at or below `base_dn`.
    async fn list_entries(&self, base_dn: &str, object_class: &str)
        -> Result<Vec<String>, StoreError>;
}

/// The relational mirror.
///
/// Reads must observe every write committed before them; implementations
/// do not cache.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn find_group_by_source_dept_id(
        &self,
        source_dept_id: &str,
    ) -> Result<Option<Group>, StoreError>;

    async fn group_exists_by_dn(&self, group_dn: &str) -> Result<bool, StoreError>;

    /// Groups matching any of the given source-scoped ids, in no particular order.
    async fn get_groups_by_source_dept_ids(
        &self,
        source_dept_ids: &[String],
    ) -> Result<Vec<Group>, StoreError>;

    async fn get_groups_by_ids(&self, ids: &[i64]) -> Result<Vec<Group>, StoreError>;

    async fn list_groups_by_source(&self, source: &str) -> Result<Vec<Group>, StoreError>;

    async fn create_group(&self, group: &NewGroup) -> Result<Group, StoreError>;

    async fn find_user_by_union_id(
        &self,
        source_union_id: &str,
    ) -> Result<Option<User>, StoreError>;

    async fn user_exists_by_union_id(&self, source_union_id: &str) -> Result<bool, StoreError>;

    async fn find_user_by_dn(&self, user_dn: &str) -> Result<Option<User>, StoreError>;

    async fn user_exists_by_dn(&self, user_dn: &str) -> Result<bool, StoreError>;

    async fn list_users_by_source(&self, source: &str) -> Result<Vec<User>, StoreError>;

    /// Ids of the groups a user belongs to.
    async fn get_user_group_ids(&self, user_id: i64) -> Result<Vec<i64>, StoreError>;

    /// Create the user row together with its group and role links.
    async fn create_user(&self, user: &NewUser) -> Result<User, StoreError>;

    /// Delete users (and their links) by id. Returns the number of rows removed.
    async fn delete_users(&self, ids: &[i64]) -> Result<u64, StoreError>;

    async fn get_roles_by_ids(&self, ids: &[i64]) -> Result<Vec<Role>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_attributes_drop_empty_values() {
        let attrs = EntryAttributes::new()
            .with("cn", "alice")
            .with("mail", "")
            .with_values("objectClass", ["top", "inetOrgPerson"]);

        assert_eq!(attrs.len(), 2);
        assert!(attrs.get("mail").is_none());
        assert_eq!(attrs.first("CN"), Some("alice"));
        assert_eq!(
            attrs.get("objectclass").unwrap(),
            &["top".to_string(), "inetOrgPerson".to_string()]
        );
    }
}
