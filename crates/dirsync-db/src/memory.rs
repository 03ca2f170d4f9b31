//! In-memory relational store.
//!
//! Enforces the same constraints as the PostgreSQL schema: unique
//! `source_dept_id`, `group_dn`, `user_dn` and `source_union_id`, existing
//! parent groups, and existing groups and roles for user links. Deleting a
//! user drops its membership and role links.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

use dirsync_core::dn::normalize_dn;
use dirsync_core::{Group, NewGroup, NewUser, RelationalStore, Role, StoreError, StoreKind, User};

#[derive(Debug, Default)]
struct Inner {
    groups: BTreeMap<i64, Group>,
    users: BTreeMap<i64, User>,
    roles: BTreeMap<i64, Role>,
    /// (group_id, user_id)
    members: BTreeSet<(i64, i64)>,
    /// (user_id, role_id)
    user_roles: BTreeSet<(i64, i64)>,
    next_group_id: i64,
    next_user_id: i64,
}

/// Relational store kept in process memory.
#[derive(Debug)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    writes: AtomicU64,
    read_only: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store seeded with the `admin` (1) and `user` (2) roles.
    #[must_use]
    pub fn new() -> Self {
        let mut inner = Inner {
            next_group_id: 1,
            next_user_id: 1,
            ..Inner::default()
        };
        for (id, name, keyword) in [(1, "Administrator", "admin"), (2, "Member", "user")] {
            inner.roles.insert(
                id,
                Role {
                    id,
                    name: name.to_string(),
                    keyword: keyword.to_string(),
                },
            );
        }
        Self {
            inner: RwLock::new(inner),
            writes: AtomicU64::new(0),
            read_only: AtomicBool::new(false),
        }
    }

    /// Number of mutations applied so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every mutation fail with a relational store error.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Group ids a user is linked to, straight from the link table.
    pub async fn member_group_ids(&self, user_id: i64) -> Vec<i64> {
        let inner = self.inner.read().await;
        inner
            .members
            .iter()
            .filter(|(_, u)| *u == user_id)
            .map(|(g, _)| *g)
            .collect()
    }

    /// Role ids granted to a user.
    pub async fn user_role_ids(&self, user_id: i64) -> Vec<i64> {
        let inner = self.inner.read().await;
        inner
            .user_roles
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, r)| *r)
            .collect()
    }

    pub async fn group_count(&self) -> usize {
        self.inner.read().await.groups.len()
    }

    pub async fn user_count(&self) -> usize {
        self.inner.read().await.users.len()
    }

    fn check_writable(&self, key: &str) -> Result<(), StoreError> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StoreError::relational(format!(
                "store is read-only, cannot write {key}"
            )));
        }
        Ok(())
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn already_exists(key: &str) -> StoreError {
    StoreError::AlreadyExists {
        store: StoreKind::Relational,
        key: key.to_string(),
    }
}

fn same_dn(a: &str, b: &str) -> bool {
    normalize_dn(a) == normalize_dn(b)
}

#[async_trait]
impl RelationalStore for MemoryStore {
    async fn find_group_by_source_dept_id(
        &self,
        source_dept_id: &str,
    ) -> Result<Option<Group>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .groups
            .values()
            .find(|g| g.source_dept_id == source_dept_id)
            .cloned())
    }

    async fn group_exists_by_dn(&self, group_dn: &str) -> Result<bool, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .groups
            .values()
            .any(|g| same_dn(&g.group_dn, group_dn)))
    }

    async fn get_groups_by_source_dept_ids(
        &self,
        source_dept_ids: &[String],
    ) -> Result<Vec<Group>, StoreError> {
        let wanted: HashSet<&str> = source_dept_ids.iter().map(String::as_str).collect();
        let inner = self.inner.read().await;
        Ok(inner
            .groups
            .values()
            .filter(|g| wanted.contains(g.source_dept_id.as_str()))
            .cloned()
            .collect())
    }

    async fn get_groups_by_ids(&self, ids: &[i64]) -> Result<Vec<Group>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .groups
            .values()
            .filter(|g| ids.contains(&g.id))
            .cloned()
            .collect())
    }

    async fn list_groups_by_source(&self, source: &str) -> Result<Vec<Group>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .groups
            .values()
            .filter(|g| g.source == source)
            .cloned()
            .collect())
    }

    async fn create_group(&self, group: &NewGroup) -> Result<Group, StoreError> {
        self.check_writable(&group.group_dn)?;
        let mut inner = self.inner.write().await;

        if inner
            .groups
            .values()
            .any(|g| g.source_dept_id == group.source_dept_id)
        {
            return Err(already_exists(&group.source_dept_id));
        }
        if inner
            .groups
            .values()
            .any(|g| same_dn(&g.group_dn, &group.group_dn))
        {
            return Err(already_exists(&group.group_dn));
        }
        if let Some(parent_id) = group.parent_id {
            if !inner.groups.contains_key(&parent_id) {
                return Err(StoreError::relational(format!(
                    "parent group {parent_id} does not exist"
                )));
            }
        }

        let id = inner.next_group_id;
        inner.next_group_id += 1;
        let created = group.clone().into_group(id, Utc::now());
        inner.groups.insert(id, created.clone());
        self.record_write();
        Ok(created)
    }

    async fn find_user_by_union_id(
        &self,
        source_union_id: &str,
    ) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|u| u.source_union_id == source_union_id)
            .cloned())
    }

    async fn user_exists_by_union_id(&self, source_union_id: &str) -> Result<bool, StoreError> {
        Ok(self.find_user_by_union_id(source_union_id).await?.is_some())
    }

    async fn find_user_by_dn(&self, user_dn: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|u| same_dn(&u.user_dn, user_dn))
            .cloned())
    }

    async fn user_exists_by_dn(&self, user_dn: &str) -> Result<bool, StoreError> {
        Ok(self.find_user_by_dn(user_dn).await?.is_some())
    }

    async fn list_users_by_source(&self, source: &str) -> Result<Vec<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .filter(|u| u.source == source)
            .cloned()
            .collect())
    }

    async fn get_user_group_ids(&self, user_id: i64) -> Result<Vec<i64>, StoreError> {
        Ok(self.member_group_ids(user_id).await)
    }

    async fn create_user(&self, user: &NewUser) -> Result<User, StoreError> {
        self.check_writable(&user.user_dn)?;
        let mut inner = self.inner.write().await;

        if inner
            .users
            .values()
            .any(|u| u.source_union_id == user.source_union_id)
        {
            return Err(already_exists(&user.source_union_id));
        }
        if inner
            .users
            .values()
            .any(|u| same_dn(&u.user_dn, &user.user_dn))
        {
            return Err(already_exists(&user.user_dn));
        }
        if let Some(missing) = user
            .group_ids
            .iter()
            .find(|id| !inner.groups.contains_key(*id))
        {
            return Err(StoreError::relational(format!(
                "group {missing} does not exist"
            )));
        }
        if let Some(missing) = user.role_ids.iter().find(|id| !inner.roles.contains_key(*id)) {
            return Err(StoreError::relational(format!(
                "role {missing} does not exist"
            )));
        }

        let id = inner.next_user_id;
        inner.next_user_id += 1;
        for group_id in &user.group_ids {
            inner.members.insert((*group_id, id));
        }
        for role_id in &user.role_ids {
            inner.user_roles.insert((id, *role_id));
        }
        let created = user.clone().into_user(id, Utc::now());
        inner.users.insert(id, created.clone());
        self.record_write();
        Ok(created)
    }

    async fn delete_users(&self, ids: &[i64]) -> Result<u64, StoreError> {
        self.check_writable(&format!("users {ids:?}"))?;
        let mut inner = self.inner.write().await;

        let mut removed = 0;
        for id in ids {
            if inner.users.remove(id).is_some() {
                removed += 1;
            }
        }
        inner.members.retain(|(_, u)| !ids.contains(u));
        inner.user_roles.retain(|(u, _)| !ids.contains(u));

        if removed > 0 {
            self.record_write();
        }
        Ok(removed)
    }

    async fn get_roles_by_ids(&self, ids: &[i64]) -> Result<Vec<Role>, StoreError> {
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.roles.get(id).cloned())
            .collect())
    }
}
