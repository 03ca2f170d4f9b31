//! Dual-store writes.
//!
//! Write order is fixed per operation:
//!
//! | Operation     | First                                   | Then                 |
//! |---------------|-----------------------------------------|----------------------|
//! | `create_group`| directory entry                         | relational row       |
//! | `create_user` | directory entry, then group memberships | relational row       |
//! | `delete_user` | group memberships, then directory entry | relational row       |
//!
//! A crash between the two halves of a create leaves a directory entry
//! without a relational row. The next sync run finds no row, writes the
//! directory entry again, gets "already exists" and adopts it. A crash in
//! the middle of a delete leaves a relational row without a directory entry;
//! the next delete treats the missing entry as already gone. Either state
//! shows up in the consistency audit until it is healed.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use dirsync_core::{
    DirectoryStore, EntryAttributes, Group, NewGroup, NewUser, RelationalStore, StoreError,
    SyncConfig, SyncError, SyncPhase, User,
};

const GROUP_OBJECT_CLASSES: [&str; 2] = ["top", "groupOfUniqueNames"];
const USER_OBJECT_CLASSES: [&str; 4] = ["top", "person", "organizationalPerson", "inetOrgPerson"];

/// Writes groups and users to the directory and relational stores.
pub struct DualStoreWriter {
    directory: Arc<dyn DirectoryStore>,
    relational: Arc<dyn RelationalStore>,
    config: Arc<SyncConfig>,
}

impl DualStoreWriter {
    pub fn new(
        directory: Arc<dyn DirectoryStore>,
        relational: Arc<dyn RelationalStore>,
        config: Arc<SyncConfig>,
    ) -> Self {
        Self {
            directory,
            relational,
            config,
        }
    }

    #[must_use]
    pub fn directory(&self) -> &dyn DirectoryStore {
        self.directory.as_ref()
    }

    #[must_use]
    pub fn relational(&self) -> &dyn RelationalStore {
        self.relational.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Create a group in both stores.
    #[instrument(skip(self, group), fields(dn = %group.group_dn))]
    pub async fn create_group(&self, group: &NewGroup) -> Result<Group, SyncError> {
        self.write_group(group)
            .await
            .map_err(|e| SyncError::from(e).in_phase(SyncPhase::Departments, &group.group_name))
    }

    async fn write_group(&self, group: &NewGroup) -> Result<Group, StoreError> {
        let attrs = self.group_attributes(group);
        adopt_existing(self.directory.create_entry(&group.group_dn, &attrs).await)?;

        let created = self.relational.create_group(group).await?;
        info!(group_id = created.id, "Group created");
        Ok(created)
    }

    /// Create a user in both stores and add it to `groups` in the directory.
    ///
    /// `groups` must be the groups named by `user.group_ids`.
    #[instrument(skip(self, user, groups), fields(dn = %user.user_dn))]
    pub async fn create_user(&self, user: &NewUser, groups: &[Group]) -> Result<User, SyncError> {
        self.write_user(user, groups)
            .await
            .map_err(|e| SyncError::from(e).in_phase(SyncPhase::Users, &user.username))
    }

    async fn write_user(&self, user: &NewUser, groups: &[Group]) -> Result<User, StoreError> {
        let attrs = user_attributes(user);
        adopt_existing(self.directory.create_entry(&user.user_dn, &attrs).await)?;

        for group in groups {
            self.directory
                .add_member(&group.group_dn, &user.user_dn)
                .await?;
        }

        let created = self.relational.create_user(user).await?;
        info!(user_id = created.id, groups = groups.len(), "User created");
        Ok(created)
    }

    /// Remove a user from both stores.
    ///
    /// Returns `false` when the relational row was already gone, which
    /// happens when two deletions for the same user race.
    #[instrument(skip(self, user), fields(dn = %user.user_dn, user_id = user.id))]
    pub async fn delete_user(&self, user: &User) -> Result<bool, SyncError> {
        self.erase_user(user)
            .await
            .map_err(|e| SyncError::from(e).in_phase(SyncPhase::Deletion, &user.username))
    }

    async fn erase_user(&self, user: &User) -> Result<bool, StoreError> {
        let group_ids = self.relational.get_user_group_ids(user.id).await?;
        let groups = self.relational.get_groups_by_ids(&group_ids).await?;
        for group in &groups {
            match self
                .directory
                .remove_member(&group.group_dn, &user.user_dn)
                .await
            {
                Err(e) if e.is_not_found() => {
                    warn!(group_dn = %group.group_dn, "Group entry missing while removing member");
                }
                other => other?,
            }
        }

        match self.directory.delete_entry(&user.user_dn).await {
            Err(e) if e.is_not_found() => debug!("Directory entry already gone"),
            other => other?,
        }

        let removed = self.relational.delete_users(&[user.id]).await?;
        info!(removed, "User deleted");
        Ok(removed > 0)
    }

    fn group_attributes(&self, group: &NewGroup) -> EntryAttributes {
        EntryAttributes::new()
            .with_values("objectClass", GROUP_OBJECT_CLASSES)
            .with("cn", group.group_name.as_str())
            .with("description", group.remark.as_str())
            .with("uniqueMember", self.config.admin_dn.as_str())
    }
}

fn user_attributes(user: &NewUser) -> EntryAttributes {
    EntryAttributes::new()
        .with_values("objectClass", USER_OBJECT_CLASSES)
        .with("uid", user.username.as_str())
        .with("cn", user.username.as_str())
        .with("sn", user.nickname.as_str())
        .with("givenName", user.given_name.as_str())
        .with("displayName", user.nickname.as_str())
        .with("mail", user.mail.as_str())
        .with("mobile", user.mobile.as_str())
        .with("employeeNumber", user.job_number.as_str())
        .with("businessCategory", user.departments.as_str())
        .with("title", user.position.as_str())
        .with("departmentNumber", user.position.as_str())
        .with("userPassword", user.password.as_str())
}

/// Treat "entry already exists" as success.
fn adopt_existing(result: Result<(), StoreError>) -> Result<(), StoreError> {
    match result {
        Err(e) if e.is_already_exists() => {
            debug!(error = %e, "Adopting existing directory entry");
            Ok(())
        }
        other => other,
    }
}

impl std::fmt::Debug for DualStoreWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualStoreWriter")
            .field("source", &self.config.source)
            .finish_non_exhaustive()
    }
}
