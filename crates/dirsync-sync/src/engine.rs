//! Sync orchestration.
//!
//! A run pulls the full remote listing and creates whatever is missing.
//! Nothing is ever updated or deleted here: existing groups and users are
//! left as they are, and deletions arrive through the event path.
//!
//! Departments are processed in pre-order so a parent row is committed
//! before any child looks it up. Parent lookups go to the relational store
//! each time; there is no per-run snapshot that could go stale.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use dirsync_core::dn::{group_dn, user_dn};
use dirsync_core::{
    build_tree, DataMapper, DepartmentRecord, Group, LookupError, LookupKind, NewGroup, NewUser,
    RemoteDirectory, RemoteUser, SyncConfig, SyncError, SyncPhase, User,
};

use crate::writer::DualStoreWriter;

const GROUP_TYPE: &str = "cn";

/// Outcome of the department phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DepartmentSyncReport {
    /// Departments in the remote listing.
    pub total: usize,
    pub created: usize,
    pub skipped: usize,
    pub created_dns: Vec<String>,
}

/// A user the user phase could not create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserFailure {
    pub username: String,
    pub kind: &'static str,
    pub error: String,
}

/// Outcome of the user phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserSyncReport {
    /// Users in the remote listing.
    pub total: usize,
    pub created: usize,
    pub skipped: usize,
    pub created_dns: Vec<String>,
    pub failures: Vec<UserFailure>,
}

impl UserSyncReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of [`SyncEngine::sync_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FullSyncReport {
    pub departments: DepartmentSyncReport,
    pub users: UserSyncReport,
}

/// Pulls the remote directory into both stores.
pub struct SyncEngine {
    remote: Arc<dyn RemoteDirectory>,
    writer: Arc<DualStoreWriter>,
    mapper: DataMapper,
}

impl SyncEngine {
    pub fn new(remote: Arc<dyn RemoteDirectory>, writer: Arc<DualStoreWriter>) -> Self {
        let mapper = DataMapper::from_config(writer.config());
        Self {
            remote,
            writer,
            mapper,
        }
    }

    fn config(&self) -> &SyncConfig {
        self.writer.config()
    }

    /// Create every remote department that has no group yet.
    ///
    /// Stops at the first failure. Groups created before it stay in place.
    #[instrument(skip(self), fields(source = %self.mapper.source()))]
    pub async fn sync_departments(&self) -> Result<DepartmentSyncReport, SyncError> {
        let departments = self
            .remote
            .get_all_departments()
            .await
            .map_err(|e| SyncError::from(e).in_phase(SyncPhase::Departments, "remote listing"))?;

        let records = self
            .mapper
            .map_departments(&departments)
            .map_err(|e| SyncError::from(e).in_phase(SyncPhase::Departments, "remote listing"))?;

        let tree = build_tree(&self.mapper.root_id(), records)
            .map_err(|e| SyncError::from(e).in_phase(SyncPhase::Departments, "remote listing"))?;
        info!(departments = tree.len(), "Department tree built");

        let mut report = DepartmentSyncReport {
            total: tree.len(),
            ..DepartmentSyncReport::default()
        };

        for record in tree.pre_order() {
            let created = self
                .sync_department(record, tree.root_id())
                .await
                .map_err(|e| e.in_phase(SyncPhase::Departments, &record.name))?;
            match created {
                Some(group) => {
                    report.created += 1;
                    report.created_dns.push(group.group_dn);
                }
                None => report.skipped += 1,
            }
        }

        info!(
            created = report.created,
            skipped = report.skipped,
            "Department sync finished"
        );
        Ok(report)
    }

    async fn sync_department(
        &self,
        record: &DepartmentRecord,
        root_id: &str,
    ) -> Result<Option<Group>, SyncError> {
        let relational = self.writer.relational();

        let (parent_id, parent_dn) = if record.source_dept_parent_id == root_id {
            (None, self.config().group_base_dn.clone())
        } else {
            let parent = relational
                .find_group_by_source_dept_id(&record.source_dept_parent_id)
                .await?
                .ok_or_else(|| {
                    LookupError::new(LookupKind::ParentGroup, &record.source_dept_parent_id)
                })?;
            (Some(parent.id), parent.group_dn)
        };

        let dn = group_dn(&record.name, &parent_dn);
        if relational.group_exists_by_dn(&dn).await? {
            debug!(dn = %dn, "Group exists, skipping");
            return Ok(None);
        }
        if let Some(existing) = relational
            .find_group_by_source_dept_id(&record.source_dept_id)
            .await?
        {
            warn!(
                dn = %dn,
                existing_dn = %existing.group_dn,
                "Department already synced under another DN, skipping"
            );
            return Ok(None);
        }

        let group = NewGroup {
            source_dept_id: record.source_dept_id.clone(),
            source_dept_parent_id: record.source_dept_parent_id.clone(),
            parent_id,
            group_name: record.name.clone(),
            remark: record.name.clone(),
            source: record.source.clone(),
            group_dn: dn,
            group_type: GROUP_TYPE.to_string(),
            creator: self.config().creator.clone(),
        };
        self.writer.create_group(&group).await.map(Some)
    }

    /// Create every remote user that has no row yet.
    ///
    /// Only a failure to fetch the listing fails the phase. A user that
    /// cannot be created is recorded in the report and the rest go on.
    #[instrument(skip(self), fields(source = %self.mapper.source()))]
    pub async fn sync_users(&self) -> Result<UserSyncReport, SyncError> {
        let users = self
            .remote
            .get_all_users()
            .await
            .map_err(|e| SyncError::from(e).in_phase(SyncPhase::Users, "remote listing"))?;

        let mut report = UserSyncReport {
            total: users.len(),
            ..UserSyncReport::default()
        };

        for remote in &users {
            let username = display_username(remote);
            match self.sync_user(remote).await {
                Ok(Some(user)) => {
                    report.created += 1;
                    report.created_dns.push(user.user_dn);
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    let e = e.in_phase(SyncPhase::Users, username);
                    warn!(username = %username, error = %e, "User sync failed");
                    report.failures.push(UserFailure {
                        username: username.to_string(),
                        kind: e.kind(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            created = report.created,
            skipped = report.skipped,
            failed = report.failures.len(),
            "User sync finished"
        );
        Ok(report)
    }

    async fn sync_user(&self, remote: &RemoteUser) -> Result<Option<User>, SyncError> {
        let relational = self.writer.relational();
        let config = self.config();

        let record = self.mapper.map_user(remote)?;

        let roles = relational
            .get_roles_by_ids(&[config.default_role_id])
            .await?;
        if roles.is_empty() {
            return Err(LookupError::new(LookupKind::Role, config.default_role_id.to_string()).into());
        }

        let found = relational
            .get_groups_by_source_dept_ids(&record.source_dept_ids)
            .await?;
        let mut groups: Vec<Group> = Vec::with_capacity(record.source_dept_ids.len());
        for dept_id in &record.source_dept_ids {
            let group = found
                .iter()
                .find(|g| &g.source_dept_id == dept_id)
                .ok_or_else(|| LookupError::new(LookupKind::Department, dept_id))?;
            if !groups.iter().any(|g| g.id == group.id) {
                groups.push(group.clone());
            }
        }
        let departments = groups
            .iter()
            .map(|g| g.group_name.as_str())
            .collect::<Vec<_>>()
            .join(",");

        let dn = user_dn(&record.username, &config.user_base_dn);
        if relational
            .user_exists_by_union_id(&record.source_union_id)
            .await?
            || relational.user_exists_by_dn(&dn).await?
        {
            debug!(dn = %dn, "User exists, skipping");
            return Ok(None);
        }

        let user = NewUser {
            user_dn: dn,
            username: record.username,
            nickname: record.nickname,
            given_name: record.given_name,
            mail: record.mail,
            mobile: record.mobile,
            job_number: record.job_number,
            position: record.position,
            source_user_id: record.source_user_id,
            source_union_id: record.source_union_id,
            departments,
            source: record.source,
            creator: config.creator.clone(),
            password: config.init_password().to_string(),
            group_ids: groups.iter().map(|g| g.id).collect(),
            role_ids: roles.iter().map(|r| r.id).collect(),
        };
        self.writer.create_user(&user, &groups).await.map(Some)
    }

    /// Departments, then users. Users are skipped if departments fail.
    pub async fn sync_all(&self) -> Result<FullSyncReport, SyncError> {
        let departments = self.sync_departments().await?;
        let users = self.sync_users().await?;
        Ok(FullSyncReport { departments, users })
    }
}

/// Best available name for a remote user in reports and logs.
fn display_username(user: &RemoteUser) -> &str {
    [user.username.as_str(), user.id.as_str(), user.union_id.as_str()]
        .into_iter()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or("<unnamed>")
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("source", &self.mapper.source())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_username_fallbacks() {
        let mut user = RemoteUser {
            id: "u1".into(),
            union_id: "on_1".into(),
            ..Default::default()
        };
        assert_eq!(display_username(&user), "u1");

        user.username = "alice".into();
        assert_eq!(display_username(&user), "alice");

        assert_eq!(display_username(&RemoteUser::default()), "<unnamed>");
    }
}
