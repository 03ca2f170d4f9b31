//! Cross-store consistency audit.
//!
//! Compares the groups and users of one source in the relational store with
//! the directory entries under the configured base DNs. Discrepancies are
//! logged and reported; nothing is repaired here. Re-running sync heals a
//! directory-only entry, re-running the deletion heals a relational-only one.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use dirsync_core::dn::normalize_dn;
use dirsync_core::{DirectoryStore, RelationalStore, SyncConfig, SyncError};

const GROUP_OBJECT_CLASS: &str = "groupOfUniqueNames";
const USER_OBJECT_CLASS: &str = "inetOrgPerson";

/// Entries present in only one of the two stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub groups_checked: usize,
    pub users_checked: usize,
    /// DNs with a directory entry but no relational row.
    pub directory_only: Vec<String>,
    /// DNs with a relational row but no directory entry.
    pub relational_only: Vec<String>,
}

impl AuditReport {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.directory_only.is_empty() && self.relational_only.is_empty()
    }
}

/// Runs the consistency audit for one source.
pub struct ConsistencyAuditor {
    directory: Arc<dyn DirectoryStore>,
    relational: Arc<dyn RelationalStore>,
    config: Arc<SyncConfig>,
}

impl ConsistencyAuditor {
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

    #[instrument(skip(self), fields(source = %self.config.source))]
    pub async fn audit(&self) -> Result<AuditReport, SyncError> {
        let mut report = AuditReport::default();

        let groups = self
            .relational
            .list_groups_by_source(&self.config.source)
            .await?;
        let group_dns: Vec<String> = groups.into_iter().map(|g| g.group_dn).collect();
        report.groups_checked = group_dns.len();
        let directory_groups = self
            .directory
            .list_entries(&self.config.group_base_dn, GROUP_OBJECT_CLASS)
            .await?;
        self.compare(
            &group_dns,
            &directory_groups,
            &self.config.group_base_dn,
            EntryKind::Group,
            &mut report,
        )
        .await?;

        let users = self
            .relational
            .list_users_by_source(&self.config.source)
            .await?;
        let user_dns: Vec<String> = users.into_iter().map(|u| u.user_dn).collect();
        report.users_checked = user_dns.len();
        let directory_users = self
            .directory
            .list_entries(&self.config.user_base_dn, USER_OBJECT_CLASS)
            .await?;
        self.compare(
            &user_dns,
            &directory_users,
            &self.config.user_base_dn,
            EntryKind::User,
            &mut report,
        )
        .await?;

        if report.is_consistent() {
            info!(
                groups = report.groups_checked,
                users = report.users_checked,
                "Stores are consistent"
            );
        } else {
            warn!(
                directory_only = report.directory_only.len(),
                relational_only = report.relational_only.len(),
                "Stores are inconsistent"
            );
        }
        Ok(report)
    }

    async fn compare(
        &self,
        relational_dns: &[String],
        directory_dns: &[String],
        base_dn: &str,
        kind: EntryKind,
        report: &mut AuditReport,
    ) -> Result<(), SyncError> {
        let in_relational: HashSet<String> =
            relational_dns.iter().map(|dn| normalize_dn(dn)).collect();
        let in_directory: HashSet<String> =
            directory_dns.iter().map(|dn| normalize_dn(dn)).collect();
        let base = normalize_dn(base_dn);

        for dn in relational_dns {
            if !in_directory.contains(&normalize_dn(dn)) {
                warn!(dn = %dn, kind = kind.as_str(), "Relational row without directory entry");
                report.relational_only.push(dn.clone());
            }
        }

        for dn in directory_dns {
            let key = normalize_dn(dn);
            if key == base || in_relational.contains(&key) {
                continue;
            }
            // Entries owned by another source still have a row.
            let exists = match kind {
                EntryKind::Group => self.relational.group_exists_by_dn(dn).await?,
                EntryKind::User => self.relational.user_exists_by_dn(dn).await?,
            };
            if !exists {
                warn!(dn = %dn, kind = kind.as_str(), "Directory entry without relational row");
                report.directory_only.push(dn.clone());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum EntryKind {
    Group,
    User,
}

impl EntryKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::User => "user",
        }
    }
}

impl std::fmt::Debug for ConsistencyAuditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsistencyAuditor")
            .field("source", &self.config.source)
            .finish_non_exhaustive()
    }
}
