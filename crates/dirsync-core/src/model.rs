//! Entity model.
//!
//! `Remote*` types are what the external source hands us, `*Record` types
//! are the same data after source-scoping, and `Group`/`User`/`Role` are the
//! persisted rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tree::TreeRecord;

/// A department as listed by the external source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDepartment {
    /// External department id.
    #[serde(default)]
    pub id: String,
    /// External parent id (`0` for top-level departments).
    #[serde(default)]
    pub parent_id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

/// A user as listed by the external source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUser {
    /// External user id.
    #[serde(default)]
    pub id: String,
    /// Cross-application identity, used to correlate deletion events.
    #[serde(default)]
    pub union_id: String,
    /// Login name.
    #[serde(default)]
    pub username: String,
    /// Display name.
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub employee_no: Option<String>,
    /// External department ids the user belongs to.
    #[serde(default)]
    pub department_ids: Vec<String>,
}

/// A department after mapping: ids are source-scoped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepartmentRecord {
    pub source_dept_id: String,
    pub source_dept_parent_id: String,
    pub name: String,
    pub source: String,
}

impl TreeRecord for DepartmentRecord {
    fn record_id(&self) -> &str {
        &self.source_dept_id
    }

    fn parent_record_id(&self) -> &str {
        &self.source_dept_parent_id
    }
}

/// A user after mapping: ids are source-scoped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub source_user_id: String,
    pub source_union_id: String,
    pub username: String,
    pub nickname: String,
    pub given_name: String,
    pub mail: String,
    pub mobile: String,
    pub job_number: String,
    pub position: String,
    /// Source-scoped department ids, in source order.
    pub source_dept_ids: Vec<String>,
    pub source: String,
}

/// A persisted group (department).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Group {
    pub id: i64,
    pub source_dept_id: String,
    pub source_dept_parent_id: String,
    /// Local parent id; `None` for top-level groups.
    pub parent_id: Option<i64>,
    pub group_name: String,
    pub remark: String,
    pub source: String,
    pub group_dn: String,
    pub group_type: String,
    pub creator: String,
    pub created_at: DateTime<Utc>,
}

/// Values for a group row about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGroup {
    pub source_dept_id: String,
    pub source_dept_parent_id: String,
    pub parent_id: Option<i64>,
    pub group_name: String,
    pub remark: String,
    pub source: String,
    pub group_dn: String,
    pub group_type: String,
    pub creator: String,
}

impl NewGroup {
    /// Attach the id and timestamp assigned by the store.
    #[must_use]
    pub fn into_group(self, id: i64, created_at: DateTime<Utc>) -> Group {
        Group {
            id,
            source_dept_id: self.source_dept_id,
            source_dept_parent_id: self.source_dept_parent_id,
            parent_id: self.parent_id,
            group_name: self.group_name,
            remark: self.remark,
            source: self.source,
            group_dn: self.group_dn,
            group_type: self.group_type,
            creator: self.creator,
            created_at,
        }
    }
}

/// A persisted user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct User {
    pub id: i64,
    pub user_dn: String,
    pub username: String,
    pub nickname: String,
    pub given_name: String,
    pub mail: String,
    pub mobile: String,
    pub job_number: String,
    pub position: String,
    pub source_user_id: String,
    pub source_union_id: String,
    /// Group names joined by `,`.
    pub departments: String,
    pub source: String,
    pub creator: String,
    pub created_at: DateTime<Utc>,
}

/// Values for a user row about to be created.
#[derive(Clone, PartialEq, Eq)]
pub struct NewUser {
    pub user_dn: String,
    pub username: String,
    pub nickname: String,
    pub given_name: String,
    pub mail: String,
    pub mobile: String,
    pub job_number: String,
    pub position: String,
    pub source_user_id: String,
    pub source_union_id: String,
    pub departments: String,
    pub source: String,
    pub creator: String,
    /// Initial credential.
    pub password: String,
    /// Local ids of the groups the user joins.
    pub group_ids: Vec<i64>,
    pub role_ids: Vec<i64>,
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("user_dn", &self.user_dn)
            .field("username", &self.username)
            .field("source_union_id", &self.source_union_id)
            .field("departments", &self.departments)
            .field("password", &"***REDACTED***")
            .field("group_ids", &self.group_ids)
            .field("role_ids", &self.role_ids)
            .finish_non_exhaustive()
    }
}

impl NewUser {
    /// Attach the id and timestamp assigned by the store.
    #[must_use]
    pub fn into_user(self, id: i64, created_at: DateTime<Utc>) -> User {
        User {
            id,
            user_dn: self.user_dn,
            username: self.username,
            nickname: self.nickname,
            given_name: self.given_name,
            mail: self.mail,
            mobile: self.mobile,
            job_number: self.job_number,
            position: self.position,
            source_user_id: self.source_user_id,
            source_union_id: self.source_union_id,
            departments: self.departments,
            source: self.source,
            creator: self.creator,
            created_at,
        }
    }
}

/// A role that can be granted to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub keyword: String,
}
