//! Wire types of the Feishu open API.

use serde::Deserialize;

use dirsync_core::{RemoteDepartment, RemoteUser};

/// Every Feishu response carries `code` (0 on success) and `msg`.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

/// Response of the tenant access token endpoint. Unlike the other
/// endpoints the token is not nested under `data`.
#[derive(Debug, Deserialize)]
pub struct TenantTokenResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub tenant_access_token: String,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expire: i64,
}

/// One page of a listing.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub page_token: Option<String>,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Department {
    #[serde(default)]
    pub department_id: String,
    #[serde(default)]
    pub parent_department_id: String,
    #[serde(default)]
    pub name: String,
}

impl From<Department> for RemoteDepartment {
    fn from(d: Department) -> Self {
        Self {
            id: d.department_id,
            parent_id: d.parent_department_id,
            name: d.name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub union_id: String,
    #[serde(default)]
    pub name: String,
    pub nickname: Option<String>,
    pub en_name: Option<String>,
    pub email: Option<String>,
    pub enterprise_email: Option<String>,
    pub mobile: Option<String>,
    pub job_title: Option<String>,
    pub employee_no: Option<String>,
    #[serde(default)]
    pub department_ids: Vec<String>,
}

impl User {
    /// Login name: the local part of the personal mail, then of the
    /// enterprise mail, then the user id.
    #[must_use]
    pub fn username(&self) -> String {
        [self.email.as_deref(), self.enterprise_email.as_deref()]
            .into_iter()
            .flatten()
            .filter_map(|mail| mail.split('@').next())
            .map(str::trim)
            .find(|local| !local.is_empty())
            .unwrap_or(self.user_id.as_str())
            .to_string()
    }
}

impl From<User> for RemoteUser {
    fn from(u: User) -> Self {
        let username = u.username();
        let email = u
            .email
            .filter(|m| !m.trim().is_empty())
            .or(u.enterprise_email);
        Self {
            id: u.user_id,
            union_id: u.union_id,
            username,
            display_name: u.name,
            nickname: u.nickname,
            given_name: u.en_name,
            email,
            mobile: u.mobile,
            job_title: u.job_title,
            employee_no: u.employee_no,
            department_ids: u.department_ids,
        }
    }
}
