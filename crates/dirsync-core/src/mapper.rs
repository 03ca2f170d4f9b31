//! Data Mapper.
//!
//! Source-scopes remote records (`<source>_<id>`) so that two external
//! systems reusing the same id space never collide on natural keys.

use crate::config::SyncConfig;
use crate::error::MappingError;
use crate::model::{DepartmentRecord, RemoteDepartment, RemoteUser, UserRecord};

/// External parent id that marks a top-level department.
pub const REMOTE_ROOT_ID: &str = "0";

/// Maps remote records into their source-scoped form.
#[derive(Debug, Clone)]
pub struct DataMapper {
    source: String,
    mail_domain: Option<String>,
}

impl DataMapper {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            mail_domain: None,
        }
    }

    #[must_use]
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            source: config.source.clone(),
            mail_domain: config.mail_domain.clone(),
        }
    }

    /// Domain used to synthesize a mail address for users without one.
    pub fn with_mail_domain(mut self, domain: impl Into<String>) -> Self {
        self.mail_domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Id of the synthetic root the mapped departments hang from.
    #[must_use]
    pub fn root_id(&self) -> String {
        self.scope(REMOTE_ROOT_ID)
    }

    fn scope(&self, id: &str) -> String {
        format!("{}_{}", self.source, id.trim())
    }

    /// Map one remote department.
    ///
    /// An empty parent id is read as the remote root.
    pub fn map_department(&self, dept: &RemoteDepartment) -> Result<DepartmentRecord, MappingError> {
        let id = required(&dept.id, "department", "id", None)?;
        let name = required(&dept.name, "department", "name", Some(id))?;
        let parent = match dept.parent_id.trim() {
            "" => REMOTE_ROOT_ID,
            p => p,
        };

        Ok(DepartmentRecord {
            source_dept_id: self.scope(id),
            source_dept_parent_id: self.scope(parent),
            name: name.to_string(),
            source: self.source.clone(),
        })
    }

    /// Map a whole listing, failing on the first malformed record.
    pub fn map_departments(
        &self,
        depts: &[RemoteDepartment],
    ) -> Result<Vec<DepartmentRecord>, MappingError> {
        depts.iter().map(|d| self.map_department(d)).collect()
    }

    /// Map one remote user.
    pub fn map_user(&self, user: &RemoteUser) -> Result<UserRecord, MappingError> {
        let id = required(&user.id, "user", "id", None)?;
        let union_id = required(&user.union_id, "user", "union_id", Some(id))?;
        let username = required(&user.username, "user", "username", Some(id))?;

        let dept_ids: Vec<&str> = user
            .department_ids
            .iter()
            .map(|d| d.trim())
            .filter(|d| !d.is_empty())
            .collect();
        if dept_ids.is_empty() {
            return Err(MappingError::new("user", "department_ids", Some(id)));
        }
        // Membership of the remote root has no group behind it.
        let source_dept_ids = dept_ids
            .into_iter()
            .filter(|d| *d != REMOTE_ROOT_ID)
            .map(|d| self.scope(d))
            .collect();

        let display_name = non_empty(Some(user.display_name.as_str())).unwrap_or(username);
        let nickname = non_empty(user.nickname.as_deref()).unwrap_or(display_name);
        let given_name = non_empty(user.given_name.as_deref()).unwrap_or(nickname);
        let mail = match (non_empty(user.email.as_deref()), &self.mail_domain) {
            (Some(mail), _) => mail.to_string(),
            (None, Some(domain)) => format!("{username}@{domain}"),
            (None, None) => String::new(),
        };

        Ok(UserRecord {
            source_user_id: self.scope(id),
            source_union_id: self.scope(union_id),
            username: username.to_string(),
            nickname: nickname.to_string(),
            given_name: given_name.to_string(),
            mail,
            mobile: non_empty(user.mobile.as_deref()).unwrap_or_default().to_string(),
            job_number: non_empty(user.employee_no.as_deref())
                .unwrap_or_default()
                .to_string(),
            position: non_empty(user.job_title.as_deref())
                .unwrap_or_default()
                .to_string(),
            source_dept_ids,
            source: self.source.clone(),
        })
    }

    /// Source-scope a raw union id coming from an event.
    #[must_use]
    pub fn scope_union_id(&self, union_id: &str) -> String {
        self.scope(union_id)
    }
}

fn required<'a>(
    value: &'a str,
    record: &'static str,
    field: &'static str,
    id: Option<&str>,
) -> Result<&'a str, MappingError> {
    non_empty(Some(value)).ok_or_else(|| MappingError::new(record, field, id))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dept(id: &str, parent: &str, name: &str) -> RemoteDepartment {
        RemoteDepartment {
            id: id.into(),
            parent_id: parent.into(),
            name: name.into(),
        }
    }

    fn user() -> RemoteUser {
        RemoteUser {
            id: "u1".into(),
            union_id: "on_abc".into(),
            username: "alice".into(),
            display_name: "Alice Liu".into(),
            department_ids: vec!["d2".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_map_department_scopes_ids() {
        let mapper = DataMapper::new("feishu");
        let record = mapper.map_department(&dept("d2", "d1", "Platform")).unwrap();
        assert_eq!(record.source_dept_id, "feishu_d2");
        assert_eq!(record.source_dept_parent_id, "feishu_d1");
        assert_eq!(record.name, "Platform");
        assert_eq!(record.source, "feishu");
    }

    #[test]
    fn test_top_level_department_points_at_root() {
        let mapper = DataMapper::new("feishu");
        let record = mapper.map_department(&dept("d1", "0", "R&D")).unwrap();
        assert_eq!(record.source_dept_parent_id, mapper.root_id());

        let record = mapper.map_department(&dept("d1", "", "R&D")).unwrap();
        assert_eq!(record.source_dept_parent_id, "feishu_0");
    }

    #[test]
    fn test_sources_do_not_collide() {
        let a = DataMapper::new("feishu").map_department(&dept("1", "0", "x")).unwrap();
        let b = DataMapper::new("dingtalk").map_department(&dept("1", "0", "x")).unwrap();
        assert_ne!(a.source_dept_id, b.source_dept_id);
    }

    #[test]
    fn test_department_missing_name() {
        let err = DataMapper::new("feishu")
            .map_department(&dept("d1", "0", "  "))
            .unwrap_err();
        assert_eq!(err.field, "name");
        assert_eq!(err.id.as_deref(), Some("d1"));
    }

    #[test]
    fn test_map_departments_fails_on_first_bad_record() {
        let err = DataMapper::new("feishu")
            .map_departments(&[dept("d1", "0", "a"), dept("", "0", "b")])
            .unwrap_err();
        assert_eq!(err.field, "id");
    }

    #[test]
    fn test_map_user() {
        let record = DataMapper::new("feishu").map_user(&user()).unwrap();
        assert_eq!(record.source_user_id, "feishu_u1");
        assert_eq!(record.source_union_id, "feishu_on_abc");
        assert_eq!(record.source_dept_ids, vec!["feishu_d2".to_string()]);
        assert_eq!(record.nickname, "Alice Liu");
        assert_eq!(record.given_name, "Alice Liu");
        assert_eq!(record.mail, "");
    }

    #[test]
    fn test_map_user_given_name_fallbacks() {
        let mapper = DataMapper::new("feishu");

        let mut u = user();
        u.nickname = Some("Ally".into());
        assert_eq!(mapper.map_user(&u).unwrap().given_name, "Ally");

        u.given_name = Some("Alice".into());
        let record = mapper.map_user(&u).unwrap();
        assert_eq!(record.given_name, "Alice");
        assert_eq!(record.nickname, "Ally");
    }

    #[test]
    fn test_map_user_drops_root_membership() {
        let mapper = DataMapper::new("feishu");

        let mut u = user();
        u.department_ids = vec!["0".into()];
        assert!(mapper.map_user(&u).unwrap().source_dept_ids.is_empty());

        u.department_ids = vec!["0".into(), "d1".into()];
        assert_eq!(
            mapper.map_user(&u).unwrap().source_dept_ids,
            vec!["feishu_d1".to_string()]
        );
    }

    #[test]
    fn test_map_user_synthesizes_mail() {
        let record = DataMapper::new("feishu")
            .with_mail_domain("example.com")
            .map_user(&user())
            .unwrap();
        assert_eq!(record.mail, "alice@example.com");
    }

    #[test]
    fn test_map_user_missing_fields() {
        let mapper = DataMapper::new("feishu");

        let mut u = user();
        u.union_id = String::new();
        assert_eq!(mapper.map_user(&u).unwrap_err().field, "union_id");

        let mut u = user();
        u.username = " ".into();
        assert_eq!(mapper.map_user(&u).unwrap_err().field, "username");

        let mut u = user();
        u.department_ids = vec![String::new()];
        assert_eq!(mapper.map_user(&u).unwrap_err().field, "department_ids");
    }

    #[test]
    fn test_scope_union_id() {
        assert_eq!(
            DataMapper::new("feishu").scope_union_id("on_abc"),
            "feishu_on_abc"
        );
    }

    #[test]
    fn test_from_config_scopes_by_configured_source() {
        let config = SyncConfig::builder()
            .source("dingtalk")
            .base_dn("dc=example,dc=com")
            .admin_dn("cn=admin,dc=example,dc=com")
            .user_init_password("changeme")
            .build()
            .unwrap();
        let mapper = DataMapper::from_config(&config);

        assert_eq!(mapper.root_id(), "dingtalk_0");
        let record = mapper.map_department(&dept("od-123", "0", "R&D")).unwrap();
        assert_eq!(record.source_dept_id, "dingtalk_od-123");
        assert_eq!(record.source_dept_parent_id, mapper.root_id());
    }
}
