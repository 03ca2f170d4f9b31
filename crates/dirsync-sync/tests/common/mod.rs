//! Shared fixtures: a scripted remote directory and an engine wired to the
//! in-memory stores.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex, Once};

use dirsync_connector_ldap::MemoryDirectory;
use dirsync_core::{RemoteDepartment, RemoteDirectory, RemoteError, RemoteUser, SyncConfig};
use dirsync_db::MemoryStore;
use dirsync_sync::{ConsistencyAuditor, Deprovisioner, DualStoreWriter, SyncEngine};

pub const BASE_DN: &str = "dc=example,dc=com";
pub const USER_BASE_DN: &str = "ou=people,dc=example,dc=com";
pub const ADMIN_DN: &str = "cn=admin,dc=example,dc=com";

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

/// Remote directory returning whatever the test put in it.
#[derive(Default)]
pub struct ScriptedRemote {
    departments: Mutex<Vec<RemoteDepartment>>,
    users: Mutex<Vec<RemoteUser>>,
    unavailable: Mutex<bool>,
}

impl ScriptedRemote {
    pub fn set_departments(&self, departments: Vec<RemoteDepartment>) {
        *self.departments.lock().unwrap() = departments;
    }

    pub fn set_users(&self, users: Vec<RemoteUser>) {
        *self.users.lock().unwrap() = users;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    fn check(&self) -> Result<(), RemoteError> {
        if *self.unavailable.lock().unwrap() {
            return Err(RemoteError::Request("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteDirectory for ScriptedRemote {
    async fn get_all_departments(&self) -> Result<Vec<RemoteDepartment>, RemoteError> {
        self.check()?;
        Ok(self.departments.lock().unwrap().clone())
    }

    async fn get_all_users(&self) -> Result<Vec<RemoteUser>, RemoteError> {
        self.check()?;
        Ok(self.users.lock().unwrap().clone())
    }
}

pub fn dept(id: &str, parent: &str, name: &str) -> RemoteDepartment {
    RemoteDepartment {
        id: id.into(),
        parent_id: parent.into(),
        name: name.into(),
    }
}

pub fn user(id: &str, username: &str, departments: &[&str]) -> RemoteUser {
    RemoteUser {
        id: id.into(),
        union_id: format!("on_{id}"),
        username: username.into(),
        display_name: format!("{username} display"),
        email: Some(format!("{username}@example.com")),
        department_ids: departments.iter().map(|d| d.to_string()).collect(),
        ..Default::default()
    }
}

/// Everything a test needs, sharing one pair of stores.
pub struct Harness {
    pub remote: Arc<ScriptedRemote>,
    pub directory: Arc<MemoryDirectory>,
    pub store: Arc<MemoryStore>,
    pub config: Arc<SyncConfig>,
    pub writer: Arc<DualStoreWriter>,
    pub engine: SyncEngine,
    pub deprovisioner: Arc<Deprovisioner>,
    pub auditor: ConsistencyAuditor,
}

impl Harness {
    pub fn new() -> Self {
        init_test_logging();

        let config = Arc::new(
            SyncConfig::builder()
                .base_dn(BASE_DN)
                .user_base_dn(USER_BASE_DN)
                .admin_dn(ADMIN_DN)
                .user_init_password("changeme")
                .build()
                .unwrap(),
        );
        let remote = Arc::new(ScriptedRemote::default());
        let directory = Arc::new(MemoryDirectory::with_base_entries([BASE_DN, USER_BASE_DN]));
        let store = Arc::new(MemoryStore::new());

        let writer = Arc::new(DualStoreWriter::new(
            directory.clone(),
            store.clone(),
            config.clone(),
        ));
        let engine = SyncEngine::new(remote.clone(), writer.clone());
        let deprovisioner = Arc::new(Deprovisioner::new(writer.clone()));
        let auditor = ConsistencyAuditor::new(directory.clone(), store.clone(), config.clone());

        Self {
            remote,
            directory,
            store,
            config,
            writer,
            engine,
            deprovisioner,
            auditor,
        }
    }

    /// Harness with the two-level `R&D / Platform` tree and one user in Platform.
    pub fn with_basic_org() -> Self {
        let harness = Self::new();
        harness.remote.set_departments(vec![
            dept("d1", "0", "R&D"),
            dept("d2", "d1", "Platform"),
        ]);
        harness.remote.set_users(vec![user("u1", "alice", &["d2"])]);
        harness
    }

    /// Combined write count of both stores.
    pub fn writes(&self) -> (u64, u64) {
        (self.directory.write_count(), self.store.write_count())
    }
}
