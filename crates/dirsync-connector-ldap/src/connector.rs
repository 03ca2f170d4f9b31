//! LDAP directory store.
//!
//! Implements `DirectoryStore` over `ldap3`. One bound connection is cached
//! and shared; a transport error drops it so the next call reconnects.

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, LdapResult, Mod, Scope, SearchEntry};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use dirsync_core::{DirectoryStore, EntryAttributes, StoreError, StoreKind};

use crate::config::LdapConfig;

const RC_SUCCESS: u32 = 0;
const RC_NO_SUCH_ATTRIBUTE: u32 = 16;
const RC_ATTRIBUTE_OR_VALUE_EXISTS: u32 = 20;
const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INVALID_CREDENTIALS: u32 = 49;
const RC_ALREADY_EXISTS: u32 = 68;

const MEMBER_ATTRIBUTE: &str = "uniqueMember";

/// Directory store backed by an LDAP server.
pub struct LdapDirectory {
    config: LdapConfig,

    /// Cached LDAP connection (lazily initialized).
    connection: Arc<RwLock<Option<Ldap>>>,
}

impl LdapDirectory {
    /// Create a new directory store with the given configuration.
    pub fn new(config: LdapConfig) -> Result<Self, StoreError> {
        config
            .validate()
            .map_err(|e| StoreError::directory_with_source("invalid LDAP configuration", e))?;

        Ok(Self {
            config,
            connection: Arc::new(RwLock::new(None)),
        })
    }

    /// Get an LDAP connection, creating one if necessary.
    async fn get_connection(&self) -> Result<Ldap, StoreError> {
        {
            let conn_guard = self.connection.read().await;
            if let Some(ref conn) = *conn_guard {
                return Ok(conn.clone());
            }
        }

        let conn = self.create_connection().await?;
        *self.connection.write().await = Some(conn.clone());
        Ok(conn)
    }

    /// Forget the cached connection after a transport failure.
    async fn reset_connection(&self) {
        self.connection.write().await.take();
    }

    async fn create_connection(&self) -> Result<Ldap, StoreError> {
        let url = self.config.url();
        debug!(url = %url, "Connecting to LDAP server");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.config.connect_timeout())
            .set_starttls(self.config.use_starttls);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| {
                StoreError::directory_with_source(
                    format!("Failed to connect to LDAP server at {url}"),
                    e,
                )
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        let bind_dn = &self.config.bind_dn;
        debug!(bind_dn = %bind_dn, "Performing LDAP bind");

        let result = ldap
            .simple_bind(bind_dn, self.config.password())
            .await
            .map_err(|e| {
                StoreError::directory_with_source(format!("LDAP bind failed for {bind_dn}"), e)
            })?;

        if result.rc != RC_SUCCESS {
            if result.rc == RC_INVALID_CREDENTIALS {
                return Err(StoreError::directory(format!(
                    "invalid credentials for {bind_dn}"
                )));
            }
            return Err(StoreError::directory(format!(
                "LDAP bind failed with code {}: {}",
                result.rc, result.text
            )));
        }

        info!(host = %self.config.host, "LDAP connection established successfully");
        Ok(ldap)
    }

    /// Wrap a transport error, dropping the cached connection.
    async fn transport_error(&self, context: String, err: LdapError) -> StoreError {
        self.reset_connection().await;
        StoreError::directory_with_source(context, err)
    }

    /// Verify the server is reachable and `base_dn` readable.
    #[instrument(skip(self))]
    pub async fn test_connection(&self, base_dn: &str) -> Result<(), StoreError> {
        if !self.entry_exists(base_dn).await? {
            return Err(StoreError::NotFound {
                store: StoreKind::Directory,
                key: base_dn.to_string(),
            });
        }
        info!("LDAP connection test successful");
        Ok(())
    }

    /// Unbind and drop the cached connection.
    pub async fn dispose(&self) {
        if let Some(mut ldap) = self.connection.write().await.take() {
            if let Err(e) = ldap.unbind().await {
                warn!(error = %e, "LDAP unbind failed");
            }
        }
    }
}

fn not_found(dn: &str) -> StoreError {
    StoreError::NotFound {
        store: StoreKind::Directory,
        key: dn.to_string(),
    }
}

fn unexpected(op: &str, dn: &str, result: &LdapResult) -> StoreError {
    StoreError::directory(format!(
        "LDAP {op} of {dn} failed with code {}: {}",
        result.rc, result.text
    ))
}

/// Escape special characters in LDAP filter values (RFC 4515).
fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

#[async_trait]
impl DirectoryStore for LdapDirectory {
    #[instrument(skip(self, attrs))]
    async fn create_entry(&self, dn: &str, attrs: &EntryAttributes) -> Result<(), StoreError> {
        let mut ldap = self.get_connection().await?;
        debug!(dn = %dn, attributes = attrs.len(), "Creating LDAP entry");

        let ldap_attrs: Vec<(&str, HashSet<&str>)> = attrs
            .iter()
            .map(|(name, values)| (name, values.iter().map(String::as_str).collect()))
            .collect();

        let result = match ldap.add(dn, ldap_attrs).await {
            Ok(result) => result,
            Err(e) => {
                return Err(self
                    .transport_error(format!("Failed to create entry: {dn}"), e)
                    .await)
            }
        };

        match result.rc {
            RC_SUCCESS => {
                info!(dn = %dn, "LDAP entry created successfully");
                Ok(())
            }
            RC_ALREADY_EXISTS => Err(StoreError::AlreadyExists {
                store: StoreKind::Directory,
                key: dn.to_string(),
            }),
            RC_NO_SUCH_OBJECT => Err(StoreError::directory(format!(
                "parent of {dn} does not exist"
            ))),
            _ => Err(unexpected("add", dn, &result)),
        }
    }

    #[instrument(skip(self))]
    async fn delete_entry(&self, dn: &str) -> Result<(), StoreError> {
        let mut ldap = self.get_connection().await?;
        debug!(dn = %dn, "Deleting LDAP entry");

        let result = match ldap.delete(dn).await {
            Ok(result) => result,
            Err(e) => {
                return Err(self
                    .transport_error(format!("Failed to delete entry: {dn}"), e)
                    .await)
            }
        };

        match result.rc {
            RC_SUCCESS => {
                info!(dn = %dn, "LDAP entry deleted successfully");
                Ok(())
            }
            RC_NO_SUCH_OBJECT => Err(not_found(dn)),
            _ => Err(unexpected("delete", dn, &result)),
        }
    }

    #[instrument(skip(self))]
    async fn add_member(&self, group_dn: &str, member_dn: &str) -> Result<(), StoreError> {
        let mut ldap = self.get_connection().await?;
        let mods = vec![Mod::Add(MEMBER_ATTRIBUTE, HashSet::from([member_dn]))];

        let result = match ldap.modify(group_dn, mods).await {
            Ok(result) => result,
            Err(e) => {
                return Err(self
                    .transport_error(format!("Failed to add member to {group_dn}"), e)
                    .await)
            }
        };

        match result.rc {
            RC_SUCCESS | RC_ATTRIBUTE_OR_VALUE_EXISTS => Ok(()),
            RC_NO_SUCH_OBJECT => Err(not_found(group_dn)),
            _ => Err(unexpected("modify", group_dn, &result)),
        }
    }

    #[instrument(skip(self))]
    async fn remove_member(&self, group_dn: &str, member_dn: &str) -> Result<(), StoreError> {
        let mut ldap = self.get_connection().await?;
        let mods = vec![Mod::Delete(MEMBER_ATTRIBUTE, HashSet::from([member_dn]))];

        let result = match ldap.modify(group_dn, mods).await {
            Ok(result) => result,
            Err(e) => {
                return Err(self
                    .transport_error(format!("Failed to remove member from {group_dn}"), e)
                    .await)
            }
        };

        match result.rc {
            RC_SUCCESS | RC_NO_SUCH_ATTRIBUTE => Ok(()),
            RC_NO_SUCH_OBJECT => Err(not_found(group_dn)),
            _ => Err(unexpected("modify", group_dn, &result)),
        }
    }

    async fn entry_exists(&self, dn: &str) -> Result<bool, StoreError> {
        let mut ldap = self.get_connection().await?;

        let result = match ldap.search(dn, Scope::Base, "(objectClass=*)", vec!["1.1"]).await {
            Ok(result) => result,
            Err(e) => {
                return Err(self
                    .transport_error(format!("Failed to look up {dn}"), e)
                    .await)
            }
        };

        match result.1.rc {
            RC_SUCCESS => Ok(!result.0.is_empty()),
            RC_NO_SUCH_OBJECT => Ok(false),
            _ => Err(unexpected("search", dn, &result.1)),
        }
    }

    #[instrument(skip(self))]
    async fn list_entries(
        &self,
        base_dn: &str,
        object_class: &str,
    ) -> Result<Vec<String>, StoreError> {
        let mut ldap = self.get_connection().await?;
        let filter = format!("(objectClass={})", escape_filter_value(object_class));

        debug!(filter = %filter, base_dn = %base_dn, "Searching LDAP");

        let result = match ldap
            .search(base_dn, Scope::Subtree, &filter, vec!["1.1"])
            .await
        {
            Ok(result) => result,
            Err(e) => {
                return Err(self
                    .transport_error(format!("LDAP search under {base_dn} failed"), e)
                    .await)
            }
        };

        match result.1.rc {
            RC_SUCCESS => {}
            RC_NO_SUCH_OBJECT => return Ok(Vec::new()),
            _ => return Err(unexpected("search", base_dn, &result.1)),
        }

        let dns: Vec<String> = result
            .0
            .into_iter()
            .map(|entry| SearchEntry::construct(entry).dn)
            .collect();

        info!(total_found = dns.len(), "LDAP search completed");
        Ok(dns)
    }
}

impl std::fmt::Debug for LdapDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapDirectory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
