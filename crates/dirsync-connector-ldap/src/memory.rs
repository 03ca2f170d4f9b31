//! In-memory directory store.
//!
//! Keeps entries keyed by normalized DN and mirrors the LDAP result codes
//! the engine relies on: creating an existing DN is `AlreadyExists`, creating
//! under a missing parent fails, deleting a missing DN is `NotFound`, and
//! deleting an entry that still has children fails.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

use dirsync_core::dn::{is_descendant_or_self, normalize_dn, parent_dn};
use dirsync_core::{DirectoryStore, EntryAttributes, StoreError, StoreKind};

const MEMBER_ATTRIBUTE: &str = "uniqueMember";

#[derive(Debug, Clone)]
struct Entry {
    dn: String,
    attrs: EntryAttributes,
}

/// Directory store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    entries: RwLock<BTreeMap<String, Entry>>,
    writes: AtomicU64,
    read_only: AtomicBool,
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A directory that already holds the given container entries.
    pub fn with_base_entries<I, S>(dns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = dns
            .into_iter()
            .map(|dn| {
                let dn = dn.into();
                (
                    normalize_dn(&dn),
                    Entry {
                        dn,
                        attrs: EntryAttributes::new().with("objectClass", "top"),
                    },
                )
            })
            .collect();
        Self {
            entries: RwLock::new(entries),
            ..Self::default()
        }
    }

    /// Number of mutations applied so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every mutation fail with a directory store error.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Attributes of an entry.
    pub async fn attributes(&self, dn: &str) -> Option<EntryAttributes> {
        self.entries
            .read()
            .await
            .get(&normalize_dn(dn))
            .map(|e| e.attrs.clone())
    }

    /// `uniqueMember` values of a group entry.
    pub async fn members(&self, group_dn: &str) -> Vec<String> {
        self.attributes(group_dn)
            .await
            .and_then(|attrs| attrs.get(MEMBER_ATTRIBUTE).map(<[String]>::to_vec))
            .unwrap_or_default()
    }

    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// DNs of all entries, in key order.
    pub async fn dns(&self) -> Vec<String> {
        self.entries
            .read()
            .await
            .values()
            .map(|e| e.dn.clone())
            .collect()
    }

    fn check_writable(&self, dn: &str) -> Result<(), StoreError> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StoreError::directory(format!(
                "directory is read-only, cannot write {dn}"
            )));
        }
        Ok(())
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn not_found(dn: &str) -> StoreError {
    StoreError::NotFound {
        store: StoreKind::Directory,
        key: dn.to_string(),
    }
}

#[async_trait]
impl DirectoryStore for MemoryDirectory {
    async fn create_entry(&self, dn: &str, attrs: &EntryAttributes) -> Result<(), StoreError> {
        self.check_writable(dn)?;
        let key = normalize_dn(dn);
        let mut entries = self.entries.write().await;

        if entries.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                store: StoreKind::Directory,
                key: dn.to_string(),
            });
        }
        let parent_exists = parent_dn(dn).is_some_and(|p| entries.contains_key(&normalize_dn(p)));
        if !parent_exists {
            return Err(StoreError::directory(format!(
                "parent of {dn} does not exist"
            )));
        }

        entries.insert(
            key,
            Entry {
                dn: dn.to_string(),
                attrs: attrs.clone(),
            },
        );
        self.record_write();
        Ok(())
    }

    async fn delete_entry(&self, dn: &str) -> Result<(), StoreError> {
        self.check_writable(dn)?;
        let key = normalize_dn(dn);
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&key) {
            return Err(not_found(dn));
        }
        let suffix = format!(",{key}");
        if entries.keys().any(|k| k.ends_with(&suffix)) {
            return Err(StoreError::directory(format!(
                "{dn} still has child entries"
            )));
        }

        entries.remove(&key);
        self.record_write();
        Ok(())
    }

    async fn add_member(&self, group_dn: &str, member_dn: &str) -> Result<(), StoreError> {
        self.check_writable(group_dn)?;
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&normalize_dn(group_dn))
            .ok_or_else(|| not_found(group_dn))?;

        let member = normalize_dn(member_dn);
        let present = entry
            .attrs
            .get(MEMBER_ATTRIBUTE)
            .is_some_and(|values| values.iter().any(|v| normalize_dn(v) == member));
        if !present {
            entry.attrs.push(MEMBER_ATTRIBUTE, member_dn);
            self.record_write();
        }
        Ok(())
    }

    async fn remove_member(&self, group_dn: &str, member_dn: &str) -> Result<(), StoreError> {
        self.check_writable(group_dn)?;
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&normalize_dn(group_dn))
            .ok_or_else(|| not_found(group_dn))?;

        let member = normalize_dn(member_dn);
        let mut rebuilt = EntryAttributes::new();
        let mut removed = false;
        for (name, values) in entry.attrs.iter() {
            for value in values {
                if name.eq_ignore_ascii_case(MEMBER_ATTRIBUTE) && normalize_dn(value) == member {
                    removed = true;
                    continue;
                }
                rebuilt.push(name, value.clone());
            }
        }
        if removed {
            entry.attrs = rebuilt;
            self.record_write();
        }
        Ok(())
    }

    async fn entry_exists(&self, dn: &str) -> Result<bool, StoreError> {
        Ok(self.entries.read().await.contains_key(&normalize_dn(dn)))
    }

    async fn list_entries(
        &self,
        base_dn: &str,
        object_class: &str,
    ) -> Result<Vec<String>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .filter(|e| is_descendant_or_self(&e.dn, base_dn))
            .filter(|e| {
                e.attrs
                    .get("objectClass")
                    .is_some_and(|ocs| ocs.iter().any(|oc| oc.eq_ignore_ascii_case(object_class)))
            })
            .map(|e| e.dn.clone())
            .collect())
    }
}
