use crate::namespace::Namespace;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hive_core::{HiveError, HiveResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::sync::RwLock;

/// A single entry in the coordination store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub namespace: Namespace,
    pub key: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `None` means the entry never expires.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl MemoryEntry {
    pub fn new(
        namespace: Namespace,
        key: impl Into<String>,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Self {
        let now = Utc::now();
        Self {
            namespace,
            key: key.into(),
            value,
            tags: BTreeSet::new(),
            created_at: now,
            updated_at: now,
            // A TTL too large to represent is treated as "never expires".
            expires_at: ttl
                .and_then(|t| chrono::Duration::from_std(t).ok())
                .and_then(|d| now.checked_add_signed(d)),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// Deserialize the value into a concrete type.
    pub fn decode<T: DeserializeOwned>(&self) -> HiveResult<T> {
        Ok(serde_json::from_value(self.value.clone())?)
    }
}

/// Selection criteria for [`CoordinationStore::query`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilter {
    /// Only keys starting with this prefix.
    pub key_prefix: Option<String>,
    /// Only entries carrying every one of these tags.
    pub tags: BTreeSet<String>,
    /// Include entries in descendant namespaces.
    pub recursive: bool,
    /// Maximum number of entries returned.
    pub limit: Option<usize>,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `entry`, located under the queried `namespace`, passes the filter.
    pub fn matches(&self, namespace: &Namespace, entry: &MemoryEntry) -> bool {
        let ns_ok = if self.recursive {
            namespace.contains(&entry.namespace)
        } else {
            entry.namespace == *namespace
        };
        ns_ok
            && self
                .key_prefix
                .as_deref()
                .map_or(true, |p| entry.key.starts_with(p))
            && self.tags.iter().all(|t| entry.tags.contains(t))
    }
}

/// Namespaced key/value store shared by all agents of a session.
///
/// Keys are unique within a namespace and writes are last-writer-wins.
/// Implementations replace whole entries atomically, so a reader never sees
/// a partially written entry. Expired entries are invisible to reads even
/// before [`CoordinationStore::purge_expired`] removes them.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Insert or overwrite `key` in `namespace`.
    async fn store(
        &self,
        namespace: &Namespace,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> HiveResult<()> {
        self.store_tagged(namespace, key, value, ttl, BTreeSet::new())
            .await
    }

    /// Insert or overwrite `key` in `namespace`, attaching search tags.
    async fn store_tagged(
        &self,
        namespace: &Namespace,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
        tags: BTreeSet<String>,
    ) -> HiveResult<()>;

    /// Fetch a live entry.
    async fn get(&self, namespace: &Namespace, key: &str) -> HiveResult<Option<MemoryEntry>>;

    /// List live entries matching `filter`, ordered by namespace then key.
    async fn query(
        &self,
        namespace: &Namespace,
        filter: &QueryFilter,
    ) -> HiveResult<Vec<MemoryEntry>>;

    /// Remove an entry. Returns whether a live entry was removed.
    async fn delete(&self, namespace: &Namespace, key: &str) -> HiveResult<bool>;

    /// Drop expired entries. Returns how many were removed.
    async fn purge_expired(&self) -> HiveResult<usize>;

    /// Number of live entries.
    async fn len(&self) -> HiveResult<usize>;

    /// Flush and release resources at session end.
    async fn close(&self) -> HiveResult<()> {
        Ok(())
    }
}

/// Typed convenience layer over any [`CoordinationStore`].
#[async_trait]
pub trait CoordinationStoreExt: CoordinationStore {
    /// Serialize `value` and store it.
    async fn put_json<T: Serialize + Sync>(
        &self,
        namespace: &Namespace,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> HiveResult<()> {
        let value = serde_json::to_value(value)?;
        self.store(namespace, key, value, ttl).await
    }

    /// Fetch and deserialize a live entry.
    async fn get_json<T: DeserializeOwned + Send>(
        &self,
        namespace: &Namespace,
        key: &str,
    ) -> HiveResult<Option<T>> {
        match self.get(namespace, key).await? {
            Some(entry) => Ok(Some(entry.decode()?)),
            None => Ok(None),
        }
    }
}

impl<S: CoordinationStore + ?Sized> CoordinationStoreExt for S {}

type EntryKey = (Namespace, String);

/// Volatile store backed by a map under a single async `RwLock`.
pub struct InMemoryStore {
    entries: RwLock<HashMap<EntryKey, MemoryEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a fully formed entry, keeping the original `created_at` when
    /// overwriting. Returns the stored entry.
    pub(crate) async fn upsert(&self, mut entry: MemoryEntry) -> MemoryEntry {
        let mut entries = self.entries.write().await;
        let key = (entry.namespace.clone(), entry.key.clone());
        if let Some(existing) = entries.get(&key) {
            inherit_created_at(&mut entry, existing);
        }
        entries.insert(key, entry.clone());
        entry
    }

    /// `entry` as [`upsert`](Self::upsert) would store it, without storing it.
    pub(crate) async fn prepare(&self, mut entry: MemoryEntry) -> MemoryEntry {
        let entries = self.entries.read().await;
        if let Some(existing) = entries.get(&(entry.namespace.clone(), entry.key.clone())) {
            inherit_created_at(&mut entry, existing);
        }
        entry
    }

    /// Insert an entry exactly as given (log replay).
    pub(crate) async fn restore(&self, entry: MemoryEntry) {
        let mut entries = self.entries.write().await;
        entries.insert((entry.namespace.clone(), entry.key.clone()), entry);
    }

    /// Remove regardless of expiry. Returns whether a live entry was removed.
    pub(crate) async fn remove(&self, namespace: &Namespace, key: &str) -> bool {
        let mut entries = self.entries.write().await;
        entries
            .remove(&(namespace.clone(), key.to_string()))
            .is_some_and(|e| !e.is_expired(Utc::now()))
    }

    /// Snapshot of every live entry, ordered by namespace then key.
    pub(crate) async fn live_entries(&self) -> Vec<MemoryEntry> {
        let now = Utc::now();
        let entries = self.entries.read().await;
        let mut live: Vec<MemoryEntry> = entries
            .values()
            .filter(|e| !e.is_expired(now))
            .cloned()
            .collect();
        sort_entries(&mut live);
        live
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationStore for InMemoryStore {
    async fn store_tagged(
        &self,
        namespace: &Namespace,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
        tags: BTreeSet<String>,
    ) -> HiveResult<()> {
        if key.is_empty() {
            return Err(HiveError::Store(format!(
                "Empty key in namespace '{namespace}'"
            )));
        }
        let mut entry = MemoryEntry::new(namespace.clone(), key, value, ttl);
        entry.tags = tags;
        self.upsert(entry).await;
        Ok(())
    }

    async fn get(&self, namespace: &Namespace, key: &str) -> HiveResult<Option<MemoryEntry>> {
        let entries = self.entries.read().await;
        let now = Utc::now();
        Ok(entries
            .get(&(namespace.clone(), key.to_string()))
            .filter(|e| !e.is_expired(now))
            .cloned())
    }

    async fn query(
        &self,
        namespace: &Namespace,
        filter: &QueryFilter,
    ) -> HiveResult<Vec<MemoryEntry>> {
        let now = Utc::now();
        let entries = self.entries.read().await;
        let mut matched: Vec<MemoryEntry> = entries
            .values()
            .filter(|e| !e.is_expired(now) && filter.matches(namespace, e))
            .cloned()
            .collect();
        sort_entries(&mut matched);
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn delete(&self, namespace: &Namespace, key: &str) -> HiveResult<bool> {
        Ok(self.remove(namespace, key).await)
    }

    async fn purge_expired(&self) -> HiveResult<usize> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        Ok(before - entries.len())
    }

    async fn len(&self) -> HiveResult<usize> {
        let now = Utc::now();
        let entries = self.entries.read().await;
        Ok(entries.values().filter(|e| !e.is_expired(now)).count())
    }
}

fn inherit_created_at(entry: &mut MemoryEntry, existing: &MemoryEntry) {
    if !existing.is_expired(Utc::now()) {
        entry.created_at = existing.created_at;
    }
}

fn sort_entries(entries: &mut [MemoryEntry]) {
    entries.sort_by(|a, b| {
        a.namespace
            .cmp(&b.namespace)
            .then_with(|| a.key.cmp(&b.key))
    });
}
