use crate::namespace::Namespace;
use crate::store::{CoordinationStore, InMemoryStore, MemoryEntry, QueryFilter};
use async_trait::async_trait;
use hive_core::{HiveError, HiveResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// One line of the store's JSONL log.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum LogRecord {
    Put { entry: MemoryEntry },
    Delete { namespace: Namespace, key: String },
}

/// File-backed store that persists every write as a JSONL log record.
///
/// The log is replayed into memory on open, appended on each write, and
/// compacted (live entries only, written to a temp file then renamed) on
/// [`CoordinationStore::close`] and after expired entries are purged.
pub struct FileStore {
    path: PathBuf,
    inner: InMemoryStore,
    /// Serializes log appends so the file order matches the in-memory order.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (or create) a store at `path`, replaying any existing log.
    pub async fn open(path: impl Into<PathBuf>) -> HiveResult<Self> {
        let path = path.into();
        let inner = InMemoryStore::new();

        if path.exists() {
            let data = tokio::fs::read_to_string(&path).await.map_err(|e| {
                HiveError::Store(format!("Failed to read store '{}': {e}", path.display()))
            })?;
            let mut replayed = 0usize;
            for (lineno, line) in data.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let record: LogRecord = serde_json::from_str(line).map_err(|e| {
                    HiveError::Store(format!(
                        "Invalid record at {}:{}: {e}",
                        path.display(),
                        lineno + 1
                    ))
                })?;
                match record {
                    LogRecord::Put { entry } => inner.restore(entry).await,
                    LogRecord::Delete { namespace, key } => {
                        inner.remove(&namespace, &key).await;
                    }
                }
                replayed += 1;
            }
            info!(path = %path.display(), records = replayed, "Coordination store loaded");
        } else if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| HiveError::Store(format!("Failed to create dir: {e}")))?;
            }
        }

        Ok(Self {
            path,
            inner,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, record: &LogRecord) -> HiveResult<()> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| HiveError::Store(format!("Failed to serialize record: {e}")))?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| HiveError::Store(format!("Failed to open store: {e}")))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| HiveError::Store(format!("Failed to write record: {e}")))?;
        file.flush()
            .await
            .map_err(|e| HiveError::Store(format!("Failed to flush store: {e}")))?;
        Ok(())
    }

    /// Rewrite the log with one `put` per live entry. Caller holds `write_lock`.
    async fn compact_locked(&self) -> HiveResult<()> {
        let entries = self.inner.live_entries().await;
        let mut data = String::new();
        for entry in entries {
            let line = serde_json::to_string(&LogRecord::Put { entry })
                .map_err(|e| HiveError::Store(format!("Failed to serialize record: {e}")))?;
            data.push_str(&line);
            data.push('\n');
        }
        let tmp = self.path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, data.as_bytes())
            .await
            .map_err(|e| HiveError::Store(format!("Failed to write compacted store: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| HiveError::Store(format!("Failed to replace store file: {e}")))?;
        debug!(path = %self.path.display(), "Coordination store compacted");
        Ok(())
    }

    /// Rewrite the log so it holds only live entries.
    pub async fn compact(&self) -> HiveResult<()> {
        let _guard = self.write_lock.lock().await;
        self.compact_locked().await
    }
}

#[async_trait]
impl CoordinationStore for FileStore {
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
        let _guard = self.write_lock.lock().await;
        let mut entry = MemoryEntry::new(namespace.clone(), key, value, ttl);
        entry.tags = tags;
        // Log first: a failed append leaves memory untouched.
        let stored = self.inner.prepare(entry).await;
        self.append(&LogRecord::Put {
            entry: stored.clone(),
        })
        .await?;
        self.inner.restore(stored).await;
        Ok(())
    }

    async fn get(&self, namespace: &Namespace, key: &str) -> HiveResult<Option<MemoryEntry>> {
        self.inner.get(namespace, key).await
    }

    async fn query(
        &self,
        namespace: &Namespace,
        filter: &QueryFilter,
    ) -> HiveResult<Vec<MemoryEntry>> {
        self.inner.query(namespace, filter).await
    }

    async fn delete(&self, namespace: &Namespace, key: &str) -> HiveResult<bool> {
        let _guard = self.write_lock.lock().await;
        let live = self.inner.get(namespace, key).await?.is_some();
        if live {
            self.append(&LogRecord::Delete {
                namespace: namespace.clone(),
                key: key.to_string(),
            })
            .await?;
        }
        self.inner.remove(namespace, key).await;
        Ok(live)
    }

    async fn purge_expired(&self) -> HiveResult<usize> {
        let _guard = self.write_lock.lock().await;
        let purged = self.inner.purge_expired().await?;
        if purged > 0 {
            self.compact_locked().await?;
        }
        Ok(purged)
    }

    async fn len(&self) -> HiveResult<usize> {
        self.inner.len().await
    }

    async fn close(&self) -> HiveResult<()> {
        self.compact().await
    }
}
