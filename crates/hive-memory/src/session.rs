use crate::namespace::Namespace;
use crate::store::{CoordinationStore, CoordinationStoreExt, QueryFilter};
use chrono::{DateTime, Utc};
use hive_core::{HiveResult, ObjectiveId, ObjectiveStatus, SessionId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const META_KEY: &str = "meta";
const OBJECTIVE_PREFIX: &str = "objective:";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionMeta {
    opened_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

/// One coordinator session over a store.
///
/// The store is opened before the session and handed in explicitly; closing
/// the session stamps `sessions/{id}` and closes the store.
pub struct Session {
    id: SessionId,
    store: Arc<dyn CoordinationStore>,
    opened_at: DateTime<Utc>,
}

impl Session {
    /// Start a session, recording it under `sessions/{id}`.
    pub async fn open(store: Arc<dyn CoordinationStore>) -> HiveResult<Self> {
        let id = SessionId::new();
        let opened_at = Utc::now();
        store
            .put_json(
                &Namespace::session(id),
                META_KEY,
                &SessionMeta {
                    opened_at,
                    closed_at: None,
                },
                None,
            )
            .await?;
        info!(session_id = %id, "Session opened");
        Ok(Self {
            id,
            store,
            opened_at,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn store(&self) -> &Arc<dyn CoordinationStore> {
        &self.store
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Record (or update) the status of an objective run in this session.
    pub async fn record_objective(
        &self,
        objective_id: ObjectiveId,
        status: ObjectiveStatus,
    ) -> HiveResult<()> {
        self.store
            .put_json(
                &Namespace::session(self.id),
                &format!("{OBJECTIVE_PREFIX}{objective_id}"),
                &status,
                None,
            )
            .await
    }

    /// Objectives recorded in this session with their last known status.
    pub async fn objectives(&self) -> HiveResult<Vec<(ObjectiveId, ObjectiveStatus)>> {
        let entries = self
            .store
            .query(
                &Namespace::session(self.id),
                &QueryFilter::new().key_prefix(OBJECTIVE_PREFIX),
            )
            .await?;
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(raw) = entry.key.strip_prefix(OBJECTIVE_PREFIX) else {
                continue;
            };
            if let Ok(id) = raw.parse::<ObjectiveId>() {
                out.push((id, entry.decode()?));
            }
        }
        Ok(out)
    }

    /// End the session and close the underlying store.
    pub async fn close(self) -> HiveResult<()> {
        self.store
            .put_json(
                &Namespace::session(self.id),
                META_KEY,
                &SessionMeta {
                    opened_at: self.opened_at,
                    closed_at: Some(Utc::now()),
                },
                None,
            )
            .await?;
        self.store.close().await?;
        info!(session_id = %self.id, "Session closed");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::InMemoryStore;

    #[tokio::test]
    async fn test_session_records_objectives() {
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryStore::new());
        let session = Session::open(store.clone()).await.unwrap();
        let a = ObjectiveId::new();
        session
            .record_objective(a, ObjectiveStatus::Running)
            .await
            .unwrap();
        session
            .record_objective(a, ObjectiveStatus::Completed)
            .await
            .unwrap();

        let objectives = session.objectives().await.unwrap();
        assert_eq!(objectives, vec![(a, ObjectiveStatus::Completed)]);
    }

    #[tokio::test]
    async fn test_close_stamps_meta() {
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryStore::new());
        let session = Session::open(store.clone()).await.unwrap();
        let id = session.id();
        session.close().await.unwrap();

        let meta: SessionMeta = store
            .get_json(&Namespace::session(id), META_KEY)
            .await
            .unwrap()
            .unwrap();
        assert!(meta.closed_at.is_some());
    }
}
