use crate::store::{check_version, HistoryStore};
use async_trait::async_trait;
use ideaforge_core::{Fingerprint, IdeaforgeResult, ProjectRecord, ProjectStatus, ScheduleState};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory history store. Nothing survives the process.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    records: RwLock<HashMap<Fingerprint, ProjectRecord>>,
    schedule: RwLock<ScheduleState>,
}

impl InMemoryHistoryStore {
    /// Empty instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// `true` when empty.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn get(&self, fingerprint: &Fingerprint) -> IdeaforgeResult<Option<ProjectRecord>> {
        Ok(self.records.read().await.get(fingerprint).cloned())
    }

    async fn upsert(&self, record: &ProjectRecord) -> IdeaforgeResult<()> {
        let mut records = self.records.write().await;
        check_version(records.get(&record.fingerprint), record)?;
        records.insert(record.fingerprint.clone(), record.clone());
        Ok(())
    }

    async fn list(&self, status: Option<ProjectStatus>) -> IdeaforgeResult<Vec<ProjectRecord>> {
        let records = self.records.read().await;
        let mut out: Vec<ProjectRecord> = records
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });
        Ok(out)
    }

    async fn load_schedule(&self) -> IdeaforgeResult<ScheduleState> {
        Ok(self.schedule.read().await.clone())
    }

    async fn save_schedule(&self, state: &ScheduleState) -> IdeaforgeResult<()> {
        *self.schedule.write().await = state.clone();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ideaforge_core::{Category, Idea};

    #[tokio::test]
    async fn test_upsert_replaces_by_fingerprint() {
        let store = InMemoryHistoryStore::new();
        let mut rec = ProjectRecord::new(Idea::new("Cron Linter", "manual", Category::DevelopmentTool, 3.0));
        store.upsert(&rec).await.unwrap();
        rec.transition(ProjectStatus::Developing).unwrap();
        store.upsert(&rec).await.unwrap();

        assert_eq!(store.len().await, 1);
        let stored = store.get(&rec.fingerprint).await.unwrap().unwrap();
        assert_eq!(stored.status, ProjectStatus::Developing);
    }

    #[tokio::test]
    async fn test_stale_write_rejected() {
        let store = InMemoryHistoryStore::new();
        let old = ProjectRecord::new(Idea::new("Cron Linter", "manual", Category::DevelopmentTool, 3.0));
        let mut new = old.clone();
        new.transition(ProjectStatus::Developing).unwrap();
        store.upsert(&new).await.unwrap();
        assert!(store.upsert(&old).await.is_err());
    }
}
