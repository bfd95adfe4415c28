use crate::locks::KeyLocks;
use crate::store::{check_version, HistoryStore};
use async_trait::async_trait;
use ideaforge_core::{
    Fingerprint, IdeaforgeError, IdeaforgeResult, ProjectRecord, ProjectStatus, ScheduleState,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// File-based history store.
///
/// Layout under `root`:
///
/// ```text
/// projects/<fingerprint>.json   one ProjectRecord per file
/// schedule.json                 the ScheduleState singleton
/// ```
///
/// Every write goes to a uniquely named temp file in the same directory, is
/// synced, and then renamed over the target, so readers only ever see a
/// complete old or complete new file.
pub struct FileHistoryStore {
    root: PathBuf,
    projects_dir: PathBuf,
    locks: KeyLocks,
    schedule_lock: Mutex<()>,
}

impl FileHistoryStore {
    /// Open or create a store rooted at `root`.
    pub async fn new(root: impl Into<PathBuf>) -> IdeaforgeResult<Self> {
        let root = root.into();
        let projects_dir = root.join("projects");
        tokio::fs::create_dir_all(&projects_dir)
            .await
            .map_err(|e| persistence("create", &projects_dir, e))?;
        Ok(Self {
            root,
            projects_dir,
            locks: KeyLocks::new(),
            schedule_lock: Mutex::new(()),
        })
    }

    /// Directory the store writes under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.projects_dir.join(format!("{fingerprint}.json"))
    }

    fn schedule_path(&self) -> PathBuf {
        self.root.join("schedule.json")
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn get(&self, fingerprint: &Fingerprint) -> IdeaforgeResult<Option<ProjectRecord>> {
        read_json(&self.record_path(fingerprint)).await
    }

    async fn upsert(&self, record: &ProjectRecord) -> IdeaforgeResult<()> {
        let lock = self.locks.for_key(&record.fingerprint);
        let _guard = lock.lock().await;

        let path = self.record_path(&record.fingerprint);
        let stored: Option<ProjectRecord> = read_json(&path).await?;
        check_version(stored.as_ref(), record)?;

        write_json_atomic(&path, record).await?;
        debug!(
            fingerprint = %record.fingerprint,
            status = %record.status,
            version = record.version,
            "Record persisted"
        );
        Ok(())
    }

    async fn list(&self, status: Option<ProjectStatus>) -> IdeaforgeResult<Vec<ProjectRecord>> {
        let mut dir = tokio::fs::read_dir(&self.projects_dir)
            .await
            .map_err(|e| persistence("read", &self.projects_dir, e))?;

        let mut records = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| persistence("read", &self.projects_dir, e))?
        {
            let path = entry.path();
            let is_record = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".json"));
            if !is_record {
                continue;
            }
            if let Some(record) = read_json::<ProjectRecord>(&path).await? {
                if status.map_or(true, |s| record.status == s) {
                    records.push(record);
                }
            }
        }

        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });
        Ok(records)
    }

    async fn load_schedule(&self) -> IdeaforgeResult<ScheduleState> {
        Ok(read_json(&self.schedule_path()).await?.unwrap_or_default())
    }

    async fn save_schedule(&self, state: &ScheduleState) -> IdeaforgeResult<()> {
        let _guard = self.schedule_lock.lock().await;
        write_json_atomic(&self.schedule_path(), state).await
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> IdeaforgeResult<Option<T>> {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(persistence("read", path, e)),
    };
    serde_json::from_str(&data).map(Some).map_err(|e| {
        warn!(path = %path.display(), error = %e, "Corrupt store file");
        IdeaforgeError::Persistence(format!("Failed to parse {}: {e}", path.display()))
    })
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> IdeaforgeResult<()> {
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));

    let result = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(persistence("write", path, e));
    }
    if let Some(dir) = path.parent() {
        sync_dir(dir).await.map_err(|e| persistence("sync", dir, e))?;
    }
    Ok(())
}

/// Flush the directory entry so a completed rename survives power loss.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

fn persistence(action: &str, path: &Path, err: std::io::Error) -> IdeaforgeError {
    IdeaforgeError::Persistence(format!("Failed to {action} {}: {err}", path.display()))
}
