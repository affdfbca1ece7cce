use crate::pipeline::job::Job;
use async_trait::async_trait;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("job {job_id} already exists")]
    AlreadyExists { job_id: Uuid },

    #[error("revision conflict on job {job_id}: stored {stored}, attempted {attempted}")]
    Conflict {
        job_id: Uuid,
        stored: u64,
        attempted: u64,
    },

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Durable keyed record store, one record per job id.
///
/// `save_job` only accepts a record whose `revision` is exactly one past the
/// stored one, so a writer working from a stale copy gets `Conflict` instead
/// of silently overwriting.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a brand-new job (revision 0).
    async fn insert_job(&self, job: &Job) -> Result<(), StoreError>;
    async fn save_job(&self, job: &Job) -> Result<(), StoreError>;
    async fn load_job(&self, id: Uuid) -> Result<Option<Job>, StoreError>;
    async fn list_job_ids(&self) -> Result<Vec<Uuid>, StoreError>;
}

pub(crate) fn check_revision(stored: &Job, incoming: &Job) -> Result<(), StoreError> {
    if incoming.revision != stored.revision + 1 {
        return Err(StoreError::Conflict {
            job_id: incoming.id,
            stored: stored.revision,
            attempted: incoming.revision,
        });
    }
    Ok(())
}

// ─── In-memory ────────────────────────────────────────────────

/// Process-local store for tests and embedding. Survives a simulated restart
/// as long as the same instance is handed to the new pipeline.
pub struct MemoryJobStore {
    jobs: tokio::sync::RwLock<std::collections::HashMap<Uuid, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: tokio::sync::RwLock::new(std::collections::HashMap::new()),
        }
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists { job_id: job.id });
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn save_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs
            .get(&job.id)
            .ok_or_else(|| StoreError::Backend(format!("job {} was never inserted", job.id)))?;
        check_revision(stored, job)?;
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn load_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(&id).cloned())
    }

    async fn list_job_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut ids: Vec<Uuid> = jobs.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}

// ─── File-backed ──────────────────────────────────────────────

/// One pretty-printed JSON file per job under `base_path`. Writes go to a
/// temp file that is renamed over the record, so a crash mid-write leaves the
/// previous revision intact.
pub struct FileJobStore {
    base_path: PathBuf,
}

impl FileJobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.base_path.join(format!("{id}.json"))
    }

    async fn write_record(&self, job: &Job) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.base_path).await?;
        let bytes = serde_json::to_vec_pretty(job)?;
        let final_path = self.path_for(job.id);
        let tmp_path = self.base_path.join(format!(".{}.json.tmp", job.id));
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }

    async fn read_record(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        if self.read_record(job.id).await?.is_some() {
            return Err(StoreError::AlreadyExists { job_id: job.id });
        }
        self.write_record(job).await
    }

    async fn save_job(&self, job: &Job) -> Result<(), StoreError> {
        let stored = self
            .read_record(job.id)
            .await?
            .ok_or_else(|| StoreError::Backend(format!("job {} was never inserted", job.id)))?;
        check_revision(&stored, job)?;
        self.write_record(job).await
    }

    async fn load_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        self.read_record(id).await
    }

    async fn list_job_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::job::ChapterSource;

    fn job() -> Job {
        Job::new(ChapterSource::new("ch1", "Biology", "chapter text"))
    }

    #[tokio::test]
    async fn test_memory_store_rejects_stale_revision() {
        let store = MemoryJobStore::new();
        let mut job = job();
        store.insert_job(&job).await.unwrap();

        job.revision = 1;
        store.save_job(&job).await.unwrap();

        // Same revision again: a second writer working from the old copy.
        let err = store.save_job(&job).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { stored: 1, attempted: 1, .. }));
    }

    #[tokio::test]
    async fn test_file_store_round_trips_and_lists() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(dir.path());
        let mut job = job();
        store.insert_job(&job).await.unwrap();
        assert!(matches!(
            store.insert_job(&job).await.unwrap_err(),
            StoreError::AlreadyExists { .. }
        ));

        job.revision = 1;
        job.progress = 42;
        store.save_job(&job).await.unwrap();

        // A fresh store instance over the same directory sees the record.
        let reopened = FileJobStore::new(dir.path());
        let loaded = reopened.load_job(job.id).await.unwrap().unwrap();
        assert_eq!(loaded, job);
        assert_eq!(reopened.list_job_ids().await.unwrap(), vec![job.id]);
    }

    #[tokio::test]
    async fn test_file_store_missing_dir_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(dir.path().join("nope"));
        assert!(store.list_job_ids().await.unwrap().is_empty());
        assert!(store.load_job(Uuid::now_v7()).await.unwrap().is_none());
    }
}
