//! Single-writer persistence of job transitions.
//!
//! Every mutation is load, change a copy, save, under a per-job lock. The
//! in-memory copy is returned only after the store accepted it; if the save
//! fails the caller gets `Persistence` and the stored record is unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::job::{ChapterSource, Job, JobStatus};
use super::PipelineError;
use crate::store::JobStore;

pub struct PipelineStateMachine {
    store: Arc<dyn JobStore>,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl PipelineStateMachine {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(id).or_default().clone()
    }

    /// Drop the map entry once no other caller holds or waits on it.
    async fn release(&self, id: Uuid, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // One reference in the map, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&id);
        }
    }

    /// Persist a new job in `created`.
    pub async fn create(&self, source: ChapterSource) -> Result<Job, PipelineError> {
        let job = Job::new(source);
        self.store.insert_job(&job).await?;
        info!(job_id = %job.id, chapter_id = %job.chapter_id, "Job created");
        Ok(job)
    }

    pub async fn load(&self, id: Uuid) -> Result<Job, PipelineError> {
        self.store
            .load_job(id)
            .await?
            .ok_or(PipelineError::JobNotFound(id))
    }

    /// Apply `f` to the job and persist the result.
    ///
    /// Distinct job ids never contend. If `f` fails nothing is written; if
    /// `f` leaves the job unchanged nothing is written either.
    pub async fn update<T, F>(&self, id: Uuid, f: F) -> Result<(Job, T), PipelineError>
    where
        F: FnOnce(&mut Job) -> Result<T, PipelineError>,
    {
        let lock = self.lock_for(id).await;
        let result = {
            let _guard = lock.lock().await;
            self.apply(id, f).await
        };
        self.release(id, lock).await;
        result
    }

    async fn apply<T, F>(&self, id: Uuid, f: F) -> Result<(Job, T), PipelineError>
    where
        F: FnOnce(&mut Job) -> Result<T, PipelineError>,
    {
        let current = self.load(id).await?;
        let mut next = current.clone();
        let value = f(&mut next)?;
        if next == current {
            debug!(job_id = %id, stage = %current.stage, "Update left job unchanged");
            return Ok((current, value));
        }

        next.revision = current.revision + 1;
        self.store.save_job(&next).await?;

        if next.stage != current.stage {
            info!(
                job_id = %id,
                from = %current.stage,
                to = %next.stage,
                revision = next.revision,
                "Job stage changed"
            );
        }
        Ok((next, value))
    }

    pub async fn status(&self, id: Uuid) -> Result<JobStatus, PipelineError> {
        Ok(self.load(id).await?.status())
    }

    pub async fn job_ids(&self) -> Result<Vec<Uuid>, PipelineError> {
        Ok(self.store.list_job_ids().await?)
    }
}
