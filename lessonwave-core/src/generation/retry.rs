//! Targeted re-runs of failed episodes.
//!
//! A retry replays the episode with the same planning inputs and replaces
//! only that episode's result. `retry_all_failed` walks the failed list one
//! at a time with a fixed pause between calls.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use super::GenerationWorkerPool;
use crate::pipeline::{PipelineError, PipelineStateMachine};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RetryOutcome {
    /// The episode was not in the failed list. Nothing ran.
    NotFailed,
    Recovered,
    StillFailing { error: String },
    /// Another retry of the same episode is in flight.
    AlreadyRunning,
}

pub struct RetryController {
    machine: Arc<PipelineStateMachine>,
    pool: Arc<GenerationWorkerPool>,
    delay: Duration,
    in_flight: Mutex<HashSet<(Uuid, u32)>>,
}

impl RetryController {
    pub fn new(
        machine: Arc<PipelineStateMachine>,
        pool: Arc<GenerationWorkerPool>,
        delay: Duration,
    ) -> Self {
        Self {
            machine,
            pool,
            delay,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub async fn retry_episode(
        &self,
        job_id: Uuid,
        episode_index: u32,
    ) -> Result<RetryOutcome, PipelineError> {
        let job = self.machine.load(job_id).await?;
        // Validates the index against the plan before anything else.
        let request = job.generation_request(episode_index)?;
        let Some(failed) = job
            .failed_episodes
            .iter()
            .find(|f| f.episode_index == episode_index)
        else {
            return Ok(RetryOutcome::NotFailed);
        };
        let retry_count = failed.retry_count + 1;

        if !self.in_flight.lock().await.insert((job_id, episode_index)) {
            warn!(job_id = %job_id, episode = episode_index, "Retry already running");
            return Ok(RetryOutcome::AlreadyRunning);
        }

        info!(job_id = %job_id, episode = episode_index, attempt = retry_count, "Retrying episode");
        let task = self.pool.run_one(request, retry_count).await;
        let result = self
            .machine
            .update(job_id, |job| job.record_retry(task))
            .await;
        self.in_flight.lock().await.remove(&(job_id, episode_index));

        let (job, outcome) = result?;
        match &outcome {
            RetryOutcome::Recovered => info!(
                job_id = %job_id,
                episode = episode_index,
                remaining = job.failed_episodes.len(),
                stage = %job.stage,
                "Episode recovered"
            ),
            RetryOutcome::StillFailing { error } => warn!(
                job_id = %job_id,
                episode = episode_index,
                error = %error,
                "Episode still failing"
            ),
            RetryOutcome::NotFailed | RetryOutcome::AlreadyRunning => {}
        }
        Ok(outcome)
    }

    /// Retry every failed episode in index order, pausing `delay` between
    /// consecutive attempts.
    pub async fn retry_all_failed(
        &self,
        job_id: Uuid,
    ) -> Result<Vec<(u32, RetryOutcome)>, PipelineError> {
        let failed = self.machine.load(job_id).await?.failed_indices();
        info!(job_id = %job_id, episodes = failed.len(), "Retrying all failed episodes");

        let mut outcomes = Vec::with_capacity(failed.len());
        for (i, episode_index) in failed.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.delay).await;
            }
            let outcome = self.retry_episode(job_id, episode_index).await?;
            outcomes.push((episode_index, outcome));
        }
        Ok(outcomes)
    }
}
