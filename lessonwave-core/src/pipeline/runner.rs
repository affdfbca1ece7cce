//! Pipeline driver
//!
//! Runs the automatic stages of a job until it reaches a gate or a terminal
//! stage. The driver holds no state of its own: every step reads the stored
//! job and commits its result through the state machine, so `resume` after a
//! restart picks up from exactly the last recorded stage.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::approval::ApprovalGateController;
use super::collaborators::{AudioRenderer, AudioRequest, ConceptExtractor};
use super::job::{ApprovalOutcome, ChapterSource, Job, JobStatus};
use super::machine::PipelineStateMachine;
use super::stage::{Gate, Stage};
use super::PipelineError;
use crate::config::LessonwaveConfig;
use crate::generation::{
    EpisodeGenerator, GenerationWorkerPool, RetryController, RetryOutcome, WaveOutcome,
};
use crate::planner::{chapter_size, subject_support, EpisodePlanner, PlanError, SubjectSupport};
use crate::store::JobStore;
use crate::types::{ChapterMetadata, Concept};

pub struct Pipeline {
    machine: Arc<PipelineStateMachine>,
    gates: ApprovalGateController,
    planner: EpisodePlanner,
    extractor: Arc<dyn ConceptExtractor>,
    pool: Arc<GenerationWorkerPool>,
    retries: RetryController,
    audio: Arc<dyn AudioRenderer>,
    planning_slots: Semaphore,
}

impl Pipeline {
    pub fn new(
        config: &LessonwaveConfig,
        store: Arc<dyn JobStore>,
        extractor: Arc<dyn ConceptExtractor>,
        generator: Arc<dyn EpisodeGenerator>,
        audio: Arc<dyn AudioRenderer>,
    ) -> Self {
        let machine = Arc::new(PipelineStateMachine::new(store));
        let pool = Arc::new(GenerationWorkerPool::new(
            generator,
            config.pipeline.concurrency,
        ));
        let retries = RetryController::new(
            machine.clone(),
            pool.clone(),
            Duration::from_millis(config.pipeline.retry_delay_ms),
        );
        Self {
            gates: ApprovalGateController::new(machine.clone()),
            machine,
            planner: EpisodePlanner::new(config.planner.clone()),
            extractor,
            pool,
            retries,
            audio,
            planning_slots: Semaphore::new(config.pipeline.planning_slots.max(1)),
        }
    }

    pub fn machine(&self) -> &Arc<PipelineStateMachine> {
        &self.machine
    }

    /// Create a job and drive it to the plan gate.
    pub async fn submit(&self, source: ChapterSource) -> Result<JobStatus, PipelineError> {
        let job = self.machine.create(source).await?;
        Ok(self.drive(job.id).await?.status())
    }

    pub async fn get_status(&self, job_id: Uuid) -> Result<JobStatus, PipelineError> {
        self.machine.status(job_id).await
    }

    /// Re-drive a job from its last recorded stage. Gated and terminal
    /// stages are left as they are.
    pub async fn resume(&self, job_id: Uuid) -> Result<JobStatus, PipelineError> {
        let job = self.machine.load(job_id).await?;
        info!(job_id = %job_id, stage = %job.stage, "Resuming job");
        Ok(self.drive(job_id).await?.status())
    }

    /// Resume every stored job. A job that fails to resume is logged and
    /// skipped.
    pub async fn resume_all(&self) -> Result<Vec<JobStatus>, PipelineError> {
        let ids = self.machine.job_ids().await?;
        let mut statuses = Vec::with_capacity(ids.len());
        for job_id in ids {
            match self.resume(job_id).await {
                Ok(status) => statuses.push(status),
                Err(e) => warn!(job_id = %job_id, error = %e, "Resume failed"),
            }
        }
        Ok(statuses)
    }

    async fn drive(&self, job_id: Uuid) -> Result<Job, PipelineError> {
        loop {
            let job = self.machine.load(job_id).await?;
            debug!(job_id = %job_id, stage = %job.stage, "Driving job");
            match job.stage {
                Stage::Created => self.extract(job).await?,
                Stage::Extracted => self.analyze(job).await?,
                Stage::Analyzed => self.plan(job).await?,
                Stage::Planned => {
                    self.machine
                        .update(job_id, |job| job.await_approval(Gate::Plan))
                        .await?;
                }
                Stage::PlanApproved | Stage::Generating => self.generate(job).await?,
                Stage::ContentApproved | Stage::GeneratingAudio => self.render_audio(job).await?,
                Stage::AwaitingPlanApproval
                | Stage::AwaitingContentApproval
                | Stage::Completed
                | Stage::Failed
                | Stage::PartialSuccess => return Ok(job),
            }
        }
    }

    async fn fail(&self, job_id: Uuid, reason: String) -> Result<(), PipelineError> {
        warn!(job_id = %job_id, reason = %reason, "Job failed");
        self.machine.update(job_id, |job| job.fail(reason)).await?;
        Ok(())
    }

    // ─── Automatic stages ────────────────────────────────────────

    async fn extract(&self, job: Job) -> Result<(), PipelineError> {
        match self.extractor.extract(&job.source).await {
            Ok(mut extracted) => {
                if extracted.metadata.chapter_id.is_empty() {
                    extracted.metadata.chapter_id = job.chapter_id.clone();
                }
                info!(
                    job_id = %job.id,
                    chapter_id = %job.chapter_id,
                    concepts = extracted.concepts.len(),
                    "Concepts extracted"
                );
                self.machine
                    .update(job.id, |job| job.record_extraction(extracted))
                    .await?;
                Ok(())
            }
            Err(e) => self.fail(job.id, format!("extraction failed: {e:#}")).await,
        }
    }

    async fn analyze(&self, job: Job) -> Result<(), PipelineError> {
        let (subject, _) = job.subject_and_grade();
        match subject_support(subject) {
            SubjectSupport::Unsupported => {
                let err = PlanError::UnsupportedSubject(subject.to_string());
                self.fail(job.id, err.to_string()).await?;
                return Err(err.into());
            }
            SubjectSupport::Fallback => {
                warn!(job_id = %job.id, subject, "Unknown subject; using default treatment");
            }
            SubjectSupport::Supported => {}
        }

        let sizing = chapter_size(&job.concepts);
        info!(
            job_id = %job.id,
            size = %sizing.size,
            significant = sizing.significant_count,
            total_complexity = sizing.total_complexity,
            "Chapter analyzed"
        );
        self.machine
            .update(job.id, |job| job.record_analysis(sizing))
            .await?;
        Ok(())
    }

    async fn plan(&self, job: Job) -> Result<(), PipelineError> {
        // The semaphore is never closed.
        let _slot = self.planning_slots.acquire().await.ok();
        let metadata = job
            .metadata
            .clone()
            .unwrap_or_else(|| ChapterMetadata::new(job.chapter_id.clone()));

        match self.planner.plan_episodes(&job.concepts, &metadata) {
            Ok(plan) => {
                info!(
                    job_id = %job.id,
                    episodes = plan.episodes.len(),
                    fingerprint = %plan.metadata.input_fingerprint,
                    "Episode plan ready"
                );
                self.machine
                    .update(job.id, |job| job.record_plan(plan))
                    .await?;
                Ok(())
            }
            Err(e) => {
                self.fail(job.id, e.to_string()).await?;
                Err(e.into())
            }
        }
    }

    async fn generate(&self, job: Job) -> Result<(), PipelineError> {
        let job = if job.stage == Stage::PlanApproved {
            self.machine
                .update(job.id, |job| job.start_generation())
                .await?
                .0
        } else {
            job
        };

        let requests = job.generation_requests()?;
        let report = self.pool.run_wave(requests).await;
        let (job, outcome) = self
            .machine
            .update(job.id, |job| job.complete_wave(report))
            .await?;
        match outcome {
            WaveOutcome::Completed => info!(job_id = %job.id, "All episodes generated"),
            WaveOutcome::PartialSuccess | WaveOutcome::Failed => warn!(
                job_id = %job.id,
                stage = %job.stage,
                failed = ?job.failed_indices(),
                "Generation wave had failures"
            ),
        }
        Ok(())
    }

    async fn render_audio(&self, job: Job) -> Result<(), PipelineError> {
        let job = if job.stage == Stage::ContentApproved {
            self.machine.update(job.id, |job| job.start_audio()).await?.0
        } else {
            job
        };

        let mut assets = Vec::with_capacity(job.episode_results.len());
        for (&episode_index, content) in &job.episode_results {
            let request = AudioRequest {
                job_id: job.id,
                chapter_id: job.chapter_id.clone(),
                episode_index,
                content: content.clone(),
            };
            match self.audio.render(&request).await {
                Ok(asset) => {
                    debug!(job_id = %job.id, episode = episode_index, uri = %asset.uri, "Episode audio rendered");
                    assets.push(asset);
                }
                Err(e) => {
                    return self
                        .fail(
                            job.id,
                            format!("audio failed for episode {episode_index}: {e:#}"),
                        )
                        .await;
                }
            }
        }

        info!(job_id = %job.id, episodes = assets.len(), "Audio complete");
        self.machine
            .update(job.id, |job| job.complete_audio(assets))
            .await?;
        Ok(())
    }

    // ─── Gates ───────────────────────────────────────────────────

    /// Approve the plan and, on first approval only, run the generation wave.
    pub async fn approve_plan(
        &self,
        job_id: Uuid,
        approved_by: &str,
    ) -> Result<ApprovalOutcome, PipelineError> {
        let (_, outcome) = self.gates.approve_plan(job_id, approved_by).await?;
        if outcome == ApprovalOutcome::Approved {
            self.drive(job_id).await?;
        }
        Ok(outcome)
    }

    /// Send the plan back. The job waits in `analyzed` for `revise_concepts`
    /// or `resume`.
    pub async fn request_plan_revision(
        &self,
        job_id: Uuid,
        feedback: &str,
    ) -> Result<JobStatus, PipelineError> {
        Ok(self
            .gates
            .request_plan_revision(job_id, feedback)
            .await?
            .status())
    }

    /// Replace the concepts of a job under plan revision and re-plan.
    pub async fn revise_concepts(
        &self,
        job_id: Uuid,
        concepts: Vec<Concept>,
    ) -> Result<JobStatus, PipelineError> {
        let sizing = chapter_size(&concepts);
        self.machine
            .update(job_id, |job| job.replace_concepts(concepts, sizing))
            .await?;
        info!(job_id = %job_id, "Concepts revised");
        Ok(self.drive(job_id).await?.status())
    }

    /// Approve the content and, on first approval only, render audio.
    pub async fn approve_content(
        &self,
        job_id: Uuid,
        approved_by: &str,
    ) -> Result<ApprovalOutcome, PipelineError> {
        let (_, outcome) = self.gates.approve_content(job_id, approved_by).await?;
        if outcome == ApprovalOutcome::Approved {
            self.drive(job_id).await?;
        }
        Ok(outcome)
    }

    /// Send the content back and regenerate every episode with the feedback.
    pub async fn request_content_revision(
        &self,
        job_id: Uuid,
        feedback: &str,
    ) -> Result<JobStatus, PipelineError> {
        self.gates
            .request_content_revision(job_id, feedback)
            .await?;
        Ok(self.drive(job_id).await?.status())
    }

    // ─── Retries ─────────────────────────────────────────────────

    pub async fn retry_episode(
        &self,
        job_id: Uuid,
        episode_index: u32,
    ) -> Result<RetryOutcome, PipelineError> {
        self.retries.retry_episode(job_id, episode_index).await
    }

    pub async fn retry_all_failed(
        &self,
        job_id: Uuid,
    ) -> Result<Vec<(u32, RetryOutcome)>, PipelineError> {
        self.retries.retry_all_failed(job_id).await
    }
}
