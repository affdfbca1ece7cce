//! Job record
//!
//! The job is the only persisted state in the pipeline. It changes only
//! through the named methods below; each one checks the transition table and
//! appends to `history`. Callers go through `PipelineStateMachine::update` so
//! the change is persisted before anyone acts on it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::collaborators::AudioAsset;
use super::stage::{Gate, Stage};
use super::PipelineError;
use crate::generation::{
    build_request, EpisodeContent, GenerationRequest, GenerationTask, RetryOutcome, TaskStatus,
    WaveOutcome, WaveReport,
};
use crate::planner::ChapterSizing;
use crate::types::{ChapterMetadata, Concept, EpisodePlan};

/// Raw chapter as submitted, before extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterSource {
    pub chapter_id: String,
    pub subject: String,
    #[serde(default)]
    pub grade_band: String,
    pub text: String,
}

impl ChapterSource {
    pub fn new(
        chapter_id: impl Into<String>,
        subject: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            chapter_id: chapter_id.into(),
            subject: subject.into(),
            grade_band: String::new(),
            text: text.into(),
        }
    }

    pub fn with_grade_band(mut self, grade_band: impl Into<String>) -> Self {
        self.grade_band = grade_band.into();
        self
    }
}

/// Output of the concept-extraction collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedChapter {
    pub metadata: ChapterMetadata,
    pub concepts: Vec<Concept>,
}

/// One approval. Bound to the gate round it was given in, so it unlocks
/// exactly one transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub gate: Gate,
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
    pub round: u32,
}

impl ApprovalRecord {
    /// Name of the stage this record released.
    pub fn stage_name(&self) -> &'static str {
        self.gate.awaiting_stage().as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionRequest {
    pub gate: Gate,
    pub feedback: String,
    pub requested_at: DateTime<Utc>,
    pub round: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedEpisode {
    pub episode_index: u32,
    pub error: String,
    pub retry_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: Stage,
    pub to: Stage,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved,
    /// The current round was already approved; nothing changed.
    AlreadyApproved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub chapter_id: String,
    pub stage: Stage,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
    pub source: ChapterSource,
    pub metadata: Option<ChapterMetadata>,
    #[serde(default)]
    pub concepts: Vec<Concept>,
    pub analysis: Option<ChapterSizing>,
    pub plan: Option<EpisodePlan>,
    /// Append-only.
    #[serde(default)]
    pub approvals: Vec<ApprovalRecord>,
    #[serde(default)]
    pub revisions: Vec<RevisionRequest>,
    #[serde(default)]
    pub plan_round: u32,
    #[serde(default)]
    pub content_round: u32,
    #[serde(default)]
    pub episode_results: BTreeMap<u32, EpisodeContent>,
    /// Sorted by episode index.
    #[serde(default)]
    pub failed_episodes: Vec<FailedEpisode>,
    #[serde(default)]
    pub audio: BTreeMap<u32, AudioAsset>,
    #[serde(default)]
    pub history: Vec<StageTransition>,
    /// Store record revision, bumped on every persisted change.
    #[serde(default)]
    pub revision: u64,
}

impl Job {
    pub fn new(source: ChapterSource) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            chapter_id: source.chapter_id.clone(),
            stage: Stage::Created,
            progress: 0,
            created_at: now,
            updated_at: now,
            error: None,
            source,
            metadata: None,
            concepts: Vec::new(),
            analysis: None,
            plan: None,
            approvals: Vec::new(),
            revisions: Vec::new(),
            plan_round: 0,
            content_round: 0,
            episode_results: BTreeMap::new(),
            failed_episodes: Vec::new(),
            audio: BTreeMap::new(),
            history: Vec::new(),
            revision: 0,
        }
    }

    fn transition(&mut self, to: Stage, reason: Option<String>) -> Result<(), PipelineError> {
        if !self.stage.can_transition_to(to) {
            return Err(PipelineError::InvalidTransition {
                job_id: self.id,
                from: self.stage,
                to,
            });
        }
        let now = Utc::now();
        self.history.push(StageTransition {
            from: self.stage,
            to,
            at: now,
            reason,
        });
        self.stage = to;
        if !matches!(to, Stage::Failed | Stage::PartialSuccess) {
            self.progress = to.base_progress();
        }
        self.updated_at = now;
        Ok(())
    }

    fn require_stage(&self, expected: Stage, to: Stage) -> Result<(), PipelineError> {
        if self.stage != expected {
            return Err(PipelineError::InvalidTransition {
                job_id: self.id,
                from: self.stage,
                to,
            });
        }
        Ok(())
    }

    fn round(&self, gate: Gate) -> u32 {
        match gate {
            Gate::Plan => self.plan_round,
            Gate::Content => self.content_round,
        }
    }

    /// A recorded approval for the gate's current round.
    pub fn approval(&self, gate: Gate) -> Option<&ApprovalRecord> {
        let round = self.round(gate);
        self.approvals
            .iter()
            .rev()
            .find(|a| a.gate == gate && a.round == round)
    }

    /// Feedback from a revision of the gate's current round.
    pub fn feedback(&self, gate: Gate) -> Option<&str> {
        let round = self.round(gate);
        self.revisions
            .iter()
            .rev()
            .find(|r| r.gate == gate && r.round == round)
            .map(|r| r.feedback.as_str())
    }

    pub fn is_failed(&self, episode_index: u32) -> bool {
        self.failed_episodes
            .iter()
            .any(|f| f.episode_index == episode_index)
    }

    pub fn failed_indices(&self) -> Vec<u32> {
        self.failed_episodes.iter().map(|f| f.episode_index).collect()
    }

    /// Subject and grade band, preferring what extraction found.
    pub fn subject_and_grade(&self) -> (&str, &str) {
        match &self.metadata {
            Some(m) if !m.subject.is_empty() => (m.subject.as_str(), m.grade_band.as_str()),
            _ => (self.source.subject.as_str(), self.source.grade_band.as_str()),
        }
    }

    /// Request for one planned episode, carrying the current content feedback.
    pub fn generation_request(&self, episode_index: u32) -> Result<GenerationRequest, PipelineError> {
        let plan = self.plan.as_ref().ok_or(PipelineError::MissingPlan(self.id))?;
        let (subject, grade_band) = self.subject_and_grade();
        build_request(
            self.id,
            plan,
            &self.concepts,
            subject,
            grade_band,
            episode_index,
            self.feedback(Gate::Content).map(str::to_string),
        )
        .ok_or(PipelineError::UnknownEpisode {
            job_id: self.id,
            episode_index,
        })
    }

    /// One request per planned episode, in ordinal order.
    pub fn generation_requests(&self) -> Result<Vec<GenerationRequest>, PipelineError> {
        let plan = self.plan.as_ref().ok_or(PipelineError::MissingPlan(self.id))?;
        plan.episodes
            .iter()
            .map(|e| self.generation_request(e.ordinal))
            .collect()
    }

    // ─── Automatic transitions ───────────────────────────────────

    pub fn record_extraction(&mut self, extracted: ExtractedChapter) -> Result<(), PipelineError> {
        self.require_stage(Stage::Created, Stage::Extracted)?;
        self.transition(Stage::Extracted, None)?;
        self.metadata = Some(extracted.metadata);
        self.concepts = extracted.concepts;
        Ok(())
    }

    pub fn record_analysis(&mut self, sizing: ChapterSizing) -> Result<(), PipelineError> {
        self.require_stage(Stage::Extracted, Stage::Analyzed)?;
        self.transition(Stage::Analyzed, None)?;
        self.analysis = Some(sizing);
        Ok(())
    }

    pub fn record_plan(&mut self, plan: EpisodePlan) -> Result<(), PipelineError> {
        self.require_stage(Stage::Analyzed, Stage::Planned)?;
        self.transition(Stage::Planned, None)?;
        self.plan = Some(plan);
        Ok(())
    }

    /// Enter the gate's awaiting stage and open a new approval round.
    pub fn await_approval(&mut self, gate: Gate) -> Result<(), PipelineError> {
        self.transition(gate.awaiting_stage(), None)?;
        match gate {
            Gate::Plan => self.plan_round += 1,
            Gate::Content => self.content_round += 1,
        }
        Ok(())
    }

    /// Begin a generation wave. Clears results from any earlier wave.
    pub fn start_generation(&mut self) -> Result<(), PipelineError> {
        if self.plan.is_none() {
            return Err(PipelineError::MissingPlan(self.id));
        }
        if self.approval(Gate::Plan).is_none() {
            return Err(PipelineError::ApprovalRequired {
                job_id: self.id,
                gate: Gate::Plan,
            });
        }
        self.require_stage(Stage::PlanApproved, Stage::Generating)?;
        self.transition(Stage::Generating, None)?;
        self.episode_results.clear();
        self.failed_episodes.clear();
        self.error = None;
        Ok(())
    }

    /// Fold a finished wave into the job.
    pub fn complete_wave(&mut self, report: WaveReport) -> Result<WaveOutcome, PipelineError> {
        let outcome = report.outcome();
        let target = match outcome {
            WaveOutcome::Completed => Stage::AwaitingContentApproval,
            WaveOutcome::PartialSuccess => Stage::PartialSuccess,
            WaveOutcome::Failed => Stage::Failed,
        };
        self.require_stage(Stage::Generating, target)?;

        let total = report.tasks.len();
        for task in report.tasks {
            self.fold_task(task);
        }
        if total > 0 {
            let done = self.episode_results.len() * 40 / total;
            self.progress = 40 + done as u8;
        }

        match outcome {
            WaveOutcome::Completed => self.await_approval(Gate::Content)?,
            WaveOutcome::PartialSuccess | WaveOutcome::Failed => {
                let summary = self.failure_summary();
                self.transition(target, Some(summary.clone()))?;
                self.error = Some(summary);
            }
        }
        Ok(outcome)
    }

    fn fold_task(&mut self, task: GenerationTask) {
        let index = task.episode_index;
        self.failed_episodes.retain(|f| f.episode_index != index);
        match (task.status, task.output) {
            (TaskStatus::Succeeded, Some(content)) => {
                self.episode_results.insert(index, content);
            }
            (_, _) => {
                self.episode_results.remove(&index);
                self.failed_episodes.push(FailedEpisode {
                    episode_index: index,
                    error: task.error.unwrap_or_else(|| "no output".to_string()),
                    retry_count: task.retry_count,
                });
                self.failed_episodes.sort_by_key(|f| f.episode_index);
            }
        }
    }

    fn failure_summary(&self) -> String {
        let parts: Vec<String> = self
            .failed_episodes
            .iter()
            .map(|f| format!("episode {}: {}", f.episode_index, f.error))
            .collect();
        format!(
            "{} episode(s) failed: {}",
            self.failed_episodes.len(),
            parts.join("; ")
        )
    }

    pub fn start_audio(&mut self) -> Result<(), PipelineError> {
        if self.approval(Gate::Content).is_none() {
            return Err(PipelineError::ApprovalRequired {
                job_id: self.id,
                gate: Gate::Content,
            });
        }
        self.require_stage(Stage::ContentApproved, Stage::GeneratingAudio)?;
        self.transition(Stage::GeneratingAudio, None)?;
        self.audio.clear();
        Ok(())
    }

    pub fn complete_audio(&mut self, assets: Vec<AudioAsset>) -> Result<(), PipelineError> {
        self.require_stage(Stage::GeneratingAudio, Stage::Completed)?;
        self.transition(Stage::Completed, None)?;
        self.audio = assets.into_iter().map(|a| (a.episode_index, a)).collect();
        Ok(())
    }

    /// Move a non-terminal job to `failed`.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), PipelineError> {
        let reason = reason.into();
        self.transition(Stage::Failed, Some(reason.clone()))?;
        self.error = Some(reason);
        Ok(())
    }

    // ─── Gated transitions ───────────────────────────────────────

    pub fn approve(&mut self, gate: Gate, approved_by: &str) -> Result<ApprovalOutcome, PipelineError> {
        if self.approval(gate).is_some() {
            return Ok(ApprovalOutcome::AlreadyApproved);
        }
        self.require_stage(gate.awaiting_stage(), gate.approved_stage())?;
        self.approvals.push(ApprovalRecord {
            gate,
            approved_by: approved_by.to_string(),
            approved_at: Utc::now(),
            round: self.round(gate),
        });
        self.transition(gate.approved_stage(), Some(format!("approved by {approved_by}")))?;
        Ok(ApprovalOutcome::Approved)
    }

    /// Send the job back for rework. A plan revision clears the plan and
    /// returns to `analyzed`; a content revision returns to `plan_approved`
    /// for a fresh wave.
    pub fn request_revision(&mut self, gate: Gate, feedback: &str) -> Result<(), PipelineError> {
        let back_to = match gate {
            Gate::Plan => Stage::Analyzed,
            Gate::Content => Stage::PlanApproved,
        };
        self.require_stage(gate.awaiting_stage(), back_to)?;
        self.revisions.push(RevisionRequest {
            gate,
            feedback: feedback.to_string(),
            requested_at: Utc::now(),
            round: self.round(gate),
        });
        self.transition(back_to, Some(format!("{gate} revision requested")))?;
        if gate == Gate::Plan {
            self.plan = None;
        }
        Ok(())
    }

    /// Replace the concept list of a job sent back for plan revision.
    pub fn replace_concepts(
        &mut self,
        concepts: Vec<Concept>,
        sizing: ChapterSizing,
    ) -> Result<(), PipelineError> {
        self.require_stage(Stage::Analyzed, Stage::Planned)?;
        self.concepts = concepts;
        self.analysis = Some(sizing);
        self.updated_at = Utc::now();
        Ok(())
    }

    // ─── Retry recovery ──────────────────────────────────────────

    /// Fold a single retried episode into the job.
    ///
    /// Once no failed episodes remain the job moves on to content approval.
    pub fn record_retry(&mut self, task: GenerationTask) -> Result<RetryOutcome, PipelineError> {
        let index = task.episode_index;
        if !self.is_failed(index) {
            return Ok(RetryOutcome::NotFailed);
        }
        let succeeded = task.status == TaskStatus::Succeeded;
        let error = task.error.clone();
        self.fold_task(task);
        self.updated_at = Utc::now();

        if !succeeded {
            let error = error.unwrap_or_else(|| "no output".to_string());
            self.error = Some(self.failure_summary());
            return Ok(RetryOutcome::StillFailing { error });
        }

        if self.failed_episodes.is_empty() {
            self.error = None;
            self.await_approval(Gate::Content)?;
        } else {
            self.error = Some(self.failure_summary());
        }
        Ok(RetryOutcome::Recovered)
    }

    // ─── Status ──────────────────────────────────────────────────

    pub fn status(&self) -> JobStatus {
        JobStatus {
            job_id: self.id,
            chapter_id: self.chapter_id.clone(),
            stage: self.stage,
            progress: self.progress,
            error: self.error.clone(),
            result_summary: self.plan.as_ref().map(|plan| ResultSummary {
                episode_count: plan.episodes.len(),
                succeeded_episodes: self.episode_results.keys().copied().collect(),
                failed_episodes: self.failed_episodes.clone(),
                audio_episodes: self.audio.keys().copied().collect(),
            }),
        }
    }
}

/// Polling view of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: Uuid,
    pub chapter_id: String,
    pub stage: Stage,
    pub progress: u8,
    pub error: Option<String>,
    pub result_summary: Option<ResultSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub episode_count: usize,
    pub succeeded_episodes: Vec<u32>,
    pub failed_episodes: Vec<FailedEpisode>,
    pub audio_episodes: Vec<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{chapter_size, EpisodePlanner};

    fn planned_job() -> Job {
        let concepts = vec![
            Concept::new("a", "Atoms").with_importance(4),
            Concept::new("b", "Bonds").with_importance(3),
        ];
        let metadata = ChapterMetadata::new("ch1");
        let plan = EpisodePlanner::default()
            .plan_episodes(&concepts, &metadata)
            .unwrap();

        let mut job = Job::new(ChapterSource::new("ch1", "Chemistry", "text"));
        job.record_extraction(ExtractedChapter {
            metadata,
            concepts: concepts.clone(),
        })
        .unwrap();
        job.record_analysis(chapter_size(&concepts)).unwrap();
        job.record_plan(plan).unwrap();
        job.await_approval(Gate::Plan).unwrap();
        job
    }

    fn wave(results: &[(u32, bool)]) -> WaveReport {
        let tasks = results
            .iter()
            .map(|&(index, ok)| {
                let mut task = GenerationTask::pending(index);
                if ok {
                    task.succeed(EpisodeContent {
                        script: format!("s{index}"),
                        mcqs: Vec::new(),
                    });
                } else {
                    task.fail(format!("boom {index}"));
                }
                task
            })
            .collect();
        WaveReport { tasks }
    }

    #[test]
    fn test_generation_requires_plan_approval() {
        let mut job = planned_job();
        let err = job.start_generation().unwrap_err();
        assert!(matches!(err, PipelineError::ApprovalRequired { gate: Gate::Plan, .. }));
        assert_eq!(job.stage, Stage::AwaitingPlanApproval);
    }

    #[test]
    fn test_second_approval_is_a_no_op() {
        let mut job = planned_job();
        assert_eq!(job.approve(Gate::Plan, "ana").unwrap(), ApprovalOutcome::Approved);
        let snapshot = job.clone();
        assert_eq!(
            job.approve(Gate::Plan, "ana").unwrap(),
            ApprovalOutcome::AlreadyApproved
        );
        assert_eq!(job, snapshot);
        assert_eq!(job.approvals.len(), 1);
        assert_eq!(job.approvals[0].stage_name(), "awaiting_plan_approval");
    }

    #[test]
    fn test_plan_revision_requires_fresh_approval() {
        let mut job = planned_job();
        job.request_revision(Gate::Plan, "too long").unwrap();
        assert_eq!(job.stage, Stage::Analyzed);
        assert!(job.plan.is_none());
        assert_eq!(job.feedback(Gate::Plan), Some("too long"));

        let plan = EpisodePlanner::default()
            .plan_episodes(&job.concepts, &ChapterMetadata::new("ch1"))
            .unwrap();
        job.record_plan(plan).unwrap();
        job.await_approval(Gate::Plan).unwrap();
        assert_eq!(job.plan_round, 2);
        assert!(job.approval(Gate::Plan).is_none());
    }

    #[test]
    fn test_partial_wave_lists_failures() {
        let mut job = planned_job();
        job.approve(Gate::Plan, "ana").unwrap();
        job.start_generation().unwrap();
        let outcome = job
            .complete_wave(wave(&[(1, true), (2, false), (3, true)]))
            .unwrap();

        assert_eq!(outcome, WaveOutcome::PartialSuccess);
        assert_eq!(job.stage, Stage::PartialSuccess);
        assert_eq!(job.failed_indices(), vec![2]);
        assert!(job.error.as_deref().unwrap().contains("episode 2: boom 2"));
        assert_eq!(job.episode_results.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_retry_clearing_last_failure_awaits_content_approval() {
        let mut job = planned_job();
        job.approve(Gate::Plan, "ana").unwrap();
        job.start_generation().unwrap();
        job.complete_wave(wave(&[(1, false), (2, false)])).unwrap();
        assert_eq!(job.stage, Stage::Failed);

        let mut ok = GenerationTask::pending(1);
        ok.retry_count = 1;
        ok.succeed(EpisodeContent {
            script: "again".into(),
            mcqs: Vec::new(),
        });
        assert_eq!(job.record_retry(ok.clone()).unwrap(), RetryOutcome::Recovered);
        assert_eq!(job.stage, Stage::Failed);
        assert_eq!(job.failed_indices(), vec![2]);

        // Already succeeded: nothing to do.
        assert_eq!(job.record_retry(ok).unwrap(), RetryOutcome::NotFailed);

        let mut ok2 = GenerationTask::pending(2);
        ok2.succeed(EpisodeContent {
            script: "two".into(),
            mcqs: Vec::new(),
        });
        job.record_retry(ok2).unwrap();
        assert_eq!(job.stage, Stage::AwaitingContentApproval);
        assert!(job.error.is_none());
        assert_eq!(job.content_round, 1);
    }

    #[test]
    fn test_audio_requires_content_approval() {
        let mut job = planned_job();
        job.approve(Gate::Plan, "ana").unwrap();
        job.start_generation().unwrap();
        job.complete_wave(wave(&[(1, true)])).unwrap();
        assert!(matches!(
            job.start_audio().unwrap_err(),
            PipelineError::ApprovalRequired { gate: Gate::Content, .. }
        ));

        job.request_revision(Gate::Content, "more examples").unwrap();
        assert_eq!(job.stage, Stage::PlanApproved);
        assert_eq!(job.feedback(Gate::Content), Some("more examples"));
        // Plan approval still holds for the regenerated wave.
        job.start_generation().unwrap();
        assert!(job.episode_results.is_empty());
    }

    #[test]
    fn test_terminal_job_cannot_fail_again() {
        let mut job = Job::new(ChapterSource::new("ch1", "Biology", "text"));
        job.fail("extractor down").unwrap();
        assert!(matches!(
            job.fail("again").unwrap_err(),
            PipelineError::InvalidTransition { from: Stage::Failed, .. }
        ));
        assert_eq!(job.status().error.as_deref(), Some("extractor down"));
        assert!(job.status().result_summary.is_none());
    }
}
