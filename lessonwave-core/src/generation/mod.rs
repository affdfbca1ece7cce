//! Episode generation
//!
//! The script/MCQ generator is an injected collaborator. The worker pool
//! fans a wave of requests out to it under a concurrency limit; the retry
//! controller re-runs individual failures afterwards.

pub mod pool;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Concept, EpisodePlan};

pub use pool::{GenerationWorkerPool, WaveOutcome, WaveReport};
pub use retry::{RetryController, RetryOutcome};

/// Everything the generator needs for one episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub job_id: Uuid,
    pub chapter_id: String,
    pub subject: String,
    pub grade_band: String,
    pub episode_index: u32,
    pub concepts: Vec<Concept>,
    pub target_duration_minutes: u32,
    pub target_word_count: u32,
    /// Reviewer feedback from the latest content revision, if any.
    pub feedback: Option<String>,
}

impl GenerationRequest {
    pub fn concept_ids(&self) -> Vec<&str> {
        self.concepts.iter().map(|c| c.id.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mcq {
    pub question: String,
    pub options: Vec<String>,
    pub answer_index: usize,
}

/// Generated script and quiz for one episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeContent {
    pub script: String,
    #[serde(default)]
    pub mcqs: Vec<Mcq>,
}

/// Script/MCQ generation for one episode. Timeouts are the implementor's
/// concern and should surface as an ordinary error.
#[async_trait]
pub trait EpisodeGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<EpisodeContent>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One episode's generation within a wave. Owned by the pool until the wave
/// ends, then folded into the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTask {
    pub episode_index: u32,
    pub status: TaskStatus,
    pub error: Option<String>,
    pub retry_count: u32,
    pub output: Option<EpisodeContent>,
}

impl GenerationTask {
    pub fn pending(episode_index: u32) -> Self {
        Self {
            episode_index,
            status: TaskStatus::Pending,
            error: None,
            retry_count: 0,
            output: None,
        }
    }

    pub fn succeed(&mut self, content: EpisodeContent) {
        self.status = TaskStatus::Succeeded;
        self.error = None;
        self.output = Some(content);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.output = None;
    }
}

/// Build the request for `episode_index` from the plan and concept list.
/// Returns `None` if the plan has no such episode.
pub fn build_request(
    job_id: Uuid,
    plan: &EpisodePlan,
    concepts: &[Concept],
    subject: &str,
    grade_band: &str,
    episode_index: u32,
    feedback: Option<String>,
) -> Option<GenerationRequest> {
    let episode = plan.episode(episode_index)?;
    let concepts = episode
        .concept_ids
        .iter()
        .filter_map(|id| concepts.iter().find(|c| &c.id == id).cloned())
        .collect();
    Some(GenerationRequest {
        job_id,
        chapter_id: plan.chapter_id.clone(),
        subject: subject.to_string(),
        grade_band: grade_band.to_string(),
        episode_index,
        concepts,
        target_duration_minutes: episode.target_duration_minutes,
        target_word_count: episode.target_word_count,
        feedback,
    })
}
