//! Generation pipeline
//!
//! ```text
//! created ─► extracted ─► analyzed ─► planned ─► awaiting_plan_approval
//!                            ▲                        │ approve
//!                            └──── revise ────────────┤
//!                                                     ▼
//!      awaiting_content_approval ◄─ generating ◄─ plan_approved
//!               │ approve      └─► partial_success     ▲
//!               ├──── revise ──────────────────────────┘
//!               ▼
//!      content_approved ─► generating_audio ─► completed
//! ```
//!
//! `failed` is reachable from every non-terminal stage.

pub mod approval;
pub mod collaborators;
pub mod job;
pub mod machine;
pub mod runner;
pub mod stage;

use uuid::Uuid;

use crate::planner::PlanError;
use crate::store::StoreError;

pub use approval::ApprovalGateController;
pub use collaborators::{AudioAsset, AudioRenderer, AudioRequest, ConceptExtractor};
pub use job::{
    ApprovalOutcome, ApprovalRecord, ChapterSource, ExtractedChapter, FailedEpisode, Job,
    JobStatus, ResultSummary, RevisionRequest, StageTransition,
};
pub use machine::PipelineStateMachine;
pub use runner::Pipeline;
pub use stage::{Gate, Stage};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("job {0} not found")]
    JobNotFound(Uuid),

    #[error("job {job_id}: invalid transition {from} -> {to}")]
    InvalidTransition { job_id: Uuid, from: Stage, to: Stage },

    #[error("job {job_id}: {gate} approval required")]
    ApprovalRequired { job_id: Uuid, gate: Gate },

    #[error("job {0} has no episode plan")]
    MissingPlan(Uuid),

    #[error("job {job_id} has no episode {episode_index}")]
    UnknownEpisode { job_id: Uuid, episode_index: u32 },

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),
}
