//! Lessonwave core
//!
//! Turns a chapter's extracted concepts into a deterministic episode plan and
//! drives each chapter through human-approved script generation and audio.
//!
//! - [`planner`]: pure, deterministic concept-to-episode clustering.
//! - [`pipeline`]: persisted job state machine, approval gates, the driver.
//! - [`generation`]: bounded-concurrency generation waves and retries.
//! - [`store`]: keyed job persistence.

pub mod config;
pub mod generation;
pub mod pipeline;
pub mod planner;
pub mod store;
pub mod types;

pub use config::{ConfigError, LessonwaveConfig, PipelineConfig, PlannerConfig};
pub use generation::{
    EpisodeContent, EpisodeGenerator, GenerationRequest, GenerationTask, GenerationWorkerPool,
    Mcq, RetryController, RetryOutcome, TaskStatus, WaveOutcome, WaveReport,
};
pub use pipeline::{
    ApprovalOutcome, AudioAsset, AudioRenderer, AudioRequest, ChapterSource, ConceptExtractor,
    ExtractedChapter, Gate, Job, JobStatus, Pipeline, PipelineError, PipelineStateMachine, Stage,
};
pub use planner::{input_fingerprint, EpisodePlanner, PlanError};
pub use store::{FileJobStore, JobStore, MemoryJobStore, StoreError};
pub use types::{
    BloomsLevel, ChapterMetadata, Concept, ConceptType, DependencyEdge, Difficulty, Episode,
    EpisodePlan, PlanWarning, Provenance, SizeCategory,
};
