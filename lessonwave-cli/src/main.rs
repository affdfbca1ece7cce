//! lessonwave - operator CLI for the episode pipeline.
//!
//! Jobs live as JSON files under the store directory, so each subcommand is
//! one step against persisted state:
//!
//!   lessonwave submit --concepts ch1.json --chapter-id ch1 --subject Biology
//!   lessonwave approve-plan --job <id> --by ana
//!   lessonwave retry --job <id> --episode 2
//!
//! Reads config from env vars (a `.env` file is honored):
//!   LESSONWAVE_CONFIG         - YAML config file
//!   LESSONWAVE_STORE_DIR      - job store directory (default: .lessonwave/jobs)
//!   LESSONWAVE_CONCURRENCY    - generation worker limit
//!   LESSONWAVE_RETRY_DELAY_MS - pause between retries

mod collaborators;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lessonwave_core::{
    ApprovalOutcome, ChapterMetadata, ChapterSource, EpisodePlanner, FileJobStore, JobStatus,
    LessonwaveConfig, Pipeline,
};
use uuid::Uuid;

use collaborators::{parse_chapter, JsonConceptExtractor, TemplateGenerator, TranscriptRenderer};

const DEFAULT_STORE_DIR: &str = ".lessonwave/jobs";

#[derive(Parser)]
#[command(name = "lessonwave")]
#[command(about = "Plan and produce curriculum audio episodes")]
struct Cli {
    /// Job store directory (overrides config)
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Where rendered transcripts are written
    #[arg(long, global = true, default_value = ".lessonwave/audio")]
    audio_dir: PathBuf,

    /// Episodes the stand-in generator should fail, e.g. `2,4`
    #[arg(long, global = true, value_delimiter = ',')]
    fail_episodes: Vec<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plan a chapter and print the plan, without creating a job
    Plan {
        #[arg(long)]
        concepts: PathBuf,
        #[arg(long)]
        chapter_id: String,
        #[arg(long)]
        subject: Option<String>,
    },

    /// Submit a chapter and run it to the plan approval gate
    Submit {
        #[arg(long)]
        concepts: PathBuf,
        #[arg(long)]
        chapter_id: String,
        #[arg(long)]
        subject: String,
        #[arg(long, default_value = "")]
        grade_band: String,
    },

    /// Show a job's status
    Status {
        #[arg(long)]
        job: Uuid,
    },

    /// Approve the plan and generate episodes
    ApprovePlan {
        #[arg(long)]
        job: Uuid,
        #[arg(long)]
        by: String,
    },

    /// Send the plan back for revision
    RevisePlan {
        #[arg(long)]
        job: Uuid,
        #[arg(long)]
        feedback: String,
        /// Replacement concepts; re-plans immediately
        #[arg(long)]
        concepts: Option<PathBuf>,
    },

    /// Approve generated content and render audio
    ApproveContent {
        #[arg(long)]
        job: Uuid,
        #[arg(long)]
        by: String,
    },

    /// Send the content back and regenerate with feedback
    ReviseContent {
        #[arg(long)]
        job: Uuid,
        #[arg(long)]
        feedback: String,
    },

    /// Retry one failed episode, or all of them
    Retry {
        #[arg(long)]
        job: Uuid,
        #[arg(long)]
        episode: Option<u32>,
    },

    /// Re-drive every stored job from its last recorded stage
    Resume,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lessonwave=info,lessonwave_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = LessonwaveConfig::from_env().context("loading configuration")?;

    if let Command::Plan {
        concepts,
        chapter_id,
        subject,
    } = &cli.command
    {
        return plan(&config, concepts, chapter_id, subject.as_deref());
    }

    let store_dir = cli
        .store_dir
        .clone()
        .or_else(|| config.pipeline.store_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_DIR));
    tracing::debug!(store_dir = %store_dir.display(), "Opening job store");

    let pipeline = Pipeline::new(
        &config,
        Arc::new(FileJobStore::new(store_dir)),
        Arc::new(JsonConceptExtractor),
        Arc::new(TemplateGenerator::new(cli.fail_episodes.iter().copied())),
        Arc::new(TranscriptRenderer::new(cli.audio_dir.clone())),
    );

    match cli.command {
        Command::Plan { .. } => Ok(()),
        Command::Submit {
            concepts,
            chapter_id,
            subject,
            grade_band,
        } => {
            let text = read(&concepts)?;
            let source = ChapterSource::new(chapter_id, subject, text).with_grade_band(grade_band);
            print_status(&pipeline.submit(source).await?)
        }
        Command::Status { job } => print_status(&pipeline.get_status(job).await?),
        Command::ApprovePlan { job, by } => {
            let outcome = pipeline.approve_plan(job, &by).await?;
            report_approval(outcome);
            print_status(&pipeline.get_status(job).await?)
        }
        Command::RevisePlan {
            job,
            feedback,
            concepts,
        } => {
            let mut status = pipeline.request_plan_revision(job, &feedback).await?;
            if let Some(path) = concepts {
                let chapter = parse_chapter(&read(&path)?, ChapterMetadata::new(status.chapter_id.clone()))?;
                status = pipeline.revise_concepts(job, chapter.concepts).await?;
            }
            print_status(&status)
        }
        Command::ApproveContent { job, by } => {
            let outcome = pipeline.approve_content(job, &by).await?;
            report_approval(outcome);
            print_status(&pipeline.get_status(job).await?)
        }
        Command::ReviseContent { job, feedback } => {
            print_status(&pipeline.request_content_revision(job, &feedback).await?)
        }
        Command::Retry { job, episode } => {
            let outcomes = match episode {
                Some(index) => vec![(index, pipeline.retry_episode(job, index).await?)],
                None => pipeline.retry_all_failed(job).await?,
            };
            println!("{}", serde_json::to_string_pretty(&outcomes)?);
            print_status(&pipeline.get_status(job).await?)
        }
        Command::Resume => {
            let statuses = pipeline.resume_all().await?;
            println!("{}", serde_json::to_string_pretty(&statuses)?);
            Ok(())
        }
    }
}

fn plan(
    config: &LessonwaveConfig,
    concepts: &Path,
    chapter_id: &str,
    subject: Option<&str>,
) -> Result<()> {
    let mut fallback = ChapterMetadata::new(chapter_id);
    fallback.subject = subject.unwrap_or_default().to_string();
    let chapter = parse_chapter(&read(concepts)?, fallback)?;

    let plan = EpisodePlanner::new(config.planner.clone())
        .plan_episodes(&chapter.concepts, &chapter.metadata)
        .context("planning failed")?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn report_approval(outcome: ApprovalOutcome) {
    match outcome {
        ApprovalOutcome::Approved => eprintln!("approved"),
        ApprovalOutcome::AlreadyApproved => eprintln!("already approved; nothing to do"),
    }
}

fn print_status(status: &JobStatus) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(status)?);
    Ok(())
}
