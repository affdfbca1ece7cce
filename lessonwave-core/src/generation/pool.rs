//! Bounded-concurrency generation wave.
//!
//! Every task runs to completion regardless of its siblings' failures. Results
//! are reassembled in episode order before they leave the pool.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{EpisodeGenerator, GenerationRequest, GenerationTask, TaskStatus};

/// Default number of concurrent generation tasks.
pub const DEFAULT_CONCURRENCY: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveOutcome {
    /// Every task succeeded.
    Completed,
    /// Some, not all, tasks failed.
    PartialSuccess,
    /// No task succeeded.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveReport {
    /// Sorted by episode index.
    pub tasks: Vec<GenerationTask>,
}

impl WaveReport {
    pub fn outcome(&self) -> WaveOutcome {
        let succeeded = self.succeeded_count();
        if succeeded == self.tasks.len() {
            WaveOutcome::Completed
        } else if succeeded == 0 {
            WaveOutcome::Failed
        } else {
            WaveOutcome::PartialSuccess
        }
    }

    pub fn succeeded_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Succeeded)
            .count()
    }

    pub fn failed_indices(&self) -> Vec<u32> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .map(|t| t.episode_index)
            .collect()
    }
}

pub struct GenerationWorkerPool {
    generator: Arc<dyn EpisodeGenerator>,
    concurrency: usize,
}

impl GenerationWorkerPool {
    pub fn new(generator: Arc<dyn EpisodeGenerator>, concurrency: usize) -> Self {
        Self {
            generator,
            concurrency: concurrency.max(1),
        }
    }

    /// Run one wave: up to `concurrency` generator calls in flight at once.
    pub async fn run_wave(&self, requests: Vec<GenerationRequest>) -> WaveReport {
        let total = requests.len();
        info!(episodes = total, concurrency = self.concurrency, "Generation wave started");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(total);

        for request in requests {
            let generator = self.generator.clone();
            let semaphore = semaphore.clone();
            let index = request.episode_index;
            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| anyhow!("worker pool closed"))?;
                debug!(episode = index, "Generating episode");
                generator.generate(&request).await
            });
            handles.push((index, handle));
        }

        let mut tasks = Vec::with_capacity(total);
        for (index, handle) in handles {
            let mut task = GenerationTask::pending(index);
            match handle.await {
                Ok(Ok(content)) => task.succeed(content),
                Ok(Err(e)) => {
                    warn!(episode = index, error = %format!("{e:#}"), "Episode generation failed");
                    task.fail(format!("{e:#}"));
                }
                Err(e) => {
                    warn!(episode = index, error = %e, "Episode generation task aborted");
                    task.fail(format!("generation task aborted: {e}"));
                }
            }
            tasks.push(task);
        }
        tasks.sort_by_key(|t| t.episode_index);

        let report = WaveReport { tasks };
        info!(
            episodes = total,
            succeeded = report.succeeded_count(),
            failed = total - report.succeeded_count(),
            "Generation wave finished"
        );
        report
    }

    /// Run a single episode outside a wave, as retries do. Like a wave task,
    /// a panicking generator yields a failed task.
    pub async fn run_one(&self, request: GenerationRequest, retry_count: u32) -> GenerationTask {
        let index = request.episode_index;
        let mut task = GenerationTask::pending(index);
        task.retry_count = retry_count;
        task.status = TaskStatus::Running;

        let generator = self.generator.clone();
        let handle = tokio::spawn(async move { generator.generate(&request).await });
        match handle.await {
            Ok(Ok(content)) => task.succeed(content),
            Ok(Err(e)) => task.fail(format!("{e:#}")),
            Err(e) => {
                warn!(episode = index, error = %e, "Episode retry task aborted");
                task.fail(format!("generation task aborted: {e}"));
            }
        }
        task
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::EpisodeContent;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    /// Fails the listed episodes, records peak concurrency, and finishes
    /// later episodes first.
    struct Recorder {
        fail: Vec<u32>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Recorder {
        fn new(fail: Vec<u32>) -> Self {
            Self {
                fail,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EpisodeGenerator for Recorder {
        async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<EpisodeContent> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let delay = 50 - u64::from(request.episode_index) * 5;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail.contains(&request.episode_index) {
                anyhow::bail!("model refused episode {}", request.episode_index);
            }
            Ok(EpisodeContent {
                script: format!("script {}", request.episode_index),
                mcqs: Vec::new(),
            })
        }
    }

    fn requests(n: u32) -> Vec<GenerationRequest> {
        (1..=n)
            .map(|i| GenerationRequest {
                job_id: Uuid::nil(),
                chapter_id: "ch1".to_string(),
                subject: "Science".to_string(),
                grade_band: "6-8".to_string(),
                episode_index: i,
                concepts: Vec::new(),
                target_duration_minutes: 5,
                target_word_count: 700,
                feedback: None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let recorder = Arc::new(Recorder::new(Vec::new()));
        let pool = GenerationWorkerPool::new(recorder.clone(), 3);
        let report = pool.run_wave(requests(8)).await;
        assert_eq!(report.outcome(), WaveOutcome::Completed);
        assert!(recorder.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_isolated_and_ordered() {
        let pool = GenerationWorkerPool::new(Arc::new(Recorder::new(vec![2, 4])), 3);
        let report = pool.run_wave(requests(5)).await;

        let indices: Vec<u32> = report.tasks.iter().map(|t| t.episode_index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4, 5]);
        assert_eq!(report.outcome(), WaveOutcome::PartialSuccess);
        assert_eq!(report.failed_indices(), vec![2, 4]);
        assert!(report.tasks[1]
            .error
            .as_deref()
            .unwrap()
            .contains("model refused episode 2"));
        assert_eq!(report.tasks[4].output.as_ref().unwrap().script, "script 5");
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failed_wave() {
        let pool = GenerationWorkerPool::new(Arc::new(Recorder::new(vec![1, 2])), 3);
        let report = pool.run_wave(requests(2)).await;
        assert_eq!(report.outcome(), WaveOutcome::Failed);
    }

    struct Panics;

    #[async_trait]
    impl EpisodeGenerator for Panics {
        async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<EpisodeContent> {
            if request.episode_index == 1 {
                panic!("generator bug");
            }
            Ok(EpisodeContent {
                script: String::new(),
                mcqs: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_panicking_task_counts_as_failure() {
        let pool = GenerationWorkerPool::new(Arc::new(Panics), 2);
        let report = pool.run_wave(requests(2)).await;
        assert_eq!(report.failed_indices(), vec![1]);
        assert_eq!(report.outcome(), WaveOutcome::PartialSuccess);
    }

    #[tokio::test]
    async fn test_panicking_single_run_counts_as_failure() {
        let pool = GenerationWorkerPool::new(Arc::new(Panics), 2);
        let request = requests(1).remove(0);
        let task = pool.run_one(request, 1).await;
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.retry_count, 1);
        assert!(task.error.as_deref().unwrap().contains("aborted"));
    }
}
