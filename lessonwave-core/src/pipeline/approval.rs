//! Approval gates in front of generation and audio.
//!
//! Recording an approval is the only way past a gate. Approving a round that
//! is already approved is a no-op and reports `AlreadyApproved`, so callers
//! can tell whether they are the one who should start downstream work.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use super::job::{ApprovalOutcome, Job};
use super::machine::PipelineStateMachine;
use super::stage::Gate;
use super::PipelineError;

pub struct ApprovalGateController {
    machine: Arc<PipelineStateMachine>,
}

impl ApprovalGateController {
    pub fn new(machine: Arc<PipelineStateMachine>) -> Self {
        Self { machine }
    }

    async fn approve(
        &self,
        job_id: Uuid,
        gate: Gate,
        approved_by: &str,
    ) -> Result<(Job, ApprovalOutcome), PipelineError> {
        let (job, outcome) = self
            .machine
            .update(job_id, |job| job.approve(gate, approved_by))
            .await?;
        match outcome {
            ApprovalOutcome::Approved => info!(
                job_id = %job_id,
                gate = %gate,
                approved_by,
                round = ?job.approval(gate).map(|a| a.round),
                "Gate approved"
            ),
            ApprovalOutcome::AlreadyApproved => info!(
                job_id = %job_id,
                gate = %gate,
                "Gate already approved; ignoring"
            ),
        }
        Ok((job, outcome))
    }

    async fn request_revision(
        &self,
        job_id: Uuid,
        gate: Gate,
        feedback: &str,
    ) -> Result<Job, PipelineError> {
        let (job, ()) = self
            .machine
            .update(job_id, |job| job.request_revision(gate, feedback))
            .await?;
        info!(job_id = %job_id, gate = %gate, stage = %job.stage, "Revision requested");
        Ok(job)
    }

    pub async fn approve_plan(
        &self,
        job_id: Uuid,
        approved_by: &str,
    ) -> Result<(Job, ApprovalOutcome), PipelineError> {
        self.approve(job_id, Gate::Plan, approved_by).await
    }

    pub async fn request_plan_revision(
        &self,
        job_id: Uuid,
        feedback: &str,
    ) -> Result<Job, PipelineError> {
        self.request_revision(job_id, Gate::Plan, feedback).await
    }

    pub async fn approve_content(
        &self,
        job_id: Uuid,
        approved_by: &str,
    ) -> Result<(Job, ApprovalOutcome), PipelineError> {
        self.approve(job_id, Gate::Content, approved_by).await
    }

    pub async fn request_content_revision(
        &self,
        job_id: Uuid,
        feedback: &str,
    ) -> Result<Job, PipelineError> {
        self.request_revision(job_id, Gate::Content, feedback).await
    }
}
