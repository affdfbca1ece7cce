//! Job stages and the transition table.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Created,
    Extracted,
    Analyzed,
    Planned,
    AwaitingPlanApproval,
    PlanApproved,
    Generating,
    AwaitingContentApproval,
    ContentApproved,
    GeneratingAudio,
    Completed,
    Failed,
    PartialSuccess,
}

/// An approval gate in front of one automatic stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    /// Blocks generation.
    Plan,
    /// Blocks audio.
    Content,
}

impl Gate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gate::Plan => "plan",
            Gate::Content => "content",
        }
    }

    /// Stage the job waits in for this gate.
    pub fn awaiting_stage(&self) -> Stage {
        match self {
            Gate::Plan => Stage::AwaitingPlanApproval,
            Gate::Content => Stage::AwaitingContentApproval,
        }
    }

    /// Stage recorded when the gate is approved.
    pub fn approved_stage(&self) -> Stage {
        match self {
            Gate::Plan => Stage::PlanApproved,
            Gate::Content => Stage::ContentApproved,
        }
    }
}

impl std::fmt::Display for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Created => "created",
            Stage::Extracted => "extracted",
            Stage::Analyzed => "analyzed",
            Stage::Planned => "planned",
            Stage::AwaitingPlanApproval => "awaiting_plan_approval",
            Stage::PlanApproved => "plan_approved",
            Stage::Generating => "generating",
            Stage::AwaitingContentApproval => "awaiting_content_approval",
            Stage::ContentApproved => "content_approved",
            Stage::GeneratingAudio => "generating_audio",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
            Stage::PartialSuccess => "partial_success",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed | Stage::PartialSuccess)
    }

    /// Stages waiting on an external approval.
    pub fn is_gated(&self) -> bool {
        matches!(
            self,
            Stage::AwaitingPlanApproval | Stage::AwaitingContentApproval
        )
    }

    /// Nominal progress percentage on entering this stage.
    pub fn base_progress(&self) -> u8 {
        match self {
            Stage::Created => 0,
            Stage::Extracted => 10,
            Stage::Analyzed => 20,
            Stage::Planned => 30,
            Stage::AwaitingPlanApproval => 35,
            Stage::PlanApproved => 40,
            Stage::Generating => 40,
            Stage::AwaitingContentApproval => 80,
            Stage::ContentApproved => 85,
            Stage::GeneratingAudio => 85,
            Stage::Completed => 100,
            Stage::Failed | Stage::PartialSuccess => 0,
        }
    }

    /// Stages reachable from `self` in one transition.
    ///
    /// `failed` is reachable from every non-terminal stage. Terminal
    /// `partial_success`/`failed` may leave only through retry recovery.
    pub fn successors(&self) -> &'static [Stage] {
        match self {
            Stage::Created => &[Stage::Extracted, Stage::Failed],
            Stage::Extracted => &[Stage::Analyzed, Stage::Failed],
            Stage::Analyzed => &[Stage::Planned, Stage::Failed],
            Stage::Planned => &[Stage::AwaitingPlanApproval, Stage::Failed],
            Stage::AwaitingPlanApproval => &[Stage::PlanApproved, Stage::Analyzed, Stage::Failed],
            Stage::PlanApproved => &[Stage::Generating, Stage::Failed],
            Stage::Generating => &[
                Stage::AwaitingContentApproval,
                Stage::PartialSuccess,
                Stage::Failed,
            ],
            Stage::AwaitingContentApproval => {
                &[Stage::ContentApproved, Stage::PlanApproved, Stage::Failed]
            }
            Stage::ContentApproved => &[Stage::GeneratingAudio, Stage::Failed],
            Stage::GeneratingAudio => &[Stage::Completed, Stage::Failed],
            Stage::PartialSuccess => &[Stage::AwaitingContentApproval],
            Stage::Failed => &[Stage::AwaitingContentApproval],
            Stage::Completed => &[],
        }
    }

    pub fn can_transition_to(&self, next: Stage) -> bool {
        self.successors().contains(&next)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Stage; 13] = [
        Stage::Created,
        Stage::Extracted,
        Stage::Analyzed,
        Stage::Planned,
        Stage::AwaitingPlanApproval,
        Stage::PlanApproved,
        Stage::Generating,
        Stage::AwaitingContentApproval,
        Stage::ContentApproved,
        Stage::GeneratingAudio,
        Stage::Completed,
        Stage::Failed,
        Stage::PartialSuccess,
    ];

    #[test]
    fn test_failed_reachable_from_every_non_terminal_stage() {
        for stage in ALL.iter().filter(|s| !s.is_terminal()) {
            assert!(stage.can_transition_to(Stage::Failed), "{stage} -> failed");
        }
    }

    #[test]
    fn test_partial_success_only_from_generating() {
        for stage in ALL {
            let expected = stage == Stage::Generating;
            assert_eq!(
                stage.can_transition_to(Stage::PartialSuccess),
                expected,
                "{stage} -> partial_success"
            );
        }
    }

    #[test]
    fn test_gates_cannot_be_skipped() {
        assert!(!Stage::Planned.can_transition_to(Stage::PlanApproved));
        assert!(!Stage::AwaitingPlanApproval.can_transition_to(Stage::Generating));
        assert!(!Stage::AwaitingContentApproval.can_transition_to(Stage::GeneratingAudio));
        assert!(!Stage::Generating.can_transition_to(Stage::ContentApproved));
    }

    #[test]
    fn test_completed_is_final() {
        assert!(Stage::Completed.successors().is_empty());
    }

    #[test]
    fn test_serde_names_match_display() {
        for stage in ALL {
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{}\"", stage.as_str()));
        }
    }
}
