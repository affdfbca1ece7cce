//! Episode Planner
//!
//! Partitions a chapter's concepts into episodes. This is a PURE FUNCTION of
//! its inputs: the same concepts and chapter id always produce the same plan,
//! so callers may cache and compare plans.
//!
//! ```text
//! concepts ─► validate ─► complexity ─► dependency graph ─► sequence
//!                                                              │
//!          EpisodePlan ◄─ finalize ◄─ split ◄─ merge ◄─ cluster
//! ```

pub mod cluster;
pub mod complexity;
pub mod graph;
pub mod optimize;
pub mod sequence;
pub mod validate;

use crate::config::PlannerConfig;
use crate::types::{ChapterMetadata, Concept, EpisodePlan, PlanMetadata, PlanWarning};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

pub use complexity::{chapter_size, complexity, ChapterSizing};
pub use graph::{DependencyGraph, DependencyGraphBuilder};
pub use sequence::{append_cyclic_remainder, sequence_concepts, Sequence};
pub use validate::{subject_support, validate_concepts, PlanError, SubjectSupport, ValidationIssue};

/// Bump when a change alters plan output for identical inputs.
pub const ALGORITHM_VERSION: &str = "greedy-cluster/1";

#[derive(Debug, Clone, Default)]
pub struct EpisodePlanner {
    config: PlannerConfig,
    graph_builder: DependencyGraphBuilder,
}

impl EpisodePlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            config,
            graph_builder: DependencyGraphBuilder::new(),
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plan episodes for one chapter.
    ///
    /// Structural problems are rejected before any planning. Cycles and
    /// degenerate inputs (zero or one concept) still yield a plan, flagged in
    /// `metadata.warnings`.
    pub fn plan_episodes(
        &self,
        concepts: &[Concept],
        chapter: &ChapterMetadata,
    ) -> Result<EpisodePlan, PlanError> {
        let mut warnings = validate_concepts(concepts, chapter)?;
        let chapter_id = chapter.chapter_id.as_str();

        let sizing = chapter_size(concepts);
        let scores: Vec<f64> = concepts.iter().map(complexity).collect();
        let graph = self.graph_builder.build(concepts);
        let sequence = sequence_concepts(concepts, &graph);

        if sequence.has_cycles() {
            let concept_ids: Vec<String> = sequence
                .cyclic
                .iter()
                .map(|&idx| concepts[idx].id.clone())
                .collect();
            warn!(
                chapter_id,
                cyclic = concept_ids.len(),
                "Cyclic prerequisites; using input order for the cyclic remainder"
            );
            warnings.push(PlanWarning::CyclicDependencies { concept_ids });
        }

        let clustering = cluster::cluster_concepts(
            &sequence.order,
            &scores,
            &graph,
            sizing.size,
            chapter_id,
            &self.config,
        );
        let drafts = optimize::merge_small_episodes(clustering.drafts, self.config.merge_threshold);
        let drafts = optimize::split_large_episodes(drafts, &scores, self.config.split_threshold);
        let episodes = optimize::finalize_episodes(drafts, concepts, &self.config);

        if concepts.len() <= 1 {
            warn!(chapter_id, concepts = concepts.len(), "Degenerate plan");
            warnings.push(PlanWarning::Degenerate {
                concept_count: concepts.len(),
            });
        }

        debug!(
            chapter_id,
            size = %sizing.size,
            target = clustering.target_episode_count,
            episodes = episodes.len(),
            edges = graph.edge_count(),
            "Planned episodes"
        );

        Ok(EpisodePlan {
            chapter_id: chapter_id.to_string(),
            size_category: sizing.size,
            episodes,
            metadata: PlanMetadata {
                seed: clustering.seed,
                algorithm_version: ALGORITHM_VERSION.to_string(),
                target_episode_count: clustering.target_episode_count,
                input_fingerprint: input_fingerprint(concepts, chapter_id),
                warnings,
            },
        })
    }
}

/// SHA-256 over the chapter id, every planning-relevant concept field and the
/// algorithm version. Fields are NUL-separated.
pub fn input_fingerprint(concepts: &[Concept], chapter_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ALGORITHM_VERSION.as_bytes());
    hasher.update([0]);
    hasher.update(chapter_id.as_bytes());
    for concept in concepts {
        hasher.update([0]);
        for field in [
            concept.id.as_str(),
            concept.name.as_str(),
            concept.concept_type.as_str(),
            concept.difficulty.as_str(),
            concept.blooms_level.as_str(),
        ] {
            hasher.update(field.as_bytes());
            hasher.update([0]);
        }
        hasher.update([concept.importance]);
        hasher.update(concept.estimated_minutes.to_be_bytes());
        for related in &concept.related_ids {
            hasher.update(related.as_bytes());
            hasher.update([0]);
        }
    }
    hex::encode(hasher.finalize())
}
