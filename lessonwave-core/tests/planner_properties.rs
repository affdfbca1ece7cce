//! Plan invariants over generated chapters.

use std::collections::{BTreeSet, HashMap};

use lessonwave_core::planner::{sequence_concepts, DependencyGraphBuilder, EpisodePlanner};
use lessonwave_core::{
    BloomsLevel, ChapterMetadata, Concept, ConceptType, Difficulty, EpisodePlan, PlannerConfig,
};
use proptest::prelude::*;

const TYPES: [ConceptType; 5] = [
    ConceptType::Definition,
    ConceptType::Process,
    ConceptType::Formula,
    ConceptType::Example,
    ConceptType::Application,
];
const DIFFICULTIES: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];
const BLOOMS: [BloomsLevel; 6] = [
    BloomsLevel::Remember,
    BloomsLevel::Understand,
    BloomsLevel::Apply,
    BloomsLevel::Analyze,
    BloomsLevel::Evaluate,
    BloomsLevel::Create,
];

fn arb_concepts() -> impl Strategy<Value = Vec<Concept>> {
    prop::collection::vec(
        (
            0..TYPES.len(),
            0..DIFFICULTIES.len(),
            0..BLOOMS.len(),
            1..=5u8,
            prop::collection::btree_set(0..14usize, 0..3),
        ),
        0..14,
    )
    .prop_map(|rows| {
        let n = rows.len();
        rows.into_iter()
            .enumerate()
            .map(|(i, (t, d, b, importance, related))| {
                let mut concept = Concept::new(format!("c{i}"), format!("Concept {:02}", (i * 7) % 13))
                    .with_type(TYPES[t])
                    .with_difficulty(DIFFICULTIES[d])
                    .with_blooms(BLOOMS[b])
                    .with_importance(importance);
                for target in related.into_iter().filter(|&j| j < n && j != i) {
                    concept = concept.prerequisite_for(format!("c{target}"));
                }
                concept
            })
            .collect()
    })
}

fn arb_chapter_id() -> impl Strategy<Value = String> {
    "[a-z0-9-]{1,12}"
}

proptest! {
    #[test]
    fn every_concept_planned_exactly_once(concepts in arb_concepts(), chapter_id in arb_chapter_id()) {
        let plan = EpisodePlanner::default()
            .plan_episodes(&concepts, &ChapterMetadata::new(chapter_id))
            .unwrap();

        let planned: Vec<&str> = plan.concept_ids().collect();
        let unique: BTreeSet<&str> = planned.iter().copied().collect();
        let input: BTreeSet<&str> = concepts.iter().map(|c| c.id.as_str()).collect();
        prop_assert_eq!(planned.len(), unique.len(), "duplicate concept in plan");
        prop_assert_eq!(unique, input);
        prop_assert!(plan.episodes.iter().all(|e| !e.concept_ids.is_empty()));
    }

    #[test]
    fn ordinals_are_contiguous(concepts in arb_concepts(), chapter_id in arb_chapter_id()) {
        let plan = EpisodePlanner::default()
            .plan_episodes(&concepts, &ChapterMetadata::new(chapter_id))
            .unwrap();
        let ordinals: Vec<u32> = plan.episodes.iter().map(|e| e.ordinal).collect();
        let expected: Vec<u32> = (1..=plan.episodes.len() as u32).collect();
        prop_assert_eq!(ordinals, expected);
    }

    #[test]
    fn acyclic_prerequisites_come_first(concepts in arb_concepts(), chapter_id in arb_chapter_id()) {
        let plan = EpisodePlanner::default()
            .plan_episodes(&concepts, &ChapterMetadata::new(chapter_id))
            .unwrap();
        let graph = DependencyGraphBuilder::new().build(&concepts);
        let sequence = sequence_concepts(&concepts, &graph);
        let cyclic: BTreeSet<usize> = sequence.cyclic.iter().copied().collect();
        let episode_of: HashMap<&str, u32> = plan
            .episodes
            .iter()
            .flat_map(|e| e.concept_ids.iter().map(move |id| (id.as_str(), e.ordinal)))
            .collect();

        for (idx, concept) in concepts.iter().enumerate() {
            if cyclic.contains(&idx) {
                continue;
            }
            let here = episode_of[concept.id.as_str()];
            for prereq in graph.prerequisites(idx) {
                let there = episode_of[concepts[prereq].id.as_str()];
                prop_assert!(
                    there <= here,
                    "{} (episode {}) needs {} (episode {})",
                    concept.id, here, concepts[prereq].id, there
                );
            }
        }
    }

    #[test]
    fn durations_stay_in_bounds(concepts in arb_concepts(), chapter_id in arb_chapter_id()) {
        let config = PlannerConfig::default();
        let plan = EpisodePlanner::new(config.clone())
            .plan_episodes(&concepts, &ChapterMetadata::new(chapter_id))
            .unwrap();
        for episode in &plan.episodes {
            prop_assert!(episode.target_duration_minutes >= config.min_duration_minutes);
            prop_assert!(episode.target_duration_minutes <= config.max_duration_minutes);
            prop_assert!(episode.target_word_count > 0);
        }
    }

    #[test]
    fn planning_is_deterministic(concepts in arb_concepts(), chapter_id in arb_chapter_id()) {
        let metadata = ChapterMetadata::new(chapter_id);
        let a = EpisodePlanner::default().plan_episodes(&concepts, &metadata).unwrap();
        let b = EpisodePlanner::default().plan_episodes(&concepts, &metadata).unwrap();
        prop_assert_eq!(serde_json::to_vec(&a).unwrap(), serde_json::to_vec(&b).unwrap());
    }

    #[test]
    fn stored_plan_reloads_bit_identical(concepts in arb_concepts(), chapter_id in arb_chapter_id()) {
        let plan = EpisodePlanner::default()
            .plan_episodes(&concepts, &ChapterMetadata::new(chapter_id))
            .unwrap();
        let stored = serde_json::to_string(&plan).unwrap();
        let reloaded: EpisodePlan = serde_json::from_str(&stored).unwrap();
        for (a, b) in plan.episodes.iter().zip(&reloaded.episodes) {
            prop_assert_eq!(a.complexity_score.to_bits(), b.complexity_score.to_bits());
        }
        prop_assert_eq!(reloaded, plan);
    }
}

#[test]
fn target_count_respects_size_range() {
    let config = PlannerConfig::default();
    for chapter_id in ["ch1", "ch2", "biology-7", "x"] {
        let concepts: Vec<Concept> = [5u8, 4, 3, 3, 2, 1]
            .iter()
            .enumerate()
            .map(|(i, &imp)| Concept::new(format!("c{}", i + 1), format!("C{}", i + 1)).with_importance(imp))
            .collect();
        let plan = EpisodePlanner::default()
            .plan_episodes(&concepts, &ChapterMetadata::new(chapter_id))
            .unwrap();
        let range = config.target_ranges.for_size(plan.size_category);
        let target = plan.metadata.target_episode_count;
        assert!((range.lo..=range.hi).contains(&target), "{chapter_id}: {target}");
    }
}
