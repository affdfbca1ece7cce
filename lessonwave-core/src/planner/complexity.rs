//! Concept complexity scoring and chapter sizing.

use crate::types::{Concept, ConceptType, Difficulty, SizeCategory};
use serde::{Deserialize, Serialize};

/// Importance at or above which a concept counts as significant.
pub const SIGNIFICANT_IMPORTANCE: u8 = 3;

pub fn difficulty_multiplier(difficulty: Difficulty) -> f64 {
    match difficulty {
        Difficulty::Easy => 0.8,
        Difficulty::Medium => 1.0,
        Difficulty::Hard => 1.4,
    }
}

pub fn type_multiplier(concept_type: ConceptType) -> f64 {
    match concept_type {
        ConceptType::Formula | ConceptType::Process => 1.3,
        ConceptType::Application => 1.2,
        ConceptType::Definition => 0.9,
        ConceptType::Example => 1.0,
    }
}

/// `importance × difficulty multiplier × type multiplier`.
pub fn complexity(concept: &Concept) -> f64 {
    f64::from(concept.importance)
        * difficulty_multiplier(concept.difficulty)
        * type_multiplier(concept.concept_type)
}

/// Result of sizing a chapter. Selects a target episode-count range only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChapterSizing {
    pub size: SizeCategory,
    pub significant_count: usize,
    pub total_complexity: f64,
}

pub fn chapter_size(concepts: &[Concept]) -> ChapterSizing {
    let significant_count = concepts
        .iter()
        .filter(|c| c.importance >= SIGNIFICANT_IMPORTANCE)
        .count();
    let total_complexity: f64 = concepts.iter().map(complexity).sum();

    let size = if total_complexity < 12.0 || significant_count <= 3 {
        SizeCategory::Small
    } else if total_complexity > 30.0 || significant_count > 7 {
        SizeCategory::Large
    } else {
        SizeCategory::Medium
    };

    ChapterSizing {
        size,
        significant_count,
        total_complexity,
    }
}
