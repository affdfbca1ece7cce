//! Post-clustering plan optimization.
//!
//! Exactly one merge pass followed by exactly one split pass, then
//! renumbering and duration estimation.

use super::cluster::DraftEpisode;
use crate::config::PlannerConfig;
use crate::types::{Concept, Episode, Provenance};

/// Fold each single-concept episode below `threshold` into the episode after
/// it. One left-to-right pass; the last episode is never merged.
pub fn merge_small_episodes(drafts: Vec<DraftEpisode>, threshold: f64) -> Vec<DraftEpisode> {
    let mut merged = Vec::with_capacity(drafts.len());
    let mut carry: Option<DraftEpisode> = None;
    let mut drafts = drafts.into_iter().peekable();

    while let Some(mut draft) = drafts.next() {
        if let Some(small) = carry.take() {
            let mut concepts = small.concepts;
            concepts.append(&mut draft.concepts);
            draft.concepts = concepts;
            draft.complexity += small.complexity;
            draft.provenance = Provenance::Merged;
        }

        let is_small = draft.len() == 1 && draft.complexity < threshold;
        if is_small && drafts.peek().is_some() {
            carry = Some(draft);
        } else {
            merged.push(draft);
        }
    }

    merged
}

/// Split every episode above `threshold` with more than two concepts in half
/// by concept count. The first half takes the extra concept on odd counts.
pub fn split_large_episodes(
    drafts: Vec<DraftEpisode>,
    scores: &[f64],
    threshold: f64,
) -> Vec<DraftEpisode> {
    let mut out = Vec::with_capacity(drafts.len());

    for (pos, draft) in drafts.into_iter().enumerate() {
        if draft.complexity <= threshold || draft.len() <= 2 {
            out.push(draft);
            continue;
        }

        let ordinal = pos as u32 + 1;
        let mid = draft.len().div_ceil(2);
        let (front, back) = draft.concepts.split_at(mid);
        for half in [front, back] {
            out.push(DraftEpisode {
                concepts: half.to_vec(),
                complexity: half.iter().map(|&c| scores[c]).sum(),
                provenance: Provenance::SplitFrom { ordinal },
            });
        }
    }

    out
}

/// Rounded linear estimate clamped to the configured minute range.
pub fn estimate_duration_minutes(complexity: f64, config: &PlannerConfig) -> u32 {
    let raw = config.base_minutes + complexity * config.minutes_per_complexity;
    let rounded = if raw.is_finite() && raw > 0.0 {
        raw.round() as u32
    } else {
        0
    };
    rounded.clamp(config.min_duration_minutes, config.max_duration_minutes)
}

/// Dense episodes get more words per minute of audio, light ones fewer.
pub fn complexity_word_multiplier(average_complexity: f64) -> f64 {
    if average_complexity < 2.5 {
        0.9
    } else if average_complexity > 4.5 {
        1.1
    } else {
        1.0
    }
}

pub fn estimate_word_count(
    duration_minutes: u32,
    complexity: f64,
    concept_count: usize,
    config: &PlannerConfig,
) -> u32 {
    let average = if concept_count == 0 {
        0.0
    } else {
        complexity / concept_count as f64
    };
    let words = f64::from(duration_minutes)
        * f64::from(config.words_per_minute)
        * complexity_word_multiplier(average);
    words.round() as u32
}

/// Renumber 1..N and attach durations and word counts.
pub fn finalize_episodes(
    drafts: Vec<DraftEpisode>,
    concepts: &[Concept],
    config: &PlannerConfig,
) -> Vec<Episode> {
    drafts
        .into_iter()
        .enumerate()
        .map(|(pos, draft)| {
            let duration = estimate_duration_minutes(draft.complexity, config);
            Episode {
                ordinal: pos as u32 + 1,
                target_word_count: estimate_word_count(
                    duration,
                    draft.complexity,
                    draft.len(),
                    config,
                ),
                concept_ids: draft
                    .concepts
                    .iter()
                    .map(|&c| concepts[c].id.clone())
                    .collect(),
                target_duration_minutes: duration,
                complexity_score: draft.complexity,
                provenance: draft.provenance,
            }
        })
        .collect()
}
