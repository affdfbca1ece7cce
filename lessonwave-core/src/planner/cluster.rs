//! Greedy episode clustering.
//!
//! One left-to-right pass over the sequenced concepts, no backtracking. The
//! target episode count is drawn once from a PRNG seeded by the chapter id, so
//! re-planning a chapter reproduces the same boundaries.

use super::graph::DependencyGraph;
use crate::config::PlannerConfig;
use crate::types::{Provenance, SizeCategory};
use sha2::{Digest, Sha256};

/// Concepts left at or below which the open episode absorbs the rest once the
/// target count is reached.
const TAIL_ABSORB_LIMIT: usize = 2;

/// Episodes grow to this many concepts before the complexity budget applies.
const BUDGET_EXEMPT_SIZE: usize = 2;

// ─── PRNG ─────────────────────────────────────────────────────

/// 64-bit linear congruential generator (Knuth MMIX constants).
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u64,
}

impl Lcg {
    const MULTIPLIER: u64 = 6_364_136_223_846_793_005;
    const INCREMENT: u64 = 1_442_695_040_888_963_407;

    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn from_chapter_id(chapter_id: &str) -> Self {
        Self::new(seed_for_chapter(chapter_id))
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(Self::MULTIPLIER)
            .wrapping_add(Self::INCREMENT);
        // High bits of an LCG are the well-mixed ones.
        self.state >> 33
    }

    /// Uniform-ish draw from `lo..=hi`.
    pub fn next_in_range(&mut self, lo: u32, hi: u32) -> u32 {
        if hi <= lo {
            return lo;
        }
        let span = u64::from(hi - lo) + 1;
        lo + (self.next_u64() % span) as u32
    }
}

/// Stable seed: the first 8 bytes of SHA-256(chapter_id), big-endian.
pub fn seed_for_chapter(chapter_id: &str) -> u64 {
    let digest = Sha256::digest(chapter_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

// ─── Draft episodes ───────────────────────────────────────────

/// An episode before renumbering and duration estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftEpisode {
    /// Concept positions in teaching order.
    pub concepts: Vec<usize>,
    pub complexity: f64,
    pub provenance: Provenance,
}

impl Default for DraftEpisode {
    fn default() -> Self {
        Self {
            concepts: Vec::new(),
            complexity: 0.0,
            provenance: Provenance::None,
        }
    }
}

impl DraftEpisode {
    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    pub fn push(&mut self, concept: usize, score: f64) {
        self.concepts.push(concept);
        self.complexity += score;
    }
}

#[derive(Debug, Clone)]
pub struct Clustering {
    pub drafts: Vec<DraftEpisode>,
    pub target_episode_count: u32,
    pub seed: u64,
}

/// Greedily bin `sequence` into episodes.
///
/// A concept joins the open episode only if the budget holds (waived below two
/// concepts), all its prerequisites are already placed, and the episode has
/// room. Otherwise the open episode closes and the concept starts a new one.
pub fn cluster_concepts(
    sequence: &[usize],
    scores: &[f64],
    graph: &DependencyGraph,
    size: SizeCategory,
    chapter_id: &str,
    config: &PlannerConfig,
) -> Clustering {
    let seed = seed_for_chapter(chapter_id);
    let mut rng = Lcg::new(seed);
    let range = config.target_ranges.for_size(size);
    let target_episode_count = rng.next_in_range(range.lo, range.hi);

    let mut placed = vec![false; scores.len()];
    let mut closed: Vec<DraftEpisode> = Vec::new();
    let mut open = DraftEpisode::default();

    for (pos, &concept) in sequence.iter().enumerate() {
        let remaining = sequence.len() - pos;
        let target_reached = closed.len() as u32 >= target_episode_count;

        let joins = open.is_empty()
            || (target_reached && remaining <= TAIL_ABSORB_LIMIT)
            || (fits_budget(&open, scores[concept], config)
                && graph.prerequisites(concept).all(|p| placed[p])
                && open.len() < config.max_concepts_per_episode);

        if !joins {
            closed.push(std::mem::take(&mut open));
        }
        open.push(concept, scores[concept]);
        placed[concept] = true;
    }

    if !open.is_empty() {
        closed.push(open);
    }

    Clustering {
        drafts: closed,
        target_episode_count,
        seed,
    }
}

fn fits_budget(open: &DraftEpisode, score: f64, config: &PlannerConfig) -> bool {
    open.len() < BUDGET_EXEMPT_SIZE || open.complexity + score <= config.complexity_budget
}
