use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ─── Concept metadata enums ───────────────────────────────────

/// Pedagogical kind of a concept.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConceptType {
    Definition,
    Process,
    Formula,
    Example,
    Application,
}

impl ConceptType {
    /// Position in the teaching order definition < example < process < formula < application.
    pub fn teaching_rank(self) -> u8 {
        match self {
            ConceptType::Definition => 0,
            ConceptType::Example => 1,
            ConceptType::Process => 2,
            ConceptType::Formula => 3,
            ConceptType::Application => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConceptType::Definition => "definition",
            ConceptType::Process => "process",
            ConceptType::Formula => "formula",
            ConceptType::Example => "example",
            ConceptType::Application => "application",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn rank(self) -> u8 {
        match self {
            Difficulty::Easy => 0,
            Difficulty::Medium => 1,
            Difficulty::Hard => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

/// Bloom's taxonomy level, ordered remember → create.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BloomsLevel {
    Remember,
    Understand,
    Apply,
    Analyze,
    Evaluate,
    Create,
}

impl BloomsLevel {
    pub fn rank(self) -> u8 {
        match self {
            BloomsLevel::Remember => 0,
            BloomsLevel::Understand => 1,
            BloomsLevel::Apply => 2,
            BloomsLevel::Analyze => 3,
            BloomsLevel::Evaluate => 4,
            BloomsLevel::Create => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BloomsLevel::Remember => "remember",
            BloomsLevel::Understand => "understand",
            BloomsLevel::Apply => "apply",
            BloomsLevel::Analyze => "analyze",
            BloomsLevel::Evaluate => "evaluate",
            BloomsLevel::Create => "create",
        }
    }
}

// ─── Concept ──────────────────────────────────────────────────

/// One atomic unit of curriculum content, as produced by concept extraction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
    /// Unique within the chapter.
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub concept_type: ConceptType,
    pub difficulty: Difficulty,
    pub blooms_level: BloomsLevel,
    /// 1 (peripheral) to 5 (core).
    pub importance: u8,
    #[serde(default)]
    pub estimated_minutes: f64,
    /// Concepts this one is a prerequisite for. May be cyclic.
    #[serde(default)]
    pub related_ids: BTreeSet<String>,
    /// Weak back-reference to an enclosing concept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default = "default_groupable")]
    pub groupable: bool,
}

fn default_groupable() -> bool {
    true
}

impl Concept {
    /// Minimal constructor used by tests and stand-in extractors.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            concept_type: ConceptType::Definition,
            difficulty: Difficulty::Medium,
            blooms_level: BloomsLevel::Understand,
            importance: 3,
            estimated_minutes: 0.0,
            related_ids: BTreeSet::new(),
            parent_id: None,
            groupable: true,
        }
    }

    pub fn with_type(mut self, concept_type: ConceptType) -> Self {
        self.concept_type = concept_type;
        self
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_blooms(mut self, level: BloomsLevel) -> Self {
        self.blooms_level = level;
        self
    }

    pub fn with_importance(mut self, importance: u8) -> Self {
        self.importance = importance;
        self
    }

    /// Mark this concept as a prerequisite for `id`.
    pub fn prerequisite_for(mut self, id: impl Into<String>) -> Self {
        self.related_ids.insert(id.into());
        self
    }
}

/// Chapter-level metadata handed over by concept extraction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterMetadata {
    pub chapter_id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub grade_band: String,
    #[serde(default)]
    pub word_count: u32,
}

impl ChapterMetadata {
    pub fn new(chapter_id: impl Into<String>) -> Self {
        Self {
            chapter_id: chapter_id.into(),
            subject: String::new(),
            grade_band: String::new(),
            word_count: 0,
        }
    }
}

/// `from_id` must be taught before `to_id`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyEdge {
    pub from_id: String,
    pub to_id: String,
}

// ─── Plan ─────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeCategory {
    Small,
    Medium,
    Large,
}

impl SizeCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            SizeCategory::Small => "small",
            SizeCategory::Medium => "medium",
            SizeCategory::Large => "large",
        }
    }
}

impl std::fmt::Display for SizeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How an episode came out of plan optimization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Provenance {
    None,
    /// A single small episode was folded into this one.
    Merged,
    /// Half of an oversized episode; `ordinal` is its pre-split position.
    SplitFrom { ordinal: u32 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    /// 1..N, contiguous.
    pub ordinal: u32,
    pub concept_ids: Vec<String>,
    pub target_duration_minutes: u32,
    pub target_word_count: u32,
    pub complexity_score: f64,
    pub provenance: Provenance,
}

/// Non-fatal conditions observed while planning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", rename_all_fields = "camelCase", tag = "kind")]
pub enum PlanWarning {
    /// Zero or one concept.
    Degenerate { concept_count: usize },
    /// These concepts sat on a cycle and were ordered by input position.
    CyclicDependencies { concept_ids: Vec<String> },
    /// `related_ids` entries that name no concept in the chapter.
    UnknownRelatedIds {
        concept_id: String,
        unknown: Vec<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanMetadata {
    pub seed: u64,
    pub algorithm_version: String,
    pub target_episode_count: u32,
    /// SHA-256 hex of the planning inputs.
    pub input_fingerprint: String,
    #[serde(default)]
    pub warnings: Vec<PlanWarning>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodePlan {
    pub chapter_id: String,
    pub size_category: SizeCategory,
    pub episodes: Vec<Episode>,
    pub metadata: PlanMetadata,
}

impl EpisodePlan {
    pub fn episode(&self, ordinal: u32) -> Option<&Episode> {
        self.episodes.iter().find(|e| e.ordinal == ordinal)
    }

    pub fn is_degenerate(&self) -> bool {
        self.metadata
            .warnings
            .iter()
            .any(|w| matches!(w, PlanWarning::Degenerate { .. }))
    }

    pub fn has_cycles(&self) -> bool {
        self.metadata
            .warnings
            .iter()
            .any(|w| matches!(w, PlanWarning::CyclicDependencies { .. }))
    }

    /// All concept ids across episodes, in episode order.
    pub fn concept_ids(&self) -> impl Iterator<Item = &str> {
        self.episodes
            .iter()
            .flat_map(|e| e.concept_ids.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concept_deserializes_camel_case_with_defaults() {
        let json = r#"{
            "id": "c1",
            "name": "Photosynthesis",
            "type": "process",
            "difficulty": "hard",
            "bloomsLevel": "analyze",
            "importance": 4,
            "relatedIds": ["c2"]
        }"#;
        let concept: Concept = serde_json::from_str(json).unwrap();
        assert_eq!(concept.concept_type, ConceptType::Process);
        assert_eq!(concept.blooms_level, BloomsLevel::Analyze);
        assert!(concept.related_ids.contains("c2"));
        assert!(concept.groupable);
        assert_eq!(concept.parent_id, None);
    }

    #[test]
    fn test_plan_serializes_camel_case() {
        let plan = EpisodePlan {
            chapter_id: "ch1".to_string(),
            size_category: SizeCategory::Small,
            episodes: vec![Episode {
                ordinal: 1,
                concept_ids: vec!["c1".to_string()],
                target_duration_minutes: 5,
                target_word_count: 700,
                complexity_score: 0.72,
                provenance: Provenance::SplitFrom { ordinal: 1 },
            }],
            metadata: PlanMetadata {
                seed: 7,
                algorithm_version: "v".to_string(),
                target_episode_count: 1,
                input_fingerprint: "ab".to_string(),
                warnings: vec![PlanWarning::UnknownRelatedIds {
                    concept_id: "c1".to_string(),
                    unknown: vec!["zz".to_string()],
                }],
            },
        };
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["chapterId"], "ch1");
        assert_eq!(json["sizeCategory"], "small");
        let episode = &json["episodes"][0];
        assert_eq!(episode["conceptIds"][0], "c1");
        assert_eq!(episode["targetDurationMinutes"], 5);
        assert_eq!(episode["complexityScore"], 0.72);
        assert_eq!(episode["provenance"]["kind"], "split_from");
        assert_eq!(json["metadata"]["inputFingerprint"], "ab");
        assert_eq!(json["metadata"]["warnings"][0]["kind"], "unknown_related_ids");
        assert_eq!(json["metadata"]["warnings"][0]["conceptId"], "c1");
    }

    #[test]
    fn test_teaching_orders() {
        assert!(ConceptType::Definition.teaching_rank() < ConceptType::Example.teaching_rank());
        assert!(ConceptType::Formula.teaching_rank() < ConceptType::Application.teaching_rank());
        assert!(Difficulty::Easy.rank() < Difficulty::Hard.rank());
        assert!(BloomsLevel::Remember.rank() < BloomsLevel::Create.rank());
    }
}
