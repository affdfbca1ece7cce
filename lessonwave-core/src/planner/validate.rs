//! Ingestion checks for extracted concepts.
//!
//! Structural completeness only: ids and names present, importance in range,
//! no duplicate ids. Semantic quality is the extractor's concern.

use crate::types::{ChapterMetadata, Concept, PlanWarning};
use std::collections::HashSet;

/// Subjects whose material needs visual or written practice.
pub const UNSUPPORTED_SUBJECTS: &[&str] = &[
    "Mathematics",
    "Algebra",
    "Geometry",
    "English",
    "Literature",
    "Grammar",
];

/// Subjects with dedicated generation treatment.
pub const SUPPORTED_SUBJECTS: &[&str] = &[
    "Science",
    "Physics",
    "Chemistry",
    "Biology",
    "Social Studies",
    "History",
    "Geography",
    "Civics",
    "Computer Science",
    "Economics",
    "EVS",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub concept_id: Option<String>,
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.concept_id {
            Some(id) => write!(f, "concept '{}' {}: {}", id, self.field, self.message),
            None => write!(f, "{}: {}", self.field, self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("structural input error: {}", join_issues(.0))]
    StructuralInput(Vec<ValidationIssue>),

    #[error("subject '{0}' is not supported for audio-only episodes")]
    UnsupportedSubject(String),
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectSupport {
    Supported,
    /// Unknown subject, generated with default treatment.
    Fallback,
    Unsupported,
}

pub fn subject_support(subject: &str) -> SubjectSupport {
    let subject = subject.trim();
    if UNSUPPORTED_SUBJECTS
        .iter()
        .any(|s| s.eq_ignore_ascii_case(subject))
    {
        SubjectSupport::Unsupported
    } else if SUPPORTED_SUBJECTS
        .iter()
        .any(|s| s.eq_ignore_ascii_case(subject))
    {
        SubjectSupport::Supported
    } else {
        SubjectSupport::Fallback
    }
}

/// Reject structurally incomplete input; return non-fatal warnings otherwise.
pub fn validate_concepts(
    concepts: &[Concept],
    chapter: &ChapterMetadata,
) -> Result<Vec<PlanWarning>, PlanError> {
    let mut issues = Vec::new();
    let mut warnings = Vec::new();

    if chapter.chapter_id.trim().is_empty() {
        issues.push(ValidationIssue {
            concept_id: None,
            field: "chapterId",
            message: "must not be empty".to_string(),
        });
    }

    let mut seen: HashSet<&str> = HashSet::with_capacity(concepts.len());
    for concept in concepts {
        let id = (!concept.id.is_empty()).then(|| concept.id.clone());
        if concept.id.trim().is_empty() {
            issues.push(ValidationIssue {
                concept_id: None,
                field: "id",
                message: format!("missing id on concept named '{}'", concept.name),
            });
        } else if !seen.insert(concept.id.as_str()) {
            issues.push(ValidationIssue {
                concept_id: id.clone(),
                field: "id",
                message: "duplicate id".to_string(),
            });
        }
        if concept.name.trim().is_empty() {
            issues.push(ValidationIssue {
                concept_id: id.clone(),
                field: "name",
                message: "must not be empty".to_string(),
            });
        }
        if !(1..=5).contains(&concept.importance) {
            issues.push(ValidationIssue {
                concept_id: id.clone(),
                field: "importance",
                message: format!("must be 1-5, got {}", concept.importance),
            });
        }
        if !concept.estimated_minutes.is_finite() || concept.estimated_minutes < 0.0 {
            issues.push(ValidationIssue {
                concept_id: id,
                field: "estimatedMinutes",
                message: format!("must be a non-negative number, got {}", concept.estimated_minutes),
            });
        }
    }

    if !issues.is_empty() {
        return Err(PlanError::StructuralInput(issues));
    }

    for concept in concepts {
        let unknown: Vec<String> = concept
            .related_ids
            .iter()
            .filter(|r| !seen.contains(r.as_str()))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            warnings.push(PlanWarning::UnknownRelatedIds {
                concept_id: concept.id.clone(),
                unknown,
            });
        }
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter() -> ChapterMetadata {
        ChapterMetadata::new("ch1")
    }

    #[test]
    fn test_valid_input_passes() {
        let concepts = vec![Concept::new("a", "Atoms"), Concept::new("b", "Bonds")];
        let warnings = validate_concepts(&concepts, &chapter()).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_all_issues_reported_together() {
        let concepts = vec![
            Concept::new("a", "Atoms").with_importance(0),
            Concept::new("a", ""),
        ];
        let err = validate_concepts(&concepts, &chapter()).unwrap_err();
        let PlanError::StructuralInput(issues) = err else {
            panic!("expected structural error");
        };
        let fields: Vec<&str> = issues.iter().map(|i| i.field).collect();
        assert!(fields.contains(&"importance"));
        assert!(fields.contains(&"name"));
        assert!(issues.iter().any(|i| i.message == "duplicate id"));
    }

    #[test]
    fn test_empty_chapter_id_rejected() {
        let err = validate_concepts(&[], &ChapterMetadata::new("  ")).unwrap_err();
        assert!(err.to_string().contains("chapterId"));
    }

    #[test]
    fn test_unknown_related_ids_warn() {
        let concepts = vec![Concept::new("a", "Atoms").prerequisite_for("zz")];
        let warnings = validate_concepts(&concepts, &chapter()).unwrap();
        assert_eq!(
            warnings,
            vec![PlanWarning::UnknownRelatedIds {
                concept_id: "a".to_string(),
                unknown: vec!["zz".to_string()],
            }]
        );
    }

    #[test]
    fn test_subject_support() {
        assert_eq!(subject_support("Biology"), SubjectSupport::Supported);
        assert_eq!(subject_support("geometry"), SubjectSupport::Unsupported);
        assert_eq!(subject_support("Astronomy"), SubjectSupport::Fallback);
    }
}
