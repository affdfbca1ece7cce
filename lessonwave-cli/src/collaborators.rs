//! Local stand-ins for the extraction, generation and speech services.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use lessonwave_core::{
    AudioAsset, AudioRenderer, AudioRequest, ChapterMetadata, ChapterSource, Concept,
    ConceptExtractor, EpisodeContent, EpisodeGenerator, ExtractedChapter, GenerationRequest, Mcq,
};

const WORDS_PER_MINUTE: usize = 140;

/// Accepts either a bare concept array or `{ "metadata": .., "concepts": .. }`.
pub fn parse_chapter(text: &str, fallback: ChapterMetadata) -> Result<ExtractedChapter> {
    if let Ok(chapter) = serde_json::from_str::<ExtractedChapter>(text) {
        return Ok(chapter);
    }
    let concepts: Vec<Concept> =
        serde_json::from_str(text).context("concepts file is neither a chapter nor a concept list")?;
    Ok(ExtractedChapter {
        metadata: fallback,
        concepts,
    })
}

/// The chapter text is already the concept JSON.
pub struct JsonConceptExtractor;

#[async_trait]
impl ConceptExtractor for JsonConceptExtractor {
    async fn extract(&self, source: &ChapterSource) -> Result<ExtractedChapter> {
        let mut fallback = ChapterMetadata::new(source.chapter_id.clone());
        fallback.subject = source.subject.clone();
        fallback.grade_band = source.grade_band.clone();
        let mut chapter = parse_chapter(&source.text, fallback)?;
        if chapter.metadata.word_count == 0 {
            chapter.metadata.word_count = source.text.split_whitespace().count() as u32;
        }
        Ok(chapter)
    }
}

/// Builds a script from the concept names. Episodes listed in `fail` error
/// out, for exercising partial failure and retry.
pub struct TemplateGenerator {
    fail: BTreeSet<u32>,
}

impl TemplateGenerator {
    pub fn new(fail: impl IntoIterator<Item = u32>) -> Self {
        Self {
            fail: fail.into_iter().collect(),
        }
    }
}

#[async_trait]
impl EpisodeGenerator for TemplateGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<EpisodeContent> {
        if self.fail.contains(&request.episode_index) {
            bail!("forced failure for episode {}", request.episode_index);
        }

        let names: Vec<&str> = request.concepts.iter().map(|c| c.name.as_str()).collect();
        let mut script = format!(
            "Episode {} of chapter {}. Today: {}.",
            request.episode_index,
            request.chapter_id,
            names.join(", ")
        );
        if let Some(feedback) = &request.feedback {
            script.push_str(&format!(" (Revised: {feedback})"));
        }

        let mcqs = request
            .concepts
            .iter()
            .map(|c| Mcq {
                question: format!("Which of these did we cover in episode {}?", request.episode_index),
                options: vec![c.name.clone(), "None of the above".to_string()],
                answer_index: 0,
            })
            .collect();
        Ok(EpisodeContent { script, mcqs })
    }
}

/// Writes each script to `<out_dir>/<job_id>/episode-<n>.txt` in place of
/// synthesized speech.
pub struct TranscriptRenderer {
    out_dir: PathBuf,
}

impl TranscriptRenderer {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }
}

#[async_trait]
impl AudioRenderer for TranscriptRenderer {
    async fn render(&self, request: &AudioRequest) -> Result<AudioAsset> {
        let dir = self.out_dir.join(request.job_id.to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(format!("episode-{}.txt", request.episode_index));
        tokio::fs::write(&path, &request.content.script)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        let words = request.content.script.split_whitespace().count();
        Ok(AudioAsset {
            episode_index: request.episode_index,
            uri: path.display().to_string(),
            duration_seconds: (words * 60 / WORDS_PER_MINUTE) as u32,
        })
    }
}
