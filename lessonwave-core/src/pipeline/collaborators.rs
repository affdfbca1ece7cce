//! External collaborators the pipeline drives but does not implement.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::{ChapterSource, ExtractedChapter};
use crate::generation::EpisodeContent;

/// Turns raw chapter text into concepts plus chapter metadata.
#[async_trait]
pub trait ConceptExtractor: Send + Sync {
    async fn extract(&self, source: &ChapterSource) -> anyhow::Result<ExtractedChapter>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioRequest {
    pub job_id: Uuid,
    pub chapter_id: String,
    pub episode_index: u32,
    pub content: EpisodeContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioAsset {
    pub episode_index: u32,
    /// Where the renderer put the audio.
    pub uri: String,
    pub duration_seconds: u32,
}

/// Speech synthesis for one approved episode script.
#[async_trait]
pub trait AudioRenderer: Send + Sync {
    async fn render(&self, request: &AudioRequest) -> anyhow::Result<AudioAsset>;
}
