//! Configuration
//!
//! Planner budgets and pipeline tuning. Every field has a default so a YAML
//! file only needs to name what it overrides. Environment variables win over
//! the file.

use crate::types::SizeCategory;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Env var naming a YAML config file.
pub const CONFIG_PATH_ENV: &str = "LESSONWAVE_CONFIG";
pub const CONCURRENCY_ENV: &str = "LESSONWAVE_CONCURRENCY";
pub const RETRY_DELAY_ENV: &str = "LESSONWAVE_RETRY_DELAY_MS";
pub const STORE_DIR_ENV: &str = "LESSONWAVE_STORE_DIR";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid value for {key}: {value}")]
    Env { key: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Inclusive episode-count range drawn from for one size category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRange {
    pub lo: u32,
    pub hi: u32,
}

impl CountRange {
    pub const fn new(lo: u32, hi: u32) -> Self {
        Self { lo, hi }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetRanges {
    pub small: CountRange,
    pub medium: CountRange,
    pub large: CountRange,
}

impl Default for TargetRanges {
    fn default() -> Self {
        Self {
            small: CountRange::new(1, 2),
            medium: CountRange::new(2, 4),
            large: CountRange::new(4, 6),
        }
    }
}

impl TargetRanges {
    pub fn for_size(&self, size: SizeCategory) -> CountRange {
        match size {
            SizeCategory::Small => self.small,
            SizeCategory::Medium => self.medium,
            SizeCategory::Large => self.large,
        }
    }
}

/// Knobs for the clustering planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Max summed complexity per episode once it holds two concepts.
    pub complexity_budget: f64,
    pub max_concepts_per_episode: usize,
    /// Single-concept episodes below this merge forward.
    pub merge_threshold: f64,
    /// Episodes above this with more than two concepts are split.
    pub split_threshold: f64,
    pub min_duration_minutes: u32,
    pub max_duration_minutes: u32,
    pub base_minutes: f64,
    pub minutes_per_complexity: f64,
    pub words_per_minute: u32,
    pub target_ranges: TargetRanges,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            complexity_budget: 15.0,
            max_concepts_per_episode: 3,
            merge_threshold: 3.0,
            split_threshold: 20.0,
            min_duration_minutes: 5,
            max_duration_minutes: 15,
            base_minutes: 4.0,
            minutes_per_complexity: 0.5,
            words_per_minute: 140,
            target_ranges: TargetRanges::default(),
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_duration_minutes > self.max_duration_minutes {
            return Err(ConfigError::Invalid(format!(
                "min_duration_minutes ({}) exceeds max_duration_minutes ({})",
                self.min_duration_minutes, self.max_duration_minutes
            )));
        }
        if self.max_concepts_per_episode == 0 {
            return Err(ConfigError::Invalid(
                "max_concepts_per_episode must be at least 1".to_string(),
            ));
        }
        if !(self.complexity_budget.is_finite() && self.complexity_budget > 0.0) {
            return Err(ConfigError::Invalid(
                "complexity_budget must be a positive number".to_string(),
            ));
        }
        for (name, range) in [
            ("small", self.target_ranges.small),
            ("medium", self.target_ranges.medium),
            ("large", self.target_ranges.large),
        ] {
            if range.lo > range.hi || range.lo == 0 {
                return Err(ConfigError::Invalid(format!(
                    "target range '{}' must satisfy 1 <= lo <= hi (got {}..={})",
                    name, range.lo, range.hi
                )));
            }
        }
        Ok(())
    }
}

/// Knobs for the generation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Concurrent generation tasks per wave.
    pub concurrency: usize,
    /// Pause between sequential retries in `retry_all_failed`.
    pub retry_delay_ms: u64,
    /// Jobs planned at once. Extraction and analysis are not limited.
    pub planning_slots: usize,
    pub store_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            retry_delay_ms: 2000,
            planning_slots: 1,
            store_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.planning_slots == 0 {
            return Err(ConfigError::Invalid(
                "planning_slots must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LessonwaveConfig {
    pub planner: PlannerConfig,
    pub pipeline: PipelineConfig,
}

impl LessonwaveConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Load from `LESSONWAVE_CONFIG` when set (defaults otherwise), then apply
    /// env overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::load(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup. Split out so tests don't touch the
    /// process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(CONCURRENCY_ENV) {
            self.pipeline.concurrency = value.trim().parse().map_err(|_| ConfigError::Env {
                key: CONCURRENCY_ENV,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(RETRY_DELAY_ENV) {
            self.pipeline.retry_delay_ms =
                value.trim().parse().map_err(|_| ConfigError::Env {
                    key: RETRY_DELAY_ENV,
                    value: value.clone(),
                })?;
        }
        if let Some(value) = lookup(STORE_DIR_ENV) {
            self.pipeline.store_dir = Some(PathBuf::from(value));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.planner.validate()?;
        self.pipeline.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
planner:
  complexity_budget: 12.0
pipeline:
  concurrency: 5
"#;
        let config = LessonwaveConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.planner.complexity_budget, 12.0);
        assert_eq!(config.planner.max_concepts_per_episode, 3);
        assert_eq!(config.pipeline.concurrency, 5);
        assert_eq!(config.pipeline.retry_delay_ms, 2000);
    }

    #[test]
    fn test_inverted_duration_bounds_rejected() {
        let yaml = r#"
planner:
  min_duration_minutes: 20
  max_duration_minutes: 10
"#;
        let err = LessonwaveConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_zero_planning_slots_rejected() {
        let yaml = r#"
pipeline:
  planning_slots: 0
"#;
        let err = LessonwaveConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("planning_slots")));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = LessonwaveConfig::default();
        config
            .apply_overrides(|key| match key {
                CONCURRENCY_ENV => Some("7".to_string()),
                RETRY_DELAY_ENV => Some("50".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.pipeline.concurrency, 7);
        assert_eq!(config.pipeline.retry_delay_ms, 50);
        assert_eq!(config.pipeline.store_dir, None);
    }

    #[test]
    fn test_bad_env_value_reports_key() {
        let mut config = LessonwaveConfig::default();
        let err = config
            .apply_overrides(|key| (key == CONCURRENCY_ENV).then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { key: CONCURRENCY_ENV, .. }));
    }
}
