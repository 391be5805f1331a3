use crate::chunking::ChunkingConfig;
use crate::embeddings::{RetryPolicy, DEFAULT_EMBEDDING_DIMENSIONS};
use crate::error::ConfigError;
use crate::headings::{HeadingDetector, HeadingRules};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub index_dir: PathBuf,
    pub chunking: ChunkingConfig,
    pub headings: HeadingRules,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("data/vector_db"),
            chunking: ChunkingConfig::default(),
            headings: HeadingRules::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Reads a JSON config; absent fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking.validate()?;
        HeadingDetector::new(&self.headings)?;
        self.retrieval.validate()?;

        if self.embedding.dimensions == 0 {
            return Err(ConfigError::Retrieval(
                "embedding dimensions must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_k: usize,
    pub max_k: usize,
    pub min_score: f32,
    /// Citation used for passages that precede the first heading.
    pub fallback_label: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: 4,
            max_k: 50,
            min_score: 0.2,
            fallback_label: "General Provisions".to_string(),
        }
    }
}

impl RetrievalConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_k == 0 || self.default_k > self.max_k {
            return Err(ConfigError::Retrieval(format!(
                "default_k {} must be within 1..={}",
                self.default_k, self.max_k
            )));
        }
        if !self.min_score.is_finite() || !(-1.0..=1.0).contains(&self.min_score) {
            return Err(ConfigError::Retrieval(format!(
                "min_score {} must be within [-1, 1]",
                self.min_score
            )));
        }
        if self.fallback_label.trim().is_empty() {
            return Err(ConfigError::Retrieval(
                "fallback_label must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Hashing,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub endpoint: Option<String>,
    pub api_key_env: String,
    pub dimensions: usize,
    pub batch_size: usize,
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hashing,
            model: "all-MiniLM-L6-v2".to_string(),
            endpoint: None,
            api_key_env: "EMBEDDING_API_KEY".to_string(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            batch_size: 32,
            concurrency: 4,
            retry: RetryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn partial_file_keeps_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("engine.json");
        std::fs::write(
            &path,
            r#"{
                "index_dir": "/srv/statute",
                "chunking": { "length": 800 },
                "retrieval": { "fallback_label": "Preliminary" },
                "embedding": { "provider": "http", "endpoint": "http://localhost:8000/v1",
                               "retry": { "attempt_timeout_ms": 2500 } }
            }"#,
        )?;

        let config = EngineConfig::from_json_file(&path)?;

        assert_eq!(config.index_dir, PathBuf::from("/srv/statute"));
        assert_eq!(config.chunking.length, 800);
        assert_eq!(config.chunking.overlap, 50);
        assert_eq!(config.retrieval.fallback_label, "Preliminary");
        assert_eq!(config.retrieval.default_k, 4);
        assert_eq!(config.embedding.provider, EmbeddingProvider::Http);
        assert_eq!(config.embedding.retry.attempt_timeout, Duration::from_millis(2500));
        assert_eq!(config.embedding.retry.max_attempts, 3);
        Ok(())
    }

    #[test]
    fn overlap_not_below_length_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "chunking": { "length": 100, "overlap": 100 } }"#)?;

        assert!(matches!(
            EngineConfig::from_json_file(&path),
            Err(ConfigError::Chunking(_))
        ));
        Ok(())
    }

    #[test]
    fn retrieval_bounds_are_checked() {
        let mut config = EngineConfig::default();
        config.retrieval.min_score = 1.5;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.retrieval.default_k = 0;
        assert!(config.validate().is_err());

        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn missing_file_reports_path() {
        let error = EngineConfig::from_json_file(Path::new("/nonexistent/engine.json")).unwrap_err();
        assert!(error.to_string().contains("/nonexistent/engine.json"));
    }
}
