//! TOML configuration for the `docqa` binary.
//!
//! ```toml
//! embedder = "ollama"            # or "hash" for offline lexical embeddings
//!
//! [rag]
//! chunk_size = 800
//! top_k = 5
//!
//! [ollama]
//! url = "http://127.0.0.1:11434"
//! embedding_model = "nomic-embed-text"
//! embedding_dimensions = 768
//! generation_model = "llama3.1"
//!
//! [store]
//! path = ".docqa/index.json"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use docqa_rag::RagConfig;
use serde::{Deserialize, Serialize};

/// File read when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "docqa.toml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    #[default]
    Ollama,
    Hash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OllamaSettings {
    pub url: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub generation_model: String,
    pub temperature: Option<f32>,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            url: docqa_rag::ollama::DEFAULT_OLLAMA_URL.to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dimensions: 768,
            generation_model: "llama3.1".to_string(),
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HashSettings {
    pub dimensions: usize,
}

impl Default for HashSettings {
    fn default() -> Self {
        Self { dimensions: 512 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSettings {
    /// JSON index file.
    pub path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { path: PathBuf::from(".docqa/index.json") }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub embedder: EmbedderKind,
    pub rag: RagConfig,
    pub ollama: OllamaSettings,
    pub hash: HashSettings,
    pub store: StoreSettings,
}

impl CliConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_FILE`]
    /// in the working directory is used if present, otherwise defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.rag.validate()?;
        if self.embedding_dimensions() == 0 {
            bail!("embedding dimensions must be greater than zero");
        }
        Ok(())
    }

    /// Dimensionality of the configured embedder.
    pub fn embedding_dimensions(&self) -> usize {
        match self.embedder {
            EmbedderKind::Ollama => self.ollama.embedding_dimensions,
            EmbedderKind::Hash => self.hash.dimensions,
        }
    }
}

#[cfg(test)]
mod tests {
    use docqa_rag::{NoContextPolicy, SimilarityMetric};

    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(CliConfig::from_toml("").unwrap(), CliConfig::default());
    }

    #[test]
    fn tables_override_individual_fields() {
        let config = CliConfig::from_toml(
            r#"
            embedder = "hash"

            [rag]
            chunk_size = 400
            chunk_overlap = 40
            metric = "inner_product"
            no_context_policy = "hedge"

            [rag.retry]
            max_attempts = 6

            [hash]
            dimensions = 128

            [store]
            path = "/tmp/corpus.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.embedder, EmbedderKind::Hash);
        assert_eq!(config.rag.chunk_size, 400);
        assert_eq!(config.rag.metric, SimilarityMetric::InnerProduct);
        assert_eq!(config.rag.no_context_policy, NoContextPolicy::Hedge);
        assert_eq!(config.rag.retry.max_attempts, 6);
        assert_eq!(config.rag.retry.base_delay_ms, 250);
        assert_eq!(config.rag.top_k, RagConfig::default().top_k);
        assert_eq!(config.embedding_dimensions(), 128);
        assert_eq!(config.store.path, PathBuf::from("/tmp/corpus.json"));
        assert_eq!(config.ollama, OllamaSettings::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(CliConfig::from_toml("[ollama]\nmodel = \"llama3.1\"").is_err());
    }

    #[test]
    fn invalid_rag_parameters_fail_validation() {
        let config = CliConfig::from_toml("[rag]\nchunk_size = 100\nchunk_overlap = 100").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CliConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docqa.toml");
        std::fs::write(&path, "[ollama]\ngeneration_model = \"mistral\"\n").unwrap();
        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.ollama.generation_model, "mistral");
    }
}
