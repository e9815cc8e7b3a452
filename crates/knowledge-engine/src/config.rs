//! Configuration parsing and validation.
//!
//! The knowledge engine is configured via a TOML file (default:
//! `config/kengine.toml`). The config defines the database path, chunking
//! parameters, hybrid retrieval weights, embedding provider settings,
//! chunk-fusion tuning, and query-expansion toggles.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use knowledge_engine_core::bm25::Bm25Params;
use knowledge_engine_core::fusion::FusionConfig;
use knowledge_engine_core::hybrid::HybridWeights;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub fusion: FusionSectionConfig,
    #[serde(default)]
    pub query_expansion: QueryExpansionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_chunk_chars: default_max_chunk_chars() }
    }
}

fn default_max_chunk_chars() -> usize {
    2_800
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_w_sem")]
    pub w_sem: f64,
    #[serde(default = "default_w_lex")]
    pub w_lex: f64,
    #[serde(default = "default_k1")]
    pub bm25_k1: f64,
    #[serde(default = "default_b")]
    pub bm25_b: f64,
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            w_sem: default_w_sem(),
            w_lex: default_w_lex(),
            bm25_k1: default_k1(),
            bm25_b: default_b(),
            final_limit: default_final_limit(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

fn default_w_sem() -> f64 {
    0.6
}
fn default_w_lex() -> f64 {
    0.4
}
fn default_k1() -> f64 {
    1.5
}
fn default_b() -> f64 {
    0.75
}
fn default_final_limit() -> usize {
    10
}
fn default_similarity_threshold() -> f32 {
    0.0
}

impl RetrievalConfig {
    pub fn hybrid_weights(&self) -> HybridWeights {
        HybridWeights { w_sem: self.w_sem, w_lex: self.w_lex }.normalized()
    }

    pub fn bm25_params(&self) -> Bm25Params {
        Bm25Params::new(self.bm25_k1, self.bm25_b)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_model() -> String {
    "hash-stub".to_string()
}
fn default_dims() -> usize {
    knowledge_engine_core::models::EMBEDDING_DIMS
}
fn default_batch_size() -> usize {
    64
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FusionSectionConfig {
    #[serde(default = "default_coherence_threshold")]
    pub coherence_threshold: f64,
    #[serde(default = "default_min_chunks_for_fusion")]
    pub min_chunks_for_fusion: usize,
}

impl Default for FusionSectionConfig {
    fn default() -> Self {
        Self {
            coherence_threshold: default_coherence_threshold(),
            min_chunks_for_fusion: default_min_chunks_for_fusion(),
        }
    }
}

fn default_coherence_threshold() -> f64 {
    0.6
}
fn default_min_chunks_for_fusion() -> usize {
    2
}

impl FusionSectionConfig {
    pub fn to_fusion_config(&self) -> FusionConfig {
        FusionConfig {
            coherence_threshold: self.coherence_threshold,
            min_chunks_for_fusion: self.min_chunks_for_fusion,
            ..FusionConfig::default()
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryExpansionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for QueryExpansionConfig {
    fn default() -> Self {
        Self { enabled: default_true() }
    }
}

fn default_true() -> bool {
    true
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_chunk_chars == 0 {
        anyhow::bail!("chunking.max_chunk_chars must be > 0");
    }

    if config.retrieval.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }

    if config.retrieval.w_sem < 0.0 || config.retrieval.w_lex < 0.0 {
        anyhow::bail!("retrieval.w_sem and retrieval.w_lex must be >= 0.0");
    }

    if !(0.0..=1.0).contains(&config.retrieval.bm25_b) {
        anyhow::bail!("retrieval.bm25_b must be in [0.0, 1.0]");
    }

    if config.embedding.is_enabled() && config.embedding.dims == 0 {
        anyhow::bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            config.embedding.provider
        );
    }

    match config.embedding.provider.as_str() {
        "disabled" | "hash" | "remote" => {}
        other => anyhow::bail!("Unknown embedding provider: '{}'. Must be disabled, hash, or remote.", other),
    }

    if config.fusion.min_chunks_for_fusion < 2 {
        anyhow::bail!("fusion.min_chunks_for_fusion must be >= 2");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_minimal_config_with_defaults() {
        let file = write_temp_config("[db]\npath = \"/tmp/kengine/db.sqlite3\"\n");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.retrieval.final_limit, 10);
        assert_eq!(config.embedding.provider, "hash");
    }

    #[test]
    fn rejects_out_of_range_bm25_b() {
        let file = write_temp_config(
            "[db]\npath = \"/tmp/kengine/db.sqlite3\"\n[retrieval]\nbm25_b = 2.0\n",
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn rejects_unknown_embedding_provider() {
        let file = write_temp_config(
            "[db]\npath = \"/tmp/kengine/db.sqlite3\"\n[embedding]\nprovider = \"vendorX\"\n",
        );
        assert!(load_config(file.path()).is_err());
    }
}
