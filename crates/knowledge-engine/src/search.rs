//! Application-level entry points for the five `kengine query --mode`
//! variants: `semantic`, `keyword`, `hybrid` run straight through C3/C5/C6;
//! `fusion` and `enhanced` go through the full RAG orchestrator (C9),
//! which delegates final-answer synthesis to an [`AnswerGenerator`].
//!
//! This module owns only config parsing, store/embedder/generator
//! wiring, and CLI output formatting — every actual retrieval algorithm
//! lives in `knowledge_engine_core`.

use std::sync::Arc;

use anyhow::{bail, Result};

use knowledge_engine_core::embedding::{EmbeddingProvider, HashEmbedder};
use knowledge_engine_core::hybrid::{HybridResultItem, HybridWeights};
use knowledge_engine_core::orchestrator::{AnswerGenerator, HybridOptions, QueryOptions, QueryResponse, RagOrchestrator};
use knowledge_engine_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Stand-in for the external answer-generator port (§6.2): the real LLM
/// client is an external collaborator out of scope for this crate. This
/// simply surfaces the assembled context as the "answer" so the CLI and
/// integration tests have something deterministic to assert against —
/// the same role [`HashEmbedder`] plays for the embedder port.
pub struct ExtractiveAnswerGenerator;

#[async_trait::async_trait]
impl AnswerGenerator for ExtractiveAnswerGenerator {
    async fn generate(&self, _system_prompt: &str, user_message: &str, _temperature: f32, _max_tokens: u32) -> Result<String> {
        Ok(user_message.to_string())
    }
}

/// The five search modes a `kengine query` invocation may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Semantic,
    Keyword,
    Hybrid,
    Fusion,
    Enhanced,
}

impl std::str::FromStr for SearchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "semantic" => Ok(SearchMode::Semantic),
            "keyword" => Ok(SearchMode::Keyword),
            "hybrid" => Ok(SearchMode::Hybrid),
            "fusion" => Ok(SearchMode::Fusion),
            "enhanced" => Ok(SearchMode::Enhanced),
            other => bail!("unknown search mode '{other}'; use semantic, keyword, hybrid, fusion, or enhanced"),
        }
    }
}

pub fn build_embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.embedding.provider.as_str() {
        "hash" | "disabled" => Ok(Arc::new(HashEmbedder::new(config.embedding.dims))),
        other => bail!("embedding provider '{other}' has no in-crate implementation (external collaborator)"),
    }
}

/// Outcome of a `semantic`/`keyword`/`hybrid` query: a ranked list with
/// no generation step, matching §4.6 ("hybrid_query ... emits a scored
/// list").
pub struct RankedResults {
    pub items: Vec<HybridResultItem>,
}

/// One-shot wiring: store, embedder, orchestrator, ready for any mode.
async fn build_orchestrator(config: &Config) -> Result<(RagOrchestrator, sqlx::SqlitePool)> {
    let pool = db::connect(config).await?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool.clone()));
    let embedder = build_embedder(config)?;
    let generator: Arc<dyn AnswerGenerator> = Arc::new(ExtractiveAnswerGenerator);

    let orchestrator = RagOrchestrator::new(store, embedder, generator)
        .with_bm25_params(config.retrieval.bm25_params())
        .with_fusion_config(config.fusion.to_fusion_config());
    Ok((orchestrator, pool))
}

/// Runs `semantic` or `keyword` through [`RagOrchestrator::hybrid_query`]
/// with one weight pinned to zero, and `hybrid` with the configured
/// weights — all three return a scored list, no generation.
pub async fn ranked_query(config: &Config, question: &str, mode: SearchMode, limit: Option<usize>) -> Result<RankedResults> {
    let (orchestrator, pool) = build_orchestrator(config).await?;

    let weights = match mode {
        SearchMode::Semantic => HybridWeights { w_sem: 1.0, w_lex: 0.0 },
        SearchMode::Keyword => HybridWeights { w_sem: 0.0, w_lex: 1.0 },
        SearchMode::Hybrid => config.retrieval.hybrid_weights(),
        SearchMode::Fusion | SearchMode::Enhanced => unreachable!("ranked_query only handles non-generating modes"),
    };

    let opts = HybridOptions {
        k: limit.unwrap_or(config.retrieval.final_limit),
        weights,
        store_filter: None,
        explain: true,
        min_semantic_score: None,
    };
    let items = orchestrator.hybrid_query(question, &opts).await;
    pool.close().await;
    Ok(RankedResults { items: items? })
}

/// Runs `fusion` (`query_with_fusion`) or `enhanced` (`enhanced_query`),
/// both of which produce a full [`QueryResponse`] including a generated
/// answer.
pub async fn generative_query(config: &Config, question: &str, mode: SearchMode, limit: Option<usize>) -> Result<QueryResponse> {
    let (orchestrator, pool) = build_orchestrator(config).await?;
    let opts = HybridOptions {
        k: limit.unwrap_or(config.retrieval.final_limit),
        weights: config.retrieval.hybrid_weights(),
        store_filter: None,
        explain: false,
        min_semantic_score: None,
    };

    // `enhanced` degrades to plain `fusion` when query expansion is
    // disabled in config, since C7 is the only thing distinguishing them.
    let response = match mode {
        SearchMode::Fusion => orchestrator.query_with_fusion(question, &opts).await,
        SearchMode::Enhanced if config.query_expansion.enabled => orchestrator.enhanced_query(question, &opts).await,
        SearchMode::Enhanced => orchestrator.query_with_fusion(question, &opts).await,
        _ => unreachable!("generative_query only handles fusion/enhanced modes"),
    };
    pool.close().await;
    Ok(response)
}

/// Runs the baseline dense-only entry point (`RagOrchestrator::query`).
pub async fn baseline_query(config: &Config, question: &str, limit: Option<usize>) -> Result<QueryResponse> {
    let (orchestrator, pool) = build_orchestrator(config).await?;
    let opts = QueryOptions { k: limit.unwrap_or(config.retrieval.final_limit), ..QueryOptions::default() };
    let response = orchestrator.query(question, &opts).await;
    pool.close().await;
    Ok(response)
}

/// CLI entry point for `kengine query <question> --mode <mode>`.
pub async fn run_query(config: &Config, question: &str, mode: SearchMode, limit: Option<usize>) -> Result<()> {
    if question.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    match mode {
        SearchMode::Semantic | SearchMode::Keyword | SearchMode::Hybrid => {
            let results = ranked_query(config, question, mode, limit).await?;
            print_ranked(&results.items);
        }
        SearchMode::Fusion | SearchMode::Enhanced => {
            let response = generative_query(config, question, mode, limit).await?;
            print_generative(&response);
        }
    }
    Ok(())
}

fn print_ranked(items: &[HybridResultItem]) {
    if items.is_empty() {
        println!("No results.");
        return;
    }
    for (i, item) in items.iter().enumerate() {
        let title = item.chunk_title.as_deref().or(item.title.as_deref()).unwrap_or("(untitled)");
        println!("{}. [{:.3}] {} / {}", i + 1, item.score, item.document_id, title);
        if let Some(ex) = &item.explain {
            println!("    semantic={:.3}  lexical={:.3}  boosts={:.3}", ex.semantic_score, ex.lexical_score, ex.total_boost());
        }
        println!("    excerpt: \"{}\"", item.content_preview.replace('\n', " ").trim());
        println!("    id: {}", item.id);
        println!();
    }
}

fn print_generative(response: &QueryResponse) {
    if response.metadata.error {
        println!(
            "error: {} ({})",
            response.metadata.error_kind.as_deref().unwrap_or("Unknown"),
            response.metadata.error_message.as_deref().unwrap_or("")
        );
    }
    if !response.fused_answers.is_empty() {
        println!("--- Fused answers ({}) ---", response.fused_answers.len());
        for (i, fused) in response.fused_answers.iter().enumerate() {
            println!("{}. confidence={:.3} coherence={:.3} sources={}", i + 1, fused.confidence, fused.coherence_score, fused.num_sources());
        }
        println!();
    }
    if !response.retrieved.is_empty() {
        println!("--- Additional sources ({}) ---", response.retrieved.len());
        for (i, item) in response.retrieved.iter().enumerate() {
            println!("{}. [{:.3}] {}", i + 1, item.score, item.document_id);
        }
        println!();
    }
    println!("--- Answer ---");
    println!("{}", response.answer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn search_mode_parses_known_modes() {
        assert_eq!(SearchMode::from_str("hybrid").unwrap(), SearchMode::Hybrid);
        assert_eq!(SearchMode::from_str("enhanced").unwrap(), SearchMode::Enhanced);
        assert!(SearchMode::from_str("bogus").is_err());
    }
}
