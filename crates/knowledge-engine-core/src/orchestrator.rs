//! RAG orchestrator (C9): the four query entry points, strategy
//! execution, and context assembly for the external answer generator.
//!
//! Constructor-passed ports, no global registry (§9): a
//! [`RagOrchestrator`] is built once from a [`Store`], an
//! [`EmbeddingProvider`], and an [`AnswerGenerator`], all held as
//! `Arc<dyn Trait>` trait-object collaborators rather than a generic
//! parameter per call site.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::bm25::{Bm25Corpus, Bm25Params};
use crate::embedding::EmbeddingProvider;
use crate::fusion::{self, ChunkForFusion, FusedAnswer, FusionConfig};
use crate::hybrid::{self, HybridResultItem, HybridWeights, ItemMeta, ScoreExplanation};
use crate::models::ChunkType;
use crate::query_expand::{self, ReformulationReason};
use crate::store::{SimilarityHit, Store};

/// Answer-generator port (§6.2): `generate(system_prompt, user_message,
/// temperature, max_tokens) -> answer text`. The orchestrator assembles
/// `system_prompt` itself and never expects the generator to retrieve.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        user_message: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String>;
}

const BASE_SYSTEM_PROMPT: &str = "You are a retrieval-augmented assistant. \
Answer the question using only the numbered sources provided below. \
If the sources do not contain the answer, say so.";

const FUSION_SYSTEM_PROMPT: &str = "You are a retrieval-augmented assistant. \
You are given pre-synthesized fused answers (already merged from multiple \
coherent sources) followed by additional unfused sources. Prefer the fused \
answers; use the additional sources only to fill gaps.";

const ENHANCED_SYSTEM_PROMPT: &str = "You are a retrieval-augmented assistant. \
The sources below were retrieved using several complementary search \
strategies (shown per source); synthesize a single answer using only \
this material.";

/// One retrieved item in the orchestrator's own (store-agnostic) shape,
/// derived from either a [`SimilarityHit`] or a [`HybridResultItem`].
#[derive(Debug, Clone)]
pub struct RetrievedItem {
    pub id: String,
    pub store_type: String,
    pub document_id: String,
    pub is_chunk: bool,
    pub title: Option<String>,
    pub chunk_title: Option<String>,
    pub content_preview: String,
    pub score: f64,
    pub explain: Option<ScoreExplanation>,
    /// Strategy labels that surfaced this item (`enhanced_query` only).
    pub strategies: Vec<String>,
}

impl From<SimilarityHit> for RetrievedItem {
    fn from(hit: SimilarityHit) -> Self {
        Self {
            id: hit.id,
            store_type: hit.store_type,
            document_id: hit.document_id,
            is_chunk: hit.is_chunk,
            title: hit.title.clone(),
            chunk_title: if hit.is_chunk { hit.title } else { None },
            content_preview: hit.content_preview,
            score: hit.similarity_score as f64,
            explain: None,
            strategies: Vec::new(),
        }
    }
}

impl From<HybridResultItem> for RetrievedItem {
    fn from(item: HybridResultItem) -> Self {
        Self {
            id: item.id,
            store_type: item.store_type,
            document_id: item.document_id,
            is_chunk: item.is_chunk,
            title: item.title,
            chunk_title: item.chunk_title,
            content_preview: item.content_preview,
            score: item.score,
            explain: item.explain,
            strategies: Vec::new(),
        }
    }
}

/// Structured envelope every entry point returns (§7: "never silently
/// empty"): either a populated answer with a non-empty `retrieved` list,
/// or `error: true` with an `error_kind`/`error_message`.
#[derive(Debug, Clone, Default)]
pub struct QueryMetadata {
    pub mode: String,
    pub error: bool,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub degraded_to_lexical: bool,
    pub strategies_used: Vec<String>,
    pub reformulated: bool,
}

#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub answer: String,
    pub retrieved: Vec<RetrievedItem>,
    pub fused_answers: Vec<FusedAnswer>,
    pub metadata: QueryMetadata,
}

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub k: usize,
    pub similarity_threshold: f32,
    pub store_filter: Option<String>,
    pub chunk_type_filter: Option<ChunkType>,
    /// When `false`, `search_similar` is restricted to document-level
    /// rows (§4.3 `include_chunks` filtering rule).
    pub include_chunks: bool,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            k: 10,
            similarity_threshold: 0.0,
            store_filter: None,
            chunk_type_filter: None,
            include_chunks: true,
            temperature: 0.2,
            max_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HybridOptions {
    pub k: usize,
    pub weights: HybridWeights,
    pub store_filter: Option<String>,
    pub explain: bool,
    /// Pre-merge gate on the dense/semantic stage only (not the final
    /// boosted hybrid score): dense hits scoring below this are dropped
    /// before they ever reach [`hybrid::merge`]. `None` keeps every dense
    /// hit the store returned.
    pub min_semantic_score: Option<f32>,
}

impl Default for HybridOptions {
    fn default() -> Self {
        Self {
            k: 10,
            weights: HybridWeights { w_sem: 0.6, w_lex: 0.4 },
            store_filter: None,
            explain: false,
            min_semantic_score: None,
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push('…');
        out
    }
}

/// Context-assembly rules fixed by §4.9: sources numbered, multi-chunk
/// blocks from the same parent grouped, scores rendered with three
/// decimals, content truncated to 2,000 chars per block.
fn assemble_context(items: &[RetrievedItem]) -> String {
    let mut order: Vec<&str> = Vec::new();
    let mut by_doc: HashMap<&str, Vec<&RetrievedItem>> = HashMap::new();
    for item in items {
        if !by_doc.contains_key(item.document_id.as_str()) {
            order.push(item.document_id.as_str());
        }
        by_doc.entry(item.document_id.as_str()).or_default().push(item);
    }

    let mut out = String::new();
    for (i, doc_id) in order.iter().enumerate() {
        let group = &by_doc[doc_id];
        out.push_str(&format!("Source {}: {}\n", i + 1, doc_id));
        for item in group {
            match &item.chunk_title {
                Some(title) => out.push_str(&format!("  [{title}] (score {:.3})\n", item.score)),
                None => out.push_str(&format!("  (score {:.3})\n", item.score)),
            }
            out.push_str(&truncate_chars(&item.content_preview, 2_000));
            out.push_str("\n\n");
        }
    }
    out.trim_end().to_string()
}

fn assemble_fusion_context(fused: &[FusedAnswer], unfused: &[RetrievedItem]) -> String {
    let mut out = String::new();
    for (i, answer) in fused.iter().enumerate() {
        out.push_str(&format!(
            "Fused Source {}: (confidence {:.3}, coherence {:.3}, sources {})\n",
            i + 1,
            answer.confidence,
            answer.coherence_score,
            answer.num_sources()
        ));
        out.push_str(&truncate_chars(&answer.content, 2_000));
        out.push_str("\n\n");
    }
    for (i, item) in unfused.iter().enumerate() {
        out.push_str(&format!(
            "Additional Source {}: {} (score {:.3})\n",
            i + 1,
            item.document_id,
            item.score
        ));
        out.push_str(&truncate_chars(&item.content_preview, 500));
        out.push_str("\n\n");
    }
    out.trim_end().to_string()
}

fn assemble_enhanced_context(fused: &[FusedAnswer], unfused: &[RetrievedItem]) -> String {
    let mut out = assemble_fusion_context(fused, &[]);
    for (i, item) in unfused.iter().enumerate() {
        let strategies = if item.strategies.is_empty() {
            String::new()
        } else {
            format!(" [via: {}]", item.strategies.join(", "))
        };
        out.push_str(&format!(
            "\n\nAdditional Source {}: {} (score {:.3}){}\n",
            i + 1,
            item.document_id,
            item.score,
            strategies
        ));
        out.push_str(&truncate_chars(&item.content_preview, 500));
    }
    out.trim_end().to_string()
}

fn stable_id(store_type: &str, document_id: &str) -> String {
    format!("{store_type}.{document_id}")
}

pub struct RagOrchestrator {
    store: Arc<dyn Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn AnswerGenerator>,
    bm25_params: Bm25Params,
    fusion_config: FusionConfig,
}

impl RagOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn AnswerGenerator>,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            bm25_params: Bm25Params::default(),
            fusion_config: FusionConfig::default(),
        }
    }

    pub fn with_fusion_config(mut self, config: FusionConfig) -> Self {
        self.fusion_config = config;
        self
    }

    pub fn with_bm25_params(mut self, params: Bm25Params) -> Self {
        self.bm25_params = params;
        self
    }

    async fn build_bm25_corpus(&self) -> Result<Bm25Corpus> {
        let chunks = self.store.get_indexed_chunks().await?;
        Ok(Bm25Corpus::build(&chunks, self.bm25_params))
    }

    async fn lexical_search(
        &self,
        query: &str,
        k: usize,
        store_filter: Option<&str>,
    ) -> Result<Vec<(String, f64)>> {
        let corpus = self.build_bm25_corpus().await?;
        let mut scores = corpus.score(query, store_filter, true);
        scores.truncate(k);
        Ok(scores)
    }

    /// Fetch item metadata for stable ids that only appear in the
    /// lexical ranking, so [`hybrid::merge`] can compute field-match
    /// boosts for them too.
    async fn meta_for_lexical_only(
        &self,
        dense: &[SimilarityHit],
        lexical: &[(String, f64)],
    ) -> Result<HashMap<String, ItemMeta>> {
        let dense_ids: HashSet<&str> = dense.iter().map(|h| h.id.as_str()).collect();
        let mut meta = HashMap::new();
        for (id, _) in lexical {
            if dense_ids.contains(id.as_str()) {
                continue;
            }
            if let Some(chunk) = self.store.get_chunk(id).await? {
                meta.insert(
                    id.clone(),
                    ItemMeta {
                        store_type: chunk.store_type,
                        document_id: chunk.document_id,
                        is_chunk: true,
                        title: chunk.title.clone(),
                        chunk_title: chunk.title,
                        content: chunk.content,
                    },
                );
            }
        }
        Ok(meta)
    }

    /// Baseline entry point: one embedding, one dense search, threshold
    /// and chunk-type filtering, context assembly, delegated generation.
    pub async fn query(&self, question: &str, opts: &QueryOptions) -> QueryResponse {
        let mut metadata = QueryMetadata {
            mode: "query".to_string(),
            ..Default::default()
        };

        let dense_hits = match self.embedder.embed_one(question).await {
            Ok(vector) => {
                match self
                    .store
                    .search_similar(&vector, opts.k, opts.store_filter.as_deref(), opts.include_chunks)
                    .await
                {
                    Ok(hits) => hits,
                    Err(e) => {
                        return self.error_response("query", "StorageFailure", e.to_string());
                    }
                }
            }
            Err(e) => {
                metadata.degraded_to_lexical = true;
                metadata.error_kind = Some("EmbedderFailure".to_string());
                metadata.error_message = Some(e.to_string());
                match self.lexical_search(question, opts.k, opts.store_filter.as_deref()).await {
                    Ok(scores) => {
                        let mut hits = Vec::new();
                        for (id, score) in scores {
                            if let Some(chunk) = self.store.get_chunk(&id).await.unwrap_or(None) {
                                hits.push(SimilarityHit {
                                    id,
                                    store_type: chunk.store_type,
                                    document_id: chunk.document_id,
                                    is_chunk: true,
                                    similarity_score: score as f32,
                                    content_preview: truncate_chars(&chunk.content, 240),
                                    title: chunk.title,
                                });
                            }
                        }
                        hits
                    }
                    Err(e) => return self.error_response("query", "StorageFailure", e.to_string()),
                }
            }
        };

        let mut items: Vec<RetrievedItem> = Vec::new();
        for hit in dense_hits {
            if hit.similarity_score < opts.similarity_threshold {
                continue;
            }
            if let Some(filter) = opts.chunk_type_filter {
                if hit.is_chunk {
                    match self.store.get_chunk(&hit.id).await {
                        Ok(Some(chunk)) if chunk.chunk_type != filter => continue,
                        Ok(Some(_)) => {}
                        Ok(None) => continue,
                        Err(e) => return self.error_response("query", "StorageFailure", e.to_string()),
                    }
                } else {
                    continue;
                }
            }
            items.push(hit.into());
        }

        self.generate_from(items, Vec::new(), BASE_SYSTEM_PROMPT, question, opts.temperature, opts.max_tokens, metadata, assemble_context)
            .await
    }

    /// Runs dense + lexical search, merges under the hybrid weighting
    /// scheme, and returns a scored list (optionally with a
    /// per-item breakdown).
    pub async fn hybrid_query(&self, question: &str, opts: &HybridOptions) -> Result<Vec<HybridResultItem>> {
        let mut dense = match self.embedder.embed_one(question).await {
            Ok(vector) => self
                .store
                .search_similar(&vector, opts.k * 2, opts.store_filter.as_deref(), true)
                .await?,
            Err(_) => Vec::new(),
        };
        if let Some(min_score) = opts.min_semantic_score {
            dense.retain(|hit| hit.similarity_score >= min_score);
        }
        let lexical = self.lexical_search(question, opts.k * 2, opts.store_filter.as_deref()).await?;
        let meta = self.meta_for_lexical_only(&dense, &lexical).await?;
        Ok(hybrid::merge(question, &dense, &lexical, &meta, opts.weights, opts.k, opts.explain))
    }

    /// Fetches a chunk's full content and sequence position for C8, since
    /// `SimilarityHit`/`HybridResultItem`/`RetrievedItem` only carry a
    /// truncated preview.
    async fn fetch_fusion_input(&self, chunk_id: &str, relevance: f64) -> Result<Option<ChunkForFusion>> {
        Ok(self.store.get_chunk(chunk_id).await?.map(|chunk| ChunkForFusion {
            chunk_id: chunk.chunk_id,
            document_id: chunk.document_id,
            content: chunk.content,
            title: chunk.title,
            position: chunk.sequence as i64,
            relevance,
            metadata: std::collections::BTreeMap::new(),
        }))
    }

    async fn to_fusion_inputs(&self, items: &[HybridResultItem]) -> Result<Vec<ChunkForFusion>> {
        let mut out = Vec::new();
        for item in items {
            if !item.is_chunk {
                continue;
            }
            if let Some(input) = self.fetch_fusion_input(&item.id, item.score).await? {
                out.push(input);
            }
        }
        Ok(out)
    }

    /// Same as [`Self::to_fusion_inputs`] but over the strategy-merged
    /// `RetrievedItem` shape `enhanced_query` works with.
    async fn to_fusion_inputs_from_retrieved(&self, items: &[RetrievedItem]) -> Result<Vec<ChunkForFusion>> {
        let mut out = Vec::new();
        for item in items {
            if !item.is_chunk {
                continue;
            }
            if let Some(input) = self.fetch_fusion_input(&item.id, item.score).await? {
                out.push(input);
            }
        }
        Ok(out)
    }

    /// Runs `hybrid_query` at a larger `k`, clusters+fuses the chunk
    /// hits via C8, and assembles a context that presents fused answers
    /// first, unfused hits second.
    pub async fn query_with_fusion(&self, question: &str, opts: &HybridOptions) -> QueryResponse {
        let mut fusion_opts = opts.clone();
        fusion_opts.k = opts.k * 3;

        let hybrid_items = match self.hybrid_query(question, &fusion_opts).await {
            Ok(items) => items,
            Err(e) => return self.error_response("query_with_fusion", "StorageFailure", e.to_string()),
        };

        let fusion_inputs = match self.to_fusion_inputs(&hybrid_items).await {
            Ok(inputs) => inputs,
            Err(e) => return self.error_response("query_with_fusion", "StorageFailure", e.to_string()),
        };

        let fused = fusion::fuse_chunks(&fusion_inputs, question, &self.fusion_config);
        let fused_ids: HashSet<&str> = fused.iter().flat_map(|f| f.source_chunks.iter()).map(String::as_str).collect();

        let unfused: Vec<RetrievedItem> = hybrid_items
            .into_iter()
            .filter(|item| !fused_ids.contains(item.id.as_str()))
            .map(RetrievedItem::from)
            .collect();

        let metadata = QueryMetadata {
            mode: "query_with_fusion".to_string(),
            ..Default::default()
        };

        self.generate_fused(fused, unfused, FUSION_SYSTEM_PROMPT, question, 0.2, 1024, metadata, assemble_fusion_context)
            .await
    }

    /// Expands the question into several strategies (C7), executes each
    /// via `hybrid_query`, merges across strategies with a
    /// multiple-strategy-agreement boost, auto-reformulates on poor
    /// recall, then feeds C8 and assembles a strategy-annotated context.
    pub async fn enhanced_query(&self, question: &str, opts: &HybridOptions) -> QueryResponse {
        let expanded = query_expand::expand(question, None);

        let mut merged: HashMap<String, RetrievedItem> = HashMap::new();
        let mut strategies_used = Vec::new();

        for strategy in &expanded.strategies {
            let strategy_opts = HybridOptions {
                k: strategy.params.k,
                weights: opts.weights,
                store_filter: opts.store_filter.clone(),
                explain: false,
                min_semantic_score: Some(strategy.params.similarity_threshold),
            };
            let items = match self.hybrid_query(&strategy.query, &strategy_opts).await {
                Ok(items) => items,
                Err(_) => continue,
            };
            strategies_used.push(strategy.label.to_string());
            for item in items {
                merge_strategy_hit(&mut merged, item, strategy.label);
            }
        }

        let mut reformulated = false;
        if merged.len() < 3 {
            reformulated = true;
            for reformed in query_expand::reformulate(question, ReformulationReason::PoorRecall) {
                if reformed.trim().is_empty() {
                    continue;
                }
                if let Ok(items) = self.hybrid_query(&reformed, opts).await {
                    for item in items {
                        merge_strategy_hit(&mut merged, item, "reformulated");
                    }
                }
            }
        }

        let mut items: Vec<RetrievedItem> = merged.into_values().collect();
        items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.id.cmp(&b.id)));

        let fusion_inputs = match self.to_fusion_inputs_from_retrieved(&items).await {
            Ok(inputs) => inputs,
            Err(e) => return self.error_response("enhanced_query", "StorageFailure", e.to_string()),
        };
        let fused = fusion::fuse_chunks(&fusion_inputs, question, &self.fusion_config);
        let fused_ids: HashSet<&str> = fused.iter().flat_map(|f| f.source_chunks.iter()).map(String::as_str).collect();
        let unfused: Vec<RetrievedItem> = items.into_iter().filter(|i| !fused_ids.contains(i.id.as_str())).collect();

        let metadata = QueryMetadata {
            mode: "enhanced_query".to_string(),
            strategies_used,
            reformulated,
            ..Default::default()
        };

        self.generate_fused(fused, unfused, ENHANCED_SYSTEM_PROMPT, question, 0.2, 1024, metadata, assemble_enhanced_context)
            .await
    }

    async fn generate_from(
        &self,
        items: Vec<RetrievedItem>,
        fused: Vec<FusedAnswer>,
        system_prompt: &str,
        question: &str,
        temperature: f32,
        max_tokens: u32,
        mut metadata: QueryMetadata,
        assemble: fn(&[RetrievedItem]) -> String,
    ) -> QueryResponse {
        let context = assemble(&items);
        let user_message = format!("Context:\n{context}\n\nQuestion: {question}");

        match self.generator.generate(system_prompt, &user_message, temperature, max_tokens).await {
            Ok(answer) => QueryResponse { answer, retrieved: items, fused_answers: fused, metadata },
            Err(e) => {
                metadata.error = true;
                metadata.error_kind = Some("GenerationFailure".to_string());
                metadata.error_message = Some(e.to_string());
                QueryResponse { answer: String::new(), retrieved: items, fused_answers: fused, metadata }
            }
        }
    }

    async fn generate_fused(
        &self,
        fused: Vec<FusedAnswer>,
        unfused: Vec<RetrievedItem>,
        system_prompt: &str,
        question: &str,
        temperature: f32,
        max_tokens: u32,
        mut metadata: QueryMetadata,
        assemble: fn(&[FusedAnswer], &[RetrievedItem]) -> String,
    ) -> QueryResponse {
        let context = assemble(&fused, &unfused);
        let user_message = format!("Context:\n{context}\n\nQuestion: {question}");

        match self.generator.generate(system_prompt, &user_message, temperature, max_tokens).await {
            Ok(answer) => QueryResponse { answer, retrieved: unfused, fused_answers: fused, metadata },
            Err(e) => {
                metadata.error = true;
                metadata.error_kind = Some("GenerationFailure".to_string());
                metadata.error_message = Some(e.to_string());
                QueryResponse { answer: String::new(), retrieved: unfused, fused_answers: fused, metadata }
            }
        }
    }

    fn error_response(&self, mode: &str, kind: &str, message: String) -> QueryResponse {
        QueryResponse {
            answer: String::new(),
            retrieved: Vec::new(),
            fused_answers: Vec::new(),
            metadata: QueryMetadata {
                mode: mode.to_string(),
                error: true,
                error_kind: Some(kind.to_string()),
                error_message: Some(message),
                ..Default::default()
            },
        }
    }
}

const STRATEGY_AGREEMENT_BOOST_STEP: f64 = 0.05;
const STRATEGY_AGREEMENT_BOOST_CAP: f64 = 0.20;

/// Inserts `item` into `merged` keyed by its stable id (`chunk_id` for
/// chunks, `"{store_type}.{document_id}"` otherwise), additively
/// boosting items that reappear across strategies up to +0.20 (§4.9).
fn merge_strategy_hit(merged: &mut HashMap<String, RetrievedItem>, item: HybridResultItem, strategy_label: &str) {
    let key = if item.is_chunk {
        item.id.clone()
    } else {
        stable_id(&item.store_type, &item.document_id)
    };

    match merged.get_mut(&key) {
        Some(existing) => {
            if !existing.strategies.contains(&strategy_label.to_string()) {
                existing.strategies.push(strategy_label.to_string());
                let boost = (STRATEGY_AGREEMENT_BOOST_STEP * (existing.strategies.len() - 1) as f64)
                    .min(STRATEGY_AGREEMENT_BOOST_CAP);
                existing.score = existing.score.max(item.score) + boost;
            }
        }
        None => {
            let mut retrieved: RetrievedItem = item.into();
            retrieved.strategies.push(strategy_label.to_string());
            merged.insert(key, retrieved);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::models::{Chunk, ChunkType, Document};
    use crate::store::memory::InMemoryStore;
    use std::collections::BTreeMap;

    struct EchoGenerator;

    #[async_trait]
    impl AnswerGenerator for EchoGenerator {
        async fn generate(&self, _system_prompt: &str, user_message: &str, _temperature: f32, _max_tokens: u32) -> Result<String> {
            Ok(format!("answer grounded in {} chars of context", user_message.len()))
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl AnswerGenerator for FailingGenerator {
        async fn generate(&self, _s: &str, _u: &str, _t: f32, _m: u32) -> Result<String> {
            anyhow::bail!("generator unavailable")
        }
    }

    async fn seeded_store() -> Arc<dyn Store> {
        let store = InMemoryStore::new();
        let embedder = HashEmbedder::default();

        let doc = Document {
            store_type: "notes".to_string(),
            document_id: "deploy".to_string(),
            payload: BTreeMap::new(),
        };
        let chunks = vec![
            Chunk {
                chunk_id: "notes.deploy.section1".to_string(),
                store_type: "notes".to_string(),
                document_id: "deploy".to_string(),
                chunk_type: ChunkType::NoteSection,
                sequence: 1,
                content: "Run make deploy to ship the fleet.".to_string(),
                size_chars: 35,
                start_position: 0,
                end_position: 35,
                title: Some("Setup".to_string()),
            },
            Chunk {
                chunk_id: "notes.deploy.section2".to_string(),
                store_type: "notes".to_string(),
                document_id: "deploy".to_string(),
                chunk_type: ChunkType::NoteSection,
                sequence: 2,
                content: "Run make clean to tear the fleet down.".to_string(),
                size_chars: 38,
                start_position: 35,
                end_position: 73,
                title: Some("Teardown".to_string()),
            },
        ];
        let vectors = vec![
            embedder.embed_one(&chunks[0].content).await.unwrap(),
            embedder.embed_one(&chunks[1].content).await.unwrap(),
        ];
        store.store_document_chunks("notes", "deploy", &chunks, Some(&vectors)).await.unwrap();
        store.store_document(&doc, None).await.unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn baseline_query_returns_populated_answer() {
        let store = seeded_store().await;
        let embedder = Arc::new(HashEmbedder::default());
        let orch = RagOrchestrator::new(store, embedder, Arc::new(EchoGenerator));

        let response = orch.query("make deploy", &QueryOptions::default()).await;
        assert!(!response.metadata.error);
        assert!(!response.retrieved.is_empty());
        assert!(response.answer.contains("answer grounded"));
    }

    #[tokio::test]
    async fn generation_failure_returns_error_flag_with_retrieved_items() {
        let store = seeded_store().await;
        let embedder = Arc::new(HashEmbedder::default());
        let orch = RagOrchestrator::new(store, embedder, Arc::new(FailingGenerator));

        let response = orch.query("make deploy", &QueryOptions::default()).await;
        assert!(response.metadata.error);
        assert_eq!(response.metadata.error_kind.as_deref(), Some("GenerationFailure"));
        assert!(!response.retrieved.is_empty());
        assert!(response.answer.is_empty());
    }

    #[tokio::test]
    async fn hybrid_query_merges_dense_and_lexical() {
        let store = seeded_store().await;
        let embedder = Arc::new(HashEmbedder::default());
        let orch = RagOrchestrator::new(store, embedder, Arc::new(EchoGenerator));

        let items = orch.hybrid_query("make deploy", &HybridOptions::default()).await.unwrap();
        assert!(!items.is_empty());
        assert_eq!(items[0].id, "notes.deploy.section1");
    }

    #[tokio::test]
    async fn query_with_fusion_clusters_adjacent_sections() {
        let store = seeded_store().await;
        let embedder = Arc::new(HashEmbedder::default());
        let orch = RagOrchestrator::new(store, embedder, Arc::new(EchoGenerator));

        let response = orch.query_with_fusion("make deploy fleet", &HybridOptions::default()).await;
        assert!(!response.metadata.error);
        assert!(!response.answer.is_empty());
    }

    #[tokio::test]
    async fn enhanced_query_annotates_strategies_used() {
        let store = seeded_store().await;
        let embedder = Arc::new(HashEmbedder::default());
        let orch = RagOrchestrator::new(store, embedder, Arc::new(EchoGenerator));

        let response = orch.enhanced_query("how to make deploy", &HybridOptions::default()).await;
        assert!(!response.metadata.strategies_used.is_empty());
    }
}
