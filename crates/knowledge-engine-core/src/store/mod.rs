//! Storage abstraction (C3): the persistent store of `(chunk_id →
//! vector, metadata)`, exact-scan cosine search, chunk/document CRUD,
//! and the chunk relationship table.
//!
//! [`Store`] is the seam the app crate's SQLite-backed implementation
//! and [`memory::InMemoryStore`] both sit behind. Implementations must
//! be `Send + Sync` to work with async runtimes; callers never touch
//! storage directly (§9 "constructor-passed ports").

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, Document, IndexedChunk, Relationship, RelationshipType, EngineStats};

/// One hit from [`Store::search_similar`]: either a chunk-level or
/// document-level row, carrying enough to render a result without a
/// further round trip.
#[derive(Debug, Clone)]
pub struct SimilarityHit {
    pub id: String,
    pub store_type: String,
    pub document_id: String,
    pub is_chunk: bool,
    pub similarity_score: f32,
    pub content_preview: String,
    pub title: Option<String>,
}

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`store_document`](Store::store_document) | Upsert a whole-document row + its single embedding. |
/// | [`store_document_chunks`](Store::store_document_chunks) | Atomic replace of a parent's chunks, vectors, and sidecars. |
/// | [`get_document_chunks`](Store::get_document_chunks) | Ordered by `sequence`. |
/// | [`delete_document_chunks`](Store::delete_document_chunks) | Removes chunks, embeddings, and incident edges. |
/// | [`search_similar`](Store::search_similar) | Exact cosine scan. |
/// | [`store_chunk_relationships`](Store::store_chunk_relationships) | Idempotent upsert on `(source, target, type)`. |
/// | [`get_chunk_relationships`](Store::get_chunk_relationships) | Filtered fetch ordered by strength desc. |
/// | [`get_related_chunks`](Store::get_related_chunks) | One-hop expansion from a chunk. |
/// | [`get_stats`](Store::get_stats) | Counts, engine identity, breakdowns. |
/// | [`get_indexed_chunks`](Store::get_indexed_chunks) | Snapshot for rebuilding the BM25 corpus (C5). |
#[async_trait]
pub trait Store: Send + Sync {
    /// Upsert a whole document row plus its single embedding (used for
    /// non-chunked documents that are their own retrieval unit).
    async fn store_document(&self, doc: &Document, vector: Option<&[f32]>) -> Result<()>;

    /// Atomically replace all chunks (and their vectors) belonging to
    /// `(store_type, document_id)`. Deletes prior chunks, their
    /// embeddings, and incident relationship edges first; fails as a
    /// whole if any step fails (§5 ordering guarantees).
    async fn store_document_chunks(
        &self,
        store_type: &str,
        document_id: &str,
        chunks: &[Chunk],
        vectors: Option<&[Vec<f32>]>,
    ) -> Result<()>;

    async fn get_document_chunks(&self, store_type: &str, document_id: &str) -> Result<Vec<Chunk>>;

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>>;

    async fn get_embedding(&self, chunk_id: &str) -> Result<Option<Vec<f32>>>;

    async fn delete_document_chunks(&self, store_type: &str, document_id: &str) -> Result<()>;

    /// Exact cosine scan over stored vectors, filtered by `store_filter`
    /// (restricts to matching `store_type`) and `include_chunks`
    /// (`false` restricts to document-level rows). Ties break by
    /// ascending id.
    async fn search_similar(
        &self,
        query_vec: &[f32],
        k: usize,
        store_filter: Option<&str>,
        include_chunks: bool,
    ) -> Result<Vec<SimilarityHit>>;

    async fn store_chunk_relationships(&self, edges: &[Relationship]) -> Result<()>;

    async fn get_chunk_relationships(
        &self,
        chunk_id: Option<&str>,
        types: Option<&[RelationshipType]>,
        min_strength: f32,
        limit: Option<usize>,
    ) -> Result<Vec<Relationship>>;

    async fn get_related_chunks(
        &self,
        chunk_id: &str,
        k: usize,
        min_strength: f32,
        types: Option<&[RelationshipType]>,
    ) -> Result<Vec<Relationship>>;

    async fn get_stats(&self) -> Result<EngineStats>;

    /// Snapshot of every indexed row, used to (re)build the BM25 corpus.
    async fn get_indexed_chunks(&self) -> Result<Vec<IndexedChunk>>;
}
