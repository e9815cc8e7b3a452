//! In-memory [`Store`] implementation for tests and WASM targets.
//!
//! Uses `HashMap`/`Vec` behind `std::sync::RwLock`. Vector search is a
//! brute-force cosine scan over every stored vector — the same
//! exact-scan semantics the SQLite-backed store guarantees, just without
//! a database underneath it.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{
    Chunk, CorpusCounts, Document, EngineStats, IndexedChunk, Relationship, RelationshipType,
};

use super::{SimilarityHit, Store};

fn stable_id(store_type: &str, document_id: &str) -> String {
    format!("{store_type}.{document_id}")
}

fn preview(text: &str) -> String {
    text.chars().take(240).collect()
}

fn document_preview(doc: &Document) -> String {
    doc.payload
        .values()
        .find_map(|v| v.as_text())
        .map(preview)
        .unwrap_or_default()
}

struct StoredVector {
    id: String,
    store_type: String,
    document_id: String,
    is_chunk: bool,
    vector: Vec<f32>,
    preview: String,
    title: Option<String>,
}

/// In-memory store for tests and WASM environments.
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, Document>>,
    chunks: RwLock<HashMap<String, Chunk>>,
    vectors: RwLock<HashMap<String, StoredVector>>,
    relationships: RwLock<Vec<Relationship>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            chunks: RwLock::new(HashMap::new()),
            vectors: RwLock::new(HashMap::new()),
            relationships: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn store_document(&self, doc: &Document, vector: Option<&[f32]>) -> Result<()> {
        let id = stable_id(&doc.store_type, &doc.document_id);
        self.docs.write().unwrap().insert(id.clone(), doc.clone());
        if let Some(v) = vector {
            self.vectors.write().unwrap().insert(
                id.clone(),
                StoredVector {
                    id,
                    store_type: doc.store_type.clone(),
                    document_id: doc.document_id.clone(),
                    is_chunk: false,
                    vector: v.to_vec(),
                    preview: document_preview(doc),
                    title: doc.text_field("title").map(str::to_string),
                },
            );
        }
        Ok(())
    }

    async fn store_document_chunks(
        &self,
        store_type: &str,
        document_id: &str,
        chunks: &[Chunk],
        vectors: Option<&[Vec<f32>]>,
    ) -> Result<()> {
        self.delete_document_chunks(store_type, document_id).await?;

        let mut chunk_map = self.chunks.write().unwrap();
        let mut vector_map = self.vectors.write().unwrap();
        for (i, chunk) in chunks.iter().enumerate() {
            chunk_map.insert(chunk.chunk_id.clone(), chunk.clone());
            if let Some(vecs) = vectors {
                if let Some(v) = vecs.get(i) {
                    vector_map.insert(
                        chunk.chunk_id.clone(),
                        StoredVector {
                            id: chunk.chunk_id.clone(),
                            store_type: chunk.store_type.clone(),
                            document_id: chunk.document_id.clone(),
                            is_chunk: true,
                            vector: v.clone(),
                            preview: preview(&chunk.content),
                            title: chunk.title.clone(),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    async fn get_document_chunks(&self, store_type: &str, document_id: &str) -> Result<Vec<Chunk>> {
        let chunks = self.chunks.read().unwrap();
        let mut result: Vec<Chunk> = chunks
            .values()
            .filter(|c| c.store_type == store_type && c.document_id == document_id)
            .cloned()
            .collect();
        result.sort_by_key(|c| c.sequence);
        Ok(result)
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        Ok(self.chunks.read().unwrap().get(chunk_id).cloned())
    }

    async fn get_embedding(&self, chunk_id: &str) -> Result<Option<Vec<f32>>> {
        Ok(self.vectors.read().unwrap().get(chunk_id).map(|sv| sv.vector.clone()))
    }

    async fn delete_document_chunks(&self, store_type: &str, document_id: &str) -> Result<()> {
        let removed_ids: Vec<String> = {
            let mut chunk_map = self.chunks.write().unwrap();
            let ids: Vec<String> = chunk_map
                .values()
                .filter(|c| c.store_type == store_type && c.document_id == document_id)
                .map(|c| c.chunk_id.clone())
                .collect();
            for id in &ids {
                chunk_map.remove(id);
            }
            ids
        };
        {
            let mut vector_map = self.vectors.write().unwrap();
            for id in &removed_ids {
                vector_map.remove(id);
            }
        }
        {
            let mut rels = self.relationships.write().unwrap();
            rels.retain(|r| !removed_ids.contains(&r.source) && !removed_ids.contains(&r.target));
        }
        Ok(())
    }

    async fn search_similar(
        &self,
        query_vec: &[f32],
        k: usize,
        store_filter: Option<&str>,
        include_chunks: bool,
    ) -> Result<Vec<SimilarityHit>> {
        let vectors = self.vectors.read().unwrap();
        let mut hits: Vec<SimilarityHit> = vectors
            .values()
            .filter(|sv| store_filter.map(|f| f == sv.store_type).unwrap_or(true))
            .filter(|sv| include_chunks || !sv.is_chunk)
            .map(|sv| SimilarityHit {
                id: sv.id.clone(),
                store_type: sv.store_type.clone(),
                document_id: sv.document_id.clone(),
                is_chunk: sv.is_chunk,
                similarity_score: cosine_similarity(query_vec, &sv.vector),
                content_preview: sv.preview.clone(),
                title: sv.title.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn store_chunk_relationships(&self, edges: &[Relationship]) -> Result<()> {
        let mut rels = self.relationships.write().unwrap();
        for edge in edges {
            let key = edge.key();
            if let Some(existing) = rels.iter_mut().find(|r| r.key() == key) {
                *existing = edge.clone();
            } else {
                rels.push(edge.clone());
            }
        }
        Ok(())
    }

    async fn get_chunk_relationships(
        &self,
        chunk_id: Option<&str>,
        types: Option<&[RelationshipType]>,
        min_strength: f32,
        limit: Option<usize>,
    ) -> Result<Vec<Relationship>> {
        let rels = self.relationships.read().unwrap();
        let mut matched: Vec<Relationship> = rels
            .iter()
            .filter(|r| {
                chunk_id
                    .map(|id| r.source == id || r.target == id)
                    .unwrap_or(true)
            })
            .filter(|r| types.map(|ts| ts.contains(&r.relationship_type)).unwrap_or(true))
            .filter(|r| r.strength >= min_strength)
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.strength
                .partial_cmp(&a.strength)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.source.cmp(&b.source))
                .then_with(|| a.target.cmp(&b.target))
        });
        if let Some(limit) = limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn get_related_chunks(
        &self,
        chunk_id: &str,
        k: usize,
        min_strength: f32,
        types: Option<&[RelationshipType]>,
    ) -> Result<Vec<Relationship>> {
        self.get_chunk_relationships(Some(chunk_id), types, min_strength, Some(k))
            .await
    }

    async fn get_stats(&self) -> Result<EngineStats> {
        let docs = self.docs.read().unwrap();
        let chunks = self.chunks.read().unwrap();
        let vectors = self.vectors.read().unwrap();

        let mut by_store_type: HashMap<String, CorpusCounts> = HashMap::new();
        for doc in docs.values() {
            by_store_type.entry(doc.store_type.clone()).or_default().documents += 1;
        }
        let mut by_chunk_type: HashMap<String, u64> = HashMap::new();
        for chunk in chunks.values() {
            by_store_type.entry(chunk.store_type.clone()).or_default().chunks += 1;
            *by_chunk_type.entry(format!("{:?}", chunk.chunk_type)).or_insert(0) += 1;
        }
        for sv in vectors.values() {
            by_store_type.entry(sv.store_type.clone()).or_default().embeddings += 1;
        }

        let totals = CorpusCounts {
            documents: docs.len() as u64,
            chunks: chunks.len() as u64,
            embeddings: vectors.len() as u64,
        };

        Ok(EngineStats {
            totals,
            by_store_type: by_store_type.into_iter().collect(),
            by_chunk_type: by_chunk_type.into_iter().collect(),
        })
    }

    async fn get_indexed_chunks(&self) -> Result<Vec<IndexedChunk>> {
        let chunks = self.chunks.read().unwrap();
        let docs = self.docs.read().unwrap();
        let mut out: Vec<IndexedChunk> = chunks
            .values()
            .map(|c| IndexedChunk {
                chunk_id: c.chunk_id.clone(),
                store_type: c.store_type.clone(),
                document_id: c.document_id.clone(),
                is_chunk: true,
                content: c.content.clone(),
            })
            .collect();
        for doc in docs.values() {
            let id = stable_id(&doc.store_type, &doc.document_id);
            if chunks.values().any(|c| c.store_type == doc.store_type && c.document_id == doc.document_id) {
                continue;
            }
            out.push(IndexedChunk {
                chunk_id: id,
                store_type: doc.store_type.clone(),
                document_id: doc.document_id.clone(),
                is_chunk: false,
                content: document_preview(doc),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StrengthCategory;
    use std::collections::BTreeMap;

    fn chunk(id: &str, store_type: &str, document_id: &str, sequence: u32, content: &str) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            store_type: store_type.to_string(),
            document_id: document_id.to_string(),
            chunk_type: crate::models::ChunkType::Generic,
            sequence,
            content: content.to_string(),
            size_chars: content.len(),
            start_position: 0,
            end_position: content.len(),
            title: None,
        }
    }

    #[tokio::test]
    async fn store_and_fetch_chunks_ordered_by_sequence() {
        let store = InMemoryStore::new();
        let chunks = vec![
            chunk("notes.x.section2", "notes", "x", 2, "second"),
            chunk("notes.x.section1", "notes", "x", 1, "first"),
        ];
        store.store_document_chunks("notes", "x", &chunks, None).await.unwrap();
        let fetched = store.get_document_chunks("notes", "x").await.unwrap();
        assert_eq!(fetched[0].sequence, 1);
        assert_eq!(fetched[1].sequence, 2);
    }

    #[tokio::test]
    async fn replace_chunks_is_atomic_and_drops_old_ones() {
        let store = InMemoryStore::new();
        let first = vec![chunk("notes.x.main", "notes", "x", 1, "v1")];
        store.store_document_chunks("notes", "x", &first, None).await.unwrap();
        let second = vec![chunk("notes.x.main2", "notes", "x", 1, "v2")];
        store.store_document_chunks("notes", "x", &second, None).await.unwrap();
        let fetched = store.get_document_chunks("notes", "x").await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].chunk_id, "notes.x.main2");
    }

    #[tokio::test]
    async fn search_similar_orders_by_cosine_then_ascending_id() {
        let store = InMemoryStore::new();
        let chunks = vec![
            chunk("notes.x.a", "notes", "x", 1, "a"),
            chunk("notes.x.b", "notes", "x", 2, "b"),
        ];
        let vectors = vec![vec![1.0, 0.0], vec![1.0, 0.0]];
        store.store_document_chunks("notes", "x", &chunks, Some(&vectors)).await.unwrap();
        let hits = store.search_similar(&[1.0, 0.0], 10, None, true).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "notes.x.a");
        assert_eq!(hits[1].id, "notes.x.b");
    }

    #[tokio::test]
    async fn relationships_are_upserted_idempotently() {
        let store = InMemoryStore::new();
        let rel = Relationship {
            source: "a".to_string(),
            target: "b".to_string(),
            relationship_type: RelationshipType::Topical,
            strength: 0.5,
            strength_category: Some(StrengthCategory::Moderate),
            metadata: BTreeMap::new(),
        };
        store.store_chunk_relationships(&[rel.clone()]).await.unwrap();
        let mut updated = rel.clone();
        updated.strength = 0.9;
        store.store_chunk_relationships(&[updated]).await.unwrap();
        let all = store.get_chunk_relationships(None, None, 0.0, None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].strength, 0.9);
    }

    #[tokio::test]
    async fn deleting_document_chunks_also_removes_incident_edges() {
        let store = InMemoryStore::new();
        let chunks = vec![chunk("notes.x.main", "notes", "x", 1, "content")];
        store.store_document_chunks("notes", "x", &chunks, None).await.unwrap();
        let rel = Relationship {
            source: "notes.x.main".to_string(),
            target: "notes.y.main".to_string(),
            relationship_type: RelationshipType::CrossDocument,
            strength: 0.8,
            strength_category: None,
            metadata: BTreeMap::new(),
        };
        store.store_chunk_relationships(&[rel]).await.unwrap();
        store.delete_document_chunks("notes", "x").await.unwrap();
        let remaining = store.get_chunk_relationships(None, None, 0.0, None).await.unwrap();
        assert!(remaining.is_empty());
    }
}
