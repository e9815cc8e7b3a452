//! SQLite-backed [`Store`] implementation.
//!
//! Maps every [`Store`] operation onto the schema created by
//! [`crate::migrate::run_migrations`]: `documents`/`document_vectors` for
//! whole-document rows, `chunks`/`chunk_vectors` for chunk rows, and
//! `chunk_relationships` for C3's relationship edges. Vector search is an
//! exact cosine scan over both vector tables — no ANN index, matching the
//! in-memory store's semantics exactly (§4.3).

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use knowledge_engine_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use knowledge_engine_core::models::{
    Chunk, ChunkType, CorpusCounts, Document, EngineStats, IndexedChunk, Relationship,
    RelationshipType, StrengthCategory,
};
use knowledge_engine_core::store::{SimilarityHit, Store};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[allow(dead_code)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn stable_id(store_type: &str, document_id: &str) -> String {
    format!("{store_type}.{document_id}")
}

fn document_preview(doc: &Document) -> String {
    doc.payload
        .values()
        .find_map(|v| v.as_text())
        .map(|s| s.chars().take(240).collect())
        .unwrap_or_default()
}

fn chunk_type_to_str(t: ChunkType) -> &'static str {
    match t {
        ChunkType::RepoCore => "repo_core",
        ChunkType::RepoTechnical => "repo_technical",
        ChunkType::RepoActivity => "repo_activity",
        ChunkType::OrgMain => "org_main",
        ChunkType::NoteSection => "note_section",
        ChunkType::Generic => "generic",
    }
}

fn chunk_type_from_str(s: &str) -> ChunkType {
    match s {
        "repo_core" => ChunkType::RepoCore,
        "repo_technical" => ChunkType::RepoTechnical,
        "repo_activity" => ChunkType::RepoActivity,
        "org_main" => ChunkType::OrgMain,
        "note_section" => ChunkType::NoteSection,
        _ => ChunkType::Generic,
    }
}

fn relationship_type_to_str(t: RelationshipType) -> &'static str {
    match t {
        RelationshipType::Sequential => "sequential",
        RelationshipType::Topical => "topical",
        RelationshipType::Hierarchical => "hierarchical",
        RelationshipType::CrossDocument => "cross_document",
    }
}

fn relationship_type_from_str(s: &str) -> RelationshipType {
    match s {
        "sequential" => RelationshipType::Sequential,
        "hierarchical" => RelationshipType::Hierarchical,
        "cross_document" => RelationshipType::CrossDocument,
        _ => RelationshipType::Topical,
    }
}

fn strength_category_to_str(c: StrengthCategory) -> &'static str {
    match c {
        StrengthCategory::Weak => "weak",
        StrengthCategory::Moderate => "moderate",
        StrengthCategory::Strong => "strong",
    }
}

fn strength_category_from_str(s: &str) -> StrengthCategory {
    match s {
        "weak" => StrengthCategory::Weak,
        "strong" => StrengthCategory::Strong,
        _ => StrengthCategory::Moderate,
    }
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Chunk {
    let sequence: i64 = row.get("sequence");
    let size_chars: i64 = row.get("size_chars");
    let start_position: i64 = row.get("start_position");
    let end_position: i64 = row.get("end_position");
    let chunk_type_str: String = row.get("chunk_type");
    Chunk {
        chunk_id: row.get("chunk_id"),
        store_type: row.get("store_type"),
        document_id: row.get("document_id"),
        chunk_type: chunk_type_from_str(&chunk_type_str),
        sequence: sequence as u32,
        content: row.get("content"),
        size_chars: size_chars as usize,
        start_position: start_position as usize,
        end_position: end_position as usize,
        title: row.get("title"),
    }
}

fn row_to_relationship(row: &sqlx::sqlite::SqliteRow) -> Relationship {
    let strength: f64 = row.get("strength");
    let strength_category: Option<String> = row.get("strength_category");
    let metadata_json: String = row.get("metadata_json");
    let relationship_type: String = row.get("relationship_type");
    Relationship {
        source: row.get("source"),
        target: row.get("target"),
        relationship_type: relationship_type_from_str(&relationship_type),
        strength: strength as f32,
        strength_category: strength_category.map(|s| strength_category_from_str(&s)),
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn store_document(&self, doc: &Document, vector: Option<&[f32]>) -> Result<()> {
        let payload_json = serde_json::to_string(&doc.payload)?;
        let preview = document_preview(doc);
        let title = doc.text_field("title").map(str::to_string);

        sqlx::query(
            r#"
            INSERT INTO documents (store_type, document_id, payload_json, preview, title)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(store_type, document_id) DO UPDATE SET
                payload_json = excluded.payload_json,
                preview = excluded.preview,
                title = excluded.title
            "#,
        )
        .bind(&doc.store_type)
        .bind(&doc.document_id)
        .bind(&payload_json)
        .bind(&preview)
        .bind(&title)
        .execute(&self.pool)
        .await?;

        if let Some(v) = vector {
            let id = stable_id(&doc.store_type, &doc.document_id);
            let blob = vec_to_blob(v);
            sqlx::query(
                r#"
                INSERT INTO document_vectors (id, store_type, document_id, embedding)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET embedding = excluded.embedding
                "#,
            )
            .bind(&id)
            .bind(&doc.store_type)
            .bind(&doc.document_id)
            .bind(&blob)
            .execute(&self.pool)
            .await?;
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
        let mut tx = self.pool.begin().await?;

        let existing_ids: Vec<String> = sqlx::query(
            "SELECT chunk_id FROM chunks WHERE store_type = ? AND document_id = ?",
        )
        .bind(store_type)
        .bind(document_id)
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(|r| r.get("chunk_id"))
        .collect();

        for id in &existing_ids {
            sqlx::query("DELETE FROM chunk_vectors WHERE chunk_id = ?").bind(id).execute(&mut *tx).await?;
            sqlx::query("DELETE FROM chunk_relationships WHERE source = ? OR target = ?")
                .bind(id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM chunks WHERE store_type = ? AND document_id = ?")
            .bind(store_type)
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        for (i, chunk) in chunks.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO chunks (chunk_id, store_type, document_id, chunk_type, sequence,
                                     content, size_chars, start_position, end_position, title)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.store_type)
            .bind(&chunk.document_id)
            .bind(chunk_type_to_str(chunk.chunk_type))
            .bind(chunk.sequence as i64)
            .bind(&chunk.content)
            .bind(chunk.size_chars as i64)
            .bind(chunk.start_position as i64)
            .bind(chunk.end_position as i64)
            .bind(&chunk.title)
            .execute(&mut *tx)
            .await?;

            if let Some(vecs) = vectors {
                if let Some(v) = vecs.get(i) {
                    let blob = vec_to_blob(v);
                    sqlx::query(
                        "INSERT INTO chunk_vectors (chunk_id, embedding) VALUES (?, ?) \
                         ON CONFLICT(chunk_id) DO UPDATE SET embedding = excluded.embedding",
                    )
                    .bind(&chunk.chunk_id)
                    .bind(&blob)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_document_chunks(&self, store_type: &str, document_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT * FROM chunks WHERE store_type = ? AND document_id = ? ORDER BY sequence ASC",
        )
        .bind(store_type)
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        let row = sqlx::query("SELECT * FROM chunks WHERE chunk_id = ?")
            .bind(chunk_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_chunk))
    }

    async fn get_embedding(&self, chunk_id: &str) -> Result<Option<Vec<f32>>> {
        let row = sqlx::query("SELECT embedding FROM chunk_vectors WHERE chunk_id = ?")
            .bind(chunk_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| {
            let blob: Vec<u8> = r.get("embedding");
            blob_to_vec(&blob)
        }))
    }

    async fn delete_document_chunks(&self, store_type: &str, document_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let existing_ids: Vec<String> = sqlx::query(
            "SELECT chunk_id FROM chunks WHERE store_type = ? AND document_id = ?",
        )
        .bind(store_type)
        .bind(document_id)
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(|r| r.get("chunk_id"))
        .collect();

        for id in &existing_ids {
            sqlx::query("DELETE FROM chunk_vectors WHERE chunk_id = ?").bind(id).execute(&mut *tx).await?;
            sqlx::query("DELETE FROM chunk_relationships WHERE source = ? OR target = ?")
                .bind(id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM chunks WHERE store_type = ? AND document_id = ?")
            .bind(store_type)
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn search_similar(
        &self,
        query_vec: &[f32],
        k: usize,
        store_filter: Option<&str>,
        include_chunks: bool,
    ) -> Result<Vec<SimilarityHit>> {
        let mut hits: Vec<SimilarityHit> = Vec::new();

        if include_chunks {
            let rows = sqlx::query(
                r#"
                SELECT cv.chunk_id, c.store_type, c.document_id, c.content, c.title, cv.embedding
                FROM chunk_vectors cv
                JOIN chunks c ON c.chunk_id = cv.chunk_id
                "#,
            )
            .fetch_all(&self.pool)
            .await?;
            for row in rows {
                let store_type: String = row.get("store_type");
                if let Some(filter) = store_filter {
                    if store_type != filter {
                        continue;
                    }
                }
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                let content: String = row.get("content");
                hits.push(SimilarityHit {
                    id: row.get("chunk_id"),
                    store_type,
                    document_id: row.get("document_id"),
                    is_chunk: true,
                    similarity_score: cosine_similarity(query_vec, &vector),
                    content_preview: content.chars().take(240).collect(),
                    title: row.get("title"),
                });
            }
        }

        let doc_rows = sqlx::query(
            r#"
            SELECT dv.id, dv.store_type, dv.document_id, d.preview, d.title, dv.embedding
            FROM document_vectors dv
            JOIN documents d ON d.store_type = dv.store_type AND d.document_id = dv.document_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        for row in doc_rows {
            let store_type: String = row.get("store_type");
            if let Some(filter) = store_filter {
                if store_type != filter {
                    continue;
                }
            }
            let blob: Vec<u8> = row.get("embedding");
            let vector = blob_to_vec(&blob);
            hits.push(SimilarityHit {
                id: row.get("id"),
                store_type,
                document_id: row.get("document_id"),
                is_chunk: false,
                similarity_score: cosine_similarity(query_vec, &vector),
                content_preview: row.get("preview"),
                title: row.get("title"),
            });
        }

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
        for edge in edges {
            let metadata_json = serde_json::to_string(&edge.metadata)?;
            let strength_category = edge.strength_category.map(strength_category_to_str);
            sqlx::query(
                r#"
                INSERT INTO chunk_relationships (source, target, relationship_type, strength, strength_category, metadata_json)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(source, target, relationship_type) DO UPDATE SET
                    strength = excluded.strength,
                    strength_category = excluded.strength_category,
                    metadata_json = excluded.metadata_json
                "#,
            )
            .bind(&edge.source)
            .bind(&edge.target)
            .bind(relationship_type_to_str(edge.relationship_type))
            .bind(edge.strength as f64)
            .bind(strength_category)
            .bind(&metadata_json)
            .execute(&self.pool)
            .await?;
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
        let rows = sqlx::query("SELECT * FROM chunk_relationships WHERE strength >= ?")
            .bind(min_strength as f64)
            .fetch_all(&self.pool)
            .await?;

        let mut matched: Vec<Relationship> = rows
            .iter()
            .map(row_to_relationship)
            .filter(|r| chunk_id.map(|id| r.source == id || r.target == id).unwrap_or(true))
            .filter(|r| types.map(|ts| ts.contains(&r.relationship_type)).unwrap_or(true))
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
        self.get_chunk_relationships(Some(chunk_id), types, min_strength, Some(k)).await
    }

    async fn get_stats(&self) -> Result<EngineStats> {
        let mut by_store_type: BTreeMap<String, CorpusCounts> = BTreeMap::new();
        let mut by_chunk_type: BTreeMap<String, u64> = BTreeMap::new();

        let doc_rows = sqlx::query("SELECT store_type FROM documents").fetch_all(&self.pool).await?;
        for row in &doc_rows {
            let store_type: String = row.get("store_type");
            by_store_type.entry(store_type).or_default().documents += 1;
        }

        let chunk_rows = sqlx::query("SELECT store_type, chunk_type FROM chunks").fetch_all(&self.pool).await?;
        for row in &chunk_rows {
            let store_type: String = row.get("store_type");
            let chunk_type: String = row.get("chunk_type");
            by_store_type.entry(store_type).or_default().chunks += 1;
            *by_chunk_type.entry(chunk_type).or_insert(0) += 1;
        }

        let doc_vec_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM document_vectors").fetch_one(&self.pool).await?;
        let chunk_vec_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors").fetch_one(&self.pool).await?;

        let dv_rows = sqlx::query("SELECT store_type FROM document_vectors").fetch_all(&self.pool).await?;
        for row in &dv_rows {
            let store_type: String = row.get("store_type");
            by_store_type.entry(store_type).or_default().embeddings += 1;
        }
        let cv_rows = sqlx::query(
            "SELECT c.store_type AS store_type FROM chunk_vectors cv JOIN chunks c ON c.chunk_id = cv.chunk_id",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in &cv_rows {
            let store_type: String = row.get("store_type");
            by_store_type.entry(store_type).or_default().embeddings += 1;
        }

        let totals = CorpusCounts {
            documents: doc_rows.len() as u64,
            chunks: chunk_rows.len() as u64,
            embeddings: (doc_vec_count + chunk_vec_count) as u64,
        };

        Ok(EngineStats { totals, by_store_type, by_chunk_type })
    }

    async fn get_indexed_chunks(&self) -> Result<Vec<IndexedChunk>> {
        let mut out = Vec::new();

        let chunk_rows = sqlx::query("SELECT chunk_id, store_type, document_id, content FROM chunks").fetch_all(&self.pool).await?;
        for row in &chunk_rows {
            out.push(IndexedChunk {
                chunk_id: row.get("chunk_id"),
                store_type: row.get("store_type"),
                document_id: row.get("document_id"),
                is_chunk: true,
                content: row.get("content"),
            });
        }

        let doc_rows = sqlx::query(
            r#"
            SELECT d.store_type, d.document_id, d.preview
            FROM documents d
            WHERE NOT EXISTS (
                SELECT 1 FROM chunks c WHERE c.store_type = d.store_type AND c.document_id = d.document_id
            )
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        for row in &doc_rows {
            let store_type: String = row.get("store_type");
            let document_id: String = row.get("document_id");
            out.push(IndexedChunk {
                chunk_id: stable_id(&store_type, &document_id),
                store_type,
                document_id,
                is_chunk: false,
                content: row.get("preview"),
            });
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knowledge_engine_core::models::PayloadValue;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn fresh_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn chunk(id: &str, store_type: &str, document_id: &str, sequence: u32, content: &str) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            store_type: store_type.to_string(),
            document_id: document_id.to_string(),
            chunk_type: ChunkType::Generic,
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
        let store = fresh_store().await;
        let chunks = vec![chunk("notes.x.s2", "notes", "x", 2, "second"), chunk("notes.x.s1", "notes", "x", 1, "first")];
        store.store_document_chunks("notes", "x", &chunks, None).await.unwrap();
        let fetched = store.get_document_chunks("notes", "x").await.unwrap();
        assert_eq!(fetched[0].sequence, 1);
        assert_eq!(fetched[1].sequence, 2);
    }

    #[tokio::test]
    async fn replace_chunks_is_atomic_and_drops_old_ones() {
        let store = fresh_store().await;
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
        let store = fresh_store().await;
        let chunks = vec![chunk("notes.x.a", "notes", "x", 1, "a"), chunk("notes.x.b", "notes", "x", 2, "b")];
        let vectors = vec![vec![1.0, 0.0], vec![1.0, 0.0]];
        store.store_document_chunks("notes", "x", &chunks, Some(&vectors)).await.unwrap();
        let hits = store.search_similar(&[1.0, 0.0], 10, None, true).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "notes.x.a");
        assert_eq!(hits[1].id, "notes.x.b");
    }

    #[tokio::test]
    async fn store_document_roundtrips_payload_and_vector() {
        let store = fresh_store().await;
        let mut payload = BTreeMap::new();
        payload.insert("title".to_string(), PayloadValue::Text("Deploy Guide".to_string()));
        let doc = Document { store_type: "notes".to_string(), document_id: "deploy".to_string(), payload };
        store.store_document(&doc, Some(&[1.0, 0.0])).await.unwrap();
        let hits = store.search_similar(&[1.0, 0.0], 10, None, false).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "deploy");
    }

    #[tokio::test]
    async fn relationships_are_upserted_idempotently() {
        let store = fresh_store().await;
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
        let store = fresh_store().await;
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

    #[tokio::test]
    async fn get_indexed_chunks_includes_unchunked_documents() {
        let store = fresh_store().await;
        let mut payload = BTreeMap::new();
        payload.insert("body".to_string(), PayloadValue::Text("standalone document text".to_string()));
        let doc = Document { store_type: "notes".to_string(), document_id: "solo".to_string(), payload };
        store.store_document(&doc, None).await.unwrap();
        let indexed = store.get_indexed_chunks().await.unwrap();
        assert_eq!(indexed.len(), 1);
        assert!(!indexed[0].is_chunk);
    }
}
