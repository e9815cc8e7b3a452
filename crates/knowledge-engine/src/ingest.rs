//! Ingestion pipeline: external document loader → chunker (C1) → batch
//! embedding (C2) → atomic chunk storage (C3) → sidecar sync (C4).
//!
//! A connector → normalize → chunk → embed → store flow. Connectors
//! themselves (filesystem, git, S3, Lua) stay out of scope;
//! [`YamlDirectorySource`] is the one local `DocumentSource` this crate
//! ships, reading a directory tree of YAML documents.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use walkdir::WalkDir;

use knowledge_engine_core::embedding::{cosine_similarity, embed_batch, EmbeddingProvider};
use knowledge_engine_core::models::{
    Chunk, ChunkType, Document, PayloadValue, Relationship, RelationshipType, StrengthCategory,
};
use knowledge_engine_core::source::DocumentSource;
use knowledge_engine_core::store::Store;

use crate::sidecar::SidecarStore;

/// A `(store_type)` directory per §1's "local corpus of structured YAML
/// documents": `{root}/{store_type segments}/{document_id}.yaml`. A flat
/// store (e.g. `notes`) is one directory level; a namespaced store (e.g.
/// `github.repos`) is two.
pub struct YamlDirectorySource {
    root: PathBuf,
}

impl YamlDirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn locate(&self, store_type: &str, document_id: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in store_type.split('.') {
            path.push(segment);
        }
        path.push(format!("{document_id}.yaml"));
        path
    }

    fn parse_file(&self, path: &Path) -> Result<Document> {
        let relative = path
            .strip_prefix(&self.root)
            .with_context(|| format!("{} is outside the source root", path.display()))?;
        let mut segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        let file_name = segments.pop().context("document path has no file name")?;
        let document_id = file_name
            .strip_suffix(".yaml")
            .or_else(|| file_name.strip_suffix(".yml"))
            .unwrap_or(&file_name)
            .to_string();
        let store_type = segments.join(".");

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let value: serde_yaml::Value =
            serde_yaml::from_str(&content).with_context(|| format!("failed to parse YAML in {}", path.display()))?;
        let payload = yaml_value_to_payload(value);

        Ok(Document { store_type, document_id, payload })
    }
}

#[async_trait]
impl DocumentSource for YamlDirectorySource {
    async fn iter_documents(&self) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        for entry in WalkDir::new(&self.root).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            let is_yaml = path.extension().is_some_and(|ext| ext == "yaml" || ext == "yml");
            if entry.file_type().is_file() && is_yaml {
                documents.push(self.parse_file(path)?);
            }
        }
        documents.sort_by(|a, b| (&a.store_type, &a.document_id).cmp(&(&b.store_type, &b.document_id)));
        Ok(documents)
    }

    async fn exists(&self, store_type: &str, document_id: &str) -> Result<bool> {
        Ok(self.locate(store_type, document_id).exists())
    }

    async fn load(&self, store_type: &str, document_id: &str) -> Result<Option<Document>> {
        let path = self.locate(store_type, document_id);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(self.parse_file(&path)?))
    }
}

/// A mapping value becomes a `PayloadValue::Map`; a sequence of scalars
/// becomes `PayloadValue::List`; anything else becomes its string
/// representation via `PayloadValue::Text`. Matches the three payload
/// shapes the chunkers dispatch on (`models::PayloadValue`).
fn yaml_value_to_payload(value: serde_yaml::Value) -> BTreeMap<String, PayloadValue> {
    match value {
        serde_yaml::Value::Mapping(map) => map
            .into_iter()
            .filter_map(|(k, v)| k.as_str().map(|key| (key.to_string(), yaml_to_payload_value(v))))
            .collect(),
        _ => BTreeMap::new(),
    }
}

fn yaml_to_payload_value(value: serde_yaml::Value) -> PayloadValue {
    match value {
        serde_yaml::Value::Sequence(items) => {
            PayloadValue::List(items.into_iter().map(yaml_scalar_to_string).collect())
        }
        serde_yaml::Value::Mapping(map) => PayloadValue::Map(
            map.into_iter()
                .filter_map(|(k, v)| k.as_str().map(|key| (key.to_string(), yaml_to_payload_value(v))))
                .collect(),
        ),
        other => PayloadValue::Text(yaml_scalar_to_string(other)),
    }
}

fn yaml_scalar_to_string(value: serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Null => String::new(),
        other => serde_yaml::to_string(&other).unwrap_or_default().trim().to_string(),
    }
}

/// Tallies what one ingestion run actually did, surfaced by the CLI.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub sidecars_written: usize,
    pub sequential_edges: usize,
    pub hierarchical_edges: usize,
}

/// Adjacent chunks within a document, in sequence order, get a
/// `Sequential` edge — the cheap "structural cue" the chunker's own
/// ordering already gives us for free.
fn sequential_edges(chunks: &[Chunk]) -> Vec<Relationship> {
    const STRENGTH: f32 = 0.9;
    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.sequence);
    ordered
        .windows(2)
        .map(|pair| Relationship {
            source: pair[0].chunk_id.clone(),
            target: pair[1].chunk_id.clone(),
            relationship_type: RelationshipType::Sequential,
            strength: STRENGTH,
            strength_category: Some(StrengthCategory::from_strength(STRENGTH)),
            metadata: BTreeMap::new(),
        })
        .collect()
}

/// Repository documents carry an explicit structural hierarchy: the
/// `repo_core` chunk is the canonical parent of `repo_technical` and
/// `repo_activity`. No other store type's chunker captures a comparable
/// structural cue today, so this is the only source of `Hierarchical`
/// edges produced at ingest time.
fn hierarchical_edges(chunks: &[Chunk]) -> Vec<Relationship> {
    const STRENGTH: f32 = 1.0;
    let core = chunks.iter().find(|c| c.chunk_type == ChunkType::RepoCore);
    let Some(core) = core else { return Vec::new() };
    chunks
        .iter()
        .filter(|c| matches!(c.chunk_type, ChunkType::RepoTechnical | ChunkType::RepoActivity))
        .map(|child| Relationship {
            source: core.chunk_id.clone(),
            target: child.chunk_id.clone(),
            relationship_type: RelationshipType::Hierarchical,
            strength: STRENGTH,
            strength_category: Some(StrengthCategory::from_strength(STRENGTH)),
            metadata: BTreeMap::new(),
        })
        .collect()
}

/// Ingest every document `source` yields: chunk, embed, atomically
/// replace the parent's chunk set, persist structural relationship
/// edges, and sync sidecar files. Topical and cross-document edges are
/// deliberately not computed here — see [`recompute_relationships`].
pub async fn ingest_all(
    source: &dyn DocumentSource,
    store: &dyn Store,
    embedder: &dyn EmbeddingProvider,
    sidecars: &mut SidecarStore,
    batch_size: usize,
) -> Result<IngestReport> {
    let documents = source.iter_documents().await?;
    let mut report = IngestReport::default();

    for doc in &documents {
        let chunks = knowledge_engine_core::chunk::chunk_document(doc);
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = embed_batch(embedder, &texts, batch_size).await;

        store
            .store_document_chunks(&doc.store_type, &doc.document_id, &chunks, Some(&vectors))
            .await?;

        let mut edges = sequential_edges(&chunks);
        edges.extend(hierarchical_edges(&chunks));
        report.sequential_edges += edges.iter().filter(|e| e.relationship_type == RelationshipType::Sequential).count();
        report.hierarchical_edges += edges.iter().filter(|e| e.relationship_type == RelationshipType::Hierarchical).count();
        if !edges.is_empty() {
            store.store_chunk_relationships(&edges).await?;
        }

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            if sidecars.write_chunk(&chunk.store_type, &chunk.chunk_id, vector)? {
                report.sidecars_written += 1;
            }
        }

        report.documents += 1;
        report.chunks += chunks.len();
    }

    sidecars.save_manifest()?;
    Ok(report)
}

/// Explicit maintenance operation: recompute `Topical` and
/// `CrossDocument` edges from cosine similarity over every indexed
/// chunk's embedding. Not run implicitly by [`ingest_all`] or by any
/// query path — cosine-threshold edge discovery is O(n²) over the
/// corpus, so it is something an operator chooses to run, not something
/// every ingestion or query pays for.
pub async fn recompute_relationships(
    store: &dyn Store,
    topical_threshold: f32,
    cross_document_threshold: f32,
) -> Result<usize> {
    let indexed = store.get_indexed_chunks().await?;
    let mut with_vectors = Vec::with_capacity(indexed.len());
    for row in &indexed {
        if !row.is_chunk {
            continue;
        }
        if let Some(vector) = store.get_embedding(&row.chunk_id).await? {
            with_vectors.push((row.chunk_id.clone(), row.store_type.clone(), row.document_id.clone(), vector));
        }
    }

    let mut edges = Vec::new();
    for i in 0..with_vectors.len() {
        for j in (i + 1)..with_vectors.len() {
            let (id_a, store_a, doc_a, vec_a) = &with_vectors[i];
            let (id_b, store_b, doc_b, vec_b) = &with_vectors[j];
            let similarity = cosine_similarity(vec_a, vec_b);
            let same_document = store_a == store_b && doc_a == doc_b;

            let relationship_type = if same_document && similarity >= topical_threshold {
                Some(RelationshipType::Topical)
            } else if !same_document && similarity >= cross_document_threshold {
                Some(RelationshipType::CrossDocument)
            } else {
                None
            };

            if let Some(relationship_type) = relationship_type {
                let strength = similarity.clamp(0.0, 1.0);
                edges.push(Relationship {
                    source: id_a.clone(),
                    target: id_b.clone(),
                    relationship_type,
                    strength,
                    strength_category: Some(StrengthCategory::from_strength(strength)),
                    metadata: BTreeMap::new(),
                });
            }
        }
    }

    let count = edges.len();
    if !edges.is_empty() {
        store.store_chunk_relationships(&edges).await?;
    }
    Ok(count)
}
