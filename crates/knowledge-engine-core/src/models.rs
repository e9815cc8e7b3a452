//! Core data model: documents, chunks, embeddings, and chunk relationships.
//!
//! These types are intentionally storage-agnostic — they describe what a
//! [`Store`](crate::store::Store) implementation persists, not how.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An external document's opaque payload.
///
/// The source corpus is dynamically typed YAML; rather than carry a
/// generic JSON value everywhere, payload fields are restricted to the
/// three shapes the chunkers actually dispatch on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Text(String),
    List(Vec<String>),
    Map(BTreeMap<String, PayloadValue>),
}

impl PayloadValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PayloadValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            PayloadValue::List(l) => Some(l.as_slice()),
            _ => None,
        }
    }
}

/// A document as read from the external document source.
///
/// External identity is `(store_type, document_id)`; the core only reads
/// this — ownership and persistence of the source payload belong to the
/// document source port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub store_type: String,
    pub document_id: String,
    pub payload: BTreeMap<String, PayloadValue>,
}

impl Document {
    /// The `"{store_type}.{document_id}"` stable identifier used as a map
    /// key by document-level (non-chunk) search results.
    pub fn stable_id(&self) -> String {
        format!("{}.{}", self.store_type, self.document_id)
    }

    pub fn field(&self, key: &str) -> Option<&PayloadValue> {
        self.payload.get(key)
    }

    pub fn text_field(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(PayloadValue::as_text)
    }

    pub fn list_field(&self, key: &str) -> Option<&[String]> {
        self.field(key).and_then(PayloadValue::as_list)
    }
}

/// The closed set of chunk kinds a chunker strategy can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    RepoCore,
    RepoTechnical,
    RepoActivity,
    OrgMain,
    NoteSection,
    Generic,
}

impl ChunkType {
    /// The chunker-assigned id suffix for this chunk type.
    ///
    /// Note sections use `section{n}` (computed by the caller from
    /// `sequence`, since the slot depends on position); every other type
    /// has a single fixed slot name.
    pub fn slot(self, sequence: u32) -> String {
        match self {
            ChunkType::RepoCore => "core".to_string(),
            ChunkType::RepoTechnical => "technical".to_string(),
            ChunkType::RepoActivity => "activity".to_string(),
            ChunkType::OrgMain => "main".to_string(),
            ChunkType::NoteSection => format!("section{sequence}"),
            ChunkType::Generic => "main".to_string(),
        }
    }
}

/// The atomic retrieval unit.
///
/// `chunk_id` is derived, not generated: `"{store_type}.{document_id}.{slot}"`.
/// This is what makes chunking deterministic (§8 "Chunk determinism").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub store_type: String,
    pub document_id: String,
    pub chunk_type: ChunkType,
    /// 1-based ordinal within the parent document.
    pub sequence: u32,
    pub content: String,
    pub size_chars: usize,
    pub start_position: usize,
    pub end_position: usize,
    pub title: Option<String>,
}

impl Chunk {
    pub fn parent_stable_id(&self) -> String {
        format!("{}.{}", self.store_type, self.document_id)
    }
}

/// A fixed-dimension embedding vector paired 1:1 with a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub model: String,
    /// Lowercase hex SHA-256 of `vector`'s raw little-endian f32 bytes.
    pub checksum: String,
}

pub const EMBEDDING_DIMS: usize = 1536;

/// Directed-ish edge between two chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Sequential,
    Topical,
    Hierarchical,
    CrossDocument,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrengthCategory {
    Weak,
    Moderate,
    Strong,
}

impl StrengthCategory {
    pub fn from_strength(strength: f32) -> Self {
        if strength >= 0.75 {
            StrengthCategory::Strong
        } else if strength >= 0.4 {
            StrengthCategory::Moderate
        } else {
            StrengthCategory::Weak
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    pub relationship_type: RelationshipType,
    pub strength: f32,
    pub strength_category: Option<StrengthCategory>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Relationship {
    /// Uniqueness key: `(source, target, type)`.
    pub fn key(&self) -> (String, String, RelationshipType) {
        (self.source.clone(), self.target.clone(), self.relationship_type)
    }
}

/// Per-chunk corpus statistics bookkeeping, populated by the caller when
/// rebuilding the BM25 corpus (see [`crate::bm25`]).
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk_id: String,
    pub store_type: String,
    pub document_id: String,
    pub is_chunk: bool,
    pub content: String,
}

/// A single entry in the sidecar metadata manifest (§3, §4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file: String,
    pub checksum: String,
    pub file_size: u64,
    pub created_at: String,
}

/// The sidecar metadata manifest: one JSON document recording every
/// chunk's sidecar path, checksum, size, and creation timestamp.
///
/// Serializes with sorted keys via `BTreeMap`, satisfying the "key order
/// is sorted" invariant without extra sorting logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarManifest {
    pub model: String,
    pub dims: usize,
    pub compression: String,
    pub version: u32,
    pub entries: BTreeMap<String, ManifestEntry>,
}

impl SidecarManifest {
    pub fn new(model: impl Into<String>, dims: usize) -> Self {
        Self {
            model: model.into(),
            dims,
            compression: "gzip-deterministic".to_string(),
            version: 1,
            entries: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CorpusCounts {
    pub documents: u64,
    pub chunks: u64,
    pub embeddings: u64,
}

/// Engine identity + per-store/per-type breakdown returned by
/// [`Store::get_stats`](crate::store::Store::get_stats).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStats {
    pub totals: CorpusCounts,
    pub by_store_type: BTreeMap<String, CorpusCounts>,
    pub by_chunk_type: BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_id_formats_as_dotted_pair() {
        let doc = Document {
            store_type: "github.repos".to_string(),
            document_id: "acme-widgets".to_string(),
            payload: BTreeMap::new(),
        };
        assert_eq!(doc.stable_id(), "github.repos.acme-widgets");
    }

    #[test]
    fn note_section_slot_includes_sequence() {
        assert_eq!(ChunkType::NoteSection.slot(3), "section3");
        assert_eq!(ChunkType::RepoCore.slot(1), "core");
    }

    #[test]
    fn strength_category_thresholds() {
        assert_eq!(StrengthCategory::from_strength(0.9), StrengthCategory::Strong);
        assert_eq!(StrengthCategory::from_strength(0.5), StrengthCategory::Moderate);
        assert_eq!(StrengthCategory::from_strength(0.1), StrengthCategory::Weak);
    }
}
