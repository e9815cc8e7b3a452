//! Document source port (§6.3): the external document loader capability.
//!
//! Owned by the external document store; the core only reads through
//! this trait. A native implementation (e.g. a directory of YAML files)
//! lives in `knowledge-engine`, since this crate stays filesystem-free.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Document;

/// Iterator yielding `(store_type, document_id, payload)` plus
/// existence/load probes per `(store_type, document_id)` (§6.3).
///
/// `iter_documents` returns a materialized `Vec` rather than a streaming
/// iterator — every implementation in this workspace reads a bounded
/// local corpus, so there is no backpressure concern that would justify
/// an async stream here.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn iter_documents(&self) -> Result<Vec<Document>>;

    async fn exists(&self, store_type: &str, document_id: &str) -> Result<bool>;

    async fn load(&self, store_type: &str, document_id: &str) -> Result<Option<Document>>;
}
