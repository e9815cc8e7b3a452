//! Document chunker (C1) — re-exported from `knowledge-engine-core`.
//!
//! The app crate never reimplements chunking; ingestion and the CLI both
//! reach for `crate::chunk::chunk_document` rather than importing the
//! core crate directly.

pub use knowledge_engine_core::chunk::*;
