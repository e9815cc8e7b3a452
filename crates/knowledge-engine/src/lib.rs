//! # Knowledge Engine
//!
//! **A local-first retrieval-augmented knowledge engine.**
//!
//! Ingests a directory of YAML documents, chunks and embeds them, persists
//! embeddings both in SQLite and as content-addressed sidecar files, and
//! exposes keyword, semantic, hybrid, and fusion-synthesized retrieval via
//! the `kengine` CLI. The core retrieval algorithms (chunking, BM25, hybrid
//! ranking, query expansion, chunk fusion, RAG orchestration) live in
//! `knowledge_engine_core` and are WASM-safe; this crate supplies the native
//! collaborators — SQLite storage, the gzip sidecar codec, YAML ingestion,
//! and process wiring.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────┐
//! │ YAML docs    │──▶│  Ingestion  │──▶│  SQLite   │
//! │ (filesystem) │   │ Chunk+Embed │   │ + sidecars│
//! └──────────────┘   └─────────────┘   └────┬─────┘
//!                                           │
//!                      ┌────────────────────┘
//!                      ▼
//!                 ┌──────────┐
//!                 │   CLI    │
//!                 │ (kengine)│
//!                 └──────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. [`ingest`] walks a directory of YAML documents via a [`DocumentSource`]
//!    (`knowledge_engine_core::source`) and normalizes them into
//!    `knowledge_engine_core::models::Document`s.
//! 2. Documents are split into chunks by [`chunk`] (re-exported from the
//!    core crate's paragraph/heading-aware chunker).
//! 3. Chunks are embedded and persisted both in SQLite ([`sqlite_store`])
//!    and as content-addressed gzip sidecars ([`sidecar`]).
//! 4. [`search`] wires the SQLite store and an embedding/answer-generator
//!    pair into `knowledge_engine_core::orchestrator::RagOrchestrator` for
//!    keyword, semantic, hybrid, fusion, and enhanced retrieval.
//! 5. [`get`] fetches a single document's chunks directly, bypassing
//!    retrieval, for inspection after ingestion.
//!
//! ## Quick Start
//!
//! ```bash
//! kengine ingest ./docs
//! kengine query "what changed in the last release?" --mode hybrid
//! kengine stats
//! kengine sync-sidecars
//! ```
//!
//! ## Search Modes
//!
//! | Mode | Engine | Generates an answer |
//! |------|--------|----------------------|
//! | `keyword` | BM25 over chunk text | No |
//! | `semantic` | Cosine similarity over embeddings | No |
//! | `hybrid` | Weighted dense+lexical merge | No |
//! | `fusion` | Hybrid + chunk-fusion synthesis | Yes |
//! | `enhanced` | Query expansion + fusion synthesis | Yes |
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`chunk`] | Document chunker, re-exported from `knowledge_engine_core` |
//! | [`ingest`] | YAML directory source, ingestion pipeline, relationship maintenance |
//! | [`sidecar`] | Content-addressed gzip embedding sidecars and manifest |
//! | [`sqlite_store`] | `Store` trait implementation backed by SQLite |
//! | [`search`] | Query-mode wiring over `RagOrchestrator` |
//! | [`get`] | Document/chunk retrieval by id |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Database schema migrations (idempotent) |
//!
//! ## Configuration
//!
//! The knowledge engine is configured via a TOML file (default:
//! `config.toml`). See [`config`] for all available options and
//! [`config::load_config`] for validation rules.

pub mod chunk;
pub mod config;
pub mod db;
pub mod get;
pub mod ingest;
pub mod migrate;
pub mod search;
pub mod sidecar;
pub mod sqlite_store;
