//! Shared, WASM-safe logic for the knowledge engine: data models,
//! chunking, embedding port, storage abstraction, lexical and hybrid
//! ranking, query expansion, chunk fusion, and the RAG orchestrator.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies. It compiles to both native targets and
//! `wasm32-unknown-unknown`; the native app crate supplies the
//! filesystem-backed [`source::DocumentSource`] and SQLite-backed
//! [`store::Store`] implementations.

pub mod bm25;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod hybrid;
pub mod models;
pub mod orchestrator;
pub mod query_expand;
pub mod source;
pub mod store;
