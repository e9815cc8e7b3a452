//! Document and chunk retrieval by id.
//!
//! Thin CLI wrapper over [`Store::get_document_chunks`]. Out of scope
//! per spec §6.6, but present so the `kengine` binary has a way to
//! inspect what ingestion produced without going through a query.

use anyhow::Result;

use knowledge_engine_core::error::EngineError;
use knowledge_engine_core::models::Chunk;
use knowledge_engine_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Fetches every chunk belonging to `(store_type, document_id)`, ordered
/// by sequence. Empty means the document either never existed or has no
/// chunks.
pub async fn get_document_chunks(config: &Config, store_type: &str, document_id: &str) -> Result<Vec<Chunk>> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let chunks = store.get_document_chunks(store_type, document_id).await?;
    pool.close().await;
    Ok(chunks)
}

/// CLI entry point for `kengine get <store_type> <document_id>`.
pub async fn run_get(config: &Config, store_type: &str, document_id: &str) -> Result<()> {
    let chunks = get_document_chunks(config, store_type, document_id).await?;
    if chunks.is_empty() {
        return Err(EngineError::NotFound(format!("{store_type}.{document_id}")).into());
    }

    println!("--- {}.{} ({} chunks) ---", store_type, document_id, chunks.len());
    for chunk in &chunks {
        println!();
        println!("[{}] {}", chunk.sequence, chunk.chunk_id);
        if let Some(ref title) = chunk.title {
            println!("title: {title}");
        }
        println!("{}", chunk.content);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_document_chunks_returns_empty_for_unknown_document() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            db: crate::config::DbConfig { path: dir.path().join("db.sqlite3") },
            chunking: Default::default(),
            retrieval: Default::default(),
            embedding: Default::default(),
            fusion: Default::default(),
            query_expansion: Default::default(),
        };
        let pool = db::connect(&config).await.unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        pool.close().await;

        let chunks = get_document_chunks(&config, "notes", "missing").await.unwrap();
        assert!(chunks.is_empty());
    }
}
