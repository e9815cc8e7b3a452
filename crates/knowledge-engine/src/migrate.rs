//! Database schema migrations.
//!
//! Creates all required tables (documents, document_vectors, chunks,
//! chunk_vectors, chunk_relationships) and ensures idempotent execution.
//! Run automatically before every CLI command that touches the database.

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            store_type TEXT NOT NULL,
            document_id TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            preview TEXT NOT NULL,
            title TEXT,
            PRIMARY KEY (store_type, document_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_vectors (
            id TEXT PRIMARY KEY,
            store_type TEXT NOT NULL,
            document_id TEXT NOT NULL,
            embedding BLOB NOT NULL,
            FOREIGN KEY (store_type, document_id) REFERENCES documents(store_type, document_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            chunk_id TEXT PRIMARY KEY,
            store_type TEXT NOT NULL,
            document_id TEXT NOT NULL,
            chunk_type TEXT NOT NULL,
            sequence INTEGER NOT NULL,
            content TEXT NOT NULL,
            size_chars INTEGER NOT NULL,
            start_position INTEGER NOT NULL,
            end_position INTEGER NOT NULL,
            title TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_id TEXT PRIMARY KEY,
            embedding BLOB NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(chunk_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_relationships (
            source TEXT NOT NULL,
            target TEXT NOT NULL,
            relationship_type TEXT NOT NULL,
            strength REAL NOT NULL,
            strength_category TEXT,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            UNIQUE(source, target, relationship_type)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(store_type, document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunk_relationships_source ON chunk_relationships(source)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunk_relationships_target ON chunk_relationships(target)")
        .execute(pool)
        .await?;

    Ok(())
}
