//! The seven abstract error kinds of the engine (spec §7).
//!
//! Callers that need to branch on failure mode (degrade to lexical-only
//! search, substitute a zero vector, roll back an ingestion batch) match
//! on [`EngineError`] directly rather than downcasting an `anyhow::Error`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("embedder failure: {0}")]
    EmbedderFailure(String),

    #[error("storage failure: {0}")]
    StorageFailure(String),

    #[error("checksum mismatch for {chunk_id}: expected {expected}, found {found}")]
    ChecksumMismatch {
        chunk_id: String,
        expected: String,
        found: String,
    },

    #[error("generation failure: {0}")]
    GenerationFailure(String),

    #[error("cancelled")]
    Cancelled,
}

impl EngineError {
    /// The exit-code tier an abstract error kind maps to (§6.6): `1` for
    /// caller error, `2` for core error. `Cancelled` is neither — the CLI
    /// layer decides how to surface it.
    pub fn exit_tier(&self) -> u8 {
        match self {
            EngineError::NotFound(_) | EngineError::InvalidInput(_) => 1,
            EngineError::Cancelled => 1,
            _ => 2,
        }
    }
}
