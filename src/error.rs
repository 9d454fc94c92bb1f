//! Error taxonomy for the association pipeline.
//!
//! Commands and module functions propagate `anyhow::Result` like the rest
//! of the crate; the variants here exist so callers (and tests) can
//! downcast and react to the specific failure classes the pipeline
//! distinguishes:
//!
//! - [`PipelineError::EmbeddingInput`] — recoverable per item; the run
//!   skips the item and continues.
//! - [`PipelineError::ModelUnavailable`] — fatal for the run; no
//!   embeddings can be produced.
//! - [`PipelineError::MissingEmbedding`] — a cache/index inconsistency,
//!   surfaced with the offending item ids after the remaining items have
//!   been processed.
//! - [`PipelineError::StoreWrite`] — a rejected association upsert,
//!   surfaced with the (signal, issue) pair; unrelated upserts already
//!   committed stay committed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The item has no embeddable text content (empty or whitespace-only).
    #[error("{collection} {id} has no embeddable text")]
    EmbeddingInput {
        collection: &'static str,
        id: String,
    },

    /// The embedding backend could not be initialized.
    #[error("embedding backend unavailable: {reason}")]
    ModelUnavailable { reason: String },

    /// Items that should have cached embeddings do not.
    #[error("missing cached embedding for: {}", items.join(", "))]
    MissingEmbedding { items: Vec<String> },

    /// The persistence layer rejected an association upsert.
    #[error("failed to store association ({signal_id}, {issue_id})")]
    StoreWrite {
        signal_id: i64,
        issue_id: String,
        #[source]
        source: sqlx::Error,
    },
}
