//! Durable association store.
//!
//! One row per (signal, issue) pair, enforced by a uniqueness constraint:
//! recomputation updates the existing edge in place instead of
//! duplicating it. Edges are stored directed (signal → issue) but are
//! navigable from either endpoint via [`list_for_signal`] and
//! [`list_for_issue`]. The pipeline never deletes edges; deletion is an
//! administrative concern outside this crate.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::error::PipelineError;
use crate::models::Association;

/// Insert the edge, or update score/reason/method/timestamp for an
/// existing (signal, issue) pair. Each upsert is a complete, independent
/// unit: a failure does not roll back unrelated upserts.
pub async fn upsert(
    pool: &SqlitePool,
    signal_id: i64,
    issue_id: &str,
    score: f64,
    reason: Option<&str>,
    method: Option<&str>,
) -> Result<()> {
    // NaN/infinity must never reach disk.
    if !score.is_finite() {
        anyhow::bail!(
            "refusing to store non-finite score for ({}, {})",
            signal_id,
            issue_id
        );
    }

    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO associations (signal_id, issue_id, score, reason, method, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(signal_id, issue_id) DO UPDATE SET
            score = excluded.score,
            reason = excluded.reason,
            method = excluded.method,
            created_at = excluded.created_at
        "#,
    )
    .bind(signal_id)
    .bind(issue_id)
    .bind(score)
    .bind(reason)
    .bind(method)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|e| PipelineError::StoreWrite {
        signal_id,
        issue_id: issue_id.to_string(),
        source: e,
    })?;

    Ok(())
}

/// Edges for one signal, descending by score.
pub async fn list_for_signal(
    pool: &SqlitePool,
    signal_id: i64,
    min_score: f64,
) -> Result<Vec<Association>> {
    let rows = sqlx::query(
        r#"
        SELECT signal_id, issue_id, score, reason, method, created_at
        FROM associations
        WHERE signal_id = ? AND score >= ?
        ORDER BY score DESC
        "#,
    )
    .bind(signal_id)
    .bind(min_score)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_association).collect())
}

/// Edges for one issue, descending by score.
pub async fn list_for_issue(
    pool: &SqlitePool,
    issue_id: &str,
    min_score: f64,
) -> Result<Vec<Association>> {
    let rows = sqlx::query(
        r#"
        SELECT signal_id, issue_id, score, reason, method, created_at
        FROM associations
        WHERE issue_id = ? AND score >= ?
        ORDER BY score DESC
        "#,
    )
    .bind(issue_id)
    .bind(min_score)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_association).collect())
}

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM associations")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn row_to_association(row: &sqlx::sqlite::SqliteRow) -> Association {
    Association {
        signal_id: row.get("signal_id"),
        issue_id: row.get("issue_id"),
        score: row.get("score"),
        reason: row.get("reason"),
        method: row.get("method"),
        created_at: row.get("created_at"),
    }
}
