//! Materialized item feeds.
//!
//! The pipeline does not talk to upstream systems; it consumes flat JSON
//! exports of the two collections (`load_signals` / `load_issues`) and
//! reads back `(id, text)` mappings for embedding (`signal_texts` /
//! `issue_texts`). Remote tracker pagination and authentication live
//! outside this crate.

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::models::{Issue, IssueText, Signal, SignalText};

/// Load a JSON array of signals and upsert by id. Returns the row count.
pub async fn load_signals(pool: &SqlitePool, path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read signals file: {}", path.display()))?;
    let records: Vec<Signal> =
        serde_json::from_str(&content).with_context(|| "Failed to parse signals JSON")?;

    for record in &records {
        sqlx::query(
            r#"
            INSERT INTO signals (id, summary, context, sentiment, severity, date)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                summary = excluded.summary,
                context = excluded.context,
                sentiment = excluded.sentiment,
                severity = excluded.severity,
                date = excluded.date
            "#,
        )
        .bind(record.id)
        .bind(&record.summary)
        .bind(&record.context)
        .bind(record.sentiment)
        .bind(record.severity)
        .bind(&record.date)
        .execute(pool)
        .await?;
    }

    Ok(records.len())
}

/// Load a JSON array of issues and upsert by identifier. Returns the row
/// count.
pub async fn load_issues(pool: &SqlitePool, path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read issues file: {}", path.display()))?;
    let records: Vec<Issue> =
        serde_json::from_str(&content).with_context(|| "Failed to parse issues JSON")?;

    for record in &records {
        sqlx::query(
            r#"
            INSERT INTO issues (identifier, title, description, state, team, priority, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(identifier) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                state = excluded.state,
                team = excluded.team,
                priority = excluded.priority,
                created_at = excluded.created_at
            "#,
        )
        .bind(&record.identifier)
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.state)
        .bind(&record.team)
        .bind(record.priority)
        .bind(&record.created_at)
        .execute(pool)
        .await?;
    }

    Ok(records.len())
}

/// All signals reduced to their embeddable text (`summary + "\n" + context`).
pub async fn signal_texts(pool: &SqlitePool) -> Result<Vec<SignalText>> {
    let rows = sqlx::query("SELECT id, summary || char(10) || context AS text FROM signals ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| SignalText {
            id: row.get("id"),
            text: row.get("text"),
        })
        .collect())
}

/// All issues reduced to their embeddable text (`title + "\n" + description`).
pub async fn issue_texts(pool: &SqlitePool) -> Result<Vec<IssueText>> {
    let rows = sqlx::query(
        "SELECT identifier, title || char(10) || coalesce(description, '') AS text \
         FROM issues ORDER BY identifier",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| IssueText {
            id: row.get("identifier"),
            text: row.get("text"),
        })
        .collect())
}

/// `load` command: import one collection from a JSON export.
pub async fn run_load(config: &Config, collection: &str, path: &Path) -> Result<()> {
    let pool = db::connect(config).await?;

    let count = match collection {
        "signals" => load_signals(&pool, path).await?,
        "issues" => load_issues(&pool, path).await?,
        other => anyhow::bail!("Unknown collection: '{}'. Use signals or issues.", other),
    };

    println!("load {}", collection);
    println!("  upserted: {}", count);
    println!("ok");

    pool.close().await;
    Ok(())
}
