//! Bidirectional association lookup for the CLI.
//!
//! `show signal <id>` lists the issues linked to a signal; `show issue
//! <identifier>` lists the signals linked to an issue. Both are views over
//! the same edge rows, ordered descending by score.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::models::{Issue, Signal};
use crate::store;

pub async fn run_show_signal(config: &Config, signal_id: i64, min_score: f64) -> Result<()> {
    let pool = db::connect(config).await?;

    let signal = sqlx::query_as::<_, Signal>(
        "SELECT id, summary, context, sentiment, severity, date FROM signals WHERE id = ?",
    )
    .bind(signal_id)
    .fetch_optional(&pool)
    .await?;

    let Some(signal) = signal else {
        pool.close().await;
        anyhow::bail!("No signal with id {}", signal_id);
    };

    println!("signal {}: {}", signal.id, signal.summary);

    let edges = store::list_for_signal(&pool, signal_id, min_score).await?;
    if edges.is_empty() {
        println!("  no associated issues");
        pool.close().await;
        return Ok(());
    }

    for edge in &edges {
        let title: Option<String> =
            sqlx::query_scalar("SELECT title FROM issues WHERE identifier = ?")
                .bind(&edge.issue_id)
                .fetch_optional(&pool)
                .await?;

        println!(
            "  [{:.3}] {} — {}",
            edge.score,
            edge.issue_id,
            title.as_deref().unwrap_or("(unknown issue)")
        );
    }

    pool.close().await;
    Ok(())
}

pub async fn run_show_issue(config: &Config, identifier: &str, min_score: f64) -> Result<()> {
    let pool = db::connect(config).await?;

    let issue = sqlx::query_as::<_, Issue>(
        "SELECT identifier, title, description, state, team, priority, created_at \
         FROM issues WHERE identifier = ?",
    )
    .bind(identifier)
    .fetch_optional(&pool)
    .await?;

    let Some(issue) = issue else {
        pool.close().await;
        anyhow::bail!("No issue with identifier {}", identifier);
    };

    println!("issue {}: {}", issue.identifier, issue.title);

    let edges = store::list_for_issue(&pool, identifier, min_score).await?;
    if edges.is_empty() {
        println!("  no associated signals");
        pool.close().await;
        return Ok(());
    }

    for edge in &edges {
        let summary: Option<String> = sqlx::query_scalar("SELECT summary FROM signals WHERE id = ?")
            .bind(edge.signal_id)
            .fetch_optional(&pool)
            .await?;

        println!(
            "  [{:.3}] signal {} — {}",
            edge.score,
            edge.signal_id,
            summary.as_deref().unwrap_or("(unknown signal)")
        );
    }

    pool.close().await;
    Ok(())
}
