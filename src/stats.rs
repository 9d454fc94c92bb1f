//! Database statistics and pipeline health overview.
//!
//! A quick summary of what's loaded and embedded: item counts per
//! collection, embedding coverage, and the association total. Used by
//! `slink stats` to confirm loads and runs did what was expected.

use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let signals: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM signals")
        .fetch_one(&pool)
        .await?;
    let signals_embedded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM signal_embeddings")
        .fetch_one(&pool)
        .await?;
    let issues: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM issues")
        .fetch_one(&pool)
        .await?;
    let issues_embedded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM issue_embeddings")
        .fetch_one(&pool)
        .await?;
    let associations: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM associations")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path).map(|m| m.len()).unwrap_or(0);

    println!("Signal Link — Database Stats");
    println!("============================");
    println!();
    println!("  Database:     {}", config.db.path.display());
    println!("  Size:         {}", format_bytes(db_size));
    println!();
    println!("  Signals:      {} ({} embedded)", signals, signals_embedded);
    println!("  Issues:       {} ({} embedded)", issues, issues_embedded);
    println!("  Associations: {}", associations);

    pool.close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
