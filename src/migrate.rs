use anyhow::Result;
use sqlx::SqlitePool;

/// Create the full schema. Every statement is idempotent, so `init` can be
/// re-run safely.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS signals (
            id INTEGER PRIMARY KEY,
            summary TEXT NOT NULL,
            context TEXT NOT NULL DEFAULT '',
            sentiment INTEGER,
            severity INTEGER,
            date TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS issues (
            identifier TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            state TEXT,
            team TEXT,
            priority INTEGER,
            created_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One embedding row per item. The model column (plus the text hash)
    // decides cache validity: a row written under a different model or for
    // changed text is treated as a miss and replaced in place.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS signal_embeddings (
            signal_id INTEGER PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (signal_id) REFERENCES signals(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS issue_embeddings (
            issue_id TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (issue_id) REFERENCES issues(identifier)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS associations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            signal_id INTEGER NOT NULL,
            issue_id TEXT NOT NULL,
            score REAL NOT NULL,
            reason TEXT,
            method TEXT,
            created_at INTEGER NOT NULL,
            UNIQUE(signal_id, issue_id),
            FOREIGN KEY (signal_id) REFERENCES signals(id),
            FOREIGN KEY (issue_id) REFERENCES issues(identifier)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_associations_signal ON associations(signal_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_associations_issue ON associations(issue_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_associations_score ON associations(score DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
