//! Association engine.
//!
//! Drives one full pipeline run: make sure both collections have cached
//! embeddings, rebuild the issue vector index from the cache, query the
//! index for each signal's nearest issues, and upsert a scored edge for
//! every pair at or above the similarity threshold.
//!
//! The per-signal top-k query is the load-bearing shape here: it bounds
//! the work at |signals| × k index lookups instead of materializing the
//! full |signals| × |issues| cross product. Runs are idempotent (upsert
//! per pair) and incremental (cached embeddings are reused), so an
//! aborted run is safely completed by the next one.

use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};

use crate::cache::EmbeddingCache;
use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::error::PipelineError;
use crate::index::VectorIndex;
use crate::models::{CollectionItem, IssueText, SignalText};
use crate::sources;
use crate::store;

/// Method tag written on every edge this engine produces.
pub const METHOD_EMBEDDING_COSINE: &str = "embedding-cosine";

/// Counts from one `generate` run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub signals: usize,
    pub issues: usize,
    pub embeddings_computed: u64,
    pub items_skipped: u64,
    pub associations_upserted: u64,
    /// Items that should have had a cached embedding after the ensure
    /// step but did not (cache/index inconsistency). The run still
    /// processes all other items; callers surface these as an error.
    pub missing: Vec<String>,
}

/// Run the association pipeline once.
///
/// Deterministic given a fixed embedding set and threshold: the same edge
/// set with the same scores is produced on every run. Ordering among
/// equal-score edges is unspecified.
pub async fn generate(
    pool: &SqlitePool,
    config: &Config,
    threshold: f64,
    top_k: usize,
) -> Result<RunReport> {
    if !config.embedding.is_enabled() {
        return Err(PipelineError::ModelUnavailable {
            reason: "embedding provider is disabled; set [embedding] provider in the config"
                .to_string(),
        }
        .into());
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let cache = EmbeddingCache::new(pool, &config.embedding, provider.as_ref());

    let signals = sources::signal_texts(pool).await?;
    let issues = sources::issue_texts(pool).await?;

    let signal_report = cache.ensure_embeddings(&signals).await?;
    let issue_report = cache.ensure_embeddings(&issues).await?;

    let signal_vecs: HashMap<i64, Vec<f32>> =
        cache.load_all::<SignalText>().await?.into_iter().collect();
    let issue_entries = cache.load_all::<IssueText>().await?;
    let issue_loaded: HashSet<String> = issue_entries.iter().map(|(id, _)| id.clone()).collect();

    // An item the ensure step could not leave cached would otherwise
    // become a silent association gap; collect and surface it instead.
    let mut missing = collect_missing(&signals, |id| signal_vecs.contains_key(id));
    missing.extend(collect_missing(&issues, |id| issue_loaded.contains(id)));

    // The issue index is derived state, rebuilt from the cache each run.
    let index = VectorIndex::build(issue_entries);
    let k = top_k.min(index.len());

    let mut upserted = 0u64;

    for signal in &signals {
        let Some(vector) = signal_vecs.get(&signal.id) else {
            // Skipped (no text) or missing (already recorded above).
            continue;
        };

        for (issue_id, similarity) in index.query(vector, k) {
            let score = similarity as f64;
            if score < threshold {
                continue;
            }

            let reason = format!("semantic similarity: {:.2}", score);
            store::upsert(
                pool,
                signal.id,
                &issue_id,
                score,
                Some(&reason),
                Some(METHOD_EMBEDDING_COSINE),
            )
            .await?;
            upserted += 1;
        }
    }

    Ok(RunReport {
        signals: signals.len(),
        issues: issues.len(),
        embeddings_computed: signal_report.computed + issue_report.computed,
        items_skipped: signal_report.skipped + issue_report.skipped,
        associations_upserted: upserted,
        missing,
    })
}

/// Items with embeddable text that nonetheless have no cached vector.
fn collect_missing<I, F>(items: &[I], has_vector: F) -> Vec<String>
where
    I: CollectionItem,
    F: Fn(&I::Id) -> bool,
{
    items
        .iter()
        .filter(|item| !item.text().trim().is_empty() && !has_vector(item.id()))
        .map(|item| format!("{} {}", I::COLLECTION, item.id()))
        .collect()
}

/// `associate` command: run the pipeline and print the run report.
pub async fn run_associate(
    config: &Config,
    threshold_override: Option<f64>,
    top_k_override: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    let threshold = threshold_override.unwrap_or(config.association.threshold);
    let top_k = top_k_override.unwrap_or(config.association.top_k);

    if !(-1.0..=1.0).contains(&threshold) {
        anyhow::bail!("threshold must be in [-1.0, 1.0] (cosine similarity range)");
    }
    if top_k == 0 {
        anyhow::bail!("top-k must be >= 1");
    }

    let pool = db::connect(config).await?;

    if dry_run {
        let signals = sources::signal_texts(&pool).await?;
        let issues = sources::issue_texts(&pool).await?;
        let existing = store::count(&pool).await?;
        println!("associate (dry-run)");
        println!("  signals: {}", signals.len());
        println!("  issues: {}", issues.len());
        println!("  existing associations: {}", existing);
        println!("  threshold: {}", threshold);
        println!("  top-k: {}", top_k);
        pool.close().await;
        return Ok(());
    }

    let report = generate(&pool, config, threshold, top_k).await?;
    pool.close().await;

    println!("associate");
    println!(
        "  signals: {} (skipped {})",
        report.signals, report.items_skipped
    );
    println!("  issues: {}", report.issues);
    println!("  embeddings computed: {}", report.embeddings_computed);
    println!("  associations upserted: {}", report.associations_upserted);
    println!("  threshold: {}", threshold);

    if !report.missing.is_empty() {
        for item in &report.missing {
            eprintln!("Error: missing cached embedding for {}", item);
        }
        return Err(PipelineError::MissingEmbedding {
            items: report.missing,
        }
        .into());
    }

    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::hash_text;
    use crate::config::{AssociationConfig, DbConfig, EmbeddingConfig};
    use crate::embedding::vec_to_blob;
    use crate::migrate;

    fn test_config(dims: usize) -> Config {
        Config {
            db: DbConfig {
                path: "unused.db".into(),
            },
            embedding: EmbeddingConfig {
                provider: "hash".to_string(),
                model: Some("hash-v1".to_string()),
                dims: Some(dims),
                ..Default::default()
            },
            association: AssociationConfig::default(),
        }
    }

    async fn fresh_pool() -> SqlitePool {
        let pool = db::memory_pool().await;
        migrate::run_migrations(&pool).await.unwrap();
        pool
    }

    async fn insert_signal(pool: &SqlitePool, id: i64, summary: &str, context: &str) {
        sqlx::query("INSERT INTO signals (id, summary, context) VALUES (?, ?, ?)")
            .bind(id)
            .bind(summary)
            .bind(context)
            .execute(pool)
            .await
            .unwrap();
    }

    async fn insert_issue(pool: &SqlitePool, identifier: &str, title: &str, description: &str) {
        sqlx::query("INSERT INTO issues (identifier, title, description) VALUES (?, ?, ?)")
            .bind(identifier)
            .bind(title)
            .bind(description)
            .execute(pool)
            .await
            .unwrap();
    }

    async fn seed_small_corpus(pool: &SqlitePool) {
        insert_signal(pool, 1, "checkout fails", "card declined at payment").await;
        insert_signal(pool, 2, "dashboard slow", "loading spinner for 30 seconds").await;
        insert_signal(pool, 3, "export broken", "csv download returns 500").await;
        insert_issue(pool, "ENG-1", "fix payment path", "checkout errors").await;
        insert_issue(pool, "ENG-2", "dashboard performance", "slow queries").await;
    }

    async fn edge_set(pool: &SqlitePool) -> Vec<(i64, String, f64)> {
        let rows = sqlx::query_as::<_, (i64, String, f64)>(
            "SELECT signal_id, issue_id, score FROM associations ORDER BY signal_id, issue_id",
        )
        .fetch_all(pool)
        .await
        .unwrap();
        rows
    }

    #[tokio::test]
    async fn test_idempotent_rerun() {
        let pool = fresh_pool().await;
        seed_small_corpus(&pool).await;
        let config = test_config(16);

        // threshold -1.0 keeps every pair, making the edge set predictable
        let first = generate(&pool, &config, -1.0, 50).await.unwrap();
        assert_eq!(first.embeddings_computed, 5);
        assert_eq!(first.associations_upserted, 6);
        assert!(first.missing.is_empty());
        let edges_after_first = edge_set(&pool).await;
        assert_eq!(edges_after_first.len(), 6);

        let second = generate(&pool, &config, -1.0, 50).await.unwrap();
        assert_eq!(second.embeddings_computed, 0);
        let edges_after_second = edge_set(&pool).await;
        assert_eq!(edges_after_first, edges_after_second);
    }

    #[tokio::test]
    async fn test_incremental_new_signal() {
        let pool = fresh_pool().await;
        seed_small_corpus(&pool).await;
        let config = test_config(16);

        generate(&pool, &config, -1.0, 50).await.unwrap();

        insert_signal(&pool, 4, "login loops", "redirected back to login page").await;
        let report = generate(&pool, &config, -1.0, 50).await.unwrap();

        // Exactly one new embedding: the new signal. Everything else is
        // reused from the cache.
        assert_eq!(report.embeddings_computed, 1);
        assert_eq!(edge_set(&pool).await.len(), 8);
    }

    #[tokio::test]
    async fn test_threshold_monotonicity() {
        let config = test_config(16);

        let pool_low = fresh_pool().await;
        seed_small_corpus(&pool_low).await;
        generate(&pool_low, &config, -1.0, 50).await.unwrap();
        let low: HashSet<(i64, String)> = edge_set(&pool_low)
            .await
            .into_iter()
            .map(|(s, i, _)| (s, i))
            .collect();

        let pool_high = fresh_pool().await;
        seed_small_corpus(&pool_high).await;
        generate(&pool_high, &config, 0.2, 50).await.unwrap();
        let high: HashSet<(i64, String)> = edge_set(&pool_high)
            .await
            .into_iter()
            .map(|(s, i, _)| (s, i))
            .collect();

        assert!(high.is_subset(&low));
    }

    #[tokio::test]
    async fn test_scores_within_cosine_range() {
        let pool = fresh_pool().await;
        seed_small_corpus(&pool).await;
        let config = test_config(16);

        generate(&pool, &config, -1.0, 50).await.unwrap();

        for (_, _, score) in edge_set(&pool).await {
            assert!(score.is_finite());
            assert!((-1.0..=1.0).contains(&score), "score out of range: {}", score);
        }
    }

    #[tokio::test]
    async fn test_empty_text_signal_skipped_run_completes() {
        let pool = fresh_pool().await;
        seed_small_corpus(&pool).await;
        insert_signal(&pool, 9, "", "").await;
        let config = test_config(16);

        let report = generate(&pool, &config, -1.0, 50).await.unwrap();
        assert_eq!(report.items_skipped, 1);
        assert!(report.missing.is_empty());

        // No embedding stored and no edges for the empty signal; everyone
        // else is processed normally.
        let edges = edge_set(&pool).await;
        assert_eq!(edges.len(), 6);
        assert!(edges.iter().all(|(s, _, _)| *s != 9));

        let embedded: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM signal_embeddings WHERE signal_id = 9")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(embedded, 0);
    }

    #[tokio::test]
    async fn test_seeded_two_by_two_scenario() {
        let pool = fresh_pool().await;
        insert_signal(&pool, 1, "alpha", "").await;
        insert_signal(&pool, 2, "beta", "").await;
        insert_issue(&pool, "I-1", "gamma", "").await;
        insert_issue(&pool, "I-2", "delta", "").await;

        // Seed the cache directly so scores are controlled: signals on the
        // axes, issues near them. All rows are fresh under hash-v1, so the
        // run computes zero embeddings and uses these vectors as-is.
        let seeds: [(&str, &str, &str, Vec<f32>); 4] = [
            ("signal_embeddings", "signal_id", "1", vec![1.0, 0.0]),
            ("signal_embeddings", "signal_id", "2", vec![0.0, 1.0]),
            ("issue_embeddings", "issue_id", "I-1", vec![0.9, 0.1]),
            ("issue_embeddings", "issue_id", "I-2", vec![0.1, 0.9]),
        ];
        let texts: HashMap<&str, String> = HashMap::from([
            ("1", "alpha\n".to_string()),
            ("2", "beta\n".to_string()),
            ("I-1", "gamma\n".to_string()),
            ("I-2", "delta\n".to_string()),
        ]);

        for (table, id_col, id, vector) in seeds {
            let sql = format!(
                "INSERT INTO {} ({}, model, dims, hash, embedding, created_at) VALUES (?, 'hash-v1', 2, ?, ?, 0)",
                table, id_col
            );
            let query = sqlx::query(&sql);
            let query = if table == "signal_embeddings" {
                query.bind(id.parse::<i64>().unwrap())
            } else {
                query.bind(id)
            };
            query
                .bind(hash_text(&texts[id]))
                .bind(vec_to_blob(&vector))
                .execute(&pool)
                .await
                .unwrap();
        }

        let config = test_config(2);
        let report = generate(&pool, &config, 0.5, 50).await.unwrap();
        assert_eq!(report.embeddings_computed, 0);

        let edges = edge_set(&pool).await;
        let pairs: Vec<(i64, &str)> = edges.iter().map(|(s, i, _)| (*s, i.as_str())).collect();
        assert_eq!(pairs, vec![(1, "I-1"), (2, "I-2")]);
        for (_, _, score) in &edges {
            assert!(*score >= 0.5);
        }
    }

    #[tokio::test]
    async fn test_rerun_updates_edges_in_place() {
        let pool = fresh_pool().await;
        seed_small_corpus(&pool).await;
        let config = test_config(16);

        generate(&pool, &config, -1.0, 50).await.unwrap();
        let before = store::count(&pool).await.unwrap();
        generate(&pool, &config, -1.0, 50).await.unwrap();
        let after = store::count(&pool).await.unwrap();

        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_generate_rejects_disabled_provider() {
        let pool = fresh_pool().await;
        seed_small_corpus(&pool).await;

        let mut config = test_config(16);
        config.embedding = EmbeddingConfig::default();

        let err = generate(&pool, &config, 0.5, 50).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::ModelUnavailable { .. })
        ));
        assert!(err.to_string().contains("disabled"));
    }

    #[tokio::test]
    async fn test_missing_cached_vector_surfaces_item_id() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = test_config(8);
        config.db.path = tmp.path().join("slink.sqlite");

        let pool = db::connect(&config).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        insert_signal(&pool, 1, "checkout fails", "card declined at payment").await;
        insert_signal(&pool, 2, "dashboard slow", "loading spinner for 30 seconds").await;
        insert_issue(&pool, "ENG-1", "fix payment path", "checkout errors").await;

        // Signal 1 starts with a fresh cached row under the active model.
        sqlx::query(
            "INSERT INTO signal_embeddings (signal_id, model, dims, hash, embedding, created_at) \
             VALUES (1, 'hash-v1', 8, ?, ?, 0)",
        )
        .bind(hash_text("checkout fails\ncard declined at payment"))
        .bind(vec_to_blob(&vec![0.5; 8]))
        .execute(&pool)
        .await
        .unwrap();

        // Simulate a concurrent writer deleting signal 1's row mid-run:
        // the ensure step sees it as cached, then any other signal's
        // embedding write knocks it out before the index load.
        sqlx::query(
            "CREATE TRIGGER drop_signal_one AFTER INSERT ON signal_embeddings \
             WHEN new.signal_id != 1 \
             BEGIN DELETE FROM signal_embeddings WHERE signal_id = 1; END",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;

        let err = run_associate(&config, Some(-1.0), None, false)
            .await
            .unwrap_err();
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::MissingEmbedding { items }) => {
                assert_eq!(items, &vec!["signal 1".to_string()]);
            }
            other => panic!("expected MissingEmbedding, got {:?}", other),
        }

        // Partial progress is preserved: the resolvable signal still got
        // its edges before the failure was surfaced.
        let pool = db::connect(&config).await.unwrap();
        let edges = edge_set(&pool).await;
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].0, 2);
        assert_eq!(edges[0].1, "ENG-1");
    }

    #[test]
    fn test_collect_missing_names_items() {
        let items = vec![
            SignalText {
                id: 1,
                text: "has text".to_string(),
            },
            SignalText {
                id: 2,
                text: "also has text".to_string(),
            },
            SignalText {
                id: 3,
                text: " ".to_string(),
            },
        ];

        // Only id 1 has a vector; id 3 is unembeddable and therefore not
        // "missing".
        let missing = collect_missing(&items, |id| *id == 1);
        assert_eq!(missing, vec!["signal 2".to_string()]);
    }
}
