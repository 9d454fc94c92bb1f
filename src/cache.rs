//! Persistent embedding cache.
//!
//! One row per item per collection, keyed by the item id with the model
//! name and a SHA-256 text hash deciding validity: a row written under a
//! different model, or for text that has since changed, is a miss and gets
//! replaced in place. Re-running the pipeline therefore only computes
//! embeddings for new or changed items — this is what makes runs
//! incremental and safely resumable.
//!
//! The cache is an explicit handle built per run (pool + config +
//! provider), not process-wide state.

use anyhow::Result;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::config::{Config, EmbeddingConfig};
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::PipelineError;
use crate::models::CollectionItem;
use crate::sources;

/// Counts from a batch backfill over one collection.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnsureReport {
    /// Embeddings computed and stored this call.
    pub computed: u64,
    /// Items already cached under the active model with a fresh hash.
    pub cached: u64,
    /// Items skipped because they have no embeddable text.
    pub skipped: u64,
}

pub struct EmbeddingCache<'a> {
    pool: &'a SqlitePool,
    config: &'a EmbeddingConfig,
    provider: &'a dyn EmbeddingProvider,
}

impl<'a> EmbeddingCache<'a> {
    pub fn new(
        pool: &'a SqlitePool,
        config: &'a EmbeddingConfig,
        provider: &'a dyn EmbeddingProvider,
    ) -> Self {
        Self {
            pool,
            config,
            provider,
        }
    }

    /// Look up the cached vector for `item` under the active model, or
    /// embed and persist it. Repeated calls never mutate an already-cached
    /// vector.
    ///
    /// Fails with [`PipelineError::EmbeddingInput`] when the item has no
    /// embeddable text; callers decide whether to skip or abort.
    pub async fn get_or_create<I: CollectionItem>(&self, item: &I) -> Result<Vec<f32>> {
        if item.text().trim().is_empty() {
            return Err(PipelineError::EmbeddingInput {
                collection: I::COLLECTION,
                id: item.id().to_string(),
            }
            .into());
        }

        let hash = hash_text(item.text());
        if let Some(vec) = self.lookup::<I>(item.id(), &hash).await? {
            return Ok(vec);
        }

        let vectors =
            embedding::embed_texts(self.provider, self.config, &[item.text().to_string()]).await?;
        let vec = vectors
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))?;

        self.put::<I>(item.id(), &hash, &vec).await?;
        Ok(vec)
    }

    /// Backfill embeddings for every item in `items` that is missing a
    /// fresh row, embedding in provider-sized batches.
    ///
    /// Items without embeddable text are skipped and counted, not fatal.
    /// A failed embedding batch is fatal: no partial embeddings from an
    /// unreachable backend are trusted.
    pub async fn ensure_embeddings<I: CollectionItem>(&self, items: &[I]) -> Result<EnsureReport> {
        self.ensure_embeddings_limited(items, None).await
    }

    /// Like [`Self::ensure_embeddings`], but computes at most `limit` new
    /// embeddings. Already-cached and skipped items do not count against
    /// the limit.
    pub async fn ensure_embeddings_limited<I: CollectionItem>(
        &self,
        items: &[I],
        limit: Option<usize>,
    ) -> Result<EnsureReport> {
        let mut report = EnsureReport::default();
        let mut pending: Vec<(&I, String)> = Vec::new();

        // One query per collection, not one per item: fetch every cached
        // (id, hash) under the active model and diff in memory.
        let cached = self.cached_hashes::<I>().await?;

        for item in items {
            if item.text().trim().is_empty() {
                eprintln!(
                    "Warning: {} {} has no embeddable text, skipping",
                    I::COLLECTION,
                    item.id()
                );
                report.skipped += 1;
                continue;
            }

            let hash = hash_text(item.text());
            if cached.get(&item.id().to_string()) == Some(&hash) {
                report.cached += 1;
            } else {
                pending.push((item, hash));
            }
        }

        if let Some(limit) = limit {
            pending.truncate(limit);
        }

        for batch in pending.chunks(self.config.batch_size) {
            let texts: Vec<String> = batch.iter().map(|(i, _)| i.text().to_string()).collect();
            let vectors = embedding::embed_texts(self.provider, self.config, &texts).await?;

            for ((item, hash), vec) in batch.iter().zip(vectors.iter()) {
                self.put::<I>(item.id(), hash, vec).await?;
                report.computed += 1;
            }
        }

        Ok(report)
    }

    /// Load every cached vector for the collection under the active model,
    /// restricted to items that still exist.
    pub async fn load_all<I: CollectionItem>(&self) -> Result<Vec<(I::Id, Vec<f32>)>> {
        let sql = format!(
            "SELECT e.{id_col}, e.embedding \
             FROM {emb_table} e \
             JOIN {item_table} i ON i.{item_id} = e.{id_col} \
             WHERE e.model = ?",
            id_col = I::EMBEDDING_ID_COLUMN,
            emb_table = I::EMBEDDING_TABLE,
            item_table = I::ITEM_TABLE,
            item_id = I::ITEM_ID_COLUMN,
        );

        let rows = sqlx::query(&sql)
            .bind(self.provider.model_name())
            .fetch_all(self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let id: I::Id = row.try_get(0)?;
                let blob: Vec<u8> = row.try_get(1)?;
                Ok((id, embedding::blob_to_vec(&blob)))
            })
            .collect()
    }

    /// Text hashes of every row cached under the active model, keyed by
    /// item id (as displayed). Items absent from the map, or present with
    /// a different hash, are stale and need re-embedding.
    async fn cached_hashes<I: CollectionItem>(&self) -> Result<HashMap<String, String>> {
        let sql = format!(
            "SELECT {id_col}, hash FROM {table} WHERE model = ?",
            id_col = I::EMBEDDING_ID_COLUMN,
            table = I::EMBEDDING_TABLE,
        );

        let rows = sqlx::query(&sql)
            .bind(self.provider.model_name())
            .fetch_all(self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let id: I::Id = row.try_get(0)?;
                let hash: String = row.try_get(1)?;
                Ok((id.to_string(), hash))
            })
            .collect()
    }

    async fn lookup<I: CollectionItem>(&self, id: &I::Id, hash: &str) -> Result<Option<Vec<f32>>> {
        let sql = format!(
            "SELECT embedding FROM {table} WHERE {id_col} = ? AND model = ? AND hash = ?",
            table = I::EMBEDDING_TABLE,
            id_col = I::EMBEDDING_ID_COLUMN,
        );

        let blob: Option<Vec<u8>> = sqlx::query_scalar(&sql)
            .bind(id.clone())
            .bind(self.provider.model_name())
            .bind(hash)
            .fetch_optional(self.pool)
            .await?;

        Ok(blob.map(|b| embedding::blob_to_vec(&b)))
    }

    async fn put<I: CollectionItem>(&self, id: &I::Id, hash: &str, vec: &[f32]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let blob = embedding::vec_to_blob(vec);

        let sql = format!(
            "INSERT INTO {table} ({id_col}, model, dims, hash, embedding, created_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT({id_col}) DO UPDATE SET \
                 model = excluded.model, \
                 dims = excluded.dims, \
                 hash = excluded.hash, \
                 embedding = excluded.embedding, \
                 created_at = excluded.created_at",
            table = I::EMBEDDING_TABLE,
            id_col = I::EMBEDDING_ID_COLUMN,
        );

        sqlx::query(&sql)
            .bind(id.clone())
            .bind(self.provider.model_name())
            .bind(vec.len() as i64)
            .bind(hash)
            .bind(blob)
            .bind(now)
            .execute(self.pool)
            .await?;

        Ok(())
    }
}

pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Backfill missing or stale embeddings for both collections. `limit` caps
/// the number of new embeddings across both collections (signals first),
/// `batch_size` overrides the configured provider batch size.
pub async fn run_embed_pending(
    config: &Config,
    limit: Option<usize>,
    batch_size: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    require_enabled(&config.embedding)?;
    let embed_config = override_batch_size(&config.embedding, batch_size)?;
    let provider = embedding::create_provider(&embed_config)?;
    let pool = db::connect(config).await?;
    let cache = EmbeddingCache::new(&pool, &embed_config, provider.as_ref());

    let signals = sources::signal_texts(&pool).await?;
    let issues = sources::issue_texts(&pool).await?;

    if dry_run {
        let signal_vecs = cache.load_all::<crate::models::SignalText>().await?.len();
        let issue_vecs = cache.load_all::<crate::models::IssueText>().await?.len();
        println!("embed pending (dry-run)");
        println!("  signals: {} ({} embedded)", signals.len(), signal_vecs);
        println!("  issues: {} ({} embedded)", issues.len(), issue_vecs);
        pool.close().await;
        return Ok(());
    }

    let signal_report = cache.ensure_embeddings_limited(&signals, limit).await?;
    let remaining = limit.map(|l| l.saturating_sub(signal_report.computed as usize));
    let issue_report = cache.ensure_embeddings_limited(&issues, remaining).await?;

    println!("embed pending");
    println!(
        "  signals: {} computed, {} cached, {} skipped",
        signal_report.computed, signal_report.cached, signal_report.skipped
    );
    println!(
        "  issues: {} computed, {} cached, {} skipped",
        issue_report.computed, issue_report.cached, issue_report.skipped
    );

    pool.close().await;
    Ok(())
}

fn require_enabled(config: &EmbeddingConfig) -> Result<()> {
    if !config.is_enabled() {
        return Err(PipelineError::ModelUnavailable {
            reason: "embedding provider is disabled; set [embedding] provider in the config"
                .to_string(),
        }
        .into());
    }
    Ok(())
}

fn override_batch_size(
    config: &EmbeddingConfig,
    batch_size: Option<usize>,
) -> Result<EmbeddingConfig> {
    let mut config = config.clone();
    if let Some(size) = batch_size {
        if size == 0 {
            anyhow::bail!("batch-size must be >= 1");
        }
        config.batch_size = size;
    }
    Ok(config)
}

/// Explicit cache invalidation: delete all embedding rows and regenerate.
/// Used when switching embedding models.
pub async fn run_embed_rebuild(config: &Config, batch_size: Option<usize>) -> Result<()> {
    require_enabled(&config.embedding)?;
    let embed_config = override_batch_size(&config.embedding, batch_size)?;
    let provider = embedding::create_provider(&embed_config)?;
    let pool = db::connect(config).await?;

    sqlx::query("DELETE FROM signal_embeddings")
        .execute(&pool)
        .await?;
    sqlx::query("DELETE FROM issue_embeddings")
        .execute(&pool)
        .await?;

    println!("embed rebuild — cleared existing embeddings");

    let cache = EmbeddingCache::new(&pool, &embed_config, provider.as_ref());
    let signals = sources::signal_texts(&pool).await?;
    let issues = sources::issue_texts(&pool).await?;

    let signal_report = cache.ensure_embeddings(&signals).await?;
    let issue_report = cache.ensure_embeddings(&issues).await?;

    println!("embed rebuild");
    println!(
        "  signals: {} computed, {} skipped",
        signal_report.computed, signal_report.skipped
    );
    println!(
        "  issues: {} computed, {} skipped",
        issue_report.computed, issue_report.skipped
    );

    pool.close().await;
    Ok(())
}
