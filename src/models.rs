//! Core data models for signals, issues, and associations.
//!
//! Signals (customer feedback) and issues (engineering tracker records) are
//! two independently keyed collections: signals carry integer ids, issues
//! carry string identifiers (e.g. `ENG-142`). The pipeline only cares about
//! `(id, text)` per item, captured by the [`CollectionItem`] trait and its
//! two instantiations [`SignalText`] and [`IssueText`].

use serde::Deserialize;
use sqlx::Sqlite;

/// A customer feedback record: the row shape of the `signals` table and
/// the record shape of the JSON export consumed by `load signals`.
#[derive(Debug, Clone, Deserialize, sqlx::FromRow)]
pub struct Signal {
    pub id: i64,
    pub summary: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub sentiment: Option<i64>,
    #[serde(default)]
    pub severity: Option<i64>,
    #[serde(default)]
    pub date: Option<String>,
}

/// An engineering tracker record: the row shape of the `issues` table and
/// the record shape of the JSON export consumed by `load issues`.
#[derive(Debug, Clone, Deserialize, sqlx::FromRow)]
pub struct Issue {
    pub identifier: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A scored edge between one signal and one issue.
///
/// Stored as a single directed row but symmetric in meaning: the edge is
/// navigable from either endpoint.
#[derive(Debug, Clone)]
pub struct Association {
    pub signal_id: i64,
    pub issue_id: String,
    pub score: f64,
    pub reason: Option<String>,
    pub method: Option<String>,
    pub created_at: i64,
}

/// Capability interface the pipeline needs from an item: a stable id and
/// the text to embed, plus enough schema knowledge to key the item's
/// embedding cache rows.
///
/// Instantiated once per collection instead of modelling signal/issue
/// polymorphism with a tagged enum, so the cache and engine stay generic
/// over the id type (integer vs. string).
pub trait CollectionItem {
    type Id: std::fmt::Display
        + Clone
        + PartialEq
        + Send
        + Sync
        + Unpin
        + 'static
        + sqlx::Type<Sqlite>
        + for<'q> sqlx::Encode<'q, Sqlite>
        + for<'r> sqlx::Decode<'r, Sqlite>;

    /// Table holding this collection's items.
    const ITEM_TABLE: &'static str;
    /// Primary key column of [`Self::ITEM_TABLE`].
    const ITEM_ID_COLUMN: &'static str;
    /// Table holding this collection's cached embeddings.
    const EMBEDDING_TABLE: &'static str;
    /// Id column of [`Self::EMBEDDING_TABLE`].
    const EMBEDDING_ID_COLUMN: &'static str;
    /// Collection name used in reports and error messages.
    const COLLECTION: &'static str;

    fn id(&self) -> &Self::Id;
    fn text(&self) -> &str;
}

/// A signal reduced to its embeddable form (`summary + "\n" + context`).
#[derive(Debug, Clone)]
pub struct SignalText {
    pub id: i64,
    pub text: String,
}

/// An issue reduced to its embeddable form (`title + "\n" + description`).
#[derive(Debug, Clone)]
pub struct IssueText {
    pub id: String,
    pub text: String,
}

impl CollectionItem for SignalText {
    type Id = i64;

    const ITEM_TABLE: &'static str = "signals";
    const ITEM_ID_COLUMN: &'static str = "id";
    const EMBEDDING_TABLE: &'static str = "signal_embeddings";
    const EMBEDDING_ID_COLUMN: &'static str = "signal_id";
    const COLLECTION: &'static str = "signal";

    fn id(&self) -> &i64 {
        &self.id
    }
    fn text(&self) -> &str {
        &self.text
    }
}

impl CollectionItem for IssueText {
    type Id = String;

    const ITEM_TABLE: &'static str = "issues";
    const ITEM_ID_COLUMN: &'static str = "identifier";
    const EMBEDDING_TABLE: &'static str = "issue_embeddings";
    const EMBEDDING_ID_COLUMN: &'static str = "issue_id";
    const COLLECTION: &'static str = "issue";

    fn id(&self) -> &String {
        &self.id
    }
    fn text(&self) -> &str {
        &self.text
    }
}
