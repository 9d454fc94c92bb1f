//! # Signal Link
//!
//! Links two independently maintained collections — customer feedback
//! records ("signals") and engineering tracker records ("issues") — by
//! semantic similarity of their text, producing a scored, bidirectional
//! association graph in SQLite.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────┐   ┌───────────────┐
//! │ JSON exports │──▶│ Embedding Cache  │──▶│ Vector Index  │
//! │ signals/issues│  │ (per item+model) │   │ (per run)     │
//! └──────────────┘   └─────────────────┘   └───────┬───────┘
//!                                                  │ top-k per signal
//!                                                  ▼
//!                                         ┌─────────────────┐
//!                                         │ Association      │
//!                                         │ Store (upsert)   │
//!                                         └─────────────────┘
//! ```
//!
//! Runs are idempotent and incremental: embeddings are cached per item
//! under the active model, the issue index is rebuilt from that cache
//! each run, and every edge write is an upsert keyed on the
//! (signal, issue) pair.
//!
//! ## Quick Start
//!
//! ```bash
//! slink init                      # create database
//! slink load signals signals.json
//! slink load issues issues.json
//! slink associate                 # embed, index, and link
//! slink show signal 42
//! slink stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and the collection-item trait |
//! | [`error`] | Pipeline error taxonomy |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`cache`] | Persistent per-item embedding cache |
//! | [`index`] | In-memory exact top-k vector index |
//! | [`engine`] | Association generation |
//! | [`store`] | Durable association edges |
//! | [`sources`] | Flat-file item feeds |
//! | [`show`] | Bidirectional lookup printing |
//! | [`stats`] | Coverage and count summaries |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod cache;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;
pub mod migrate;
pub mod models;
pub mod show;
pub mod sources;
pub mod stats;
pub mod store;
