//! # docshelf
//!
//! A multi-source document indexing and question-answering toolkit.
//!
//! docshelf keeps a vector-searchable chunk index incrementally
//! synchronized with heterogeneous document sources (local filesystem,
//! S3-compatible object storage, Microsoft Graph drives) and answers
//! questions against the index through an OpenAI-compatible API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌─────────────┐
//! │ SettingsStore │──▶│ Configuration │──▶│   Catalog    │
//! │ (SQLite JSON) │   │   Service     │   │ (read-only)  │
//! └──────────────┘   │  snapshot swap │   └──────┬──────┘
//!                    └───────────────┘          │
//!                                               ▼
//! ┌──────────────┐   ┌───────────────┐   ┌─────────────┐
//! │  Providers    │──▶│  SyncPlanner   │──▶│   Indexer    │
//! │ FS/S3/Drive   │   │ token diffing  │   │ chunk+embed  │
//! └──────────────┘   └───────────────┘   └─────────────┘
//! ```
//!
//! Configuration changes flow from the settings store into an immutable
//! snapshot built with per-provider error isolation: one misconfigured
//! or unreachable source never prevents the others from serving. The
//! sync planner diffs source-supplied change-detection tokens against
//! index metadata so unchanged documents are never re-embedded and
//! deleted documents are reconciled out.
//!
//! ## Quick Start
//!
//! ```bash
//! shelf init                        # create database, seed AI settings
//! shelf settings set --file sources.toml
//! shelf sync all                    # incremental sync of every source
//! shelf search "deployment runbook"
//! shelf ask "how do we roll back a deploy?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`settings`] | Provider/AI settings union and validation |
//! | [`settings_store`] | Persisted settings records |
//! | [`seed`] | First-run seeding from environment defaults |
//! | [`provider`] | Document source abstraction and factory |
//! | [`snapshot`] | Immutable provider snapshot |
//! | [`catalog`] | Snapshot ownership and read facade |
//! | [`sync_plan`] | Incremental sync planning |
//! | [`indexer`] | Plan execution (chunk, embed, upsert/delete) |
//! | [`chunk`] | Sliding-window text chunking |
//! | [`embedding`] | Embedding client and vector utilities |
//! | [`llm`] | Chat completion client |
//! | [`search`] | Semantic search |
//! | [`ask`] | Retrieval-augmented question answering |

pub mod ask;
pub mod catalog;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod indexer;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod provider;
pub mod provider_drive;
pub mod provider_local;
pub mod provider_s3;
pub mod search;
pub mod seed;
pub mod settings;
pub mod settings_store;
pub mod snapshot;
pub mod sync_plan;
