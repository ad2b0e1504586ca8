//! # Inbox Lens
//!
//! A local-first semantic organizer for mail archives.
//!
//! The algorithms (threading, density clustering, prompt clusters, PCA
//! projection, hybrid search) live in the `inbox-lens-core` crate and know
//! nothing about storage or I/O. This crate supplies the concrete pieces:
//! SQLite persistence, embedding oracles, mail import, and the `lens` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │ .eml / mbox │──▶│    Engine    │──▶│  SQLite  │
//! │   import    │   │ leases+progr.│   │  (sqlx)  │
//! └─────────────┘   └──────┬───────┘   └──────────┘
//!                          │
//!               ┌──────────┴──────────┐
//!               ▼                     ▼
//!        ┌─────────────┐       ┌────────────┐
//!        │ inbox-lens- │       │  Embedding │
//!        │    core     │       │  oracles   │
//!        └─────────────┘       └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the core store traits |
//! | [`embedding`] | Embedding oracles (OpenAI, Ollama, local, hash) |
//! | [`engine`] | Operation leases, progress channel, persistence |
//! | [`import`] | `.eml` / `.mbox` parsing |
//! | [`progress`] | Progress rendering |
//! | [`logging`] | `tracing` subscriber setup |

pub mod cluster_cmd;
pub mod config;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod engine;
pub mod import;
pub mod logging;
pub mod migrate;
pub mod progress;
pub mod project_cmd;
pub mod prompt_cmd;
pub mod search;
pub mod sqlite_store;
pub mod threads;
