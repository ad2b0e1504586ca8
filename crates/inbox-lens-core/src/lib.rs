//! # Inbox Lens Core
//!
//! Shared, runtime-agnostic logic for Inbox Lens: data models, thread
//! reconstruction, similarity helpers, density clustering, prompt clusters,
//! 3D projection, lexical indexing, hybrid search, the embedding-oracle trait,
//! and the storage traits.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Concrete stores,
//! embedding backends, and the CLI live in the `inbox-lens` app crate.
//!
//! ## Pipeline
//!
//! ```text
//! emails ─▶ thread ─▶ representatives ─▶ oracle ─▶ embeddings
//!                                                     │
//!                    ┌──────────────┬─────────────────┼──────────────┐
//!                    ▼              ▼                 ▼              ▼
//!                 cluster        prompt          projection       search
//! ```

pub mod cluster;
pub mod embedding;
pub mod error;
pub mod lexical;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod projection;
pub mod prompt;
pub mod search;
pub mod store;
pub mod thread;

pub use error::{Error, Result};
