//! SQLite connection pool for the archive database.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::time::Duration;
use tracing::debug;

use crate::config::Config;

/// Open (creating if needed) the database at `[db] path`.
///
/// WAL mode lets `lens search` read while another process imports; writers
/// wait up to five seconds for the lock instead of failing immediately.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let path = &config.db.path;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))?;

    debug!(path = %path.display(), "database connected");
    Ok(pool)
}
