//! `lens embed pending` / `lens embed rebuild`.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::engine::Session;
use crate::progress::ProgressMode;

fn ensure_enabled(config: &Config) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }
    Ok(())
}

/// Embed emails that are missing a vector or whose vector is stale.
pub async fn run_embed_pending(
    config: &Config,
    limit: Option<usize>,
    batch_size_override: Option<usize>,
    dry_run: bool,
    mode: ProgressMode,
) -> Result<()> {
    ensure_enabled(config)?;
    let session = Session::open(config, mode, true).await?;
    let model = session.engine.oracle().model_name().to_string();
    let result = session
        .engine
        .embed_pending(limit, batch_size_override, dry_run)
        .await;
    session.finish().await;
    let report = result?;

    if dry_run {
        println!("embed pending (dry-run)");
        println!("  emails needing embeddings: {}", report.pending);
        return Ok(());
    }
    if report.pending == 0 {
        println!("embed pending");
        println!("  all emails up to date");
        return Ok(());
    }

    println!("embed pending");
    println!("  model: {}", model);
    println!("  total pending: {}", report.pending);
    println!("  embedded: {}", report.embedded);
    Ok(())
}

/// Recompute every embedding; the stored set is swapped only on success.
pub async fn run_embed_rebuild(
    config: &Config,
    batch_size_override: Option<usize>,
    mode: ProgressMode,
) -> Result<()> {
    ensure_enabled(config)?;
    let session = Session::open(config, mode, true).await?;
    let model = session.engine.oracle().model_name().to_string();
    let result = session.engine.embed_rebuild(batch_size_override).await;
    session.finish().await;
    let report = result?;

    println!("embed rebuild");
    println!("  model: {}", model);
    println!("  total emails: {}", report.pending);
    println!("  embedded: {}", report.embedded);
    Ok(())
}
