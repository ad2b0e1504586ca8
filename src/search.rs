//! `lens search`: hybrid lexical + semantic search over the archive.
//!
//! Ranking is done by the core [`HybridSearchEngine`]; this module resolves
//! result ids to emails, applies `--limit` (default `[search] final_limit`)
//! and prints either a human listing or JSON on stdout.
//!
//! [`HybridSearchEngine`]: inbox_lens_core::search::HybridSearchEngine

use anyhow::Result;
use serde::Serialize;

use inbox_lens_core::models::Email;
use inbox_lens_core::search::SearchResult;
use inbox_lens_core::store::{CategoryStore, EmailStore};

use crate::config::Config;
use crate::engine::Session;
use crate::progress::ProgressMode;

/// A search hit joined with its email, as printed by `--json`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub rank: usize,
    pub id: String,
    pub subject: String,
    pub from: String,
    pub date: Option<String>,
    pub cluster: Option<String>,
    pub dense_score: Option<f32>,
    pub sparse_score: Option<f64>,
}

fn to_hit(result: SearchResult, email: Option<Email>, cluster: Option<String>) -> SearchHit {
    let (subject, from, date) = match email {
        Some(e) => (e.subject, e.from_address, e.date),
        None => (String::new(), String::new(), None),
    };
    SearchHit {
        rank: result.rank,
        id: result.id,
        subject,
        from,
        date,
        cluster,
        dense_score: result.dense_score,
        sparse_score: result.sparse_score,
    }
}

fn score_label(hit: &SearchHit) -> String {
    let dense = hit
        .dense_score
        .map(|s| format!("{:.3}", s))
        .unwrap_or_else(|| "-".to_string());
    let sparse = hit
        .sparse_score
        .map(|s| format!("{:.2}", s))
        .unwrap_or_else(|| "-".to_string());
    format!("dense {} / lexical {}", dense, sparse)
}

pub async fn run_search(
    config: &Config,
    query: &str,
    limit: Option<usize>,
    json: bool,
    mode: ProgressMode,
) -> Result<()> {
    let final_limit = limit.unwrap_or(config.search.final_limit);
    let session = Session::open(config, mode, config.embedding.is_enabled()).await?;

    let hits = async {
        let mut results = session.engine.search(query).await?;
        results.truncate(final_limit);
        let categories = session.engine.store().load_categories().await?;
        let mut hits = Vec::with_capacity(results.len());
        for result in results {
            let email = session.engine.store().get_email(&result.id).await?;
            let cluster = categories
                .as_ref()
                .map(|c| c.cluster_of(&result.id).to_string());
            hits.push(to_hit(result, email, cluster));
        }
        anyhow::Ok(hits)
    }
    .await;
    session.finish().await;
    let hits = hits?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for hit in &hits {
        let subject = if hit.subject.is_empty() {
            "(no subject)"
        } else {
            hit.subject.as_str()
        };
        println!("{}. {}", hit.rank, subject);
        if !hit.from.is_empty() {
            println!("    from: {}", hit.from);
        }
        if let Some(date) = &hit.date {
            println!("    date: {}", date);
        }
        if let Some(cluster) = &hit.cluster {
            println!("    cluster: {}", cluster);
        }
        println!("    score: {}", score_label(hit));
        println!("    id: {}", hit.id);
        println!();
    }
    Ok(())
}
