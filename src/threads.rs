//! `lens threads`: list reconstructed conversations, newest first.

use anyhow::Result;
use inbox_lens_core::models::{parse_date_millis, Thread};

use crate::config::Config;
use crate::engine::Session;
use crate::progress::ProgressMode;

fn display_date(thread: &Thread) -> String {
    thread
        .representative()
        .and_then(|e| e.date.as_deref())
        .and_then(parse_date_millis)
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "----------".to_string())
}

pub async fn run_threads(config: &Config, limit: Option<usize>) -> Result<()> {
    let session = Session::open(config, ProgressMode::Off, false).await?;
    let result = session.engine.threads().await;
    session.finish().await;
    let threads = result?;

    if threads.is_empty() {
        println!("No threads.");
        return Ok(());
    }

    let shown = limit.unwrap_or(threads.len());
    for thread in threads.iter().take(shown) {
        let subject = thread
            .representative()
            .map(|e| e.subject.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("(no subject)");
        println!("{}  {:>3}  {}", display_date(thread), thread.len(), subject);
        println!("    id: {}", thread.representative_id());
    }
    if shown < threads.len() {
        println!("... {} more", threads.len() - shown);
    }
    Ok(())
}
