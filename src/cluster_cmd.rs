//! `lens cluster run` / `lens cluster show`.

use std::collections::BTreeMap;

use anyhow::Result;
use inbox_lens_core::models::Categories;

use crate::config::Config;
use crate::engine::Session;
use crate::progress::ProgressMode;

/// `(cluster id, name, member count)` ordered by the cluster's display order.
pub fn cluster_counts(categories: &Categories) -> Vec<(String, String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for cluster in categories.assignments.values() {
        *counts.entry(cluster.as_str()).or_default() += 1;
    }
    let mut rows: Vec<(u32, String, String, usize)> = categories
        .meta
        .iter()
        .map(|(id, meta)| {
            (
                meta.order,
                id.clone(),
                meta.name.clone(),
                counts.get(id.as_str()).copied().unwrap_or(0),
            )
        })
        .collect();
    rows.sort();
    rows.into_iter()
        .map(|(_, id, name, count)| (id, name, count))
        .collect()
}

fn print_categories(categories: &Categories) {
    for (id, name, count) in cluster_counts(categories) {
        println!("  {:<12} {:>6}  {}", id, count, name);
    }
}

pub async fn run_cluster(config: &Config, mode: ProgressMode) -> Result<()> {
    let session = Session::open(config, mode, false).await?;
    let result = session.engine.recluster().await;
    session.finish().await;
    let categories = result?;

    println!("cluster run");
    println!("  assigned emails: {}", categories.assignments.len());
    print_categories(&categories);
    Ok(())
}

pub async fn run_show(config: &Config) -> Result<()> {
    let session = Session::open(config, ProgressMode::Off, false).await?;
    let result = session.engine.categories().await;
    session.finish().await;

    match result? {
        Some(categories) if !categories.is_empty() => {
            println!("clusters");
            print_categories(&categories);
        }
        _ => println!("No clusters yet. Run `lens cluster run`."),
    }
    Ok(())
}
