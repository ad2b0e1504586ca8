//! `lens project fit` / `lens project update`.

use anyhow::Result;

use crate::config::Config;
use crate::engine::Session;
use crate::progress::ProgressMode;

pub async fn run_fit(config: &Config, mode: ProgressMode) -> Result<()> {
    let session = Session::open(config, mode, false).await?;
    let result = session.engine.project_fit().await;
    session.finish().await;
    let snapshot = result?;

    println!("project fit");
    println!("  points: {}", snapshot.points.len());
    if let Some(model) = &snapshot.model {
        let variance: Vec<String> = model
            .explained_variance
            .iter()
            .map(|v| format!("{:.4}", v))
            .collect();
        println!("  input dims: {}", model.dims);
        println!("  explained variance: {}", variance.join(", "));
    }
    Ok(())
}

pub async fn run_update(config: &Config, mode: ProgressMode) -> Result<()> {
    let session = Session::open(config, mode, false).await?;
    let result = session.engine.project_update().await;
    session.finish().await;
    let update = result?;

    println!("project update");
    println!("  projected: {}", update.projected);
    println!("  total points: {}", update.total_points);
    Ok(())
}
