//! `lens prompt …`: user-defined clusters keyed by a natural-language prompt.

use anyhow::Result;
use inbox_lens_core::prompt::PromptCluster;
use inbox_lens_core::store::EmailStore;

use crate::config::Config;
use crate::engine::Session;
use crate::progress::ProgressMode;

/// Manual membership override for one email.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum OverrideAction {
    /// Always a member, whatever its similarity.
    Include,
    /// Never a member.
    Exclude,
    /// Back to the threshold test.
    Clear,
}

impl OverrideAction {
    pub fn state(self) -> Option<bool> {
        match self {
            OverrideAction::Include => Some(true),
            OverrideAction::Exclude => Some(false),
            OverrideAction::Clear => None,
        }
    }
}

fn print_summary(slug: &str, cluster: &PromptCluster, fallback_top_n: usize) {
    println!(
        "{}  \"{}\"  threshold {:.2}  members {}",
        slug,
        cluster.label,
        cluster.threshold,
        cluster.members_with_fallback(fallback_top_n).len()
    );
}

pub async fn run_create(
    config: &Config,
    label: &str,
    prompt: &str,
    threshold: Option<f32>,
    mode: ProgressMode,
) -> Result<()> {
    let session = Session::open(config, mode, true).await?;
    let result = session
        .engine
        .create_prompt_cluster(label, prompt, threshold)
        .await;
    session.finish().await;
    let (slug, cluster) = result?;

    println!("prompt create");
    print_summary(&slug, &cluster, config.prompt.fallback_top_n);
    Ok(())
}

pub async fn run_list(config: &Config) -> Result<()> {
    let session = Session::open(config, ProgressMode::Off, false).await?;
    let result = session.engine.prompt_clusters().await;
    session.finish().await;
    let clusters = result?;

    if clusters.is_empty() {
        println!("No prompt clusters.");
        return Ok(());
    }
    let mut ordered: Vec<_> = clusters.iter().collect();
    ordered.sort_by_key(|(slug, c)| (c.order, slug.to_string()));
    for (slug, cluster) in ordered {
        print_summary(slug, cluster, config.prompt.fallback_top_n);
    }
    Ok(())
}

pub async fn run_show(config: &Config, slug: &str) -> Result<()> {
    let session = Session::open(config, ProgressMode::Off, false).await?;
    let cluster = session.engine.prompt_cluster(slug).await;
    let members = session.engine.prompt_members(slug).await;
    let mut rows = Vec::new();
    if let Ok(ids) = &members {
        for id in ids {
            let email = session.engine.store().get_email(id).await;
            rows.push((id.clone(), email));
        }
    }
    session.finish().await;
    let cluster = cluster?;
    let members = members?;

    print_summary(slug, &cluster, config.prompt.fallback_top_n);
    println!("  prompt: {}", cluster.prompt);
    let mut rows: Vec<_> = rows
        .into_iter()
        .map(|(id, email)| {
            let sim = cluster.similarity_of(&id);
            (id, email, sim)
        })
        .collect();
    rows.sort_by(|a, b| {
        b.2.unwrap_or(f32::MIN)
            .partial_cmp(&a.2.unwrap_or(f32::MIN))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    for (id, email, sim) in rows {
        let subject = email?
            .map(|e| e.subject)
            .unwrap_or_else(|| "(missing email)".to_string());
        let flag = match cluster.overrides.get(&id) {
            Some(true) => " [included]",
            _ => "",
        };
        match sim {
            Some(sim) => println!("  [{:.3}] {}{}", sim, subject, flag),
            None => println!("  [  -  ] {}{}", subject, flag),
        }
        println!("      id: {}", id);
    }
    if members.is_empty() {
        println!("  (no members)");
    }
    Ok(())
}

pub async fn run_threshold(config: &Config, slug: &str, threshold: f32) -> Result<()> {
    let session = Session::open(config, ProgressMode::Off, false).await?;
    let result = session.engine.set_prompt_threshold(slug, threshold).await;
    session.finish().await;
    let cluster = result?;
    print_summary(slug, &cluster, config.prompt.fallback_top_n);
    Ok(())
}

pub async fn run_override(
    config: &Config,
    slug: &str,
    email_id: &str,
    action: OverrideAction,
) -> Result<()> {
    let state = action.state();
    let session = Session::open(config, ProgressMode::Off, false).await?;
    let result = session
        .engine
        .set_prompt_override(slug, email_id, state)
        .await;
    session.finish().await;
    let cluster = result?;
    print_summary(slug, &cluster, config.prompt.fallback_top_n);
    Ok(())
}

pub async fn run_rescore(config: &Config, slug: &str, mode: ProgressMode) -> Result<()> {
    let session = Session::open(config, mode, true).await?;
    let result = session.engine.rescore_prompt_cluster(slug).await;
    session.finish().await;
    let cluster = result?;
    print_summary(slug, &cluster, config.prompt.fallback_top_n);
    Ok(())
}

pub async fn run_delete(config: &Config, slug: &str) -> Result<()> {
    let session = Session::open(config, ProgressMode::Off, false).await?;
    let result = session.engine.delete_prompt_cluster(slug).await;
    session.finish().await;
    result?;
    println!("Deleted prompt cluster '{}'.", slug);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::ValueEnum;

    #[test]
    fn override_actions() {
        let parse = |s: &str| OverrideAction::from_str(s, false).map(OverrideAction::state);
        assert_eq!(parse("include"), Ok(Some(true)));
        assert_eq!(parse("exclude"), Ok(Some(false)));
        assert_eq!(parse("clear"), Ok(None));
        assert!(parse("maybe").is_err());
    }
}
