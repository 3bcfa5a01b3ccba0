use anyhow::{Context, Result};
use chrono::Utc;
use daybook::config::Config;
use daybook::provider::{HttpGenerator, RetryPolicy};
use daybook::publish::Publisher;
use daybook::topic::TopicPicker;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "daybook=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Loading configuration")?;
    let providers = config.providers();
    match providers.first() {
        Some(primary) => info!(provider = %primary.kind, model = %primary.model, fallbacks = providers.len() - 1, "Using provider"),
        None => warn!("No provider credentials configured; a placeholder post will be published"),
    }

    let generator = HttpGenerator::new(providers, RetryPolicy::default(), config.target_words);
    let topics = TopicPicker::default();
    let report = Publisher {
        config: &config,
        topics: &topics,
    }
    .run(&generator, Utc::now())
    .context("Publishing")?;

    for skipped in &report.skipped {
        warn!(%skipped, "Skipped");
    }
    info!(
        slug = %report.slug,
        title = %report.title,
        path = %report.path.display(),
        outcome = ?report.outcome,
        "Published"
    );
    Ok(())
}
