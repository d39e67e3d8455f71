// kcast: strikeout projections from the command line.
//
// Startup sequence:
// 1. Parse arguments and initialize tracing (stderr, stdout is for results)
// 2. Load configuration, applying command-line overrides
// 3. Open the cache and drop entries older than any TTL
// 4. Load reference tables and build providers
// 5. Run the projection(s) and print them

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use kcast_app::cli::{Cli, Command};
use kcast_app::providers::build_providers;
use kcast_app::report::{self, format_report, format_result, load_slate, NO_PROJECTION};
use kcast_baseball::orchestrator::Projector;
use kcast_baseball::reference;
use kcast_core::cache::{expiry_cutoff, SqliteCache};
use kcast_core::config;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_filter())?;

    let mut config = config::load_config().context("failed to load configuration")?;
    cli.apply_overrides(&mut config);

    let cache_path = config.cache.resolved_path();
    if let Some(parent) = cache_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create cache directory {}", parent.display()))?;
    }
    let cache = SqliteCache::open(&cache_path.to_string_lossy()).context("failed to open cache")?;
    if let Some(cutoff) = expiry_cutoff(config.cache.max_ttl(), chrono::Utc::now()) {
        match cache.purge_older_than(cutoff) {
            Ok(0) => {}
            Ok(n) => info!("purged {n} expired cache entries"),
            Err(e) => warn!("cache purge failed: {e:#}"),
        }
    }
    info!(
        path = %cache_path.display(),
        entries = cache.entry_count()?,
        "cache opened"
    );

    let cwd = std::env::current_dir().context("failed to resolve working directory")?;
    let reference = Arc::new(
        reference::load_all(&config.data_paths, &cwd).context("failed to load reference data")?,
    );
    let providers = build_providers(&config, Arc::clone(&reference))?;
    let projector = Arc::new(Projector::new(providers, Arc::new(cache), reference, config));

    let json = cli.command.json();
    match &cli.command {
        Command::Predict { .. } => {
            let Some(game) = cli.command.game() else {
                return Ok(ExitCode::FAILURE);
            };
            match projector.project(&game).await {
                Ok(result) if json => println!("{}", serde_json::to_string_pretty(&result)?),
                Ok(result) => println!("{}", format_result(&result)),
                Err(e) => {
                    warn!(pitcher = %game.pitcher, "projection failed: {e}");
                    println!("{NO_PROJECTION}");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Command::Slate { file, .. } => {
            let games = load_slate(file)?;
            info!(games = games.len(), "projecting slate");
            let reports = projector.project_slate(games).await;
            if json {
                println!("{}", report::slate_json(&reports)?);
            } else {
                for report in &reports {
                    println!("{}", format_report(report));
                }
            }
            if !reports.is_empty() && reports.iter().all(|r| r.outcome.is_err()) {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn init_tracing(default_filter: &str) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
