//! Origin Guard - replays a browsing session through the privacy engine.

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use guard::{
    EngineConfig, JsonFileSettingsStore, MemorySettingsStore, Platform, PrivacyEngine, Replay, Scenario,
    SettingsStore, SimulatedBrowser,
};

/// Origin Guard - per-site privacy policy engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario file to replay
    scenario: PathBuf,

    /// Persist site settings in this JSON file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Response interception deadline in milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Maximum concurrent purge jobs
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Use the strict preset
    #[arg(long)]
    strict: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn config(&self) -> EngineConfig {
        let mut config = if self.strict {
            EngineConfig::strict()
        } else {
            EngineConfig::default()
        };

        if let Some(ms) = self.deadline_ms {
            config = config.with_response_deadline(Duration::from_millis(ms));
        }
        if let Some(max) = self.max_concurrent {
            config = config.with_max_concurrent_tasks(max);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Origin Guard v{}", guard::VERSION);

    let scenario = Scenario::load(&args.scenario)
        .await
        .with_context(|| format!("loading scenario {}", args.scenario.display()))?;

    let store: Arc<dyn SettingsStore> = match &args.settings {
        Some(path) => Arc::new(
            JsonFileSettingsStore::open(path)
                .await
                .with_context(|| format!("opening settings {}", path.display()))?,
        ),
        None => Arc::new(MemorySettingsStore::new()),
    };
    scenario.seed_settings(store.as_ref()).await?;

    let config = args.config();
    info!(
        "Response deadline {:?}, {} concurrent purges",
        config.response_deadline, config.max_concurrent_tasks
    );

    let host = SimulatedBrowser::new();
    let engine = PrivacyEngine::new(config, store, Platform::from_host(Arc::new(host.clone())));
    let (handle, task) = engine.spawn();

    let outcomes = Replay::new(&host, &handle).run(&scenario).await?;
    for outcome in &outcomes {
        println!("{}", serde_json::to_string(outcome)?);
    }

    drop(handle);
    task.await?;

    // Summary of what the host was asked to do
    let mut summary: BTreeMap<String, usize> = BTreeMap::new();
    for call in host.calls() {
        let value = serde_json::to_value(&call)?;
        let kind = value["call"].as_str().unwrap_or("unknown").to_string();
        *summary.entry(kind).or_default() += 1;
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);

    info!("Replay complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default() {
        let args = Args::parse_from(["origin-guard", "session.json"]);
        assert_eq!(args.scenario, PathBuf::from("session.json"));
        assert!(args.settings.is_none());
        assert_eq!(args.config().response_deadline, Duration::from_millis(50));
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::parse_from([
            "origin-guard",
            "--strict",
            "--max-concurrent",
            "0",
            "-v",
            "session.json",
        ]);
        let config = args.config();
        assert!(args.verbose);
        assert_eq!(config.response_deadline, Duration::from_millis(10));
        assert_eq!(config.max_concurrent_tasks, 1);

        let args = Args::parse_from(["origin-guard", "--deadline-ms", "5", "session.json"]);
        assert_eq!(args.config().response_deadline, Duration::from_millis(5));
    }
}
