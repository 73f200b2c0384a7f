use anyhow::Context;
use clap::Parser;
use memwatch::monitor::{MonitorSnapshot, Samplers};
use memwatch::notifier::{DesktopNotifier, LogNotifier, Notifier};
use memwatch::settings::TomlSettingsStore;
use memwatch::{Monitor, SharedConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Groups shown in each log summary.
const SUMMARY_GROUPS: usize = 3;

#[derive(Parser)]
#[command(name = "memwatch")]
#[command(about = "Host memory monitor with process grouping and spike alerts", long_about = None)]
struct Cli {
    /// Settings file (defaults to the per-user config directory)
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Log alerts instead of sending desktop notifications
    #[arg(long)]
    no_notify: bool,

    /// Print every published snapshot as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let store = cli
        .settings
        .map(TomlSettingsStore::new)
        .unwrap_or_else(TomlSettingsStore::at_default_path);
    info!("Using settings at {:?}", store.path());
    let config = Arc::new(SharedConfig::load(Box::new(store)).context("Failed to load settings")?);

    let notifier: Arc<dyn Notifier> = if cli.no_notify {
        Arc::new(LogNotifier)
    } else {
        Arc::new(DesktopNotifier::new())
    };

    let monitor = Monitor::new(config, Samplers::platform(), notifier);
    let mut updates = monitor.subscribe();
    monitor.start().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = Arc::clone(&updates.borrow_and_update());
                report(&snapshot, cli.json)?;
            }
            _ = &mut shutdown => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    monitor.stop().await;
    Ok(())
}

fn report(snapshot: &MonitorSnapshot, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
        return Ok(());
    }

    let groups: Vec<String> = snapshot
        .top_groups(SUMMARY_GROUPS)
        .iter()
        .map(|g| {
            format!(
                "{} x{} {:.1}% ({:.0} MB)",
                g.base_name,
                g.process_count(),
                g.total_memory_percent(),
                g.total_memory_mb()
            )
        })
        .collect();
    info!(
        "System memory {:.1}% | {}",
        snapshot.system_percent,
        groups.join(", ")
    );
    for message in snapshot.alert_messages() {
        warn!("{}", message);
    }
    Ok(())
}
