//! flotilla — run reconciliation passes over a cluster definition.
//!
//! Loads a TOML file describing hosts and container requests, seeds the
//! simulated backend with the fleet, and drives one `ensure_scale` pass,
//! printing the per-request outcomes and the audit event log.
//!
//! # Usage
//!
//! ```text
//! flotilla check --file cluster.toml
//! flotilla reconcile --file cluster.toml --format json
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use flotilla_engine::{Executor, InMemoryBackend, ReconcileReport, Reconciler, sync_fleet};
use flotilla_events::Ledger;
use flotilla_fleet::FleetRegistry;

mod config;

use config::ClusterConfig;

#[derive(Parser)]
#[command(name = "flotilla", about = "Flotilla — container fleet reconciliation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a cluster definition.
    Check {
        /// Path to the cluster definition.
        #[arg(short, long, default_value = "cluster.toml")]
        file: PathBuf,
    },
    /// Run one reconciliation pass against the simulated backend.
    Reconcile {
        /// Path to the cluster definition.
        #[arg(short, long, default_value = "cluster.toml")]
        file: PathBuf,
        /// Output format: text or json.
        #[arg(long, default_value = "text")]
        format: String,
        /// Per-host operation timeout in seconds.
        #[arg(long, default_value = "30")]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,flotilla=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Check { file } => check(&file),
        Commands::Reconcile {
            file,
            format,
            timeout_secs,
        } => reconcile(&file, &format, timeout_secs).await,
    }
}

fn check(file: &PathBuf) -> anyhow::Result<()> {
    let config = ClusterConfig::from_file(file)?;
    let hosts = config.hosts();
    let deployment = config.deployment()?;
    println!(
        "ok: {} host(s), {} request(s)",
        hosts.len(),
        deployment.requests().len()
    );
    Ok(())
}

async fn reconcile(file: &PathBuf, format: &str, timeout_secs: u64) -> anyhow::Result<()> {
    let config = ClusterConfig::from_file(file)?;
    let deployment = config.deployment()?;

    // Seed the simulated backend with the declared fleet.
    let backend = Arc::new(InMemoryBackend::new());
    for host in config.hosts() {
        backend.add_host(host);
    }

    let fleet = FleetRegistry::new();
    let ledger = Ledger::new();
    let summary = sync_fleet(backend.as_ref(), &fleet, &ledger).await?;
    info!(hosts = summary.hosts_added, "fleet discovered");

    let executor = Executor::new(backend, fleet.clone())
        .with_timeout(Duration::from_secs(timeout_secs));
    let reconciler = Reconciler::new(fleet, executor, ledger);

    let report = reconciler.ensure_scale(&deployment).await?;
    match format {
        "json" => print_json(&reconciler, &report)?,
        _ => print_text(&reconciler, &report),
    }
    Ok(())
}

fn print_text(reconciler: &Reconciler<InMemoryBackend>, report: &ReconcileReport) {
    for outcome in &report.requests {
        println!(
            "{}: desired {} | {} -> {} | +{} -{} | {} failure(s)",
            outcome.image,
            outcome.desired,
            outcome.before,
            outcome.after,
            outcome.deployed.len(),
            outcome.removed.len(),
            outcome.failures.len(),
        );
        for failure in &outcome.failures {
            println!("  ! {failure}");
        }
    }
    println!(
        "pass {}: {}",
        report.event,
        if report.converged() {
            "converged"
        } else if report.partial {
            "partial"
        } else {
            "done"
        }
    );

    let history = reconciler.ledger().history();
    let parents: std::collections::HashMap<&str, Option<&str>> = history
        .iter()
        .map(|event| (event.id().as_str(), event.parent().map(|id| id.as_str())))
        .collect();
    for event in &history {
        let mut depth = 0;
        let mut cursor = event.parent().map(|id| id.as_str());
        while let Some(parent) = cursor {
            depth += 1;
            cursor = parents.get(parent).copied().flatten();
        }
        println!(
            "{}[{:?}] {:?} {} - {}",
            "  ".repeat(depth),
            event.state(),
            event.kind(),
            event.id(),
            event.description()
        );
    }
}

fn print_json(
    reconciler: &Reconciler<InMemoryBackend>,
    report: &ReconcileReport,
) -> anyhow::Result<()> {
    let output = serde_json::json!({
        "report": report,
        "events": reconciler.ledger().history(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
