use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tailguard::config::TailguardConfig;
use tailguard::incident::Incident;

#[derive(Parser)]
#[command(
    name = "tailguard",
    about = "Tailgating detection backend: incident ingestion, alerting and statistics",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML configuration file (falls back to $TAILGUARD_CONFIG,
    /// then /etc/tailguard/tailguard.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the incident storage path from the configuration
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (HTTP API)
    Serve {
        /// Bind address (overrides the configuration)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Inspect or prune the incident log
    Incidents {
        #[command(subcommand)]
        action: IncidentAction,
    },

    /// Record a manually reported tailgating incident
    Report {
        /// Number of people who passed on one access event
        #[arg(long)]
        persons: u32,

        /// Location metadata as a JSON object
        #[arg(long, default_value = "{}")]
        location: String,

        /// ISO-8601 timestamp (defaults to now)
        #[arg(long)]
        timestamp: Option<String>,
    },

    /// Show summary statistics
    Stats {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum IncidentAction {
    /// List all incidents, newest first
    List {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Show one incident
    Show {
        /// Incident ID
        id: u64,
    },

    /// Delete one incident
    Delete {
        /// Incident ID
        id: u64,
    },
}

fn print_table(incidents: &[Incident]) {
    if incidents.is_empty() {
        println!("No incidents recorded.");
        return;
    }
    println!(
        "{:<6} | {:<32} | {:<15} | {:<7} | Location",
        "ID", "Timestamp", "Type", "Persons"
    );
    println!("{:-<6}-|-{:-<32}-|-{:-<15}-|-{:-<7}-|-{:-<30}", "", "", "", "", "");
    for incident in incidents {
        let kind = serde_json::to_value(incident.kind)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        println!(
            "{:<6} | {:<32} | {:<15} | {:<7} | {}",
            incident.id,
            incident.timestamp,
            kind,
            incident.persons,
            serde_json::Value::Object(incident.location.clone())
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config loading logs before the configured subscriber exists.
    let mut config =
        tailguard::telemetry::bootstrap(|| TailguardConfig::resolve(cli.config.as_deref()))?;
    if let Some(data) = cli.data {
        config.storage.path = data;
    }

    // Initialize tracing
    tailguard::telemetry::init(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting TailGuard daemon");
            tailguard::serve(config).await?;
        }
        Commands::Incidents { action } => {
            let ingest = tailguard::build_ingestor(&config)?;
            match action {
                IncidentAction::List { json } => {
                    let incidents = ingest.list_incidents().await?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&incidents)?);
                    } else {
                        print_table(&incidents);
                    }
                }
                IncidentAction::Show { id } => {
                    let incident = ingest.get_incident(id).await?;
                    println!("{}", serde_json::to_string_pretty(&incident)?);
                }
                IncidentAction::Delete { id } => {
                    ingest.delete_incident(id).await?;
                    println!("Incident {} deleted.", id);
                }
            }
        }
        Commands::Report {
            persons,
            location,
            timestamp,
        } => {
            let location: serde_json::Map<String, serde_json::Value> =
                serde_json::from_str(&location).context("--location must be a JSON object")?;
            let ingest = tailguard::build_ingestor(&config)?;
            let incident = ingest.record_manual(persons, location, timestamp).await?;
            println!(
                "Incident {} recorded: {} persons at {}",
                incident.id, incident.persons, incident.timestamp
            );
        }
        Commands::Stats { json } => {
            let ingest = tailguard::build_ingestor(&config)?;
            let stats = ingest.get_stats().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("\n=== TailGuard Incident Statistics ===");
                println!("Total incidents:  {}", stats.total);
                println!("Active incidents: {}", stats.active);
                println!("Today:            {}", stats.today);
                if !stats.malformed.is_empty() {
                    println!("Unparseable timestamps (IDs): {:?}", stats.malformed);
                }
                println!("=====================================\n");
            }
        }
    }

    Ok(())
}
