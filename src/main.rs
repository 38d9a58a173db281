use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use durable_migrate::{
    load_registry, open_database, read_config, InstanceManager, MigrateConfig, RunOutcome,
    RunReport, StepStatus,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "durable-migrate.json";

/// Durable Migrate - apply ordered schema steps to per-instance SQLite databases
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, env = "DURABLE_MIGRATE_CONFIG", default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Directory holding `<name>.up.sql` / `<name>.down.sql` pairs
    #[arg(short, long, env = "DURABLE_MIGRATE_MIGRATIONS_DIR")]
    migrations_dir: Option<PathBuf>,

    /// Directory holding one database file per instance
    #[arg(short, long, env = "DURABLE_MIGRATE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Refuse to apply a pending step registered before an applied one
    #[arg(long, env = "DURABLE_MIGRATE_STRICT_ORDER")]
    strict_order: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply every pending step to an instance
    Up { instance: String },
    /// Revert the most recently applied step of an instance
    Down { instance: String },
    /// Show which steps are applied to an instance
    Status { instance: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr, results to stdout
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = read_config(&args.config)
        .await
        .with_context(|| format!("failed to read config {}", args.config.display()))?
        .unwrap_or_default();
    apply_overrides(&mut config, &args);
    require_data_dir(&config)?;

    let registry = load_registry(&config.migrations_dir)
        .await
        .with_context(|| {
            format!(
                "failed to load migrations from {}",
                config.migrations_dir.display()
            )
        })?;
    let registry = Arc::new(registry);

    info!(
        steps = registry.len(),
        dir = %config.migrations_dir.display(),
        "Loaded migration steps"
    );

    match args.command {
        Command::Up { instance } => {
            let manager = InstanceManager::new(config, Arc::clone(&registry));
            let database = manager
                .open(&instance)
                .await
                .with_context(|| format!("failed to migrate instance '{}'", instance))?;
            let report = database.lock().await.initialize().await?;
            print_report(&report, args.json)?;
        }
        Command::Down { instance } => {
            let mut database = open_database(&config, registry, &instance).await?;
            let reverted = database
                .revert_latest()
                .await
                .with_context(|| format!("failed to revert instance '{}'", instance))?;
            database.close().await?;

            if args.json {
                println!("{}", serde_json::json!({ "reverted": reverted }));
            } else {
                match reverted {
                    Some(step) => println!("Reverted {}", step),
                    None => println!("Nothing to revert"),
                }
            }
        }
        Command::Status { instance } => {
            let mut database = open_database(&config, registry, &instance).await?;
            let status = database.status().await?;
            database.close().await?;
            print_status(&status, args.json)?;
        }
    }

    Ok(())
}

fn apply_overrides(config: &mut MigrateConfig, args: &Args) {
    if let Some(dir) = &args.migrations_dir {
        config.migrations_dir = dir.clone();
    }
    if let Some(dir) = &args.data_dir {
        config.data_dir = Some(dir.clone());
    }
    if args.strict_order {
        config.strict_order = true;
    }
}

/// Without a data directory every instance would be an in-memory database
/// that is discarded when the process exits.
fn require_data_dir(config: &MigrateConfig) -> anyhow::Result<()> {
    if config.data_dir.is_none() {
        bail!(
            "no data directory configured; pass --data-dir, set DURABLE_MIGRATE_DATA_DIR \
             or add \"dataDir\" to the config file"
        );
    }
    Ok(())
}

fn print_report(report: &RunReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    match report.outcome {
        RunOutcome::NoOp => println!("Already up to date"),
        RunOutcome::Completed | RunOutcome::Failed => {
            for step in &report.applied {
                println!("Applied {}", step);
            }
        }
    }
    Ok(())
}

fn print_status(status: &[StepStatus], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(status)?);
        return Ok(());
    }

    for step in status {
        let state = match &step.applied_at {
            Some(applied_at) => format!("applied {}", applied_at),
            None => "pending".to_string(),
        };
        let drift = if step.checksum_mismatch { " (changed since applied)" } else { "" };
        println!("{:<40} {}{}", step.name, state, drift);
    }
    Ok(())
}
