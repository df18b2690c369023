//! Blood bank command line
//!
//! Serves the HTTP interface and runs maintenance tasks against the blood bank
//! database: schema migration, migration status, ledger reconciliation and
//! demo data seeding.

mod seed;

use anyhow::{bail, Context};
use bloodbank::{connect, BloodBank, BloodBankConfig, PgExecutor};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "bloodbank")]
#[command(about = "Blood bank record service")]
#[command(version = "0.1.0")]
struct Cli {
    /// Database connection URL (overrides DATABASE_URL and the config file)
    #[arg(long)]
    database_url: Option<String>,

    /// Configuration file
    #[arg(long, default_value = bloodbank::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate the schema and serve the HTTP interface
    Serve {
        /// Listen address (default: server.listen_addr from the config)
        #[arg(long)]
        listen: Option<String>,
    },

    /// Bring the schema up to date, normalizing a legacy schema if present
    Migrate,

    /// Show applied migrations and whether legacy tables remain
    Status,

    /// Compare stored balances with donations and fulfilled requests
    Reconcile,

    /// Insert demo donors, recipients, donations and requests
    Seed {
        #[arg(long, default_value = "10")]
        donors: usize,

        #[arg(long, default_value = "5")]
        recipients: usize,
    },
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match run(&cli) {
        Ok(()) => {
            if !cli.quiet {
                println!("{}", "✅ Success".green());
            }
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{} {:#}", "❌ Error:".red().bold(), e);
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut config = BloodBankConfig::load_from(&cli.config).context("loading configuration")?;
    if let Some(url) = cli
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok())
    {
        config.database.url = url;
    }
    log::debug!("database: {}", bloodbank::redact(&config.database.url));

    match &cli.command {
        Commands::Serve { listen } => handle_serve(&config, listen.as_deref()),
        Commands::Migrate => handle_migrate(&config),
        Commands::Status => handle_status(&config),
        Commands::Reconcile => handle_reconcile(&config),
        Commands::Seed { donors, recipients } => {
            let bank = BloodBank::open(&config.database)?;
            let summary = seed::seed(&bank, *donors, *recipients)?;
            println!(
                "Seeded {} donors, {} donations, {} recipients, {} requests ({} fulfilled)",
                summary.donors,
                summary.donations,
                summary.recipients,
                summary.requests,
                summary.fulfilled
            );
            Ok(())
        }
    }
}

/// A handle on a connected session, schema untouched.
fn unmigrated(config: &BloodBankConfig) -> anyhow::Result<BloodBank> {
    let client = connect(&config.database.url).context("connecting to the database")?;
    Ok(BloodBank::from_executor(PgExecutor::new(client)))
}

fn handle_serve(config: &BloodBankConfig, listen: Option<&str>) -> anyhow::Result<()> {
    let bank = Arc::new(BloodBank::open(&config.database)?);
    let addr = listen.unwrap_or(&config.server.listen_addr);
    println!("🩸 Serving on http://{addr}");
    bloodbank::web::serve(bank, addr).with_context(|| format!("serving on {addr}"))
}

fn handle_migrate(config: &BloodBankConfig) -> anyhow::Result<()> {
    let bank = unmigrated(config)?;
    println!("Applying migrations...");
    let outcome = bank.migrate(config.database.migration_lock_timeout_seconds)?;
    if outcome.normalized {
        println!("✅ Legacy blood_type columns normalized into blood_types");
    }
    if outcome.created {
        println!("✅ Created missing tables");
    }
    if !outcome.changed() {
        println!("✅ Schema already up to date");
    }
    Ok(())
}

fn handle_status(config: &BloodBankConfig) -> anyhow::Result<()> {
    let status = unmigrated(config)?.migration_status()?;

    println!("\n📊 Migration Status\n");
    if status.applied.is_empty() {
        println!("✅ Applied Migrations: None");
    } else {
        println!("✅ Applied Migrations ({}):", status.applied.len());
        for record in &status.applied {
            let time_str = match record.execution_time_ms {
                Some(ms) => format!("{ms}ms"),
                None => "N/A".to_string(),
            };
            println!(
                "  ✓ m{}_{} ({}, {})",
                record.version,
                record.name,
                record.applied_at.format("%Y-%m-%d %H:%M:%S"),
                time_str
            );
        }
    }
    println!();

    if status.legacy_tables.is_empty() {
        println!("⏳ Legacy tables: None");
    } else {
        println!(
            "{} {}",
            "⏳ Legacy tables awaiting normalization:".yellow(),
            status.legacy_tables.join(", ")
        );
    }
    if !status.schema_present {
        println!("{}", "⏳ Normalized schema not created yet".yellow());
    }
    if status.lock_held {
        println!("{}", "🔒 Migration lock is held by another process".yellow());
    }
    if status.baseline_drifted {
        println!(
            "{}",
            "⚠️  Recorded schema checksum differs from this build".yellow()
        );
    }
    if let Some(latest) = status.latest_applied_version() {
        println!("\n📈 Latest applied version: {latest}");
    }

    if status.is_up_to_date() {
        Ok(())
    } else {
        bail!("schema is not up to date; run `bloodbank migrate`")
    }
}

fn handle_reconcile(config: &BloodBankConfig) -> anyhow::Result<()> {
    let bank = BloodBank::open(&config.database)?;
    let discrepancies = bank.reconcile()?;
    if discrepancies.is_empty() {
        println!("✅ Every balance matches its donations and fulfilled requests");
        return Ok(());
    }

    println!("\n{}\n", "Ledger discrepancies".red().bold());
    for d in &discrepancies {
        println!(
            "  {:<8} stored {:>6}  expected {:>6}",
            d.blood_type, d.stored, d.expected
        );
    }
    bail!("{} blood type(s) out of balance", discrepancies.len())
}
