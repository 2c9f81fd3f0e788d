use std::time::Instant;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rusqlite::Connection;

use registre_ingest::fetch::HttpClient;
use registre_ingest::pipeline::bodacc::DEFAULT_DEPARTEMENT;
use registre_ingest::{db, ingest_bodacc, ingest_city, ingest_postal_codes};
use registre_ingest::{BodaccQuery, RunReport, Settings};

#[derive(Parser)]
#[command(name = "registre_ingest", about = "SIRENE and BODACC ingestion into SQLite")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and its tables
    Init,
    /// Fetch every establishment of a city from SIRENE
    City {
        /// City name as INSEE spells it (e.g. "AIX-EN-PROVENCE")
        ville: String,
        /// Fetch and normalize without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Fetch establishments for one or more postal codes from SIRENE
    PostalCodes {
        #[arg(required = true)]
        codes: Vec<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Fetch BODACC announcements for the companies already stored
    ///
    /// Announcements are unique per (siren, publication date). A rerun over a
    /// period already ingested is rejected as a whole and writes nothing; use
    /// --since to start after the last stored announcement.
    Bodacc {
        /// Earliest publication date (YYYY-MM-DD)
        #[arg(long, default_value = "2020-01-01")]
        since: NaiveDate,
        #[arg(long, default_value = DEFAULT_DEPARTEMENT)]
        departement: String,
        /// Keep announcements for every company, not only stored ones
        #[arg(long)]
        no_siren_filter: bool,
    },
    /// Show row counts
    Stats,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::from_env().context("Failed to load settings")?;

    let result = match cli.command {
        Commands::Init => {
            open_store(&settings)?;
            println!("Schema ready in {}", settings.db_path.display());
            Ok(())
        }
        Commands::City { ville, dry_run } => {
            let client = HttpClient::sirene(&settings)?;
            let conn = if dry_run { None } else { Some(open_store(&settings)?) };
            let report = ingest_city(&settings, &client, conn.as_ref(), &ville);
            summarize("sirene", &report)
        }
        Commands::PostalCodes { codes, dry_run } => {
            let client = HttpClient::sirene(&settings)?;
            let conn = if dry_run { None } else { Some(open_store(&settings)?) };
            let report = ingest_postal_codes(&settings, &client, conn.as_ref(), &codes);
            summarize("sirene", &report)
        }
        Commands::Bodacc {
            since,
            departement,
            no_siren_filter,
        } => {
            let client = HttpClient::bodacc()?;
            let conn = open_store(&settings)?;
            let query = BodaccQuery {
                since,
                departement,
                use_siren_filter: !no_siren_filter,
            };
            let report = ingest_bodacc(&settings, &client, &conn, &query);
            summarize("bodacc_procedures", &report)
        }
        Commands::Stats => {
            let conn = open_store(&settings)?;
            let s = db::get_stats(&conn)?;
            println!("Establishments: {}", s.establishments);
            println!("Companies:      {}", s.companies);
            println!("Procedures:     {}", s.procedures);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_store(settings: &Settings) -> anyhow::Result<Connection> {
    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

fn summarize<R>(table: &str, report: &RunReport<R>) -> anyhow::Result<()> {
    println!(
        "{} pages, {} records fetched, {} rows normalized",
        report.pages,
        report.fetched,
        report.rows.len()
    );
    if let Some(stop) = &report.stop {
        println!("Fetch stopped: {:?}", stop);
    }
    match &report.write {
        Some(w) => println!("{}: {}/{} rows written", table, w.written, w.attempted),
        None => println!("{}: nothing written (stage {:?})", table, report.stage),
    }
    if let Some(err) = report.write.as_ref().and_then(|w| w.error.as_deref()) {
        bail!("write into {} failed: {}", table, err);
    }
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
