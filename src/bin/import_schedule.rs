use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use clinic_assistant::db;
use clinic_assistant::db::import::{import_rows, parse_rows};

#[derive(Parser)]
#[command(name = "import_schedule")]
#[command(about = "Load doctor schedule slots from a JSON file into the clinic database", long_about = None)]
struct Cli {
    /// JSON array of {doctor, specialty, date_time, status?, email?} rows
    file: PathBuf,

    /// SQLite database to write to
    #[arg(long, default_value = "clinic.db")]
    database: String,

    /// Empty the schedule table before importing
    #[arg(long)]
    replace: bool,
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let json = std::fs::read_to_string(&cli.file)
        .with_context(|| format!("failed to read {}", cli.file.display()))?;
    let rows = parse_rows(&json)?;

    let mut conn = db::init_db(&cli.database)?;
    let count = import_rows(&mut conn, &rows, cli.replace)?;

    println!("Imported {count} slots into {}", cli.database);
    Ok(())
}
