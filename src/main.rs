use anyhow::Result;
use clap::{Parser, Subcommand};
use floatingest::db::{migrate, Db};
use floatingest::error::IngestError;
use floatingest::ingest::{PipelineDriver, PipelineOptions};
use floatingest::Config;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "floatingest")]
#[command(version)]
#[command(about = "Ingest oceanographic float profiles into a relational store")]
struct Args {
    /// Config file (defaults to $FLOATINGEST_CONFIG, then ./config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database, overriding storage.db_path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process every file in the intake directory
    Ingest {
        /// Skip the per-file CSV snapshots
        #[arg(long)]
        no_snapshots: bool,
    },
    /// Apply migrations and check the schema
    Verify,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            let _ = dotenv::dotenv();
            Config::load_from(path)?
        }
        None => Config::load()?,
    };
    if let Some(db) = &args.db {
        config.storage.db_path = db.clone();
    }

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", config.pipeline.log_level.as_str())
    ).init();

    log::info!("Starting floatingest v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Database path: {}", config.db_path().display());

    let db = open_store(&config).await?;

    match args.command.unwrap_or(Command::Ingest { no_snapshots: false }) {
        Command::Ingest { no_snapshots } => {
            if no_snapshots {
                config.pipeline.write_snapshots = false;
            }
            run_ingest(db, &config).await
        }
        Command::Verify => {
            verify_store(&db).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Open the store and bring its schema up to date
async fn open_store(config: &Config) -> Result<Db> {
    let db = Db::new(config.db_path())
        .with_busy_timeout(Duration::from_millis(config.storage.busy_timeout_ms));

    let migrations_dir = config.storage.migrations_dir.clone();
    db.with_connection(move |conn| {
        migrate::run_migrations(conn, &migrations_dir)
    }).await?;

    log::info!("Database initialized");
    Ok(db)
}

async fn run_ingest(db: Db, config: &Config) -> Result<ExitCode> {
    log::info!("Intake: {}", config.intake_dir().display());
    log::info!("Processed: {}", config.paths.processed_dir.display());
    if config.pipeline.write_snapshots {
        log::info!("Snapshots: {}", config.paths.snapshot_dir.display());
    }

    let start = Instant::now();
    let driver = PipelineDriver::new(db, PipelineOptions::from_config(config));
    let report = driver.run().await?;

    report.log_summary();
    log::info!("Time: {:.2}s", start.elapsed().as_secs_f64());

    Ok(if report.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Verify that the pipeline tables exist and the store is healthy
async fn verify_store(db: &Db) -> Result<()> {
    db.with_connection(|conn| {
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt.query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let expected_tables = ["ingest_files", "profile_summaries", "profiles", "schema_migrations"];
        let mut all_tables_exist = true;

        for table in &expected_tables {
            if !tables.iter().any(|t| t == table) {
                log::error!("Missing table: {}", table);
                all_tables_exist = false;
            } else {
                log::debug!("✓ Table exists: {}", table);
            }
        }

        if !all_tables_exist {
            return Err(IngestError::Config("Not all required tables exist".to_string()));
        }

        let applied = migrate::get_applied_migrations(conn)?;
        log::info!("✓ {} migrations applied", applied.len());

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(IngestError::Config(format!("Journal mode is not WAL: {}", journal_mode)));
        }

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(IngestError::Config(format!("Database integrity check failed: {}", integrity)));
        }
        log::info!("✓ Database integrity: OK");

        let (profiles, summaries, files) = migrate::table_counts(conn)?;
        println!("profiles:          {}", profiles);
        println!("profile_summaries: {}", summaries);
        println!("ingest_files:      {}", files);

        Ok(())
    }).await?;

    log::info!("✓ Database verification complete");
    Ok(())
}
