use anyhow::{Context, Result};
use clap::Parser;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tracing::{error, info};

use poi_import::{ImportOptions, ImportService, SqliteStore, DEFAULT_BATCH_SIZE, DEFAULT_GROUP_SIZE};

/// Import point-of-interest files (CSV/JSON/XML) with batched upserts
#[derive(Parser, Debug)]
#[command(name = "poi-import")]
#[command(version)]
struct Cli {
    /// Paths to the files (multiple allowed)
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Rows read per extraction group
    #[arg(
        long = "chunksize",
        visible_alias = "group-size",
        default_value_t = NonZeroUsize::new(DEFAULT_GROUP_SIZE).unwrap_or(NonZeroUsize::MIN)
    )]
    chunksize: NonZeroUsize,

    /// Rows per bulk write
    #[arg(
        long,
        default_value_t = NonZeroUsize::new(DEFAULT_BATCH_SIZE).unwrap_or(NonZeroUsize::MIN)
    )]
    batch_size: NonZeroUsize,

    /// SQLite database holding the records and import history
    #[arg(long, default_value = "poi.db")]
    database: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    info!("poi-import v{} - database {}", poi_import::VERSION, cli.database.display());

    let store = SqliteStore::open(&cli.database)
        .with_context(|| format!("Failed to open database: {}", cli.database.display()))?;
    let options = ImportOptions::new(cli.chunksize.get(), cli.batch_size.get())?;

    let service = ImportService::new(&store, &store, options);
    match service.run(&cli.paths) {
        Ok(stats) => {
            println!("✅ Data processed successfully");
            println!("{}", stats);
            Ok(())
        }
        Err(e) => {
            error!(path = %e.path.display(), "import aborted");
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    }
}
