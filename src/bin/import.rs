use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use gravel_roads_backend::db::MemoryRoadStore;
use gravel_roads_backend::domain::RelevanceTaxonomy;
use gravel_roads_backend::importer::extractor::{Framing, DEFAULT_CHUNK_SIZE};
use gravel_roads_backend::importer::loader::DEFAULT_BATCH_SIZE;
use gravel_roads_backend::importer::progress::DEFAULT_REPORT_INTERVAL;
use gravel_roads_backend::{importer, ImportConfig};

#[derive(Parser, Debug)]
#[command(name = "import")]
#[command(about = "Import likely-unpaved roads from a GeoJSON export", long_about = None)]
struct Args {
    /// Path to the GeoJSON file
    #[arg(short, long)]
    input: PathBuf,

    /// How features are cut from the stream: lines or braces
    #[arg(long, default_value_t = Framing::Lines)]
    framing: Framing,

    /// Accepted features buffered per bulk insert
    #[arg(long, env = "IMPORT_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Input lines between progress reports (0 disables)
    #[arg(long, env = "IMPORT_REPORT_EVERY", default_value_t = DEFAULT_REPORT_INTERVAL)]
    report_every: u64,

    /// Known or assumed total line count, for the ETA
    #[arg(long)]
    expected_lines: Option<u64>,

    /// Read size in bytes for brace framing
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// JSON file replacing the built-in relevance taxonomy
    #[arg(long)]
    taxonomy: Option<PathBuf>,

    /// Classify and count without writing to the database
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    tracing::info!("Starting import process");
    tracing::info!("Input file: {:?}", args.input);

    let taxonomy = match &args.taxonomy {
        Some(path) => RelevanceTaxonomy::load(path)
            .with_context(|| format!("Failed to load taxonomy from {:?}", path))?,
        None => RelevanceTaxonomy::new(),
    };
    tracing::info!(
        "Taxonomy: {} highway types, {} surface tokens",
        taxonomy.highway_type_count(),
        taxonomy.surface_token_count()
    );

    let config = ImportConfig {
        input: args.input,
        framing: args.framing,
        chunk_size: args.chunk_size,
        batch_size: args.batch_size,
        report_every: args.report_every,
        expected_lines: args.expected_lines,
    };

    let summary = if args.dry_run {
        tracing::info!("Dry run: writing to an in-memory store");
        let store = MemoryRoadStore::new();
        importer::import_with_sink(&store, &config, &taxonomy).await?
    } else {
        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set in environment or .env file")?;
        importer::import_from_geojson(&database_url, &config, &taxonomy).await?
    };

    tracing::info!(
        "Import process completed: {} imported in {:.1}s",
        summary.counters.imported,
        summary.elapsed.as_secs_f64()
    );

    Ok(())
}
