use anyhow::Result;
use clap::Parser;

use gravel_roads_backend::db::{self, PgRoadStore, RoadSink};
use gravel_roads_backend::importer::backfill::{self, DEFAULT_PAGE_SIZE};

#[derive(Parser, Debug)]
#[command(name = "backfill-surface")]
#[command(about = "Fill missing road surfaces from the other_tags blob")]
struct Args {
    /// Rows fetched per cursor page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: i64,
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

    tracing::info!("Starting surface backfill");
    tracing::info!("Connecting to database...");
    let store = PgRoadStore::new(db::create_pool().await?);
    tracing::info!("Database connection established");

    let result = backfill::backfill_surfaces(&store, args.page_size).await;
    store.close().await;
    let summary = result?;

    tracing::info!(
        "Surface backfill completed: {} scanned, {} updated, {} without surface",
        summary.scanned,
        summary.updated,
        summary.without_surface
    );

    Ok(())
}
