pub mod backfill;
pub mod extractor;
pub mod loader;
pub mod progress;

use std::fmt;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::AsyncRead;

use crate::config::ImportConfig;
use crate::db::{PgRoadStore, RoadSink, SinkError};
use crate::domain::{normalize_surface, ImportedRecord, RawFeature, RelevanceTaxonomy};
use crate::error::PipelineError;
use extractor::{ExtractStats, Extracted, FeatureExtractor};
use loader::BatchLoader;
use progress::{ImportSummary, ProgressReporter, Workload};

/// Per-run tallies, owned by the driver for the duration of one import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub lines_read: u64,
    pub bytes_read: u64,
    pub features_parsed: u64,
    pub parse_errors: u64,
    pub skipped_irrelevant: u64,
    /// Relevant features without an `osm_id` or a usable geometry, or with
    /// text the store cannot hold.
    pub invalid: u64,
    pub duplicates: u64,
    pub imported: u64,
    pub batches_flushed: u64,
}

impl RunCounters {
    fn absorb(&mut self, stats: ExtractStats) {
        self.lines_read = stats.lines_read;
        self.bytes_read = stats.bytes_read;
        self.features_parsed = stats.features_parsed;
        self.parse_errors = stats.parse_errors;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    Connecting,
    IndexCheck,
    Streaming,
    Flushing,
    Closing,
    Done,
    Failed,
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImportStage::Connecting => "connecting",
            ImportStage::IndexCheck => "index check",
            ImportStage::Streaming => "streaming",
            ImportStage::Flushing => "flushing",
            ImportStage::Closing => "closing",
            ImportStage::Done => "done",
            ImportStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn enter(stage: ImportStage) {
    tracing::info!("Import stage: {}", stage);
}

/// Connect to PostGIS and import the configured GeoJSON file.
pub async fn import_from_geojson(
    database_url: &str,
    config: &ImportConfig,
    taxonomy: &RelevanceTaxonomy,
) -> Result<ImportSummary, PipelineError> {
    enter(ImportStage::Connecting);
    let store = PgRoadStore::connect(database_url)
        .await
        .map_err(PipelineError::sink(ImportStage::Connecting))?;
    tracing::info!("Database connection established");

    import_with_sink(&store, config, taxonomy).await
}

/// Import the configured file into `sink`.
///
/// The sink is closed on every exit path, and the counters reached so far are
/// logged even when the run fails.
pub async fn import_with_sink<S: RoadSink>(
    sink: &S,
    config: &ImportConfig,
    taxonomy: &RelevanceTaxonomy,
) -> Result<ImportSummary, PipelineError> {
    let started = Instant::now();
    let mut counters = RunCounters::default();

    let result = run_pipeline(sink, config, taxonomy, &mut counters, started).await;

    enter(ImportStage::Closing);
    sink.close().await;

    let summary = ImportSummary {
        counters,
        elapsed: started.elapsed(),
    };

    match result {
        Ok(()) => {
            enter(ImportStage::Done);
            tracing::info!("{}", summary);
            Ok(summary)
        }
        Err(e) => {
            enter(ImportStage::Failed);
            tracing::error!("Import aborted: {}", e);
            tracing::error!("{}", summary);
            Err(e)
        }
    }
}

async fn run_pipeline<S: RoadSink>(
    sink: &S,
    config: &ImportConfig,
    taxonomy: &RelevanceTaxonomy,
    counters: &mut RunCounters,
    started: Instant,
) -> Result<(), PipelineError> {
    enter(ImportStage::IndexCheck);
    sink.ensure_indexes()
        .await
        .map_err(PipelineError::sink(ImportStage::IndexCheck))?;

    enter(ImportStage::Streaming);
    tracing::info!("Opening input file: {:?} ({} framing)", config.input, config.framing);
    let file = File::open(&config.input)
        .await
        .map_err(PipelineError::input(ImportStage::Streaming))?;

    let workload = match config.expected_lines {
        Some(total) => Workload::Lines(total),
        None => file
            .metadata()
            .await
            .map(|m| Workload::Bytes(m.len()))
            .unwrap_or(Workload::Unknown),
    };
    let mut reporter = ProgressReporter::new(config.report_every, workload, started);

    stream_features(sink, file, config, taxonomy, counters, &mut reporter).await
}

/// Drive the extractor over `reader`, routing each feature through the
/// classifier and loader, then flush the final partial batch.
pub async fn stream_features<S, R>(
    sink: &S,
    reader: R,
    config: &ImportConfig,
    taxonomy: &RelevanceTaxonomy,
    counters: &mut RunCounters,
    reporter: &mut ProgressReporter,
) -> Result<(), PipelineError>
where
    S: RoadSink,
    R: AsyncRead + Unpin,
{
    let mut extractor =
        FeatureExtractor::new(reader, config.framing).with_chunk_size(config.chunk_size);
    let mut loader = BatchLoader::new(sink, config.batch_size);

    loop {
        let step = extractor
            .advance()
            .await
            .map_err(PipelineError::input(ImportStage::Streaming))?;
        counters.absorb(extractor.stats());

        match step {
            Extracted::Feature(feature) => {
                route_feature(feature, taxonomy, &mut loader, counters)
                    .await
                    .map_err(PipelineError::sink(ImportStage::Streaming))?;
            }
            Extracted::Pending => {}
            Extracted::End => break,
        }

        if let Some(report) = reporter.observe(counters, Instant::now()) {
            tracing::info!("{}", report);
        }
    }

    enter(ImportStage::Flushing);
    loader
        .flush(counters)
        .await
        .map_err(PipelineError::sink(ImportStage::Flushing))?;

    Ok(())
}

async fn route_feature<S: RoadSink>(
    feature: RawFeature,
    taxonomy: &RelevanceTaxonomy,
    loader: &mut BatchLoader<'_, S>,
    counters: &mut RunCounters,
) -> Result<(), SinkError> {
    let surface = normalize_surface(feature.surface());

    if !taxonomy.is_relevant(feature.highway(), surface.as_deref()) {
        counters.skipped_irrelevant += 1;
        return Ok(());
    }

    match ImportedRecord::from_feature(feature, surface) {
        Ok(record) => {
            loader.submit(record, counters).await?;
        }
        Err(rejection) => {
            counters.invalid += 1;
            tracing::debug!("Rejected relevant feature: {:?}", rejection);
        }
    }

    Ok(())
}
