use std::io::Write;

use gravel_roads_backend::db::MemoryRoadStore;
use gravel_roads_backend::domain::RelevanceTaxonomy;
use gravel_roads_backend::importer::extractor::Framing;
use gravel_roads_backend::importer::{self, backfill, ImportStage};
use gravel_roads_backend::{ImportConfig, PipelineError};

const LINE: &str = r#"{ "type": "Feature", "properties": { "highway": "HIGHWAY", "surface": "SURFACE", "osm_id": "ID", "other_tags": "\"tracktype\"=>\"grade3\"" }, "geometry": { "type": "LineString", "coordinates": [ [ -105.2, 40.0 ], [ -105.3, 40.1 ] ] } }"#;

fn feature_line(osm_id: &str, highway: &str, surface: &str) -> String {
    LINE.replace("HIGHWAY", highway)
        .replace("SURFACE", surface)
        .replace("ID", osm_id)
}

// Pretty-printed FeatureCollection, one Feature per line.
fn collection(features: &[String]) -> String {
    let mut doc = String::from("{\n\"type\": \"FeatureCollection\",\n\"name\": \"roads\",\n\"features\": [\n");
    doc.push_str(&features.join(",\n"));
    doc.push_str("\n]\n}\n");
    doc
}

fn write_input(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::with_suffix(".geojson").unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn test_end_to_end_counts() {
    let input = write_input(&collection(&[
        feature_line("1", "track", "gravel"),
        feature_line("2", "motorway", "asphalt"),
        r#"{ "type": "Feature", "properties": { "highway": "track", "osm_id": "3" "surface": "dirt" }, "geometry": null }"#.to_string(),
    ]));

    let store = MemoryRoadStore::new();
    let config = ImportConfig::new(input.path());

    let summary = importer::import_with_sink(&store, &config, RelevanceTaxonomy::standard())
        .await
        .unwrap();

    assert_eq!(summary.counters.imported, 1);
    assert_eq!(summary.counters.skipped_irrelevant, 1);
    assert_eq!(summary.counters.parse_errors, 1);
    assert_eq!(summary.counters.duplicates, 0);
    assert_eq!(store.len(), 1);
    assert!(store.contains("1"));
    assert!(store.indexes_ready());
    assert!(store.is_closed());

    let stored = store.get("1").unwrap();
    assert_eq!(stored.record.surface.as_deref(), Some("gravel"));
    assert_eq!(stored.record.geometry["type"], "LineString");
}

#[tokio::test]
async fn test_brace_framing_matches_line_framing() {
    let features: Vec<String> = (0..50)
        .map(|i| {
            let (highway, surface) = match i % 3 {
                0 => ("track", "asphalt"),
                1 => ("residential", "Fine Gravel"),
                _ => ("primary", "concrete"),
            };
            feature_line(&i.to_string(), highway, surface)
        })
        .collect();
    let input = write_input(&collection(&features));

    let line_store = MemoryRoadStore::new();
    let line_summary = importer::import_with_sink(
        &line_store,
        &ImportConfig::new(input.path()),
        RelevanceTaxonomy::standard(),
    )
    .await
    .unwrap();

    let brace_store = MemoryRoadStore::new();
    let mut brace_config = ImportConfig::new(input.path());
    brace_config.framing = Framing::Braces;
    brace_config.chunk_size = 13;
    let brace_summary =
        importer::import_with_sink(&brace_store, &brace_config, RelevanceTaxonomy::standard())
            .await
            .unwrap();

    assert_eq!(line_summary.counters.imported, 34);
    assert_eq!(brace_summary.counters.imported, 34);
    assert_eq!(
        line_summary.counters.skipped_irrelevant,
        brace_summary.counters.skipped_irrelevant
    );
    for i in 0..50 {
        let id = i.to_string();
        assert_eq!(line_store.contains(&id), brace_store.contains(&id), "{}", id);
    }
}

#[tokio::test]
async fn test_batches_and_duplicates_across_run() {
    let mut features: Vec<String> = (0..25)
        .map(|i| feature_line(&i.to_string(), "track", "dirt"))
        .collect();
    // Repeat one id already flushed and one still pending in the last batch.
    features.push(feature_line("3", "track", "dirt"));
    features.push(feature_line("24", "track", "dirt"));
    let input = write_input(&collection(&features));

    let store = MemoryRoadStore::new();
    let mut config = ImportConfig::new(input.path());
    config.batch_size = 10;

    let summary = importer::import_with_sink(&store, &config, RelevanceTaxonomy::standard())
        .await
        .unwrap();

    assert_eq!(store.insert_calls(), vec![10, 10, 5]);
    assert_eq!(store.len(), 25);
    assert_eq!(summary.counters.imported, 25);
    assert_eq!(summary.counters.duplicates, 2);
    assert_eq!(summary.counters.batches_flushed, 3);
}

#[tokio::test]
async fn test_rerun_counts_everything_as_duplicate() {
    let input = write_input(&collection(&[
        feature_line("10", "track", "gravel"),
        feature_line("11", "path", "ground"),
    ]));
    let config = ImportConfig::new(input.path());
    let store = MemoryRoadStore::new();

    importer::import_with_sink(&store, &config, RelevanceTaxonomy::standard())
        .await
        .unwrap();
    let second = importer::import_with_sink(&store, &config, RelevanceTaxonomy::standard())
        .await
        .unwrap();

    assert_eq!(second.counters.imported, 0);
    assert_eq!(second.counters.duplicates, 2);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_reporter_does_not_change_imported_data() {
    let features: Vec<String> = (0..40)
        .map(|i| feature_line(&i.to_string(), if i % 2 == 0 { "track" } else { "primary" }, "asphalt"))
        .collect();
    let input = write_input(&collection(&features));

    let mut noisy = ImportConfig::new(input.path());
    noisy.report_every = 1;
    noisy.expected_lines = Some(1000);
    let mut quiet = ImportConfig::new(input.path());
    quiet.report_every = 0;

    let noisy_store = MemoryRoadStore::new();
    let quiet_store = MemoryRoadStore::new();
    let noisy_summary =
        importer::import_with_sink(&noisy_store, &noisy, RelevanceTaxonomy::standard())
            .await
            .unwrap();
    let quiet_summary =
        importer::import_with_sink(&quiet_store, &quiet, RelevanceTaxonomy::standard())
            .await
            .unwrap();

    assert_eq!(noisy_summary.counters, quiet_summary.counters);
    assert_eq!(noisy_store.len(), 20);
    assert_eq!(quiet_store.len(), 20);
}

#[tokio::test]
async fn test_failed_bulk_insert_is_fatal_and_closes_sink() {
    let input = write_input(&collection(&[feature_line("1", "track", "gravel")]));
    let store = MemoryRoadStore::failing_inserts();

    let err = importer::import_with_sink(
        &store,
        &ImportConfig::new(input.path()),
        RelevanceTaxonomy::standard(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PipelineError::Sink { .. }));
    assert_eq!(err.stage(), ImportStage::Flushing);
    assert!(store.is_empty());
    assert!(store.is_closed());
}

#[tokio::test]
async fn test_unstorable_rows_do_not_sink_their_batch() {
    let nul_name = r#"{ "type": "Feature", "properties": { "highway": "track", "osm_id": "2", "name": "a\u0000b" }, "geometry": { "type": "Point", "coordinates": [ 1.0, 2.0 ] } }"#;
    let with_elevation = r#"{ "type": "Feature", "properties": { "highway": "track", "osm_id": "3" }, "geometry": { "type": "LineString", "coordinates": [ [ 1.0, 2.0, 1650.0 ], [ 1.1, 2.1, 1700.0 ] ] } }"#;
    let input = write_input(&collection(&[
        feature_line("1", "track", "gravel"),
        nul_name.to_string(),
        with_elevation.to_string(),
        feature_line("4", "path", "dirt"),
    ]));
    let store = MemoryRoadStore::new();

    let summary = importer::import_with_sink(
        &store,
        &ImportConfig::new(input.path()),
        RelevanceTaxonomy::standard(),
    )
    .await
    .unwrap();

    assert_eq!(summary.counters.invalid, 1);
    assert_eq!(summary.counters.imported, 3);
    assert_eq!(store.insert_calls(), vec![3]);
    assert!(!store.contains("2"));
    assert!(store.contains("3"));
}

#[tokio::test]
async fn test_missing_input_is_fatal_and_closes_sink() {
    let store = MemoryRoadStore::new();
    let config = ImportConfig::new("/nonexistent/roads.geojson");

    let err = importer::import_with_sink(&store, &config, RelevanceTaxonomy::standard())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Input { .. }));
    assert_eq!(err.stage(), ImportStage::Streaming);
    assert!(store.indexes_ready());
    assert!(store.is_closed());
}

#[tokio::test]
async fn test_backfill_after_import() {
    let tagged = r#"{ "type": "Feature", "properties": { "highway": "track", "osm_id": "77", "other_tags": "\"surface\"=>\"Compacted\",\"tracktype\"=>\"grade2\"" }, "geometry": { "type": "Point", "coordinates": [ 1.0, 2.0 ] } }"#;
    let input = write_input(&collection(&[tagged.to_string()]));
    let store = MemoryRoadStore::new();

    importer::import_with_sink(
        &store,
        &ImportConfig::new(input.path()),
        RelevanceTaxonomy::standard(),
    )
    .await
    .unwrap();
    assert_eq!(store.get("77").unwrap().record.surface, None);

    let summary = backfill::backfill_surfaces(&store, 100).await.unwrap();

    assert_eq!(summary.updated, 1);
    assert_eq!(
        store.get("77").unwrap().record.surface.as_deref(),
        Some("compacted")
    );
}
