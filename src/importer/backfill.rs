use crate::db::{RoadSink, SinkError};
use crate::domain::{extract_surface, normalize_surface, SurfaceCandidate, SurfaceUpdate};

pub const DEFAULT_PAGE_SIZE: i64 = 1000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    pub scanned: u64,
    pub updated: u64,
    /// Rows whose tag blob carries no usable surface.
    pub without_surface: u64,
}

/// Derive a normalized surface for a stored road from its `other_tags` blob.
pub fn surface_update(candidate: &SurfaceCandidate) -> Option<SurfaceUpdate> {
    let raw = extract_surface(&candidate.other_tags)?;
    let surface = normalize_surface(Some(&raw))?;

    Some(SurfaceUpdate {
        id: candidate.id,
        surface,
    })
}

/// Fill in missing `surface` values from each road's `other_tags`.
///
/// Walks the store with a keyset cursor, one page at a time. Safe to re-run:
/// updated rows no longer match the scan.
pub async fn backfill_surfaces<S: RoadSink>(
    sink: &S,
    page_size: i64,
) -> Result<BackfillSummary, SinkError> {
    let page_size = page_size.max(1);
    let mut summary = BackfillSummary::default();
    let mut after_id = 0;

    loop {
        let page = sink.scan_missing_surface(after_id, page_size).await?;
        let Some(last) = page.last() else {
            break;
        };
        after_id = last.id;

        let updates: Vec<SurfaceUpdate> = page.iter().filter_map(surface_update).collect();

        summary.scanned += page.len() as u64;
        summary.without_surface += (page.len() - updates.len()) as u64;
        summary.updated += sink.update_surfaces(&updates).await?;

        tracing::info!(
            "Backfill progress: scanned {}, updated {}, no surface {}",
            summary.scanned,
            summary.updated,
            summary.without_surface
        );

        if (page.len() as i64) < page_size {
            break;
        }
    }

    Ok(summary)
}
