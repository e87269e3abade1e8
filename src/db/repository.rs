use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use super::{RoadSink, SinkError};
use crate::domain::{ImportedRecord, SurfaceCandidate, SurfaceUpdate};

// Postgres caps a statement at 65535 bind parameters; 8 per row.
const MAX_ROWS_PER_STATEMENT: usize = 8000;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS roads ( \
     id BIGSERIAL PRIMARY KEY, \
     osm_id TEXT NOT NULL, \
     highway TEXT, \
     surface TEXT, \
     raw_surface TEXT, \
     other_tags TEXT, \
     properties JSONB NOT NULL, \
     geometry geometry(Geometry, 4326) NOT NULL, \
     imported_at TIMESTAMPTZ NOT NULL DEFAULT NOW() \
     )";

const CREATE_OSM_ID_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS roads_osm_id_key ON roads (osm_id)";

const CREATE_GEOMETRY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS roads_geometry_gist ON roads USING GIST (geometry)";

#[derive(Debug, FromRow)]
struct SurfaceCandidateRow {
    id: i64,
    osm_id: String,
    other_tags: String,
}

impl From<SurfaceCandidateRow> for SurfaceCandidate {
    fn from(row: SurfaceCandidateRow) -> Self {
        SurfaceCandidate {
            id: row.id,
            osm_id: row.osm_id,
            other_tags: row.other_tags,
        }
    }
}

/// PostGIS-backed road store.
#[derive(Debug, Clone)]
pub struct PgRoadStore {
    pool: PgPool,
}

impl PgRoadStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, SinkError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn count_total(&self) -> Result<i64, SinkError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM roads")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.0)
    }

    pub async fn find_surface(&self, osm_id: &str) -> Result<Option<String>, SinkError> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT surface FROM roads WHERE osm_id = $1")
                .bind(osm_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.and_then(|r| r.0))
    }
}

impl RoadSink for PgRoadStore {
    async fn ensure_indexes(&self) -> Result<(), SinkError> {
        for statement in [CREATE_TABLE, CREATE_OSM_ID_INDEX, CREATE_GEOMETRY_INDEX] {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    async fn exists(&self, osm_id: &str) -> Result<bool, SinkError> {
        let found: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM roads WHERE osm_id = $1)")
                .bind(osm_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(found)
    }

    async fn insert_unordered(&self, records: &[ImportedRecord]) -> Result<u64, SinkError> {
        let mut inserted = 0;

        for chunk in records.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO roads \
                 (osm_id, highway, surface, raw_surface, other_tags, properties, geometry, imported_at) \
                 VALUES ",
            );

            for (i, record) in chunk.iter().enumerate() {
                if i > 0 {
                    query_builder.push(", ");
                }
                query_builder.push("(");
                query_builder.push_bind(&record.osm_id);
                query_builder.push(", ");
                query_builder.push_bind(&record.highway);
                query_builder.push(", ");
                query_builder.push_bind(&record.surface);
                query_builder.push(", ");
                query_builder.push_bind(&record.raw_surface);
                query_builder.push(", ");
                query_builder.push_bind(&record.other_tags);
                query_builder.push(", ");
                query_builder.push_bind(Json(&record.properties));
                // The column is 2D; elevation ordinates are dropped.
                query_builder.push(", ST_SetSRID(ST_Force2D(ST_GeomFromGeoJSON(");
                query_builder.push_bind(record.geometry.to_string());
                query_builder.push(")), 4326), ");
                query_builder.push_bind(record.imported_at);
                query_builder.push(")");
            }

            // Conflicting rows are skipped individually; the rest still land.
            query_builder.push(" ON CONFLICT (osm_id) DO NOTHING");

            let result = query_builder.build().execute(&self.pool).await?;
            inserted += result.rows_affected();
        }

        Ok(inserted)
    }

    async fn scan_missing_surface(
        &self,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<SurfaceCandidate>, SinkError> {
        let rows: Vec<SurfaceCandidateRow> = sqlx::query_as(
            "SELECT id, osm_id, other_tags \
             FROM roads \
             WHERE surface IS NULL AND other_tags IS NOT NULL AND id > $1 \
             ORDER BY id \
             LIMIT $2",
        )
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SurfaceCandidate::from).collect())
    }

    async fn update_surfaces(&self, updates: &[SurfaceUpdate]) -> Result<u64, SinkError> {
        if updates.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut total_updated = 0;

        for chunk in updates.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut query_builder: QueryBuilder<Postgres> =
                QueryBuilder::new("UPDATE roads SET surface = updates.surface FROM (VALUES ");

            for (i, update) in chunk.iter().enumerate() {
                if i > 0 {
                    query_builder.push(", ");
                }
                query_builder.push("(");
                query_builder.push_bind(update.id);
                query_builder.push(", ");
                query_builder.push_bind(&update.surface);
                query_builder.push(")");
            }

            query_builder.push(") AS updates(id, surface) WHERE roads.id = updates.id");

            let result = query_builder.build().execute(&mut *tx).await?;
            total_updated += result.rows_affected();
        }

        tx.commit().await?;
        Ok(total_updated)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
