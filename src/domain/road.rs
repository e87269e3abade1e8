use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One GeoJSON Feature as read from the input stream.
///
/// The geometry is kept as raw JSON and passed through to the sink untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFeature {
    #[serde(default)]
    pub geometry: Option<Value>,
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

impl RawFeature {
    fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.as_ref()?.get(key)?.as_str()
    }

    pub fn highway(&self) -> Option<&str> {
        self.property_str("highway")
    }

    pub fn surface(&self) -> Option<&str> {
        self.property_str("surface")
    }

    pub fn other_tags(&self) -> Option<&str> {
        self.property_str("other_tags")
    }

    /// External identity. Numeric ids are rendered as strings.
    pub fn osm_id(&self) -> Option<String> {
        match self.properties.as_ref()?.get("osm_id")? {
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}

/// Why a relevant feature could not become an [`ImportedRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordRejection {
    MissingOsmId,
    MissingGeometry,
    InvalidGeometry,
    /// A string holds a NUL character, which Postgres text and JSONB reject.
    InvalidText,
}

fn contains_nul(value: &Value) -> bool {
    match value {
        Value::String(s) => s.contains('\0'),
        Value::Array(items) => items.iter().any(contains_nul),
        Value::Object(map) => map
            .iter()
            .any(|(key, value)| key.contains('\0') || contains_nul(value)),
        _ => false,
    }
}

/// The persisted form of an accepted feature.
#[derive(Debug, Clone, Serialize)]
pub struct ImportedRecord {
    pub osm_id: String,
    pub highway: Option<String>,
    pub surface: Option<String>,
    pub raw_surface: Option<String>,
    pub other_tags: Option<String>,
    pub properties: Map<String, Value>,
    pub geometry: Value,
    pub imported_at: DateTime<Utc>,
}

impl ImportedRecord {
    /// Build the persisted record from an accepted feature and its
    /// normalized surface.
    pub fn from_feature(
        feature: RawFeature,
        surface: Option<String>,
    ) -> Result<Self, RecordRejection> {
        let osm_id = feature.osm_id().ok_or(RecordRejection::MissingOsmId)?;
        let highway = feature.highway().map(str::to_string);
        let raw_surface = feature.surface().map(str::to_string);
        let other_tags = feature.other_tags().map(str::to_string);

        let geometry = match feature.geometry {
            Some(Value::Null) | None => return Err(RecordRejection::MissingGeometry),
            Some(geometry) => geometry,
        };
        if geojson::Geometry::deserialize(&geometry).is_err() {
            return Err(RecordRejection::InvalidGeometry);
        }

        let properties = feature.properties.unwrap_or_default();
        if osm_id.contains('\0')
            || contains_nul(&geometry)
            || properties
                .iter()
                .any(|(key, value)| key.contains('\0') || contains_nul(value))
        {
            return Err(RecordRejection::InvalidText);
        }

        Ok(Self {
            osm_id,
            highway,
            surface,
            raw_surface,
            other_tags,
            properties,
            geometry,
            imported_at: Utc::now(),
        })
    }
}

/// A stored road whose surface may be recoverable from its tag blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceCandidate {
    pub id: i64,
    pub osm_id: String,
    pub other_tags: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceUpdate {
    pub id: i64,
    pub surface: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(json: &str) -> RawFeature {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_property_accessors() {
        let f = feature(
            r#"{"type":"Feature","properties":{"highway":"track","surface":"Gravel","osm_id":"42","other_tags":"\"smoothness\"=>\"bad\""},"geometry":null}"#,
        );

        assert_eq!(f.highway(), Some("track"));
        assert_eq!(f.surface(), Some("Gravel"));
        assert_eq!(f.osm_id(), Some("42".to_string()));
        assert_eq!(f.other_tags(), Some(r#""smoothness"=>"bad""#));
    }

    #[test]
    fn test_numeric_osm_id_is_stringified() {
        let f = feature(r#"{"type":"Feature","properties":{"osm_id":123456789}}"#);
        assert_eq!(f.osm_id(), Some("123456789".to_string()));
    }

    #[test]
    fn test_null_properties() {
        let f = feature(r#"{"type":"Feature","properties":null,"geometry":null}"#);
        assert_eq!(f.highway(), None);
        assert_eq!(f.osm_id(), None);
    }

    #[test]
    fn test_record_from_feature() {
        let f = feature(
            r#"{"type":"Feature","properties":{"highway":"track","surface":"Fine Gravel","osm_id":"7"},"geometry":{"type":"LineString","coordinates":[[-105.1,40.0],[-105.2,40.1]]}}"#,
        );

        let record = ImportedRecord::from_feature(f, Some("fine_gravel".to_string())).unwrap();
        assert_eq!(record.osm_id, "7");
        assert_eq!(record.highway.as_deref(), Some("track"));
        assert_eq!(record.surface.as_deref(), Some("fine_gravel"));
        assert_eq!(record.raw_surface.as_deref(), Some("Fine Gravel"));
        assert_eq!(record.geometry["type"], "LineString");
        assert_eq!(record.properties["osm_id"], "7");
    }

    #[test]
    fn test_record_rejections() {
        let no_id = feature(
            r#"{"type":"Feature","properties":{"highway":"track"},"geometry":{"type":"Point","coordinates":[0.0,0.0]}}"#,
        );
        assert_eq!(
            ImportedRecord::from_feature(no_id, None).unwrap_err(),
            RecordRejection::MissingOsmId
        );

        let no_geometry = feature(r#"{"type":"Feature","properties":{"osm_id":"1"},"geometry":null}"#);
        assert_eq!(
            ImportedRecord::from_feature(no_geometry, None).unwrap_err(),
            RecordRejection::MissingGeometry
        );

        let bad_geometry = feature(
            r#"{"type":"Feature","properties":{"osm_id":"1"},"geometry":{"type":"LineString"}}"#,
        );
        assert_eq!(
            ImportedRecord::from_feature(bad_geometry, None).unwrap_err(),
            RecordRejection::InvalidGeometry
        );
    }

    #[test]
    fn test_nul_text_is_rejected() {
        let nul_property = feature(
            r#"{"type":"Feature","properties":{"osm_id":"1","name":"a\u0000b"},"geometry":{"type":"Point","coordinates":[0.0,0.0]}}"#,
        );
        assert_eq!(
            ImportedRecord::from_feature(nul_property, None).unwrap_err(),
            RecordRejection::InvalidText
        );

        let nul_nested = feature(
            r#"{"type":"Feature","properties":{"osm_id":"1","refs":[{"\u0000":1}]},"geometry":{"type":"Point","coordinates":[0.0,0.0]}}"#,
        );
        assert_eq!(
            ImportedRecord::from_feature(nul_nested, None).unwrap_err(),
            RecordRejection::InvalidText
        );

        let nul_tags = feature(
            r#"{"type":"Feature","properties":{"osm_id":"1","other_tags":"\"surface\"=>\"dirt\u0000\""},"geometry":{"type":"Point","coordinates":[0.0,0.0]}}"#,
        );
        assert_eq!(
            ImportedRecord::from_feature(nul_tags, None).unwrap_err(),
            RecordRejection::InvalidText
        );
    }

    #[test]
    fn test_elevation_coordinates_are_accepted() {
        let f = feature(
            r#"{"type":"Feature","properties":{"osm_id":"5"},"geometry":{"type":"LineString","coordinates":[[-105.1,40.0,1650.0],[-105.2,40.1,1700.5]]}}"#,
        );

        let record = ImportedRecord::from_feature(f, None).unwrap();
        assert_eq!(record.geometry["coordinates"][0][2], 1650.0);
    }
}
