use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use super::surface::{normalize_surface, surface_components};

/// Highway types that are imported regardless of their surface tag.
pub const RELEVANT_HIGHWAY_TYPES: &[&str] = &[
    "track",
    "path",
    "bridleway",
    "byway",
    "unsurfaced",
    "dirt_road",
    "gravel_road",
    "forest_road",
    "fire_road",
    "logging_road",
    "farm_track",
    "agricultural",
    "trail",
];

/// Normalized surface tokens that mark a road as likely unpaved.
///
/// Includes misspellings and regional naming seen in the source data.
pub const RELEVANT_SURFACE_TOKENS: &[&str] = &[
    // Generic unpaved
    "unpaved",
    "unpaved_road",
    "unsealed",
    "natural",
    "ground",
    "earth",
    "dirt",
    "dirt_road",
    "soil",
    "mud",
    "clay",
    "sand",
    "grass",
    "woodchips",
    "forest_floor",
    // Gravel and variants
    "gravel",
    "fine_gravel",
    "loose_gravel",
    "packed_gravel",
    "gravel_road",
    "gravelled",
    "graveled",
    "gravel_asphalt_mix",
    "gracel",
    "gravle",
    "grvel",
    "pebblestone",
    "pebbles",
    "compacted",
    "hardpack",
    "hard_pack",
    "hard_packed",
    "hardcore",
    // Crushed stone
    "crushed_stone",
    "crushed_rock",
    "crushed_limestone",
    "crusher_run",
    "crusher_dust",
    "limerock",
    "limestone",
    "shale",
    "chert",
    "rock",
    "rocky",
    "stone",
    "stones",
    "rubble",
    "scoria",
    "cinder",
    // Regional names
    "caliche",
    "laterite",
    "murram",
    "marl",
    "coral",
    "shell",
    "slag",
    // Rough or deteriorated
    "rough",
    "broken",
    "trail",
];

static STANDARD: LazyLock<RelevanceTaxonomy> = LazyLock::new(RelevanceTaxonomy::new);

/// Static sets deciding whether a feature is worth importing.
#[derive(Debug, Clone)]
pub struct RelevanceTaxonomy {
    highway_types: HashSet<String>,
    surface_tokens: HashSet<String>,
}

#[derive(Debug, Deserialize)]
struct TaxonomyFile {
    highway_types: Vec<String>,
    surface_tokens: Vec<String>,
}

impl RelevanceTaxonomy {
    /// Builds the curated built-in taxonomy.
    pub fn new() -> Self {
        Self::from_sets(
            RELEVANT_HIGHWAY_TYPES.iter().map(|s| s.to_string()),
            RELEVANT_SURFACE_TOKENS.iter().map(|s| s.to_string()),
        )
    }

    /// The process-wide built-in taxonomy.
    pub fn standard() -> &'static Self {
        &STANDARD
    }

    /// Builds a taxonomy from explicit sets. Surface tokens are normalized so
    /// they compare against normalized feature surfaces.
    pub fn from_sets<H, S>(highway_types: H, surface_tokens: S) -> Self
    where
        H: IntoIterator<Item = String>,
        S: IntoIterator<Item = String>,
    {
        Self {
            highway_types: highway_types.into_iter().collect(),
            surface_tokens: surface_tokens
                .into_iter()
                .filter_map(|token| normalize_surface(Some(&token)))
                .collect(),
        }
    }

    /// Loads a taxonomy from a JSON file with `highway_types` and
    /// `surface_tokens` arrays.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: TaxonomyFile = serde_json::from_str(&content)?;

        anyhow::ensure!(
            !file.highway_types.is_empty() || !file.surface_tokens.is_empty(),
            "Taxonomy file {:?} defines no highway types or surface tokens",
            path
        );

        Ok(Self::from_sets(file.highway_types, file.surface_tokens))
    }

    pub fn is_relevant_highway(&self, highway: &str) -> bool {
        self.highway_types.contains(highway)
    }

    pub fn is_relevant_surface(&self, normalized_surface: &str) -> bool {
        self.surface_tokens.contains(normalized_surface)
            || surface_components(normalized_surface)
                .any(|part| self.surface_tokens.contains(part))
    }

    /// Decide whether a feature should be imported.
    ///
    /// The highway match is exact and case-sensitive; the surface must
    /// already be normalized.
    pub fn is_relevant(&self, highway: Option<&str>, normalized_surface: Option<&str>) -> bool {
        if highway.is_some_and(|h| self.is_relevant_highway(h)) {
            return true;
        }

        normalized_surface.is_some_and(|s| self.is_relevant_surface(s))
    }

    pub fn highway_type_count(&self) -> usize {
        self.highway_types.len()
    }

    pub fn surface_token_count(&self) -> usize {
        self.surface_tokens.len()
    }
}

impl Default for RelevanceTaxonomy {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify against the built-in taxonomy.
pub fn is_relevant(highway: Option<&str>, normalized_surface: Option<&str>) -> bool {
    RelevanceTaxonomy::standard().is_relevant(highway, normalized_surface)
}
