use std::path::PathBuf;

use crate::importer::extractor::{Framing, DEFAULT_CHUNK_SIZE};
use crate::importer::loader::DEFAULT_BATCH_SIZE;
use crate::importer::progress::DEFAULT_REPORT_INTERVAL;

/// Settings for one import run.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub input: PathBuf,
    pub framing: Framing,
    /// Read size for brace framing.
    pub chunk_size: usize,
    pub batch_size: usize,
    /// Lines between progress reports; 0 disables reporting.
    pub report_every: u64,
    /// Known or assumed total line count, used for the ETA.
    pub expected_lines: Option<u64>,
}

impl ImportConfig {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            framing: Framing::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            report_every: DEFAULT_REPORT_INTERVAL,
            expected_lines: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ImportConfig::new("roads.geojson");
        assert_eq!(config.input, PathBuf::from("roads.geojson"));
        assert_eq!(config.framing, Framing::Lines);
        assert_eq!(config.batch_size, 5000);
        assert_eq!(config.report_every, 50_000);
        assert_eq!(config.expected_lines, None);
    }
}
