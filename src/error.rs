use std::io;
use thiserror::Error;

use crate::db::SinkError;
use crate::importer::ImportStage;

/// Fatal import failures. Per-record problems never surface here; they are
/// absorbed into the run counters.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("sink failure during {stage}: {source}")]
    Sink {
        stage: ImportStage,
        #[source]
        source: SinkError,
    },
    #[error("input failure during {stage}: {source}")]
    Input {
        stage: ImportStage,
        #[source]
        source: io::Error,
    },
}

impl PipelineError {
    pub fn sink(stage: ImportStage) -> impl FnOnce(SinkError) -> Self {
        move |source| PipelineError::Sink { stage, source }
    }

    pub fn input(stage: ImportStage) -> impl FnOnce(io::Error) -> Self {
        move |source| PipelineError::Input { stage, source }
    }

    pub fn stage(&self) -> ImportStage {
        match self {
            PipelineError::Sink { stage, .. } | PipelineError::Input { stage, .. } => *stage,
        }
    }
}
