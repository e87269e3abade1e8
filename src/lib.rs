pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod importer;

pub use config::ImportConfig;
pub use error::PipelineError;
