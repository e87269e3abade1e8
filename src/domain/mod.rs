pub mod road;
pub mod surface;
pub mod taxonomy;

pub use road::{ImportedRecord, RawFeature, RecordRejection, SurfaceCandidate, SurfaceUpdate};
pub use surface::{extract_surface, extract_tag, normalize_surface};
pub use taxonomy::{is_relevant, RelevanceTaxonomy};
