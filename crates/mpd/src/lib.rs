// MPEG-DASH manifest handling: parsing the manifest and planning segment downloads
pub mod duration;
pub mod error;
pub mod manifest;
pub mod plan;
pub mod template;

// Export common types for ease of use
pub use error::{ManifestError, PlanError, TemplateError};
pub use manifest::Manifest;
pub use plan::{SegmentPlan, SegmentSequence, SegmentSpec, sanitize_file_name};
