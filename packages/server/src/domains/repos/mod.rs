//! Repository pipeline domain: commands, handlers and the upload flow.

pub mod archive;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod upload;

pub use error::PipelineError;
pub use handlers::build_job_registry;
pub use upload::{run_upload, UploadOutcome};
