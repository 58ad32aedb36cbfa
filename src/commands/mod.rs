// ABOUTME: Command implementations for each distribution phase
// ABOUTME: Exports the export, reconstruct, and validate commands

pub mod export;
pub mod reconstruct;
pub mod validate;

pub use export::{export, ExportOptions};
pub use reconstruct::{reconstruct, PipelineState, ReconstructOptions, ReconstructSummary};
pub use validate::{validate, ValidateOptions};
