//! Triage orchestration: scan, dedup, extract, classify, relocate, record

mod error;
mod orchestrator;
mod reclassify;
mod summary;


pub use error::TriageError;
pub use orchestrator::{Orchestrator, PipelineSettings, RunOptions};
pub use summary::RunSummary;
