//! doc-triager: sort documents by how long they stay useful.
//!
//! Files under a source tree are checksummed, deduplicated against a SQLite
//! ledger, converted to text, classified by an LLM as `evergreen`, `temporal`
//! or `unknown`, and moved into a matching subtree of the output directory.

pub mod ai;
pub mod config;
pub mod extract;
pub mod ledger;
pub mod logging;
pub mod pipeline;
pub mod relocate;
pub mod scanner;

pub use config::Config;
pub use ledger::{Ledger, Triage, TriageRecord};
pub use pipeline::{Orchestrator, RunOptions, RunSummary, TriageError};
