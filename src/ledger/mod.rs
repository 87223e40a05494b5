//! Checksum ledger: the durable record of every triage decision.
//!
//! - `checksum`: SHA-256 content hashing
//! - `record`: the persisted record and label types
//! - `store`: SQLite persistence with atomic upserts
//! - `export`: JSON / CSV dumps
//! - `lock`: single-writer run lock

mod checksum;
mod export;
mod lock;
mod record;
mod store;

pub use checksum::*;
pub use export::*;
pub use lock::*;
pub use record::*;
pub use store::*;
