//! Data structures persisted in the triage ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Durability-of-value label assigned to a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Triage {
    /// Retains value indefinitely
    Evergreen,
    /// Value decays with time
    Temporal,
    /// Not enough signal, low confidence, or a failure along the way
    Unknown,
}

impl Triage {
    pub const ALL: [Triage; 3] = [Triage::Evergreen, Triage::Temporal, Triage::Unknown];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Evergreen => "evergreen",
            Self::Temporal => "temporal",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Triage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Triage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "evergreen" => Ok(Self::Evergreen),
            "temporal" => Ok(Self::Temporal),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("Unknown triage label: {}", other)),
        }
    }
}

/// One row per distinct content checksum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageRecord {
    /// Where the file was found when it was processed
    pub source_path: String,
    /// Where the file was moved to; `None` until a physical move succeeded
    pub destination_path: Option<String>,
    /// Path relative to the scan root, reused for later relocations
    pub relative_path: String,
    pub checksum: String,
    pub file_size: u64,
    /// Extension including the leading dot (e.g. ".pdf"), empty if none
    pub file_extension: String,
    pub triage: Triage,
    /// `None` only when the document was never successfully classified
    pub confidence: Option<f64>,
    pub reason: String,
    pub topics: Vec<String>,
    pub llm_provider: String,
    pub llm_model: String,
    pub extracted_text_length: usize,
    pub truncated: bool,
    pub error_message: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl TriageRecord {
    /// Whether the recorded file was physically relocated
    pub fn is_relocated(&self) -> bool {
        self.destination_path.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triage_round_trips_through_str() {
        for triage in Triage::ALL {
            assert_eq!(triage.as_str().parse::<Triage>().unwrap(), triage);
        }
        assert_eq!("  Evergreen ".parse::<Triage>().unwrap(), Triage::Evergreen);
        assert!("archived".parse::<Triage>().is_err());
    }

    #[test]
    fn test_triage_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Triage::Temporal).unwrap(), "\"temporal\"");
    }
}
