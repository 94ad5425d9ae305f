//! Engine configuration.

use rill_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Settings the pipeline builder reads from its host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Let sources apply simple top-level conditions while fetching.
    #[serde(default = "default_true")]
    pub push_optional_filters: bool,
    /// Wrap every built operator in a `Snitch`.
    #[serde(default)]
    pub instrument_operators: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            push_optional_filters: default_true(),
            instrument_operators: false,
        }
    }
}

impl EngineConfig {
    /// Parses a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::invalid_config(e.to_string()))
    }
}

fn default_true() -> bool {
    true
}
