//! Persistable engine state.
//!
//! The engine keeps its authoritative state in memory; an external store may
//! save an [`EngineSnapshot`] and hand it back through
//! `Coordinator::restore` after a process restart.

use crate::agent::Agent;
use crate::decision::Decision;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Agents and retained decisions at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    /// Wall-clock time the snapshot was taken (ms since epoch)
    pub taken_at_ms: u64,

    /// Agents in registration order
    pub agents: Vec<Agent>,

    /// Retained decisions, oldest first
    pub decisions: Vec<Decision>,
}

impl EngineSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
