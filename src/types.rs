use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a job as chosen by the Orchestrator.
pub type JobId = String;

/// Identifier of a safe object (task template).
pub type SafeObjectId = String;

/// Identifier of a value; doubles as the file name of its data and marker.
pub type ValueId = String;

/// Opaque setup data for a safe object, stored verbatim.
pub type SetupPayload = serde_json::Map<String, serde_json::Value>;

/// Terminal outcome of a job as reported by the execution collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Done,
    Failed(String),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Done)
    }
}

/// Transport used for the Orchestrator link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Unix,
}

impl Default for Transport {
    fn default() -> Self {
        Transport::Tcp
    }
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tcp" => Ok(Transport::Tcp),
            "unix" => Ok(Transport::Unix),
            other => Err(format!(
                "invalid transport: {other} (expected \"tcp\" or \"unix\")"
            )),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tcp => f.write_str("tcp"),
            Transport::Unix => f.write_str("unix"),
        }
    }
}
