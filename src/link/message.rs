// src/link/message.rs

//! Messages exchanged with the Orchestrator.
//!
//! Payloads are JSON objects tagged by a `"type"` field:
//!
//! ```json
//! {"type": "submit_job", "job_id": "j1", "safe_object_id": "so1", "expected_parameters": 2}
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::types::{JobId, SafeObjectId, SetupPayload, ValueId};

/// Identity presented on `connect`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// One entry of a `set_parameters` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterAssignment {
    pub parameter_id: String,
    pub value_id: ValueId,
    #[serde(default = "one")]
    pub values_expected: usize,
    #[serde(default)]
    pub value_index: usize,
}

fn one() -> usize {
    1
}

/// Orchestrator → engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Connect {
        credentials: Credentials,
    },
    PushSafeObject {
        safe_object_id: SafeObjectId,
        #[serde(default)]
        payload: SetupPayload,
    },
    PushData {
        value_id: ValueId,
        #[serde(with = "b64")]
        data: Vec<u8>,
    },
    PullData {
        value_id: ValueId,
    },
    SubmitJob {
        job_id: JobId,
        safe_object_id: SafeObjectId,
        /// Distinct parameters the job takes. Required: a job whose count is
        /// unknown never launches.
        expected_parameters: usize,
    },
    SetParameters {
        job_id: JobId,
        parameters: Vec<ParameterAssignment>,
    },
    HaltAllJobs,
    HeartBeatPong,
    VmShutdown,
}

impl Request {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Connect { .. } => "connect",
            Request::PushSafeObject { .. } => "push_safe_object",
            Request::PushData { .. } => "push_data",
            Request::PullData { .. } => "pull_data",
            Request::SubmitJob { .. } => "submit_job",
            Request::SetParameters { .. } => "set_parameters",
            Request::HaltAllJobs => "halt_all_jobs",
            Request::HeartBeatPong => "heart_beat_pong",
            Request::VmShutdown => "vm_shutdown",
        }
    }
}

/// Engine → Orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    ConnectAck {
        accepted: bool,
        #[serde(default)]
        catalog: BTreeMap<String, String>,
    },
    PostValue {
        value_id: ValueId,
        #[serde(with = "b64")]
        data: Vec<u8>,
    },
    JobDone {
        job_id: JobId,
    },
    JobFail {
        job_id: JobId,
        reason: String,
    },
    HeartBeatPing {
        idle_ms: u64,
    },
    VmShutdown,
}

impl Signal {
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::ConnectAck { .. } => "connect_ack",
            Signal::PostValue { .. } => "post_value",
            Signal::JobDone { .. } => "job_done",
            Signal::JobFail { .. } => "job_fail",
            Signal::HeartBeatPing { .. } => "heart_beat_ping",
            Signal::VmShutdown => "vm_shutdown",
        }
    }
}

pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(message)?)
}

pub fn decode<T: for<'de> Deserialize<'de>>(payload: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(payload)?)
}

mod b64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}
