// src/audit.rs

//! Audit collaborator: a record of security-relevant lifecycle events.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

/// Channel bits an audit event is routed to.
pub const CHANNEL_CONNECTION: u32 = 0b0001;
pub const CHANNEL_LIFECYCLE: u32 = 0b0010;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Success,
    Failure,
    Info,
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditEventType::Success => f.write_str("success"),
            AuditEventType::Failure => f.write_str("failure"),
            AuditEventType::Info => f.write_str("info"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub name: String,
    pub channel_mask: u32,
    pub event_type: AuditEventType,
    pub payload: Value,
}

impl AuditEvent {
    pub fn new(name: &str, channel_mask: u32, event_type: AuditEventType, payload: Value) -> Self {
        Self {
            name: name.to_string(),
            channel_mask,
            event_type,
            payload,
        }
    }
}

pub trait AuditSink: Send + Sync + fmt::Debug {
    fn record(&self, event: AuditEvent);
}

/// Writes audit events to the `audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        info!(
            target: "audit",
            event = %event.name,
            channels = event.channel_mask,
            outcome = %event.event_type,
            payload = %event.payload,
            "audit"
        );
    }
}
