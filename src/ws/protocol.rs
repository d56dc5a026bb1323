//! WebSocket protocol message definitions
//! These are the wire types for client-server communication.
//!
//! Every frame is a JSON text frame shaped `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};

use crate::relay::ConnectionStats;
use crate::vehicle::{ControlCommand, VehicleState};

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMsg {
    /// Declare the client's role (mobile, tablet, web, test)
    RegisterClient(String),

    /// Operator control change
    ControlInput(ControlCommand),

    /// Ping for latency measurement; the payload is optional
    Ping(Option<PingPayload>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingPayload {
    /// Client timestamp, echoed back in the pong
    #[serde(default)]
    pub t: Option<u64>,
}

impl ClientMsg {
    /// Parse a text frame. Events sent without a payload, such as a bare
    /// `{"event":"ping"}`, are read as carrying `null` data.
    pub fn from_text(text: &str) -> serde_json::Result<Self> {
        let mut frame: serde_json::Value = serde_json::from_str(text)?;
        if let Some(fields) = frame.as_object_mut() {
            fields.entry("data").or_insert(serde_json::Value::Null);
        }
        serde_json::from_value(frame)
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMsg {
    /// Full vehicle state, after every mutation and tick
    VehicleUpdate(VehicleState),

    /// Live connection counts per role
    ConnectionStats(ConnectionStats),

    /// Rejected input, sent only to the offending connection
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp, if one was sent
        #[serde(skip_serializing_if = "Option::is_none")]
        t: Option<u64>,
    },
}

impl ServerMsg {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}
