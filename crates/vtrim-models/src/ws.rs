//! WebSocket message types for the job status socket.
//!
//! Lifecycle events travel as [`crate::JobEvent`]; the messages here cover
//! the socket's own control traffic. Both share the `type` tag.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::submission::SubmitRequest;

/// Control messages sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsServerMessage {
    /// First message on every socket
    Connected {
        #[serde(rename = "connectionId")]
        connection_id: String,
    },

    /// Submission rejected before enqueue
    Rejected {
        reason: String,
        message: String,
    },

    /// Protocol or server error
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },

    Pong,
}

impl WsServerMessage {
    pub fn connected(connection_id: impl Into<String>) -> Self {
        WsServerMessage::Connected {
            connection_id: connection_id.into(),
        }
    }

    pub fn rejected(reason: impl Into<String>, message: impl Into<String>) -> Self {
        WsServerMessage::Rejected {
            reason: reason.into(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        WsServerMessage::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Messages accepted from clients.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsClientMessage {
    /// Submit a trim job on this connection
    Submit(SubmitRequest),
    Ping,
}
