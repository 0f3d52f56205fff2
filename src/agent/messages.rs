use crate::rpc::envelope::{ErrorKind, RemoteError, RequestEnvelope, RequestKind, ResponseEnvelope, UnsupportedKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message protocol between the admin server and its agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Request for the peer to run `kind`. The kind stays a plain string on the
    /// wire so that an unknown one can still be answered.
    Request {
        id: u64,
        kind: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
    },
    /// Successful reply
    Response {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
    },
    /// Failed reply
    Error { id: u64, kind: ErrorKind, message: String },
}

impl Frame {
    pub fn id(&self) -> u64 {
        match self {
            Frame::Request { id, .. } | Frame::Response { id, .. } | Frame::Error { id, .. } => *id,
        }
    }

    /// `None` for reply frames.
    pub fn into_request(self) -> Option<Result<RequestEnvelope, UnsupportedKind>> {
        match self {
            Frame::Request { id, kind, body } => Some(kind.parse::<RequestKind>().map(|kind| RequestEnvelope::new(id, kind, body))),
            _ => None,
        }
    }

    /// `None` for request frames.
    pub fn into_response(self) -> Option<ResponseEnvelope> {
        match self {
            Frame::Response { id, body } => Some(ResponseEnvelope::ok(id, body)),
            Frame::Error { id, kind, message } => Some(ResponseEnvelope::err(id, RemoteError { kind, message })),
            Frame::Request { .. } => None,
        }
    }
}

impl From<RequestEnvelope> for Frame {
    fn from(envelope: RequestEnvelope) -> Self {
        Frame::Request {
            id: envelope.id,
            kind: envelope.kind.as_str().to_string(),
            body: envelope.body,
        }
    }
}

impl From<ResponseEnvelope> for Frame {
    fn from(envelope: ResponseEnvelope) -> Self {
        match envelope.result {
            Ok(body) => Frame::Response { id: envelope.id, body },
            Err(error) => Frame::Error {
                id: envelope.id,
                kind: error.kind,
                message: error.message,
            },
        }
    }
}
