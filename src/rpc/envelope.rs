use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Operations an agent knows how to serve. Dispatch never looks inside;
/// the receiving side routes on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    ExecutorMonitor,
    ExecutorRefresh,
    AlarmManage,
    LogManage,
}

impl RequestKind {
    pub const ALL: [RequestKind; 4] = [Self::ExecutorMonitor, Self::ExecutorRefresh, Self::AlarmManage, Self::LogManage];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExecutorMonitor => "executor_monitor",
            Self::ExecutorRefresh => "executor_refresh",
            Self::AlarmManage => "alarm_manage",
            Self::LogManage => "log_manage",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("request kind '{0}' is not supported")]
pub struct UnsupportedKind(pub String);

impl FromStr for RequestKind {
    type Err = UnsupportedKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s).ok_or_else(|| UnsupportedKind(s.to_string()))
    }
}

/// One outbound request. `id` is unique per outstanding call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    pub id: u64,
    pub kind: RequestKind,
    pub body: Option<Value>,
}

impl RequestEnvelope {
    pub fn new(id: u64, kind: RequestKind, body: Option<Value>) -> Self { Self { id, kind, body } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedRequestKind,
    HandlerFailed,
}

/// Failure reported by the peer that served the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self { Self { kind, message: message.into() } }
}

/// Reply correlated to a [`RequestEnvelope`] by `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub id: u64,
    pub result: Result<Option<Value>, RemoteError>,
}

impl ResponseEnvelope {
    pub fn ok(id: u64, body: Option<Value>) -> Self { Self { id, result: Ok(body) } }

    pub fn err(id: u64, error: RemoteError) -> Self { Self { id, result: Err(error) } }
}
