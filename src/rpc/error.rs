use crate::rpc::envelope::{ErrorKind, RemoteError};
use crate::transport::TransportError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("agent {0} is not connected")]
    UnknownTarget(String),
    #[error("no clients connected")]
    NoClientsConnected,
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response body: {0}")]
    Deserialization(String),
    #[error("request kind not supported by agent: {0}")]
    UnsupportedRequestKind(String),
}

impl From<TransportError> for DispatchError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(after) => DispatchError::Timeout(after),
            other => DispatchError::Transport(other.to_string()),
        }
    }
}

impl From<RemoteError> for DispatchError {
    fn from(err: RemoteError) -> Self {
        match err.kind {
            ErrorKind::UnsupportedRequestKind => DispatchError::UnsupportedRequestKind(err.message),
            ErrorKind::HandlerFailed => DispatchError::Transport(format!("agent handler failed: {}", err.message)),
        }
    }
}

/// What one agent produced for one dispatched call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<R> {
    Success(R),
    Failure(DispatchError),
    Timeout,
}

impl<R> CallOutcome<R> {
    pub fn is_success(&self) -> bool { matches!(self, CallOutcome::Success(_)) }

    pub fn is_timeout(&self) -> bool { matches!(self, CallOutcome::Timeout) }

    pub fn success(&self) -> Option<&R> {
        match self {
            CallOutcome::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_success(self) -> Option<R> {
        match self {
            CallOutcome::Success(value) => Some(value),
            _ => None,
        }
    }
}

impl<R> From<Result<R, DispatchError>> for CallOutcome<R> {
    fn from(result: Result<R, DispatchError>) -> Self {
        match result {
            Ok(value) => CallOutcome::Success(value),
            Err(DispatchError::Timeout(_)) => CallOutcome::Timeout,
            Err(err) => CallOutcome::Failure(err),
        }
    }
}
