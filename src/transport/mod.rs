pub mod memory;
pub mod ws;

use crate::agent::{messages::Frame, types::AgentAddress};
use crate::rpc::envelope::{RequestEnvelope, ResponseEnvelope};
use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("no connection to {0}")]
    NotConnected(AgentAddress),
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("connection closed before the reply arrived")]
    Closed,
    #[error("i/o error: {0}")]
    Io(String),
    #[error("{0}")]
    Codec(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self { TransportError::Io(err.to_string()) }
}

/// Notified when an agent connects or disconnects. Fired once per transition.
pub trait ConnectionEventProcessor: Send + Sync {
    fn on_event(&self, address: &str);
}

/// Sends the reply frame back down the connection the request came from.
pub type Reply = Box<dyn FnOnce(Frame) + Send>;

/// Receives every request frame an agent sends to the server.
pub trait InboundProcessor: Send + Sync {
    fn process(&self, from: &AgentAddress, frame: Frame, reply: Reply);
}

/// Everything a transport calls back into, handed over at start.
#[derive(Clone)]
pub struct TransportHooks {
    pub on_connect: Arc<dyn ConnectionEventProcessor>,
    pub on_disconnect: Arc<dyn ConnectionEventProcessor>,
    pub inbound: Arc<dyn InboundProcessor>,
}

/// Connection-oriented RPC transport the admin server runs on.
pub trait Transport: Send + Sync + 'static {
    /// Starts accepting agents on `host:port`.
    fn start(&self, host: &str, port: u16, hooks: TransportHooks) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Stops accepting and drops live connections. Safe to call more than once.
    fn stop(&self) -> impl Future<Output = ()> + Send;

    /// Sends `envelope` to `address` and waits at most `timeout` for the correlated reply.
    fn call(
        &self,
        address: &AgentAddress,
        envelope: RequestEnvelope,
        timeout: Duration,
    ) -> impl Future<Output = Result<ResponseEnvelope, TransportError>> + Send;
}
