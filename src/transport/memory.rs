//! In-process transport. Agents are async closures registered under an
//! address; every frame still goes through the installed codec so calls see
//! the same encoding as on a socket.

use super::{Transport, TransportError, TransportHooks};
use crate::agent::{messages::Frame, types::AgentAddress};
use crate::rpc::codec::codec;
use crate::rpc::envelope::{RemoteError, RequestEnvelope, ResponseEnvelope};
use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::oneshot;

type Agent = Arc<dyn Fn(RequestEnvelope) -> BoxFuture<'static, Result<Option<Value>, RemoteError>> + Send + Sync>;

#[derive(Default)]
pub struct MemoryTransport {
    agents: RwLock<HashMap<AgentAddress, Agent>>,
    hooks: RwLock<Option<TransportHooks>>,
    calls: AtomicUsize,
}

fn codec_error(err: impl ToString) -> TransportError { TransportError::Codec(err.to_string()) }

impl MemoryTransport {
    pub fn new() -> Self { Self::default() }

    fn hooks(&self) -> Option<TransportHooks> { self.hooks.read().unwrap_or_else(PoisonError::into_inner).clone() }

    /// Attaches an agent and fires the connect event with the raw address.
    pub fn connect<F, Fut>(&self, address: &str, agent: F)
    where
        F: Fn(RequestEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>, RemoteError>> + Send + 'static,
    {
        if let Some(parsed) = AgentAddress::parse(address) {
            let agent: Agent = Arc::new(move |request: RequestEnvelope| agent(request).boxed());
            self.agents.write().unwrap_or_else(PoisonError::into_inner).insert(parsed, agent);
        }

        if let Some(hooks) = self.hooks() {
            hooks.on_connect.on_event(address);
        }
    }

    /// Detaches an agent and fires the disconnect event. Calls already in
    /// flight to it still complete.
    pub fn disconnect(&self, address: &str) {
        if let Some(parsed) = AgentAddress::parse(address) {
            self.agents.write().unwrap_or_else(PoisonError::into_inner).remove(&parsed);
        }

        if let Some(hooks) = self.hooks() {
            hooks.on_disconnect.on_event(address);
        }
    }

    /// Number of outbound calls attempted so far.
    pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }

    /// Delivers `frame` to the server as if agent `from` had sent it and waits for the reply.
    pub async fn send_frame(&self, from: &str, frame: Frame) -> Result<Frame, TransportError> {
        let hooks = self.hooks().ok_or(TransportError::Closed)?;
        let from = AgentAddress::parse(from).ok_or_else(|| TransportError::Io("blank sender address".into()))?;

        let text = codec().encode(&frame).map_err(codec_error)?;
        let frame = codec().decode(&text).map_err(codec_error)?;

        let (tx, rx) = oneshot::channel();
        hooks.inbound.process(
            &from,
            frame,
            Box::new(move |reply: Frame| {
                let _ = tx.send(reply);
            }),
        );

        rx.await.map_err(|_| TransportError::Closed)
    }
}

impl Transport for MemoryTransport {
    async fn start(&self, _host: &str, _port: u16, hooks: TransportHooks) -> Result<(), TransportError> {
        *self.hooks.write().unwrap_or_else(PoisonError::into_inner) = Some(hooks);
        Ok(())
    }

    async fn stop(&self) {
        self.hooks.write().unwrap_or_else(PoisonError::into_inner).take();
        self.agents.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    async fn call(&self, address: &AgentAddress, envelope: RequestEnvelope, timeout: Duration) -> Result<ResponseEnvelope, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let agent = self
            .agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
            .ok_or_else(|| TransportError::NotConnected(address.clone()))?;

        let text = codec().encode(&Frame::from(envelope)).map_err(codec_error)?;
        let request = match codec().decode(&text).map_err(codec_error)?.into_request() {
            Some(Ok(request)) => request,
            Some(Err(unsupported)) => return Err(codec_error(unsupported)),
            None => return Err(codec_error("request encoded as a reply frame")),
        };

        let id = request.id;
        let result = tokio::time::timeout(timeout, agent(request)).await.map_err(|_| TransportError::Timeout(timeout))?;

        let text = codec().encode(&Frame::from(ResponseEnvelope { id, result })).map_err(codec_error)?;
        codec()
            .decode(&text)
            .map_err(codec_error)?
            .into_response()
            .ok_or_else(|| codec_error("agent answered with a request frame"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::envelope::RequestKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_echo_round_trip() {
        let transport = MemoryTransport::new();
        transport.connect("a1:1", |request: RequestEnvelope| async move { Ok(request.body) });

        let body = json!({"pools": [{"name": "io", "core": 4, "ratio": 0.25}], "tags": null});
        let address = AgentAddress::parse("a1:1").unwrap();
        let response = transport
            .call(&address, RequestEnvelope::new(11, RequestKind::LogManage, Some(body.clone())), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(response, ResponseEnvelope::ok(11, Some(body)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_agent() {
        let transport = MemoryTransport::new();
        let address = AgentAddress::parse("ghost:1").unwrap();
        let err = transport
            .call(&address, RequestEnvelope::new(1, RequestKind::ExecutorMonitor, None), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::NotConnected(address));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_agent_times_out() {
        let transport = MemoryTransport::new();
        transport.connect("slow:1", |_request: RequestEnvelope| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        });

        let address = AgentAddress::parse("slow:1").unwrap();
        let err = transport
            .call(&address, RequestEnvelope::new(1, RequestKind::ExecutorMonitor, None), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout(Duration::from_secs(2)));
    }
}
