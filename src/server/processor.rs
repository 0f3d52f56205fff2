use super::pool::WorkerPool;
use crate::agent::{messages::Frame, registry::ConnectionRegistry, types::AgentAddress};
use crate::rpc::envelope::{ErrorKind, RequestEnvelope, RequestKind};
use crate::transport::{InboundProcessor, Reply};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Serves one kind of request sent by an agent.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, request: &RequestEnvelope) -> anyhow::Result<Option<Value>>;
}

impl<F> RequestHandler for F
where
    F: Fn(&RequestEnvelope) -> anyhow::Result<Option<Value>> + Send + Sync,
{
    fn handle(&self, request: &RequestEnvelope) -> anyhow::Result<Option<Value>> { self(request) }
}

/// Accepts the request and answers with an empty body.
pub struct NoopHandler;

impl RequestHandler for NoopHandler {
    fn handle(&self, _request: &RequestEnvelope) -> anyhow::Result<Option<Value>> { Ok(None) }
}

#[derive(Clone)]
pub struct HandlerTable {
    handlers: HashMap<RequestKind, Arc<dyn RequestHandler>>,
}

impl HandlerTable {
    pub fn empty() -> Self { Self { handlers: HashMap::new() } }

    /// A [`NoopHandler`] for every kind.
    pub fn with_defaults() -> Self {
        let mut table = Self::empty();
        for kind in RequestKind::ALL {
            table.insert(kind, NoopHandler);
        }
        table
    }

    pub fn insert(&mut self, kind: RequestKind, handler: impl RequestHandler + 'static) { self.handlers.insert(kind, Arc::new(handler)); }

    pub fn remove(&mut self, kind: RequestKind) { self.handlers.remove(&kind); }

    pub fn get(&self, kind: RequestKind) -> Option<&Arc<dyn RequestHandler>> { self.handlers.get(&kind) }
}

impl Default for HandlerTable {
    fn default() -> Self { Self::with_defaults() }
}

/// Routes requests coming from agents to their handler on the worker pool.
pub struct RequestProcessor {
    handlers: Arc<HandlerTable>,
    registry: ConnectionRegistry,
    pool: WorkerPool,
}

impl RequestProcessor {
    pub fn new(handlers: HandlerTable, registry: ConnectionRegistry, pool: WorkerPool) -> Self {
        Self {
            handlers: Arc::new(handlers),
            registry,
            pool,
        }
    }

    pub fn shutdown(&self) {
        self.pool.shutdown();
        log::info!("[processor] request processor shutdown completed");
    }
}

impl InboundProcessor for RequestProcessor {
    fn process(&self, from: &AgentAddress, frame: Frame, reply: Reply) {
        self.registry.add(from.as_str());

        let handlers = Arc::clone(&self.handlers);
        let from = from.clone();
        self.pool.execute(move || reply(respond(&handlers, &from, frame)));
    }
}

fn error_frame(id: u64, kind: ErrorKind, message: impl Into<String>) -> Frame {
    Frame::Error {
        id,
        kind,
        message: message.into(),
    }
}

pub(crate) fn respond(handlers: &HandlerTable, from: &AgentAddress, frame: Frame) -> Frame {
    let id = frame.id();

    let request = match frame.into_request() {
        Some(Ok(request)) => request,
        Some(Err(unsupported)) => {
            log::error!("[processor] admin {unsupported} (request {id} from client: {from})");
            return error_frame(id, ErrorKind::UnsupportedRequestKind, unsupported.0);
        }
        None => {
            log::warn!("[processor] reply frame {id} from {from} has no waiting caller");
            return error_frame(id, ErrorKind::HandlerFailed, "expected a request frame");
        }
    };

    log::info!("[processor] admin request received: {} from client: {from}", request.kind);

    let Some(handler) = handlers.get(request.kind) else {
        log::error!("[processor] no handler registered for request kind {}", request.kind);
        return error_frame(id, ErrorKind::UnsupportedRequestKind, request.kind.as_str());
    };

    match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&request))) {
        Ok(Ok(body)) => Frame::Response { id, body },
        Ok(Err(err)) => {
            log::error!("[processor] {} handler failed for {from}: {err:#}", request.kind);
            error_frame(id, ErrorKind::HandlerFailed, format!("{err:#}"))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::error!("[processor] {} handler panicked for {from}: {message}", request.kind);
            error_frame(id, ErrorKind::HandlerFailed, message)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
