pub mod events;
pub mod pool;
pub mod processor;

use crate::agent::registry::ConnectionRegistry;
use crate::agent::types::{AgentAddress, ClientSummary};
use crate::config::structs::Config;
use crate::rpc::codec::{self, FrameCodec, JsonCodec};
use crate::rpc::dispatch::Dispatcher;
use crate::rpc::envelope::RequestKind;
use crate::rpc::error::{CallOutcome, DispatchError};
use crate::transport::{Transport, TransportHooks};

use anyhow::{Context, Result};
use events::{ConnectProcessor, DisconnectProcessor};
use pool::WorkerPool;
use processor::{HandlerTable, RequestHandler, RequestProcessor};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

const WORKER_NAME: &str = "tpadmin-worker";

pub struct AdminServerBuilder<T: Transport> {
    transport: T,
    config: Config,
    handlers: HandlerTable,
    codec: Option<Box<dyn FrameCodec>>,
}

impl<T: Transport> AdminServerBuilder<T> {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Replaces the handler for requests of `kind` sent by agents.
    pub fn handler(mut self, kind: RequestKind, handler: impl RequestHandler + 'static) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn handlers(mut self, handlers: HandlerTable) -> Self {
        self.handlers = handlers;
        self
    }

    /// Codec to install process-wide at start. Ignored if one is already installed.
    pub fn codec(mut self, codec: Box<dyn FrameCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub async fn start(self) -> Result<AdminServer<T>> {
        let codec = self.codec.unwrap_or_else(|| Box::new(JsonCodec));
        if !codec::install(codec) {
            log::debug!("[server] keeping already installed {} codec", codec::codec().name());
        }

        let registry = ConnectionRegistry::new();
        let workers = &self.config.workers;
        let pool = WorkerPool::new(WORKER_NAME, workers.threads, workers.queue).context("Failed to spawn request workers")?;
        let processor = Arc::new(RequestProcessor::new(self.handlers, registry.clone(), pool));

        let hooks = TransportHooks {
            on_connect: Arc::new(ConnectProcessor::new(registry.clone())),
            on_disconnect: Arc::new(DisconnectProcessor::new(registry.clone())),
            inbound: processor.clone(),
        };

        let transport = Arc::new(self.transport);
        let server = &self.config.server;
        if let Err(err) = transport.start(&server.host, server.port, hooks).await {
            processor.shutdown();
            return Err(err).with_context(|| format!("Failed to start admin server on {}:{}", server.host, server.port));
        }

        log::info!("[server] admin server started, port: {}", server.port);

        Ok(AdminServer {
            dispatcher: Dispatcher::new(registry.clone(), Arc::clone(&transport)),
            config: self.config,
            registry,
            transport,
            processor,
        })
    }
}

/// Keeps track of connected agents and sends them requests.
pub struct AdminServer<T: Transport> {
    config: Config,
    registry: ConnectionRegistry,
    transport: Arc<T>,
    dispatcher: Dispatcher<T>,
    processor: Arc<RequestProcessor>,
}

impl<T: Transport> AdminServer<T> {
    pub fn builder(transport: T) -> AdminServerBuilder<T> {
        AdminServerBuilder {
            transport,
            config: Config::default(),
            handlers: HandlerTable::with_defaults(),
            codec: None,
        }
    }

    pub fn config(&self) -> &Config { &self.config }

    pub fn transport(&self) -> &T { &self.transport }

    /// Dispatcher for callers that need timeouts other than the configured ones.
    pub fn dispatcher(&self) -> &Dispatcher<T> { &self.dispatcher }

    pub fn connected_agents(&self) -> BTreeSet<AgentAddress> { self.registry.snapshot().into_iter().collect() }

    pub fn connected_count(&self) -> usize { self.registry.count() }

    pub fn client_info(&self) -> ClientSummary { ClientSummary::new(self.registry.snapshot()) }

    pub async fn unicast_to_address<R: DeserializeOwned>(&self, address: &str, kind: RequestKind, body: Option<Value>) -> Result<R, DispatchError> {
        self.dispatcher
            .unicast_to_address(address, kind, body, self.config.dispatch.call_timeout())
            .await
    }

    pub async fn unicast_to_first_available<R: DeserializeOwned>(&self, kind: RequestKind, body: Option<Value>) -> Result<R, DispatchError> {
        self.dispatcher
            .unicast_to_first_available(kind, body, self.config.dispatch.call_timeout())
            .await
    }

    pub async fn broadcast_to_all<R>(&self, kind: RequestKind, body: Option<Value>) -> Vec<(AgentAddress, CallOutcome<R>)>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let dispatch = &self.config.dispatch;
        self.dispatcher
            .broadcast_to_all(kind, body, dispatch.call_timeout(), dispatch.aggregate_timeout())
            .await
    }

    /// Stops the transport, drains the request workers and forgets every
    /// agent. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.transport.stop().await;

        let processor = Arc::clone(&self.processor);
        if let Err(err) = tokio::task::spawn_blocking(move || processor.shutdown()).await {
            log::warn!("[server] failed to release request workers: {err}");
        }

        self.registry.clear();
        log::info!("[server] admin server shutdown completed");
    }
}
