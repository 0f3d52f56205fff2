use super::{Transport, TransportError, TransportHooks};
use crate::agent::{messages::Frame, types::AgentAddress};
use crate::rpc::codec::codec;
use crate::rpc::envelope::{RequestEnvelope, ResponseEnvelope};
use futures_util::{SinkExt, Stream, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockWriteGuard};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message},
};

type Outbound = mpsc::UnboundedSender<Message>;

struct Waiter {
    address: AgentAddress,
    reply: oneshot::Sender<ResponseEnvelope>,
}

struct Shared {
    peers: RwLock<HashMap<AgentAddress, Outbound>>,
    pending: Mutex<HashMap<u64, Waiter>>,
    shutdown: watch::Sender<bool>,
}

impl Shared {
    fn peers(&self) -> RwLockWriteGuard<'_, HashMap<AgentAddress, Outbound>> { self.peers.write().unwrap_or_else(PoisonError::into_inner) }

    fn outbound(&self, address: &AgentAddress) -> Option<Outbound> {
        self.peers.read().unwrap_or_else(PoisonError::into_inner).get(address).cloned()
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<u64, Waiter>> { self.pending.lock().unwrap_or_else(PoisonError::into_inner) }

    /// Drops the peer entry and its waiters, but only while `outbound` is
    /// still the connection registered for `address`. Returns whether it was.
    fn release(&self, address: &AgentAddress, outbound: &Outbound) -> bool {
        let mut peers = self.peers();
        if !peers.get(address).is_some_and(|current| current.same_channel(outbound)) {
            return false;
        }
        peers.remove(address);
        drop(peers);

        self.pending().retain(|_, waiter| &waiter.address != address);
        true
    }
}

/// Forgets the pending reply slot when the call finishes, times out or is dropped.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) { self.shared.pending().remove(&self.id); }
}

/// Agents connect over WebSocket and exchange [`Frame`]s as text messages.
pub struct WsTransport {
    shared: Arc<Shared>,
    accept: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                peers: RwLock::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                shutdown: watch::channel(false).0,
            }),
            accept: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> { *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner) }
}

impl Default for WsTransport {
    fn default() -> Self { Self::new() }
}

impl Transport for WsTransport {
    async fn start(&self, host: &str, port: u16, hooks: TransportHooks) -> Result<(), TransportError> {
        let listener = TcpListener::bind((host, port)).await?;
        let local = listener.local_addr()?;
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner) = Some(local);
        self.shared.shutdown.send_replace(false);

        log::info!("[transport] listening for agents on ws://{local}");
        let handle = tokio::spawn(accept_loop(listener, Arc::clone(&self.shared), hooks));

        if let Some(previous) = self.accept.lock().unwrap_or_else(PoisonError::into_inner).replace(handle) {
            previous.abort();
        }

        Ok(())
    }

    async fn stop(&self) {
        self.shared.shutdown.send_replace(true);

        let accept = self.accept.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(accept) = accept {
            accept.abort();
            log::info!("[transport] stopped accepting agents");
        }
    }

    async fn call(&self, address: &AgentAddress, envelope: RequestEnvelope, timeout: Duration) -> Result<ResponseEnvelope, TransportError> {
        let outbound = self.shared.outbound(address).ok_or_else(|| TransportError::NotConnected(address.clone()))?;

        let id = envelope.id;
        let text = codec().encode(&Frame::from(envelope)).map_err(|err| TransportError::Codec(err.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.shared.pending().insert(
            id,
            Waiter {
                address: address.clone(),
                reply: tx,
            },
        );
        let _guard = PendingGuard {
            shared: self.shared.as_ref(),
            id,
        };

        outbound.send(Message::Text(text)).map_err(|_| TransportError::Closed)?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>, hooks: TransportHooks) {
    let mut shutdown = shared.shutdown.subscribe();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(serve_connection(stream, AgentAddress::from(peer), Arc::clone(&shared), hooks.clone()));
                }
                Err(err) => log::warn!("[transport] accept failed: {err}"),
            },
            _ = shutdown.changed() => break,
        }
    }
}

async fn serve_connection(stream: TcpStream, address: AgentAddress, shared: Arc<Shared>, hooks: TransportHooks) {
    let socket = match accept_async(stream).await {
        Ok(socket) => socket,
        Err(err) => {
            log::warn!("[transport] websocket handshake with {address} failed: {err}");
            return;
        }
    };

    let (mut write, mut read) = socket.split();
    let (outbound, mut queue) = mpsc::unbounded_channel::<Message>();

    tokio::spawn(async move {
        while let Some(message) = queue.recv().await {
            let closing = matches!(message, Message::Close(_));
            if write.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    let mut shutdown = shared.shutdown.subscribe();
    shared.peers().insert(address.clone(), outbound.clone());
    hooks.on_connect.on_event(address.as_str());

    let stopped = *shutdown.borrow_and_update();
    if !stopped {
        pump(&mut read, &mut shutdown, &shared, &hooks, &address, &outbound).await;
    }

    let _ = outbound.send(Message::Close(None));
    if shared.release(&address, &outbound) {
        hooks.on_disconnect.on_event(address.as_str());
    } else {
        log::debug!("[transport] {address} reconnected before the old connection closed");
    }
}

async fn pump<S>(read: &mut S, shutdown: &mut watch::Receiver<bool>, shared: &Shared, hooks: &TransportHooks, address: &AgentAddress, outbound: &Outbound)
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        let message = tokio::select! {
            message = read.next() => message,
            _ = shutdown.changed() => return,
        };

        match message {
            Some(Ok(Message::Text(text))) => receive(shared, hooks, address, outbound, &text),
            Some(Ok(Message::Close(_))) | None => return,
            Some(Err(err)) => {
                log::warn!("[transport] error receiving from {address}: {err}");
                return;
            }
            Some(Ok(_)) => {}
        }
    }
}

fn receive(shared: &Shared, hooks: &TransportHooks, address: &AgentAddress, outbound: &Outbound, text: &str) {
    let frame = match codec().decode(text) {
        Ok(frame) => frame,
        Err(err) => {
            log::warn!("[transport] dropping unreadable frame from {address}: {err}");
            return;
        }
    };

    if matches!(frame, Frame::Request { .. }) {
        let outbound = outbound.clone();
        let reply = Box::new(move |frame: Frame| match codec().encode(&frame) {
            Ok(text) => {
                let _ = outbound.send(Message::Text(text));
            }
            Err(err) => log::error!("[transport] cannot encode reply {}: {err}", frame.id()),
        });
        hooks.inbound.process(address, frame, reply);
        return;
    }

    let id = frame.id();
    let waiter = shared.pending().remove(&id);
    match (waiter, frame.into_response()) {
        (Some(waiter), Some(response)) => {
            let _ = waiter.reply.send(response);
        }
        _ => log::debug!("[transport] discarding reply {id} from {address}, no caller is waiting"),
    }
}
