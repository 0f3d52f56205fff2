use super::envelope::{RequestEnvelope, RequestKind};
use super::error::{CallOutcome, DispatchError};
use super::id::IdGenerator;
use crate::agent::registry::{ConnectionRegistry, NOT_CONNECTED};
use crate::agent::types::AgentAddress;
use crate::transport::Transport;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout, timeout_at};

const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Sends requests to connected agents: one named agent, any agent, or all of them.
pub struct Dispatcher<T: Transport> {
    registry: ConnectionRegistry,
    transport: Arc<T>,
    ids: IdGenerator,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(registry: ConnectionRegistry, transport: Arc<T>) -> Self {
        Self {
            registry,
            transport,
            ids: IdGenerator::default(),
        }
    }

    fn envelope(&self, kind: RequestKind, body: Option<Value>) -> RequestEnvelope { RequestEnvelope::new(self.ids.next_id(), kind, body) }

    /// Calls the agent at `address`, which must be connected right now.
    pub async fn unicast_to_address<R: DeserializeOwned>(
        &self,
        address: &str,
        kind: RequestKind,
        body: Option<Value>,
        per_call: Duration,
    ) -> Result<R, DispatchError> {
        let target = AgentAddress::parse(address)
            .filter(|target| self.registry.contains(target))
            .ok_or_else(|| DispatchError::UnknownTarget(address.trim().to_string()))?;

        exchange(self.transport.as_ref(), &target, self.envelope(kind, body), per_call).await
    }

    /// Calls whichever agent the registry picks. Kept for single-agent setups;
    /// the choice is arbitrary, not balanced.
    pub async fn unicast_to_first_available<R: DeserializeOwned>(
        &self,
        kind: RequestKind,
        body: Option<Value>,
        per_call: Duration,
    ) -> Result<R, DispatchError> {
        let picked = self.registry.pick_one();
        if picked == NOT_CONNECTED {
            return Err(DispatchError::NoClientsConnected);
        }

        self.unicast_to_address(&picked, kind, body, per_call).await
    }

    /// Calls every agent connected at the time of the call, concurrently.
    ///
    /// Returns exactly one outcome per agent in the snapshot, in snapshot
    /// order. Agents that have not answered once `aggregate` has elapsed are
    /// reported as [`CallOutcome::Timeout`] and their calls are abandoned.
    pub async fn broadcast_to_all<R>(
        &self,
        kind: RequestKind,
        body: Option<Value>,
        per_call: Duration,
        aggregate: Duration,
    ) -> Vec<(AgentAddress, CallOutcome<R>)>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let snapshot = self.registry.snapshot();
        if snapshot.is_empty() {
            log::debug!("[dispatch] broadcast {kind}: no clients connected");
            return Vec::new();
        }

        let deadline = deadline_after(aggregate);
        let units: Vec<_> = snapshot
            .into_iter()
            .map(|address| {
                let transport = Arc::clone(&self.transport);
                let envelope = self.envelope(kind, body.clone());
                let target = address.clone();
                let unit = tokio::spawn(async move { exchange::<T, R>(transport.as_ref(), &target, envelope, per_call).await });
                (address, unit)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(units.len());
        for (address, mut unit) in units {
            let outcome = match timeout_at(deadline, &mut unit).await {
                Ok(Ok(result)) => CallOutcome::from(result),
                Ok(Err(err)) => CallOutcome::Failure(DispatchError::Transport(format!("dispatch task failed: {err}"))),
                Err(_) => {
                    unit.abort();
                    CallOutcome::Timeout
                }
            };
            outcomes.push((address, outcome));
        }

        log::debug!(
            "[dispatch] broadcast {kind}: dispatched={} succeeded={} failed={} timed_out={}",
            outcomes.len(),
            outcomes.iter().filter(|(_, o)| o.is_success()).count(),
            outcomes.iter().filter(|(_, o)| matches!(o, CallOutcome::Failure(_))).count(),
            outcomes.iter().filter(|(_, o)| o.is_timeout()).count(),
        );

        outcomes
    }
}

/// `Duration::MAX` and other unrepresentable spans mean no aggregate limit.
fn deadline_after(aggregate: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(aggregate).unwrap_or_else(|| now + FAR_FUTURE)
}

async fn exchange<T: Transport, R: DeserializeOwned>(
    transport: &T,
    address: &AgentAddress,
    envelope: RequestEnvelope,
    per_call: Duration,
) -> Result<R, DispatchError> {
    let id = envelope.id;
    let kind = envelope.kind;

    let response = match timeout(per_call, transport.call(address, envelope, per_call)).await {
        Ok(response) => response?,
        Err(_) => return Err(DispatchError::Timeout(per_call)),
    };

    if response.id != id {
        log::warn!("[dispatch] {address} answered request {id} with reply {}", response.id);
        return Err(DispatchError::Transport(format!("reply id {} does not match request id {id}", response.id)));
    }

    let body = response.result?.unwrap_or(Value::Null);
    serde_json::from_value(body).map_err(|err| {
        log::warn!("[dispatch] unexpected {kind} response body from {address}: {err}");
        DispatchError::Deserialization(err.to_string())
    })
}
