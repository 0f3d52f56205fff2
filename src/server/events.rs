use crate::agent::registry::ConnectionRegistry;
use crate::transport::ConnectionEventProcessor;

pub struct ConnectProcessor {
    registry: ConnectionRegistry,
}

impl ConnectProcessor {
    pub fn new(registry: ConnectionRegistry) -> Self { Self { registry } }
}

impl ConnectionEventProcessor for ConnectProcessor {
    fn on_event(&self, address: &str) {
        log::debug!("[server] connect event, remote address: {address}");
        self.registry.add(address);
    }
}

pub struct DisconnectProcessor {
    registry: ConnectionRegistry,
}

impl DisconnectProcessor {
    pub fn new(registry: ConnectionRegistry) -> Self { Self { registry } }
}

impl ConnectionEventProcessor for DisconnectProcessor {
    fn on_event(&self, address: &str) {
        log::debug!("[server] disconnect event, remote address: {address}");
        self.registry.remove(address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_drive_registry() {
        let registry = ConnectionRegistry::new();
        let connect = ConnectProcessor::new(registry.clone());
        let disconnect = DisconnectProcessor::new(registry.clone());

        connect.on_event("10.1.1.1:5000");
        connect.on_event("10.1.1.2:5000");
        connect.on_event(" ");
        disconnect.on_event("10.1.1.1:5000");
        disconnect.on_event("10.1.1.1:5000");

        assert_eq!(registry.snapshot().iter().map(|a| a.as_str()).collect::<Vec<_>>(), vec!["10.1.1.2:5000"]);
    }
}
