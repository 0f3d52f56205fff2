use super::types::AgentAddress;
use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Returned by [`ConnectionRegistry::pick_one`] when no agent is connected.
pub const NOT_CONNECTED: &str = "NOT-CONNECTED";

/// Live set of connected agents, shared between the transport event path and dispatch.
///
/// Cloning yields another handle onto the same set.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    clients: Arc<RwLock<BTreeSet<AgentAddress>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self { Self::default() }

    fn read(&self) -> RwLockReadGuard<'_, BTreeSet<AgentAddress>> { self.clients.read().unwrap_or_else(PoisonError::into_inner) }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeSet<AgentAddress>> { self.clients.write().unwrap_or_else(PoisonError::into_inner) }

    /// Registers `raw` and returns its normalized form. Blank addresses are
    /// ignored with a warning and yield `None`.
    pub fn add(&self, raw: &str) -> Option<AgentAddress> {
        let Some(address) = AgentAddress::parse(raw) else {
            log::warn!("[registry] ignoring connection with empty remote address");
            return None;
        };

        let mut clients = self.write();
        if clients.insert(address.clone()) {
            log::info!("[registry] client connected: {address}, total connected clients: {}", clients.len());
        }

        Some(address)
    }

    /// Removes `raw` if present. Returns whether anything was removed.
    pub fn remove(&self, raw: &str) -> bool {
        let Some(address) = AgentAddress::parse(raw) else {
            return false;
        };

        let mut clients = self.write();
        let removed = clients.remove(&address);
        if removed {
            log::info!("[registry] client disconnected: {address}, remaining clients: {}", clients.len());
        }

        removed
    }

    pub fn contains(&self, address: &AgentAddress) -> bool { self.read().contains(address) }

    /// Copy of the live set taken under a single read lock.
    pub fn snapshot(&self) -> Vec<AgentAddress> { self.read().iter().cloned().collect() }

    pub fn count(&self) -> usize { self.read().len() }

    /// Any connected agent, or [`NOT_CONNECTED`]. Which one is not guaranteed
    /// to be stable across calls.
    pub fn pick_one(&self) -> String {
        self.read().iter().next().map(|a| a.as_str().to_string()).unwrap_or_else(|| NOT_CONNECTED.to_string())
    }

    pub fn clear(&self) {
        let mut clients = self.write();
        if !clients.is_empty() {
            log::debug!("[registry] clearing {} clients", clients.len());
        }
        clients.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::thread;

    #[test]
    fn test_add_remove_count() {
        let registry = ConnectionRegistry::new();

        assert_eq!(registry.add(" 10.0.0.1:4000 ").unwrap().as_str(), "10.0.0.1:4000");
        registry.add("10.0.0.1:4000");
        registry.add("10.0.0.2:4000");
        assert_eq!(registry.count(), 2);

        assert!(registry.remove("10.0.0.1:4000"));
        assert!(!registry.remove("10.0.0.1:4000"));
        assert!(!registry.remove("never-seen:1"));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_blank_address_rejected() {
        let registry = ConnectionRegistry::new();
        assert!(registry.add("").is_none());
        assert!(registry.add("   ").is_none());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_reconnect_replaces() {
        let registry = ConnectionRegistry::new();
        registry.add("a1:1");
        registry.remove("a1:1");
        registry.add("a1:1");
        registry.add("a1:1");
        assert_eq!(registry.snapshot(), vec![AgentAddress::parse("a1:1").unwrap()]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = ConnectionRegistry::new();
        registry.add("a1:1");
        registry.add("a2:2");

        let snapshot = registry.snapshot();
        registry.remove("a1:1");
        registry.add("a3:3");

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].as_str(), "a1:1");
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn test_pick_one() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.pick_one(), NOT_CONNECTED);

        registry.add("a1:1");
        registry.add("a2:2");
        let picked = registry.pick_one();
        assert!(picked == "a1:1" || picked == "a2:2");
    }

    #[test]
    fn test_clear() {
        let registry = ConnectionRegistry::new();
        registry.add("a1:1");
        registry.clone().clear();
        assert_eq!(registry.count(), 0);
        registry.clear();
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_count_matches_net_connections_across_threads() {
        let registry = ConnectionRegistry::new();

        // each thread owns its addresses so per-address event order stays chronological
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                thread::spawn(move || {
                    let mut net = HashMap::new();
                    for i in 0..200u32 {
                        let address = format!("10.0.{t}.{}:7000", i % 13);
                        if i % 3 == 2 {
                            registry.remove(&address);
                            net.insert(address, false);
                        } else {
                            registry.add(&address);
                            net.insert(address, true);
                        }
                    }
                    net.values().filter(|connected| **connected).count()
                })
            })
            .collect();

        let expected: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(registry.count(), expected);
    }
}
