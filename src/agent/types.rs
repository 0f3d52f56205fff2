use serde::{Deserialize, Serialize};
use std::{fmt, net::SocketAddr};

/// Identity of a connected agent, the remote `host:port` of its connection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentAddress(String);

impl AgentAddress {
    /// Trims the raw address; `None` when nothing is left.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str { &self.0 }

    pub fn host(&self) -> &str {
        match self.0.rsplit_once(':') {
            Some((host, _)) => host.trim_start_matches('[').trim_end_matches(']'),
            None => &self.0,
        }
    }

    pub fn port(&self) -> Option<u16> {
        self.0.rsplit_once(':').and_then(|(_, port)| port.parse().ok())
    }
}

impl From<SocketAddr> for AgentAddress {
    fn from(addr: SocketAddr) -> Self { Self(addr.to_string()) }
}

impl fmt::Display for AgentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl AsRef<str> for AgentAddress {
    fn as_ref(&self) -> &str { &self.0 }
}

/// Point-in-time view of the connected agents, as shown on the admin client page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSummary {
    pub count: usize,
    pub clients: Vec<AgentAddress>,
    /// Milliseconds since the unix epoch.
    pub timestamp: i64,
}

impl ClientSummary {
    pub fn new(clients: Vec<AgentAddress>) -> Self {
        Self {
            count: clients.len(),
            clients,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_and_rejects_blank() {
        assert_eq!(AgentAddress::parse("  10.0.0.1:9000 \n").unwrap().as_str(), "10.0.0.1:9000");
        assert!(AgentAddress::parse("").is_none());
        assert!(AgentAddress::parse("   \t").is_none());
    }

    #[test]
    fn test_host_and_port() {
        let addr = AgentAddress::parse("192.168.1.20:53122").unwrap();
        assert_eq!(addr.host(), "192.168.1.20");
        assert_eq!(addr.port(), Some(53122));

        let v6 = AgentAddress::from("[::1]:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(v6.host(), "::1");
        assert_eq!(v6.port(), Some(8080));

        let bare = AgentAddress::parse("agent-without-port").unwrap();
        assert_eq!(bare.host(), "agent-without-port");
        assert_eq!(bare.port(), None);
    }

    #[test]
    fn test_summary_counts_clients() {
        let clients = vec![AgentAddress::parse("a1:1").unwrap(), AgentAddress::parse("a2:2").unwrap()];
        let summary = ClientSummary::new(clients);
        assert_eq!(summary.count, 2);
        assert!(summary.timestamp > 0);
    }
}
