use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod prelude {
    pub use super::{Config, Dispatch, Server, Workers};
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub dispatch: Dispatch,
    #[serde(default)]
    pub workers: Workers,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8989,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Dispatch {
    pub call_timeout_ms: u64,
    pub aggregate_timeout_ms: u64,
}

impl Dispatch {
    pub fn call_timeout(&self) -> Duration { Duration::from_millis(self.call_timeout_ms) }

    pub fn aggregate_timeout(&self) -> Duration { Duration::from_millis(self.aggregate_timeout_ms) }
}

impl Default for Dispatch {
    fn default() -> Self {
        Self {
            call_timeout_ms: 30_000,
            aggregate_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Workers {
    pub threads: usize,
    pub queue: usize,
}

impl Default for Workers {
    fn default() -> Self { Self { threads: 10, queue: 100 } }
}
