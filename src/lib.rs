pub mod agent;
pub mod config;
pub mod helpers;
pub mod rpc;
pub mod server;
pub mod transport;

pub use agent::{AgentAddress, ConnectionRegistry};
pub use rpc::{CallOutcome, DispatchError, Dispatcher, RequestKind};
pub use server::AdminServer;
