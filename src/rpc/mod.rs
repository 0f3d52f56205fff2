pub mod codec;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod id;

pub use dispatch::Dispatcher;
pub use envelope::{RequestEnvelope, RequestKind, ResponseEnvelope};
pub use error::{CallOutcome, DispatchError};
