//! JSON-RPC 2.0 server engine for Conduit.
//!
//! Raw text from a transport goes through [`MessageFactory`] into the
//! [`JsonRpcHandler`] dispatcher, which routes each message to the registered
//! handlers and yields encoded replies one at a time. [`PendingResponseBag`]
//! and [`KeepAliveSession`] cover server-initiated traffic and are driven by
//! the transport, not by the dispatcher.

pub mod dispatcher;
pub mod error;
pub mod factory;
pub mod handler;
pub mod keepalive;
pub mod pending;

pub use dispatcher::{JsonRpcHandler, ProcessOutput};
pub use error::FactoryError;
pub use factory::{MessageFactory, ParsedMessage};
pub use handler::{HandlerOutcome, NotificationHandler, RequestHandler, StreamableResponse};
pub use keepalive::KeepAliveSession;
pub use pending::{DEFAULT_REQUEST_TIMEOUT, PendingResponse, PendingResponseBag};
