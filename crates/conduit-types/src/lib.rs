//! Shared types and error hierarchy for Conduit.
//!
//! Holds the JSON-RPC 2.0 message model, the tool-call model consumed by the
//! MCP handlers, and the injectable [`Clock`] used by every time-driven
//! component.

pub mod clock;
pub mod error;
pub mod message;
pub mod tool;

pub use clock::{Clock, MockClock, SystemClock};
pub use error::{ConfigError, HandlerError, ToolError};
pub use message::*;
pub use tool::*;
