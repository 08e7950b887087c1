//! Tool trait, registry and built-in tools for Conduit.

mod countdown;
mod echo;
pub mod registry;

pub use countdown::CountdownTool;
pub use echo::EchoTool;
pub use registry::{Tool, ToolRegistry};
