//! Server identity, protocol versions, and the assembled MCP dispatcher.

use conduit_jsonrpc::JsonRpcHandler;
use conduit_session::{SessionIdentifier, SessionStorage};
use conduit_tools::ToolRegistry;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::initialize::InitializeHandler;
use crate::ping::PingHandler;
use crate::session::InitializedNotificationHandler;
use crate::tools::{ToolCallHandler, ToolListHandler};

/// Protocol revisions this server speaks, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

/// What the server says about itself in the `initialize` result.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub instructions: Option<String>,
    /// Version answered when the client asks for one we do not support.
    pub protocol_version: String,
    /// Returned verbatim as `_meta`.
    pub meta: Option<Map<String, Value>>,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "conduit".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: None,
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            meta: None,
        }
    }
}

/// The `serverInfo` object.
#[derive(Debug, Serialize)]
pub(crate) struct Implementation<'a> {
    pub name: &'a str,
    pub version: &'a str,
}

impl ServerInfo {
    pub(crate) fn implementation(&self) -> Implementation<'_> {
        Implementation {
            name: &self.name,
            version: &self.version,
        }
    }
}

/// Echo the client's requested version when we support it, otherwise answer
/// with `fallback`.
pub fn negotiate_protocol_version(requested: Option<&str>, fallback: &str) -> String {
    match requested {
        Some(version) if SUPPORTED_PROTOCOL_VERSIONS.contains(&version) => version.to_string(),
        Some(version) => {
            tracing::debug!("Client requested unsupported protocol {version}, offering {fallback}");
            fallback.to_string()
        }
        None => fallback.to_string(),
    }
}

/// A dispatcher wired with every MCP method this server implements.
///
/// `initialize` is registered first, so it wins over any later handler that
/// also claims the method.
pub fn mcp_handler(
    info: ServerInfo,
    tools: Arc<ToolRegistry>,
    identifier: SessionIdentifier,
    storage: Arc<dyn SessionStorage>,
) -> JsonRpcHandler {
    JsonRpcHandler::default()
        .with_request_handler(InitializeHandler::new(info))
        .with_request_handler(PingHandler)
        .with_request_handler(ToolListHandler::new(Arc::clone(&tools)))
        .with_request_handler(ToolCallHandler::new(tools))
        .with_notification_handler(InitializedNotificationHandler::new(identifier, storage))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_is_first_supported() {
        assert_eq!(SUPPORTED_PROTOCOL_VERSIONS[0], LATEST_PROTOCOL_VERSION);
    }

    #[test]
    fn supported_version_is_echoed() {
        assert_eq!(
            negotiate_protocol_version(Some("2024-11-05"), LATEST_PROTOCOL_VERSION),
            "2024-11-05"
        );
    }

    #[test]
    fn unsupported_or_missing_version_falls_back() {
        assert_eq!(
            negotiate_protocol_version(Some("1999-01-01"), LATEST_PROTOCOL_VERSION),
            LATEST_PROTOCOL_VERSION
        );
        assert_eq!(negotiate_protocol_version(None, "2025-03-26"), "2025-03-26");
    }

    #[test]
    fn default_info_names_the_crate_version() {
        let info = ServerInfo::default();
        assert_eq!(info.name, "conduit");
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert!(info.instructions.is_none());
    }
}
