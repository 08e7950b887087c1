//! Session bookkeeping driven by client notifications.

use conduit_jsonrpc::NotificationHandler;
use conduit_session::{Session, SessionIdentifier, SessionStorage};
use conduit_types::{HandlerError, JsonRpcNotification};
use std::sync::Arc;

/// Records `notifications/initialized` on the connection's session.
pub struct InitializedNotificationHandler {
    identifier: SessionIdentifier,
    storage: Arc<dyn SessionStorage>,
}

impl InitializedNotificationHandler {
    pub fn new(identifier: SessionIdentifier, storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            identifier,
            storage,
        }
    }
}

impl NotificationHandler for InitializedNotificationHandler {
    fn supports(&self, notification: &JsonRpcNotification) -> bool {
        notification.method == "notifications/initialized"
    }

    fn handle(&self, _notification: &JsonRpcNotification) -> Result<(), HandlerError> {
        let mut session = Session::open(self.identifier.clone(), Arc::clone(&self.storage))
            .map_err(|e| HandlerError::Internal(e.to_string()))?;
        session
            .mark_initialized()
            .map_err(|e| HandlerError::Internal(e.to_string()))?;
        tracing::debug!("Session {} initialized", self.identifier);
        Ok(())
    }
}
