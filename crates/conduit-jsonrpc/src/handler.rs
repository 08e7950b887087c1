//! Handler contracts consumed by the dispatcher.

use conduit_types::{
    HandlerError, JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcReply,
    JsonRpcRequest, JsonRpcResponse,
};
use std::fmt;

/// A reply that has to go out as several wire messages, flushed in order.
///
/// The sequence is pulled lazily: the dispatcher asks for the next message
/// only when the transport asks for the next output, so a slow consumer
/// stalls the producer instead of buffering.
pub struct StreamableResponse {
    messages: Box<dyn Iterator<Item = JsonRpcMessage> + Send>,
}

impl StreamableResponse {
    pub fn new<I>(messages: I) -> Self
    where
        I: IntoIterator<Item = JsonRpcMessage>,
        I::IntoIter: Send + 'static,
    {
        Self {
            messages: Box::new(messages.into_iter()),
        }
    }
}

impl Iterator for StreamableResponse {
    type Item = JsonRpcMessage;

    fn next(&mut self) -> Option<Self::Item> {
        self.messages.next()
    }
}

impl fmt::Debug for StreamableResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamableResponse(..)")
    }
}

/// What a request handler returns on success.
#[derive(Debug)]
pub enum HandlerOutcome {
    Reply(JsonRpcReply),
    Stream(StreamableResponse),
}

impl From<JsonRpcResponse> for HandlerOutcome {
    fn from(value: JsonRpcResponse) -> Self {
        HandlerOutcome::Reply(value.into())
    }
}

impl From<JsonRpcError> for HandlerOutcome {
    fn from(value: JsonRpcError) -> Self {
        HandlerOutcome::Reply(value.into())
    }
}

impl From<JsonRpcReply> for HandlerOutcome {
    fn from(value: JsonRpcReply) -> Self {
        HandlerOutcome::Reply(value)
    }
}

impl From<StreamableResponse> for HandlerOutcome {
    fn from(value: StreamableResponse) -> Self {
        HandlerOutcome::Stream(value)
    }
}

/// Answers requests for one method (or a family of methods).
///
/// Handlers are consulted in registration order and the first one whose
/// `supports` returns true gets the request.
pub trait RequestHandler: Send + Sync {
    fn supports(&self, request: &JsonRpcRequest) -> bool;

    fn create_response(&self, request: JsonRpcRequest) -> Result<HandlerOutcome, HandlerError>;

    /// Whether this handler answers the `initialize` handshake. Transports use
    /// this to special-case the first request of a connection.
    fn is_initialize(&self) -> bool {
        false
    }
}

/// Reacts to notifications. Every supporting handler is invoked.
pub trait NotificationHandler: Send + Sync {
    fn supports(&self, notification: &JsonRpcNotification) -> bool;

    fn handle(&self, notification: &JsonRpcNotification) -> Result<(), HandlerError>;
}
