//! The JSON-RPC dispatcher.
//!
//! Routes every parsed message to the registered handlers and encodes the
//! outcome. Each input message produces exactly one output slot (`None` for
//! notifications and suppressed replies), except streamable responses, which
//! flush one slot per wire message.

use conduit_types::{
    HandlerError, JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, RequestId,
    codes,
};
use serde::Serialize;

use crate::factory::{MessageFactory, ParsedMessage};
use crate::handler::{HandlerOutcome, NotificationHandler, RequestHandler, StreamableResponse};

/// Dispatches JSON-RPC traffic to ordered handler registries.
#[derive(Default)]
pub struct JsonRpcHandler {
    factory: MessageFactory,
    request_handlers: Vec<Box<dyn RequestHandler>>,
    notification_handlers: Vec<Box<dyn NotificationHandler>>,
}

impl JsonRpcHandler {
    pub fn new(factory: MessageFactory) -> Self {
        Self {
            factory,
            request_handlers: Vec::new(),
            notification_handlers: Vec::new(),
        }
    }

    /// Register a request handler. Earlier registrations win ties.
    pub fn register_request_handler(&mut self, handler: Box<dyn RequestHandler>) {
        self.request_handlers.push(handler);
    }

    pub fn register_notification_handler(&mut self, handler: Box<dyn NotificationHandler>) {
        self.notification_handlers.push(handler);
    }

    pub fn with_request_handler(mut self, handler: impl RequestHandler + 'static) -> Self {
        self.register_request_handler(Box::new(handler));
        self
    }

    pub fn with_notification_handler(
        mut self,
        handler: impl NotificationHandler + 'static,
    ) -> Self {
        self.register_notification_handler(Box::new(handler));
        self
    }

    pub fn factory(&self) -> &MessageFactory {
        &self.factory
    }

    /// Process a raw payload, yielding one encoded output per message.
    ///
    /// Outputs are produced lazily: nothing is dispatched until the iterator
    /// is advanced.
    pub fn process(&self, raw: &str) -> ProcessOutput<'_> {
        match self.factory.create(raw) {
            Ok(messages) => self.process_messages(messages),
            Err(e) => {
                tracing::debug!("Rejecting unparseable payload: {e}");
                ProcessOutput {
                    handler: self,
                    messages: Vec::new().into_iter(),
                    ready: Some(encode(&JsonRpcError::parse_error())),
                    stream: None,
                }
            }
        }
    }

    /// Process messages that were already parsed, e.g. after a transport
    /// pulled out replies meant for its pending requests.
    pub fn process_messages(&self, messages: Vec<ParsedMessage>) -> ProcessOutput<'_> {
        ProcessOutput {
            handler: self,
            messages: messages.into_iter(),
            ready: None,
            stream: None,
        }
    }

    /// Whether `raw` contains a request that would be routed to the
    /// `initialize` handler. Nothing is dispatched.
    pub fn is_initialize_request(&self, raw: &str) -> bool {
        let Ok(messages) = self.factory.create(raw) else {
            return false;
        };
        messages.iter().any(|message| match message {
            ParsedMessage::Message(JsonRpcMessage::Request(request)) => self
                .find_request_handler(request)
                .is_some_and(|handler| handler.is_initialize()),
            _ => false,
        })
    }

    fn find_request_handler(&self, request: &JsonRpcRequest) -> Option<&dyn RequestHandler> {
        self.request_handlers
            .iter()
            .find(|handler| handler.supports(request))
            .map(|handler| handler.as_ref())
    }

    fn dispatch(&self, message: ParsedMessage) -> Dispatched {
        match message {
            ParsedMessage::Invalid { id, reason } => {
                tracing::debug!("Invalid message: {reason}");
                let id = id.unwrap_or_else(RequestId::unknown);
                Dispatched::Output(encode(&JsonRpcError::invalid_request(id, reason)))
            }
            ParsedMessage::Message(JsonRpcMessage::Request(request)) => {
                self.handle_request(request)
            }
            ParsedMessage::Message(JsonRpcMessage::Notification(notification)) => {
                self.handle_notification(&notification);
                Dispatched::Output(None)
            }
            ParsedMessage::Message(JsonRpcMessage::Response(response)) => {
                tracing::debug!("Ignoring response {} with no pending request", response.id);
                Dispatched::Output(None)
            }
            ParsedMessage::Message(JsonRpcMessage::Error(error)) => {
                tracing::debug!(
                    "Ignoring error {} (code {}) with no pending request",
                    error.id,
                    error.code
                );
                Dispatched::Output(None)
            }
        }
    }

    fn handle_request(&self, request: JsonRpcRequest) -> Dispatched {
        let id = request.id.clone();
        let Some(handler) = self.find_request_handler(&request) else {
            tracing::debug!("No handler for method '{}'", request.method);
            let error = JsonRpcError::method_not_found(id, &request.method);
            return Dispatched::Output(encode(&error));
        };

        tracing::debug!("Dispatching '{}' (id {id})", request.method);
        match handler.create_response(request) {
            Ok(HandlerOutcome::Reply(reply)) => Dispatched::Output(encode(&reply)),
            Ok(HandlerOutcome::Stream(stream)) => Dispatched::Stream(id, stream),
            Err(e) => Dispatched::Output(map_handler_error(id, e).and_then(|err| encode(&err))),
        }
    }

    fn handle_notification(&self, notification: &JsonRpcNotification) {
        let mut matched = false;
        for handler in self
            .notification_handlers
            .iter()
            .filter(|handler| handler.supports(notification))
        {
            matched = true;
            if let Err(e) = handler.handle(notification) {
                tracing::warn!("Notification handler for '{}' failed: {e}", notification.method);
            }
        }
        if !matched {
            tracing::debug!("No handler for notification '{}'", notification.method);
        }
    }
}

/// Map a handler failure onto the wire error taxonomy. `NoReply` is the only
/// kind that yields nothing.
fn map_handler_error(id: RequestId, error: HandlerError) -> Option<JsonRpcError> {
    match error {
        HandlerError::NoReply(reason) => {
            tracing::debug!("Request {id} produced no reply: {reason}");
            None
        }
        HandlerError::NotFound(message) => {
            Some(JsonRpcError::new(id, codes::METHOD_NOT_FOUND, message))
        }
        HandlerError::InvalidArgument(message) => Some(JsonRpcError::invalid_params(id, message)),
        HandlerError::Internal(message) => {
            tracing::warn!("Request {id} failed: {message}");
            Some(JsonRpcError::internal_error(id, message))
        }
    }
}

fn encode<T: Serialize>(message: &T) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::error!("Failed to encode JSON-RPC message: {e}");
            None
        }
    }
}

enum Dispatched {
    Output(Option<String>),
    Stream(RequestId, StreamableResponse),
}

struct InFlight {
    id: RequestId,
    stream: StreamableResponse,
    emitted: bool,
}

/// Lazy output of [`JsonRpcHandler::process`].
pub struct ProcessOutput<'a> {
    handler: &'a JsonRpcHandler,
    messages: std::vec::IntoIter<ParsedMessage>,
    ready: Option<Option<String>>,
    stream: Option<InFlight>,
}

impl Iterator for ProcessOutput<'_> {
    type Item = Option<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(ready) = self.ready.take() {
            return Some(ready);
        }

        loop {
            if let Some(in_flight) = self.stream.as_mut() {
                if let Some(message) = in_flight.stream.next() {
                    in_flight.emitted = true;
                    return Some(encode(&message));
                }
                let finished = self.stream.take();
                if let Some(InFlight { id, emitted: false, .. }) = finished {
                    // A request must always be answered.
                    let error = JsonRpcError::internal_error(id, "Handler produced no response");
                    return Some(encode(&error));
                }
            }

            match self.handler.dispatch(self.messages.next()?) {
                Dispatched::Output(output) => return Some(output),
                Dispatched::Stream(id, stream) => {
                    self.stream = Some(InFlight {
                        id,
                        stream,
                        emitted: false,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_types::{JsonRpcResponse, Params};
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct EchoHandler {
        method: &'static str,
        tag: &'static str,
        initialize: bool,
    }

    impl RequestHandler for EchoHandler {
        fn supports(&self, request: &JsonRpcRequest) -> bool {
            request.method == self.method
        }

        fn create_response(
            &self,
            request: JsonRpcRequest,
        ) -> Result<HandlerOutcome, HandlerError> {
            let mut result = Params::new();
            result.insert("tag".into(), json!(self.tag));
            Ok(JsonRpcResponse::new(request.id, result).into())
        }

        fn is_initialize(&self) -> bool {
            self.initialize
        }
    }

    fn echo(method: &'static str, tag: &'static str) -> EchoHandler {
        EchoHandler {
            method,
            tag,
            initialize: false,
        }
    }

    struct FailingHandler(fn() -> HandlerError);

    impl RequestHandler for FailingHandler {
        fn supports(&self, request: &JsonRpcRequest) -> bool {
            request.method == "fail"
        }

        fn create_response(&self, _: JsonRpcRequest) -> Result<HandlerOutcome, HandlerError> {
            Err((self.0)())
        }
    }

    struct StreamingHandler {
        messages: usize,
    }

    impl RequestHandler for StreamingHandler {
        fn supports(&self, request: &JsonRpcRequest) -> bool {
            request.method == "stream"
        }

        fn create_response(
            &self,
            request: JsonRpcRequest,
        ) -> Result<HandlerOutcome, HandlerError> {
            let id = request.id;
            let messages: Vec<JsonRpcMessage> = (0..self.messages)
                .map(|i| JsonRpcResponse::new(id.clone(), obj(json!({"n": i}))).into())
                .collect();
            Ok(StreamableResponse::new(messages).into())
        }
    }

    struct CountingNotificationHandler {
        method: &'static str,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl NotificationHandler for CountingNotificationHandler {
        fn supports(&self, notification: &JsonRpcNotification) -> bool {
            notification.method == self.method
        }

        fn handle(&self, _: &JsonRpcNotification) -> Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(HandlerError::Internal("boom".into()));
            }
            Ok(())
        }
    }

    fn obj(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    fn outputs(handler: &JsonRpcHandler, raw: &str) -> Vec<Option<Value>> {
        handler
            .process(raw)
            .map(|out| out.map(|text| serde_json::from_str(&text).unwrap()))
            .collect()
    }

    fn only(handler: &JsonRpcHandler, raw: &str) -> Value {
        let mut out = outputs(handler, raw);
        assert_eq!(out.len(), 1);
        out.remove(0).expect("expected output")
    }

    #[test]
    fn unknown_method_yields_method_not_found_with_request_id() {
        let handler = JsonRpcHandler::default();
        let out = only(&handler, r#"{"jsonrpc":"2.0","id":"r-1","method":"nope"}"#);
        assert_eq!(out["id"], "r-1");
        assert_eq!(out["error"]["code"], codes::METHOD_NOT_FOUND);
    }

    #[test]
    fn unparseable_payload_yields_single_parse_error() {
        let handler = JsonRpcHandler::default();
        let out = only(&handler, "{oops");
        assert_eq!(out["id"], 0);
        assert_eq!(out["error"]["code"], codes::PARSE_ERROR);
    }

    #[test]
    fn invalid_message_yields_invalid_request_without_dispatch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = JsonRpcHandler::default().with_notification_handler(
            CountingNotificationHandler {
                method: "x",
                calls: Arc::clone(&calls),
                fail: false,
            },
        );
        let out = only(&handler, r#"{"jsonrpc":"1.0","id":5,"method":"x"}"#);
        assert_eq!(out["id"], 5);
        assert_eq!(out["error"]["code"], codes::INVALID_REQUEST);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn first_registered_handler_wins() {
        let handler = JsonRpcHandler::default()
            .with_request_handler(echo("same", "first"))
            .with_request_handler(echo("same", "second"));
        let out = only(&handler, r#"{"jsonrpc":"2.0","id":1,"method":"same"}"#);
        assert_eq!(out["result"]["tag"], "first");
    }

    #[test]
    fn notifications_fan_out_and_emit_nothing() {
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let handler = JsonRpcHandler::default()
            .with_notification_handler(CountingNotificationHandler {
                method: "n",
                calls: Arc::clone(&a),
                fail: true,
            })
            .with_notification_handler(CountingNotificationHandler {
                method: "n",
                calls: Arc::clone(&b),
                fail: false,
            });
        let out = outputs(&handler, r#"{"jsonrpc":"2.0","method":"n"}"#);
        assert_eq!(out, vec![None]);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unmatched_notification_emits_nothing() {
        let handler = JsonRpcHandler::default();
        let out = outputs(&handler, r#"{"jsonrpc":"2.0","method":"unknown"}"#);
        assert_eq!(out, vec![None]);
    }

    fn no_reply() -> HandlerError {
        HandlerError::NoReply("reply sent elsewhere".into())
    }

    fn not_found() -> HandlerError {
        HandlerError::NotFound("gone".into())
    }

    fn invalid_argument() -> HandlerError {
        HandlerError::InvalidArgument("bad".into())
    }

    fn internal() -> HandlerError {
        HandlerError::Internal("boom".into())
    }

    #[test]
    fn handler_errors_map_to_codes() {
        let cases: [(fn() -> HandlerError, Option<i64>); 4] = [
            (no_reply, None),
            (not_found, Some(codes::METHOD_NOT_FOUND)),
            (invalid_argument, Some(codes::INVALID_PARAMS)),
            (internal, Some(codes::INTERNAL_ERROR)),
        ];
        for (make, expected) in cases {
            let handler = JsonRpcHandler::default().with_request_handler(FailingHandler(make));
            let out = outputs(&handler, r#"{"jsonrpc":"2.0","id":11,"method":"fail"}"#);
            assert_eq!(out.len(), 1);
            match expected {
                None => assert!(out[0].is_none()),
                Some(code) => {
                    let value = out[0].as_ref().unwrap();
                    assert_eq!(value["id"], 11);
                    assert_eq!(value["error"]["code"], code);
                }
            }
        }
    }

    #[test]
    fn streamable_response_flushes_each_message() {
        let handler =
            JsonRpcHandler::default().with_request_handler(StreamingHandler { messages: 3 });
        let out = outputs(&handler, r#"{"jsonrpc":"2.0","id":2,"method":"stream"}"#);
        let ns: Vec<_> = out.iter().map(|o| o.as_ref().unwrap()["result"]["n"].clone()).collect();
        assert_eq!(ns, vec![json!(0), json!(1), json!(2)]);
    }

    #[test]
    fn empty_stream_still_answers_the_request() {
        let handler =
            JsonRpcHandler::default().with_request_handler(StreamingHandler { messages: 0 });
        let out = only(&handler, r#"{"jsonrpc":"2.0","id":3,"method":"stream"}"#);
        assert_eq!(out["id"], 3);
        assert_eq!(out["error"]["code"], codes::INTERNAL_ERROR);
    }

    #[test]
    fn batch_outputs_keep_input_order() {
        let handler = JsonRpcHandler::default()
            .with_request_handler(echo("a", "A"))
            .with_request_handler(StreamingHandler { messages: 2 });
        let out = outputs(
            &handler,
            r#"[
                {"jsonrpc":"2.0","method":"n"},
                {"jsonrpc":"2.0","id":1,"method":"stream"},
                {"jsonrpc":"2.0","id":2,"method":"a"},
                7
            ]"#,
        );
        assert_eq!(out.len(), 5);
        assert!(out[0].is_none());
        assert_eq!(out[1].as_ref().unwrap()["id"], 1);
        assert_eq!(out[2].as_ref().unwrap()["id"], 1);
        assert_eq!(out[3].as_ref().unwrap()["result"]["tag"], "A");
        assert_eq!(out[4].as_ref().unwrap()["error"]["code"], codes::INVALID_REQUEST);
    }

    #[test]
    fn dispatch_is_lazy() {
        struct Recording(Arc<Mutex<Vec<RequestId>>>);

        impl RequestHandler for Recording {
            fn supports(&self, _: &JsonRpcRequest) -> bool {
                true
            }

            fn create_response(
                &self,
                request: JsonRpcRequest,
            ) -> Result<HandlerOutcome, HandlerError> {
                self.0.lock().unwrap().push(request.id.clone());
                Ok(JsonRpcResponse::empty(request.id).into())
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = JsonRpcHandler::default().with_request_handler(Recording(Arc::clone(&seen)));
        let mut out = handler.process(
            r#"[{"jsonrpc":"2.0","id":1,"method":"a"},{"jsonrpc":"2.0","id":2,"method":"b"}]"#,
        );
        assert!(seen.lock().unwrap().is_empty());
        out.next();
        assert_eq!(seen.lock().unwrap().len(), 1);
        out.next();
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn client_replies_are_ignored() {
        let handler = JsonRpcHandler::default();
        let out = outputs(&handler, r#"{"jsonrpc":"2.0","id":"s-1","result":{}}"#);
        assert_eq!(out, vec![None]);
    }

    #[test]
    fn empty_result_is_encoded_as_object() {
        struct Empty;

        impl RequestHandler for Empty {
            fn supports(&self, _: &JsonRpcRequest) -> bool {
                true
            }

            fn create_response(
                &self,
                request: JsonRpcRequest,
            ) -> Result<HandlerOutcome, HandlerError> {
                Ok(JsonRpcResponse::empty(request.id).into())
            }
        }

        let handler = JsonRpcHandler::default().with_request_handler(Empty);
        let text: Vec<_> = handler
            .process(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
            .collect();
        assert_eq!(
            text,
            vec![Some(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#.to_string())]
        );
    }

    #[test]
    fn detects_initialize_request() {
        let handler = JsonRpcHandler::default()
            .with_request_handler(EchoHandler {
                method: "initialize",
                tag: "init",
                initialize: true,
            })
            .with_request_handler(echo("ping", "pong"));
        assert!(handler.is_initialize_request(r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#));
        assert!(!handler.is_initialize_request(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#));
        assert!(!handler.is_initialize_request(r#"{"jsonrpc":"2.0","method":"initialize"}"#));
        assert!(!handler.is_initialize_request("not json"));
    }
}
