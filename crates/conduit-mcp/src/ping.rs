//! `ping`: an empty result, used by both peers to check liveness.

use conduit_jsonrpc::{HandlerOutcome, RequestHandler};
use conduit_types::{HandlerError, JsonRpcRequest, JsonRpcResponse};

pub struct PingHandler;

impl RequestHandler for PingHandler {
    fn supports(&self, request: &JsonRpcRequest) -> bool {
        request.method == "ping"
    }

    fn create_response(&self, request: JsonRpcRequest) -> Result<HandlerOutcome, HandlerError> {
        Ok(JsonRpcResponse::empty(request.id).into())
    }
}
