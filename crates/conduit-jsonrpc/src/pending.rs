//! Tracking of server-initiated requests awaiting a client reply.
//!
//! Expiry is cooperative: entries only time out when the host calls
//! [`PendingResponseBag::gc`]. A transport that never calls it keeps every
//! entry alive and never fires their callbacks.

use chrono::{DateTime, Utc};
use conduit_types::clock::to_delta;
use conduit_types::{Clock, JsonRpcError, JsonRpcReply, RequestId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How long the client has to answer a server-initiated request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type ResolveCallback = Box<dyn FnOnce(JsonRpcReply) + Send>;

/// A request the server sent and is still waiting on.
pub struct PendingResponse {
    id: RequestId,
    sent_at: DateTime<Utc>,
    on_resolve: ResolveCallback,
}

impl PendingResponse {
    pub fn new(
        id: impl Into<RequestId>,
        sent_at: DateTime<Utc>,
        on_resolve: impl FnOnce(JsonRpcReply) + Send + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            sent_at,
            on_resolve: Box::new(on_resolve),
        }
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn sent_at(&self) -> DateTime<Utc> {
        self.sent_at
    }

    /// A deadline past the representable range never expires.
    fn is_expired(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        self.sent_at
            .checked_add_signed(timeout)
            .is_some_and(|deadline| deadline < now)
    }

    fn resolve(self, reply: JsonRpcReply) {
        (self.on_resolve)(reply);
    }
}

impl fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingResponse")
            .field("id", &self.id)
            .field("sent_at", &self.sent_at)
            .finish_non_exhaustive()
    }
}

/// Outstanding server-to-client requests, keyed by id.
pub struct PendingResponseBag {
    clock: Arc<dyn Clock>,
    timeout: Duration,
    pending: HashMap<RequestId, PendingResponse>,
}

impl PendingResponseBag {
    pub fn new(clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self {
            clock,
            timeout,
            pending: HashMap::new(),
        }
    }

    /// Register a request before it is sent. Returns the entry it displaced
    /// if the id was already pending.
    pub fn add(&mut self, pending: PendingResponse) -> Option<PendingResponse> {
        let displaced = self.pending.insert(pending.id.clone(), pending);
        if let Some(old) = &displaced {
            tracing::warn!("Pending request id {} was registered twice", old.id);
        }
        displaced
    }

    /// Register a request sent now, according to the bag's clock.
    pub fn track(
        &mut self,
        id: impl Into<RequestId>,
        on_resolve: impl FnOnce(JsonRpcReply) + Send + 'static,
    ) -> Option<PendingResponse> {
        let now = self.clock.now();
        self.add(PendingResponse::new(id, now, on_resolve))
    }

    /// Hand an incoming reply to the request it answers.
    ///
    /// Returns false, leaving the bag untouched, when no request with that id
    /// is pending. Unsolicited replies are expected and are not an error.
    pub fn resolve(&mut self, reply: JsonRpcReply) -> bool {
        match self.pending.remove(reply.id()) {
            Some(pending) => {
                pending.resolve(reply);
                true
            }
            None => false,
        }
    }

    /// Time out every request older than the timeout. Each expired entry is
    /// resolved with a RequestTimeout error and removed. Returns how many
    /// entries were removed.
    pub fn gc(&mut self) -> usize {
        self.gc_with(|_| {})
    }

    /// Like [`gc`](Self::gc), also reporting each expired id to `on_timeout`.
    pub fn gc_with(&mut self, mut on_timeout: impl FnMut(&RequestId)) -> usize {
        let now = self.clock.now();
        let timeout = to_delta(self.timeout);

        let mut expired: Vec<RequestId> = self
            .pending
            .values()
            .filter(|pending| pending.is_expired(now, timeout))
            .map(|pending| pending.id.clone())
            .collect();
        expired.sort();

        for id in &expired {
            if let Some(pending) = self.pending.remove(id) {
                tracing::debug!("Request {id} timed out");
                pending.resolve(JsonRpcError::request_timeout(id.clone()).into());
                on_timeout(id);
            }
        }
        expired.len()
    }

    /// Drop a pending request without resolving it.
    pub fn remove(&mut self, id: &RequestId) -> bool {
        self.pending.remove(id).is_some()
    }

    /// Drop every pending request without resolving any.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl fmt::Debug for PendingResponseBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingResponseBag")
            .field("timeout", &self.timeout)
            .field("pending", &self.pending.len())
            .finish()
    }
}
