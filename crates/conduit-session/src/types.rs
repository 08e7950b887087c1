//! Session data types.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use uuid::Uuid;

use crate::error::SessionError;

/// How many events each stream retains for replay. Older events are evicted,
/// so a client resuming from an evicted event id gets nothing back.
pub const MAX_EVENTS_PER_STREAM: usize = 10;

/// Names a session in storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionIdentifier {
    pub session_id: Uuid,
    pub user_identifier: Option<String>,
}

impl SessionIdentifier {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            user_identifier: None,
        }
    }

    /// A fresh identifier with a random session id.
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }

    pub fn with_user(mut self, user_identifier: impl Into<String>) -> Self {
        self.user_identifier = Some(user_identifier.into());
        self
    }

    /// The single key this session is stored under.
    pub fn storage_key(&self) -> String {
        match &self.user_identifier {
            Some(user) => format!("{user}:{}", self.session_id),
            None => self.session_id.to_string(),
        }
    }
}

impl fmt::Display for SessionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// One serialized event retained for replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: String,
    pub event: String,
}

/// An event stream with a bounded replay window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    id: Uuid,
    client_initiated: bool,
    events: VecDeque<StoredEvent>,
}

impl Stream {
    pub(crate) fn new(id: Uuid, client_initiated: bool) -> Self {
        Self {
            id,
            client_initiated,
            events: VecDeque::with_capacity(MAX_EVENTS_PER_STREAM),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_client_initiated(&self) -> bool {
        self.client_initiated
    }

    /// Retained events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &StoredEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn contains(&self, event_id: &str) -> bool {
        self.events.iter().any(|e| e.id == event_id)
    }

    /// Append an event, returning the one evicted to make room, if any.
    fn push(&mut self, event: StoredEvent) -> Option<StoredEvent> {
        self.events.push_back(event);
        if self.events.len() > MAX_EVENTS_PER_STREAM {
            self.events.pop_front()
        } else {
            None
        }
    }

    /// Events retained after `event_id`, or nothing if it is not retained.
    pub fn events_after(&self, event_id: &str) -> Vec<StoredEvent> {
        match self.events.iter().position(|e| e.id == event_id) {
            Some(pos) => self.events.iter().skip(pos + 1).cloned().collect(),
            None => Vec::new(),
        }
    }
}

/// Everything a session persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct SessionState {
    pub streams: Vec<Stream>,
    /// Maps each retained event id to the stream holding it.
    pub event_index: HashMap<String, Uuid>,
    pub initialized_received: bool,
}

impl SessionState {
    pub fn stream(&self, id: Uuid) -> Option<&Stream> {
        self.streams.iter().find(|s| s.id == id)
    }

    pub fn add_event(
        &mut self,
        stream_id: Uuid,
        event_id: &str,
        event: &str,
    ) -> Result<(), SessionError> {
        let stream = self
            .streams
            .iter_mut()
            .find(|s| s.id == stream_id)
            .ok_or(SessionError::StreamNotFound { id: stream_id })?;

        let evicted = stream.push(StoredEvent {
            id: event_id.to_string(),
            event: event.to_string(),
        });
        if let Some(evicted) = evicted {
            let still_held = stream.contains(&evicted.id);
            if !still_held && self.event_index.get(&evicted.id) == Some(&stream_id) {
                self.event_index.remove(&evicted.id);
            }
        }
        self.event_index.insert(event_id.to_string(), stream_id);
        Ok(())
    }

    pub fn events_after(&self, event_id: &str) -> Vec<StoredEvent> {
        self.event_index
            .get(event_id)
            .and_then(|stream_id| self.stream(*stream_id))
            .map(|stream| stream.events_after(event_id))
            .unwrap_or_default()
    }
}
