//! The session: durable per-connection state with replayable streams.

use std::sync::Arc;
use uuid::Uuid;

use crate::error::SessionError;
use crate::storage::SessionStorage;
use crate::types::{SessionIdentifier, SessionState, StoredEvent, Stream};

/// How many times a mutation is retried after losing a version race.
const MAX_SAVE_ATTEMPTS: usize = 3;

/// A session bound to its storage.
///
/// Every mutating call refreshes from storage, applies the change, and saves
/// before returning. Saves are checked against the version seen on refresh;
/// on conflict the mutation is replayed on fresh state, up to
/// `MAX_SAVE_ATTEMPTS` times.
pub struct Session {
    identifier: SessionIdentifier,
    storage: Arc<dyn SessionStorage>,
    state: SessionState,
    version: u64,
}

impl Session {
    /// Bind to an existing or not-yet-stored session. Nothing is written
    /// until the first mutation.
    pub fn open(
        identifier: SessionIdentifier,
        storage: Arc<dyn SessionStorage>,
    ) -> Result<Self, SessionError> {
        let mut session = Self {
            identifier,
            storage,
            state: SessionState::default(),
            version: 0,
        };
        session.refresh()?;
        Ok(session)
    }

    /// Start a brand-new session under a random id and persist it.
    pub fn create(
        storage: Arc<dyn SessionStorage>,
        user_identifier: Option<String>,
    ) -> Result<Self, SessionError> {
        let mut identifier = SessionIdentifier::generate();
        identifier.user_identifier = user_identifier;
        let mut session = Self::open(identifier, storage)?;
        session.save()?;
        tracing::info!("Created session {}", session.identifier);
        Ok(session)
    }

    pub fn identifier(&self) -> &SessionIdentifier {
        &self.identifier
    }

    /// Reload state from storage, discarding local state.
    pub fn refresh(&mut self) -> Result<(), SessionError> {
        match self.storage.get(&self.identifier.storage_key())? {
            Some(record) => {
                self.state = serde_json::from_str(&record.data)?;
                self.version = record.version;
            }
            None => {
                self.state = SessionState::default();
                self.version = 0;
            }
        }
        Ok(())
    }

    /// Persist the current state as is.
    pub fn save(&mut self) -> Result<(), SessionError> {
        let data = serde_json::to_string(&self.state)?;
        self.version = self
            .storage
            .save(&self.identifier.storage_key(), data, self.version)?;
        Ok(())
    }

    fn transact<T>(
        &mut self,
        mut apply: impl FnMut(&mut SessionState) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let key = self.identifier.storage_key();
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.refresh()?;
            let mut next = self.state.clone();
            let value = apply(&mut next)?;
            let data = serde_json::to_string(&next)?;
            match self.storage.save(&key, data, self.version) {
                Ok(version) => {
                    self.state = next;
                    self.version = version;
                    return Ok(value);
                }
                Err(SessionError::Conflict { .. }) if attempt < MAX_SAVE_ATTEMPTS => {
                    tracing::debug!("Session {key} changed underneath us, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Open a new event stream and return its id.
    pub fn add_new_stream(&mut self, client_initiated: bool) -> Result<Uuid, SessionError> {
        let id = Uuid::new_v4();
        self.transact(|state| {
            state.streams.push(Stream::new(id, client_initiated));
            Ok(id)
        })
    }

    /// Record an event on a stream, evicting the oldest retained event once
    /// the stream is full.
    pub fn add_event_on_stream(
        &mut self,
        stream_id: Uuid,
        event_id: &str,
        event: &str,
    ) -> Result<(), SessionError> {
        self.transact(|state| state.add_event(stream_id, event_id, event))
    }

    /// Retained events of a stream, oldest first.
    pub fn get_events_on_stream(&mut self, stream_id: Uuid) -> Result<Vec<StoredEvent>, SessionError> {
        self.refresh()?;
        self.state
            .stream(stream_id)
            .map(|stream| stream.events().cloned().collect())
            .ok_or(SessionError::StreamNotFound { id: stream_id })
    }

    /// Events that followed `event_id` on its stream. Empty when the id is
    /// unknown or has already been evicted.
    pub fn get_events_after_id(&mut self, event_id: &str) -> Result<Vec<StoredEvent>, SessionError> {
        self.refresh()?;
        Ok(self.state.events_after(event_id))
    }

    /// Streams as of the last refresh or mutation.
    pub fn streams(&self) -> &[Stream] {
        &self.state.streams
    }

    pub fn stream(&self, id: Uuid) -> Option<&Stream> {
        self.state.stream(id)
    }

    /// Record that the client sent `notifications/initialized`.
    pub fn mark_initialized(&mut self) -> Result<(), SessionError> {
        self.transact(|state| {
            state.initialized_received = true;
            Ok(())
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.state.initialized_received
    }

    pub fn exists(&self) -> Result<bool, SessionError> {
        self.storage.exists(&self.identifier.storage_key())
    }

    /// Remove the session from storage, discarding all replay state.
    pub fn delete(&mut self) -> Result<(), SessionError> {
        self.storage.remove(&self.identifier.storage_key())?;
        self.state = SessionState::default();
        self.version = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemorySessionStorage, StoredRecord};
    use crate::types::MAX_EVENTS_PER_STREAM;
    use std::sync::Mutex;

    fn storage() -> Arc<dyn SessionStorage> {
        Arc::new(MemorySessionStorage::new())
    }

    #[test]
    fn open_does_not_persist() {
        let session = Session::open(SessionIdentifier::generate(), storage()).unwrap();
        assert!(!session.exists().unwrap());
    }

    #[test]
    fn create_persists_immediately() {
        let session = Session::create(storage(), Some("bob".into())).unwrap();
        assert!(session.exists().unwrap());
        assert!(session.identifier().storage_key().starts_with("bob:"));
    }

    #[test]
    fn mutations_are_visible_to_other_handles() {
        let storage = storage();
        let id = SessionIdentifier::generate();
        let mut a = Session::open(id.clone(), Arc::clone(&storage)).unwrap();
        let stream = a.add_new_stream(true).unwrap();
        a.add_event_on_stream(stream, "1", "one").unwrap();

        let mut b = Session::open(id, storage).unwrap();
        assert_eq!(b.streams().len(), 1);
        assert!(b.streams()[0].is_client_initiated());
        let events = b.get_events_on_stream(stream).unwrap();
        assert_eq!(events, vec![StoredEvent { id: "1".into(), event: "one".into() }]);
    }

    #[test]
    fn stale_handle_refreshes_before_mutating() {
        let storage = storage();
        let id = SessionIdentifier::generate();
        let mut a = Session::open(id.clone(), Arc::clone(&storage)).unwrap();
        let mut b = Session::open(id.clone(), Arc::clone(&storage)).unwrap();

        a.add_new_stream(false).unwrap();
        b.add_new_stream(false).unwrap();

        let mut fresh = Session::open(id, storage).unwrap();
        fresh.refresh().unwrap();
        assert_eq!(fresh.streams().len(), 2);
    }

    #[test]
    fn eleventh_event_evicts_oldest() {
        let mut session = Session::open(SessionIdentifier::generate(), storage()).unwrap();
        let stream = session.add_new_stream(false).unwrap();
        for i in 1..=11 {
            session
                .add_event_on_stream(stream, &i.to_string(), &format!("event-{i}"))
                .unwrap();
        }
        let events = session.get_events_on_stream(stream).unwrap();
        assert_eq!(events.len(), MAX_EVENTS_PER_STREAM);
        assert_eq!(events[0].id, "2");
        assert_eq!(events[9].id, "11");
    }

    #[test]
    fn events_after_id_resolves_owning_stream() {
        let mut session = Session::open(SessionIdentifier::generate(), storage()).unwrap();
        let first = session.add_new_stream(true).unwrap();
        let second = session.add_new_stream(false).unwrap();
        session.add_event_on_stream(first, "a1", "A1").unwrap();
        session.add_event_on_stream(second, "b1", "B1").unwrap();
        session.add_event_on_stream(first, "a2", "A2").unwrap();
        session.add_event_on_stream(second, "b2", "B2").unwrap();

        let after: Vec<_> = session
            .get_events_after_id("a1")
            .unwrap()
            .into_iter()
            .map(|e| e.event)
            .collect();
        assert_eq!(after, vec!["A2"]);
    }

    #[test]
    fn events_after_evicted_id_is_empty() {
        let mut session = Session::open(SessionIdentifier::generate(), storage()).unwrap();
        let stream = session.add_new_stream(false).unwrap();
        for i in 0..12 {
            session.add_event_on_stream(stream, &format!("e{i}"), "x").unwrap();
        }
        assert!(session.get_events_after_id("e0").unwrap().is_empty());
        assert!(session.get_events_after_id("e1").unwrap().is_empty());
        assert_eq!(session.get_events_after_id("e2").unwrap().len(), 9);
    }

    #[test]
    fn unknown_stream_is_an_error() {
        let mut session = Session::open(SessionIdentifier::generate(), storage()).unwrap();
        assert!(matches!(
            session.add_event_on_stream(Uuid::new_v4(), "e", "x"),
            Err(SessionError::StreamNotFound { .. })
        ));
        assert!(matches!(
            session.get_events_on_stream(Uuid::new_v4()),
            Err(SessionError::StreamNotFound { .. })
        ));
    }

    #[test]
    fn mark_initialized_persists() {
        let storage = storage();
        let id = SessionIdentifier::generate();
        let mut a = Session::open(id.clone(), Arc::clone(&storage)).unwrap();
        assert!(!a.is_initialized());
        a.mark_initialized().unwrap();
        let b = Session::open(id, storage).unwrap();
        assert!(b.is_initialized());
    }

    #[test]
    fn delete_removes_from_storage() {
        let mut session = Session::create(storage(), None).unwrap();
        session.add_new_stream(false).unwrap();
        session.delete().unwrap();
        assert!(!session.exists().unwrap());
        assert!(session.streams().is_empty());
    }

    /// Storage whose first `conflicts` saves report a concurrent writer.
    struct RacingStorage {
        inner: MemorySessionStorage,
        conflicts: Mutex<usize>,
    }

    impl SessionStorage for RacingStorage {
        fn exists(&self, key: &str) -> Result<bool, SessionError> {
            self.inner.exists(key)
        }

        fn get(&self, key: &str) -> Result<Option<StoredRecord>, SessionError> {
            self.inner.get(key)
        }

        fn save(&self, key: &str, data: String, expected: u64) -> Result<u64, SessionError> {
            let mut remaining = self.conflicts.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SessionError::Conflict {
                    key: key.to_string(),
                    expected,
                    found: expected + 1,
                });
            }
            self.inner.save(key, data, expected)
        }

        fn remove(&self, key: &str) -> Result<(), SessionError> {
            self.inner.remove(key)
        }
    }

    fn racing(conflicts: usize) -> Arc<dyn SessionStorage> {
        Arc::new(RacingStorage {
            inner: MemorySessionStorage::new(),
            conflicts: Mutex::new(conflicts),
        })
    }

    #[test]
    fn conflicts_are_retried() {
        let mut session = Session::open(SessionIdentifier::generate(), racing(2)).unwrap();
        let stream = session.add_new_stream(false).unwrap();
        assert_eq!(session.streams().len(), 1);
        assert_eq!(session.stream(stream).map(Stream::id), Some(stream));
    }

    #[test]
    fn persistent_conflict_surfaces() {
        let mut session = Session::open(SessionIdentifier::generate(), racing(5)).unwrap();
        assert!(matches!(
            session.add_new_stream(false),
            Err(SessionError::Conflict { .. })
        ));
    }
}
