//! Per-connection session state and resumable event streams for Conduit.
//!
//! A [`Session`] owns several event streams, each keeping only its most
//! recent events so a reconnecting client can replay what it missed after a
//! `Last-Event-ID`. All state lives in a pluggable [`SessionStorage`] and every
//! mutation is a read-modify-write transaction against it.

pub mod error;
pub mod file;
pub mod session;
pub mod storage;
pub mod types;

pub use error::SessionError;
pub use file::FileSessionStorage;
pub use session::Session;
pub use storage::{MemorySessionStorage, SessionStorage, StoredRecord};
pub use types::{MAX_EVENTS_PER_STREAM, SessionIdentifier, StoredEvent, Stream};
