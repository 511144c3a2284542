//! Graph store abstraction: session lifecycle and parameterized writes

use crate::error::StoreError;
use crate::record::Batch;

/// Exclusive handle to one store connection.
pub trait Session: Send {
    /// Execute `statement` with the batch bound as a single list-valued parameter.
    fn execute(&mut self, statement: &str, batch: &Batch) -> Result<(), StoreError>;

    /// Execute a fixed statement without parameters.
    fn run(&mut self, statement: &str) -> Result<(), StoreError>;

    /// Release the connection.
    fn close(self) -> Result<(), StoreError>;
}

/// Target data store that hands out sessions.
pub trait GraphStore {
    type Session: Session;

    fn begin_session(&self) -> Result<Self::Session, StoreError>;
}

/// Fixed set of sessions owned for the lifetime of one file (or one statement phase).
///
/// Slot `i` is owned exclusively by whoever holds `&mut` to it. Sessions still
/// held when the guard drops are closed, so every exit path releases them.
pub struct SessionSlots<S: Session> {
    label: String,
    sessions: Vec<S>,
}

impl<S: Session> SessionSlots<S> {
    /// Begin `count` sessions. On failure the sessions already begun are released.
    pub fn acquire<G>(store: &G, count: usize, label: &str) -> Result<Self, StoreError>
    where
        G: GraphStore<Session = S>,
    {
        let mut slots = Self {
            label: label.to_string(),
            sessions: Vec::with_capacity(count),
        };
        for _ in 0..count.max(1) {
            slots.sessions.push(store.begin_session()?);
        }
        log::debug!("{label}: acquired {} session(s)", slots.sessions.len());
        Ok(slots)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Session of slot 0
    pub fn primary(&mut self) -> &mut S {
        &mut self.sessions[0]
    }

    pub fn as_mut_slice(&mut self) -> &mut [S] {
        &mut self.sessions
    }

    /// Close every session, reporting the first failure.
    pub fn release(mut self) -> Result<(), StoreError> {
        let mut first_err = None;
        for (slot, session) in self.sessions.drain(..).enumerate() {
            if let Err(e) = session.close() {
                log::warn!("{}: closing session {slot} failed: {e}", self.label);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl<S: Session> Drop for SessionSlots<S> {
    fn drop(&mut self) {
        for (slot, session) in self.sessions.drain(..).enumerate() {
            if let Err(e) = session.close() {
                log::warn!("{}: closing session {slot} failed: {e}", self.label);
            }
        }
    }
}
