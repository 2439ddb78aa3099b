//! Single-slot session registry.
//!
//! The registry is the only state shared between connection workers.
//! Every operation runs under one mutex, so two connections racing to
//! register can never both observe an empty slot.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::error::LanboxError;

/// Maximum number of simultaneously registered senders.
pub const SESSION_CAPACITY: usize = 1;

// ── Session ──────────────────────────────────────────────────────

/// Handle to the connection that owns a session.
///
/// Cancelling `shutdown` makes the owning worker close its connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub peer: SocketAddr,
    pub shutdown: CancellationToken,
}

impl ConnectionHandle {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            shutdown: CancellationToken::new(),
        }
    }
}

/// A registered sender.
#[derive(Debug, Clone)]
pub struct Session {
    pub name: String,
    pub connection: ConnectionHandle,
    pub since: Instant,
}

// ── Registration ─────────────────────────────────────────────────

/// Why a registration was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The slot is held; checked before the name.
    AlreadyOccupied,
    /// The name is registered.
    NameTaken,
}

/// Result of [`SessionRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Accepted,
    Rejected(Rejection),
}

impl Registration {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Registration::Accepted)
    }

    /// Convert a rejection into the matching error.
    pub fn into_result(self, name: &str) -> Result<(), LanboxError> {
        match self {
            Registration::Accepted => Ok(()),
            Registration::Rejected(Rejection::AlreadyOccupied) => Err(LanboxError::Capacity),
            Registration::Rejected(Rejection::NameTaken) => {
                Err(LanboxError::NameConflict(name.to_string()))
            }
        }
    }
}

// ── SessionRegistry ──────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        // A panic while holding the lock cannot leave the map half-updated,
        // so a poisoned guard is still consistent.
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Try to claim the slot for `name`.
    ///
    /// Occupancy is checked first and dominates: while any session is
    /// active every attempt is `AlreadyOccupied`, even for the occupant's
    /// own name.
    pub fn register(&self, name: &str, connection: ConnectionHandle) -> Registration {
        let mut sessions = self.lock();
        if sessions.len() >= SESSION_CAPACITY {
            return Registration::Rejected(Rejection::AlreadyOccupied);
        }
        if sessions.contains_key(name) {
            return Registration::Rejected(Rejection::NameTaken);
        }
        sessions.insert(
            name.to_string(),
            Session {
                name: name.to_string(),
                connection,
                since: Instant::now(),
            },
        );
        Registration::Accepted
    }

    /// Free the slot held by `name`. No-op for any other name.
    pub fn release(&self, name: &str) -> Option<Session> {
        self.lock().remove(name)
    }

    /// Snapshot of the active session, if any.
    pub fn current(&self) -> Option<Session> {
        self.lock().values().next().cloned()
    }

    /// Empty the registry and signal every owning connection to close.
    pub fn close_all(&self) -> Vec<Session> {
        let drained: Vec<Session> = self.lock().drain().map(|(_, s)| s).collect();
        for session in &drained {
            session.connection.shutdown.cancel();
        }
        drained
    }
}
