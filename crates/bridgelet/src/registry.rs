//! Response correlation registry - the core of the bridge.
//!
//! Maps an in-flight [`RequestId`] to the send half of a oneshot channel.
//! The HTTP handler registers a waiter, emits its request record, and
//! suspends on the returned [`PendingResponse`]; the inbound consumer calls
//! [`ResponseRegistry::deliver`] for every decoded response line. Delivery
//! removes the entry and wakes exactly one waiter; a response whose id has
//! no entry is handed back as orphaned.
//!
//! Requests and responses arrive on independent tasks with no ordering
//! guarantee between them. The registry promises only this: if `register`
//! completes before `deliver` looks up the id, the waiter gets the
//! response. A response that beats its own registration is orphaned and
//! permanently lost to that waiter. Callers narrow the window by
//! registering before emitting, but closing it entirely would need a
//! synchronous handshake on the outbound stream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::bridge::protocol::{RequestId, ResponseRecord};

/// Outcome of [`ResponseRegistry::deliver`].
#[derive(Debug)]
pub enum Delivery {
    /// Exactly one waiter was woken with the response.
    Delivered,
    /// No waiter held the id; the record is handed back for orphan
    /// reporting and discard.
    Orphaned(ResponseRecord),
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }
}

/// Why a wait ended without a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    #[error("no response arrived within the configured deadline")]
    TimedOut,
    #[error("registry entry vanished before a response was delivered")]
    Closed,
}

/// Concurrent map from request id to pending waiter.
///
/// Explicit and passed by reference (`Arc`), never process-global. The lock
/// is held only for map mutation - never across emission, blocking, or
/// stream I/O.
#[derive(Default)]
pub struct ResponseRegistry {
    waiters: Mutex<HashMap<RequestId, oneshot::Sender<ResponseRecord>>>,
}

impl ResponseRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock_waiters(&self) -> MutexGuard<'_, HashMap<RequestId, oneshot::Sender<ResponseRecord>>> {
        match self.waiters.lock() {
            Ok(guard) => guard,
            // No invariant spans a panic inside the critical section; the
            // map itself is still usable.
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Insert a waiter for `id` and return its receive handle.
    ///
    /// Must complete before the matching response can arrive for the
    /// delivery to succeed; a response that wins the race is orphaned.
    pub fn register(self: &Arc<Self>, id: RequestId) -> PendingResponse {
        let (tx, rx) = oneshot::channel();
        let previous = self.lock_waiters().insert(id, tx);
        // Ids are UUID v4 and never reused, so an existing entry means a
        // caller bug, not a wire condition.
        debug_assert!(previous.is_none(), "waiter already registered for {id}");

        PendingResponse {
            id,
            rx,
            registry: Arc::clone(self),
        }
    }

    /// Hand `response` to the waiter registered for `id`, if any.
    ///
    /// Removal and delivery are atomic with respect to concurrent calls:
    /// the entry is taken out of the map under the lock, so a second
    /// delivery for the same id finds nothing and is orphaned. Never
    /// blocks.
    pub fn deliver(&self, id: RequestId, response: ResponseRecord) -> Delivery {
        let sender = self.lock_waiters().remove(&id);
        match sender {
            Some(tx) => match tx.send(response) {
                Ok(()) => Delivery::Delivered,
                // The waiter gave up between removal and send.
                Err(response) => Delivery::Orphaned(response),
            },
            None => Delivery::Orphaned(response),
        }
    }

    /// Number of registered waiters still awaiting delivery.
    pub fn pending(&self) -> usize {
        self.lock_waiters().len()
    }

    fn remove(&self, id: RequestId) {
        self.lock_waiters().remove(&id);
    }
}

/// One-shot receive handle for a registered request.
///
/// Doubles as the cleanup token: dropping an unresolved handle removes the
/// registry entry, so a handler that gives up (client disconnect, deadline
/// expiry) does not leak its waiter.
pub struct PendingResponse {
    id: RequestId,
    rx: oneshot::Receiver<ResponseRecord>,
    registry: Arc<ResponseRegistry>,
}

impl PendingResponse {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Suspend until the matching response is delivered.
    ///
    /// `deadline: None` waits indefinitely - the handler and its HTTP
    /// connection are held until the collaborator answers or the process
    /// exits. `Some(limit)` bounds the wait; on expiry the registry entry
    /// is removed and the response, should it still arrive, is orphaned.
    pub async fn resolve(mut self, deadline: Option<Duration>) -> Result<ResponseRecord, WaitError> {
        match deadline {
            None => (&mut self.rx).await.map_err(|_| WaitError::Closed),
            Some(limit) => match tokio::time::timeout(limit, &mut self.rx).await {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(_)) => Err(WaitError::Closed),
                Err(_) => Err(WaitError::TimedOut),
            },
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        // Ids are never reused, so removing unconditionally is safe: after
        // a delivery the entry is already gone and this is a no-op.
        self.registry.remove(self.id);
    }
}
