//! Request/response correlation.
//!
//! An [`InputBroker`] is an arena of outstanding requests keyed by
//! [`RequestId`]. Each entry owns the sending half of a `oneshot` channel, so a
//! request can be resolved at most once. Three things race to resolve an entry:
//! a matching response, the request's timeout, and a cancellation. Whoever
//! removes the entry from the arena first wins; the losers find nothing and are
//! discarded.
//!
//! Lock discipline: the arena lock is a plain `std::sync::Mutex` and is never
//! held across an `.await`. Sending on a `oneshot` does not block, so the
//! value is handed over while the lock is still held. A waiter that lost the
//! entry to a response can then rely on the value already sitting in its
//! channel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::domain::RequestId;

/// A response that can be matched to its request.
///
/// Besides real answers, every response type must be able to express the two
/// canonical outcomes the broker produces on its own.
pub trait Correlated: Send + 'static {
    fn request_id(&self) -> RequestId;

    /// Canonical response for a request whose timeout elapsed.
    fn timed_out(request_id: RequestId) -> Self;

    /// Canonical response for a request canceled by an abort.
    fn canceled(request_id: RequestId) -> Self;
}

type Arena<R> = HashMap<RequestId, oneshot::Sender<R>>;

/// Arena of outstanding requests.
pub struct InputBroker<R: Correlated> {
    pending: Arc<Mutex<Arena<R>>>,
}

impl<R: Correlated> InputBroker<R> {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Arena<R>> {
        lock_arena(&self.pending)
    }

    /// Record `id` as outstanding.
    ///
    /// Registering an id that is already outstanding cancels the older wait.
    pub fn register(&self, id: RequestId) -> PendingInput<R> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.lock();
        if let Some(previous) = pending.insert(id, tx) {
            let _ = previous.send(R::canceled(id));
        }
        PendingInput {
            id,
            rx,
            arena: Arc::clone(&self.pending),
        }
    }

    /// Resolve the outstanding request matching `response`.
    ///
    /// Returns `false` when no such request is outstanding (unknown id,
    /// already answered, timed out or canceled); the response is discarded.
    pub fn resolve(&self, response: R) -> bool {
        let id = response.request_id();
        let mut pending = self.lock();
        match pending.remove(&id) {
            Some(tx) => tx.send(response).is_ok(),
            None => {
                tracing::warn!(request_id = %id, "no pending input request, response discarded");
                false
            }
        }
    }

    /// Resolve one outstanding request as canceled.
    pub fn cancel(&self, id: RequestId) -> bool {
        let mut pending = self.lock();
        match pending.remove(&id) {
            Some(tx) => tx.send(R::canceled(id)).is_ok(),
            None => false,
        }
    }

    /// Resolve every outstanding request as canceled. Returns how many were
    /// released.
    pub fn cancel_all(&self) -> usize {
        let mut pending = self.lock();
        let released = pending.len();
        for (id, tx) in pending.drain() {
            let _ = tx.send(R::canceled(id));
        }
        released
    }

    pub fn is_pending(&self, id: RequestId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }
}

impl<R: Correlated> Default for InputBroker<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle on one outstanding request.
///
/// Dropping the handle without waiting withdraws the request, so a late
/// response for it is discarded instead of lingering in the arena.
pub struct PendingInput<R: Correlated> {
    id: RequestId,
    rx: oneshot::Receiver<R>,
    arena: Arc<Mutex<Arena<R>>>,
}

impl<R: Correlated> PendingInput<R> {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the matching response.
    ///
    /// With a timeout, the wait resolves to `R::timed_out` no earlier than
    /// `timeout` unless a response or a cancellation got there first.
    pub async fn wait(mut self, timeout: Option<Duration>) -> R {
        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut self.rx).await {
                Ok(received) => received,
                Err(_elapsed) => return self.expire(),
            },
            None => (&mut self.rx).await,
        };

        // The sender only disappears without a value when the broker is gone.
        received.unwrap_or_else(|_| R::canceled(self.id))
    }

    /// The timer fired: claim the entry, unless something else already did.
    fn expire(&mut self) -> R {
        let claimed = lock_arena(&self.arena).remove(&self.id).is_some();
        if claimed {
            return R::timed_out(self.id);
        }
        // Lost the race. The winner sent under the arena lock, so its value is
        // already in the channel.
        match self.rx.try_recv() {
            Ok(response) => response,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => R::timed_out(self.id),
        }
    }
}

impl<R: Correlated> Drop for PendingInput<R> {
    fn drop(&mut self) {
        lock_arena(&self.arena).remove(&self.id);
    }
}

fn lock_arena<R>(arena: &Mutex<Arena<R>>) -> MutexGuard<'_, Arena<R>> {
    // A panic while holding the lock cannot leave the map half-updated.
    arena.lock().unwrap_or_else(PoisonError::into_inner)
}
